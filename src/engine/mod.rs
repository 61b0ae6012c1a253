// Tue Jan 13 2026 - Alex

pub mod cancel;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod result;
pub mod runner;
pub mod stage;
mod worker;

pub use cancel::{CancelHandle, CancelReason, CancellationToken};
pub use error::{PipelineError, PipelineResult, QueueError, TransformError};
pub use pipeline::{Pipeline, PipelineBuilder, StageChain};
pub use queue::PartitionedQueue;
pub use result::{PipelineOutcome, PipelineReport, StageFailure, StageReport};
pub use runner::{PipelineHandle, PipelineRunner};
pub use stage::{Source, Stage, StageInput, StageState, StageStatus};
