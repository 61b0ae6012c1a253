// Tue Jan 13 2026 - Alex

//! Bounded multi-stage pipeline engine.
//!
//! Items flow from a source feeder through an ordered chain of stages. Each
//! stage boundary is a [`PartitionedQueue`]: a set of bounded FIFO partitions
//! that gives the whole chain backpressure. Every stage runs its transform on
//! a pool of workers, marks its output completed once its input is drained,
//! and watches one shared cancellation signal. A failing transform cancels
//! the whole run and is reported in the [`PipelineOutcome`].
//!
//! ```ignore
//! use bounded_pipeline::{Pipeline, PipelineConfig};
//!
//! let outcome = Pipeline::builder(PipelineConfig::default())?
//!     .source(0..20u64)?
//!     .stage("scale", 4, |i: u64| Ok(i as f64 * 0.97))?
//!     .stage("format", 4, |v: f64| Ok(format!("--{}--", v)))?
//!     .sink("print", 4, |s: String| {
//!         println!("{}", s);
//!         Ok(())
//!     })
//!     .run();
//! assert!(outcome.is_completed());
//! ```

pub mod config;
pub mod engine;
pub mod ui;
pub mod utils;

pub use config::PipelineConfig;
pub use engine::{
    CancelHandle, CancelReason, PartitionedQueue, Pipeline, PipelineError, PipelineHandle,
    PipelineOutcome, PipelineReport, PipelineRunner, QueueError, Stage, StageFailure, StageState,
    TransformError,
};
