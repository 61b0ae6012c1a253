// Tue Jan 13 2026 - Alex

use thiserror::Error;

/// Outcome of a blocking queue operation that did not yield an item.
///
/// `Cancelled` and `TimedOut` are control signals; workers react to them and
/// they never reach the final pipeline result.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Timed out waiting for queue")]
    TimedOut,
    #[error("Queue is completed")]
    Completed,
    #[error("Invalid partition index: {0}")]
    InvalidPartition(usize),
}

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Transform failed: {0}")]
    Failed(#[from] anyhow::Error),
    #[error("Transform panicked: {0}")]
    Panicked(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("Pipeline runner thread panicked")]
    RunnerPanicked,
}

pub type PipelineResult<T> = Result<T, PipelineError>;
