// Tue Jan 13 2026 - Alex

use crate::engine::cancel::CancelReason;
use crate::engine::error::TransformError;
use crate::engine::stage::{StageState, StageStatus};
use std::fmt;
use std::time::Duration;

/// A transform failure, attributed to the stage and worker that raised it.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: String,
    pub worker: usize,
    pub error: TransformError,
}

impl StageFailure {
    pub fn new(stage: &str, worker: usize, error: TransformError) -> Self {
        Self {
            stage: stage.to_string(),
            worker,
            error,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self.error, TransformError::Panicked(_))
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage '{}' worker {}: {}", self.stage, self.worker, self.error)
    }
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub name: String,
    pub state: StageState,
    pub workers: usize,
    pub processed: u64,
    pub emitted: u64,
    pub duration: Duration,
}

impl StageReport {
    pub(crate) fn from_status(status: &StageStatus, duration: Duration) -> Self {
        Self {
            name: status.name().to_string(),
            state: status.state(),
            workers: status.workers(),
            processed: status.processed(),
            emitted: status.emitted(),
            duration,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == StageState::Completed
    }

    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.processed as f64 / secs
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Source feeder first, sink last.
    pub stages: Vec<StageReport>,
    pub total_duration: Duration,
}

impl PipelineReport {
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn fed(&self) -> u64 {
        self.stages.first().map(|s| s.emitted).unwrap_or(0)
    }

    /// Items the terminal stage handled.
    pub fn delivered(&self) -> u64 {
        self.stages.last().map(|s| s.processed).unwrap_or(0)
    }

    pub fn all_completed(&self) -> bool {
        self.stages.iter().all(|s| s.is_completed())
    }

    pub fn slowest_stage(&self) -> Option<&StageReport> {
        self.stages.iter().max_by_key(|s| s.duration)
    }
}

#[derive(Debug)]
pub enum PipelineOutcome {
    /// Every stage drained its input and no failure was captured.
    Completed(PipelineReport),
    /// The run was aborted. `failures` is non-empty when a transform caused it.
    Cancelled {
        reason: CancelReason,
        failures: Vec<StageFailure>,
        report: PipelineReport,
    },
}

impl PipelineOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PipelineOutcome::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineOutcome::Cancelled { .. })
    }

    pub fn reason(&self) -> Option<CancelReason> {
        match self {
            PipelineOutcome::Completed(_) => None,
            PipelineOutcome::Cancelled { reason, .. } => Some(*reason),
        }
    }

    pub fn failures(&self) -> &[StageFailure] {
        match self {
            PipelineOutcome::Completed(_) => &[],
            PipelineOutcome::Cancelled { failures, .. } => failures,
        }
    }

    pub fn report(&self) -> &PipelineReport {
        match self {
            PipelineOutcome::Completed(report) => report,
            PipelineOutcome::Cancelled { report, .. } => report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, state: StageState, processed: u64, millis: u64) -> StageReport {
        StageReport {
            name: name.to_string(),
            state,
            workers: 1,
            processed,
            emitted: processed,
            duration: Duration::from_millis(millis),
        }
    }

    #[test]
    fn test_pipeline_report_queries() {
        let pipeline = PipelineReport {
            stages: vec![
                report("source", StageState::Completed, 20, 10),
                report("scale", StageState::Completed, 20, 40),
                report("print", StageState::Cancelled, 12, 30),
            ],
            total_duration: Duration::from_millis(45),
        };

        assert_eq!(pipeline.fed(), 20);
        assert_eq!(pipeline.delivered(), 12);
        assert!(!pipeline.all_completed());
        assert_eq!(pipeline.slowest_stage().map(|s| s.name.as_str()), Some("scale"));
        assert!(pipeline.stage("missing").is_none());
    }

    #[test]
    fn test_outcome_accessors() {
        let failure = StageFailure::new(
            "scale",
            2,
            TransformError::Failed(anyhow::anyhow!("bad input")),
        );
        assert_eq!(failure.to_string(), "stage 'scale' worker 2: Transform failed: bad input");
        assert!(!failure.is_panic());

        let outcome = PipelineOutcome::Cancelled {
            reason: CancelReason::TransformFailure,
            failures: vec![failure],
            report: PipelineReport::default(),
        };
        assert!(outcome.is_cancelled());
        assert_eq!(outcome.reason(), Some(CancelReason::TransformFailure));
        assert_eq!(outcome.failures().len(), 1);

        let done = PipelineOutcome::Completed(PipelineReport::default());
        assert!(done.is_completed());
        assert!(done.failures().is_empty());
        assert_eq!(done.reason(), None);
    }

    #[test]
    fn test_throughput_handles_zero_duration() {
        assert_eq!(report("s", StageState::Completed, 5, 0).throughput(), 0.0);
        assert_eq!(report("s", StageState::Completed, 10, 2000).throughput(), 5.0);
    }
}
