// Tue Jan 13 2026 - Alex

use crate::engine::cancel::CancelHandle;
use crate::engine::error::{PipelineError, PipelineResult};
use crate::engine::pipeline::Pipeline;
use crate::engine::result::PipelineOutcome;
use crate::engine::stage::StageStatus;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct PipelineRunner;

impl PipelineRunner {
    /// Runs `pipeline` on a background thread and returns a handle to it.
    pub fn spawn(pipeline: Pipeline) -> PipelineResult<PipelineHandle> {
        let cancel = pipeline.cancel_handle();
        let statuses = pipeline.stage_statuses();
        let (tx, rx) = mpsc::channel();

        let thread_handle = thread::Builder::new()
            .name("pipeline-runner".to_string())
            .spawn(move || {
                let outcome = pipeline.run();
                let _ = tx.send(outcome);
            })?;

        Ok(PipelineHandle {
            thread_handle: Some(thread_handle),
            result_receiver: rx,
            outcome: None,
            cancel,
            statuses,
        })
    }
}

pub struct PipelineHandle {
    thread_handle: Option<JoinHandle<()>>,
    result_receiver: Receiver<PipelineOutcome>,
    outcome: Option<PipelineOutcome>,
    cancel: CancelHandle,
    statuses: Vec<Arc<StageStatus>>,
}

impl PipelineHandle {
    pub fn cancel(&self) -> bool {
        self.cancel.request_cancellation()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn stage_statuses(&self) -> &[Arc<StageStatus>] {
        &self.statuses
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
            || self
                .thread_handle
                .as_ref()
                .map_or(true, |handle| handle.is_finished())
    }

    /// Waits up to `timeout` for the run to end. The outcome stays cached
    /// for [`PipelineHandle::wait`].
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<&PipelineOutcome> {
        if self.outcome.is_none() {
            if let Ok(outcome) = self.result_receiver.recv_timeout(timeout) {
                self.outcome = Some(outcome);
            }
        }
        self.outcome.as_ref()
    }

    pub fn wait(mut self) -> PipelineResult<PipelineOutcome> {
        let joined = self.thread_handle.take().map(|handle| handle.join());

        if let Some(outcome) = self.outcome.take() {
            return Ok(outcome);
        }
        if let Some(Err(_)) = joined {
            return Err(PipelineError::RunnerPanicked);
        }
        self.result_receiver
            .try_recv()
            .map_err(|_| PipelineError::RunnerPanicked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::engine::cancel::CancelReason;

    fn endless() -> Pipeline {
        let config = PipelineConfig::new()
            .with_parallelism(2)
            .with_poll_interval(Duration::from_millis(5));

        Pipeline::builder(config)
            .unwrap()
            .source(0u64..)
            .unwrap()
            .stage("noop", 2, |x: u64| Ok(x))
            .unwrap()
            .sink("slow", 1, |_: u64| {
                thread::sleep(Duration::from_millis(2));
                Ok(())
            })
    }

    #[test]
    fn test_wait_returns_completed_outcome() {
        let config = PipelineConfig::new().with_poll_interval(Duration::from_millis(5));
        let pipeline = Pipeline::builder(config)
            .unwrap()
            .source(0..10u32)
            .unwrap()
            .sink("drop", 2, |_: u32| Ok(()));

        let handle = PipelineRunner::spawn(pipeline).unwrap();
        let outcome = handle.wait().unwrap();
        assert!(outcome.is_completed());
        assert_eq!(outcome.report().delivered(), 10);
    }

    #[test]
    fn test_panicking_source_ends_the_run() {
        let config = PipelineConfig::new()
            .with_parallelism(2)
            .with_poll_interval(Duration::from_millis(5));
        let items = (0..10u32).map(|x| {
            if x == 5 {
                panic!("source broke on {}", x);
            }
            x
        });
        let pipeline = Pipeline::builder(config)
            .unwrap()
            .source(items)
            .unwrap()
            .sink("drop", 2, |_: u32| Ok(()));

        let mut handle = PipelineRunner::spawn(pipeline).unwrap();
        let reason = handle
            .wait_timeout(Duration::from_secs(5))
            .and_then(|outcome| outcome.reason());
        assert_eq!(reason, Some(CancelReason::TransformFailure));

        let outcome = handle.wait().unwrap();
        let failures = outcome.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].stage, "source");
        assert!(failures[0].is_panic());
        assert!(failures[0].error.to_string().contains("source broke on 5"));
        assert!(outcome.report().stages.iter().all(|s| s.state.is_terminal()));
    }

    #[test]
    fn test_cancel_through_handle() {
        let mut handle = PipelineRunner::spawn(endless()).unwrap();
        assert!(handle.wait_timeout(Duration::from_millis(30)).is_none());
        assert!(!handle.is_finished());
        assert_eq!(handle.stage_statuses().len(), 3);

        assert!(handle.cancel());
        assert!(!handle.cancel_handle().request_cancellation());

        let reason = handle
            .wait_timeout(Duration::from_secs(5))
            .and_then(|outcome| outcome.reason());
        assert_eq!(reason, Some(CancelReason::External));
        assert!(handle.is_finished());

        let outcome = handle.wait().unwrap();
        assert!(outcome.is_cancelled());
        assert!(outcome.failures().is_empty());
    }
}
