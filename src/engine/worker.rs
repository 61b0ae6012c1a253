// Tue Jan 13 2026 - Alex

use crate::engine::error::{QueueError, TransformError};
use crate::engine::queue::PartitionedQueue;
use crate::engine::stage::{StageContext, StageInput, StageStatus, TransformFn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    /// Upstream reported it will never yield again and this worker holds nothing.
    Drained,
    Cancelled,
}

pub(crate) struct Worker<'a, I, O> {
    pub id: usize,
    pub stage: &'a str,
    pub transform: &'a TransformFn<I, O>,
    pub latency: Option<Duration>,
    pub input: &'a dyn StageInput<I>,
    pub output: Option<&'a PartitionedQueue<O>>,
    pub status: &'a StageStatus,
    pub ctx: &'a StageContext,
}

impl<I, O> Worker<'_, I, O> {
    pub fn run(self) -> WorkerExit {
        log::trace!("Stage '{}' worker {} started", self.stage, self.id);

        loop {
            if self.ctx.token.is_cancelled() {
                return WorkerExit::Cancelled;
            }

            let next = panic::catch_unwind(AssertUnwindSafe(|| {
                self.input.next_item(self.ctx.poll_interval, &self.ctx.token)
            }));
            let next = match next {
                Ok(next) => next,
                Err(payload) => {
                    let error = TransformError::Panicked(panic_message(payload.as_ref()));
                    return self.fail(error);
                }
            };

            let item = match next {
                Ok(item) => item,
                Err(QueueError::TimedOut) => {
                    if self.input.is_exhausted() {
                        return self.drained();
                    }
                    continue;
                }
                Err(QueueError::Completed) => return self.drained(),
                Err(QueueError::Cancelled) | Err(QueueError::InvalidPartition(_)) => {
                    return WorkerExit::Cancelled;
                }
            };

            let produced = match self.apply(item) {
                Ok(produced) => produced,
                Err(error) => return self.fail(error),
            };
            self.status.record_processed();

            if let Some(output) = self.output {
                match output.add_to_any(produced, &self.ctx.token) {
                    Ok(_) => self.status.record_emitted(),
                    Err(QueueError::Completed) => {
                        log::warn!(
                            "Stage '{}' worker {} found its output closed early",
                            self.stage,
                            self.id
                        );
                        return WorkerExit::Cancelled;
                    }
                    Err(_) => return WorkerExit::Cancelled,
                }
            }
        }
    }

    fn fail(&self, error: TransformError) -> WorkerExit {
        self.ctx.fail(self.stage, self.id, error);
        WorkerExit::Cancelled
    }

    fn drained(&self) -> WorkerExit {
        self.status.begin_draining();
        log::trace!("Stage '{}' worker {} drained", self.stage, self.id);
        WorkerExit::Drained
    }

    fn apply(&self, item: I) -> Result<O, TransformError> {
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }

        match panic::catch_unwind(AssertUnwindSafe(|| (self.transform)(item))) {
            Ok(Ok(produced)) => Ok(produced),
            Ok(Err(error)) => Err(TransformError::Failed(error)),
            Err(payload) => Err(TransformError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
