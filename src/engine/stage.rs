// Tue Jan 13 2026 - Alex

use crate::engine::cancel::{CancelReason, CancellationToken};
use crate::engine::error::{QueueError, TransformError};
use crate::engine::queue::PartitionedQueue;
use crate::engine::result::{StageFailure, StageReport};
use crate::engine::worker::{panic_message, Worker, WorkerExit};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub type TransformFn<I, O> = Arc<dyn Fn(I) -> anyhow::Result<O> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Idle,
    Running,
    Draining,
    Completed,
    Cancelled,
}

impl StageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageState::Completed | StageState::Cancelled)
    }

    pub fn name(&self) -> &'static str {
        match self {
            StageState::Idle => "idle",
            StageState::Running => "running",
            StageState::Draining => "draining",
            StageState::Completed => "completed",
            StageState::Cancelled => "cancelled",
        }
    }
}

/// One processing step: a named transform run by `parallelism` workers.
///
/// A stage is unbound until the pipeline builder wires it between an input
/// and an optional output queue. Without an output it acts as the sink and
/// whatever the transform returns is dropped.
pub struct Stage<I, O> {
    name: String,
    parallelism: usize,
    latency: Option<Duration>,
    transform: TransformFn<I, O>,
}

impl<I, O> Stage<I, O> {
    pub fn transform<F>(name: &str, parallelism: usize, f: F) -> Self
    where
        F: Fn(I) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            parallelism: parallelism.max(1),
            latency: None,
            transform: Arc::new(f),
        }
    }

    /// Simulated per-item work, paid by the worker before running the transform.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = if latency.is_zero() { None } else { Some(latency) };
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }
}

impl<I> Stage<I, ()> {
    pub fn sink<F>(name: &str, parallelism: usize, f: F) -> Self
    where
        F: Fn(I) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::transform(name, parallelism, f)
    }
}

/// Where a stage pulls its items from.
pub trait StageInput<I>: Send + Sync {
    fn next_item(&self, timeout: Duration, token: &CancellationToken) -> Result<I, QueueError>;

    /// True once no further item will ever be produced.
    fn is_exhausted(&self) -> bool;
}

impl<I: Send> StageInput<I> for PartitionedQueue<I> {
    fn next_item(&self, timeout: Duration, token: &CancellationToken) -> Result<I, QueueError> {
        self.take_from_any(timeout, token).map(|(_, item)| item)
    }

    fn is_exhausted(&self) -> bool {
        self.is_fully_completed()
    }
}

/// The initial dataset, shared by the feeder workers.
pub struct Source<T> {
    items: Mutex<Box<dyn Iterator<Item = T> + Send>>,
    exhausted: AtomicBool,
}

impl<T> Source<T> {
    pub fn from_iter<It>(items: It) -> Self
    where
        It: IntoIterator<Item = T>,
        It::IntoIter: Send + 'static,
    {
        Self {
            items: Mutex::new(Box::new(items.into_iter())),
            exhausted: AtomicBool::new(false),
        }
    }
}

impl<T: Send> StageInput<T> for Source<T> {
    fn next_item(&self, _timeout: Duration, token: &CancellationToken) -> Result<T, QueueError> {
        if token.is_cancelled() {
            return Err(QueueError::Cancelled);
        }
        if self.exhausted.load(Ordering::SeqCst) {
            return Err(QueueError::Completed);
        }

        match self.items.lock().next() {
            Some(item) => Ok(item),
            None => {
                self.exhausted.store(true, Ordering::SeqCst);
                Err(QueueError::Completed)
            }
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }
}

/// Live view of a stage, readable while the pipeline runs.
#[derive(Debug)]
pub struct StageStatus {
    name: String,
    workers: usize,
    state: RwLock<StageState>,
    processed: AtomicU64,
    emitted: AtomicU64,
}

impl StageStatus {
    pub(crate) fn new(name: &str, workers: usize) -> Self {
        Self {
            name: name.to_string(),
            workers,
            state: RwLock::new(StageState::Idle),
            processed: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn state(&self) -> StageState {
        *self.state.read()
    }

    /// Items the transform handled successfully.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    /// Items published to the downstream queue.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::SeqCst)
    }

    pub(crate) fn set_state(&self, state: StageState) {
        *self.state.write() = state;
    }

    pub(crate) fn begin_draining(&self) {
        let mut state = self.state.write();
        if *state == StageState::Running {
            *state = StageState::Draining;
        }
    }

    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_emitted(&self) {
        self.emitted.fetch_add(1, Ordering::SeqCst);
    }
}

/// Shared per-run state handed to every stage.
pub(crate) struct StageContext {
    pub token: CancellationToken,
    pub poll_interval: Duration,
    failures: Mutex<Vec<StageFailure>>,
}

impl StageContext {
    pub fn new(token: CancellationToken, poll_interval: Duration) -> Self {
        Self {
            token,
            poll_interval,
            failures: Mutex::new(Vec::new()),
        }
    }

    pub fn record_failure(&self, failure: StageFailure) {
        self.failures.lock().push(failure);
    }

    /// Records the failure and cancels the run on its behalf.
    pub fn fail(&self, stage: &str, worker: usize, error: TransformError) {
        log::error!("Stage '{}' worker {} failed: {}", stage, worker, error);
        self.record_failure(StageFailure::new(stage, worker, error));
        self.token.cancel(CancelReason::TransformFailure);
    }

    pub fn take_failures(&self) -> Vec<StageFailure> {
        std::mem::take(&mut *self.failures.lock())
    }
}

/// Type-erased stage wired into a pipeline.
pub(crate) trait StageRunner: Send {
    fn status(&self) -> Arc<StageStatus>;

    fn run(self: Box<Self>, ctx: &StageContext) -> StageReport;
}

pub(crate) struct BoundStage<I, O> {
    stage: Stage<I, O>,
    input: Arc<dyn StageInput<I>>,
    output: Option<Arc<PartitionedQueue<O>>>,
    status: Arc<StageStatus>,
}

impl<I, O> BoundStage<I, O> {
    pub fn new(
        stage: Stage<I, O>,
        input: Arc<dyn StageInput<I>>,
        output: Option<Arc<PartitionedQueue<O>>>,
    ) -> Self {
        let status = Arc::new(StageStatus::new(&stage.name, stage.parallelism));
        Self {
            stage,
            input,
            output,
            status,
        }
    }
}

impl<I: Send, O: Send> StageRunner for BoundStage<I, O> {
    fn status(&self) -> Arc<StageStatus> {
        self.status.clone()
    }

    fn run(self: Box<Self>, ctx: &StageContext) -> StageReport {
        let started = Instant::now();
        let name = self.stage.name.as_str();
        self.status.set_state(StageState::Running);
        log::debug!("Stage '{}' running with {} workers", name, self.stage.parallelism);

        let exits: Vec<WorkerExit> = thread::scope(|scope| {
            let handles: Vec<_> = (0..self.stage.parallelism)
                .map(|id| {
                    let worker = Worker {
                        id,
                        stage: name,
                        transform: &self.stage.transform,
                        latency: self.stage.latency,
                        input: self.input.as_ref(),
                        output: self.output.as_deref(),
                        status: &self.status,
                        ctx,
                    };
                    scope.spawn(move || {
                        let exit = panic::catch_unwind(AssertUnwindSafe(|| worker.run()));
                        exit.unwrap_or_else(|payload| {
                            let message = panic_message(payload.as_ref());
                            ctx.fail(name, id, TransformError::Panicked(message));
                            WorkerExit::Cancelled
                        })
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or(WorkerExit::Cancelled))
                .collect()
        });

        let drained = exits.iter().all(|exit| *exit == WorkerExit::Drained);
        let state = if drained {
            if let Some(output) = &self.output {
                output.mark_all_completed();
            }
            log::info!(
                "Stage '{}' completed: {} processed, {} emitted",
                name,
                self.status.processed(),
                self.status.emitted()
            );
            StageState::Completed
        } else {
            log::warn!("Stage '{}' cancelled after {} items", name, self.status.processed());
            StageState::Cancelled
        };
        self.status.set_state(state);

        StageReport::from_status(&self.status, started.elapsed())
    }
}
