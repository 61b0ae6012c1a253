// Tue Jan 13 2026 - Alex

use crate::config::PipelineConfig;
use crate::engine::cancel::{CancelHandle, CancelReason, CancellationToken};
use crate::engine::error::{PipelineResult, TransformError};
use crate::engine::queue::PartitionedQueue;
use crate::engine::result::{PipelineOutcome, PipelineReport, StageReport};
use crate::engine::stage::{BoundStage, Source, Stage, StageContext, StageRunner, StageState, StageStatus};
use crate::engine::worker::panic_message;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const SOURCE_STAGE: &str = "source";

/// An ordered chain of stages sharing one cancellation signal.
///
/// Built once through [`PipelineBuilder`] and consumed by [`Pipeline::run`].
pub struct Pipeline {
    config: PipelineConfig,
    stages: Vec<Box<dyn StageRunner>>,
    token: CancellationToken,
}

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineResult<PipelineBuilder> {
        PipelineBuilder::new(config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.token.handle()
    }

    /// Live status of every stage, source feeder first.
    pub fn stage_statuses(&self) -> Vec<Arc<StageStatus>> {
        self.stages.iter().map(|stage| stage.status()).collect()
    }

    /// Drives the feeder and every stage concurrently until each one reaches
    /// a terminal state.
    pub fn run(self) -> PipelineOutcome {
        let started = Instant::now();
        let ctx = StageContext::new(self.token.clone(), self.config.poll_interval());
        log::info!("Starting pipeline with {} stages", self.stages.len());

        let statuses = self.stage_statuses();
        let stages: Vec<StageReport> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .stages
                .into_iter()
                .map(|stage| {
                    let ctx = &ctx;
                    scope.spawn(move || run_guarded(stage, ctx))
                })
                .collect();

            handles
                .into_iter()
                .zip(&statuses)
                .map(|(handle, status)| {
                    handle
                        .join()
                        .unwrap_or_else(|_| StageReport::from_status(status, Duration::ZERO))
                })
                .collect()
        });

        let report = PipelineReport {
            stages,
            total_duration: started.elapsed(),
        };
        let failures = ctx.take_failures();

        if failures.is_empty() && report.all_completed() {
            log::info!(
                "Pipeline completed: {} items delivered in {:?}",
                report.delivered(),
                report.total_duration
            );
            return PipelineOutcome::Completed(report);
        }

        let reason = self.token.reason().unwrap_or(if failures.is_empty() {
            CancelReason::External
        } else {
            CancelReason::TransformFailure
        });
        log::warn!(
            "Pipeline cancelled ({}) with {} failures",
            reason,
            failures.len()
        );

        PipelineOutcome::Cancelled {
            reason,
            failures,
            report,
        }
    }
}

/// Runs one stage, turning a panic that escapes it into a recorded failure.
fn run_guarded(stage: Box<dyn StageRunner>, ctx: &StageContext) -> StageReport {
    let status = stage.status();
    let started = Instant::now();

    panic::catch_unwind(AssertUnwindSafe(|| stage.run(ctx))).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        ctx.fail(status.name(), 0, TransformError::Panicked(message));
        status.set_state(StageState::Cancelled);
        StageReport::from_status(&status, started.elapsed())
    })
}

pub struct PipelineBuilder {
    config: PipelineConfig,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Starts the chain with the feeder that pushes `items` into the first queue.
    pub fn source<T, It>(self, items: It) -> PipelineResult<StageChain<T>>
    where
        T: Send + 'static,
        It: IntoIterator<Item = T>,
        It::IntoIter: Send + 'static,
    {
        let queue = Arc::new(boundary_queue(&self.config)?);
        let feeder = Stage::transform(SOURCE_STAGE, self.config.feeder_parallelism, |item: T| Ok(item));
        let mut stages: Vec<Box<dyn StageRunner>> = Vec::new();
        stages.push(Box::new(BoundStage::new(
            feeder,
            Arc::new(Source::from_iter(items)),
            Some(queue.clone()),
        )));

        Ok(StageChain {
            config: self.config,
            stages,
            upstream: queue,
        })
    }
}

fn boundary_queue<T>(config: &PipelineConfig) -> PipelineResult<PartitionedQueue<T>> {
    PartitionedQueue::with_poll_interval(config.partitions, config.capacity, config.poll_interval())
}

/// A partially built pipeline whose last stage produces `T`.
pub struct StageChain<T> {
    config: PipelineConfig,
    stages: Vec<Box<dyn StageRunner>>,
    upstream: Arc<PartitionedQueue<T>>,
}

impl<T: Send + 'static> StageChain<T> {
    pub fn stage<O, F>(self, name: &str, parallelism: usize, f: F) -> PipelineResult<StageChain<O>>
    where
        O: Send + 'static,
        F: Fn(T) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        let latency = self.config.latency();
        self.stage_with(Stage::transform(name, parallelism, f).with_latency(latency))
    }

    pub fn stage_with<O: Send + 'static>(self, stage: Stage<T, O>) -> PipelineResult<StageChain<O>> {
        let queue = Arc::new(boundary_queue(&self.config)?);
        let mut stages = self.stages;
        stages.push(Box::new(BoundStage::new(stage, self.upstream, Some(queue.clone()))));

        Ok(StageChain {
            config: self.config,
            stages,
            upstream: queue,
        })
    }

    /// Closes the chain with a terminal stage whose results are discarded.
    pub fn sink<R, F>(self, name: &str, parallelism: usize, f: F) -> Pipeline
    where
        R: Send + 'static,
        F: Fn(T) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let latency = self.config.latency();
        self.sink_with(Stage::transform(name, parallelism, f).with_latency(latency))
    }

    pub fn sink_with<R: Send + 'static>(self, stage: Stage<T, R>) -> Pipeline {
        let mut stages = self.stages;
        stages.push(Box::new(BoundStage::new(stage, self.upstream, None)));

        Pipeline {
            config: self.config,
            stages,
            token: CancellationToken::new(),
        }
    }

    pub fn upstream(&self) -> &Arc<PartitionedQueue<T>> {
        &self.upstream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    fn config() -> PipelineConfig {
        PipelineConfig::new()
            .with_partitions(4)
            .with_capacity(5)
            .with_parallelism(4)
            .with_poll_interval(Duration::from_millis(5))
    }

    #[test]
    fn test_sample_scenario_delivers_every_item() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();

        let pipeline = Pipeline::builder(config())
            .unwrap()
            .source(0..20i64)
            .unwrap()
            .stage("scale", 4, |i: i64| Ok((i, i as f64 * 0.97)))
            .unwrap()
            .stage("format", 4, |(i, v): (i64, f64)| Ok((i, format!("--{}--", v))))
            .unwrap()
            .sink("collect", 4, move |item: (i64, String)| {
                sink.lock().push(item);
                Ok(())
            });
        assert_eq!(pipeline.stage_count(), 4);

        let outcome = pipeline.run();
        assert!(outcome.is_completed(), "unexpected outcome: {:?}", outcome);
        assert_eq!(outcome.report().fed(), 20);
        assert_eq!(outcome.report().delivered(), 20);

        let mut items = delivered.lock().clone();
        items.sort_by_key(|(i, _)| *i);
        assert_eq!(items.len(), 20);
        for (expected, (i, text)) in items.iter().enumerate() {
            assert_eq!(*i, expected as i64);
            assert_eq!(*text, format!("--{}--", *i as f64 * 0.97));
        }
    }

    #[test]
    fn test_single_partition_single_worker_keeps_order() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let config = config()
            .with_partitions(1)
            .with_capacity(2)
            .with_feeder_parallelism(1);

        let outcome = Pipeline::builder(config)
            .unwrap()
            .source(0..50u32)
            .unwrap()
            .stage("inc", 1, |x: u32| Ok(x + 1))
            .unwrap()
            .sink("collect", 1, move |x: u32| {
                sink.lock().push(x);
                Ok(())
            })
            .run();

        assert!(outcome.is_completed());
        assert_eq!(*delivered.lock(), (1..=50).collect::<Vec<u32>>());
    }

    #[test]
    fn test_empty_source_completes() {
        let outcome = Pipeline::builder(config())
            .unwrap()
            .source(Vec::<u32>::new())
            .unwrap()
            .stage("noop", 2, |x: u32| Ok(x))
            .unwrap()
            .sink("drop", 2, |_: u32| Ok(()))
            .run();

        assert!(outcome.is_completed());
        assert_eq!(outcome.report().delivered(), 0);
        assert!(outcome
            .report()
            .stages
            .iter()
            .all(|s| s.state == StageState::Completed));
    }

    #[test]
    fn test_configured_latency_is_paid_per_item() {
        let config = config().with_latency(Duration::from_millis(4));

        let outcome = Pipeline::builder(config)
            .unwrap()
            .source(0..12u32)
            .unwrap()
            .stage("work", 3, |x: u32| Ok(x))
            .unwrap()
            .sink("drop", 3, |_: u32| Ok(()))
            .run();

        assert!(outcome.is_completed());
        // 12 items over 3 workers at 4ms each.
        let floor = Duration::from_millis(12 * 4 / 3);
        for name in ["work", "drop"] {
            let stage = outcome.report().stage(name).unwrap();
            assert!(stage.duration >= floor, "{} took {:?}", name, stage.duration);
        }
        let source = outcome.report().stage(SOURCE_STAGE).unwrap();
        assert_eq!(source.processed, 12);
    }

    #[test]
    fn test_backpressure_bounds_every_queue() {
        let config = config().with_capacity(3).with_partitions(2);

        let chain = Pipeline::builder(config)
            .unwrap()
            .source(0..200u32)
            .unwrap();
        let queue = chain.upstream().clone();

        let outcome = chain
            .stage("fast", 4, |x: u32| Ok(x))
            .unwrap()
            .sink("slow", 1, |_: u32| {
                thread::sleep(Duration::from_micros(300));
                Ok(())
            })
            .run();

        assert!(outcome.is_completed());
        assert_eq!(outcome.report().delivered(), 200);

        for index in 0..queue.partition_count() {
            let peak = queue.peak_len(index).unwrap();
            assert!(peak <= 3, "partition {} peaked at {}", index, peak);
        }
        assert!(queue.is_fully_completed());
    }

    #[test]
    fn test_cancelled_before_start_delivers_nothing() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let sink = delivered.clone();

        let pipeline = Pipeline::builder(config())
            .unwrap()
            .source(0..20u32)
            .unwrap()
            .stage("noop", 2, |x: u32| Ok(x))
            .unwrap()
            .sink("count", 2, move |_: u32| {
                sink.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        pipeline.cancel_handle().request_cancellation();

        let outcome = pipeline.run();
        assert_eq!(outcome.reason(), Some(CancelReason::External));
        assert!(outcome.failures().is_empty());
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        assert!(outcome
            .report()
            .stages
            .iter()
            .all(|s| s.state == StageState::Cancelled));
    }

    #[test]
    fn test_external_cancellation_mid_run_terminates() {
        let pipeline = Pipeline::builder(config())
            .unwrap()
            .source(0u64..)
            .unwrap()
            .stage("noop", 2, |x: u64| Ok(x))
            .unwrap()
            .sink("slow", 2, |_: u64| {
                thread::sleep(Duration::from_millis(1));
                Ok(())
            });
        let handle = pipeline.cancel_handle();
        let statuses = pipeline.stage_statuses();

        let canceller = thread::spawn(move || {
            while statuses[2].processed() < 10 {
                thread::sleep(Duration::from_millis(1));
            }
            handle.request_cancellation();
        });

        let outcome = pipeline.run();
        canceller.join().unwrap();

        assert_eq!(outcome.reason(), Some(CancelReason::External));
        assert!(outcome.failures().is_empty());
        assert!(outcome.report().delivered() >= 10);
        assert!(outcome.report().stages.iter().all(|s| s.state.is_terminal()));
    }

    #[test]
    fn test_transform_failure_cancels_pipeline() {
        let outcome = Pipeline::builder(config())
            .unwrap()
            .source(0..100u32)
            .unwrap()
            .stage("validate", 2, |x: u32| {
                anyhow::ensure!(x != 42, "rejected {}", x);
                Ok(x)
            })
            .unwrap()
            .sink("drop", 2, |_: u32| Ok(()))
            .run();

        assert_eq!(outcome.reason(), Some(CancelReason::TransformFailure));
        assert_eq!(outcome.failures().len(), 1);
        let failure = &outcome.failures()[0];
        assert_eq!(failure.stage, "validate");
        assert!(failure.error.to_string().contains("rejected 42"));
        assert_eq!(
            outcome.report().stage("validate").map(|s| s.state),
            Some(StageState::Cancelled)
        );
    }

    #[test]
    fn test_concurrent_failures_in_two_stages_are_aggregated() {
        // Both failing workers must be mid-transform before either can fail.
        let barrier = Arc::new(Barrier::new(2));
        let first_gate = barrier.clone();
        let second_gate = barrier.clone();
        let config = config()
            .with_partitions(1)
            .with_capacity(1)
            .with_feeder_parallelism(1);

        let outcome = Pipeline::builder(config)
            .unwrap()
            .source(0..10u32)
            .unwrap()
            .stage("first", 1, move |x: u32| {
                if x == 1 {
                    first_gate.wait();
                    anyhow::bail!("first stage broke on {}", x);
                }
                Ok(x)
            })
            .unwrap()
            .sink("second", 1, move |x: u32| -> anyhow::Result<()> {
                if x == 0 {
                    second_gate.wait();
                    panic!("second stage broke on {}", x);
                }
                Ok(())
            })
            .run();

        assert_eq!(outcome.reason(), Some(CancelReason::TransformFailure));
        let stages: HashSet<&str> = outcome.failures().iter().map(|f| f.stage.as_str()).collect();
        assert_eq!(stages, HashSet::from(["first", "second"]));
        assert!(outcome
            .failures()
            .iter()
            .any(|f| matches!(&f.error, TransformError::Panicked(msg) if msg.contains("second stage"))));
        assert!(outcome.report().stages.iter().all(|s| s.state.is_terminal()));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        assert!(Pipeline::builder(config().with_capacity(0)).is_err());
    }
}
