// Tue Jan 13 2026 - Alex

use super::args::Args;
use crate::config::PipelineConfig;
use crate::engine::{CancelHandle, Pipeline, PipelineOutcome, PipelineResult, PipelineRunner, StageStatus};
use crate::ui::display::OutcomeDisplay;
use crate::ui::progress::ProgressManager;
use crate::utils::LoggingUtils;
use colored::Colorize;
use indicatif::ProgressBar;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const SCALE_FACTOR: f64 = 0.97;

pub struct CommandHandler {
    display: OutcomeDisplay,
}

impl CommandHandler {
    pub fn new() -> Self {
        Self {
            display: OutcomeDisplay::new(),
        }
    }

    /// Runs the demo pipeline and returns the process exit code.
    pub fn execute(&self, args: Args) -> anyhow::Result<i32> {
        LoggingUtils::init_logger(LoggingUtils::level_from_str(&args.log_level));
        args.validate().map_err(|e| anyhow::anyhow!(e))?;

        let config = Self::resolve_config(&args)?;
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("Resolved configuration:\n{}", config.to_json()?);
        }

        if !args.quiet {
            println!(
                "{} Feeding {} items through {} partitions of capacity {}",
                "[*]".blue(),
                args.items,
                config.partitions,
                config.capacity
            );
        }

        let progress = if args.no_progress || args.quiet {
            None
        } else {
            Some(ProgressManager::new())
        };
        let bar = progress
            .as_ref()
            .map(|p| p.create_main_progress(args.items, "delivering"));

        let pipeline = build_demo_pipeline(&config, args.items, {
            let bar = bar.clone();
            let quiet = args.quiet;
            move |line: String| {
                match &bar {
                    Some(bar) => {
                        bar.println(line);
                        bar.inc(1);
                    }
                    None if !quiet => println!("{}", line),
                    None => {}
                }
            }
        })?;

        let mut handle = PipelineRunner::spawn(pipeline)?;

        if let Some(ms) = args.cancel_after_ms {
            spawn_deadline(handle.cancel_handle(), Duration::from_millis(ms));
        }
        if args.interactive {
            if !args.quiet {
                println!("{} Type 'c' and press ENTER to cancel", "[*]".blue());
            }
            spawn_key_listener(handle.cancel_handle());
        }

        while handle.wait_timeout(Duration::from_millis(100)).is_none() {
            if let Some(bar) = &bar {
                bar.set_message(stage_summary(handle.stage_statuses()));
            }
        }

        let outcome = handle.wait()?;
        finish_bar(bar.as_ref(), &outcome);

        if !args.quiet {
            self.display.print_outcome(&outcome);
        }

        Ok(if outcome.failures().is_empty() { 0 } else { 1 })
    }

    fn resolve_config(args: &Args) -> anyhow::Result<PipelineConfig> {
        let mut config = match &args.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(partitions) = args.partitions {
            config.partitions = partitions;
        }
        if let Some(capacity) = args.capacity {
            config.capacity = capacity;
        }
        if let Some(parallelism) = args.parallelism {
            config.parallelism = parallelism;
        }
        if let Some(latency_ms) = args.latency_ms {
            config.latency_ms = latency_ms;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for CommandHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Integers are scaled, formatted as `--<value>--`, then handed to `emit`.
pub fn build_demo_pipeline<F>(config: &PipelineConfig, items: u64, emit: F) -> PipelineResult<Pipeline>
where
    F: Fn(String) + Send + Sync + 'static,
{
    Ok(Pipeline::builder(config.clone())?
        .source(0..items)?
        .stage("scale", config.parallelism, |i: u64| Ok(scale(i)))?
        .stage("format", config.parallelism, |v: f64| Ok(format!("--{}--", v)))?
        .sink("print", config.parallelism, move |text: String| {
            emit(format!("Final result {} on {:?}", text, thread::current().id()));
            Ok(())
        }))
}

/// Scaled value kept at two decimals so it prints as `0`, `0.97`, `1.94`.
fn scale(i: u64) -> f64 {
    (i as f64 * SCALE_FACTOR * 100.0).round() / 100.0
}

fn spawn_deadline(cancel: CancelHandle, after: Duration) {
    thread::spawn(move || {
        thread::sleep(after);
        if !cancel.is_cancelled() {
            log::info!("Deadline of {:?} reached", after);
            cancel.request_cancellation();
        }
    });
}

fn spawn_key_listener(cancel: CancelHandle) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) if line.trim_start().starts_with('c') => {
                    cancel.request_cancellation();
                    break;
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    });
}

fn stage_summary(statuses: &[Arc<StageStatus>]) -> String {
    statuses
        .iter()
        .map(|s| format!("{}:{}", s.name(), s.state().name()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn finish_bar(bar: Option<&ProgressBar>, outcome: &PipelineOutcome) {
    if let Some(bar) = bar {
        match outcome {
            PipelineOutcome::Completed(_) => bar.finish_with_message("complete"),
            PipelineOutcome::Cancelled { reason, .. } => {
                bar.abandon_with_message(format!("cancelled ({})", reason))
            }
        }
    }
}
