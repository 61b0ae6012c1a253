// Tue Jan 13 2026 - Alex

use crate::engine::{PipelineOutcome, StageFailure, StageReport, StageState};
use crate::utils::{format_duration, pluralize};
use colored::*;

pub struct OutcomeDisplay {
    use_color: bool,
}

impl OutcomeDisplay {
    pub fn new() -> Self {
        Self { use_color: true }
    }

    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    pub fn print_outcome(&self, outcome: &PipelineOutcome) {
        println!();
        println!("{}", self.paint("Pipeline Summary".bold()));
        println!("{}", self.paint("-".repeat(64).cyan()));

        for stage in &outcome.report().stages {
            println!("{}", self.render_stage(stage));
        }
        if let Some(line) = self.render_slowest(outcome) {
            println!("{}", line);
        }
        println!();

        for failure in outcome.failures() {
            println!("{}", self.render_failure(failure));
        }

        println!("{}", self.render_headline(outcome));
    }

    pub fn render_stage(&self, stage: &StageReport) -> String {
        let state = format!("{:<9}", stage.state.name());
        let state = match stage.state {
            StageState::Completed => state.green(),
            StageState::Cancelled => state.red(),
            _ => state.yellow(),
        };

        format!(
            "  {:<12} {} workers={:<3} in={:<6} out={:<6} rate={:<10} {}",
            stage.name,
            self.paint(state),
            stage.workers,
            stage.processed,
            stage.emitted,
            format!("{:.1}/s", stage.throughput()),
            format_duration(stage.duration)
        )
    }

    /// Names the stage that held the run up longest. Skipped for an empty report.
    pub fn render_slowest(&self, outcome: &PipelineOutcome) -> Option<String> {
        let slowest = outcome.report().slowest_stage()?;
        Some(format!(
            "  Slowest stage: {} ({}, {:.1} items/s)",
            self.paint(slowest.name.as_str().bold()),
            format_duration(slowest.duration),
            slowest.throughput()
        ))
    }

    pub fn render_failure(&self, failure: &StageFailure) -> String {
        let marker = if failure.is_panic() {
            "[!]".magenta()
        } else {
            "[!]".red()
        };
        format!("{} {}", self.paint(marker), failure)
    }

    pub fn render_headline(&self, outcome: &PipelineOutcome) -> String {
        let report = outcome.report();
        match outcome {
            PipelineOutcome::Completed(_) => format!(
                "{} Delivered {} in {}",
                self.paint("[+]".green()),
                pluralize(report.delivered() as usize, "item", "items"),
                format_duration(report.total_duration)
            ),
            PipelineOutcome::Cancelled { reason, failures, .. } => format!(
                "{} Cancelled by {} after {} ({})",
                self.paint("[-]".yellow()),
                reason,
                pluralize(report.delivered() as usize, "item", "items"),
                pluralize(failures.len(), "failure", "failures")
            ),
        }
    }

    fn paint(&self, text: ColoredString) -> String {
        if self.use_color {
            text.to_string()
        } else {
            text.clear().to_string()
        }
    }
}

impl Default for OutcomeDisplay {
    fn default() -> Self {
        Self::new()
    }
}
