// Tue Jan 13 2026 - Alex

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bounded-pipeline")]
#[command(author = "Alex")]
#[command(version = "1.0.0")]
#[command(about = "Bounded multi-stage pipeline runner", long_about = None)]
pub struct Args {
    /// JSON pipeline configuration; flags below override it.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short = 'n', long, default_value = "20")]
    pub items: u64,

    #[arg(long)]
    pub partitions: Option<usize>,

    #[arg(long)]
    pub capacity: Option<usize>,

    #[arg(short, long)]
    pub parallelism: Option<usize>,

    #[arg(long)]
    pub latency_ms: Option<u64>,

    /// Request cancellation after this many milliseconds.
    #[arg(long)]
    pub cancel_after_ms: Option<u64>,

    /// Read stdin while running; a line starting with 'c' cancels the run.
    #[arg(short, long)]
    pub interactive: bool,

    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    #[arg(short, long)]
    pub quiet: bool,

    #[arg(long)]
    pub no_progress: bool,
}

impl Args {
    pub fn validate(&self) -> Result<(), String> {
        if self.partitions == Some(0) {
            return Err("--partitions must be greater than 0".to_string());
        }
        if self.capacity == Some(0) {
            return Err("--capacity must be greater than 0".to_string());
        }
        if self.parallelism == Some(0) {
            return Err("--parallelism must be greater than 0".to_string());
        }
        Ok(())
    }
}
