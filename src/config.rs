// Tue Jan 13 2026 - Alex

use crate::engine::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Partitions per stage boundary queue.
    pub partitions: usize,
    /// Items each partition holds before producers block.
    pub capacity: usize,
    /// Workers per stage unless a stage says otherwise.
    pub parallelism: usize,
    pub feeder_parallelism: usize,
    /// Upper bound on how long a blocked worker sleeps between checks.
    pub poll_interval_ms: u64,
    /// Simulated per-item work applied to every stage.
    pub latency_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            partitions: 4,
            capacity: 5,
            parallelism: num_cpus::get(),
            feeder_parallelism: 4,
            poll_interval_ms: 50,
            latency_ms: 0,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_feeder_parallelism(mut self, parallelism: usize) -> Self {
        self.feeder_parallelism = parallelism;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = latency.as_millis() as u64;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.partitions == 0 {
            return Err(invalid("partitions must be greater than 0"));
        }
        if self.capacity == 0 {
            return Err(invalid("capacity must be greater than 0"));
        }
        if self.parallelism == 0 {
            return Err(invalid("parallelism must be greater than 0"));
        }
        if self.feeder_parallelism == 0 {
            return Err(invalid("feeder_parallelism must be greater than 0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms must be greater than 0"));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> PipelineResult<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> PipelineResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn to_json(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn invalid(message: &str) -> PipelineError {
    PipelineError::InvalidConfig(message.to_string())
}
