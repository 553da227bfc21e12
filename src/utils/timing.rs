//! Stage timing for a pipeline run.

use log::{debug, info};
use std::time::{Duration, Instant};

/// Measures one operation and the stages inside it.
#[derive(Debug)]
pub struct Timer {
    start_time: Instant,
    operation_name: String,
    checkpoints: Vec<(String, Instant)>,
}

impl Timer {
    pub fn start(operation_name: &str) -> Self {
        debug!("Starting timer for: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name: operation_name.to_string(),
            checkpoints: Vec::new(),
        }
    }

    /// Marks the end of a stage.
    pub fn checkpoint(&mut self, checkpoint_name: &str) {
        let now = Instant::now();
        debug!(
            "{} - {}: {}ms",
            self.operation_name,
            checkpoint_name,
            now.duration_since(self.start_time).as_millis()
        );
        self.checkpoints.push((checkpoint_name.to_string(), now));
    }

    /// Durations of each stage, in the order they were marked.
    pub fn segments(&self) -> Vec<(String, Duration)> {
        let mut last = self.start_time;
        self.checkpoints
            .iter()
            .map(|(name, time)| {
                let segment = time.duration_since(last);
                last = *time;
                (name.clone(), segment)
            })
            .collect()
    }

    /// Logs the total and every stage, returning the total.
    pub fn finish(self) -> Duration {
        let total_duration = self.start_time.elapsed();
        if self.checkpoints.is_empty() {
            info!("{} completed in {}ms", self.operation_name, total_duration.as_millis());
        } else {
            info!(
                "{} completed in {}ms with checkpoints:",
                self.operation_name,
                total_duration.as_millis()
            );
            for (name, segment) in self.segments() {
                info!("   └─ {}: {}ms", name, segment.as_millis());
            }
        }
        total_duration
    }
}
