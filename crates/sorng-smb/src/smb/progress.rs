//! Progress reporting for transfers.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// One progress notification. `done` / `total` count bytes for file
/// transfers; `item` names the file currently moving.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub done: u64,
    pub total: Option<u64>,
    pub item: String,
    pub percent: f32,
    pub speed_bps: u64,
    pub eta_seconds: Option<u32>,
}

/// Receiver of progress updates. Called on the operation's task between
/// chunks, so implementations should return quickly.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, update: &ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressUpdate) + Send + Sync,
{
    fn on_progress(&self, update: &ProgressUpdate) {
        self(update)
    }
}

/// Turns raw byte counts into `ProgressUpdate`s with speed and ETA.
pub struct ProgressTracker<'a> {
    sink: Option<&'a dyn ProgressSink>,
    item: String,
    total: Option<u64>,
    /// Bytes already present when this attempt started (resume offset);
    /// excluded from the speed calculation.
    baseline: u64,
    started: Instant,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(
        sink: Option<&'a dyn ProgressSink>,
        item: impl Into<String>,
        total: Option<u64>,
        baseline: u64,
    ) -> Self {
        Self {
            sink,
            item: item.into(),
            total,
            baseline,
            started: Instant::now(),
        }
    }

    pub fn snapshot(&self, done: u64) -> ProgressUpdate {
        let elapsed = self.started.elapsed().as_secs_f64().max(0.001);
        let speed = (done.saturating_sub(self.baseline) as f64 / elapsed) as u64;
        let eta = match self.total {
            Some(t) if speed > 0 => Some((t.saturating_sub(done) / speed) as u32),
            _ => None,
        };
        let percent = self
            .total
            .map(|t| {
                if t > 0 {
                    (done as f64 / t as f64 * 100.0).min(100.0) as f32
                } else {
                    100.0
                }
            })
            .unwrap_or(0.0);
        ProgressUpdate {
            done,
            total: self.total,
            item: self.item.clone(),
            percent,
            speed_bps: speed,
            eta_seconds: eta,
        }
    }

    pub fn report(&self, done: u64) {
        if let Some(sink) = self.sink {
            sink.on_progress(&self.snapshot(done));
        }
    }
}
