//! Progress accounting for pan-dl
//!
//! Workers add to a shared atomic counter; a tracker task samples it once per
//! interval, reports throughput and detects completion.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Default sampling interval of the tracker
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// One tracker sample handed to progress callbacks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub downloaded: u64,
    pub total: u64,
    /// Throughput over the last interval
    pub bytes_per_sec: u64,
}

/// Progress callback function type
pub type ProgressCallback = Arc<dyn Fn(ProgressSample) + Send + Sync>;

/// Bytes written so far. Only ever grows.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    bytes: AtomicU64,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// One-shot completion flag that can be awaited
#[derive(Debug, Default)]
pub struct Completion {
    done: AtomicBool,
    notify: Notify,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark as complete. Returns `true` only for the first call.
    pub fn signal(&self) -> bool {
        let first = !self.done.swap(true, Ordering::AcqRel);
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }
}

/// Periodic sampler of a [`ProgressCounter`]
pub struct ProgressTracker {
    counter: Arc<ProgressCounter>,
    completion: Arc<Completion>,
    total: u64,
    interval: Duration,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub fn new(
        counter: Arc<ProgressCounter>,
        completion: Arc<Completion>,
        total: u64,
        interval: Duration,
        callback: Option<ProgressCallback>,
    ) -> Self {
        Self {
            counter,
            completion,
            total,
            interval,
            callback,
        }
    }

    /// Sample until the counter reaches the total, then signal completion
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut previous = 0u64;

        loop {
            ticker.tick().await;
            let current = self.counter.get();
            let sample = self.sample(current, previous);
            previous = current;

            if let Some(ref callback) = self.callback {
                callback(sample);
            }

            if current >= self.total {
                self.completion.signal();
                return;
            }
        }
    }

    fn sample(&self, current: u64, previous: u64) -> ProgressSample {
        let delta = current.saturating_sub(previous);
        let secs = self.interval.as_secs_f64();
        let bytes_per_sec = if secs > 0.0 { (delta as f64 / secs) as u64 } else { delta };
        ProgressSample {
            downloaded: current,
            total: self.total,
            bytes_per_sec,
        }
    }
}
