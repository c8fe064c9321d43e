//! Sliding-window averaging of actuator samples.
//!
//! Duty samples arrive at the poll cadence (~10 Hz) and are noisy; rotor
//! visuals want a steady angular rate. The smoother keeps every sample
//! from the last `window` seconds and reports their arithmetic mean.

use std::collections::VecDeque;

/// Default averaging window in seconds.
pub const DEFAULT_WINDOW_SECS: f64 = 1.0;

/// One timestamped rate sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    /// Seconds on the controller clock
    pub timestamp: f64,
    pub rate: f64,
}

/// Time-windowed mean of rate samples.
///
/// Invariants: the queue is ordered by timestamp, and after every
/// `add_sample`/`purge` call no element is older than `window` relative to
/// the reference time of that call.
#[derive(Debug, Clone)]
pub struct TelemetrySmoother {
    samples: VecDeque<TelemetrySample>,
    window: f64,

    /// Running sum of `samples[..].rate`
    sum: f64,

    /// Mean as of the last mutation
    mean: f64,
}

impl Default for TelemetrySmoother {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECS)
    }
}

impl TelemetrySmoother {
    /// Creates a smoother with the given window in seconds.
    pub fn new(window: f64) -> Self {
        Self {
            samples: VecDeque::new(),
            window: window.max(0.0),
            sum: 0.0,
            mean: 0.0,
        }
    }

    /// Appends a sample, evicts everything older than `timestamp - window`
    /// and recomputes the mean.
    ///
    /// A timestamp earlier than the newest queued one is clamped up to it,
    /// keeping the queue ordered so that eviction only ever pops the front.
    pub fn add_sample(&mut self, rate: f64, timestamp: f64) {
        let timestamp = match self.samples.back() {
            Some(last) if timestamp < last.timestamp => last.timestamp,
            _ => timestamp,
        };

        self.samples.push_back(TelemetrySample { timestamp, rate });
        self.sum += rate;
        self.purge(timestamp);
    }

    /// Evicts samples older than `now - window` without adding one.
    ///
    /// Calling this on every frame lets the rate decay to zero once the
    /// samples stop arriving instead of freezing at the last value.
    pub fn purge(&mut self, now: f64) {
        while let Some(front) = self.samples.front() {
            if now - front.timestamp > self.window {
                self.sum -= front.rate;
                self.samples.pop_front();
            } else {
                break;
            }
        }

        if self.samples.is_empty() {
            // Drop accumulated rounding error with the last sample
            self.sum = 0.0;
            self.mean = 0.0;
        } else {
            self.mean = self.sum / self.samples.len() as f64;
        }
    }

    /// Mean of the queued samples as of the last mutation; 0 when empty.
    pub fn current_rate(&self) -> f64 {
        self.mean
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn window(&self) -> f64 {
        self.window
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.sum = 0.0;
        self.mean = 0.0;
    }
}
