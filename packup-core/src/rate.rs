use std::collections::VecDeque;
use std::time::Duration;

/// Cadence at which the ticker samples the byte counters.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(1000);

/// Raw per-tick deltas are pre-smoothed over this many samples.
const SMOOTHING_CAPACITY: usize = 1000;
/// The reported rate is the mean over this many smoothed samples.
const RATE_CAPACITY: usize = 10;

/// Fixed-capacity FIFO sample store; oldest sample evicted on overflow.
#[derive(Debug)]
struct Ring {
    buf: VecDeque<f64>,
    cap: usize,
}

impl Ring {
    fn new(cap: usize) -> Self {
        Self { buf: VecDeque::with_capacity(cap.min(64)), cap }
    }

    fn push(&mut self, v: f64) {
        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(v);
    }

    fn mean(&self) -> Option<f64> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf.iter().sum::<f64>() / self.buf.len() as f64)
        }
    }

    fn len(&self) -> usize {
        self.buf.len()
    }
}

/// Sliding-window throughput estimator. Fed the cumulative byte count on a
/// fixed cadence; each delta goes through a large smoothing ring whose
/// running mean is in turn pushed into a small rate ring, which keeps the
/// reported rate stable against bursty writes.
#[derive(Debug)]
pub struct RateEstimator {
    prev_bytes: u64,
    interval: Duration,
    smoothing: Ring,
    rates: Ring,
}

impl RateEstimator {
    pub fn new(interval: Duration) -> Self {
        Self {
            prev_bytes: 0,
            interval,
            smoothing: Ring::new(SMOOTHING_CAPACITY),
            rates: Ring::new(RATE_CAPACITY),
        }
    }

    /// Record one tick's cumulative byte count.
    pub fn sample(&mut self, bytes_now: u64) {
        let delta = bytes_now.saturating_sub(self.prev_bytes);
        self.smoothing.push(delta as f64);
        if let Some(mean) = self.smoothing.mean() {
            self.rates.push(mean);
        }
        self.prev_bytes = bytes_now;
    }

    /// Smoothed throughput. `None` until the first sample arrives, or while
    /// nothing has flowed yet (no ETA can be derived from a zero rate).
    pub fn bytes_per_sec(&self) -> Option<f64> {
        let per_tick = self.rates.mean()?;
        let rate = per_tick / self.interval.as_secs_f64();
        (rate > 0.0).then_some(rate)
    }

    /// Whole seconds until `total` bytes have been observed, by the current
    /// rate. The numerator saturates at 1 so the estimate never reaches zero
    /// before the stream actually ends.
    pub fn seconds_remaining(&self, bytes_now: u64, total: u64) -> Option<u64> {
        let rate = self.bytes_per_sec()?;
        let remaining = total.saturating_sub(bytes_now).max(1);
        Some((remaining as f64 / rate).ceil() as u64)
    }
}

/// `HH:MM:SS` with the hour component dropped when zero: 45 s renders as
/// `00:45`, one hour exactly as `01:00:00`.
pub fn format_eta(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
