use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::rate::{RateEstimator, SAMPLE_INTERVAL};
use crate::scan::ScanTotals;

/// Counters shared between the pipeline and the sampling thread. Written
/// only by pipeline stages (single writer), read by the ticker and whoever
/// renders progress; all updates are monotonic increments, so plain relaxed
/// atomics are enough.
#[derive(Clone, Default)]
pub struct ProgressState {
    bytes_written: Arc<AtomicU64>,
    bytes_compressed: Arc<AtomicU64>,
    files_processed: Arc<AtomicU64>,
    current_file: Arc<Mutex<String>>,
}

/// Point-in-time copy of the counters, safe to hand to a renderer.
#[derive(Debug, Clone, Default)]
pub struct ProgressSnapshot {
    pub bytes_written: u64,
    pub bytes_compressed: u64,
    pub files_processed: u64,
    pub current_file: String,
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn written_counter(&self) -> Arc<AtomicU64> {
        self.bytes_written.clone()
    }

    pub(crate) fn compressed_counter(&self) -> Arc<AtomicU64> {
        self.bytes_compressed.clone()
    }

    pub(crate) fn set_current_file(&self, name: &str) {
        *self.current_file.lock().unwrap() = name.to_string();
    }

    pub(crate) fn inc_files(&self) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn bytes_compressed(&self) -> u64 {
        self.bytes_compressed.load(Ordering::Relaxed)
    }

    pub fn files_processed(&self) -> u64 {
        self.files_processed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_compressed: self.bytes_compressed.load(Ordering::Relaxed),
            files_processed: self.files_processed.load(Ordering::Relaxed),
            current_file: self.current_file.lock().unwrap().clone(),
        }
    }
}

/// Consumer of progress events. The core stays renderer-free: a terminal UI
/// implements `tick`, the non-interactive mode implements `entry`, tests can
/// implement both.
pub trait ProgressSink: Send + Sync {
    /// Called by the pipeline just before an entry is appended.
    fn entry(&self, _rel: &Path, _size: u64) {}

    /// Called from the sampling thread once per tick. `eta` is whole seconds
    /// remaining, `None` while the rate is still unknown.
    fn tick(&self, _snap: &ProgressSnapshot, _totals: &ScanTotals, _eta: Option<u64>) {}

    /// Called once after the pipeline stops, on success and on failure.
    fn finished(&self) {}
}

/// Background sampler overlapping the pipeline. Owns the rate estimator,
/// reads the shared counters on a fixed cadence and pushes snapshots into
/// the sink. Must be stopped explicitly on both success and failure paths;
/// `stop` joins the thread.
pub struct ProgressTicker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressTicker {
    pub fn start(state: ProgressState, totals: ScanTotals, sink: Arc<dyn ProgressSink>) -> Self {
        Self::with_interval(state, totals, sink, SAMPLE_INTERVAL)
    }

    pub fn with_interval(
        state: ProgressState,
        totals: ScanTotals,
        sink: Arc<dyn ProgressSink>,
        interval: Duration,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::spawn(move || {
            let mut rate = RateEstimator::new(interval);
            while flag.load(Ordering::Relaxed) {
                thread::sleep(interval);
                if !flag.load(Ordering::Relaxed) {
                    break;
                }
                let snap = state.snapshot();
                rate.sample(snap.bytes_written);
                let eta = rate.seconds_remaining(snap.bytes_written, totals.bytes);
                sink.tick(&snap, &totals, eta);
            }
        });
        Self { running, handle: Some(handle) }
    }

    pub fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        // backstop only; callers stop() explicitly
        self.running.store(false, Ordering::Relaxed);
    }
}
