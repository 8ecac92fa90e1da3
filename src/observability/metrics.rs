//! Metrics collection using metrics-rs.

use metrics::{Counter, Histogram, Unit, counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const FRAMES_ALLOCATED: &str = "framegraph_frames_allocated";
const FRAMES_RECYCLED: &str = "framegraph_frames_recycled";
const FRAMES_EVICTED: &str = "framegraph_frames_evicted";
const CACHE_BYTES: &str = "framegraph_cache_bytes";
const FILTER_STEPS: &str = "framegraph_filter_steps";
const PROCESS_TIME_NS: &str = "framegraph_process_time_ns";

/// Initialize metrics descriptions.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        FRAMES_ALLOCATED,
        Unit::Count,
        "Frames allocated by frame managers"
    );
    metrics::describe_counter!(
        FRAMES_RECYCLED,
        Unit::Count,
        "Frame requests served from a recycle cache"
    );
    metrics::describe_counter!(
        FRAMES_EVICTED,
        Unit::Count,
        "Cached frames evicted to stay within capacity"
    );
    metrics::describe_gauge!(CACHE_BYTES, Unit::Bytes, "Bytes held in the recycle cache");
    metrics::describe_counter!(FILTER_STEPS, Unit::Count, "Filter process steps executed");
    metrics::describe_histogram!(
        PROCESS_TIME_NS,
        Unit::Nanoseconds,
        "Time spent in a single filter process step"
    );
}

/// Record a fresh frame allocation.
#[inline]
pub fn record_frame_allocated(target: &'static str) {
    counter!(FRAMES_ALLOCATED, "target" => target).increment(1);
}

/// Record a frame request served from the cache.
#[inline]
pub fn record_frame_recycled(target: &'static str) {
    counter!(FRAMES_RECYCLED, "target" => target).increment(1);
}

/// Record a cache eviction.
#[inline]
pub fn record_frame_evicted() {
    counter!(FRAMES_EVICTED).increment(1);
}

/// Record the current cache size.
#[inline]
pub fn record_cache_bytes(bytes: usize) {
    gauge!(CACHE_BYTES).set(bytes as f64);
}

/// Metrics collector for one filter.
#[derive(Clone)]
pub struct FilterMetrics {
    filter: String,
    steps: Counter,
    process_time: Histogram,
}

impl FilterMetrics {
    /// Create a collector labelled with the filter name.
    pub fn new(filter: &str) -> Self {
        Self {
            filter: filter.to_string(),
            steps: counter!(FILTER_STEPS, "filter" => filter.to_string()),
            process_time: histogram!(PROCESS_TIME_NS, "filter" => filter.to_string()),
        }
    }

    /// Record one process step and its duration.
    #[inline]
    pub fn record_step(&self, duration: Duration) {
        self.steps.increment(1);
        self.process_time.record(duration.as_nanos() as f64);
    }

    /// Start a timer that records a step on drop.
    pub fn start_timer(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            metrics: self,
        }
    }

    /// Filter name.
    pub fn filter(&self) -> &str {
        &self.filter
    }
}

/// Guard that records a process step when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    metrics: &'a FilterMetrics,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.metrics.record_step(self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_is_idempotent() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_recording_without_recorder() {
        record_frame_allocated("native");
        record_frame_recycled("gpu");
        record_frame_evicted();
        record_cache_bytes(1024);
        let metrics = FilterMetrics::new("blur");
        {
            let _timer = metrics.start_timer();
        }
        assert_eq!(metrics.filter(), "blur");
    }
}
