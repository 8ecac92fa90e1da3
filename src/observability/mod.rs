//! Observability: metrics and tracing.
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `framegraph_frames_allocated` | Counter | Frames allocated by managers |
//! | `framegraph_frames_recycled` | Counter | Requests served from the recycle cache |
//! | `framegraph_frames_evicted` | Counter | Cached frames evicted |
//! | `framegraph_cache_bytes` | Gauge | Bytes held in the recycle cache |
//! | `framegraph_filter_steps` | Counter | Filter process steps |
//! | `framegraph_process_time_ns` | Histogram | Time per process step |
//!
//! Recording is a no-op until a `metrics` recorder is installed.

mod metrics;
mod tracing_support;

pub use self::metrics::{
    FilterMetrics, TimerGuard, init_metrics, record_cache_bytes, record_frame_allocated,
    record_frame_evicted, record_frame_recycled,
};
pub use tracing_support::{TracingConfig, instrument_graph, span_filter, span_graph};
