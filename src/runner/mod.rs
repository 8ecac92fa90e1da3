//! Graph runners: drive a graph's filters until nothing can run.
//!
//! [`SyncRunner`] executes the run loop on the calling thread.
//! [`AsyncRunner`] moves the same loop onto a background worker thread and
//! reports completion through a callback or a channel.
//!
//! # Example
//!
//! ```rust
//! use framegraph::context::FilterContext;
//! use framegraph::filters::{NullFilter, ObjectSource};
//! use framegraph::graph::FilterGraph;
//! use framegraph::runner::{GraphRunner, RunStatus, RunnerConfig, SyncRunner};
//! use framegraph::scheduler::SchedulerKind;
//!
//! let mut graph = FilterGraph::new("once");
//! let source = graph
//!     .add_filter_with_assignments("source", Box::new(ObjectSource::new()), "object=7")
//!     .unwrap();
//! let sink = graph.add_filter("sink", Box::new(NullFilter::new())).unwrap();
//! graph.connect(source, "frame", sink, "frame").unwrap();
//!
//! let config = RunnerConfig::default().with_scheduler(SchedulerKind::OneShot);
//! let mut runner = SyncRunner::with_config(FilterContext::new(), config);
//! runner.set_graph(graph.into_shared()).unwrap();
//! assert_eq!(runner.run().unwrap(), RunStatus::Finished);
//! ```

mod background;
mod sync;
mod wake;

pub use background::AsyncRunner;
pub use sync::SyncRunner;

use crate::context::FilterContext;
use crate::error::{Error, Result};
use crate::graph::SharedGraph;
use crate::observability::TracingConfig;
use crate::scheduler::SchedulerKind;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

// ============================================================================
// Status
// ============================================================================

/// Outcome of a step or a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    /// A filter was processed; more work may follow.
    Running,
    /// Nothing can run until a sleeping filter wakes.
    Sleeping,
    /// Filters are still open but none can run.
    Blocked,
    /// Every filter has closed.
    Finished,
    /// The run was stopped on request.
    Stopped,
    /// A filter failed.
    Error,
    /// No run has completed yet.
    Unknown,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Running => "running",
            RunStatus::Sleeping => "sleeping",
            RunStatus::Blocked => "blocked",
            RunStatus::Finished => "finished",
            RunStatus::Stopped => "stopped",
            RunStatus::Error => "error",
            RunStatus::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Invoked with the terminal status when a run ends.
pub type DoneCallback = Arc<dyn Fn(RunStatus) + Send + Sync>;

// ============================================================================
// Run control
// ============================================================================

/// Lifecycle of a run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    /// The loop is executing.
    Running = 0,
    /// A stop was requested; the loop exits at the next scheduling boundary.
    StopRequested = 1,
    /// No loop is executing.
    Stopped = 2,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RunState::Running,
            1 => RunState::StopRequested,
            _ => RunState::Stopped,
        }
    }
}

/// Three-state flag shared between a run loop and its controllers.
#[derive(Debug)]
pub struct RunControl {
    state: AtomicU8,
}

impl RunControl {
    /// Create a control in the stopped state.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(RunState::Stopped as u8),
        }
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move from stopped to running. Fails if a loop is already active.
    pub fn start(&self) -> Result<()> {
        self.state
            .compare_exchange(
                RunState::Stopped as u8,
                RunState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(drop)
            .map_err(|_| Error::InvalidState("runner is already running".into()))
    }

    /// Ask a running loop to stop. Returns whether a stop was requested.
    pub fn request_stop(&self) -> bool {
        self.state
            .compare_exchange(
                RunState::Running as u8,
                RunState::StopRequested as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Mark the loop as exited.
    pub fn finish(&self) {
        self.state.store(RunState::Stopped as u8, Ordering::Release);
    }

    /// Whether a loop is active (running or stopping).
    pub fn is_running(&self) -> bool {
        self.state() != RunState::Stopped
    }

    /// Whether a stop has been requested.
    pub fn stop_requested(&self) -> bool {
        self.state() == RunState::StopRequested
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Settings shared by both runners.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Scheduling policy.
    pub scheduler: SchedulerKind,
    /// Thread name of the background worker.
    pub worker_name: String,
    /// Span settings.
    pub tracing: TracingConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::default(),
            worker_name: "framegraph-runner".to_string(),
            tracing: TracingConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Set the scheduling policy.
    pub fn with_scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Set the worker thread name.
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    /// Set the span settings.
    pub fn with_tracing(mut self, tracing: TracingConfig) -> Self {
        self.tracing = tracing;
        self
    }
}

// ============================================================================
// GraphRunner Trait
// ============================================================================

/// Common control surface of the runners.
pub trait GraphRunner {
    /// The context filters run in.
    fn context(&self) -> &FilterContext;

    /// Set the graph to run. Fails while a run is active.
    fn set_graph(&mut self, graph: SharedGraph) -> Result<()>;

    /// The graph to run.
    fn graph(&self) -> Option<SharedGraph>;

    /// Run the graph.
    ///
    /// The synchronous runner returns the terminal status; the asynchronous
    /// runner returns [`RunStatus::Running`] once the worker has started.
    fn run(&mut self) -> Result<RunStatus>;

    /// Whether a run is active.
    fn is_running(&self) -> bool;

    /// Ask the active run to stop at the next scheduling boundary.
    fn stop(&mut self);

    /// Close every filter of the graph. Fails while a run is active.
    fn close(&mut self) -> Result<()>;

    /// Set the callback invoked when a run ends.
    fn set_done_callback(&mut self, callback: Option<DoneCallback>);

    /// Error of the last failed run.
    fn error(&self) -> Option<Error>;
}
