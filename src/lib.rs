//! # Framegraph
//!
//! A dataflow engine for media processing: filters with typed ports are
//! wired into a graph, and a runner steps them until the stream ends.
//!
//! Frames carry their data in one of several backing stores (plain values,
//! native bytes, GPU textures, vertex buffers or serialized objects) and are
//! reference counted through a frame manager that can recycle released
//! storage.
//!
//! ## Features
//!
//! - **Typed frames**: element type, dimensions and target store, with
//!   compatibility checks when the graph is finalized or per frame
//! - **Frame recycling**: a byte-budgeted FIFO cache of released frames
//! - **Graph finalization**: automatic branching, discarding unconnected
//!   outputs, cycle detection and type checking
//! - **Runners**: a synchronous loop or a background worker, with
//!   round-robin, random or one-shot scheduling
//! - **Filter functions**: run a single filter as a function call
//!
//! ## Quick Start
//!
//! ```rust
//! use framegraph::prelude::*;
//! use framegraph::filters::{CallbackFilter, ObjectSource};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&seen);
//!
//! let mut graph = FilterGraph::new("quickstart");
//! let source = graph
//!     .add_filter_with_assignments("source", Box::new(ObjectSource::new()), "object=42")
//!     .unwrap();
//! let sink = graph
//!     .add_filter(
//!         "sink",
//!         Box::new(CallbackFilter::with_callback(move |frame: &Frame| {
//!             assert_eq!(frame.value()?, Value::Int(42));
//!             counter.fetch_add(1, Ordering::SeqCst);
//!             Ok(())
//!         })),
//!     )
//!     .unwrap();
//! graph.connect(source, "frame", sink, "frame").unwrap();
//!
//! let config = RunnerConfig::default().with_scheduler(SchedulerKind::OneShot);
//! let mut runner = SyncRunner::with_config(FilterContext::new(), config);
//! runner.set_graph(graph.into_shared()).unwrap();
//! assert_eq!(runner.run().unwrap(), RunStatus::Finished);
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod filter;
pub mod filters;
pub mod format;
pub mod frame;
pub mod function;
pub mod gpu;
pub mod graph;
pub mod memory;
pub mod observability;
pub mod port;
pub mod runner;
pub mod scheduler;
pub mod value;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::context::FilterContext;
    pub use crate::error::{Error, Result};
    pub use crate::filter::{Filter, FilterNode, FilterStatus, ProcessContext};
    pub use crate::format::{BaseType, FrameFormat, FrameTarget};
    pub use crate::frame::{Frame, Timestamp};
    pub use crate::function::FilterFunction;
    pub use crate::graph::{FilterGraph, FilterId, FilterRegistry, GraphConfig};
    pub use crate::memory::{CachedFrameManager, FrameManager, SimpleFrameManager};
    pub use crate::port::{FieldHandle, InputPort, OutputPort, PortSet};
    pub use crate::runner::{AsyncRunner, GraphRunner, RunStatus, RunnerConfig, SyncRunner};
    pub use crate::scheduler::SchedulerKind;
    pub use crate::value::{Value, ValueMap};
}

pub use error::{Error, Result};
