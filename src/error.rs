//! Error types for framegraph.
//!
//! Every fallible engine call returns [`Result`]. Configuration errors,
//! runtime contract violations and resource errors are returned immediately
//! and never retried by the engine. Only errors raised inside a filter's
//! `process` body are caught by a runner and turned into
//! [`Error::FilterFailed`].

use thiserror::Error;

/// Result type alias using framegraph's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for framegraph operations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ------------------------------------------------------------------
    // Configuration errors
    // ------------------------------------------------------------------
    /// A filter has no port with the given name.
    #[error("filter '{filter}' has no {direction} port named '{port}'")]
    UnknownPort {
        /// Owning filter.
        filter: String,
        /// Requested port name.
        port: String,
        /// "input" or "output".
        direction: &'static str,
    },

    /// No filter with the given name or id exists in the graph.
    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    /// A filter name is already taken in the graph.
    #[error("graph already contains a filter named '{0}'")]
    DuplicateFilter(String),

    /// The port was already connected.
    #[error("port {0} is already connected")]
    AlreadyConnected(String),

    /// A filter referenced by a connection is not part of the graph.
    #[error("attempting to connect filter '{0}' which is not in the graph")]
    NotInGraph(String),

    /// Format check failed during graph finalization.
    #[error("type mismatch on {port}: source format {source_format} does not match {expected}")]
    TypeMismatch {
        /// Input port description.
        port: String,
        /// The resolved upstream format.
        source_format: String,
        /// The port's declared format mask.
        expected: String,
    },

    /// The graph could not be fully visited (cycle or disconnected dependency).
    #[error("malformed graph: {0}")]
    MalformedGraph(String),

    /// An output port was pre-connected to several inputs while branching is off.
    #[error("output {0} is connected to multiple inputs but auto-branching is disabled")]
    BranchingDisabled(String),

    /// A filter did not provide an output format for an input-based output.
    #[error("filter did not return an output format for {0}")]
    MissingOutputFormat(String),

    /// An assignment string could not be parsed.
    #[error("invalid assignment: {0}")]
    InvalidAssignment(String),

    /// The filter registry has no constructor for the given key.
    #[error("unknown filter kind: {0}")]
    UnknownFilterKind(String),

    /// An operation was attempted in a state that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    // ------------------------------------------------------------------
    // Runtime contract violations
    // ------------------------------------------------------------------
    /// Frame operation on a closed port.
    #[error("port {0} is closed")]
    PortClosed(String),

    /// A one-shot port still holds an unconsumed frame.
    #[error("attempting to push more than one frame on port {0}")]
    PortOccupied(String),

    /// Pull on a port without a frame.
    #[error("no frame available to pull on port {0}")]
    NoFrameAvailable(String),

    /// Mutation of a read-only frame.
    #[error("attempting to modify read-only frame {0}")]
    ReadOnlyFrame(String),

    /// Release called more often than retain.
    #[error("frame reference count dropped below 0 for {0}")]
    RefCountUnderflow(String),

    /// GPU frame accessed while its environment is not current on this thread.
    #[error("GPU environment {0} is not current on this thread")]
    GpuContextNotCurrent(u64),

    /// GPU environment activated while it is current on another thread.
    #[error("GPU environment {0} is active on another thread")]
    GpuContextBusy(u64),

    /// A final port was modified after initialization or more than once.
    #[error("attempting to modify final port {0}")]
    FinalPortModified(String),

    /// Push on an output port that has no target.
    #[error("attempting to push frame on unconnected port {0}")]
    UnconnectedPort(String),

    /// Write larger than a fixed-capacity store.
    #[error("data of {requested} bytes exceeds frame capacity of {capacity} bytes")]
    CapacityExceeded {
        /// Bytes the caller tried to write.
        requested: usize,
        /// Fixed capacity of the store.
        capacity: usize,
    },

    /// The store cannot hold the given value type.
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    /// The store does not support the operation (e.g. vertex read-back).
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A frame's format does not satisfy a port or copy requirement.
    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    /// Access to a frame whose backing storage has been released.
    #[error("frame {0} has no backing storage")]
    FrameReleased(String),

    // ------------------------------------------------------------------
    // Resource errors
    // ------------------------------------------------------------------
    /// Backing storage could not be allocated.
    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    /// GPU backend failure.
    #[error("GPU resource error in {operation}: {message}")]
    GpuResource {
        /// Backend operation name.
        operation: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// rkyv serialization or validation failure.
    #[error("serialization failed: {0}")]
    Serialization(String),

    // ------------------------------------------------------------------
    // Execution errors
    // ------------------------------------------------------------------
    /// A filter's process body failed; recorded by the runner.
    #[error("there was an error executing filter '{filter}': {source}")]
    FilterFailed {
        /// Name of the failing filter.
        filter: String,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Whether this error came out of a filter's process body.
    pub fn is_execution_error(&self) -> bool {
        matches!(self, Error::FilterFailed { .. })
    }

    pub(crate) fn unknown_input(filter: &str, port: &str) -> Self {
        Error::UnknownPort {
            filter: filter.to_string(),
            port: port.to_string(),
            direction: "input",
        }
    }

    pub(crate) fn unknown_output(filter: &str, port: &str) -> Self {
        Error::UnknownPort {
            filter: filter.to_string(),
            port: port.to_string(),
            direction: "output",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_failed_wraps_source() {
        let err = Error::FilterFailed {
            filter: "blur".into(),
            source: Box::new(Error::NoFrameAvailable("blur.in".into())),
        };
        assert!(err.is_execution_error());
        assert!(err.to_string().contains("blur.in"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_unknown_port_message() {
        let err = Error::unknown_output("src", "video");
        assert_eq!(
            err.to_string(),
            "filter 'src' has no output port named 'video'"
        );
    }
}
