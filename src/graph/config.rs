//! Graph finalization settings.

/// What to do when one output is connected to several inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AutoBranchMode {
    /// Fan-out is a configuration error.
    #[default]
    Off,
    /// Insert a branch filter that forwards each frame to every target once
    /// all of them can accept it.
    Synced,
}

/// How connections are type-checked during finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TypeCheckMode {
    /// No checks, neither at setup nor per frame.
    Off,
    /// Strict check once at setup; no per-frame checks.
    #[default]
    Strict,
    /// Relaxed check at setup; every pushed frame is checked at runtime.
    Dynamic,
}

/// Settings applied by [`FilterGraph::setup_filters`](super::FilterGraph::setup_filters).
///
/// # Example
///
/// ```rust
/// use framegraph::graph::{AutoBranchMode, GraphConfig, TypeCheckMode};
///
/// let config = GraphConfig::default()
///     .with_auto_branch(AutoBranchMode::Synced)
///     .with_type_check(TypeCheckMode::Dynamic);
/// assert!(!config.discard_unconnected_outputs);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphConfig {
    /// Fan-out handling.
    pub auto_branch: AutoBranchMode,
    /// Attach a discard sink to every output left unconnected.
    pub discard_unconnected_outputs: bool,
    /// Connection type checking.
    pub type_check: TypeCheckMode,
}

impl GraphConfig {
    /// Set fan-out handling.
    pub fn with_auto_branch(mut self, mode: AutoBranchMode) -> Self {
        self.auto_branch = mode;
        self
    }

    /// Set whether unconnected outputs get a discard sink.
    pub fn with_discard_unconnected_outputs(mut self, discard: bool) -> Self {
        self.discard_unconnected_outputs = discard;
        self
    }

    /// Set the type check mode.
    pub fn with_type_check(mut self, mode: TypeCheckMode) -> Self {
        self.type_check = mode;
        self
    }
}
