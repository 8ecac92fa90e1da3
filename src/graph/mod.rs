//! Filter graphs: construction and finalization.
//!
//! A [`FilterGraph`] owns its filters. Connections are recorded as
//! pre-connections first and resolved into port links by
//! [`FilterGraph::setup_filters`], which also inserts discard sinks and
//! branch filters and type-checks every connection.
//!
//! # Example
//!
//! ```rust
//! use framegraph::filters::{NullFilter, ObjectSource};
//! use framegraph::graph::FilterGraph;
//!
//! let mut graph = FilterGraph::new("example");
//! let source = graph
//!     .add_filter_with_assignments("source", Box::new(ObjectSource::new()), "object=3")
//!     .unwrap();
//! let sink = graph.add_filter("sink", Box::new(NullFilter::new())).unwrap();
//! graph.connect(source, "frame", sink, "frame").unwrap();
//! graph.setup_filters().unwrap();
//! assert_eq!(graph.connections().len(), 1);
//! ```

mod config;
mod parser;
mod registry;

pub use config::{AutoBranchMode, GraphConfig, TypeCheckMode};
pub use parser::parse_assignments;
pub use registry::{FilterConstructor, FilterRegistry};

use crate::context::FilterContext;
use crate::error::{Error, Result};
use crate::filter::{Filter, FilterNode};
use crate::filters::{FrameBranch, NullFilter};
use crate::value::ValueMap;
use daggy::Dag;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A graph shared between a context and its runners.
pub type SharedGraph = Arc<Mutex<FilterGraph>>;

// ============================================================================
// Identifiers
// ============================================================================

/// Index of a filter within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(usize);

impl FilterId {
    /// Position in insertion order.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A named port on a filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRef {
    /// Owning filter.
    pub filter: FilterId,
    /// Port name.
    pub port: String,
}

impl PortRef {
    fn new(filter: FilterId, port: impl Into<String>) -> Self {
        Self {
            filter,
            port: port.into(),
        }
    }
}

/// A resolved output-to-input link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Output side.
    pub source: PortRef,
    /// Input side.
    pub target: PortRef,
}

// ============================================================================
// FilterGraph
// ============================================================================

/// An owned set of filters and their connections.
pub struct FilterGraph {
    name: String,
    nodes: Vec<FilterNode>,
    names: HashMap<String, FilterId>,
    preconnections: Vec<(PortRef, Vec<PortRef>)>,
    connections: Vec<Connection>,
    config: GraphConfig,
    is_ready: bool,
    branch_count: usize,
    discard_count: usize,
}

impl FilterGraph {
    /// Create an empty graph.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            names: HashMap::new(),
            preconnections: Vec::new(),
            connections: Vec::new(),
            config: GraphConfig::default(),
            is_ready: false,
            branch_count: 0,
            discard_count: 0,
        }
    }

    /// Create an empty graph with the given settings.
    pub fn with_config(name: impl Into<String>, config: GraphConfig) -> Self {
        Self {
            config,
            ..Self::new(name)
        }
    }

    /// Graph name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finalization settings.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Replace the finalization settings; takes effect at the next setup.
    pub fn set_config(&mut self, config: GraphConfig) {
        self.config = config;
        self.is_ready = false;
    }

    /// Whether [`setup_filters`](Self::setup_filters) has completed since the
    /// last structural change.
    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    /// Number of filters.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no filters.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------

    /// Add a filter with no initial values.
    pub fn add_filter(&mut self, name: &str, filter: Box<dyn Filter>) -> Result<FilterId> {
        self.add_filter_with_values(name, filter, &ValueMap::new())
    }

    /// Add a filter and assign initial port values.
    pub fn add_filter_with_values(
        &mut self,
        name: &str,
        filter: Box<dyn Filter>,
        values: &ValueMap,
    ) -> Result<FilterId> {
        if self.names.contains_key(name) {
            return Err(Error::DuplicateFilter(name.to_string()));
        }
        let node = FilterNode::new(name, filter, values)?;
        self.add_node(node)
    }

    /// Add a filter with values given as `key=value; ...`.
    pub fn add_filter_with_assignments(
        &mut self,
        name: &str,
        filter: Box<dyn Filter>,
        assignments: &str,
    ) -> Result<FilterId> {
        let values = parse_assignments(assignments)?;
        self.add_filter_with_values(name, filter, &values)
    }

    /// Construct a filter of a registered `kind` and add it.
    pub fn add_registered(
        &mut self,
        registry: &FilterRegistry,
        kind: &str,
        name: &str,
        values: &ValueMap,
    ) -> Result<FilterId> {
        let filter = registry.create(kind, values)?;
        self.add_filter_with_values(name, filter, values)
    }

    /// Add an already initialized node.
    pub fn add_node(&mut self, node: FilterNode) -> Result<FilterId> {
        if self.names.contains_key(node.name()) {
            return Err(Error::DuplicateFilter(node.name().to_string()));
        }
        let id = FilterId(self.nodes.len());
        self.names.insert(node.name().to_string(), id);
        tracing::debug!(graph = %self.name, filter = %node.name(), %id, "added filter");
        self.nodes.push(node);
        self.is_ready = false;
        Ok(id)
    }

    /// Look up a filter by id.
    pub fn filter(&self, id: FilterId) -> Option<&FilterNode> {
        self.nodes.get(id.0)
    }

    /// Look up a filter by id, mutably.
    pub fn filter_mut(&mut self, id: FilterId) -> Option<&mut FilterNode> {
        self.nodes.get_mut(id.0)
    }

    /// Look up a filter by name.
    pub fn filter_by_name(&self, name: &str) -> Option<&FilterNode> {
        self.filter_id(name).and_then(|id| self.filter(id))
    }

    /// Id of the filter called `name`.
    pub fn filter_id(&self, name: &str) -> Option<FilterId> {
        self.names.get(name).copied()
    }

    /// All filter ids in insertion order.
    pub fn filter_ids(&self) -> Vec<FilterId> {
        (0..self.nodes.len()).map(FilterId).collect()
    }

    /// All filters with their ids.
    pub fn filters(&self) -> impl Iterator<Item = (FilterId, &FilterNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (FilterId(i), n))
    }

    fn node(&self, id: FilterId) -> Result<&FilterNode> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::NotInGraph(id.to_string()))
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Record a connection from `source.output` to `target.input`.
    ///
    /// The ports are linked by [`setup_filters`](Self::setup_filters). One
    /// output may be recorded against several inputs; each input at most once.
    pub fn connect(
        &mut self,
        source: FilterId,
        output: &str,
        target: FilterId,
        input: &str,
    ) -> Result<()> {
        self.node(source)?.output(output)?;
        let input_port = self.node(target)?.input(input)?;

        let target_ref = PortRef::new(target, input);
        let preconnected = self
            .preconnections
            .iter()
            .any(|(_, targets)| targets.contains(&target_ref));
        if input_port.is_connected() || preconnected {
            return Err(Error::AlreadyConnected(input_port.describe()));
        }

        let source_ref = PortRef::new(source, output);
        match self.preconnections.iter_mut().find(|(s, _)| *s == source_ref) {
            Some((_, targets)) => targets.push(target_ref),
            None => self.preconnections.push((source_ref, vec![target_ref])),
        }
        self.is_ready = false;
        Ok(())
    }

    /// [`connect`](Self::connect) using filter names.
    pub fn connect_by_name(
        &mut self,
        source: &str,
        output: &str,
        target: &str,
        input: &str,
    ) -> Result<()> {
        let source_id = self
            .filter_id(source)
            .ok_or_else(|| Error::NotInGraph(source.to_string()))?;
        let target_id = self
            .filter_id(target)
            .ok_or_else(|| Error::NotInGraph(target.to_string()))?;
        self.connect(source_id, output, target_id, input)
    }

    /// Resolved connections, in the order they were linked.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    fn is_preconnected(&self, port: &PortRef) -> bool {
        self.preconnections.iter().any(|(source, _)| source == port)
    }

    fn link(&mut self, source: &PortRef, target: &PortRef) -> Result<()> {
        let output = self.node(source.filter)?.output(&source.port)?.clone();
        let input = self.node(target.filter)?.input(&target.port)?.clone();
        output.connect_to(&input)?;
        self.connections.push(Connection {
            source: source.clone(),
            target: target.clone(),
        });
        Ok(())
    }

    fn unique_name(&self, base: String) -> String {
        let mut name = base.clone();
        let mut suffix = 1;
        while self.names.contains_key(&name) {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }
        name
    }

    // ------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------

    /// Finalize the graph: insert discard sinks (if configured), link ports
    /// (inserting branches for fan-out), and type-check every connection.
    ///
    /// Does nothing if the graph is already set up.
    pub fn setup_filters(&mut self) -> Result<()> {
        if self.is_ready {
            return Ok(());
        }
        let span = crate::observability::span_graph(&self.name);
        let _guard = span.enter();

        if self.config.discard_unconnected_outputs {
            self.discard_unconnected_outputs()?;
        }
        self.connect_ports()?;
        self.run_type_check()?;

        self.is_ready = true;
        tracing::info!(
            filters = self.nodes.len(),
            connections = self.connections.len(),
            "graph set up"
        );
        Ok(())
    }

    fn discard_unconnected_outputs(&mut self) -> Result<()> {
        let mut unconnected = Vec::new();
        for (id, node) in self.filters() {
            for output in node.ports().outputs() {
                let port = PortRef::new(id, output.name());
                if !output.is_connected() && !self.is_preconnected(&port) {
                    unconnected.push((node.name().to_string(), port));
                }
            }
        }

        for (filter_name, port) in unconnected {
            let name = self.unique_name(format!("{filter_name}ToNull{}", self.discard_count));
            self.discard_count += 1;
            let sink = self.add_filter(&name, Box::new(NullFilter::new()))?;
            tracing::debug!(output = %port.port, sink = %name, "discarding unconnected output");
            self.preconnections
                .push((port, vec![PortRef::new(sink, NullFilter::INPUT)]));
        }
        Ok(())
    }

    fn connect_ports(&mut self) -> Result<()> {
        let preconnections = std::mem::take(&mut self.preconnections);
        for (source, targets) in preconnections {
            match targets.as_slice() {
                [] => {}
                [target] => self.link(&source, target)?,
                _ => self.insert_branch(&source, &targets)?,
            }
        }
        Ok(())
    }

    fn insert_branch(&mut self, source: &PortRef, targets: &[PortRef]) -> Result<()> {
        let output = self.node(source.filter)?.output(&source.port)?.describe();
        if self.config.auto_branch == AutoBranchMode::Off {
            return Err(Error::BranchingDisabled(output));
        }

        let name = self.unique_name(format!("branch{}", self.branch_count));
        self.branch_count += 1;
        let values = ValueMap::new().with(FrameBranch::OUTPUT_COUNT, targets.len() as i64);
        let branch = self.add_filter_with_values(&name, Box::new(FrameBranch::new()), &values)?;
        tracing::debug!(%output, branch = %name, targets = targets.len(), "inserted branch");

        self.link(source, &PortRef::new(branch, FrameBranch::INPUT))?;
        for (i, target) in targets.iter().enumerate() {
            self.link(&PortRef::new(branch, FrameBranch::output_name(i)), target)?;
        }
        Ok(())
    }

    fn run_type_check(&mut self) -> Result<()> {
        self.check_acyclic()?;

        let count = self.nodes.len();
        let mut sources = vec![Vec::new(); count];
        let mut targets = vec![Vec::new(); count];
        for connection in &self.connections {
            sources[connection.target.filter.0].push(connection.source.filter.0);
            targets[connection.source.filter.0].push(connection.target.filter.0);
        }

        let mut processed = vec![false; count];
        let mut processed_count = 0;
        let mut stack: Vec<usize> = (0..count)
            .filter(|&i| self.nodes[i].connected_input_count() == 0)
            .collect();

        while let Some(i) = stack.pop() {
            if processed[i] {
                continue;
            }
            processed[i] = true;
            processed_count += 1;
            self.update_outputs(i)?;
            self.check_inputs(i)?;

            for &target in &targets[i] {
                if !processed[target] && sources[target].iter().all(|&s| processed[s]) {
                    stack.push(target);
                }
            }
        }

        if processed_count != count {
            return Err(Error::MalformedGraph(format!(
                "visited {processed_count} of {count} filters in graph '{}'",
                self.name
            )));
        }
        Ok(())
    }

    fn check_acyclic(&self) -> Result<()> {
        let mut dag: Dag<FilterId, ()> = Dag::with_capacity(self.nodes.len(), self.connections.len());
        let indices: Vec<_> = self
            .filter_ids()
            .into_iter()
            .map(|id| dag.add_node(id))
            .collect();
        for connection in &self.connections {
            let from = indices[connection.source.filter.0];
            let to = indices[connection.target.filter.0];
            dag.add_edge(from, to, ()).map_err(|_| {
                Error::MalformedGraph(format!(
                    "connection {}.{} -> {}.{} creates a cycle",
                    self.nodes[connection.source.filter.0].name(),
                    connection.source.port,
                    self.nodes[connection.target.filter.0].name(),
                    connection.target.port
                ))
            })?;
        }
        Ok(())
    }

    fn update_outputs(&self, index: usize) -> Result<()> {
        let node = &self.nodes[index];
        for output in node.ports().outputs() {
            let Some(base) = output.base_input() else {
                continue;
            };
            let input = node.input(&base)?;
            let input_format = input.source_format().unwrap_or_else(|| input.format());
            let format = node
                .filter()
                .output_format(output.name(), &input_format)
                .ok_or_else(|| Error::MissingOutputFormat(output.describe()))?;
            output.set_format(format);
        }
        Ok(())
    }

    fn check_inputs(&self, index: usize) -> Result<()> {
        for input in self.nodes[index].ports().inputs() {
            let source_format = input.source_format().unwrap_or_else(|| input.format());
            let expected = input.format();
            let compatible = match self.config.type_check {
                TypeCheckMode::Off => true,
                TypeCheckMode::Strict => source_format.is_compatible_with(&expected),
                TypeCheckMode::Dynamic => source_format.may_be_compatible_with(&expected),
            };
            if !compatible {
                return Err(Error::TypeMismatch {
                    port: input.describe(),
                    source_format: source_format.to_string(),
                    expected: expected.to_string(),
                });
            }
            input.set_checks_type(self.config.type_check == TypeCheckMode::Dynamic);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Execution support
    // ------------------------------------------------------------------

    /// Set up if needed, reset finished filters and open their ports.
    pub fn begin_processing(&mut self) -> Result<()> {
        self.setup_filters()?;
        for node in &mut self.nodes {
            node.reset_for_run();
        }
        for node in &self.nodes {
            node.open_outputs();
            for input in node.ports().inputs() {
                if !input.is_connected() && input.kind() != crate::port::InputKind::Stream {
                    input.open();
                }
            }
        }
        Ok(())
    }

    /// Close every filter, returning the first close error.
    pub fn close_filters(&mut self, ctx: &FilterContext) -> Result<()> {
        let mut first_error = None;
        for node in &mut self.nodes {
            if let Err(e) = node.perform_close(ctx) {
                tracing::warn!(filter = %node.name(), error = %e, "failed to close filter");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Release every frame still waiting on a connection.
    pub fn flush_frames(&self) -> Result<()> {
        for node in &self.nodes {
            node.clear_outputs()?;
        }
        Ok(())
    }

    /// Release all filters and frames; the graph is empty afterwards.
    pub fn tear_down(&mut self, ctx: &FilterContext) {
        if let Err(e) = self.flush_frames() {
            tracing::warn!(graph = %self.name, error = %e, "failed to flush frames");
        }
        for node in &mut self.nodes {
            if let Err(e) = node.perform_tear_down(ctx) {
                tracing::warn!(filter = %node.name(), error = %e, "failed to tear down filter");
            }
        }
        self.nodes.clear();
        self.names.clear();
        self.preconnections.clear();
        self.connections.clear();
        self.is_ready = false;
        tracing::debug!(graph = %self.name, "graph torn down");
    }

    /// Wrap the graph for sharing with a context and runners.
    pub fn into_shared(self) -> SharedGraph {
        Arc::new(Mutex::new(self))
    }
}

impl Default for FilterGraph {
    fn default() -> Self {
        Self::new("graph")
    }
}

impl fmt::Debug for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterGraph")
            .field("name", &self.name)
            .field("filters", &self.nodes.len())
            .field("connections", &self.connections)
            .field("is_ready", &self.is_ready)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterStatus, ProcessContext};
    use crate::format::{BaseType, FrameFormat, FrameTarget};
    use crate::port::PortSet;

    /// Pass-through filter with one input and one output of fixed formats.
    struct Relay {
        input: FrameFormat,
        output: FrameFormat,
    }

    impl Relay {
        fn new() -> Box<Self> {
            Box::new(Self {
                input: FrameFormat::unspecified(),
                output: FrameFormat::unspecified(),
            })
        }

        fn typed(input: FrameFormat, output: FrameFormat) -> Box<Self> {
            Box::new(Self { input, output })
        }
    }

    impl Filter for Relay {
        fn setup_ports(&mut self, ports: &mut PortSet) -> Result<()> {
            ports.add_input("in", self.input.clone())?;
            ports.add_output("out", self.output.clone())?;
            Ok(())
        }

        fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
            let frame = ctx.pull_input("in")?;
            ctx.push_output("out", &frame)
        }
    }

    /// Source without inputs.
    struct Emit;

    impl Filter for Emit {
        fn setup_ports(&mut self, ports: &mut PortSet) -> Result<()> {
            ports.add_output("out", FrameFormat::new(BaseType::Int32, FrameTarget::Simple))?;
            Ok(())
        }

        fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    /// Output format follows the input.
    struct Follow;

    impl Filter for Follow {
        fn setup_ports(&mut self, ports: &mut PortSet) -> Result<()> {
            ports.add_input("in", FrameFormat::unspecified())?;
            ports.add_output_based_on_input("out", "in")?;
            Ok(())
        }

        fn output_format(&self, _port: &str, input: &FrameFormat) -> Option<FrameFormat> {
            Some(input.clone().with_target(FrameTarget::Native))
        }

        fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_and_unknown() {
        let mut graph = FilterGraph::new("g");
        let a = graph.add_filter("a", Relay::new()).unwrap();
        assert!(matches!(
            graph.add_filter("a", Relay::new()),
            Err(Error::DuplicateFilter(_))
        ));
        assert!(matches!(
            graph.connect(a, "missing", a, "in"),
            Err(Error::UnknownPort { .. })
        ));
        assert!(matches!(
            graph.connect(a, "out", FilterId(9), "in"),
            Err(Error::NotInGraph(_))
        ));
        assert!(matches!(
            graph.connect_by_name("a", "out", "nobody", "in"),
            Err(Error::NotInGraph(_))
        ));
    }

    #[test]
    fn test_input_connected_once() {
        let mut graph = FilterGraph::new("g");
        graph.add_filter("a", Box::new(Emit)).unwrap();
        let b = graph.add_filter("b", Box::new(Emit)).unwrap();
        let c = graph.add_filter("c", Relay::new()).unwrap();
        graph.connect(b, "out", c, "in").unwrap();
        assert!(matches!(
            graph.connect_by_name("a", "out", "c", "in"),
            Err(Error::AlreadyConnected(_))
        ));
    }

    #[test]
    fn test_dag_is_fully_visited() {
        let mut graph = FilterGraph::new("g");
        let src = graph.add_filter("src", Box::new(Emit)).unwrap();
        let mid = graph.add_filter("mid", Relay::new()).unwrap();
        let end = graph.add_filter("end", Relay::new()).unwrap();
        graph.connect(src, "out", mid, "in").unwrap();
        graph.connect(mid, "out", end, "in").unwrap();
        graph.setup_filters().unwrap();
        assert!(graph.is_ready());
        assert_eq!(graph.connections().len(), 2);
        assert!(graph.filter(end).unwrap().input("in").unwrap().is_connected());
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut graph = FilterGraph::new("g");
        let a = graph.add_filter("a", Relay::new()).unwrap();
        let b = graph.add_filter("b", Relay::new()).unwrap();
        graph.connect(a, "out", b, "in").unwrap();
        graph.connect(b, "out", a, "in").unwrap();
        assert!(matches!(
            graph.setup_filters(),
            Err(Error::MalformedGraph(_))
        ));
        assert!(!graph.is_ready());
    }

    #[test]
    fn test_fan_out_requires_branching() {
        let mut graph = FilterGraph::new("g");
        let src = graph.add_filter("src", Box::new(Emit)).unwrap();
        let a = graph.add_filter("a", Relay::new()).unwrap();
        let b = graph.add_filter("b", Relay::new()).unwrap();
        graph.connect(src, "out", a, "in").unwrap();
        graph.connect(src, "out", b, "in").unwrap();
        assert!(matches!(
            graph.setup_filters(),
            Err(Error::BranchingDisabled(_))
        ));
    }

    #[test]
    fn test_branch_inserted_for_fan_out() {
        let config = GraphConfig::default().with_auto_branch(AutoBranchMode::Synced);
        let mut graph = FilterGraph::with_config("g", config);
        let src = graph.add_filter("src", Box::new(Emit)).unwrap();
        let a = graph.add_filter("a", Relay::new()).unwrap();
        let b = graph.add_filter("b", Relay::new()).unwrap();
        graph.connect(src, "out", a, "in").unwrap();
        graph.connect(src, "out", b, "in").unwrap();
        graph.setup_filters().unwrap();

        let branch = graph.filter_by_name("branch0").unwrap();
        assert_eq!(branch.ports().outputs().len(), 2);
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.connections().len(), 3);
        let format = branch.output("out1").unwrap().format();
        assert_eq!(format.base_type(), BaseType::Int32);
    }

    #[test]
    fn test_discard_unconnected_outputs() {
        let config = GraphConfig::default().with_discard_unconnected_outputs(true);
        let mut graph = FilterGraph::with_config("g", config);
        graph.add_filter("src", Box::new(Emit)).unwrap();
        graph.setup_filters().unwrap();
        let sink = graph.filter_by_name("srcToNull0").unwrap();
        assert!(sink.input("frame").unwrap().is_connected());
    }

    #[test]
    fn test_strict_type_check() {
        let ints = FrameFormat::new(BaseType::Int32, FrameTarget::Unspecified);
        let floats = FrameFormat::new(BaseType::Float, FrameTarget::Unspecified);

        let mut graph = FilterGraph::new("g");
        let src = graph.add_filter("src", Box::new(Emit)).unwrap();
        let sink = graph.add_filter("sink", Relay::typed(floats, ints.clone())).unwrap();
        graph.connect(src, "out", sink, "in").unwrap();
        assert!(matches!(
            graph.setup_filters(),
            Err(Error::TypeMismatch { .. })
        ));

        let mut graph = FilterGraph::new("g");
        let src = graph.add_filter("src", Box::new(Emit)).unwrap();
        let sink = graph.add_filter("sink", Relay::typed(ints.clone(), ints)).unwrap();
        graph.connect(src, "out", sink, "in").unwrap();
        graph.setup_filters().unwrap();
        assert!(!graph.filter(sink).unwrap().input("in").unwrap().checks_type());
    }

    #[test]
    fn test_dynamic_type_check_enables_runtime_checks() {
        let config = GraphConfig::default().with_type_check(TypeCheckMode::Dynamic);
        let mut graph = FilterGraph::with_config("g", config);
        let src = graph.add_filter("src", Box::new(Emit)).unwrap();
        let sink = graph
            .add_filter(
                "sink",
                Relay::typed(
                    FrameFormat::new(BaseType::Int32, FrameTarget::Simple),
                    FrameFormat::unspecified(),
                ),
            )
            .unwrap();
        graph.connect(src, "out", sink, "in").unwrap();
        graph.setup_filters().unwrap();
        assert!(graph.filter(sink).unwrap().input("in").unwrap().checks_type());
    }

    #[test]
    fn test_output_format_inferred_from_input() {
        let mut graph = FilterGraph::new("g");
        let src = graph.add_filter("src", Box::new(Emit)).unwrap();
        let follow = graph.add_filter("follow", Box::new(Follow)).unwrap();
        graph.connect(src, "out", follow, "in").unwrap();
        graph.setup_filters().unwrap();

        let format = graph.filter(follow).unwrap().output("out").unwrap().format();
        assert_eq!(format.base_type(), BaseType::Int32);
        assert_eq!(format.target(), FrameTarget::Native);
    }

    #[test]
    fn test_missing_output_format() {
        struct NoFormat;
        impl Filter for NoFormat {
            fn setup_ports(&mut self, ports: &mut PortSet) -> Result<()> {
                ports.add_input("in", FrameFormat::unspecified())?;
                ports.add_output_based_on_input("out", "in")?;
                Ok(())
            }
            fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<()> {
                Ok(())
            }
        }

        let mut graph = FilterGraph::new("g");
        graph.add_filter("f", Box::new(NoFormat)).unwrap();
        assert!(matches!(
            graph.setup_filters(),
            Err(Error::MissingOutputFormat(_))
        ));
    }

    #[test]
    fn test_tear_down_releases_filters() {
        let ctx = FilterContext::new();
        let mut graph = FilterGraph::new("g");
        let src = graph.add_filter("src", Box::new(Emit)).unwrap();
        let sink = graph.add_filter("sink", Relay::new()).unwrap();
        graph.connect(src, "out", sink, "in").unwrap();
        graph.begin_processing().unwrap();
        assert_eq!(graph.filter(src).unwrap().status(), FilterStatus::Unprepared);
        assert!(graph.filter(sink).unwrap().input("in").unwrap().is_open());

        graph.close_filters(&ctx).unwrap();
        graph.tear_down(&ctx);
        assert!(graph.is_empty());
        assert!(graph.connections().is_empty());
    }
}
