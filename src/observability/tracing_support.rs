//! Tracing integration for structured logging and spans.

use tracing::{Level, Span, span};

/// Configuration for tracing behavior.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether runners open a span per graph run.
    pub graph_spans: bool,
    /// Whether runners open a span per filter step.
    pub filter_spans: bool,
    /// Default span level.
    pub level: Level,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            graph_spans: true,
            filter_spans: false,
            level: Level::INFO,
        }
    }
}

impl TracingConfig {
    /// Enable every span.
    pub fn all() -> Self {
        Self {
            graph_spans: true,
            filter_spans: true,
            level: Level::DEBUG,
        }
    }

    /// Disable all spans.
    pub fn none() -> Self {
        Self {
            graph_spans: false,
            filter_spans: false,
            level: Level::INFO,
        }
    }
}

/// Span covering one graph run.
#[inline]
pub fn span_graph(name: &str) -> Span {
    span!(Level::INFO, "graph", name = %name)
}

/// Span covering one filter process step.
#[inline]
pub fn span_filter(graph: &str, filter: &str) -> Span {
    span!(Level::DEBUG, "filter", graph = %graph, filter = %filter)
}

/// Enter a graph span, returning the guard.
pub fn instrument_graph(name: &str) -> tracing::span::EnteredSpan {
    span_graph(name).entered()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_presets() {
        assert!(!TracingConfig::default().filter_spans);
        assert!(TracingConfig::all().filter_spans);
        assert!(!TracingConfig::none().graph_spans);
    }

    #[test]
    fn test_span_creation() {
        let _guard = instrument_graph("g");
        let _span = span_filter("g", "f");
    }
}
