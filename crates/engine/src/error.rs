//! Engine-level error types.

use thiserror::Error;

/// Configuration errors raised while building a graph.
///
/// Everything that can go wrong at run time (handler errors, timeouts, retry
/// exhaustion, stop) is folded into the terminal `OperationResult` instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Two or more nodes share the same name.
    #[error("duplicate node name: '{0}'")]
    DuplicateNodeId(String),

    /// An edge or the start override references a node that was never added.
    #[error("{side} references unknown node '{node_id}'")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// More than one node has no incoming edges and no start node was given.
    #[error("ambiguous entry node, candidates {candidates:?}; set an explicit start node")]
    AmbiguousEntry { candidates: Vec<String> },

    /// Every node has an incoming edge (cyclic graph) and no start node was given.
    #[error("no entry node: every node has an incoming edge; set an explicit start node")]
    NoEntry,

    /// The graph has no nodes at all.
    #[error("graph has no nodes")]
    EmptyGraph,
}
