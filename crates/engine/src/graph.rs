//! Graph construction and edge resolution.
//!
//! Rules enforced at build time:
//! 1. Node names must be unique within the graph.
//! 2. Every edge must reference declared nodes (both `from` and `to`).
//! 3. The entry node is the explicit start node, or else the unique node
//!    that no edge points to. Anything else is a configuration error.
//!
//! Cycles are allowed; they simply require an explicit start node.

use std::collections::HashMap;
use std::time::Duration;

use nodes::RoundOutcome;

use crate::{EngineError, Handler};

/// Name of the readiness-guard node that checks the precondition.
pub const CHECK_READY: &str = "check_ready";
/// Name of the readiness-guard node that establishes the precondition.
pub const MAKE_READY: &str = "make_ready";

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A named unit of work.
pub struct Node {
    name: String,
    timeout: Option<Duration>,
    handler: Handler,
}

impl Node {
    pub fn new(name: impl Into<String>, handler: Handler) -> Self {
        Self {
            name: name.into(),
            timeout: None,
            handler,
        }
    }

    /// Fail the node with `"timeout"` once it has been current this long.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("handler", &self.handler)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed, conditionally-taken transition between two nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
    /// Taken after SUCCESS when true, after FAIL when false.
    pub on_success: bool,
    /// Only taken for outcomes carrying exactly this status.
    pub status: Option<String>,
    /// Taken for any status when no exact match exists.
    pub catch_all: bool,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, on_success: bool) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            on_success,
            status: None,
            catch_all: false,
        }
    }

    pub fn success(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, to, true)
    }

    pub fn failure(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, to, false)
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn catch_all(mut self) -> Self {
        self.catch_all = true;
        self
    }

    /// An edge without a status filter accepts every status of its category.
    fn is_fallback(&self) -> bool {
        self.catch_all || self.status.is_none()
    }

    fn is_exact(&self, outcome: &RoundOutcome) -> bool {
        self.status.as_deref() == outcome.status()
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let on = if self.on_success { "success" } else { "fail" };
        write!(f, "{} --{on}", self.from)?;
        if let Some(status) = &self.status {
            write!(f, "[{status}]")?;
        }
        write!(f, "--> {}", self.to)?;
        if self.catch_all {
            write!(f, " (catch-all)")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Declarative registration of nodes and edges.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    start: Option<String>,
    guard: Option<(Handler, Handler)>,
}

impl GraphBuilder {
    pub fn add_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Edges leaving the same node are tried in the order they are added.
    pub fn add_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Start here instead of inferring the entry node.
    pub fn start(mut self, name: impl Into<String>) -> Self {
        self.start = Some(name.into());
        self
    }

    /// Put a `check_ready` / `make_ready` pair in front of the entry node.
    ///
    /// `check_ready` → entry on SUCCESS, `check_ready` → `make_ready` on FAIL,
    /// `make_ready` → entry on SUCCESS. A failing `make_ready` ends the run.
    pub fn readiness_guard(mut self, check: Handler, make: Handler) -> Self {
        self.guard = Some((check, make));
        self
    }

    /// Validate the declarations and compute the entry node.
    ///
    /// # Errors
    /// - [`EngineError::EmptyGraph`] if no node was added.
    /// - [`EngineError::DuplicateNodeId`] if two nodes share a name.
    /// - [`EngineError::UnknownNodeReference`] if an edge or the start node is undeclared.
    /// - [`EngineError::AmbiguousEntry`] / [`EngineError::NoEntry`] if the entry
    ///   cannot be inferred and no start node was given.
    pub fn build(self) -> Result<Graph, EngineError> {
        let GraphBuilder {
            mut nodes,
            mut edges,
            start,
            guard,
        } = self;

        if nodes.is_empty() {
            return Err(EngineError::EmptyGraph);
        }

        // Guard nodes are appended after this point and never count as entry candidates.
        let declared = nodes.len();
        let guarded = guard.is_some();
        if let Some((check, make)) = guard {
            nodes.push(Node::new(CHECK_READY, check));
            nodes.push(Node::new(MAKE_READY, make));
        }

        let mut index: HashMap<String, usize> = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.name.clone(), i).is_some() {
                return Err(EngineError::DuplicateNodeId(node.name.clone()));
            }
        }

        let lookup = |name: &str, side: &'static str| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| EngineError::UnknownNodeReference {
                    node_id: name.to_owned(),
                    side,
                })
        };

        let mut in_degree = vec![0usize; nodes.len()];
        for edge in &edges {
            lookup(&edge.from, "edge source")?;
            in_degree[lookup(&edge.to, "edge destination")?] += 1;
        }

        let mut entry = match start {
            Some(name) => lookup(&name, "start node")?,
            None => {
                let candidates: Vec<usize> = (0..declared).filter(|&i| in_degree[i] == 0).collect();
                match candidates.as_slice() {
                    [only] => *only,
                    [] => return Err(EngineError::NoEntry),
                    many => {
                        return Err(EngineError::AmbiguousEntry {
                            candidates: many.iter().map(|&i| nodes[i].name.clone()).collect(),
                        })
                    }
                }
            }
        };

        if guarded {
            let target = nodes[entry].name.clone();
            edges.push(Edge::failure(CHECK_READY, MAKE_READY));
            edges.push(Edge::success(CHECK_READY, target.clone()).catch_all());
            edges.push(Edge::success(MAKE_READY, target).catch_all());
            entry = index[CHECK_READY];
        }

        let mut outgoing: Vec<Vec<(Edge, usize)>> = nodes.iter().map(|_| Vec::new()).collect();
        for edge in edges {
            let from = index[&edge.from];
            let to = index[&edge.to];
            outgoing[from].push((edge, to));
        }

        Ok(Graph {
            nodes,
            index,
            outgoing,
            entry,
        })
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Immutable node/edge indices plus the computed entry node.
pub struct Graph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    outgoing: Vec<Vec<(Edge, usize)>>,
    entry: usize,
}

impl Graph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    pub fn entry(&self) -> &str {
        &self.nodes[self.entry].name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Outgoing edges of `name` in declaration order.
    pub fn edges_from(&self, name: &str) -> impl Iterator<Item = &Edge> {
        self.index
            .get(name)
            .into_iter()
            .flat_map(move |&i| self.outgoing[i].iter().map(|(edge, _)| edge))
    }

    /// Name of the node that follows `name` after `outcome`, if any.
    pub fn next_after(&self, name: &str, outcome: &RoundOutcome) -> Option<&str> {
        let from = *self.index.get(name)?;
        self.resolve(from, outcome).map(|i| self.nodes[i].name.as_str())
    }

    pub(crate) fn entry_index(&self) -> usize {
        self.entry
    }

    pub(crate) fn node_at(&self, i: usize) -> &Node {
        &self.nodes[i]
    }

    /// Pick the edge to follow from node `from`.
    ///
    /// Edges of the other category are skipped. An exact status match wins
    /// immediately; otherwise the first fallback edge seen is used; otherwise
    /// the graph ends here.
    pub(crate) fn resolve(&self, from: usize, outcome: &RoundOutcome) -> Option<usize> {
        let success = outcome.is_success();
        let mut fallback = None;

        for (edge, to) in &self.outgoing[from] {
            if edge.on_success != success {
                continue;
            }
            if fallback.is_none() && edge.is_fallback() {
                fallback = Some(*to);
            }
            if edge.is_exact(outcome) {
                return Some(*to);
            }
        }

        fallback
    }
}

impl std::fmt::Display for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "entry: {}", self.entry())?;
        for (i, node) in self.nodes.iter().enumerate() {
            match node.timeout {
                Some(t) => writeln!(f, "node {} (timeout {:?}, {})", node.name, t, node.handler.kind())?,
                None => writeln!(f, "node {} ({})", node.name, node.handler.kind())?,
            }
            for (edge, _) in &self.outgoing[i] {
                writeln!(f, "  {edge}")?;
            }
        }
        Ok(())
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> Node {
        Node::new(name, Handler::inline(|_round| async { Ok(RoundOutcome::success()) }))
    }

    fn handler() -> Handler {
        Handler::inline(|_round| async { Ok(RoundOutcome::success()) })
    }

    #[test]
    fn single_node_without_edges_is_the_entry() {
        let graph = Graph::builder().add_node(node("solo")).build().expect("valid graph");
        assert_eq!(graph.entry(), "solo");
        assert_eq!(graph.next_after("solo", &RoundOutcome::success()), None);
    }

    #[test]
    fn entry_is_the_unique_node_without_incoming_edges() {
        let graph = Graph::builder()
            .add_node(node("b"))
            .add_node(node("a"))
            .add_node(node("c"))
            .add_edge(Edge::success("a", "b"))
            .add_edge(Edge::failure("a", "c"))
            .build()
            .expect("valid graph");
        assert_eq!(graph.entry(), "a");
    }

    #[test]
    fn ambiguous_entry_requires_explicit_start() {
        let builder = || {
            Graph::builder()
                .add_node(node("a"))
                .add_node(node("b"))
                .add_node(node("c"))
                .add_edge(Edge::success("a", "c"))
                .add_edge(Edge::success("b", "c"))
        };

        assert!(matches!(
            builder().build(),
            Err(EngineError::AmbiguousEntry { candidates }) if candidates == ["a", "b"]
        ));
        let graph = builder().start("b").build().expect("explicit start");
        assert_eq!(graph.entry(), "b");
    }

    #[test]
    fn cyclic_graph_needs_a_start_node() {
        let builder = || {
            Graph::builder()
                .add_node(node("x"))
                .add_node(node("y"))
                .add_edge(Edge::success("x", "y"))
                .add_edge(Edge::success("y", "x"))
        };

        assert!(matches!(builder().build(), Err(EngineError::NoEntry)));
        assert_eq!(builder().start("y").build().expect("start given").entry(), "y");
    }

    #[test]
    fn edge_referencing_missing_node_is_rejected() {
        let result = Graph::builder()
            .add_node(node("a"))
            .add_edge(Edge::success("a", "ghost"))
            .build();
        assert!(matches!(
            result,
            Err(EngineError::UnknownNodeReference { node_id, side: "edge destination" }) if node_id == "ghost"
        ));
    }

    #[test]
    fn unknown_start_node_is_rejected() {
        let result = Graph::builder().add_node(node("a")).start("b").build();
        assert!(matches!(result, Err(EngineError::UnknownNodeReference { side: "start node", .. })));
    }

    #[test]
    fn duplicate_node_name_is_rejected() {
        let result = Graph::builder().add_node(node("a")).add_node(node("a")).build();
        assert!(matches!(result, Err(EngineError::DuplicateNodeId(id)) if id == "a"));
    }

    #[test]
    fn empty_graph_is_rejected() {
        assert!(matches!(Graph::builder().build(), Err(EngineError::EmptyGraph)));
    }

    #[test]
    fn readiness_guard_is_grafted_before_the_entry() {
        let graph = Graph::builder()
            .add_node(node("a"))
            .add_node(node("b"))
            .add_edge(Edge::success("a", "b"))
            .readiness_guard(handler(), handler())
            .build()
            .expect("valid graph");

        assert_eq!(graph.entry(), CHECK_READY);
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.next_after(CHECK_READY, &RoundOutcome::success()), Some("a"));
        assert_eq!(
            graph.next_after(CHECK_READY, &RoundOutcome::success().with_status("warm")),
            Some("a")
        );
        assert_eq!(graph.next_after(CHECK_READY, &RoundOutcome::fail()), Some(MAKE_READY));
        assert_eq!(graph.next_after(MAKE_READY, &RoundOutcome::success()), Some("a"));
        assert_eq!(graph.next_after(MAKE_READY, &RoundOutcome::fail()), None);
    }

    #[test]
    fn readiness_guard_name_clash_is_rejected() {
        let result = Graph::builder()
            .add_node(node(CHECK_READY))
            .readiness_guard(handler(), handler())
            .build();
        assert!(matches!(result, Err(EngineError::DuplicateNodeId(id)) if id == CHECK_READY));
    }

    #[test]
    fn failure_edge_without_status_filter_accepts_any_status() {
        let graph = Graph::builder()
            .add_node(node("a"))
            .add_node(node("b"))
            .add_node(node("c"))
            .add_edge(Edge::success("a", "b"))
            .add_edge(Edge::failure("a", "c"))
            .build()
            .expect("valid graph");

        assert_eq!(graph.next_after("a", &RoundOutcome::fail().with_status("x")), Some("c"));
        assert_eq!(graph.next_after("a", &RoundOutcome::success()), Some("b"));
    }

    #[test]
    fn exact_status_beats_catch_all() {
        let graph = Graph::builder()
            .add_node(node("a"))
            .add_node(node("b"))
            .add_node(node("c"))
            .add_edge(Edge::success("a", "c").catch_all())
            .add_edge(Edge::success("a", "b").with_status("s1"))
            .build()
            .expect("valid graph");

        assert_eq!(graph.next_after("a", &RoundOutcome::success().with_status("s1")), Some("b"));
        assert_eq!(graph.next_after("a", &RoundOutcome::success().with_status("other")), Some("c"));
    }

    #[test]
    fn first_declared_catch_all_wins() {
        let graph = Graph::builder()
            .add_node(node("a"))
            .add_node(node("b"))
            .add_node(node("c"))
            .add_node(node("d"))
            .add_edge(Edge::success("a", "b").with_status("s1"))
            .add_edge(Edge::success("a", "c").with_status("s2").catch_all())
            .add_edge(Edge::success("a", "d").catch_all())
            .build()
            .expect("valid graph");

        assert_eq!(graph.next_after("a", &RoundOutcome::success().with_status("zzz")), Some("c"));
        assert_eq!(graph.next_after("a", &RoundOutcome::success()), Some("d"));
    }

    #[test]
    fn status_filtered_edge_without_catch_all_does_not_match_other_statuses() {
        let graph = Graph::builder()
            .add_node(node("a"))
            .add_node(node("b"))
            .add_edge(Edge::success("a", "b").with_status("s1"))
            .build()
            .expect("valid graph");

        assert_eq!(graph.next_after("a", &RoundOutcome::success().with_status("s2")), None);
        assert_eq!(graph.next_after("a", &RoundOutcome::success()), None);
        assert_eq!(graph.next_after("a", &RoundOutcome::fail().with_status("s1")), None);
    }

    #[test]
    fn other_category_edges_never_interfere() {
        let graph = Graph::builder()
            .add_node(node("a"))
            .add_node(node("b"))
            .add_node(node("c"))
            .add_edge(Edge::failure("a", "c").with_status("s1"))
            .add_edge(Edge::success("a", "b").with_status("s1"))
            .build()
            .expect("valid graph");

        assert_eq!(graph.next_after("a", &RoundOutcome::success().with_status("s1")), Some("b"));
        assert_eq!(graph.next_after("a", &RoundOutcome::fail().with_status("s1")), Some("c"));
    }

    #[test]
    fn display_lists_entry_and_edges() {
        let graph = Graph::builder()
            .add_node(node("a").with_timeout(Duration::from_secs(2)))
            .add_node(node("b"))
            .add_edge(Edge::success("a", "b").with_status("s1").catch_all())
            .build()
            .expect("valid graph");

        let text = graph.to_string();
        assert!(text.starts_with("entry: a\n"));
        assert!(text.contains("a --success[s1]--> b (catch-all)"));
    }
}
