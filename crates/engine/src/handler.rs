//! The three shapes a node's work can take.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use nodes::{NodeError, NodeHandler, RoundContext, RoundOutcome};

use crate::Operation;

/// What a handler invocation resolves to.
pub type HandlerResult = Result<RoundOutcome, NodeError>;

/// A boxed closure handler.
pub type InlineFn = Arc<dyn Fn(RoundContext) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// The work attached to a node.
pub enum Handler {
    /// A closure called once per round.
    Inline(InlineFn),
    /// An object whose [`NodeHandler::run`] is called once per round.
    Bound(Arc<dyn NodeHandler>),
    /// A nested operation run to completion once per round.
    SubGraph {
        operation: Arc<Operation>,
        /// Ask for another round instead of failing when the nested run fails.
        retry_on_failure: bool,
        /// Sleep this long after a successful nested run.
        wait_after_success: Option<Duration>,
    },
}

impl Handler {
    pub fn inline<F, Fut>(f: F) -> Self
    where
        F: Fn(RoundContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::Inline(Arc::new(move |round| -> BoxFuture<'static, HandlerResult> {
            Box::pin(f(round))
        }))
    }

    pub fn bound<H: NodeHandler + 'static>(handler: Arc<H>) -> Self {
        Self::Bound(handler)
    }

    pub fn sub_graph(operation: impl Into<Arc<Operation>>) -> Self {
        Self::SubGraph {
            operation: operation.into(),
            retry_on_failure: false,
            wait_after_success: None,
        }
    }

    /// Nested operation whose failures are retried on this node.
    pub fn sub_graph_retrying(operation: impl Into<Arc<Operation>>) -> Self {
        Self::SubGraph {
            operation: operation.into(),
            retry_on_failure: true,
            wait_after_success: None,
        }
    }

    /// Set the post-success wait of a nested operation. No-op for other handlers.
    pub fn wait_after_success(mut self, wait: Duration) -> Self {
        if let Self::SubGraph {
            wait_after_success, ..
        } = &mut self
        {
            *wait_after_success = Some(wait);
        }
        self
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Inline(_) => "inline",
            Self::Bound(_) => "bound",
            Self::SubGraph { .. } => "sub-graph",
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubGraph {
                operation,
                retry_on_failure,
                wait_after_success,
            } => f
                .debug_struct("SubGraph")
                .field("operation", &operation.name())
                .field("retry_on_failure", retry_on_failure)
                .field("wait_after_success", wait_after_success)
                .finish(),
            other => f.write_str(other.kind()),
        }
    }
}
