//! Node-level error type.

use thiserror::Error;

/// Errors returned by a node handler.
///
/// The engine never propagates these: any error escaping a handler turns the
/// round into `RETRY("exception")` and counts against the node's retry cap.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The handler gave up on this round with a message.
    #[error("node handler error: {0}")]
    Handler(String),

    /// A collaborator (screen capture, area locator, …) failed.
    #[error("collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),

    /// The handler panicked; the payload message is kept.
    #[error("node handler panicked: {0}")]
    Panicked(String),
}

impl NodeError {
    /// Convenience constructor for ad-hoc handler failures.
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }
}
