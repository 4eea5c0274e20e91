//! The contracts between the engine, node handlers and the outside world.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::{AreaLocator, NodeError, RoundContext, RoundOutcome};

/// A raw RGB8 frame captured from the controlled screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub width: u32,
    pub height: u32,
    /// Row-major pixel data, three bytes per pixel.
    pub rgb: Vec<u8>,
}

impl Screenshot {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Self {
        Self { width, height, rgb }
    }

    /// A black frame of the given size.
    pub fn blank(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * 3;
        Self::new(width, height, vec![0; len])
    }
}

/// Signals published by a [`RunContext`] to the operations listening on it.
///
/// Timestamps are taken by the emitter so a pause raised while a round is
/// still running is accounted from the moment it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextEvent {
    Paused { at: Instant },
    Resumed { at: Instant },
    Stopped,
}

/// Environment an operation runs in: stop/pause signals and screen access.
pub trait RunContext: Send + Sync {
    fn is_stopped(&self) -> bool;

    fn is_paused(&self) -> bool;

    /// Listen for pause/resume/stop events. Dropping the receiver unregisters.
    ///
    /// Contexts that cannot publish events return `None`; the engine then
    /// falls back to polling [`is_paused`](RunContext::is_paused).
    fn subscribe(&self) -> Option<broadcast::Receiver<ContextEvent>> {
        None
    }

    /// Capture the current screen.
    fn screenshot(&self) -> anyhow::Result<Screenshot>;

    /// The most recent frame captured by anyone, if buffered.
    fn last_screenshot(&self) -> Option<Screenshot> {
        None
    }

    fn area_locator(&self) -> Option<Arc<dyn AreaLocator>> {
        None
    }

    fn diagnostics(&self) -> Option<Arc<dyn DiagnosticSink>> {
        None
    }
}

/// Persists frames that explain a failure.
pub trait DiagnosticSink: Send + Sync {
    /// Save `image` and return where it ended up.
    fn save_screenshot(&self, image: &Screenshot, prefix: &str) -> anyhow::Result<PathBuf>;
}

/// An object-backed node handler: the state lives in `self`, the work in `run`.
///
/// Closures are accepted by the engine as well; implement this trait when a
/// node needs its own fields or shares them with other nodes.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Run one round of the node and categorize how it went.
    async fn run(&self, round: &RoundContext) -> Result<RoundOutcome, NodeError>;
}
