//! `MockNode`: a test double for `NodeHandler`.
//!
//! Useful in unit and integration tests where a real node implementation is
//! either unavailable or irrelevant.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::{NodeError, NodeHandler, RoundContext, RoundOutcome};

/// Behaviour injected into `MockNode` at construction time.
pub enum MockBehaviour {
    /// Return the scripted outcomes in order, repeating the last one forever.
    Script(Vec<RoundOutcome>),
    /// Fail every round with a handler error.
    Error(String),
    /// Panic on every round.
    Panic(String),
}

/// A mock node that records every round it runs and returns a
/// programmer-specified result.
pub struct MockNode {
    /// Label used in test assertions.
    pub name: String,
    /// What the node will do when `run` is called.
    pub behaviour: MockBehaviour,
    /// Simulated work per round, slept before answering.
    pub work: Duration,
    /// Retry count seen by every round (in call order).
    pub calls: Arc<Mutex<Vec<u32>>>,
}

impl MockNode {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            work: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always returns `outcome`.
    pub fn returning(name: impl Into<String>, outcome: RoundOutcome) -> Self {
        Self::with_behaviour(name, MockBehaviour::Script(vec![outcome]))
    }

    /// Create a mock that walks through `outcomes`, then repeats the last one.
    pub fn scripted(name: impl Into<String>, outcomes: Vec<RoundOutcome>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Script(outcomes))
    }

    /// Create a mock whose handler always errors.
    pub fn failing(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Error(msg.into()))
    }

    /// Create a mock whose handler always panics.
    pub fn panicking(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Panic(msg.into()))
    }

    /// Sleep for `work` inside every round before answering.
    pub fn with_work(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }

    /// Number of rounds this node has run.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Retry counts reported to each round, in order.
    pub fn retries_seen(&self) -> Vec<u32> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl NodeHandler for MockNode {
    async fn run(&self, round: &RoundContext) -> Result<RoundOutcome, NodeError> {
        let call = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            calls.push(round.retries());
            calls.len() - 1
        };

        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }

        match &self.behaviour {
            MockBehaviour::Script(outcomes) => outcomes
                .get(call)
                .or_else(|| outcomes.last())
                .cloned()
                .ok_or_else(|| NodeError::handler(format!("{}: empty script", self.name))),
            MockBehaviour::Error(msg) => Err(NodeError::handler(msg.clone())),
            MockBehaviour::Panic(msg) => panic!("{}: {msg}", self.name),
        }
    }
}
