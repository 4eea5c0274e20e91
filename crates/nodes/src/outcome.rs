//! Round outcomes and terminal operation results.
//!
//! A [`RoundOutcome`] is produced fresh by every handler invocation and is
//! never mutated by the engine after it is returned, except for the explicit
//! RETRY → FAIL downgrade on retry exhaustion ([`RoundOutcome::into_failure`]).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status attached by the engine when a node or the whole operation times out.
pub const STATUS_TIMEOUT: &str = "timeout";
/// Status attached by the engine when the run context signals stop.
pub const STATUS_STOPPED: &str = "stopped";
/// Status attached by the engine when a handler errors or panics.
pub const STATUS_EXCEPTION: &str = "exception";

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// How a round ended, which drives what the engine does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Follow a success edge.
    Success,
    /// Follow a failure edge.
    Fail,
    /// Run the same node again, counting against the retry cap.
    Retry,
    /// Run the same node again without counting.
    Wait,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Fail => write!(f, "fail"),
            Self::Retry => write!(f, "retry"),
            Self::Wait => write!(f, "wait"),
        }
    }
}

// ---------------------------------------------------------------------------
// RoundOutcome
// ---------------------------------------------------------------------------

/// The categorized result of a single round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl RoundOutcome {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            status: None,
            payload: None,
        }
    }

    pub fn success() -> Self {
        Self::new(Category::Success)
    }

    pub fn fail() -> Self {
        Self::new(Category::Fail)
    }

    pub fn retry() -> Self {
        Self::new(Category::Retry)
    }

    pub fn wait() -> Self {
        Self::new(Category::Wait)
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_success(&self) -> bool {
        self.category == Category::Success
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Downgrade to FAIL, keeping status and payload.
    pub fn into_failure(self) -> Self {
        Self {
            category: Category::Fail,
            ..self
        }
    }

    /// Map a nested operation's terminal result onto a round outcome.
    ///
    /// With `retry_on_failure` set, a failed sub-operation asks for another
    /// round instead of following a failure edge.
    pub fn from_result(result: &OperationResult, retry_on_failure: bool) -> Self {
        let category = match (result.success, retry_on_failure) {
            (true, _) => Category::Success,
            (false, true) => Category::Retry,
            (false, false) => Category::Fail,
        };
        Self {
            category,
            status: result.status.clone(),
            payload: result.payload.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// OperationResult
// ---------------------------------------------------------------------------

/// Terminal result of an operation run, also handed to the completion callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl OperationResult {
    pub fn failed(status: impl Into<String>) -> Self {
        Self {
            success: false,
            status: Some(status.into()),
            payload: None,
        }
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

impl From<RoundOutcome> for OperationResult {
    fn from(outcome: RoundOutcome) -> Self {
        Self {
            success: outcome.is_success(),
            status: outcome.status,
            payload: outcome.payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Reply builder
// ---------------------------------------------------------------------------

/// How long a handler blocks before its outcome is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delay {
    #[default]
    None,
    /// Sleep for exactly this long.
    For(Duration),
    /// Sleep until the round has lasted at least this long.
    PadTo(Duration),
}

/// Optional status, payload and delay used by the outcome helpers on
/// [`RoundContext`](crate::RoundContext).
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub status: Option<String>,
    pub payload: Option<Value>,
    pub delay: Delay,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn wait_for(mut self, delay: Duration) -> Self {
        self.delay = Delay::For(delay);
        self
    }

    pub fn pad_to(mut self, target: Duration) -> Self {
        self.delay = Delay::PadTo(target);
        self
    }

    pub(crate) fn into_outcome(self, category: Category) -> (RoundOutcome, Delay) {
        let outcome = RoundOutcome {
            category,
            status: self.status,
            payload: self.payload,
        };
        (outcome, self.delay)
    }
}
