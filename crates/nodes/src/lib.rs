//! `nodes` crate: the contracts every node handler is written against.
//!
//! Handlers receive a [`RoundContext`] and answer with a [`RoundOutcome`].
//! The engine crate owns graphs and the execution loop; this crate owns the
//! vocabulary shared by both sides plus the collaborator traits a run
//! context exposes (screen capture, area recognition, diagnostics).

pub mod area;
pub mod error;
pub mod mock;
pub mod outcome;
pub mod round;
pub mod traits;

pub use area::{AreaLocator, AreaPresence, ClickOutcome};
pub use error::NodeError;
pub use outcome::{
    Category, Delay, OperationResult, Reply, RoundOutcome, STATUS_EXCEPTION, STATUS_STOPPED,
    STATUS_TIMEOUT,
};
pub use round::RoundContext;
pub use traits::{ContextEvent, DiagnosticSink, NodeHandler, RunContext, Screenshot};
