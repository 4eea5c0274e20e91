//! `engine` crate: node graphs, edge resolution and the execution loop.

pub mod context;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod graph;
pub mod handler;
pub mod pause;

pub use context::SignalContext;
pub use diagnostics::DirectorySink;
pub use error::EngineError;
pub use executor::{CompletionCallback, Operation, OperationConfig, OperationHooks};
pub use graph::{Edge, Graph, GraphBuilder, Node, CHECK_READY, MAKE_READY};
pub use handler::{Handler, HandlerResult, InlineFn};
pub use pause::PauseClock;
