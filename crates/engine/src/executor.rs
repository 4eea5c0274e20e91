//! Operation execution engine.
//!
//! `Operation` is the central orchestrator:
//! 1. Starts at the graph's entry node and runs it one round at a time.
//! 2. Before every round checks the whole-operation timeout, the stop signal
//!    and the pause signal, in that order.
//! 3. Repeats RETRY rounds up to `max_retries` and WAIT rounds indefinitely.
//! 4. Follows the edge selected by the SUCCESS/FAIL outcome, or ends the run
//!    with that outcome when no edge matches.
//! 5. Fires the completion callback exactly once per run.
//!
//! Run-state lives in the `execute` call, so one `Operation` can be run any
//! number of times (and nested inside other operations) without resetting.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use nodes::{
    Category, ContextEvent, NodeError, OperationResult, RoundContext, RoundOutcome, RunContext,
    STATUS_EXCEPTION, STATUS_STOPPED, STATUS_TIMEOUT,
};

use crate::graph::{Graph, Node};
use crate::pause::PauseClock;
use crate::{Handler, HandlerResult};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for an operation.
#[derive(Debug, Clone)]
pub struct OperationConfig {
    /// How many times in a row a node may answer RETRY before it fails.
    pub max_retries: u32,
    /// Whole-operation budget, excluding time spent paused.
    pub timeout: Option<Duration>,
    /// How often the pause signal is re-polled while paused.
    pub pause_poll_interval: Duration,
    /// Base delay for exponential back-off between retries. Zero disables it.
    pub retry_base_delay: Duration,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: None,
            pause_poll_interval: Duration::from_millis(100),
            retry_base_delay: Duration::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Synchronous callbacks fired from the execution loop.
pub trait OperationHooks: Send + Sync {
    fn on_pause(&self, _operation: &str) {}

    fn on_resume(&self, _operation: &str, _paused_for: Duration) {}
}

struct NoHooks;

impl OperationHooks for NoHooks {}

/// Called once at the end of every run.
pub type CompletionCallback = Box<dyn Fn(&OperationResult) + Send + Sync>;

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A named graph plus the policy used to run it.
pub struct Operation {
    name: String,
    graph: Graph,
    config: OperationConfig,
    hooks: Arc<dyn OperationHooks>,
    on_complete: Option<CompletionCallback>,
}

/// Loop-owned state of a single run.
struct RunState {
    current: usize,
    retries: u32,
    node_started: Instant,
    clock: PauseClock,
}

impl RunState {
    fn new(entry: usize, now: Instant) -> Self {
        Self {
            current: entry,
            retries: 0,
            node_started: now,
            clock: PauseClock::start(now),
        }
    }

    fn enter(&mut self, next: usize, now: Instant) {
        self.current = next;
        self.retries = 0;
        self.node_started = now;
    }
}

impl Operation {
    pub fn new(name: impl Into<String>, graph: Graph) -> Self {
        Self {
            name: name.into(),
            graph,
            config: OperationConfig::default(),
            hooks: Arc::new(NoHooks),
            on_complete: None,
        }
    }

    pub fn with_config(mut self, config: OperationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn OperationHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&OperationResult) + Send + Sync + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn config(&self) -> &OperationConfig {
        &self.config
    }

    /// Run the graph to completion against `ctx`.
    ///
    /// Never fails: handler errors, timeouts, retry exhaustion and stop
    /// requests all end up in the returned result.
    #[instrument(skip_all, fields(operation = %self.name, run_id = %Uuid::new_v4()))]
    pub async fn execute(&self, ctx: Arc<dyn RunContext>) -> OperationResult {
        let result = self.run_loop(&ctx).await;

        info!(
            success = result.success,
            status = ?result.status,
            "operation '{}' finished",
            self.name
        );
        if let Some(callback) = &self.on_complete {
            callback(&result);
        }
        result
    }

    /// Type-erased [`execute`](Self::execute), used to run nested operations.
    pub fn execute_boxed(&self, ctx: Arc<dyn RunContext>) -> BoxFuture<'_, OperationResult> {
        Box::pin(self.execute(ctx))
    }

    async fn run_loop(&self, ctx: &Arc<dyn RunContext>) -> OperationResult {
        let mut events = ctx.subscribe();
        let mut run = RunState::new(self.graph.entry_index(), Instant::now());
        info!("operation '{}' starting at node '{}'", self.name, self.graph.entry());

        let outcome = loop {
            self.absorb_signals(ctx, events.as_mut(), &mut run);

            if let Some(limit) = self.config.timeout {
                if run.clock.active_elapsed(Instant::now()) > limit {
                    warn!("operation '{}' exceeded its {:?} budget", self.name, limit);
                    break RoundOutcome::fail().with_status(STATUS_TIMEOUT);
                }
            }
            if ctx.is_stopped() {
                info!("operation '{}' stopped", self.name);
                break RoundOutcome::fail().with_status(STATUS_STOPPED);
            }
            if run.clock.is_paused() {
                tokio::time::sleep(self.config.pause_poll_interval).await;
                continue;
            }

            let node = self.graph.node_at(run.current);
            let mut outcome = self.run_round(node, &run, ctx).await;
            self.absorb_signals(ctx, events.as_mut(), &mut run);

            match outcome.category {
                Category::Wait => continue,
                Category::Retry if run.retries < self.config.max_retries => {
                    run.retries += 1;
                    let delay = self.retry_delay(run.retries);
                    debug!(
                        "node '{}' retry {}/{} (status {:?}), next in {:?}",
                        node.name(),
                        run.retries,
                        self.config.max_retries,
                        outcome.status,
                        delay
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    continue;
                }
                Category::Retry => {
                    warn!(
                        "node '{}' exceeded retry limit ({}), failing",
                        node.name(),
                        self.config.max_retries
                    );
                    outcome = outcome.into_failure();
                }
                Category::Success | Category::Fail => {}
            }

            match self.graph.resolve(run.current, &outcome) {
                Some(next) => {
                    info!(
                        "node '{}' -> '{}' on {} {:?}",
                        node.name(),
                        self.graph.node_at(next).name(),
                        outcome.category,
                        outcome.status
                    );
                    run.enter(next, Instant::now());
                }
                None => break outcome,
            }
        };

        drop(events);
        debug!("operation '{}' released its context listeners", self.name);
        outcome.into()
    }

    // -----------------------------------------------------------------------
    // Internal: one round on the current node.
    // -----------------------------------------------------------------------

    async fn run_round(&self, node: &Node, run: &RunState, ctx: &Arc<dyn RunContext>) -> RoundOutcome {
        if let Some(timeout) = node.timeout() {
            let current_for = Instant::now().saturating_duration_since(run.node_started);
            if current_for > timeout {
                warn!("node '{}' timed out after {:?}", node.name(), current_for);
                return RoundOutcome::fail().with_status(STATUS_TIMEOUT);
            }
        }

        let round = RoundContext::new(self.name.as_str(), node.name(), run.retries, Arc::clone(ctx));
        let invocation: BoxFuture<'static, HandlerResult> = match node.handler() {
            Handler::Inline(f) => {
                // Called inside the future so a panic before the first await is caught too.
                let f = Arc::clone(f);
                Box::pin(async move { f(round).await })
            }
            Handler::Bound(handler) => {
                let handler = Arc::clone(handler);
                Box::pin(async move { handler.run(&round).await })
            }
            Handler::SubGraph {
                operation,
                retry_on_failure,
                wait_after_success,
            } => {
                let result = operation.execute_boxed(Arc::clone(ctx)).await;
                let outcome = RoundOutcome::from_result(&result, *retry_on_failure);
                if let (true, Some(wait)) = (outcome.is_success(), wait_after_success) {
                    tokio::time::sleep(*wait).await;
                }
                return outcome;
            }
        };

        match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => self.exception(node, ctx, e),
            Err(panic) => self.exception(node, ctx, NodeError::Panicked(panic_message(&*panic))),
        }
    }

    fn exception(&self, node: &Node, ctx: &Arc<dyn RunContext>, err: NodeError) -> RoundOutcome {
        error!("node '{}' raised: {}", node.name(), err);
        self.save_diagnostic(node, ctx);
        RoundOutcome::retry()
            .with_status(STATUS_EXCEPTION)
            .with_payload(Value::String(err.to_string()))
    }

    fn save_diagnostic(&self, node: &Node, ctx: &Arc<dyn RunContext>) {
        let Some(sink) = ctx.diagnostics() else {
            return;
        };
        let image = match ctx.last_screenshot() {
            Some(image) => image,
            None => match ctx.screenshot() {
                Ok(image) => image,
                Err(e) => {
                    warn!("no screenshot for diagnostics: {e:#}");
                    return;
                }
            },
        };

        let prefix = format!("{}_{}", self.name, node.name());
        match sink.save_screenshot(&image, &prefix) {
            Ok(path) => info!("saved diagnostic screenshot to {}", path.display()),
            Err(e) => warn!("failed to save diagnostic screenshot: {e:#}"),
        }
    }

    // -----------------------------------------------------------------------
    // Internal: pause/resume bookkeeping.
    // -----------------------------------------------------------------------

    /// Apply queued context events, then reconcile with the pause level.
    fn absorb_signals(
        &self,
        ctx: &Arc<dyn RunContext>,
        events: Option<&mut broadcast::Receiver<ContextEvent>>,
        run: &mut RunState,
    ) {
        if let Some(rx) = events {
            loop {
                match rx.try_recv() {
                    Ok(ContextEvent::Paused { at }) => self.paused(run, at),
                    Ok(ContextEvent::Resumed { at }) => self.resumed(run, at),
                    Ok(ContextEvent::Stopped) => debug!("stop requested"),
                    Err(TryRecvError::Lagged(missed)) => {
                        warn!("missed {missed} context events");
                    }
                    Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                }
            }
        }

        let paused = ctx.is_paused();
        if paused && !run.clock.is_paused() {
            self.paused(run, Instant::now());
        } else if !paused && run.clock.is_paused() {
            self.resumed(run, Instant::now());
        }
    }

    fn paused(&self, run: &mut RunState, at: Instant) {
        if run.clock.pause(at) {
            info!("operation '{}' paused", self.name);
            self.hooks.on_pause(&self.name);
        }
    }

    fn resumed(&self, run: &mut RunState, at: Instant) {
        let since = run.clock.paused_since();
        let Some(paused_for) = run.clock.resume(at) else {
            return;
        };
        // Only the part of the pause that overlapped the current node moves its window.
        if let Some(since) = since {
            run.node_started += at.saturating_duration_since(since.max(run.node_started));
        }
        info!("operation '{}' resumed after {:?}", self.name, paused_for);
        self.hooks.on_resume(&self.name, paused_for);
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.config.retry_base_delay.saturating_mul(factor)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}
