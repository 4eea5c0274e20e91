//! In-process [`RunContext`] driven by explicit stop/pause/resume calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::info;

use nodes::{AreaLocator, ContextEvent, DiagnosticSink, RunContext, Screenshot};

const EVENT_CAPACITY: usize = 64;

type CaptureFn = Box<dyn Fn() -> anyhow::Result<Screenshot> + Send + Sync>;

/// Run context whose signals are flipped by whoever holds it (a UI, a signal
/// handler, a test) and published to every listening operation.
pub struct SignalContext {
    stopped: AtomicBool,
    paused: AtomicBool,
    events: broadcast::Sender<ContextEvent>,
    capture: Option<CaptureFn>,
    last_frame: Mutex<Option<Screenshot>>,
    locator: Option<Arc<dyn AreaLocator>>,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl SignalContext {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            stopped: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            events,
            capture: None,
            last_frame: Mutex::new(None),
            locator: None,
            sink: None,
        }
    }

    pub fn with_capture<F>(mut self, capture: F) -> Self
    where
        F: Fn() -> anyhow::Result<Screenshot> + Send + Sync + 'static,
    {
        self.capture = Some(Box::new(capture));
        self
    }

    pub fn with_area_locator(mut self, locator: Arc<dyn AreaLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            info!("pause requested");
            self.publish(ContextEvent::Paused { at: Instant::now() });
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            info!("resume requested");
            self.publish(ContextEvent::Resumed { at: Instant::now() });
        }
    }

    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            info!("stop requested");
            self.publish(ContextEvent::Stopped);
        }
    }

    /// Clear stop and pause so the context can drive another run.
    pub fn reset(&self) {
        self.stopped.store(false, Ordering::SeqCst);
        self.resume();
    }

    /// Buffer a frame captured elsewhere (e.g. by a preview thread).
    pub fn record_screenshot(&self, frame: Screenshot) {
        *self.last_frame.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }

    fn publish(&self, event: ContextEvent) {
        // Ignore error if no receivers.
        let _ = self.events.send(event);
    }
}

impl Default for SignalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext for SignalContext {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<ContextEvent>> {
        Some(self.events.subscribe())
    }

    fn screenshot(&self) -> anyhow::Result<Screenshot> {
        let capture = self
            .capture
            .as_ref()
            .ok_or_else(|| anyhow!("no screen capture configured"))?;
        let frame = capture()?;
        self.record_screenshot(frame.clone());
        Ok(frame)
    }

    fn last_screenshot(&self) -> Option<Screenshot> {
        self.last_frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn area_locator(&self) -> Option<Arc<dyn AreaLocator>> {
        self.locator.clone()
    }

    fn diagnostics(&self) -> Option<Arc<dyn DiagnosticSink>> {
        self.sink.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_publish_timestamped_events_once() {
        let ctx = SignalContext::new();
        let mut rx = ctx.subscribe().expect("signal context publishes events");
        let t0 = Instant::now();

        ctx.pause();
        ctx.pause();
        tokio::time::sleep(Duration::from_secs(2)).await;
        ctx.resume();

        assert!(matches!(rx.try_recv(), Ok(ContextEvent::Paused { at }) if at == t0));
        assert!(matches!(
            rx.try_recv(),
            Ok(ContextEvent::Resumed { at }) if at >= t0 + Duration::from_secs(2)
        ));
        assert!(rx.try_recv().is_err());
        assert!(!ctx.is_paused());
    }

    #[test]
    fn stop_is_level_triggered_until_reset() {
        let ctx = SignalContext::new();
        ctx.stop();
        assert!(ctx.is_stopped());
        assert!(ctx.is_stopped());
        ctx.reset();
        assert!(!ctx.is_stopped());
    }

    #[test]
    fn screenshot_fills_the_last_frame_buffer() {
        let ctx = SignalContext::new().with_capture(|| Ok(Screenshot::blank(2, 2)));
        assert_eq!(ctx.last_screenshot(), None);

        let frame = ctx.screenshot().expect("capture configured");
        assert_eq!(ctx.last_screenshot(), Some(frame));
    }

    #[test]
    fn screenshot_without_capture_is_an_error() {
        let ctx = SignalContext::new();
        assert!(ctx.screenshot().is_err());
    }
}
