//! Per-round handler context and the outcome-helper API.
//!
//! Helpers block the calling handler for the requested [`Delay`] before
//! returning the outcome; the engine itself never sleeps on their behalf.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{Category, Delay, OperationResult, Reply, RoundOutcome, RunContext};

/// Everything a handler gets to see about the round it is running.
#[derive(Clone)]
pub struct RoundContext {
    operation: Arc<str>,
    node: Arc<str>,
    retries: u32,
    started_at: Instant,
    run: Arc<dyn RunContext>,
}

impl std::fmt::Debug for RoundContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundContext")
            .field("operation", &self.operation)
            .field("node", &self.node)
            .field("retries", &self.retries)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl RoundContext {
    /// Start a round now.
    pub fn new(
        operation: impl Into<Arc<str>>,
        node: impl Into<Arc<str>>,
        retries: u32,
        run: Arc<dyn RunContext>,
    ) -> Self {
        Self {
            operation: operation.into(),
            node: node.into(),
            retries,
            started_at: Instant::now(),
            run,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Retries already spent on the current node before this round.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn run_context(&self) -> &Arc<dyn RunContext> {
        &self.run
    }

    pub fn is_stopped(&self) -> bool {
        self.run.is_stopped()
    }

    // -----------------------------------------------------------------------
    // Outcome builders
    // -----------------------------------------------------------------------

    pub async fn success(&self, reply: Reply) -> RoundOutcome {
        self.finish(Category::Success, reply).await
    }

    pub async fn fail(&self, reply: Reply) -> RoundOutcome {
        self.finish(Category::Fail, reply).await
    }

    pub async fn retry(&self, reply: Reply) -> RoundOutcome {
        self.finish(Category::Retry, reply).await
    }

    pub async fn wait(&self, reply: Reply) -> RoundOutcome {
        self.finish(Category::Wait, reply).await
    }

    /// Turn a nested operation's terminal result into this round's outcome.
    pub async fn from_sub_result(
        &self,
        result: &OperationResult,
        retry_on_failure: bool,
        delay: Delay,
    ) -> RoundOutcome {
        let outcome = RoundOutcome::from_result(result, retry_on_failure);
        self.sleep(delay).await;
        outcome
    }

    // -----------------------------------------------------------------------
    // Area helpers
    // -----------------------------------------------------------------------

    /// Capture the screen, click `area_name` on `screen_name` and categorize.
    ///
    /// `reply` supplies the status, payload and delay for whichever category
    /// the click maps to.
    pub async fn click_area(&self, screen_name: &str, area_name: &str, reply: Reply) -> RoundOutcome {
        let Some(locator) = self.run.area_locator() else {
            warn!("node '{}': no area locator configured", self.node);
            return self.fail(reply).await;
        };
        let screen = match self.run.screenshot() {
            Ok(screen) => screen,
            Err(e) => {
                warn!("node '{}': screen capture failed: {e:#}", self.node);
                return self.retry(reply).await;
            }
        };

        let clicked = locator
            .find_and_click_area(&screen, screen_name, area_name)
            .await;
        debug!("node '{}': click {screen_name}/{area_name} -> {clicked:?}", self.node);
        self.finish(clicked.category(), reply).await
    }

    /// Capture the screen and check whether `area_name` is visible.
    pub async fn check_area(&self, screen_name: &str, area_name: &str, reply: Reply) -> RoundOutcome {
        let Some(locator) = self.run.area_locator() else {
            warn!("node '{}': no area locator configured", self.node);
            return self.fail(reply).await;
        };
        let screen = match self.run.screenshot() {
            Ok(screen) => screen,
            Err(e) => {
                warn!("node '{}': screen capture failed: {e:#}", self.node);
                return self.retry(reply).await;
            }
        };

        let presence = locator.find_area(&screen, screen_name, area_name).await;
        debug!("node '{}': find {screen_name}/{area_name} -> {presence:?}", self.node);
        self.finish(presence.category(), reply).await
    }

    async fn finish(&self, category: Category, reply: Reply) -> RoundOutcome {
        let (outcome, delay) = reply.into_outcome(category);
        self.sleep(delay).await;
        outcome
    }

    async fn sleep(&self, delay: Delay) {
        let pause = match delay {
            Delay::None => Duration::ZERO,
            Delay::For(d) => d,
            Delay::PadTo(target) => target.saturating_sub(self.started_at.elapsed()),
        };
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AreaLocator, AreaPresence, ClickOutcome, Screenshot};
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedLocator {
        click: ClickOutcome,
        presence: AreaPresence,
    }

    #[async_trait]
    impl AreaLocator for FixedLocator {
        async fn find_and_click_area(&self, _: &Screenshot, _: &str, _: &str) -> ClickOutcome {
            self.click
        }

        async fn find_area(&self, _: &Screenshot, _: &str, _: &str) -> AreaPresence {
            self.presence
        }
    }

    struct Fixture {
        locator: Option<Arc<dyn AreaLocator>>,
        capture_fails: bool,
    }

    impl RunContext for Fixture {
        fn is_stopped(&self) -> bool {
            false
        }

        fn is_paused(&self) -> bool {
            false
        }

        fn screenshot(&self) -> anyhow::Result<Screenshot> {
            if self.capture_fails {
                anyhow::bail!("display unavailable");
            }
            Ok(Screenshot::blank(4, 4))
        }

        fn area_locator(&self) -> Option<Arc<dyn AreaLocator>> {
            self.locator.clone()
        }
    }

    fn round_with(click: ClickOutcome, presence: AreaPresence) -> RoundContext {
        let run = Fixture {
            locator: Some(Arc::new(FixedLocator { click, presence })),
            capture_fails: false,
        };
        RoundContext::new("op", "node", 0, Arc::new(run))
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_delay_blocks_the_handler() {
        let round = round_with(ClickOutcome::Clicked, AreaPresence::Present);
        let before = Instant::now();

        let outcome = round
            .wait(Reply::new().status("loading").wait_for(Duration::from_millis(300)))
            .await;

        assert_eq!(outcome.category, Category::Wait);
        assert_eq!(outcome.status(), Some("loading"));
        assert!(before.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn pad_to_only_sleeps_the_remainder_of_the_round() {
        let round = round_with(ClickOutcome::Clicked, AreaPresence::Present);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let outcome = round
            .success(Reply::new().payload(json!(1)).pad_to(Duration::from_millis(250)))
            .await;

        let elapsed = round.started_at().elapsed();
        assert!(outcome.is_success());
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn pad_to_never_sleeps_when_round_already_exceeded_target() {
        let round = round_with(ClickOutcome::Clicked, AreaPresence::Present);
        tokio::time::sleep(Duration::from_millis(500)).await;
        let before = Instant::now();

        round.fail(Reply::new().pad_to(Duration::from_millis(200))).await;

        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn click_area_maps_locator_results() {
        let cases = [
            (ClickOutcome::Clicked, Category::Success),
            (ClickOutcome::NotFound, Category::Retry),
            (ClickOutcome::ClickFailed, Category::Retry),
            (ClickOutcome::AreaUnconfigured, Category::Fail),
        ];
        for (click, expected) in cases {
            let round = round_with(click, AreaPresence::Present);
            let outcome = round.click_area("home", "start", Reply::new()).await;
            assert_eq!(outcome.category, expected, "{click:?}");
        }
    }

    #[tokio::test]
    async fn check_area_maps_presence() {
        let cases = [
            (AreaPresence::Present, Category::Success),
            (AreaPresence::Absent, Category::Retry),
            (AreaPresence::Unconfigured, Category::Fail),
        ];
        for (presence, expected) in cases {
            let round = round_with(ClickOutcome::Clicked, presence);
            let outcome = round.check_area("home", "banner", Reply::new()).await;
            assert_eq!(outcome.category, expected, "{presence:?}");
        }
    }

    #[tokio::test]
    async fn click_area_without_locator_fails() {
        let run = Fixture {
            locator: None,
            capture_fails: false,
        };
        let round = RoundContext::new("op", "node", 0, Arc::new(run));
        let outcome = round
            .click_area("home", "start", Reply::new().status("no_locator"))
            .await;
        assert_eq!(outcome.category, Category::Fail);
        assert_eq!(outcome.status(), Some("no_locator"));
    }

    #[tokio::test]
    async fn click_area_retries_when_capture_fails() {
        let run = Fixture {
            locator: Some(Arc::new(FixedLocator {
                click: ClickOutcome::Clicked,
                presence: AreaPresence::Present,
            })),
            capture_fails: true,
        };
        let round = RoundContext::new("op", "node", 0, Arc::new(run));
        let outcome = round.click_area("home", "start", Reply::new()).await;
        assert_eq!(outcome.category, Category::Retry);
    }

    #[tokio::test]
    async fn sub_result_helper_honours_retry_flag() {
        let round = round_with(ClickOutcome::Clicked, AreaPresence::Present);
        let failed = OperationResult::failed("stopped");
        let outcome = round.from_sub_result(&failed, true, Delay::None).await;
        assert_eq!(outcome.category, Category::Retry);
        assert_eq!(outcome.status(), Some("stopped"));
    }
}
