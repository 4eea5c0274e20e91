//! Pause-aware wall-clock accounting for one operation run.

use std::time::Duration;

use tokio::time::Instant;

/// Tracks how much of a run was spent paused.
///
/// Owned by the execution loop; pause and resume instants arrive as
/// timestamped context events, so a pause raised mid-round is counted from
/// the moment it was raised.
#[derive(Debug, Clone)]
pub struct PauseClock {
    started: Instant,
    paused_since: Option<Instant>,
    paused_total: Duration,
}

impl PauseClock {
    pub fn start(now: Instant) -> Self {
        Self {
            started: now,
            paused_since: None,
            paused_total: Duration::ZERO,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_since.is_some()
    }

    pub fn paused_since(&self) -> Option<Instant> {
        self.paused_since
    }

    /// Record a pause. Returns false when already paused.
    pub fn pause(&mut self, at: Instant) -> bool {
        if self.paused_since.is_some() {
            return false;
        }
        self.paused_since = Some(at);
        true
    }

    /// Record a resume and return how long the pause lasted.
    ///
    /// Returns `None` when not paused.
    pub fn resume(&mut self, at: Instant) -> Option<Duration> {
        let since = self.paused_since.take()?;
        let paused_for = at.saturating_duration_since(since);
        self.paused_total += paused_for;
        Some(paused_for)
    }

    pub fn paused_total(&self) -> Duration {
        self.paused_total
    }

    /// Wall-clock time since start, minus every pause (including an open one).
    pub fn active_elapsed(&self, now: Instant) -> Duration {
        let open = self
            .paused_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        now.saturating_duration_since(self.started)
            .saturating_sub(self.paused_total)
            .saturating_sub(open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn pauses_are_excluded_from_active_time() {
        let t0 = Instant::now();
        let mut clock = PauseClock::start(t0);

        assert!(clock.pause(t0 + Duration::from_secs(1)));
        assert!(!clock.pause(t0 + Duration::from_secs(2)));
        assert_eq!(clock.active_elapsed(t0 + Duration::from_secs(4)), Duration::from_secs(1));

        let paused_for = clock.resume(t0 + Duration::from_secs(6));
        assert_eq!(paused_for, Some(Duration::from_secs(5)));
        assert_eq!(clock.resume(t0 + Duration::from_secs(7)), None);
        assert_eq!(clock.active_elapsed(t0 + Duration::from_secs(8)), Duration::from_secs(3));
        assert_eq!(clock.paused_total(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_before_pause_instant_counts_nothing() {
        let t0 = Instant::now();
        let mut clock = PauseClock::start(t0);
        clock.pause(t0 + Duration::from_secs(3));
        assert_eq!(clock.resume(t0 + Duration::from_secs(2)), Some(Duration::ZERO));
    }
}
