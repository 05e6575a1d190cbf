//! Adaptive pacing between upstream call starts

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::PacingConfig;

/// Which rule last changed the pacing interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingTier {
    Base,
    Burst,
    Sustained,
    Throttled,
    Decaying,
}

/// Derives the minimum spacing between call starts from a rolling history of
/// call starts and explicit throttle/success feedback.
///
/// This is a plain state machine: every method takes the current instant, so
/// the owner decides where time comes from.
#[derive(Debug)]
pub struct RateController {
    config: PacingConfig,
    min_interval: Duration,
    last_call_start: Option<Instant>,
    history: VecDeque<Instant>,
    tier: PacingTier,
}

impl RateController {
    pub fn new(config: PacingConfig) -> Self {
        debug!(?config, "RateController::new: called");
        let min_interval = config.base_interval();
        Self {
            config,
            min_interval,
            last_call_start: None,
            history: VecDeque::new(),
            tier: PacingTier::Base,
        }
    }

    /// Current minimum spacing between call starts
    pub fn current_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn tier(&self) -> PacingTier {
        self.tier
    }

    /// Number of call starts retained in the history window
    #[cfg(test)]
    fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Re-evaluate the window rules and return how long to wait before the
    /// next call may start.
    pub fn time_until_next_slot(&mut self, now: Instant) -> Duration {
        self.evaluate(now);
        self.remaining_wait(now)
    }

    /// Time left before the next call may start under the current interval,
    /// without re-evaluating the window rules
    pub fn remaining_wait(&self, now: Instant) -> Duration {
        match self.last_call_start {
            Some(last) => self.min_interval.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub fn record_call_start(&mut self, now: Instant) {
        self.history.push_back(now);
        self.last_call_start = Some(now);
        self.prune(now);
    }

    /// The upstream explicitly rejected a call for rate limiting
    pub fn on_throttled(&mut self) {
        let widened = self.clamp(scale(self.min_interval, self.config.throttle_factor));
        warn!(
            from_ms = self.min_interval.as_millis() as u64,
            to_ms = widened.as_millis() as u64,
            "Upstream throttled, widening pacing interval"
        );
        self.min_interval = widened;
        self.tier = PacingTier::Throttled;
    }

    /// A call completed successfully
    pub fn on_success(&mut self) {
        if self.min_interval > self.config.base_interval() {
            self.min_interval = self.clamp(scale(self.min_interval, self.config.success_decay));
            self.tier = self.settled_tier();
            debug!(interval_ms = self.min_interval.as_millis() as u64, "RateController::on_success: decayed");
        }
    }

    fn evaluate(&mut self, now: Instant) {
        self.prune(now);

        let sustained = self.count_since(now, self.config.sustained_window());
        if sustained >= self.config.sustained_ceiling {
            debug!(sustained, "RateController::evaluate: sustained window full");
            self.min_interval = self.clamp(self.min_interval.max(self.config.sustained_interval()));
            self.tier = PacingTier::Sustained;
            return;
        }

        let burst = self.count_since(now, self.config.burst_window());
        if burst >= self.config.burst_ceiling {
            debug!(burst, "RateController::evaluate: burst window full");
            self.min_interval = self.clamp(self.min_interval.max(self.config.burst_interval()));
            self.tier = PacingTier::Burst;
            return;
        }

        if self.min_interval > self.config.base_interval() {
            self.min_interval = self.clamp(scale(self.min_interval, self.config.window_decay));
            self.tier = self.settled_tier();
        }
    }

    fn count_since(&self, now: Instant, window: Duration) -> usize {
        self.history
            .iter()
            .rev()
            .take_while(|t| now.saturating_duration_since(**t) < window)
            .count()
    }

    fn prune(&mut self, now: Instant) {
        let window = self.config.history_window();
        while let Some(&oldest) = self.history.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    fn clamp(&self, interval: Duration) -> Duration {
        interval.clamp(self.config.base_interval(), self.config.max_interval())
    }

    fn settled_tier(&self) -> PacingTier {
        if self.min_interval > self.config.base_interval() {
            PacingTier::Decaying
        } else {
            PacingTier::Base
        }
    }
}

/// Scale a duration, rounded to whole milliseconds
fn scale(interval: Duration, factor: f64) -> Duration {
    Duration::from_millis((interval.as_millis() as f64 * factor).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_remaining_wait_follows_widened_interval() {
        let mut rate = RateController::new(PacingConfig::default());
        let start = Instant::now();
        rate.record_call_start(start);
        assert_eq!(rate.remaining_wait(start + ms(1200)), Duration::ZERO);

        rate.on_throttled();
        assert_eq!(rate.remaining_wait(start + ms(1200)), ms(600));
        // No evaluation happened, so the interval is untouched
        assert_eq!(rate.current_interval(), ms(1800));
    }

    #[test]
    fn test_first_call_has_no_floor() {
        let mut rate = RateController::new(PacingConfig::default());
        assert_eq!(rate.time_until_next_slot(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn test_spacing_after_call_start() {
        let mut rate = RateController::new(PacingConfig::default());
        let t0 = Instant::now();
        rate.record_call_start(t0);

        assert_eq!(rate.time_until_next_slot(t0), ms(1200));
        assert_eq!(rate.time_until_next_slot(t0 + ms(200)), ms(1000));
        assert_eq!(rate.time_until_next_slot(t0 + ms(5000)), Duration::ZERO);
    }

    #[test]
    fn test_throttle_widens_by_half_and_caps() {
        let mut rate = RateController::new(PacingConfig::default());
        rate.on_throttled();
        assert_eq!(rate.current_interval(), ms(1800));
        assert_eq!(rate.tier(), PacingTier::Throttled);

        for _ in 0..20 {
            rate.on_throttled();
        }
        assert_eq!(rate.current_interval(), ms(10_000));
    }

    #[test]
    fn test_success_decays_toward_base() {
        let mut rate = RateController::new(PacingConfig::default());
        rate.on_throttled();
        rate.on_throttled();
        assert_eq!(rate.current_interval(), ms(2700));

        rate.on_success();
        assert_eq!(rate.current_interval(), ms(2160));

        for _ in 0..10 {
            rate.on_success();
        }
        assert_eq!(rate.current_interval(), ms(1200));
        assert_eq!(rate.tier(), PacingTier::Base);
    }

    #[test]
    fn test_success_at_base_is_noop() {
        let mut rate = RateController::new(PacingConfig::default());
        rate.on_success();
        assert_eq!(rate.current_interval(), ms(1200));
    }

    #[test]
    fn test_burst_window_sets_burst_tier() {
        let mut rate = RateController::new(PacingConfig::default());
        let t0 = Instant::now();
        for i in 0..15 {
            rate.record_call_start(t0 + ms(i * 1000));
        }

        rate.time_until_next_slot(t0 + ms(15_000));
        assert_eq!(rate.current_interval(), ms(2000));
        assert_eq!(rate.tier(), PacingTier::Burst);
    }

    #[test]
    fn test_sustained_window_takes_priority() {
        let mut rate = RateController::new(PacingConfig::default());
        let t0 = Instant::now();
        // 40 calls spread over 59s: burst window holds ~20, sustained holds 40
        for i in 0..40 {
            rate.record_call_start(t0 + ms(i * 1475));
        }

        rate.time_until_next_slot(t0 + ms(59_000));
        assert_eq!(rate.current_interval(), ms(2500));
        assert_eq!(rate.tier(), PacingTier::Sustained);
    }

    #[test]
    fn test_window_tier_does_not_narrow_throttled_interval() {
        let mut rate = RateController::new(PacingConfig::default());
        let t0 = Instant::now();
        for _ in 0..4 {
            rate.on_throttled();
        }
        let widened = rate.current_interval();
        assert!(widened > ms(2500));

        for i in 0..40 {
            rate.record_call_start(t0 + ms(i * 100));
        }
        rate.time_until_next_slot(t0 + ms(4000));
        assert_eq!(rate.current_interval(), widened);
    }

    #[test]
    fn test_window_decay_when_quiet() {
        let mut rate = RateController::new(PacingConfig::default());
        rate.on_throttled(); // 1800ms
        let t0 = Instant::now();

        rate.time_until_next_slot(t0);
        assert_eq!(rate.current_interval(), ms(1620));
        rate.time_until_next_slot(t0);
        assert_eq!(rate.current_interval(), ms(1458));
    }

    #[test]
    fn test_history_pruned_after_two_minutes() {
        let mut rate = RateController::new(PacingConfig::default());
        let t0 = Instant::now();
        for i in 0..10 {
            rate.record_call_start(t0 + ms(i));
        }
        assert_eq!(rate.history_len(), 10);

        rate.record_call_start(t0 + Duration::from_secs(121));
        assert_eq!(rate.history_len(), 1);
    }

    proptest! {
        #[test]
        fn prop_throttle_is_monotonic_and_bounded(throttles in 1usize..40) {
            let config = PacingConfig::default();
            let max = config.max_interval();
            let mut rate = RateController::new(config);
            for _ in 0..throttles {
                let before = rate.current_interval();
                rate.on_throttled();
                prop_assert!(rate.current_interval() >= before);
                prop_assert!(rate.current_interval() <= max);
            }
        }

        #[test]
        fn prop_successes_are_monotonic_and_floored(throttles in 0usize..10, successes in 1usize..40) {
            let config = PacingConfig::default();
            let base = config.base_interval();
            let mut rate = RateController::new(config);
            for _ in 0..throttles {
                rate.on_throttled();
            }
            for _ in 0..successes {
                let before = rate.current_interval();
                rate.on_success();
                prop_assert!(rate.current_interval() <= before);
                prop_assert!(rate.current_interval() >= base);
            }
        }
    }
}
