use std::time::Duration;

use gauntlet_protocol::Stage;
use tracing::warn;

/// Durations used by the supervisors and the token monitor.
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Time allowed for the Dino Run challenge.
    pub dino_timeout: Duration,
    /// Time allowed for the captcha challenge.
    pub captcha_timeout: Duration,
    /// How often the token monitor checks each watched user.
    pub token_poll_interval: Duration,
    /// Random delay (0..max) added to a watcher's first poll so users who
    /// received tokens at the same moment are not all polled together.
    pub initial_poll_jitter: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            dino_timeout: Duration::from_secs(5 * 60),
            captcha_timeout: Duration::from_secs(2 * 60),
            token_poll_interval: Duration::from_secs(1),
            initial_poll_jitter: Duration::from_millis(250),
        }
    }
}

impl TimerConfig {
    /// Shortest poll interval accepted.
    pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

    /// Time allowed in `stage`, or `None` for stages without a deadline.
    pub fn stage_timeout(&self, stage: Stage) -> Option<Duration> {
        match stage {
            Stage::DinoRun => Some(self.dino_timeout),
            Stage::Captcha => Some(self.captcha_timeout),
            Stage::Waiting | Stage::Registering => None,
        }
    }

    /// Fixes out-of-range values.
    ///
    /// - Zero challenge timeouts fall back to the defaults.
    /// - `token_poll_interval` is raised to [`Self::MIN_POLL_INTERVAL`].
    /// - `initial_poll_jitter` is capped at one poll interval.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.dino_timeout.is_zero() {
            warn!("dino_timeout is zero, using default");
            self.dino_timeout = defaults.dino_timeout;
        }
        if self.captcha_timeout.is_zero() {
            warn!("captcha_timeout is zero, using default");
            self.captcha_timeout = defaults.captcha_timeout;
        }
        if self.token_poll_interval < Self::MIN_POLL_INTERVAL {
            warn!(
                interval_ms = self.token_poll_interval.as_millis() as u64,
                "token_poll_interval below minimum, clamping"
            );
            self.token_poll_interval = Self::MIN_POLL_INTERVAL;
        }
        self.initial_poll_jitter = self.initial_poll_jitter.min(self.token_poll_interval);
        self
    }
}
