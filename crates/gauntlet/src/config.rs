//! Server configuration.

use std::time::Duration;

use gauntlet_flow::{DEFAULT_CLICK_TOLERANCE, Fish, REDIRECT_DELAY_SECS};
use gauntlet_session::SessionConfig;
use gauntlet_timer::TimerConfig;
use serde::Deserialize;
use tracing::warn;

/// Everything tunable about a Gauntlet instance.
///
/// Deserializable so it can come from a file or environment adapter;
/// missing fields take their defaults. Run through
/// [`validated`](Self::validated) before use.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GauntletConfig {
    pub bind_addr: String,
    /// Session lifetime. `None` keeps sessions until the process exits.
    pub session_ttl_secs: Option<u64>,
    pub dino_timeout_secs: u64,
    pub captcha_timeout_secs: u64,
    pub token_ttl_secs: u64,
    pub token_poll_interval_ms: u64,
    /// How often the queue head is admitted into the first challenge.
    pub admission_interval_ms: u64,
    /// Captcha click radius around the target centre, in pixels.
    pub click_tolerance: u32,
    pub redirect_delay_secs: u64,
    /// A connection that sends nothing for this long is dropped.
    pub idle_timeout_secs: u64,
    /// Where fish pictures are served from, without a trailing slash.
    pub fish_image_base_url: String,
}

impl Default for GauntletConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            session_ttl_secs: Some(24 * 60 * 60),
            dino_timeout_secs: 5 * 60,
            captcha_timeout_secs: 2 * 60,
            token_ttl_secs: 10 * 60,
            token_poll_interval_ms: 1_000,
            admission_interval_ms: 5_000,
            click_tolerance: DEFAULT_CLICK_TOLERANCE,
            redirect_delay_secs: REDIRECT_DELAY_SECS,
            idle_timeout_secs: 60,
            fish_image_base_url: "/fish".to_string(),
        }
    }
}

impl GauntletConfig {
    /// Shortest admission interval accepted.
    pub const MIN_ADMISSION_INTERVAL_MS: u64 = 100;

    /// Replaces unusable values with defaults or bounds.
    ///
    /// - Zero durations fall back to the default.
    /// - `admission_interval_ms` is raised to
    ///   [`Self::MIN_ADMISSION_INTERVAL_MS`].
    /// - `session_ttl_secs = Some(0)` means no TTL.
    /// - Trailing slashes are dropped from `fish_image_base_url`.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        for (name, value, default) in [
            ("dino_timeout_secs", &mut self.dino_timeout_secs, defaults.dino_timeout_secs),
            (
                "captcha_timeout_secs",
                &mut self.captcha_timeout_secs,
                defaults.captcha_timeout_secs,
            ),
            ("token_ttl_secs", &mut self.token_ttl_secs, defaults.token_ttl_secs),
            (
                "token_poll_interval_ms",
                &mut self.token_poll_interval_ms,
                defaults.token_poll_interval_ms,
            ),
            ("idle_timeout_secs", &mut self.idle_timeout_secs, defaults.idle_timeout_secs),
        ] {
            if *value == 0 {
                warn!(field = name, default, "zero duration, using default");
                *value = default;
            }
        }
        if self.admission_interval_ms < Self::MIN_ADMISSION_INTERVAL_MS {
            warn!(
                admission_interval_ms = self.admission_interval_ms,
                min = Self::MIN_ADMISSION_INTERVAL_MS,
                "admission interval too short, clamping"
            );
            self.admission_interval_ms = Self::MIN_ADMISSION_INTERVAL_MS;
        }
        if self.session_ttl_secs == Some(0) {
            self.session_ttl_secs = None;
        }
        let trimmed = self.fish_image_base_url.trim_end_matches('/').len();
        self.fish_image_base_url.truncate(trimmed);
        self
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ttl: self.session_ttl_secs.map(Duration::from_secs),
        }
    }

    pub fn timer_config(&self) -> TimerConfig {
        TimerConfig {
            dino_timeout: Duration::from_secs(self.dino_timeout_secs),
            captcha_timeout: Duration::from_secs(self.captcha_timeout_secs),
            token_poll_interval: Duration::from_millis(self.token_poll_interval_ms),
            ..TimerConfig::default()
        }
        .validated()
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn admission_interval(&self) -> Duration {
        Duration::from_millis(self.admission_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn fish_image_url(&self, fish: &Fish) -> String {
        format!("{}/{}.jpg", self.fish_image_base_url, fish.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_replaces_zero_durations() {
        let config = GauntletConfig {
            dino_timeout_secs: 0,
            token_ttl_secs: 0,
            ..Default::default()
        }
        .validated();
        assert_eq!(config.dino_timeout_secs, 300);
        assert_eq!(config.token_ttl_secs, 600);
    }

    #[test]
    fn test_validated_clamps_admission_interval() {
        let config = GauntletConfig {
            admission_interval_ms: 1,
            ..Default::default()
        }
        .validated();
        assert_eq!(config.admission_interval_ms, GauntletConfig::MIN_ADMISSION_INTERVAL_MS);
    }

    #[test]
    fn test_zero_session_ttl_means_none() {
        let config = GauntletConfig {
            session_ttl_secs: Some(0),
            ..Default::default()
        }
        .validated();
        assert!(config.session_config().ttl.is_none());
    }

    #[test]
    fn test_timer_config_carries_durations() {
        let config = GauntletConfig {
            captcha_timeout_secs: 30,
            ..Default::default()
        };
        assert_eq!(config.timer_config().captcha_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_fish_image_url_drops_trailing_slash() {
        let config = GauntletConfig {
            fish_image_base_url: "https://cdn.example/fish/".into(),
            ..Default::default()
        }
        .validated();
        let fish = gauntlet_flow::FISH[5];
        assert_eq!(config.fish_image_url(&fish), "https://cdn.example/fish/fugu.jpg");
    }
}
