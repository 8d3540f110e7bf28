use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use chrono_tz::Tz;
use frame_model::{PlaybackRate, ViewMode};
use reqwest::Url;
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Root URL of the camera service; frame paths are resolved against it.
    pub base_url: String,
    /// Per-request timeout applied by the HTTP client.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// How often the live view re-fetches the latest frame.
    #[serde(with = "humantime_serde")]
    pub live_poll_interval: Duration,
    /// Initial timeline playback speed, 0.5 to 10 fps in 0.5 steps.
    pub playback_rate: PlaybackRate,
    /// View shown at startup.
    pub start_mode: ViewMode,
    /// Timezone used when printing capture times.
    pub timezone: Tz,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            live_poll_interval: Duration::from_secs(5),
            playback_rate: PlaybackRate::DEFAULT,
            start_mode: ViewMode::Gallery,
            timezone: Tz::UTC,
        }
    }
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(mut self) -> Result<Self> {
        let url = Url::parse(self.base_url.trim())
            .with_context(|| format!("base-url '{}' is not a valid URL", self.base_url))?;
        ensure!(
            matches!(url.scheme(), "http" | "https"),
            "base-url must use http or https, got '{}'",
            url.scheme()
        );
        ensure!(url.host_str().is_some(), "base-url must include a host");
        ensure!(
            !self.request_timeout.is_zero(),
            "request-timeout must be greater than zero"
        );
        ensure!(
            !self.live_poll_interval.is_zero(),
            "live-poll-interval must be greater than zero"
        );
        self.base_url = self.base_url.trim().trim_end_matches('/').to_string();
        Ok(self)
    }
}
