use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Error, Result, anyhow, ensure};
use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};

pub use frame::{Frame, dedupe_by_filename};
pub use mode::ViewMode;
pub use rate::PlaybackRate;

mod frame {
    use super::*;

    /// One captured image as reported by the camera service.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Frame {
        /// Unique name of the capture within one listing.
        pub filename: String,
        /// Server-relative location of the image bytes.
        pub path: String,
        /// Capture time in epoch milliseconds; `None` when unknown.
        #[serde(default, deserialize_with = "deserialize_millis")]
        pub timestamp: Option<i64>,
    }

    impl Frame {
        pub fn new(
            filename: impl Into<String>,
            path: impl Into<String>,
            timestamp: Option<i64>,
        ) -> Self {
            Self {
                filename: filename.into(),
                path: path.into(),
                timestamp: timestamp.filter(|ms| *ms > 0),
            }
        }

        pub fn captured_at(&self) -> Option<DateTime<Utc>> {
            self.timestamp
                .filter(|ms| *ms > 0)
                .and_then(DateTime::<Utc>::from_timestamp_millis)
        }

        /// Absolute URL of the image bytes behind `base`.
        pub fn image_url(&self, base: &str) -> String {
            let base = base.trim_end_matches('/');
            if self.path.starts_with('/') {
                format!("{base}{}", self.path)
            } else {
                format!("{base}/{}", self.path)
            }
        }
    }

    /// Keep the first frame for every filename, in listing order.
    ///
    /// Returns the unique frames and the later duplicates that were dropped.
    pub fn dedupe_by_filename(frames: Vec<Frame>) -> (Vec<Frame>, Vec<Frame>) {
        let mut seen = HashSet::with_capacity(frames.len());
        frames
            .into_iter()
            .partition(|frame| seen.insert(frame.filename.clone()))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawMillis {
        Integer(i64),
        Float(f64),
    }

    // Capture services disagree on integer vs float millis and on null vs zero
    // for "unknown"; collapse all of them into `Option<i64>`.
    fn deserialize_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<RawMillis>::deserialize(deserializer)?;
        let millis = match raw {
            Some(RawMillis::Integer(ms)) => Some(ms),
            Some(RawMillis::Float(ms)) if ms.is_finite() => Some(ms.round() as i64),
            _ => None,
        };
        Ok(millis.filter(|ms| *ms > 0))
    }
}

mod mode {
    use super::*;

    /// The three mutually exclusive views of the viewer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum ViewMode {
        #[default]
        Gallery,
        Timeline,
        Live,
    }

    impl ViewMode {
        pub const ALL: [ViewMode; 3] = [ViewMode::Gallery, ViewMode::Timeline, ViewMode::Live];

        pub fn as_str(self) -> &'static str {
            match self {
                ViewMode::Gallery => "gallery",
                ViewMode::Timeline => "timeline",
                ViewMode::Live => "live",
            }
        }
    }

    impl fmt::Display for ViewMode {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    impl FromStr for ViewMode {
        type Err = Error;

        fn from_str(s: &str) -> Result<Self> {
            let wanted = s.trim();
            ViewMode::ALL
                .into_iter()
                .find(|mode| mode.as_str().eq_ignore_ascii_case(wanted))
                .ok_or_else(|| anyhow!("unknown view mode '{wanted}' (expected gallery, timeline or live)"))
        }
    }
}

mod rate {
    use super::*;

    /// Timeline playback speed in frames per second.
    ///
    /// Stored as a count of half frames per second so the `0.5` step is exact:
    /// the valid range `0.5..=10.0` maps to `1..=20`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(try_from = "f64", into = "f64")]
    pub struct PlaybackRate {
        half_steps: u8,
    }

    impl PlaybackRate {
        const MIN_HALF_STEPS: u8 = 1;
        const MAX_HALF_STEPS: u8 = 20;

        pub const MIN: PlaybackRate = PlaybackRate {
            half_steps: Self::MIN_HALF_STEPS,
        };
        pub const MAX: PlaybackRate = PlaybackRate {
            half_steps: Self::MAX_HALF_STEPS,
        };
        pub const DEFAULT: PlaybackRate = PlaybackRate { half_steps: 4 };

        pub fn new(fps: f64) -> Result<Self> {
            ensure!(fps.is_finite(), "playback rate must be a finite number");
            ensure!(
                (Self::MIN.fps()..=Self::MAX.fps()).contains(&fps),
                "playback rate {fps} is outside {}..={} fps",
                Self::MIN.fps(),
                Self::MAX.fps()
            );
            let halves = fps * 2.0;
            ensure!(
                (halves - halves.round()).abs() < 1e-9,
                "playback rate {fps} must be a multiple of 0.5 fps"
            );
            Ok(Self {
                half_steps: halves.round() as u8,
            })
        }

        pub fn fps(self) -> f64 {
            f64::from(self.half_steps) / 2.0
        }

        /// Period between two playback ticks (`1000 / fps` ms).
        pub fn tick_interval(self) -> Duration {
            Duration::from_micros(2_000_000 / u64::from(self.half_steps))
        }

        pub fn faster(self) -> Self {
            Self {
                half_steps: (self.half_steps + 1).min(Self::MAX_HALF_STEPS),
            }
        }

        pub fn slower(self) -> Self {
            Self {
                half_steps: self.half_steps.saturating_sub(1).max(Self::MIN_HALF_STEPS),
            }
        }
    }

    impl Default for PlaybackRate {
        fn default() -> Self {
            Self::DEFAULT
        }
    }

    impl TryFrom<f64> for PlaybackRate {
        type Error = Error;

        fn try_from(fps: f64) -> Result<Self> {
            Self::new(fps)
        }
    }

    impl From<PlaybackRate> for f64 {
        fn from(rate: PlaybackRate) -> f64 {
            rate.fps()
        }
    }

    impl fmt::Display for PlaybackRate {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{} fps", self.fps())
        }
    }
}
