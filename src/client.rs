//! Read-only client for the camera service's timelapse endpoints.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use frame_model::{Frame, dedupe_by_filename};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::FetchError;

pub const IMAGES_PATH: &str = "/timelapse/images";
pub const LATEST_PATH: &str = "/timelapse/latest";

/// Source of frame metadata. The viewer only depends on this seam so tests can
/// substitute an in-memory source.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Full listing in server order, one frame per filename.
    async fn list_frames(&self) -> Result<Vec<Frame>, FetchError>;

    /// Most recent capture; `None` when the service has nothing yet.
    async fn latest_frame(&self) -> Result<Option<Frame>, FetchError>;
}

pub struct HttpFrameSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFrameSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "GET");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Server { url, status });
        }

        resp.json::<T>()
            .await
            .map_err(|source| FetchError::Decode { url, source })
    }
}

#[async_trait]
impl FrameSource for HttpFrameSource {
    async fn list_frames(&self) -> Result<Vec<Frame>, FetchError> {
        let listing: Vec<Frame> = self.get_json(IMAGES_PATH).await?;
        let (frames, dropped) = dedupe_by_filename(listing);
        for frame in &dropped {
            warn!(filename = %frame.filename, "duplicate frame in listing; keeping first");
        }
        debug!(count = frames.len(), "frame listing received");
        Ok(frames)
    }

    async fn latest_frame(&self) -> Result<Option<Frame>, FetchError> {
        self.get_json(LATEST_PATH).await
    }
}
