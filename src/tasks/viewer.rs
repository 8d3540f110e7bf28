mod state;
mod timers;

pub use state::{Effect, ViewSnapshot, ViewerSM};

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use frame_model::{PlaybackRate, ViewMode};
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::FrameSource;
use crate::config::Configuration;
use crate::events::{FetchOutcome, ViewerCommand};

#[derive(Debug, Clone, Copy)]
pub struct ViewerOptions {
    pub start_mode: ViewMode,
    pub playback_rate: PlaybackRate,
    pub live_poll_interval: Duration,
}

impl From<&Configuration> for ViewerOptions {
    fn from(cfg: &Configuration) -> Self {
        Self {
            start_mode: cfg.start_mode,
            playback_rate: cfg.playback_rate,
            live_poll_interval: cfg.live_poll_interval,
        }
    }
}

/// Owns the viewer state and both timers.
///
/// Commands, fetch completions and timer deadlines are handled one at a time
/// in a single `select!` loop, so a timer that was disarmed by a command can
/// never tick afterwards. Fetches run as detached tasks and report back over a
/// channel; a late result is still applied.
pub async fn run(
    source: Arc<dyn FrameSource>,
    options: ViewerOptions,
    mut commands: mpsc::Receiver<ViewerCommand>,
    snapshots: watch::Sender<ViewSnapshot>,
    cancel: CancellationToken,
) -> Result<()> {
    let (fetch_tx, mut fetch_rx) = mpsc::channel::<FetchOutcome>(16);
    let mut viewer = ViewerSM::new(
        options.start_mode,
        options.playback_rate,
        options.live_poll_interval,
    );

    let effects = viewer.start(Instant::now());
    dispatch(&source, &fetch_tx, effects);
    snapshots.send_replace(viewer.snapshot());
    info!(mode = %viewer.mode(), rate = %viewer.rate(), "viewer started");

    loop {
        let deadline = viewer.next_deadline();
        let effects = select! {
            _ = cancel.cancelled() => break,

            maybe_cmd = commands.recv() => match maybe_cmd {
                Some(cmd) => {
                    debug!(?cmd, "viewer command");
                    viewer.on_command(cmd, Instant::now())
                }
                None => {
                    info!("command channel closed; stopping viewer");
                    break;
                }
            },

            // We hold a sender, so this branch never observes a closed channel.
            Some(outcome) = fetch_rx.recv() => viewer.on_fetch(outcome, Instant::now()),

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                viewer.on_timer(Instant::now())
            }
        };

        dispatch(&source, &fetch_tx, effects);
        snapshots.send_replace(viewer.snapshot());
    }

    Ok(())
}

fn dispatch(
    source: &Arc<dyn FrameSource>,
    results: &mpsc::Sender<FetchOutcome>,
    effects: Vec<Effect>,
) {
    for effect in effects {
        let source = Arc::clone(source);
        let results = results.clone();
        match effect {
            Effect::FetchFrames => {
                tokio::spawn(async move {
                    let outcome = FetchOutcome::Frames(source.list_frames().await);
                    let _ = results.send(outcome).await;
                });
            }
            Effect::FetchLatest => {
                tokio::spawn(async move {
                    let outcome = FetchOutcome::Latest(source.latest_frame().await);
                    let _ = results.send(outcome).await;
                });
            }
        }
    }
}
