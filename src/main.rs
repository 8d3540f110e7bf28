//! Binary entrypoint for the timelapse viewer.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use timelapse_viewer::client::{FrameSource, HttpFrameSource};
use timelapse_viewer::config::Configuration;
use timelapse_viewer::events::ViewerCommand;
use timelapse_viewer::render::{self, RenderOptions};
use timelapse_viewer::tasks::{input, viewer};
use timelapse_viewer::{PlaybackRate, ViewMode};

#[derive(Debug, Parser)]
#[command(
    name = "timelapse-viewer",
    version,
    about = "Browse, replay and watch frames from a timelapse camera service"
)]
struct Args {
    /// Path to YAML config
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Camera service root URL (overrides the config file)
    #[arg(long, value_name = "URL", env = "TIMELAPSE_BASE_URL")]
    base_url: Option<String>,
    /// Initial playback rate in frames per second
    #[arg(long, value_name = "FPS")]
    rate: Option<f64>,
    /// View to open at startup: gallery, timeline or live
    #[arg(long, value_name = "MODE")]
    mode: Option<ViewMode>,
    /// Fetch the frame list once, print it and exit
    #[arg(long)]
    list: bool,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new(Level::DEBUG.as_str()),
        _ => EnvFilter::new(Level::TRACE.as_str()),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        base_url,
        rate,
        mode,
        list,
        verbose,
    } = Args::parse();
    init_tracing(verbose);

    let mut cfg = match &config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(url) = base_url {
        cfg.base_url = url;
    }
    if let Some(fps) = rate {
        cfg.playback_rate = PlaybackRate::new(fps).context("invalid --rate")?;
    }
    if let Some(mode) = mode {
        cfg.start_mode = mode;
    }
    let cfg = cfg.validated().context("invalid configuration values")?;
    tracing::info!(
        base_url = %cfg.base_url,
        request_timeout = %humantime::format_duration(cfg.request_timeout),
        live_poll_interval = %humantime::format_duration(cfg.live_poll_interval),
        rate = %cfg.playback_rate,
        mode = %cfg.start_mode,
        "configuration loaded"
    );

    let source = Arc::new(HttpFrameSource::new(&cfg.base_url, cfg.request_timeout)?);
    let render_opts = RenderOptions {
        base_url: source.base_url().to_string(),
        timezone: cfg.timezone,
    };

    if list {
        return run_listing(source.as_ref(), &render_opts).await;
    }

    let (command_tx, command_rx) = mpsc::channel::<ViewerCommand>(32); // Input -> Viewer
    let (snapshot_tx, snapshot_rx) = watch::channel(viewer::ViewSnapshot::default()); // Viewer -> Printer
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let mut tasks = JoinSet::new();

    tasks.spawn({
        let lines = input::spawn_stdin_reader();
        let cancel = cancel.clone();
        async move {
            input::run(lines, command_tx, cancel)
                .await
                .context("input task failed")
        }
    });

    tasks.spawn({
        let cancel = cancel.clone();
        async move { print_snapshots(snapshot_rx, render_opts, cancel).await }
    });

    println!("{}", input::HELP);
    let frame_source: Arc<dyn FrameSource> = source;
    if let Err(e) = viewer::run(
        frame_source,
        viewer::ViewerOptions::from(&cfg),
        command_rx,
        snapshot_tx,
        cancel.clone(),
    )
    .await
    .context("viewer failed")
    {
        tracing::error!("{e:?}");
    }
    // Ensure other tasks are asked to stop
    cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }

    Ok(())
}

async fn run_listing(source: &HttpFrameSource, opts: &RenderOptions) -> Result<()> {
    let frames = source
        .list_frames()
        .await
        .with_context(|| format!("failed to list frames from {}", source.base_url()))?;
    let view = viewer::ViewSnapshot {
        frames: Arc::new(frames),
        ..viewer::ViewSnapshot::default()
    };
    print!("{}", render::render(&view, opts));
    Ok(())
}

async fn print_snapshots(
    mut snapshots: watch::Receiver<viewer::ViewSnapshot>,
    opts: RenderOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let mut last_rendered = String::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let text = render::render(&snapshots.borrow_and_update(), &opts);
                if text != last_rendered {
                    println!("{text}");
                    last_rendered = text;
                }
            }
        }
    }
    Ok(())
}
