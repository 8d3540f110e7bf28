//! Text rendering of a [`ViewSnapshot`].

use std::fmt::Write as _;

use chrono_tz::Tz;
use frame_model::{Frame, ViewMode};

use crate::tasks::viewer::ViewSnapshot;

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub base_url: String,
    pub timezone: Tz,
}

pub fn format_timestamp(frame: &Frame, tz: Tz) -> String {
    frame
        .captured_at()
        .map(|at| at.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

pub fn render(view: &ViewSnapshot, opts: &RenderOptions) -> String {
    let mut out = String::new();
    out.push_str(&mode_bar(view.mode));
    out.push('\n');

    match view.mode {
        ViewMode::Live => render_live(&mut out, view, opts),
        ViewMode::Gallery | ViewMode::Timeline => {
            if view.frames.is_empty() {
                render_empty_store(&mut out, view);
            } else {
                if let Some(message) = &view.load_error {
                    let _ = writeln!(out, "! {message} (showing previously loaded frames)");
                }
                if view.mode == ViewMode::Gallery {
                    render_gallery(&mut out, view, opts);
                } else {
                    render_timeline(&mut out, view, opts);
                }
            }
        }
    }

    out
}

fn mode_bar(active: ViewMode) -> String {
    ViewMode::ALL
        .iter()
        .map(|mode| {
            if *mode == active {
                format!("[{mode}]")
            } else {
                format!(" {mode} ")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_empty_store(out: &mut String, view: &ViewSnapshot) {
    if view.loading {
        out.push_str("Loading frames...\n");
    } else if let Some(message) = &view.load_error {
        let _ = writeln!(out, "Error: {message}");
        out.push_str("Type `reload` to retry.\n");
    } else {
        out.push_str("No frames captured yet.\n");
    }
}

fn render_gallery(out: &mut String, view: &ViewSnapshot, opts: &RenderOptions) {
    let _ = writeln!(out, "{} frames", view.frames.len());
    for (index, frame) in view.frames.iter().enumerate() {
        let marker = if index == view.cursor { '>' } else { ' ' };
        let _ = writeln!(
            out,
            "{marker} #{index:<4} {:<25} {}",
            format_timestamp(frame, opts.timezone),
            frame.filename
        );
    }
}

fn render_timeline(out: &mut String, view: &ViewSnapshot, opts: &RenderOptions) {
    let Some(frame) = view.current_frame() else {
        return;
    };
    let _ = writeln!(
        out,
        "Frame #{} ({} of {})  {}",
        view.cursor,
        view.cursor + 1,
        view.frames.len(),
        frame.filename
    );
    let _ = writeln!(out, "Captured: {}", format_timestamp(frame, opts.timezone));
    let _ = writeln!(out, "Image:    {}", frame.image_url(&opts.base_url));
    let state = if view.playing { "Playing" } else { "Paused" };
    let _ = writeln!(out, "{state} at {}", view.rate);
}

fn render_live(out: &mut String, view: &ViewSnapshot, opts: &RenderOptions) {
    match &view.live_frame {
        Some(frame) => {
            let _ = writeln!(out, "Latest:   {}", frame.filename);
            let _ = writeln!(out, "Captured: {}", format_timestamp(frame, opts.timezone));
            let _ = writeln!(out, "Image:    {}", frame.image_url(&opts.base_url));
        }
        None => out.push_str("No live image available\n"),
    }
    let _ = writeln!(
        out,
        "Refreshing every {}",
        humantime::format_duration(view.live_poll_interval)
    );
}
