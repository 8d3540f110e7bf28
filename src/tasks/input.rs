use std::io::{self, BufRead};

use anyhow::{Context, Result, anyhow, bail};
use frame_model::{PlaybackRate, ViewMode};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::ViewerCommand;

pub const HELP: &str = "\
commands:
  gallery | timeline | live      switch view
  play | pause | toggle          timeline playback
  rate <fps> | faster | slower   playback speed (0.5 to 10, step 0.5)
  first | prev | next | last     step through frames
  seek <n>                       jump to frame #n
  select <n>                     open frame #n in the timeline
  reload                         fetch the frame list again
  video                          export a video (not available)
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum InputAction {
    Command(ViewerCommand),
    Help,
    Quit,
}

/// Parse one line of user input. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<InputAction>> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(None);
    };
    let verb = word.to_ascii_lowercase();
    let arg = words.next();

    let action = match verb.as_str() {
        "gallery" | "timeline" | "live" => {
            InputAction::Command(ViewerCommand::SetMode(verb.parse::<ViewMode>()?))
        }
        "play" => InputAction::Command(ViewerCommand::Play),
        "pause" => InputAction::Command(ViewerCommand::Pause),
        "toggle" | "p" => InputAction::Command(ViewerCommand::TogglePlay),
        "rate" => {
            let raw = arg.ok_or_else(|| anyhow!("rate needs a value in fps"))?;
            let fps: f64 = raw
                .parse()
                .with_context(|| format!("'{raw}' is not a number"))?;
            InputAction::Command(ViewerCommand::SetRate(PlaybackRate::new(fps)?))
        }
        "faster" | "+" => InputAction::Command(ViewerCommand::Faster),
        "slower" | "-" => InputAction::Command(ViewerCommand::Slower),
        "first" => InputAction::Command(ViewerCommand::First),
        "prev" | "back" => InputAction::Command(ViewerCommand::Previous),
        "next" => InputAction::Command(ViewerCommand::Next),
        "last" => InputAction::Command(ViewerCommand::Last),
        "seek" => InputAction::Command(ViewerCommand::Seek(index_arg(&verb, arg)?)),
        "select" | "open" => InputAction::Command(ViewerCommand::SelectFrame(index_arg(&verb, arg)?)),
        "reload" | "retry" => InputAction::Command(ViewerCommand::ReloadFrames),
        "video" => InputAction::Command(ViewerCommand::CreateVideo),
        "help" | "?" => InputAction::Help,
        "quit" | "exit" | "q" => InputAction::Quit,
        other => bail!("unknown command '{other}' (try `help`)"),
    };
    Ok(Some(action))
}

fn index_arg(verb: &str, arg: Option<&str>) -> Result<usize> {
    let raw = arg.ok_or_else(|| anyhow!("{verb} needs a frame number"))?;
    let raw = raw.trim_start_matches('#');
    raw.parse()
        .with_context(|| format!("'{raw}' is not a frame number"))
}

/// Forward stdin lines from a plain thread.
///
/// A detached std thread is used instead of tokio's stdin so a pending read
/// does not hold up runtime shutdown.
pub fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel::<String>(16);
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    warn!("stdin read failed: {err}");
                    return;
                }
            }
        }
        debug!("stdin closed");
    });
    rx
}

/// Turn input lines into viewer commands until `quit`, EOF or cancellation.
pub async fn run(
    mut lines: Receiver<String>,
    to_viewer: Sender<ViewerCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            maybe_line = lines.recv() => {
                let Some(line) = maybe_line else {
                    info!("input closed; initiating shutdown");
                    cancel.cancel();
                    break;
                };
                match parse_line(&line) {
                    Ok(None) => {}
                    Ok(Some(InputAction::Command(cmd))) => {
                        if to_viewer.send(cmd).await.is_err() {
                            warn!("viewer channel closed");
                            break;
                        }
                    }
                    Ok(Some(InputAction::Help)) => println!("{HELP}"),
                    Ok(Some(InputAction::Quit)) => {
                        info!("quit requested");
                        cancel.cancel();
                        break;
                    }
                    Err(err) => warn!("{err:#}"),
                }
            }
        }
    }
    Ok(())
}
