use frame_model::{Frame, PlaybackRate, ViewMode};

use crate::error::FetchError;

/// User intents forwarded to the viewer task.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerCommand {
    SetMode(ViewMode),
    Play,
    Pause,
    TogglePlay,
    SetRate(PlaybackRate),
    Faster,
    Slower,
    First,
    Previous,
    Next,
    Last,
    Seek(usize),
    /// Gallery click: move the cursor and open the timeline in one step.
    SelectFrame(usize),
    ReloadFrames,
    /// Placeholder; video export is not implemented.
    CreateVideo,
}

/// Completion of a spawned fetch, delivered back to the viewer task.
#[derive(Debug)]
pub enum FetchOutcome {
    Frames(Result<Vec<Frame>, FetchError>),
    Latest(Result<Option<Frame>, FetchError>),
}
