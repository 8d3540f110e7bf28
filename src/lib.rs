pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod render;
pub mod tasks {
    pub mod input;
    pub mod viewer;
}

pub use frame_model::{Frame, PlaybackRate, ViewMode};
