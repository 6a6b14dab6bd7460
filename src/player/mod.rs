//! Playback module for LEDPro
//!
//! This module holds the playlist data model, the persisted state store,
//! the playback controller that drives the external engine, and the
//! end-of-media handler that feeds engine notifications back into the
//! controller.

mod controller;
mod end_of_media;
mod engine;
mod state;

pub use controller::{next_index, PlaybackController};
pub use end_of_media::{EndOfMediaHandler, EndOfMediaNotifier};
pub use engine::{
    EndOfMediaCallback, HeadlessEngine, MediaProbe, NullProbe, PlaybackEngine, SurfaceHandle,
};
pub use state::{AppendOutcome, PlayerStateStore, RemoveOutcome, Saved};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Playlist item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    /// Display name
    pub name: String,

    /// File path, unique key of the item
    pub path: PathBuf,

    /// Duration in seconds, cached when the item was added
    #[serde(default)]
    pub duration: u64,
}

impl PlaylistItem {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, duration: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            duration,
        }
    }
}

/// Playlist advancement policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopMode {
    /// Play the next item, wrapping at the end
    #[default]
    #[serde(rename = "list")]
    Sequential,

    /// Replay the current item
    #[serde(rename = "single")]
    SingleRepeat,

    /// Pick any other item at random
    #[serde(rename = "random")]
    Random,
}

impl LoopMode {
    /// The next mode in the toggle cycle
    pub fn next(self) -> Self {
        match self {
            LoopMode::Sequential => LoopMode::SingleRepeat,
            LoopMode::SingleRepeat => LoopMode::Random,
            LoopMode::Random => LoopMode::Sequential,
        }
    }

    /// Persisted spelling
    pub fn as_str(self) -> &'static str {
        match self {
            LoopMode::Sequential => "list",
            LoopMode::SingleRepeat => "single",
            LoopMode::Random => "random",
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoopMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" | "sequential" => Ok(LoopMode::Sequential),
            "single" | "single-repeat" => Ok(LoopMode::SingleRepeat),
            "random" => Ok(LoopMode::Random),
            other => Err(format!("unknown loop mode '{}'", other)),
        }
    }
}

/// Player state
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    /// Ordered playlist
    pub playlist: Vec<PlaylistItem>,

    /// Index of the current item, `None` when nothing is current
    pub current_idx: Option<usize>,

    /// Advancement policy
    pub loop_mode: LoopMode,

    /// Display the surface is shown on, `None` when hidden
    pub target_display: Option<usize>,

    /// Volume level (0 to 100)
    pub volume: u8,

    /// Muted state
    pub muted: bool,

    /// Idle image file name, empty when none
    pub idle_image: String,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            playlist: Vec::new(),
            current_idx: None,
            loop_mode: LoopMode::Sequential,
            target_display: None,
            volume: 100,
            muted: false,
            idle_image: String::new(),
        }
    }
}

impl PlayerState {
    /// Current index in the wire convention (-1 for none)
    pub fn current_idx_raw(&self) -> i64 {
        self.current_idx.map(|i| i as i64).unwrap_or(-1)
    }

    /// The current item, if any
    pub fn current_item(&self) -> Option<&PlaylistItem> {
        self.current_idx.and_then(|i| self.playlist.get(i))
    }
}

/// Counter identifying the current explicit playback session.
///
/// Every explicit stop, play or load moves it forward. Work scheduled from
/// an asynchronous notification captures the value it observed and is
/// discarded if the counter has moved on by the time it runs.
#[derive(Debug, Clone, Default)]
pub struct PlaybackEpoch(Arc<AtomicU64>);

impl PlaybackEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Start a new session, returning its value
    pub(crate) fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}
