//! LEDPro: controller for an always-on video display
//!
//! Producers call the [`player::PlaybackController`] (usually through the
//! [`control::ControlSurface`]); surface effects travel as commands to the
//! [`display::Dispatcher`] running on the surface thread, and a background
//! sampler publishes [`telemetry`] snapshots. [`context::AppContext`] wires
//! it all together.

pub mod context;
pub mod control;
pub mod display;
pub mod player;
pub mod status;
pub mod telemetry;
pub mod utils;

pub use context::{AppContext, ContextBuilder};
pub use control::{ControlRequest, ControlResponse, ControlSurface};
pub use status::PlayerStatus;
pub use utils::{Config, PlayerError, Result};
