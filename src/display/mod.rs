//! Display module for LEDPro
//!
//! Everything that touches the display surface lives here. The surface
//! may only be mutated from the one thread that owns it, so producers
//! never call it directly: they send [`Command`]s through a
//! [`CommandSender`] and the [`Dispatcher`] running on the surface thread
//! applies them.

pub mod dispatcher;
pub mod surface;
pub mod topology;

pub use dispatcher::{Dispatcher, DispatcherStats, TickReport};
pub use surface::{DisplaySurface, HeadlessSurface, OverlayId, SurfaceOp};
pub use topology::{DisplayInfo, DisplayTopology, StaticTopology};

use crate::utils::error::{PlayerError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::trace;

/// Instruction for the surface thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Move the surface full-screen onto a display and show it
    MoveAndShow(usize),

    /// Hide the surface
    HideSurface,

    /// Flash an identifier on every display in turn
    ScreenTest,

    /// Put the idle image layer on top
    ShowIdleLayer,

    /// Remove the idle image layer
    HideIdleLayer,

    /// Reload the idle image from state
    RefreshIdleImage,

    /// Put the video layer on top and (re)bind the engine to it
    RaiseVideoLayer,
}

/// Producer side of the command channel. Cheap to clone; sending never blocks.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: Sender<Command>,
}

impl CommandSender {
    /// Queue a command for the surface thread
    pub fn send(&self, command: Command) -> Result<()> {
        trace!("Queueing {:?}", command);
        self.tx
            .send(command)
            .map_err(|e| PlayerError::Dispatcher(format!("{:?} not queued: channel closed", e.0)))
    }

    /// Commands waiting to be applied
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

/// Create the unbounded multi-producer, single-consumer command channel
pub fn command_channel() -> (CommandSender, Receiver<Command>) {
    let (tx, rx) = unbounded();
    (CommandSender { tx }, rx)
}
