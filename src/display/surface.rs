//! Display surface interface
//!
//! The surface is the on-screen window holding the video layer, the idle
//! image layer and any identifier overlays. Implementations are bound to
//! the thread that created them, which is why the trait does not require
//! `Send`.

use crate::display::topology::DisplayInfo;
use crate::player::SurfaceHandle;
use crate::utils::error::Result;
use log::info;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Identifier of an overlay window
pub type OverlayId = u64;

/// Surface trait implemented by the windowing layer
pub trait DisplaySurface {
    /// Make the surface full-screen on `display` and show it
    fn move_to(&mut self, display: &DisplayInfo) -> Result<()>;

    /// Hide the surface
    fn hide(&mut self) -> Result<()>;

    /// Put the idle image layer above the video
    fn show_idle_layer(&mut self) -> Result<()>;

    /// Remove the idle image layer
    fn hide_idle_layer(&mut self) -> Result<()>;

    /// Set the idle image, fitted to `width`x`height`; `None` clears it
    fn set_idle_image(&mut self, image: Option<&Path>, width: u32, height: u32) -> Result<()>;

    /// Put the video layer on top
    fn raise_video_layer(&mut self) -> Result<()>;

    /// Native handle the engine renders into
    fn video_handle(&self) -> SurfaceHandle;

    /// Show a full-screen identifier overlay on `display`
    fn show_overlay(&mut self, display: &DisplayInfo, label: &str) -> Result<OverlayId>;

    /// Close an overlay
    fn close_overlay(&mut self, id: OverlayId) -> Result<()>;
}

/// Operation applied to a [`HeadlessSurface`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceOp {
    MoveTo(usize),
    Hide,
    ShowIdle,
    HideIdle,
    SetIdleImage { image: Option<PathBuf>, width: u32, height: u32 },
    RaiseVideo,
    ShowOverlay { id: OverlayId, display: usize, label: String },
    CloseOverlay(OverlayId),
}

const HISTORY_LIMIT: usize = 256;

/// Surface without a window: logs every operation and keeps a short history
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    visible_on: Option<usize>,
    idle_visible: bool,
    next_overlay: OverlayId,
    open_overlays: Vec<OverlayId>,
    history: VecDeque<SurfaceOp>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display the surface is shown on
    pub fn visible_on(&self) -> Option<usize> {
        self.visible_on
    }

    /// Whether the idle layer is on top
    pub fn idle_visible(&self) -> bool {
        self.idle_visible
    }

    /// Overlays currently open
    pub fn open_overlays(&self) -> &[OverlayId] {
        &self.open_overlays
    }

    /// Recent operations, oldest first
    pub fn history(&self) -> impl Iterator<Item = &SurfaceOp> {
        self.history.iter()
    }

    fn record(&mut self, op: SurfaceOp) {
        info!("Surface: {:?}", op);
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(op);
    }
}

impl DisplaySurface for HeadlessSurface {
    fn move_to(&mut self, display: &DisplayInfo) -> Result<()> {
        self.visible_on = Some(display.index);
        self.record(SurfaceOp::MoveTo(display.index));
        Ok(())
    }

    fn hide(&mut self) -> Result<()> {
        self.visible_on = None;
        self.record(SurfaceOp::Hide);
        Ok(())
    }

    fn show_idle_layer(&mut self) -> Result<()> {
        self.idle_visible = true;
        self.record(SurfaceOp::ShowIdle);
        Ok(())
    }

    fn hide_idle_layer(&mut self) -> Result<()> {
        self.idle_visible = false;
        self.record(SurfaceOp::HideIdle);
        Ok(())
    }

    fn set_idle_image(&mut self, image: Option<&Path>, width: u32, height: u32) -> Result<()> {
        self.record(SurfaceOp::SetIdleImage {
            image: image.map(Path::to_path_buf),
            width,
            height,
        });
        Ok(())
    }

    fn raise_video_layer(&mut self) -> Result<()> {
        self.idle_visible = false;
        self.record(SurfaceOp::RaiseVideo);
        Ok(())
    }

    fn video_handle(&self) -> SurfaceHandle {
        0x1ed0
    }

    fn show_overlay(&mut self, display: &DisplayInfo, label: &str) -> Result<OverlayId> {
        self.next_overlay += 1;
        let id = self.next_overlay;
        self.open_overlays.push(id);
        self.record(SurfaceOp::ShowOverlay {
            id,
            display: display.index,
            label: label.to_string(),
        });
        Ok(id)
    }

    fn close_overlay(&mut self, id: OverlayId) -> Result<()> {
        self.open_overlays.retain(|&open| open != id);
        self.record(SurfaceOp::CloseOverlay(id));
        Ok(())
    }
}
