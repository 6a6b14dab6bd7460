//! Status report
//!
//! Everything a client needs to render the device in one serializable value.

use crate::display::DisplayInfo;
use crate::player::{LoopMode, PlaybackController, PlaylistItem};
use crate::telemetry::{TelemetryReader, TelemetryReport};
use crate::utils::media;
use log::warn;
use serde::Serialize;
use std::path::Path;

/// Snapshot of the player, the displays and the hardware
#[derive(Debug, Clone, Serialize)]
pub struct PlayerStatus {
    pub playlist: Vec<PlaylistItem>,

    /// Index of the current item, -1 for none
    pub current_idx: i64,
    pub current_item: Option<PlaylistItem>,
    pub is_playing: bool,
    pub position_seconds: f64,
    pub length_seconds: f64,
    pub displays: Vec<DisplayInfo>,
    pub target_display: Option<usize>,
    pub loop_mode: LoopMode,
    pub volume: u8,
    pub muted: bool,
    pub idle_image: String,

    /// Image files available in the idle directory
    pub idle_images: Vec<String>,
    pub telemetry: TelemetryReport,
}

impl PlayerStatus {
    pub fn collect(
        controller: &PlaybackController,
        telemetry: &TelemetryReader,
        idle_dir: &Path,
    ) -> Self {
        let state = controller.snapshot();
        let current_item = state.current_item().cloned();

        let (position_seconds, length_seconds) = if current_item.is_some() {
            controller.playback_position()
        } else {
            (0.0, 0.0)
        };

        let displays = controller.topology().displays().unwrap_or_else(|e| {
            warn!("Display enumeration failed: {}", e);
            Vec::new()
        });

        Self {
            current_idx: state.current_idx_raw(),
            current_item,
            is_playing: controller.is_playing(),
            position_seconds,
            length_seconds,
            displays,
            target_display: state.target_display,
            loop_mode: state.loop_mode,
            volume: state.volume,
            muted: state.muted,
            idle_image: state.idle_image,
            idle_images: media::list_images(idle_dir),
            telemetry: telemetry.current().report(),
            playlist: state.playlist,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{command_channel, StaticTopology};
    use crate::player::{HeadlessEngine, NullProbe, PlayerState, PlayerStateStore};
    use crate::utils::config::DisplayConfig;
    use std::sync::Arc;

    #[test]
    fn test_collect_status() {
        let dir = tempfile::tempdir().unwrap();
        let idle_dir = dir.path().join("idle");
        std::fs::create_dir(&idle_dir).unwrap();
        std::fs::write(idle_dir.join("logo.png"), b"png").unwrap();
        let clip = dir.path().join("a.mp4");
        std::fs::write(&clip, b"media").unwrap();

        let (tx, _rx) = command_channel();
        let store = Arc::new(PlayerStateStore::with_state(
            dir.path().join("state.json"),
            PlayerState::default(),
        ));
        let controller = PlaybackController::new(
            store,
            Arc::new(HeadlessEngine::new()),
            tx,
            Arc::new(StaticTopology::new(&[DisplayConfig { width: 1920, height: 1080, x: 0, y: 0 }])),
            Arc::new(NullProbe),
        );

        let reader = TelemetryReader::new();
        let idle = PlayerStatus::collect(&controller, &reader, &idle_dir);
        assert_eq!(idle.current_idx, -1);
        assert!(idle.current_item.is_none());
        assert_eq!(idle.idle_images, vec!["logo.png"]);
        assert_eq!(idle.telemetry.gpu_name, "Detecting...");

        controller.append(&clip).unwrap();
        let status = PlayerStatus::collect(&controller, &reader, &idle_dir);
        assert_eq!(status.current_idx, 0);
        assert!(status.is_playing);
        assert_eq!(status.displays.len(), 1);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["loop_mode"], "list");
        assert_eq!(json["current_item"]["name"], "a.mp4");
        assert_eq!(json["displays"][0]["width"], 1920);
        assert_eq!(json["target_display"], serde_json::Value::Null);
    }
}
