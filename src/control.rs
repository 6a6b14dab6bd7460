//! Control surface
//!
//! The single entry point remote clients go through. Requests arrive as
//! [`ControlRequest`] values (JSON-deserializable), pass the configured
//! [`AccessPolicy`], and every outcome, including every error, comes back
//! as a [`ControlResponse`].

use crate::player::PlaybackController;
use crate::status::PlayerStatus;
use crate::telemetry::TelemetryReader;
use crate::utils::config::AccessPolicy;
use crate::utils::error::{ErrorKind, PlayerError, Result};
use crate::utils::media::resolve_under;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// One control operation
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    Play { index: i64 },
    Advance,
    Previous,
    Stop,
    TogglePause,
    Seek { seconds: f64 },
    SetVolume { volume: i64 },
    ToggleMute,
    ToggleLoopMode,

    /// A negative or missing index clears the target
    SetTargetDisplay {
        #[serde(default)]
        index: Option<i64>,
    },

    /// Path relative to the video library
    Append { path: String },

    /// Folder relative to the video library
    AppendFolder { path: String },
    Remove { index: i64 },
    Clear,
    Reorder { order: Vec<i64> },

    /// File name in the idle image directory, empty to clear
    SetIdleImage { name: String },
    RequestScreenTest,
    GetStatus,
}

/// Response to a control request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlResponse {
    pub ok: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,

    /// Operation-specific fields, flattened into the response
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ControlResponse {
    pub fn ok() -> Self {
        Self {
            ok: true,
            error: None,
            kind: None,
            data: Map::new(),
        }
    }

    pub fn failure(error: &PlayerError) -> Self {
        Self {
            ok: false,
            error: Some(error.to_string()),
            kind: Some(error.kind()),
            data: Map::new(),
        }
    }

    /// Add a field
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    /// A field previously added with [`with`](Self::with)
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

fn to_index(index: i64, len: usize) -> Result<usize> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < len)
        .ok_or(PlayerError::OutOfRange { index, len })
}

/// Control surface facade
pub struct ControlSurface {
    controller: Arc<PlaybackController>,
    telemetry: TelemetryReader,
    policy: AccessPolicy,
    video_dir: PathBuf,
    idle_dir: PathBuf,
}

impl ControlSurface {
    pub fn new(
        controller: Arc<PlaybackController>,
        telemetry: TelemetryReader,
        policy: AccessPolicy,
        video_dir: PathBuf,
        idle_dir: PathBuf,
    ) -> Self {
        Self {
            controller,
            telemetry,
            policy,
            video_dir,
            idle_dir,
        }
    }

    /// Check a request's credentials against the access policy
    pub fn authorize(&self, token: Option<&str>) -> Result<()> {
        match &self.policy {
            AccessPolicy::TrustedNetwork => Ok(()),
            AccessPolicy::SharedToken { token: expected } => match token {
                Some(given) if given == expected => Ok(()),
                Some(_) => Err(PlayerError::AccessDenied("Invalid token".to_string())),
                None => Err(PlayerError::AccessDenied("Token required".to_string())),
            },
        }
    }

    /// Authorize and run a request. Never fails: errors become `ok: false`.
    pub fn handle(&self, token: Option<&str>, request: ControlRequest) -> ControlResponse {
        debug!("Control request {:?}", request);
        let description = format!("{:?}", request);

        match self.authorize(token).and_then(|_| self.execute(request)) {
            Ok(response) => response,
            Err(e) => {
                if e.is_validation() {
                    info!("Control request {} rejected: {}", description, e);
                } else {
                    warn!("Control request {} failed: {}", description, e);
                }
                ControlResponse::failure(&e)
            }
        }
    }

    /// Current status
    pub fn status(&self) -> PlayerStatus {
        PlayerStatus::collect(&self.controller, &self.telemetry, &self.idle_dir)
    }

    fn len(&self) -> usize {
        self.controller.store().read(|state| state.playlist.len())
    }

    fn execute(&self, request: ControlRequest) -> Result<ControlResponse> {
        let controller = &self.controller;

        let response = match request {
            ControlRequest::Play { index } => {
                controller.play_by_index(to_index(index, self.len())?)?;
                ControlResponse::ok()
            }
            ControlRequest::Advance => {
                controller.advance()?;
                ControlResponse::ok()
            }
            ControlRequest::Previous => {
                controller.previous()?;
                ControlResponse::ok()
            }
            ControlRequest::Stop => {
                controller.stop();
                ControlResponse::ok()
            }
            ControlRequest::TogglePause => {
                controller.toggle_pause()?;
                ControlResponse::ok().with("is_playing", json!(controller.is_playing()))
            }
            ControlRequest::Seek { seconds } => {
                controller.seek(seconds)?;
                ControlResponse::ok()
            }
            ControlRequest::SetVolume { volume } => {
                let volume = controller.set_volume(volume)?;
                ControlResponse::ok().with("volume", json!(volume))
            }
            ControlRequest::ToggleMute => {
                let muted = controller.toggle_mute()?;
                ControlResponse::ok().with("muted", json!(muted))
            }
            ControlRequest::ToggleLoopMode => {
                let mode = controller.toggle_loop_mode();
                ControlResponse::ok().with("mode", json!(mode))
            }
            ControlRequest::SetTargetDisplay { index } => {
                let target = index.and_then(|i| usize::try_from(i).ok());
                let target = controller.set_target_display(target);
                ControlResponse::ok().with("target_display", json!(target))
            }
            ControlRequest::Append { path } => {
                let path = resolve_under(&self.video_dir, &path)?;
                let outcome = controller.append(&path)?;
                ControlResponse::ok().with("count", json!(outcome.added))
            }
            ControlRequest::AppendFolder { path } => {
                let dir = resolve_under(&self.video_dir, &path)?;
                let outcome = controller.append_folder(&dir)?;
                ControlResponse::ok().with("count", json!(outcome.added))
            }
            ControlRequest::Remove { index } => {
                let item = controller.remove(to_index(index, self.len())?)?;
                ControlResponse::ok().with("removed", json!(item.name))
            }
            ControlRequest::Clear => {
                let removed = controller.clear();
                ControlResponse::ok().with("count", json!(removed))
            }
            ControlRequest::Reorder { order } => {
                let order = order
                    .into_iter()
                    .map(|i| {
                        usize::try_from(i).map_err(|_| {
                            PlayerError::InvalidInput(format!("Negative reorder index {}", i))
                        })
                    })
                    .collect::<Result<Vec<usize>>>()?;
                controller.reorder(&order)?;
                ControlResponse::ok()
            }
            ControlRequest::SetIdleImage { name } => {
                if !name.is_empty() && !resolve_under(&self.idle_dir, &name)?.is_file() {
                    return Err(PlayerError::NotFound(format!("Idle image {}", name)));
                }
                controller.set_idle_image(&name)?;
                ControlResponse::ok()
            }
            ControlRequest::RequestScreenTest => {
                controller.request_screen_test()?;
                ControlResponse::ok()
            }
            ControlRequest::GetStatus => {
                let status = serde_json::to_value(self.status())
                    .map_err(|e| PlayerError::InvalidInput(format!("Status not serializable: {}", e)))?;
                let mut response = ControlResponse::ok();
                if let Value::Object(fields) = status {
                    response.data = fields;
                }
                response
            }
        };

        Ok(response)
    }
}
