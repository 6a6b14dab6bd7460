//! Player state store for LEDPro
//!
//! Holds the single authoritative in-memory [`PlayerState`] behind one
//! mutex and persists a JSON snapshot after every mutation. The lock is
//! held only for the in-memory update; snapshots are written after it has
//! been released.

use crate::player::{LoopMode, PlayerState, PlaylistItem};
use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A mutation result paired with the outcome of persisting it.
///
/// The in-memory change has already happened; `persisted` only reports
/// whether the snapshot reached disk.
#[must_use = "the persistence outcome should be reported"]
#[derive(Debug)]
pub struct Saved<T> {
    pub value: T,
    pub persisted: Result<()>,
}

impl<T> Saved<T> {
    /// Log a persistence failure and return the mutation result
    pub fn report(self, operation: &str) -> T {
        if let Err(e) = &self.persisted {
            warn!("State not persisted after {}: {}", operation, e);
        }
        self.value
    }
}

/// Result of appending items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Items actually added (duplicates of existing paths are skipped)
    pub added: usize,

    /// Playlist length before the append
    pub previous_len: usize,
}

/// Result of removing an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// The removed item
    pub item: PlaylistItem,

    /// Whether it was the current item (playback must stop)
    pub was_current: bool,
}

/// On-disk snapshot as written
#[derive(Serialize)]
struct SnapshotOut<'a> {
    playlist: &'a [PlaylistItem],
    target_monitor: i64,
    loop_mode: LoopMode,
    volume: u8,
    is_muted: bool,
    idle_image: &'a str,
}

/// On-disk snapshot as read; every field may be missing
#[derive(Deserialize, Default)]
struct SnapshotIn {
    playlist: Option<Vec<ItemIn>>,
    target_monitor: Option<i64>,
    loop_mode: Option<String>,
    volume: Option<i64>,
    is_muted: Option<bool>,
    idle_image: Option<String>,
}

#[derive(Deserialize)]
struct ItemIn {
    name: Option<String>,
    path: Option<PathBuf>,
    duration: Option<u64>,
}

/// Player state store
pub struct PlayerStateStore {
    /// Authoritative state
    state: Mutex<PlayerState>,

    /// Serializes snapshot writes so the newest state is written last
    write_lock: Mutex<()>,

    /// Snapshot location
    path: PathBuf,
}

impl PlayerStateStore {
    /// Open the store, loading the snapshot at `path` if present
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = Self::load(&path);
        info!(
            "Loaded player state from {:?}: {} playlist items, loop mode {}",
            path,
            state.playlist.len(),
            state.loop_mode
        );
        Self::with_state(path, state)
    }

    /// Create a store around an existing state without reading disk
    pub fn with_state(path: impl Into<PathBuf>, state: PlayerState) -> Self {
        Self {
            state: Mutex::new(state),
            write_lock: Mutex::new(()),
            path: path.into(),
        }
    }

    /// Snapshot location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a persisted snapshot.
    ///
    /// Missing fields take their defaults, playlist entries whose file no
    /// longer exists are dropped, and an unreadable or malformed file
    /// yields the default state.
    pub fn load(path: &Path) -> PlayerState {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!("No state snapshot at {:?}: {}", path, e);
                return PlayerState::default();
            }
        };

        let snapshot: SnapshotIn = match serde_json::from_str(&contents) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Ignoring malformed state snapshot {:?}: {}", path, e);
                return PlayerState::default();
            }
        };

        let mut state = PlayerState::default();

        if let Some(items) = snapshot.playlist {
            for item in items {
                let Some(path) = item.path else { continue };
                if !path.exists() {
                    info!("Dropping missing playlist entry {:?}", path);
                    continue;
                }
                if state.playlist.iter().any(|existing| existing.path == path) {
                    continue;
                }
                let name = item
                    .name
                    .unwrap_or_else(|| crate::utils::media::display_name(&path));
                state.playlist.push(PlaylistItem::new(name, path, item.duration.unwrap_or(0)));
            }
        }

        if let Some(target) = snapshot.target_monitor {
            state.target_display = usize::try_from(target).ok();
        }

        if let Some(mode) = snapshot.loop_mode {
            state.loop_mode = mode.parse().unwrap_or_else(|e| {
                warn!("{}, using {}", e, LoopMode::Sequential);
                LoopMode::Sequential
            });
        }

        if let Some(volume) = snapshot.volume {
            state.volume = volume.clamp(0, 100) as u8;
        }

        if let Some(muted) = snapshot.is_muted {
            state.muted = muted;
        }

        if let Some(idle_image) = snapshot.idle_image {
            state.idle_image = idle_image;
        }

        state
    }

    /// Write the current state to disk.
    ///
    /// The snapshot is taken after acquiring the write lock, so concurrent
    /// savers never overwrite a newer snapshot with an older one.
    pub fn save(&self) -> Result<()> {
        let _writer = self.write_lock.lock();
        let state = self.snapshot();
        write_snapshot(&self.path, &state)
    }

    /// Consistent copy of the state
    pub fn snapshot(&self) -> PlayerState {
        self.state.lock().clone()
    }

    /// Run a read-only closure against the state under the lock
    pub fn read<R>(&self, f: impl FnOnce(&PlayerState) -> R) -> R {
        f(&self.state.lock())
    }

    /// Apply an in-memory mutation, release the lock, then persist
    fn mutate<R>(&self, f: impl FnOnce(&mut PlayerState) -> R) -> Saved<R> {
        let value = {
            let mut state = self.state.lock();
            f(&mut state)
        };
        Saved {
            value,
            persisted: self.save(),
        }
    }

    /// Like [`mutate`](Self::mutate) but the closure may reject the change,
    /// in which case nothing is persisted
    fn try_mutate<R>(&self, f: impl FnOnce(&mut PlayerState) -> Result<R>) -> Result<Saved<R>> {
        let value = {
            let mut state = self.state.lock();
            f(&mut state)?
        };
        Ok(Saved {
            value,
            persisted: self.save(),
        })
    }

    /// Item at `index`
    pub fn item(&self, index: usize) -> Result<PlaylistItem> {
        self.read(|state| {
            state.playlist.get(index).cloned().ok_or(PlayerError::OutOfRange {
                index: index as i64,
                len: state.playlist.len(),
            })
        })
    }

    /// Append items; paths already in the playlist are skipped
    pub fn append(&self, items: Vec<PlaylistItem>) -> Saved<AppendOutcome> {
        self.mutate(|state| {
            let previous_len = state.playlist.len();
            for item in items {
                if state.playlist.iter().any(|existing| existing.path == item.path) {
                    debug!("Skipping duplicate playlist entry {:?}", item.path);
                    continue;
                }
                state.playlist.push(item);
            }
            AppendOutcome {
                added: state.playlist.len() - previous_len,
                previous_len,
            }
        })
    }

    /// Remove the item at `index`, keeping the current item's identity
    pub fn remove(&self, index: usize) -> Result<Saved<RemoveOutcome>> {
        self.try_mutate(|state| {
            if index >= state.playlist.len() {
                return Err(PlayerError::OutOfRange {
                    index: index as i64,
                    len: state.playlist.len(),
                });
            }

            let item = state.playlist.remove(index);
            let was_current = state.current_idx == Some(index);
            state.current_idx = match state.current_idx {
                Some(current) if current == index => None,
                Some(current) if index < current => Some(current - 1),
                other => other,
            };

            Ok(RemoveOutcome { item, was_current })
        })
    }

    /// Empty the playlist
    pub fn clear(&self) -> Saved<usize> {
        self.mutate(|state| {
            let removed = state.playlist.len();
            state.playlist.clear();
            state.current_idx = None;
            removed
        })
    }

    /// Reorder the playlist.
    ///
    /// `order[k]` is the old index of the item that moves to position `k`;
    /// it must be a permutation of `0..len`. The current item follows its
    /// new position.
    pub fn reorder(&self, order: &[usize]) -> Result<Saved<()>> {
        self.try_mutate(|state| {
            let len = state.playlist.len();
            if order.len() != len {
                return Err(PlayerError::InvalidInput(format!(
                    "Reorder expects {} indices, got {}",
                    len,
                    order.len()
                )));
            }

            let mut seen = vec![false; len];
            for &old in order {
                if old >= len || std::mem::replace(&mut seen[old], true) {
                    return Err(PlayerError::InvalidInput(format!(
                        "Reorder indices are not a permutation of 0..{}",
                        len
                    )));
                }
            }

            state.playlist = order.iter().map(|&old| state.playlist[old].clone()).collect();
            state.current_idx = state
                .current_idx
                .and_then(|current| order.iter().position(|&old| old == current));

            Ok(())
        })
    }

    /// Set the current index
    pub fn set_current(&self, index: Option<usize>) -> Result<Saved<()>> {
        self.try_mutate(|state| {
            if let Some(i) = index {
                if i >= state.playlist.len() {
                    return Err(PlayerError::OutOfRange {
                        index: i as i64,
                        len: state.playlist.len(),
                    });
                }
            }
            state.current_idx = index;
            Ok(())
        })
    }

    /// Set the loop mode
    pub fn set_loop_mode(&self, mode: LoopMode) -> Saved<()> {
        self.mutate(|state| state.loop_mode = mode)
    }

    /// Move to the next loop mode, returning it
    pub fn cycle_loop_mode(&self) -> Saved<LoopMode> {
        self.mutate(|state| {
            state.loop_mode = state.loop_mode.next();
            state.loop_mode
        })
    }

    /// Set the volume, clamped to `[0, 100]`
    pub fn set_volume(&self, volume: i64) -> Saved<u8> {
        self.mutate(|state| {
            state.volume = volume.clamp(0, 100) as u8;
            state.volume
        })
    }

    /// Set the mute flag
    pub fn set_muted(&self, muted: bool) -> Saved<()> {
        self.mutate(|state| state.muted = muted)
    }

    /// Flip the mute flag, returning the new value
    pub fn toggle_muted(&self) -> Saved<bool> {
        self.mutate(|state| {
            state.muted = !state.muted;
            state.muted
        })
    }

    /// Set the target display
    pub fn set_target_display(&self, target: Option<usize>) -> Saved<()> {
        self.mutate(|state| state.target_display = target)
    }

    /// Target `index`, or clear the target if it is already `index`.
    /// Returns the new target.
    pub fn toggle_target_display(&self, index: usize) -> Saved<Option<usize>> {
        self.mutate(|state| {
            state.target_display = if state.target_display == Some(index) {
                None
            } else {
                Some(index)
            };
            state.target_display
        })
    }

    /// Set the idle image file name (empty for none)
    pub fn set_idle_image(&self, name: impl Into<String>) -> Saved<()> {
        let name = name.into();
        self.mutate(|state| state.idle_image = name)
    }
}

/// Write `state` as a JSON snapshot, replacing `path` atomically
fn write_snapshot(path: &Path, state: &PlayerState) -> Result<()> {
    let snapshot = SnapshotOut {
        playlist: &state.playlist,
        target_monitor: state.target_display.map(|d| d as i64).unwrap_or(-1),
        loop_mode: state.loop_mode,
        volume: state.volume,
        is_muted: state.muted,
        idle_image: &state.idle_image,
    };

    let data = serde_json::to_string_pretty(&snapshot).persistence_err("Serializing state")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).persistence_err("Creating state directory")?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, data).persistence_err("Writing state snapshot")?;
    std::fs::rename(&tmp, path).persistence_err("Replacing state snapshot")?;

    Ok(())
}
