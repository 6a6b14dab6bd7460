//! Playback controller for LEDPro
//!
//! The controller is the only writer of the player state. It drives the
//! external playback engine and turns every surface-affecting effect into
//! a [`Command`] for the dispatcher; it never touches the surface itself.
//!
//! Two locks are involved. The transport lock serializes whole
//! stop/load/play sequences and playlist restructuring; it is always taken
//! before the state store's own lock, which is held only for in-memory
//! updates.

use crate::display::{Command, CommandSender, DisplayTopology};
use crate::player::{
    AppendOutcome, LoopMode, MediaProbe, PlaybackEngine, PlaybackEpoch, PlayerState,
    PlayerStateStore, PlaylistItem,
};
use crate::utils::error::{PlayerError, Result};
use crate::utils::media;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Pick the index to play after `current` under `mode`.
///
/// Returns `None` only for an empty playlist. Random never repeats the
/// current item when there is another one to choose.
pub fn next_index<R: Rng + ?Sized>(
    mode: LoopMode,
    current: Option<usize>,
    len: usize,
    rng: &mut R,
) -> Option<usize> {
    if len == 0 {
        return None;
    }

    match mode {
        LoopMode::Sequential => Some(current.map(|c| (c + 1) % len).unwrap_or(0)),
        LoopMode::SingleRepeat => Some(current.filter(|&c| c < len).unwrap_or(0)),
        LoopMode::Random => {
            if len == 1 {
                return Some(0);
            }
            loop {
                let pick = rng.gen_range(0..len);
                if Some(pick) != current {
                    return Some(pick);
                }
            }
        }
    }
}

/// Treat any failure inside a transport sequence as an engine failure
fn as_engine_error(e: PlayerError) -> PlayerError {
    match e {
        PlayerError::Engine(_) => e,
        other => PlayerError::Engine(other.to_string()),
    }
}

/// Playback controller
pub struct PlaybackController {
    store: Arc<PlayerStateStore>,
    engine: Arc<dyn PlaybackEngine>,
    commands: CommandSender,
    topology: Arc<dyn DisplayTopology>,
    probe: Arc<dyn MediaProbe>,
    epoch: PlaybackEpoch,
    transport: Mutex<()>,
    rng: Mutex<StdRng>,
}

impl PlaybackController {
    pub fn new(
        store: Arc<PlayerStateStore>,
        engine: Arc<dyn PlaybackEngine>,
        commands: CommandSender,
        topology: Arc<dyn DisplayTopology>,
        probe: Arc<dyn MediaProbe>,
    ) -> Self {
        Self {
            store,
            engine,
            commands,
            topology,
            probe,
            epoch: PlaybackEpoch::new(),
            transport: Mutex::new(()),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn store(&self) -> &Arc<PlayerStateStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<dyn PlaybackEngine> {
        &self.engine
    }

    pub fn topology(&self) -> &Arc<dyn DisplayTopology> {
        &self.topology
    }

    /// Current playback session counter
    pub fn epoch(&self) -> &PlaybackEpoch {
        &self.epoch
    }

    /// Consistent copy of the player state
    pub fn snapshot(&self) -> PlayerState {
        self.store.snapshot()
    }

    pub fn is_playing(&self) -> bool {
        self.engine.is_playing()
    }

    /// Queue a follow-up command; a closed channel only means the surface
    /// thread is gone, which must not undo the state change already made
    fn issue(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            warn!("{}", e);
        }
    }

    /// Play the item at `index`
    pub fn play_by_index(&self, index: usize) -> Result<()> {
        let _transport = self.transport.lock();
        self.play_locked(index)
    }

    fn play_locked(&self, index: usize) -> Result<()> {
        let item = self.store.item(index)?;
        let session = self.epoch.bump();

        if let Err(e) = self.start_engine(&item, session) {
            error!("Failed to play {:?}: {}", item.path, e);
            if let Err(stop_err) = self.engine.stop() {
                debug!("Engine stop after failure: {}", stop_err);
            }
            self.store.set_current(None)?.report("engine failure");
            self.issue(Command::ShowIdleLayer);
            return Err(as_engine_error(e));
        }

        self.store.set_current(Some(index))?.report("play");
        self.issue(Command::RaiseVideoLayer);
        info!("Playing [{}] {}", index, item.name);
        Ok(())
    }

    fn start_engine(&self, item: &PlaylistItem, session: u64) -> Result<()> {
        if self.engine.is_playing() {
            self.engine.stop()?;
        }
        self.engine.load(&item.path, session)?;
        self.engine.play()?;

        let (volume, muted) = self.store.read(|state| (state.volume, state.muted));
        self.engine.set_volume(volume)?;
        self.engine.set_mute(muted)
    }

    fn stop_locked(&self) {
        self.epoch.bump();
        if let Err(e) = self.engine.stop() {
            warn!("Engine stop failed: {}", e);
        }
        // Clearing the index cannot be out of range
        if let Ok(saved) = self.store.set_current(None) {
            saved.report("stop");
        }
        self.issue(Command::ShowIdleLayer);
    }

    /// Stop playback and show the idle layer
    pub fn stop(&self) {
        let _transport = self.transport.lock();
        self.stop_locked();
        info!("Playback stopped");
    }

    /// Move to the next item according to the loop mode
    pub fn advance(&self) -> Result<()> {
        let _transport = self.transport.lock();
        self.advance_locked()
    }

    fn advance_locked(&self) -> Result<()> {
        let (mode, current, len) = self
            .store
            .read(|state| (state.loop_mode, state.current_idx, state.playlist.len()));

        match next_index(mode, current, len, &mut *self.rng.lock()) {
            Some(index) => self.play_locked(index),
            None => {
                debug!("Nothing to advance to, playlist is empty");
                self.stop_locked();
                Ok(())
            }
        }
    }

    /// Advance in response to the end of the media loaded at `epoch`.
    /// Returns `false` without doing anything when an explicit stop or
    /// play has happened since that load.
    pub fn advance_after_end_of_media(&self, epoch: u64) -> Result<bool> {
        let _transport = self.transport.lock();
        let current = self.epoch.current();
        if current != epoch {
            debug!("Ignoring stale end of media (epoch {} now {})", epoch, current);
            return Ok(false);
        }
        self.advance_locked()?;
        Ok(true)
    }

    /// Play the previous item, or the first one from the start
    pub fn previous(&self) -> Result<()> {
        let _transport = self.transport.lock();
        let current = self.store.read(|state| state.current_idx);
        let index = match current {
            Some(c) if c > 0 => c - 1,
            _ => 0,
        };
        self.play_locked(index)
    }

    /// Pause when playing, otherwise resume (or start from the top)
    pub fn toggle_pause(&self) -> Result<()> {
        let _transport = self.transport.lock();

        if self.engine.is_playing() {
            self.engine.pause().map_err(as_engine_error)?;
            info!("Playback paused");
            return Ok(());
        }

        let (current, len) = self.store.read(|state| (state.current_idx, state.playlist.len()));
        match current {
            None if len > 0 => self.play_locked(0),
            None => {
                debug!("Nothing to resume, playlist is empty");
                Ok(())
            }
            Some(_) => {
                self.engine.play().map_err(as_engine_error)?;
                self.issue(Command::HideIdleLayer);
                info!("Playback resumed");
                Ok(())
            }
        }
    }

    /// Seek the current media
    pub fn seek(&self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(PlayerError::InvalidInput(format!("Cannot seek to {}", seconds)));
        }
        self.engine
            .set_time((seconds * 1000.0) as i64)
            .map_err(as_engine_error)
    }

    /// Set the volume, clamped to `[0, 100]`. Also unmutes.
    pub fn set_volume(&self, volume: i64) -> Result<u8> {
        let _transport = self.transport.lock();
        let volume = self.store.set_volume(volume).report("set volume");
        self.store.set_muted(false).report("set volume");
        self.engine.set_volume(volume).map_err(as_engine_error)?;
        self.engine.set_mute(false).map_err(as_engine_error)?;
        Ok(volume)
    }

    /// Flip mute, returning the new value
    pub fn toggle_mute(&self) -> Result<bool> {
        let _transport = self.transport.lock();
        let muted = self.store.toggle_muted().report("toggle mute");
        self.engine.set_mute(muted).map_err(as_engine_error)?;
        Ok(muted)
    }

    /// Cycle sequential, single-repeat, random
    pub fn toggle_loop_mode(&self) -> LoopMode {
        let mode = self.store.cycle_loop_mode().report("toggle loop mode");
        info!("Loop mode is now {}", mode);
        mode
    }

    /// Show the surface on `target`, or hide it when `target` is already
    /// the current display or `None`. Returns the new target.
    pub fn set_target_display(&self, target: Option<usize>) -> Option<usize> {
        // Commands must be queued in the same order as the state changes
        let _transport = self.transport.lock();
        let new_target = match target {
            Some(index) => self.store.toggle_target_display(index).report("set target display"),
            None => {
                self.store.set_target_display(None).report("set target display");
                None
            }
        };

        match new_target {
            Some(index) => self.issue(Command::MoveAndShow(index)),
            None => self.issue(Command::HideSurface),
        }
        new_target
    }

    fn probe_item(&self, path: &Path) -> PlaylistItem {
        let duration = self.probe.duration_secs(path).unwrap_or_else(|e| {
            debug!("No duration for {:?}: {}", path, e);
            0
        });
        PlaylistItem::new(media::display_name(path), path, duration)
    }

    /// Append one media file
    pub fn append(&self, path: &Path) -> Result<AppendOutcome> {
        self.append_all(&[path.to_path_buf()])
    }

    /// Append media files; playback starts when the playlist was empty.
    ///
    /// Every path is checked before anything is added.
    pub fn append_all(&self, paths: &[PathBuf]) -> Result<AppendOutcome> {
        for path in paths {
            if !path.is_file() {
                return Err(PlayerError::NotFound(format!("Media file {}", path.display())));
            }
            if !media::is_video(path) {
                return Err(PlayerError::InvalidInput(format!(
                    "Not a supported video: {}",
                    path.display()
                )));
            }
        }

        let items: Vec<PlaylistItem> = paths.iter().map(|p| self.probe_item(p)).collect();

        let _transport = self.transport.lock();
        let outcome = self.store.append(items).report("append");
        info!("Added {} of {} items to the playlist", outcome.added, paths.len());

        if outcome.previous_len == 0 && outcome.added > 0 {
            self.play_locked(0)?;
        }
        Ok(outcome)
    }

    /// Append every video directly inside `dir`
    pub fn append_folder(&self, dir: &Path) -> Result<AppendOutcome> {
        if !dir.is_dir() {
            return Err(PlayerError::NotFound(format!("Folder {}", dir.display())));
        }
        let paths = media::list_videos(dir)?;
        self.append_all(&paths)
    }

    /// Remove the item at `index`, stopping playback if it was playing
    pub fn remove(&self, index: usize) -> Result<PlaylistItem> {
        let _transport = self.transport.lock();
        let outcome = self.store.remove(index)?.report("remove");

        if outcome.was_current {
            info!("Removed the playing item, stopping");
            self.epoch.bump();
            if let Err(e) = self.engine.stop() {
                warn!("Engine stop failed: {}", e);
            }
            self.issue(Command::ShowIdleLayer);
        }
        Ok(outcome.item)
    }

    /// Stop and empty the playlist, returning how many items were removed
    pub fn clear(&self) -> usize {
        let _transport = self.transport.lock();
        self.stop_locked();
        let removed = self.store.clear().report("clear");
        info!("Cleared {} playlist items", removed);
        removed
    }

    /// Reorder the playlist; see [`PlayerStateStore::reorder`]
    pub fn reorder(&self, order: &[usize]) -> Result<()> {
        let _transport = self.transport.lock();
        self.store.reorder(order)?.report("reorder");
        Ok(())
    }

    /// Select the idle image by file name; empty clears it
    pub fn set_idle_image(&self, name: &str) -> Result<()> {
        if !name.is_empty() {
            let bare = Path::new(name).file_name().map(|n| n == name).unwrap_or(false);
            if !bare || name.contains('\\') {
                return Err(PlayerError::InvalidInput(format!(
                    "Idle image must be a file name: {}",
                    name
                )));
            }
            if !media::is_image(Path::new(name)) {
                return Err(PlayerError::InvalidInput(format!("Not a supported image: {}", name)));
            }
        }

        self.store.set_idle_image(name).report("set idle image");
        self.issue(Command::RefreshIdleImage);
        Ok(())
    }

    /// Flash an identifier on every display
    pub fn request_screen_test(&self) -> Result<()> {
        self.commands.send(Command::ScreenTest)
    }

    /// Bring the surface and engine back to the persisted state at startup
    pub fn restore_surface(&self) {
        let _transport = self.transport.lock();
        let (target, volume, muted) =
            self.store.read(|state| (state.target_display, state.volume, state.muted));

        match target {
            Some(index) if self.topology.display(index).is_ok() => {
                self.issue(Command::MoveAndShow(index));
            }
            Some(index) => {
                info!("Target display {} is not connected, hiding surface", index);
                self.issue(Command::HideSurface);
            }
            None => self.issue(Command::HideSurface),
        }

        self.issue(Command::RefreshIdleImage);
        if !self.engine.is_playing() {
            self.issue(Command::ShowIdleLayer);
        }

        if let Err(e) = self
            .engine
            .set_volume(volume)
            .and_then(|_| self.engine.set_mute(muted))
        {
            warn!("Could not restore engine audio: {}", e);
        }
    }

    /// `(position, length)` in seconds. The length falls back to the
    /// cached item duration when the engine does not know it.
    pub fn playback_position(&self) -> (f64, f64) {
        let time = self.engine.get_time();
        let position = if time > 0 { time as f64 / 1000.0 } else { 0.0 };

        let length = self.engine.get_length();
        let length = if length > 0 {
            length as f64 / 1000.0
        } else {
            self.store
                .read(|state| state.current_item().map(|item| item.duration as f64))
                .unwrap_or(0.0)
        };

        (position, length)
    }
}
