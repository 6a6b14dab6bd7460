//! Playback engine interface
//!
//! The native decode/render engine is an external collaborator. This
//! module defines the command surface the controller drives, the
//! end-of-media callback it delivers on its own thread, and a headless
//! implementation used when no native engine is linked in.

use crate::utils::error::{PlayerError, Result};
use log::{debug, info};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Native handle of the surface region that receives decoded video
pub type SurfaceHandle = u64;

/// Callback invoked by the engine, on a thread it owns, when media ends.
/// Receives the session tag the finished media was loaded with.
pub type EndOfMediaCallback = Box<dyn Fn(u64) + Send + Sync>;

/// Playback engine trait defining the native engine's command surface
pub trait PlaybackEngine: Send + Sync {
    /// Load a media file, replacing the current one. `session` is handed
    /// back to the end-of-media callback when this media finishes.
    fn load(&self, path: &Path, session: u64) -> Result<()>;

    /// Start or resume playback
    fn play(&self) -> Result<()>;

    /// Stop playback
    fn stop(&self) -> Result<()>;

    /// Pause playback
    fn pause(&self) -> Result<()>;

    /// Seek to `ms` milliseconds
    fn set_time(&self, ms: i64) -> Result<()>;

    /// Set volume (0 to 100)
    fn set_volume(&self, volume: u8) -> Result<()>;

    /// Mute/unmute audio
    fn set_mute(&self, muted: bool) -> Result<()>;

    /// Render into the given surface. Only called from the surface thread.
    fn bind_to_surface(&self, handle: SurfaceHandle) -> Result<()>;

    /// Whether media is currently playing
    fn is_playing(&self) -> bool;

    /// Current position in milliseconds, negative when unknown
    fn get_time(&self) -> i64;

    /// Media length in milliseconds, zero or negative when unknown
    fn get_length(&self) -> i64;

    /// Register the end-of-media callback
    fn on_end_of_media(&self, callback: EndOfMediaCallback);
}

/// Source of media durations, consulted when items are added
pub trait MediaProbe: Send + Sync {
    /// Duration of the media at `path` in whole seconds
    fn duration_secs(&self, path: &Path) -> Result<u64>;
}

/// Probe that knows no durations
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProbe;

impl MediaProbe for NullProbe {
    fn duration_secs(&self, _path: &Path) -> Result<u64> {
        Ok(0)
    }
}

#[derive(Debug, Default)]
struct HeadlessState {
    media: Option<PathBuf>,
    session: u64,
    playing: bool,
    /// Position accumulated before the current play run
    offset_ms: i64,
    started: Option<Instant>,
    volume: u8,
    muted: bool,
    surface: Option<SurfaceHandle>,
}

impl HeadlessState {
    fn position_ms(&self) -> i64 {
        let running = self
            .started
            .map(|s| s.elapsed().as_millis() as i64)
            .unwrap_or(0);
        self.offset_ms + running
    }
}

/// Engine that tracks transport state and a wall-clock position without
/// decoding anything. Media length is unknown, so status falls back to the
/// durations cached in the playlist, and it never reports end of media.
pub struct HeadlessEngine {
    state: Mutex<HeadlessState>,
    callback: Mutex<Option<EndOfMediaCallback>>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HeadlessState {
                volume: 100,
                ..HeadlessState::default()
            }),
            callback: Mutex::new(None),
        }
    }

    /// Currently loaded media
    pub fn media(&self) -> Option<PathBuf> {
        self.state.lock().media.clone()
    }

    /// Surface the engine is bound to
    pub fn surface(&self) -> Option<SurfaceHandle> {
        self.state.lock().surface
    }

    /// Current (volume, muted) pair
    pub fn audio(&self) -> (u8, bool) {
        let state = self.state.lock();
        (state.volume, state.muted)
    }

    /// Deliver an end-of-media notification as a native engine would
    pub fn finish_media(&self) {
        let session = {
            let mut state = self.state.lock();
            state.playing = false;
            state.started = None;
            state.session
        };
        if let Some(callback) = self.callback.lock().as_ref() {
            callback(session);
        }
    }
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackEngine for HeadlessEngine {
    fn load(&self, path: &Path, session: u64) -> Result<()> {
        if !path.exists() {
            return Err(PlayerError::engine(format!("Cannot open {}", path.display())));
        }
        let mut state = self.state.lock();
        state.media = Some(path.to_path_buf());
        state.session = session;
        state.playing = false;
        state.offset_ms = 0;
        state.started = None;
        info!("Headless engine loaded {:?}", path);
        Ok(())
    }

    fn play(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.media.is_none() {
            return Err(PlayerError::engine("No media loaded"));
        }
        if !state.playing {
            state.playing = true;
            state.started = Some(Instant::now());
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.playing = false;
        state.offset_ms = 0;
        state.started = None;
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.playing {
            state.offset_ms = state.position_ms();
            state.started = None;
            state.playing = false;
        }
        Ok(())
    }

    fn set_time(&self, ms: i64) -> Result<()> {
        let mut state = self.state.lock();
        state.offset_ms = ms.max(0);
        if state.playing {
            state.started = Some(Instant::now());
        }
        Ok(())
    }

    fn set_volume(&self, volume: u8) -> Result<()> {
        self.state.lock().volume = volume.min(100);
        Ok(())
    }

    fn set_mute(&self, muted: bool) -> Result<()> {
        self.state.lock().muted = muted;
        Ok(())
    }

    fn bind_to_surface(&self, handle: SurfaceHandle) -> Result<()> {
        debug!("Headless engine bound to surface {:#x}", handle);
        self.state.lock().surface = Some(handle);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn get_time(&self) -> i64 {
        let state = self.state.lock();
        if state.media.is_some() {
            state.position_ms()
        } else {
            -1
        }
    }

    fn get_length(&self) -> i64 {
        -1
    }

    fn on_end_of_media(&self, callback: EndOfMediaCallback) {
        *self.callback.lock() = Some(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_headless_transport() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"x").unwrap();

        let engine = HeadlessEngine::new();
        assert!(engine.play().is_err());
        assert!(engine.load(&dir.path().join("missing.mp4"), 1).is_err());

        engine.load(&path, 1).unwrap();
        assert_eq!(engine.media(), Some(path));
        engine.play().unwrap();
        assert!(engine.is_playing());

        engine.set_time(5_000).unwrap();
        assert!(engine.get_time() >= 5_000);
        engine.pause().unwrap();
        assert!(!engine.is_playing());
        let paused_at = engine.get_time();
        assert_eq!(engine.get_time(), paused_at);

        engine.stop().unwrap();
        assert_eq!(engine.get_time(), 0);
        assert_eq!(engine.get_length(), -1);
    }

    #[test]
    fn test_headless_end_of_media_callback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"x").unwrap();

        let engine = HeadlessEngine::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let last_session = Arc::new(AtomicU64::new(0));
        let (counter, seen) = (Arc::clone(&fired), Arc::clone(&last_session));
        engine.on_end_of_media(Box::new(move |session| {
            counter.fetch_add(1, Ordering::SeqCst);
            seen.store(session, Ordering::SeqCst);
        }));

        engine.load(&path, 7).unwrap();
        engine.play().unwrap();
        engine.finish_media();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(last_session.load(Ordering::SeqCst), 7);
        assert!(!engine.is_playing());

        // The tag belongs to the load, not to whatever runs afterwards
        engine.load(&path, 8).unwrap();
        engine.finish_media();
        assert_eq!(last_session.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_null_probe() {
        assert_eq!(NullProbe.duration_secs(Path::new("any.mp4")).unwrap(), 0);
    }
}
