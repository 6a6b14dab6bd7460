//! Command dispatcher
//!
//! The dispatcher owns the display surface and is the only code that
//! mutates it. It lives on the surface thread: on every tick it drains
//! the commands queued so far, applies them in order, and advances any
//! scheduled screen-test step. A failing command is logged and skipped;
//! nothing escapes a tick.

use crate::display::surface::{DisplaySurface, OverlayId};
use crate::display::topology::{DisplayInfo, DisplayTopology};
use crate::display::Command;
use crate::player::{PlaybackEngine, PlayerStateStore};
use crate::utils::config::DispatcherConfig;
use crate::utils::error::{PlayerError, Result};
use crate::utils::media::resolve_under;
use crossbeam_channel::{select, Receiver};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Size used for the idle image when no plausible display size is known
const FALLBACK_SIZE: (u32, u32) = (1920, 1080);

/// Displays reporting less than this in either dimension are not trusted
const MIN_PLAUSIBLE_SIZE: u32 = 100;

/// Outcome of one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Commands applied successfully
    pub applied: usize,

    /// Commands that failed while being applied
    pub failed: usize,

    /// Commands dropped because their display is gone
    pub dropped: usize,
}

/// Lifetime totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    pub ticks: u64,
    pub applied: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Identifier chain in progress
#[derive(Debug)]
struct ScreenTest {
    displays: Vec<DisplayInfo>,
    next: usize,
    overlay: Option<OverlayId>,
    due: Instant,
}

/// Single consumer of the command channel, bound to the surface thread
pub struct Dispatcher<S: DisplaySurface> {
    surface: S,
    commands: Receiver<Command>,
    engine: Arc<dyn PlaybackEngine>,
    topology: Arc<dyn DisplayTopology>,
    store: Arc<PlayerStateStore>,
    idle_dir: PathBuf,
    tick_interval: Duration,
    screen_test_step: Duration,
    screen_test: Option<ScreenTest>,
    stats: DispatcherStats,
}

impl<S: DisplaySurface> Dispatcher<S> {
    /// Create a dispatcher around `surface` and bind the engine to it.
    ///
    /// Must be called on the thread that owns the surface.
    pub fn new(
        surface: S,
        commands: Receiver<Command>,
        engine: Arc<dyn PlaybackEngine>,
        topology: Arc<dyn DisplayTopology>,
        store: Arc<PlayerStateStore>,
        idle_dir: PathBuf,
        config: &DispatcherConfig,
    ) -> Self {
        if let Err(e) = engine.bind_to_surface(surface.video_handle()) {
            warn!("Initial engine bind failed: {}", e);
        }

        Self {
            surface,
            commands,
            engine,
            topology,
            store,
            idle_dir,
            tick_interval: config.tick(),
            screen_test_step: config.screen_test_step(),
            screen_test: None,
            stats: DispatcherStats::default(),
        }
    }

    /// The owned surface
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Lifetime totals
    pub fn stats(&self) -> DispatcherStats {
        self.stats
    }

    /// Whether a screen test is still running
    pub fn screen_test_active(&self) -> bool {
        self.screen_test.is_some()
    }

    /// Run ticks until `shutdown` fires or is dropped
    pub fn run(mut self, shutdown: Receiver<()>) -> DispatcherStats {
        info!("Dispatcher running, tick {:?}", self.tick_interval);
        let ticker = crossbeam_channel::tick(self.tick_interval);

        loop {
            select! {
                recv(ticker) -> _ => {
                    self.tick(Instant::now());
                }
                recv(shutdown) -> _ => break,
            }
        }

        // Apply whatever was queued before shutdown
        self.tick(Instant::now());
        info!(
            "Dispatcher stopped: {} applied, {} failed, {} dropped",
            self.stats.applied, self.stats.failed, self.stats.dropped
        );
        self.stats
    }

    /// Drain and apply every command queued before this call, then run
    /// the screen-test step if it is due
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        // Bound the batch so producers cannot starve the tick
        let batch = self.commands.len();
        for _ in 0..batch {
            let Ok(command) = self.commands.try_recv() else { break };
            match self.apply(command, now) {
                Ok(()) => report.applied += 1,
                Err(PlayerError::DisplayUnavailable(index)) => {
                    debug!("Dropping {:?}: display {} not connected", command, index);
                    report.dropped += 1;
                }
                Err(e) => {
                    warn!("Failed to apply {:?}: {}", command, e);
                    report.failed += 1;
                }
            }
        }

        self.step_screen_test(now);

        self.stats.ticks += 1;
        self.stats.applied += report.applied as u64;
        self.stats.failed += report.failed as u64;
        self.stats.dropped += report.dropped as u64;
        report
    }

    fn apply(&mut self, command: Command, now: Instant) -> Result<()> {
        debug!("Applying {:?}", command);
        match command {
            Command::MoveAndShow(index) => self.move_and_show(index),
            Command::HideSurface => self.surface.hide(),
            Command::ScreenTest => self.start_screen_test(now),
            Command::ShowIdleLayer => self.surface.show_idle_layer(),
            Command::HideIdleLayer => self.surface.hide_idle_layer(),
            Command::RefreshIdleImage => self.refresh_idle_image(),
            Command::RaiseVideoLayer => {
                self.surface.raise_video_layer()?;
                self.engine.bind_to_surface(self.surface.video_handle())
            }
        }
    }

    fn move_and_show(&mut self, index: usize) -> Result<()> {
        let display = self.topology.display(index)?;
        self.surface.move_to(&display)?;

        if let Err(e) = self.refresh_idle_image() {
            debug!("Idle image not refreshed after move: {}", e);
        }
        if !self.engine.is_playing() {
            self.surface.show_idle_layer()?;
        }
        Ok(())
    }

    fn refresh_idle_image(&mut self) -> Result<()> {
        let (idle_image, target) = self
            .store
            .read(|state| (state.idle_image.clone(), state.target_display));

        let (width, height) = self.idle_image_size(target);
        if idle_image.is_empty() {
            return self.surface.set_idle_image(None, width, height);
        }

        let path = resolve_under(&self.idle_dir, &idle_image)?;
        if !path.is_file() {
            return Err(PlayerError::NotFound(format!("Idle image {}", path.display())));
        }

        self.surface.set_idle_image(Some(&path), width, height)?;
        if !self.engine.is_playing() {
            self.surface.show_idle_layer()?;
        }
        Ok(())
    }

    fn idle_image_size(&self, target: Option<usize>) -> (u32, u32) {
        let displays = self.topology.displays().unwrap_or_default();
        let chosen = target
            .and_then(|t| displays.iter().find(|d| d.index == t))
            .or_else(|| displays.first());

        match chosen {
            Some(d) if d.width >= MIN_PLAUSIBLE_SIZE && d.height >= MIN_PLAUSIBLE_SIZE => {
                (d.width, d.height)
            }
            _ => FALLBACK_SIZE,
        }
    }

    fn start_screen_test(&mut self, now: Instant) -> Result<()> {
        // A new request restarts the chain
        if let Some(previous) = self.screen_test.take() {
            if let Some(id) = previous.overlay {
                self.surface.close_overlay(id)?;
            }
        }

        let displays = self.topology.displays()?;
        info!("Screen test across {} displays", displays.len());
        self.screen_test = Some(ScreenTest {
            displays,
            next: 0,
            overlay: None,
            due: now,
        });
        self.step_screen_test(now);
        Ok(())
    }

    /// Close the current identifier and show the next one, if due.
    /// Reschedules itself until every display has been shown.
    fn step_screen_test(&mut self, now: Instant) {
        let Some(mut test) = self.screen_test.take() else { return };
        if now < test.due {
            self.screen_test = Some(test);
            return;
        }

        if let Some(id) = test.overlay.take() {
            if let Err(e) = self.surface.close_overlay(id) {
                warn!("Failed to close screen test overlay: {}", e);
            }
        }

        let Some(display) = test.displays.get(test.next).copied() else {
            info!("Screen test finished");
            return;
        };

        let label = format!("SCR {}\n{}x{}", display.index + 1, display.width, display.height);
        match self.surface.show_overlay(&display, &label) {
            Ok(id) => test.overlay = Some(id),
            Err(e) => warn!("Failed to show screen test overlay on {}: {}", display.index, e),
        }

        test.next += 1;
        test.due = now + self.screen_test_step;
        self.screen_test = Some(test);
    }
}
