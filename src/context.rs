//! Application context for LEDPro
//!
//! [`AppContext`] owns every long-lived service and wires them together.
//! It is built once by [`ContextBuilder`], started, handed the display
//! surface on the surface thread, and shut down explicitly.

use crate::control::ControlSurface;
use crate::display::{
    command_channel, Command, CommandSender, Dispatcher, DispatcherStats, DisplaySurface,
    DisplayTopology, StaticTopology,
};
use crate::player::{
    EndOfMediaHandler, HeadlessEngine, MediaProbe, NullProbe, PlaybackController, PlaybackEngine,
    PlayerStateStore,
};
use crate::telemetry::{
    providers_from_config, GpuProvider, SysinfoSource, SystemSource, TelemetryReader,
    TelemetrySampler,
};
use crate::utils::config::Config;
use crate::utils::error::{PlayerError, Result};
use crossbeam_channel::Receiver;
use log::{info, warn};
use std::sync::Arc;

/// Builder for [`AppContext`]
pub struct ContextBuilder {
    config: Config,
    engine: Option<Arc<dyn PlaybackEngine>>,
    topology: Option<Arc<dyn DisplayTopology>>,
    probe: Option<Arc<dyn MediaProbe>>,
    system_source: Option<Box<dyn SystemSource>>,
    gpu_providers: Option<Vec<Box<dyn GpuProvider>>>,
    telemetry: bool,
}

impl ContextBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            engine: None,
            topology: None,
            probe: None,
            system_source: None,
            gpu_providers: None,
            telemetry: true,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use a native playback engine instead of the headless one
    pub fn with_engine(mut self, engine: Arc<dyn PlaybackEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Use a live topology instead of the configured displays
    pub fn with_topology(mut self, topology: Arc<dyn DisplayTopology>) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn MediaProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Replace the sysinfo-backed source
    pub fn with_system_source(mut self, source: Box<dyn SystemSource>) -> Self {
        self.system_source = Some(source);
        self
    }

    /// Replace the configured GPU provider chain
    pub fn with_gpu_providers(mut self, providers: Vec<Box<dyn GpuProvider>>) -> Self {
        self.gpu_providers = Some(providers);
        self
    }

    /// Enable or disable the telemetry sampler
    pub fn with_telemetry(mut self, enabled: bool) -> Self {
        self.telemetry = enabled;
        self
    }

    /// Load state and construct the services. Nothing runs until
    /// [`AppContext::start`].
    pub fn build(self) -> Result<AppContext> {
        self.config.validate()?;

        let store = Arc::new(PlayerStateStore::open(&self.config.paths.state_file));
        let engine = self
            .engine
            .unwrap_or_else(|| Arc::new(HeadlessEngine::new()));
        let topology = self
            .topology
            .unwrap_or_else(|| Arc::new(StaticTopology::new(&self.config.displays)));
        let probe = self.probe.unwrap_or_else(|| Arc::new(NullProbe));

        let (commands, command_rx) = command_channel();
        let controller = Arc::new(PlaybackController::new(
            store,
            engine,
            commands.clone(),
            topology,
            probe,
        ));

        let telemetry_sources = if self.telemetry {
            let source = self
                .system_source
                .unwrap_or_else(|| Box::new(SysinfoSource::new()));
            let providers = self
                .gpu_providers
                .unwrap_or_else(|| providers_from_config(&self.config.telemetry.gpu_providers));
            Some((source, providers))
        } else {
            None
        };

        Ok(AppContext {
            config: self.config,
            controller,
            commands,
            command_rx: Some(command_rx),
            telemetry: TelemetryReader::new(),
            telemetry_sources,
            sampler: None,
            end_of_media: None,
        })
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide services
pub struct AppContext {
    config: Config,
    controller: Arc<PlaybackController>,
    commands: CommandSender,
    command_rx: Option<Receiver<Command>>,
    telemetry: TelemetryReader,
    telemetry_sources: Option<(Box<dyn SystemSource>, Vec<Box<dyn GpuProvider>>)>,
    sampler: Option<TelemetrySampler>,
    end_of_media: Option<EndOfMediaHandler>,
}

impl AppContext {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn controller(&self) -> &Arc<PlaybackController> {
        &self.controller
    }

    /// Producer handle for surface commands
    pub fn commands(&self) -> &CommandSender {
        &self.commands
    }

    /// Lock-free telemetry view
    pub fn telemetry(&self) -> TelemetryReader {
        self.telemetry.clone()
    }

    /// A control surface over this context's services
    pub fn control(&self) -> ControlSurface {
        ControlSurface::new(
            self.controller.clone(),
            self.telemetry.clone(),
            self.config.control.clone(),
            self.config.paths.video_dir.clone(),
            self.config.paths.idle_dir.clone(),
        )
    }

    /// Start the background workers and queue the surface restore sequence
    pub fn start(&mut self) -> Result<()> {
        for dir in [&self.config.paths.video_dir, &self.config.paths.idle_dir] {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!("Could not create {:?}: {}", dir, e);
            }
        }

        if self.end_of_media.is_none() {
            self.end_of_media = Some(EndOfMediaHandler::spawn(
                self.controller.clone(),
                self.config.playback.advance_debounce(),
            )?);
        }

        if let Some((source, providers)) = self.telemetry_sources.take() {
            self.sampler = Some(TelemetrySampler::start(
                self.telemetry.clone(),
                source,
                providers,
                self.config.telemetry.period(),
            )?);
        }

        self.controller.restore_surface();
        info!("LEDPro services started");
        Ok(())
    }

    /// Create the dispatcher around `surface`. Call on the surface thread;
    /// there is only one command receiver, so this succeeds once.
    pub fn dispatcher<S: DisplaySurface>(&mut self, surface: S) -> Result<Dispatcher<S>> {
        let commands = self.command_rx.take().ok_or_else(|| {
            PlayerError::Dispatcher("Dispatcher already created".to_string())
        })?;

        Ok(Dispatcher::new(
            surface,
            commands,
            self.controller.engine().clone(),
            self.controller.topology().clone(),
            self.controller.store().clone(),
            self.config.paths.idle_dir.clone(),
            &self.config.dispatcher,
        ))
    }

    /// Run the dispatcher on the calling thread until `shutdown` fires
    pub fn run_dispatcher<S: DisplaySurface>(
        &mut self,
        surface: S,
        shutdown: Receiver<()>,
    ) -> Result<DispatcherStats> {
        let dispatcher = self.dispatcher(surface)?;
        Ok(dispatcher.run(shutdown))
    }

    /// Stop the workers and the engine and write a final snapshot
    pub fn shutdown(&mut self) {
        info!("Shutting down LEDPro services");

        if let Some(mut handler) = self.end_of_media.take() {
            handler.shutdown();
        }
        if let Some(mut sampler) = self.sampler.take() {
            sampler.stop();
        }
        if let Err(e) = self.controller.engine().stop() {
            warn!("Engine stop failed: {}", e);
        }
        if let Err(e) = self.controller.store().save() {
            warn!("Final state save failed: {}", e);
        }
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        if self.end_of_media.is_some() || self.sampler.is_some() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{HeadlessSurface, SurfaceOp};
    use std::time::Instant;

    fn config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.paths.state_file = dir.join("state.json");
        config.paths.video_dir = dir.join("videos");
        config.paths.idle_dir = dir.join("idle");
        config
    }

    #[test]
    fn test_build_start_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = ContextBuilder::new()
            .with_config(config(dir.path()))
            .with_telemetry(false)
            .build()
            .unwrap();

        context.start().unwrap();
        assert!(dir.path().join("videos").is_dir());
        assert!(dir.path().join("idle").is_dir());

        let mut dispatcher = context.dispatcher(HeadlessSurface::new()).unwrap();
        assert!(context.dispatcher(HeadlessSurface::new()).is_err());

        dispatcher.tick(Instant::now());
        let ops: Vec<SurfaceOp> = dispatcher.surface().history().cloned().collect();
        assert_eq!(ops.first(), Some(&SurfaceOp::Hide));
        assert!(dispatcher.surface().idle_visible());

        context.shutdown();
    }

    #[test]
    fn test_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let videos = dir.path().join("videos");
        std::fs::create_dir_all(&videos).unwrap();
        std::fs::write(videos.join("a.mp4"), b"media").unwrap();

        {
            let mut context = ContextBuilder::new()
                .with_config(config(dir.path()))
                .with_telemetry(false)
                .build()
                .unwrap();
            context.start().unwrap();
            let control = context.control();
            control.handle(None, crate::control::ControlRequest::Append { path: "a.mp4".into() });
            control.handle(None, crate::control::ControlRequest::SetVolume { volume: 30 });
            context.shutdown();
        }

        let context = ContextBuilder::new()
            .with_config(config(dir.path()))
            .with_telemetry(false)
            .build()
            .unwrap();
        let state = context.controller().snapshot();
        assert_eq!(state.playlist.len(), 1);
        assert_eq!(state.volume, 30);
        assert_eq!(state.current_idx, None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.dispatcher.tick_ms = 0;
        assert!(matches!(
            ContextBuilder::new().with_config(config).build(),
            Err(PlayerError::Config(_))
        ));
    }
}
