use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use ledpro::display::HeadlessSurface;
use ledpro::utils::format_duration;
use ledpro::{Config, ContextBuilder};
use log::{error, info};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// LEDPro - always-on display controller
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media files to add to the playlist
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Player state file (overrides the configuration)
    #[arg(long, value_name = "PATH")]
    state_file: Option<PathBuf>,

    /// Show the surface on this display at startup
    #[arg(long, value_name = "INDEX")]
    display: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Loading configuration")?;
    if let Some(state_file) = args.state_file {
        config.paths.state_file = state_file;
    }

    // Initialize logging
    let log_level = if args.debug {
        "debug"
    } else {
        config.general.log_level.as_str()
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting LEDPro v{}", env!("CARGO_PKG_VERSION"));

    let mut context = ContextBuilder::new().with_config(config).build()?;
    let controller = context.controller().clone();

    if let Some(display) = args.display {
        controller
            .store()
            .set_target_display(Some(display))
            .report("startup display");
    }

    context.start()?;

    if !args.files.is_empty() {
        if let Err(e) = controller.append_all(&args.files) {
            error!("Could not add files: {}", e);
        }
    }

    let state = controller.snapshot();
    let total: u64 = state.playlist.iter().map(|item| item.duration).sum();
    info!(
        "Playlist: {} items, {} total, loop mode {}",
        state.playlist.len(),
        format_duration(Duration::from_secs(total)),
        state.loop_mode
    );

    // Ctrl-C watcher; the dispatcher keeps the main thread
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    thread::Builder::new()
        .name("ledpro-signals".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Signal runtime failed: {}", e);
                    return;
                }
            };

            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Interrupt received"),
                    Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
                }
            });
            let _ = shutdown_tx.send(());
        })
        .context("Spawning signal watcher")?;

    let stats = context.run_dispatcher(HeadlessSurface::new(), shutdown_rx)?;
    info!("Dispatcher ran {} ticks", stats.ticks);

    context.shutdown();
    Ok(())
}
