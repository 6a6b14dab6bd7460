//! Background telemetry sampler

use crate::telemetry::names::normalize_name;
use crate::telemetry::providers::{GpuProvider, SystemSource};
use crate::telemetry::{TelemetrySnapshot, DEFAULT_GPU_NAME};
use crate::utils::error::Result;
use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Shortest interval a throughput is computed over
const MIN_RATE_WINDOW: Duration = Duration::from_millis(100);

/// Throughput from consecutive absolute byte counters
#[derive(Debug, Default)]
pub struct NetRate {
    last: Option<(u64, u64, Instant)>,
}

impl NetRate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the counters seen at `now` and return `(up, down)` in bytes
    /// per second since the previous call. The first call, windows shorter
    /// than 100 ms and counter resets yield zero.
    pub fn update(&mut self, sent: u64, recv: u64, now: Instant) -> (f64, f64) {
        let rates = match self.last {
            Some((last_sent, last_recv, at)) => {
                let elapsed = now.saturating_duration_since(at);
                if elapsed < MIN_RATE_WINDOW {
                    (0.0, 0.0)
                } else {
                    let secs = elapsed.as_secs_f64();
                    (
                        sent.saturating_sub(last_sent) as f64 / secs,
                        recv.saturating_sub(last_recv) as f64 / secs,
                    )
                }
            }
            None => (0.0, 0.0),
        };
        self.last = Some((sent, recv, now));
        rates
    }
}

/// Lock-free view of the latest snapshot
#[derive(Clone)]
pub struct TelemetryReader {
    snapshot: Arc<ArcSwap<TelemetrySnapshot>>,
}

impl TelemetryReader {
    /// A reader that serves the loading placeholder until something is published
    pub fn new() -> Self {
        Self {
            snapshot: Arc::new(ArcSwap::from_pointee(TelemetrySnapshot::loading())),
        }
    }

    /// Latest snapshot
    pub fn current(&self) -> Arc<TelemetrySnapshot> {
        self.snapshot.load_full()
    }

    fn publish(&self, snapshot: TelemetrySnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }
}

impl Default for TelemetryReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-cycle sampling state, owned by the sampler thread
struct Cycle {
    source: Box<dyn SystemSource>,
    providers: Vec<Box<dyn GpuProvider>>,
    cpu_name: Option<String>,
    gpu_name: String,
    net: NetRate,
}

impl Cycle {
    fn new(source: Box<dyn SystemSource>, providers: Vec<Box<dyn GpuProvider>>) -> Self {
        Self {
            source,
            providers,
            cpu_name: None,
            gpu_name: DEFAULT_GPU_NAME.to_string(),
            net: NetRate::new(),
        }
    }

    fn run(&mut self, now: Instant) -> Result<TelemetrySnapshot> {
        let cpu_name = match &self.cpu_name {
            Some(name) => name.clone(),
            None => {
                let name = normalize_name(&self.source.cpu_name());
                info!("CPU: {}", name);
                self.cpu_name = Some(name.clone());
                name
            }
        };

        let counters = self.source.sample()?;
        let gpu_percent = self.sample_gpu();
        let (net_up_rate, net_down_rate) =
            self.net.update(counters.net_sent_total, counters.net_recv_total, now);

        Ok(TelemetrySnapshot {
            cpu_percent: counters.cpu_percent,
            cpu_name,
            mem_percent: counters.mem_percent,
            gpu_percent,
            gpu_name: self.gpu_name.clone(),
            net_up_rate,
            net_down_rate,
        })
    }

    /// First provider to answer wins; none answering reads as idle
    fn sample_gpu(&mut self) -> f32 {
        for provider in &mut self.providers {
            match provider.sample() {
                Ok(reading) => {
                    if let Some(name) = reading.name {
                        self.gpu_name = normalize_name(&name);
                    }
                    return reading.percent;
                }
                Err(e) => debug!("GPU provider {} failed: {}", provider.name(), e),
            }
        }
        0.0
    }
}

/// Background sampler thread
pub struct TelemetrySampler {
    reader: TelemetryReader,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl TelemetrySampler {
    /// Start sampling every `period`, publishing through `reader`
    pub fn start(
        reader: TelemetryReader,
        source: Box<dyn SystemSource>,
        providers: Vec<Box<dyn GpuProvider>>,
        period: Duration,
    ) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let publisher = reader.clone();
        let mut cycle = Cycle::new(source, providers);

        let worker = thread::Builder::new()
            .name("ledpro-telemetry".to_string())
            .spawn(move || {
                loop {
                    match cycle.run(Instant::now()) {
                        Ok(snapshot) => publisher.publish(snapshot),
                        Err(e) => warn!("Telemetry cycle failed: {}", e),
                    }

                    match shutdown_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
                debug!("Telemetry sampler stopped");
            })?;

        info!("Telemetry sampler started, period {:?}", period);
        Ok(Self {
            reader,
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
        })
    }

    pub fn reader(&self) -> TelemetryReader {
        self.reader.clone()
    }

    /// Signal the thread and wait for it
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.try_send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Telemetry sampler panicked");
            }
        }
    }
}

impl Drop for TelemetrySampler {
    fn drop(&mut self) {
        self.stop();
    }
}
