//! End-of-media handling
//!
//! The engine reports end of media on a thread it owns, tagged with the
//! playback epoch the finished media was loaded under. The callback
//! registered here only posts that tag to a worker; the worker waits out
//! the debounce and then asks the controller to advance, which it refuses
//! to do if the epoch has moved.

use crate::player::{EndOfMediaCallback, PlaybackController};
use crate::utils::error::Result;
use crossbeam_channel::{select, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Notification posted from the engine thread
#[derive(Debug, Clone, Copy)]
struct EndOfMedia {
    epoch: u64,
}

/// Engine-side half: cheap, non-blocking, never touches player state
#[derive(Clone)]
pub struct EndOfMediaNotifier {
    tx: Sender<EndOfMedia>,
}

impl EndOfMediaNotifier {
    /// Wake the worker for the media that was loaded at `epoch`
    pub fn notify(&self, epoch: u64) {
        debug!("End of media loaded at epoch {}", epoch);
        if self.tx.send(EndOfMedia { epoch }).is_err() {
            debug!("End-of-media worker gone, notification dropped");
        }
    }

    /// Wrap as an engine callback
    pub fn into_callback(self) -> EndOfMediaCallback {
        Box::new(move |epoch| self.notify(epoch))
    }
}

/// Worker that turns end-of-media notifications into auto-advance
pub struct EndOfMediaHandler {
    notifier: EndOfMediaNotifier,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl EndOfMediaHandler {
    /// Start the worker and register its notifier with the controller's engine
    pub fn spawn(controller: Arc<PlaybackController>, debounce: Duration) -> Result<Self> {
        let (tx, rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = unbounded();
        let notifier = EndOfMediaNotifier { tx };

        controller
            .engine()
            .on_end_of_media(notifier.clone().into_callback());

        let worker = thread::Builder::new()
            .name("ledpro-advance".to_string())
            .spawn(move || run_worker(controller, rx, shutdown_rx, debounce))?;

        info!("End-of-media handler started, debounce {:?}", debounce);
        Ok(Self {
            notifier,
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
        })
    }

    /// Another handle for posting notifications
    pub fn notifier(&self) -> EndOfMediaNotifier {
        self.notifier.clone()
    }

    /// Stop the worker and wait for it. Pending notifications are dropped.
    pub fn shutdown(&mut self) {
        // Dropping the sender disconnects the worker's shutdown receiver
        self.shutdown.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("End-of-media worker panicked");
            }
        }
    }
}

impl Drop for EndOfMediaHandler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    controller: Arc<PlaybackController>,
    events: Receiver<EndOfMedia>,
    shutdown: Receiver<()>,
    debounce: Duration,
) {
    loop {
        select! {
            recv(events) -> event => {
                let Ok(EndOfMedia { epoch }) = event else { break };

                // Debounce, but wake immediately on shutdown
                match shutdown.recv_timeout(debounce) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => break,
                }

                match controller.advance_after_end_of_media(epoch) {
                    Ok(true) => debug!("Auto-advanced after end of media"),
                    Ok(false) => {}
                    Err(e) => warn!("Auto-advance failed: {}", e),
                }
            }
            recv(shutdown) -> _ => break,
        }
    }
    debug!("End-of-media worker stopped");
}
