//! Periodic sweeps of expired cache entries.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{CacheError, CacheResult};
use crate::provider::CacheProvider;

/// A background thread calling [`CacheProvider::cleanup`] at a fixed
/// interval. Stops when dropped.
pub struct CacheCleaner {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CacheCleaner {
    /// Start sweeping `provider` every `interval`, `batch_size` entries per
    /// pass.
    ///
    /// # Errors
    ///
    /// Fails if the thread cannot be spawned.
    pub fn start(
        provider: Arc<dyn CacheProvider>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        batch_size: usize,
    ) -> CacheResult<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("dirstore-cache-cleanup".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        match provider.cleanup(clock.now(), batch_size) {
                            Ok(0) => {}
                            Ok(removed) => debug!(removed, "cache cleanup pass"),
                            Err(err) => warn!(error = %err, "cache cleanup pass failed"),
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| CacheError::configuration(format!("cannot start cache cleanup: {e}")))?;
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("cache cleanup thread panicked");
            }
        }
    }
}

impl Drop for CacheCleaner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
