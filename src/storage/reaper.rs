//! Background Reaper
//!
//! Reads evict expired entries lazily, but a key that is never read again
//! would sit on disk forever. The reaper is a background task that walks
//! the whole store and deletes every expired entry it finds.
//!
//! ## Design
//!
//! The reaper runs as a Tokio task and:
//! 1. Sweeps the store on the blocking pool
//! 2. Logs what the sweep evicted, or why it gave up
//! 3. Sleeps for the configured interval, then starts over
//!
//! The sleep starts after the sweep finishes, so a slow sweep stretches
//! the period. A sweep that meets an undecodable file stops there; the next
//! sweep still runs on schedule.
//!
//! The task only holds a weak reference to the store, and it exits once the
//! store is dropped or the [`Reaper`] handle is stopped.

use crate::error::{CacheError, Result};
use crate::storage::envelope::{unix_now, Entry};
use crate::storage::file::{for_each_entry, remove_if_present, FileCache};
use std::fs;
use std::io::ErrorKind;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, trace};

/// Configuration for the reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Pause between the end of one sweep and the start of the next
    pub interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(crate::DEFAULT_GC_INTERVAL),
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Entry files decoded
    pub scanned: u64,
    /// Expired entries deleted
    pub evicted: u64,
}

/// A handle to the running reaper.
///
/// When this handle is dropped, the reaper task will be stopped.
#[derive(Debug)]
pub struct Reaper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl Reaper {
    /// Starts the reaper on the current Tokio runtime.
    ///
    /// The first sweep runs right away. Fails with
    /// [`CacheError::Config`] when called outside a runtime.
    pub fn start(cache: Weak<FileCache>, config: ReaperConfig) -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            CacheError::Config("the reaper must be started inside a Tokio runtime".to_string())
        })?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        handle.spawn(reaper_loop(cache, config.clone(), shutdown_rx));

        info!(
            interval_secs = config.interval.as_secs(),
            "Background reaper started"
        );

        Ok(Self { shutdown_tx })
    }

    /// Stops the reaper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Background reaper stopped");
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main reaper loop.
async fn reaper_loop(
    cache: Weak<FileCache>,
    config: ReaperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let Some(store) = cache.upgrade() else {
            debug!("Store dropped, reaper exiting");
            return;
        };

        match tokio::task::spawn_blocking(move || sweep(&store)).await {
            Ok(Ok(stats)) if stats.evicted > 0 => {
                debug!(
                    scanned = stats.scanned,
                    evicted = stats.evicted,
                    "Expired entries reaped"
                );
            }
            Ok(Ok(stats)) => {
                trace!(scanned = stats.scanned, "Sweep found nothing to reap");
            }
            Ok(Err(e)) => {
                error!("error garbage collecting cache files: {}", e);
            }
            Err(e) => {
                error!("reaper sweep task failed: {}", e);
            }
        }

        // Wait for the interval or shutdown signal
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Reaper received shutdown signal");
                    return;
                }
            }
        }
    }
}

/// Walks the store and deletes every expired entry.
///
/// Files or directories that vanish mid-walk are skipped, including a root
/// removed by a flush, and so are temp files of writes still in flight.
/// Any other I/O failure, or a file that does not decode, aborts the sweep.
pub fn sweep(cache: &FileCache) -> Result<SweepStats> {
    let mut stats = SweepStats::default();

    for_each_entry(cache.root(), |entry| {
        let path = entry.path();
        let digest = entry.file_name().to_string_lossy();
        let _guard = cache.lock_digest(&digest);

        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let item = Entry::decode(&data).map_err(|e| match e {
            CacheError::Decode(msg) => {
                CacheError::Decode(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        stats.scanned += 1;

        if item.is_expired(unix_now()) {
            remove_if_present(path)?;
            stats.evicted += 1;
            trace!(path = %path.display(), "Reaped expired entry");
        }
        Ok(())
    })?;

    Ok(stats)
}
