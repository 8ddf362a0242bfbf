//! A background thread that periodically checks the edge server and publishes the latest
//! [`HealthStatus`].
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{mpsc::RecvTimeoutError, Arc, Condvar, Mutex, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use rand::{thread_rng, Rng};
use serde::Serialize;

use crate::{Error, Result};

/// Service name reported in every [`HealthStatus`].
pub const SERVICE_NAME: &str = "fluxgate-edge-server";

/// Snapshot of the edge server health, suitable for republishing on a monitoring endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    /// Whether the last check succeeded.
    pub healthy: bool,
    /// Human-readable summary.
    pub status: &'static str,
    /// Always [`SERVICE_NAME`].
    pub service: &'static str,
    /// Set when the check itself failed rather than reporting the server as down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the check finished.
    pub checked_at: DateTime<Utc>,
}

impl HealthStatus {
    /// Status of a check that returned `healthy`.
    pub fn from_check(healthy: bool) -> HealthStatus {
        HealthStatus {
            healthy,
            status: if healthy {
                "Edge server is reachable"
            } else {
                "Edge server is not reachable"
            },
            service: SERVICE_NAME,
            error: None,
            checked_at: Utc::now(),
        }
    }

    /// Status of a check that could not complete.
    pub fn failed(error: impl Into<String>) -> HealthStatus {
        HealthStatus {
            healthy: false,
            status: "Health check failed",
            service: SERVICE_NAME,
            error: Some(error.into()),
            checked_at: Utc::now(),
        }
    }
}

/// A health poller thread.
///
/// Calls the check immediately on start and then every `interval` minus a random jitter, keeping
/// the most recent [`HealthStatus`] available through [`HealthPoller::latest`]. Usually started
/// with [`Client::start_health_poller`](crate::Client::start_health_poller).
pub struct HealthPoller {
    join_handle: std::thread::JoinHandle<()>,

    /// Used to send a stop command to the poller thread.
    stop_sender: std::sync::mpsc::SyncSender<()>,

    /// Holds `None` until the first check finishes.
    latest: Arc<(Mutex<Option<HealthStatus>>, Condvar)>,
}

impl HealthPoller {
    /// Start the poller thread calling `check`.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the thread failed to start.
    pub fn start_with_check(
        check: impl Fn() -> bool + Send + 'static,
        interval: Duration,
        jitter: Duration,
    ) -> Result<HealthPoller> {
        // Buffer of 1 is enough: a second stop command can be dropped.
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);

        let latest = Arc::new((Mutex::new(None), Condvar::new()));

        let join_handle = {
            let latest = Arc::clone(&latest);
            let publish = move |status: HealthStatus| {
                *latest.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
                latest.1.notify_all();
            };

            std::thread::Builder::new()
                .name("fluxgate-health".to_owned())
                .spawn(move || loop {
                    let status = match catch_unwind(AssertUnwindSafe(&check)) {
                        Ok(healthy) => HealthStatus::from_check(healthy),
                        Err(_panic) => {
                            log::error!(target: "fluxgate", "health check panicked");
                            HealthStatus::failed("health check panicked")
                        }
                    };
                    log::debug!(target: "fluxgate",
                        healthy = status.healthy;
                        "health check finished");
                    publish(status);

                    match stop_receiver.recv_timeout(self::jitter(interval, jitter)) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                            log::debug!(target: "fluxgate", "health poller thread stopping");
                            return;
                        }
                    }
                })?
        };

        Ok(HealthPoller {
            join_handle,
            stop_sender,
            latest,
        })
    }

    /// Block until the first check has finished and return its status.
    pub fn wait_for_first_check(&self) -> HealthStatus {
        let lock = self.latest.0.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = self
            .latest
            .1
            .wait_while(lock, |status| status.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        match &*lock {
            Some(status) => status.clone(),
            // wait_while only returns once the slot is filled.
            None => HealthStatus::failed("health poller produced no status"),
        }
    }

    /// The most recent status, or `None` if no check has finished yet.
    pub fn latest(&self) -> Option<HealthStatus> {
        self.latest
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop the poller thread without waiting for it to exit.
    pub fn stop(&self) {
        // A full buffer means a stop command is already pending; a disconnected receiver means
        // the thread is gone. Both are fine.
        let _ = self.stop_sender.try_send(());
    }

    /// Stop the poller thread and block waiting for it to exit.
    ///
    /// # Errors
    ///
    /// - [`Error::HealthPollerPanicked`] if the thread has panicked.
    pub fn shutdown(self) -> Result<()> {
        self.stop();
        self.join_handle
            .join()
            .map_err(|_| Error::HealthPollerPanicked)?;
        Ok(())
    }
}

/// Apply randomized `jitter` to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    Duration::saturating_sub(interval, thread_rng().gen_range(Duration::ZERO..=jitter))
}
