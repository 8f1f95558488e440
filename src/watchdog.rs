//! Ping-based liveness monitor
//!
//! The application pings the watchdog from its main work loop. If a whole
//! interval passes without a ping, the watchdog flips to
//! [`WatchDogStatus::Error`] and stays there.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Health reported by a [`WatchDog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchDogStatus {
    Ok,
    Error,
}

struct WatchState {
    last_ping: Option<Instant>,
    status: WatchDogStatus,
}

/// Liveness monitor
pub struct WatchDog {
    id: String,
    interval: Duration,
    state: Mutex<WatchState>,
}

impl WatchDog {
    /// Create a watchdog that expects a ping at least every `interval`
    pub fn new(id: impl Into<String>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            interval,
            state: Mutex::new(WatchState {
                last_ping: None,
                status: WatchDogStatus::Ok,
            }),
        })
    }

    /// Identifier used in logs
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Start watching; the check task ends when `shutdown` is cancelled
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        self.state.lock().last_ping = Some(Instant::now());
        let watchdog = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(watchdog.interval) => watchdog.check(),
                }
            }
            tracing::debug!(watchdog = %watchdog.id, "Watchdog stopped");
        })
    }

    fn check(&self) {
        let mut state = self.state.lock();
        let Some(last_ping) = state.last_ping else {
            return;
        };
        if last_ping.elapsed() > self.interval && state.status == WatchDogStatus::Ok {
            state.status = WatchDogStatus::Error;
            tracing::warn!(
                watchdog = %self.id,
                interval_ms = self.interval.as_millis() as u64,
                "No ping within interval"
            );
        }
    }

    /// Signal liveness
    pub fn ping(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.last_ping.is_none() {
            return Err(Error::WatchDogNotStarted(self.id.clone()));
        }
        state.last_ping = Some(Instant::now());
        Ok(())
    }

    /// Current health
    pub fn status(&self) -> WatchDogStatus {
        self.state.lock().status
    }

    /// Check if no interval was missed so far
    pub fn is_ok(&self) -> bool {
        self.status() == WatchDogStatus::Ok
    }
}

impl std::fmt::Debug for WatchDog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchDog")
            .field("id", &self.id)
            .field("interval", &self.interval)
            .field("status", &self.status())
            .finish()
    }
}
