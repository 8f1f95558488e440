//! Device lifecycle coordinator
//!
//! Owns the device set and runs the connection, reporting and polling
//! loops against it. Start-up waits until at least one device is known,
//! boots the devices, then launches the loops. Shutdown cancels the loops,
//! joins them in a fixed order, tears down the remote streams and closes
//! every booted device.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::HubContext;
use crate::device::{ConnectionState, DeviceDescriptor, DeviceDriver, DeviceHandle};
use crate::error::{DriverError, Error, Result};
use crate::stats::{CoordinatorStats, StatsSnapshot};

use super::config::CoordinatorConfig;
use super::device_set::{DeviceEntry, DeviceSet};
use super::loops;
use super::phase::{CoordinatorPhase, DeviceEvent};

#[derive(Default)]
struct LoopHandles {
    connection: Option<JoinHandle<()>>,
    reporting: Option<JoinHandle<()>>,
    polling: Option<JoinHandle<()>>,
}

/// State shared between the coordinator and its loops
pub(crate) struct Shared {
    pub(crate) config: CoordinatorConfig,
    pub(crate) driver: Arc<dyn DeviceDriver>,
    pub(crate) ctx: HubContext,
    pub(crate) devices: DeviceSet,
    pub(crate) cancel: CancellationToken,
    pub(crate) devices_changed: Notify,
    pub(crate) stats: CoordinatorStats,
    phase: Mutex<CoordinatorPhase>,
    events: broadcast::Sender<DeviceEvent>,
    loops: Mutex<LoopHandles>,
}

impl Shared {
    pub(crate) fn phase(&self) -> CoordinatorPhase {
        *self.phase.lock()
    }

    pub(crate) fn emit(&self, event: DeviceEvent) {
        // No subscriber is fine
        let _ = self.events.send(event);
    }

    /// Open and start a session on `entry` unless it is connected
    ///
    /// Returns true if a new session was attached. Refuses devices that
    /// were removed and any attach once shutdown began.
    async fn attach(&self, entry: &Arc<DeviceEntry>) -> Result<bool> {
        let mut slot = entry.slot().lock().await;

        if slot.as_ref().is_some_and(|h| h.is_connected()) {
            return Ok(false);
        }
        if self.cancel.is_cancelled() {
            return Err(Error::InvalidPhase(self.phase()));
        }
        if !self.devices.contains(entry) {
            return Err(Error::DeviceNotFound(entry.mxid().to_string()));
        }

        entry.set_state(ConnectionState::Connecting);
        match DeviceHandle::connect(self.driver.as_ref(), entry.descriptor()).await {
            Ok(handle) => {
                *slot = Some(handle);
                entry.set_state(ConnectionState::Connected);
                entry.mark_booted();
                drop(slot);

                tracing::info!(mxid = %entry.mxid(), "Device connected");
                self.emit(DeviceEvent::Connected {
                    mxid: entry.mxid().to_string(),
                });
                Ok(true)
            }
            Err(e) => {
                *slot = None;
                entry.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// [`attach`](Self::attach) bounded by the connect timeout and by
    /// cancellation
    pub(crate) async fn attach_bounded(&self, entry: &Arc<DeviceEntry>) -> Result<bool> {
        let timeout = self.config.connect_timeout;
        let attempt = tokio::time::timeout(timeout, self.attach(entry));

        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::InvalidPhase(self.phase())),
            result = attempt => result.unwrap_or_else(|_| {
                Err(Error::DeviceStart {
                    mxid: entry.mxid().to_string(),
                    source: DriverError::Unavailable(format!("no session after {timeout:?}")),
                })
            }),
        };

        if result.is_err() {
            // An interrupted attach leaves the state at Connecting
            let slot = entry.slot().lock().await;
            if slot.is_none() {
                entry.set_state(ConnectionState::Disconnected);
            }
        }
        result
    }

    /// Close the session of `entry`, if it has one
    ///
    /// Returns false if there was no session to close.
    async fn close_device(&self, entry: &DeviceEntry) -> Result<bool> {
        let mut slot = entry.slot().lock().await;
        let Some(mut handle) = slot.take() else {
            entry.set_state(ConnectionState::Disconnected);
            return Ok(false);
        };

        let was_connected = handle.state() != ConnectionState::Disconnected;
        let result = handle.stop().await;
        entry.set_state(ConnectionState::Disconnected);
        drop(slot);

        if was_connected {
            self.emit(DeviceEvent::Disconnected {
                mxid: entry.mxid().to_string(),
            });
        }

        result.map(|()| true).map_err(|source| Error::DeviceExit {
            mxid: entry.mxid().to_string(),
            source,
        })
    }
}

/// Lifecycle coordinator for a fleet of devices
///
/// Cloning gives another handle to the same coordinator, so `stop()` can
/// be called from a different task than `start()`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use camfleet::coordinator::DeviceCoordinator;
/// use camfleet::device::{DeviceDescriptor, SimulatedDevice, SimulatedDriver};
/// use camfleet::transport::MemoryHub;
///
/// # async fn run() -> camfleet::Result<()> {
/// let driver = Arc::new(SimulatedDriver::new());
/// driver.add_device(SimulatedDevice::new("14442C10D13EABCE00"));
///
/// let coordinator = DeviceCoordinator::new(driver, MemoryHub::new().context());
/// coordinator.add_device(DeviceDescriptor::new("14442C10D13EABCE00"))?;
/// coordinator.start().await?;
/// // ...
/// coordinator.stop().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DeviceCoordinator {
    shared: Arc<Shared>,
}

impl DeviceCoordinator {
    /// Create a coordinator with the default configuration
    pub fn new(driver: Arc<dyn DeviceDriver>, ctx: HubContext) -> Self {
        Self::with_config(CoordinatorConfig::default(), driver, ctx)
    }

    /// Create a coordinator with a custom configuration
    pub fn with_config(config: CoordinatorConfig, driver: Arc<dyn DeviceDriver>, ctx: HubContext) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            shared: Arc::new(Shared {
                config,
                driver,
                ctx,
                devices: DeviceSet::new(),
                cancel: CancellationToken::new(),
                devices_changed: Notify::new(),
                stats: CoordinatorStats::new(),
                phase: Mutex::new(CoordinatorPhase::Idle),
                events,
                loops: Mutex::new(LoopHandles::default()),
            }),
        }
    }

    /// Configuration the coordinator was built with
    pub fn config(&self) -> &CoordinatorConfig {
        &self.shared.config
    }

    /// Application context (transports, muxer, live views)
    pub fn context(&self) -> &HubContext {
        &self.shared.ctx
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> CoordinatorPhase {
        self.shared.phase()
    }

    /// Subscribe to device connect/disconnect events
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.shared.events.subscribe()
    }

    /// Snapshot of the coordinator counters
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Token cancelled when the coordinator shuts down
    ///
    /// Cancelling the returned token does not stop the coordinator.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shared.cancel.child_token()
    }

    /// Number of registered devices
    pub fn device_count(&self) -> usize {
        self.shared.devices.len()
    }

    /// Number of devices with a live session
    pub fn connected_count(&self) -> usize {
        self.shared.devices.connected_count()
    }

    /// Connection state of a device, if registered
    pub fn device_state(&self, mxid: &str) -> Option<ConnectionState> {
        self.shared.devices.get(mxid).map(|e| e.state())
    }

    /// Known devices and their states, in insertion order
    pub fn devices(&self) -> Vec<(DeviceDescriptor, ConnectionState)> {
        self.shared
            .devices
            .snapshot()
            .iter()
            .map(|e| (e.descriptor().clone(), e.state()))
            .collect()
    }

    /// Register a device
    ///
    /// While running, the connection loop attaches it on its next pass.
    pub fn add_device(&self, descriptor: DeviceDescriptor) -> Result<()> {
        let phase = self.phase();
        if matches!(phase, CoordinatorPhase::Stopping | CoordinatorPhase::Stopped) {
            return Err(Error::InvalidPhase(phase));
        }

        let entry = self.shared.devices.insert(descriptor)?;
        tracing::info!(mxid = %entry.mxid(), "Device added");
        self.shared.devices_changed.notify_waiters();
        Ok(())
    }

    /// Unregister a device, closing its session
    ///
    /// A close failure is logged; the device is removed regardless.
    pub async fn remove_device(&self, mxid: &str) -> Result<()> {
        let entry = self
            .shared
            .devices
            .remove(mxid)
            .ok_or_else(|| Error::DeviceNotFound(mxid.to_string()))?;

        if let Err(e) = self.shared.close_device(&entry).await {
            tracing::warn!(mxid = %mxid, error = %e, "Failed to close removed device");
        }
        tracing::info!(mxid = %mxid, "Device removed");
        Ok(())
    }

    /// Close a device's session and let the connection loop reattach it
    pub async fn restart_device(&self, mxid: &str) -> Result<()> {
        let entry = self
            .shared
            .devices
            .get(mxid)
            .ok_or_else(|| Error::DeviceNotFound(mxid.to_string()))?;

        self.shared.close_device(&entry).await?;
        tracing::info!(mxid = %mxid, "Device restarting");
        self.shared.devices_changed.notify_waiters();
        Ok(())
    }

    /// Start the coordinator
    ///
    /// Launches the connection loop, then waits until at least one device
    /// is registered, boots the registered devices and launches the
    /// reporting and polling loops. A device that fails to boot is left to
    /// the connection loop. Returns early, without error, if `stop()` is
    /// called meanwhile.
    pub async fn start(&self) -> Result<()> {
        let shared = &self.shared;
        {
            let mut phase = shared.phase.lock();
            if *phase != CoordinatorPhase::Idle {
                return Err(Error::InvalidPhase(*phase));
            }
            *phase = CoordinatorPhase::Starting;
        }
        tracing::info!(devices = shared.devices.len(), "Starting device coordinator");

        {
            let mut handles = shared.loops.lock();
            if shared.cancel.is_cancelled() {
                return Ok(());
            }
            handles.connection = Some(tokio::spawn(loops::connection_loop(Arc::clone(shared))));
        }

        if !self.wait_for_devices().await {
            tracing::info!("Start interrupted by shutdown");
            return Ok(());
        }

        for entry in shared.devices.snapshot() {
            if shared.cancel.is_cancelled() {
                break;
            }
            if let Err(e) = shared.attach_bounded(&entry).await {
                if shared.cancel.is_cancelled() {
                    break;
                }
                shared.stats.record_failed_attach();
                tracing::warn!(mxid = %entry.mxid(), error = %e, "Device failed to start");
            }
        }

        {
            let mut handles = shared.loops.lock();
            if shared.cancel.is_cancelled() {
                tracing::info!("Start interrupted by shutdown");
                return Ok(());
            }
            handles.reporting = Some(tokio::spawn(loops::reporting_loop(Arc::clone(shared))));
            handles.polling = Some(tokio::spawn(loops::polling_loop(Arc::clone(shared))));

            let mut phase = shared.phase.lock();
            if *phase == CoordinatorPhase::Starting {
                *phase = CoordinatorPhase::Running;
            }
        }

        // Devices that failed to boot or arrived after the boot pass
        shared.devices_changed.notify_waiters();

        tracing::info!(
            devices = shared.devices.len(),
            connected = shared.devices.connected_count(),
            "Device coordinator running"
        );
        Ok(())
    }

    /// Wait until a device is registered; false if cancelled first
    async fn wait_for_devices(&self) -> bool {
        let shared = &self.shared;

        loop {
            let changed = shared.devices_changed.notified();
            if !shared.devices.is_empty() {
                return true;
            }

            tokio::select! {
                _ = shared.cancel.cancelled() => return false,
                _ = changed => {}
                _ = tokio::time::sleep(shared.config.connect_interval) => {
                    tracing::debug!("No device registered yet");
                }
            }
        }
    }

    /// Stop the coordinator
    ///
    /// Every step is attempted: loop joins (failures logged), stream
    /// teardown, then one close per booted device. A stream teardown error
    /// is returned first, otherwise the first device close error. Calling
    /// `stop()` again is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let shared = &self.shared;
        {
            let mut phase = shared.phase.lock();
            match *phase {
                CoordinatorPhase::Stopping | CoordinatorPhase::Stopped => {
                    tracing::debug!(phase = ?*phase, "Stop ignored");
                    return Ok(());
                }
                _ => *phase = CoordinatorPhase::Stopping,
            }
        }
        tracing::info!("Stopping device coordinator");

        shared.cancel.cancel();

        let handles = std::mem::take(&mut *shared.loops.lock());
        let ordered = [
            ("connection", handles.connection),
            ("reporting", handles.reporting),
            ("polling", handles.polling),
        ];
        for (name, handle) in ordered {
            if let Some(handle) = handle {
                self.join_loop(name, handle).await;
            }
        }

        let destroyed = shared
            .ctx
            .streams()
            .destroy_all_streams()
            .await
            .map_err(Error::DestroyStreams);
        if let Err(e) = &destroyed {
            tracing::error!(error = %e, "Failed to destroy streams");
        }

        let mut exit_errors = Vec::new();
        for entry in shared.devices.snapshot() {
            if !entry.was_booted() {
                continue;
            }
            match shared.close_device(&entry).await {
                Ok(true) => tracing::info!(mxid = %entry.mxid(), "Device closed"),
                Ok(false) => tracing::debug!(mxid = %entry.mxid(), "Device already disconnected"),
                Err(e) => {
                    tracing::error!(mxid = %entry.mxid(), error = %e, "Failed to close device");
                    exit_errors.push(e);
                }
            }
        }

        *shared.phase.lock() = CoordinatorPhase::Stopped;
        tracing::info!(failed_closes = exit_errors.len(), "Device coordinator stopped");

        destroyed?;
        match exit_errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn join_loop(&self, name: &'static str, mut handle: JoinHandle<()>) {
        let timeout = self.shared.config.join_timeout;

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => tracing::debug!(task = name, "Loop joined"),
            Ok(Err(e)) => tracing::error!(task = name, error = %e, "Loop task failed"),
            Err(_) => {
                tracing::error!(task = name, timeout_ms = timeout.as_millis() as u64, "Loop did not stop, aborting");
                handle.abort();
            }
        }
    }
}

impl std::fmt::Debug for DeviceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCoordinator")
            .field("phase", &self.phase())
            .field("devices", &self.device_count())
            .field("connected", &self.connected_count())
            .finish()
    }
}
