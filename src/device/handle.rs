//! Device handle
//!
//! Wraps one open [`DeviceSession`] and tracks its connection state. The
//! handle is what the coordinator keeps for a connected device; dropping
//! it out of a device slot is how a device is demoted.

use crate::error::{DriverError, Error, Result};

use super::driver::{DeviceDescriptor, DeviceDriver, DeviceSession, PollOutcome};
use super::report::{DeviceInfo, DeviceStats};
use super::state::ConnectionState;

/// Handle to one device session
pub struct DeviceHandle {
    mxid: String,
    session: Box<dyn DeviceSession>,
    state: ConnectionState,
}

impl DeviceHandle {
    /// Open a session on `device` and start it
    ///
    /// Fails fast: open and start errors are returned, not retried. A
    /// session that opened but did not start is closed again.
    pub async fn connect(driver: &dyn DeviceDriver, device: &DeviceDescriptor) -> Result<Self> {
        let session = driver.open(device).await.map_err(|source| Error::DeviceStart {
            mxid: device.mxid.clone(),
            source,
        })?;

        let mut handle = Self::new(device.mxid.clone(), session);
        if let Err(e) = handle.start().await {
            if let Err(close_err) = handle.session.close().await {
                tracing::debug!(mxid = %device.mxid, error = %close_err, "Failed to release session");
            }
            return Err(e);
        }
        Ok(handle)
    }

    /// Wrap an already opened session
    pub fn new(mxid: impl Into<String>, session: Box<dyn DeviceSession>) -> Self {
        Self {
            mxid: mxid.into(),
            session,
            state: ConnectionState::Connecting,
        }
    }

    /// MXID of the device
    pub fn mxid(&self) -> &str {
        &self.mxid
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the session is started and alive
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Start the session
    ///
    /// No-op when already connected.
    pub async fn start(&mut self) -> Result<()> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }

        match self.session.start().await {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(source) => {
                self.state = ConnectionState::Disconnected;
                Err(Error::DeviceStart {
                    mxid: self.mxid.clone(),
                    source,
                })
            }
        }
    }

    /// Pull one round of data
    ///
    /// A disconnect marks the handle disconnected; polling a disconnected
    /// handle keeps reporting [`PollOutcome::Disconnected`].
    pub async fn poll(&mut self) -> PollOutcome {
        if self.state != ConnectionState::Connected {
            return PollOutcome::Disconnected;
        }

        let outcome = self.session.poll().await;
        if outcome.is_disconnected() {
            self.state = ConnectionState::Disconnected;
        }
        outcome
    }

    /// Info snapshot, stamped with this handle's MXID and state
    pub async fn info_report(&self) -> std::result::Result<DeviceInfo, DriverError> {
        let mut info = self.session.info().await?;
        info.mxid = self.mxid.clone();
        info.state = self.state;
        Ok(info)
    }

    /// Stats snapshot
    pub async fn stats_report(&self) -> std::result::Result<DeviceStats, DriverError> {
        let mut stats = self.session.stats().await?;
        stats.mxid = self.mxid.clone();
        Ok(stats)
    }

    /// Release the session
    ///
    /// No-op when the device is already disconnected.
    pub async fn stop(&mut self) -> std::result::Result<(), DriverError> {
        if self.state == ConnectionState::Disconnected {
            return Ok(());
        }

        let result = self.session.close().await;
        self.state = ConnectionState::Disconnected;
        result
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("mxid", &self.mxid)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::simulated::{SimulatedDevice, SimulatedDriver};

    fn driver_with(device: SimulatedDevice) -> SimulatedDriver {
        let driver = SimulatedDriver::new();
        driver.add_device(device);
        driver
    }

    #[tokio::test]
    async fn test_connect_and_stop() {
        let driver = driver_with(SimulatedDevice::new("A"));
        let counters = driver.counters("A").unwrap();

        let mut handle = DeviceHandle::connect(&driver, &DeviceDescriptor::new("A"))
            .await
            .unwrap();
        assert!(handle.is_connected());
        assert_eq!(counters.starts(), 1);

        handle.stop().await.unwrap();
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        assert_eq!(counters.closes(), 1);

        // Second stop is a no-op
        handle.stop().await.unwrap();
        assert_eq!(counters.closes(), 1);
    }

    #[tokio::test]
    async fn test_connect_unknown_device_fails_fast() {
        let driver = SimulatedDriver::new();

        let result = DeviceHandle::connect(&driver, &DeviceDescriptor::new("missing")).await;
        match result {
            Err(Error::DeviceStart { mxid, .. }) => assert_eq!(mxid, "missing"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_failure_marks_disconnected() {
        let driver = driver_with(SimulatedDevice::new("A").fail_start());

        let result = DeviceHandle::connect(&driver, &DeviceDescriptor::new("A")).await;
        assert!(matches!(result, Err(Error::DeviceStart { .. })));

        // The half-open session was released
        let counters = driver.counters("A").unwrap();
        assert_eq!(counters.opens(), 1);
        assert_eq!(counters.closes(), 1);
    }

    #[tokio::test]
    async fn test_poll_disconnect_is_sticky() {
        let driver = driver_with(SimulatedDevice::new("A").disconnect_after(2));
        let mut handle = DeviceHandle::connect(&driver, &DeviceDescriptor::new("A"))
            .await
            .unwrap();

        assert!(!handle.poll().await.is_disconnected());
        assert!(!handle.poll().await.is_disconnected());
        assert!(handle.poll().await.is_disconnected());
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        assert!(handle.poll().await.is_disconnected());

        // Stopping a disconnected handle does not touch the session
        handle.stop().await.unwrap();
        assert_eq!(driver.counters("A").unwrap().closes(), 0);
    }

    #[tokio::test]
    async fn test_reports_fail_independently() {
        let driver = driver_with(SimulatedDevice::new("A").fail_info());
        let handle = DeviceHandle::connect(&driver, &DeviceDescriptor::new("A"))
            .await
            .unwrap();

        assert!(handle.info_report().await.is_err());
        let stats = handle.stats_report().await.unwrap();
        assert_eq!(stats.mxid, "A");
    }

    #[tokio::test]
    async fn test_info_report_carries_state() {
        let driver = driver_with(SimulatedDevice::new("A"));
        let handle = DeviceHandle::connect(&driver, &DeviceDescriptor::new("A"))
            .await
            .unwrap();

        let info = handle.info_report().await.unwrap();
        assert_eq!(info.mxid, "A");
        assert_eq!(info.state, ConnectionState::Connected);
    }
}
