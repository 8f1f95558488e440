//! Device driver collaborator interface
//!
//! The driver owns everything device-specific: discovery by MXID, session
//! setup, decoding and encoding. The coordinator only needs to open a
//! session, pump it, and ask it for reports.

use async_trait::async_trait;

use crate::buffer::FrameRecord;
use crate::error::DriverError;

use super::report::{DeviceInfo, DeviceStats};

/// Identity of a configured device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceDescriptor {
    /// Stable unique identifier (serial number)
    pub mxid: String,
    /// Human-readable name (falls back to the MXID)
    pub name: String,
}

impl DeviceDescriptor {
    /// Create a descriptor named after its MXID
    pub fn new(mxid: impl Into<String>) -> Self {
        let mxid = mxid.into();
        Self {
            name: mxid.clone(),
            mxid,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl std::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name == self.mxid {
            write!(f, "{}", self.mxid)
        } else {
            write!(f, "{} ({})", self.name, self.mxid)
        }
    }
}

/// An encoded frame produced by one of a device's streams
#[derive(Debug, Clone)]
pub struct StreamPacket {
    /// Unique key of the live view this stream feeds
    pub unique_key: String,
    /// The frame
    pub frame: FrameRecord,
}

impl StreamPacket {
    /// Create a packet for a stream
    pub fn new(unique_key: impl Into<String>, frame: FrameRecord) -> Self {
        Self {
            unique_key: unique_key.into(),
            frame,
        }
    }
}

/// Result of one poll round
#[derive(Debug)]
pub enum PollOutcome {
    /// Device alive; zero or more new packets
    Data(Vec<StreamPacket>),
    /// Device no longer reachable
    Disconnected,
}

impl PollOutcome {
    /// Check if the poll reported a disconnect
    pub fn is_disconnected(&self) -> bool {
        matches!(self, PollOutcome::Disconnected)
    }
}

/// Opens sessions on physical devices
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Open a session on the device
    ///
    /// The session is not started yet.
    async fn open(&self, device: &DeviceDescriptor) -> Result<Box<dyn DeviceSession>, DriverError>;
}

/// One open session on a device
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// Start the device pipeline
    async fn start(&mut self) -> Result<(), DriverError>;

    /// Pull one round of pending data
    async fn poll(&mut self) -> PollOutcome;

    /// Describe the device
    async fn info(&self) -> Result<DeviceInfo, DriverError>;

    /// Report resource usage
    async fn stats(&self) -> Result<DeviceStats, DriverError>;

    /// Release the session
    async fn close(&mut self) -> Result<(), DriverError>;
}
