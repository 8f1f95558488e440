//! Buffered frame records

use std::time::Duration;

use bytes::Bytes;

/// A timestamped encoded frame
///
/// Cheap to clone: the payload is a reference-counted `Bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    /// Capture timestamp on the device clock
    pub timestamp: Duration,
    /// Encoded payload
    pub data: Bytes,
}

impl FrameRecord {
    /// Create a frame record
    pub fn new(timestamp: Duration, data: impl Into<Bytes>) -> Self {
        Self {
            timestamp,
            data: data.into(),
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
