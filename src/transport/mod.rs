//! Remote-side collaborators
//!
//! Three transports connect the fleet to the cloud agent:
//!
//! - [`AgentTransport`]: device info and stats reports
//! - [`StreamTransport`] / [`StreamHandle`]: live video streams
//! - [`EventSink`]: finished video events
//!
//! All calls are fire-and-forget from the coordinator's point of view and
//! fail independently. [`memory`] holds in-process implementations.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::buffer::ExportedVideo;
use crate::device::{DeviceInfo, DeviceStats};
use crate::error::TransportError;

pub use memory::{
    MemoryAgent, MemoryEvents, MemoryHub, MemoryStream, MemoryStreams, PublishedFrame, RecordedEvent,
};

/// Telemetry channel to the remote agent
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn publish_device_info(&self, info: &DeviceInfo) -> Result<(), TransportError>;

    async fn publish_device_stats(&self, stats: &DeviceStats) -> Result<(), TransportError>;
}

/// Factory and global teardown for live video streams
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Create the stream for one live view
    fn create_video(
        &self,
        camera_serial: &str,
        unique_key: &str,
        description: &str,
    ) -> Arc<dyn StreamHandle>;

    /// Tear down every stream created so far
    async fn destroy_all_streams(&self) -> Result<(), TransportError>;
}

/// One live video stream
#[async_trait]
pub trait StreamHandle: Send + Sync {
    /// Publish an encoded frame with its overlay metadata
    async fn publish_video_data(
        &self,
        data: Bytes,
        timestamp_ms: u64,
        metadata: &serde_json::Value,
    ) -> Result<(), TransportError>;
}

/// Destination of exported video events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send_video_event(&self, video: &ExportedVideo, title: &str) -> Result<(), TransportError>;
}
