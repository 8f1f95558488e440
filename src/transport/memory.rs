//! In-memory transports
//!
//! Record everything they are given so tests and demos can inspect it.
//! Each transport can be switched into a failing mode.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::buffer::ExportedVideo;
use crate::context::HubContext;
use crate::device::{DeviceInfo, DeviceStats};
use crate::error::TransportError;

use super::{AgentTransport, EventSink, StreamHandle, StreamTransport};

fn offline() -> TransportError {
    TransportError::Unavailable("agent offline".into())
}

/// Agent that stores every report
#[derive(Debug, Default)]
pub struct MemoryAgent {
    infos: Mutex<Vec<DeviceInfo>>,
    stats: Mutex<Vec<DeviceStats>>,
    failing: AtomicBool,
}

impl MemoryAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Info reports received so far
    pub fn infos(&self) -> Vec<DeviceInfo> {
        self.infos.lock().clone()
    }

    /// Stats reports received so far
    pub fn stats(&self) -> Vec<DeviceStats> {
        self.stats.lock().clone()
    }

    /// Make every publish fail (`true`) or succeed again
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

#[async_trait]
impl AgentTransport for MemoryAgent {
    async fn publish_device_info(&self, info: &DeviceInfo) -> Result<(), TransportError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(offline());
        }
        self.infos.lock().push(info.clone());
        Ok(())
    }

    async fn publish_device_stats(&self, stats: &DeviceStats) -> Result<(), TransportError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(offline());
        }
        self.stats.lock().push(stats.clone());
        Ok(())
    }
}

/// A frame handed to [`MemoryStream::publish_video_data`]
#[derive(Debug, Clone)]
pub struct PublishedFrame {
    pub data: Bytes,
    pub timestamp_ms: u64,
    pub metadata: serde_json::Value,
}

/// Stream that stores published frames
#[derive(Debug)]
pub struct MemoryStream {
    pub camera_serial: String,
    pub unique_key: String,
    pub description: String,
    published: Mutex<Vec<PublishedFrame>>,
}

impl MemoryStream {
    /// Frames published on this stream
    pub fn published(&self) -> Vec<PublishedFrame> {
        self.published.lock().clone()
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().len()
    }
}

#[async_trait]
impl StreamHandle for MemoryStream {
    async fn publish_video_data(
        &self,
        data: Bytes,
        timestamp_ms: u64,
        metadata: &serde_json::Value,
    ) -> Result<(), TransportError> {
        self.published.lock().push(PublishedFrame {
            data,
            timestamp_ms,
            metadata: metadata.clone(),
        });
        Ok(())
    }
}

/// Stream factory keeping every stream it created
#[derive(Debug, Default)]
pub struct MemoryStreams {
    streams: Mutex<Vec<Arc<MemoryStream>>>,
    destroy_calls: AtomicUsize,
    fail_destroy: AtomicBool,
}

impl MemoryStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest stream created for `unique_key`
    pub fn stream(&self, unique_key: &str) -> Option<Arc<MemoryStream>> {
        self.streams
            .lock()
            .iter()
            .rev()
            .find(|s| s.unique_key == unique_key)
            .cloned()
    }

    /// Number of live streams
    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }

    /// How many times `destroy_all_streams` was called
    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::Relaxed)
    }

    /// Make `destroy_all_streams` fail
    pub fn set_fail_destroy(&self, fail: bool) {
        self.fail_destroy.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl StreamTransport for MemoryStreams {
    fn create_video(
        &self,
        camera_serial: &str,
        unique_key: &str,
        description: &str,
    ) -> Arc<dyn StreamHandle> {
        let stream = Arc::new(MemoryStream {
            camera_serial: camera_serial.to_string(),
            unique_key: unique_key.to_string(),
            description: description.to_string(),
            published: Mutex::new(Vec::new()),
        });
        self.streams.lock().push(Arc::clone(&stream));
        stream
    }

    async fn destroy_all_streams(&self) -> Result<(), TransportError> {
        self.destroy_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_destroy.load(Ordering::Relaxed) {
            return Err(TransportError::Rejected("streams still in use".into()));
        }
        self.streams.lock().clear();
        Ok(())
    }
}

/// One event received by [`MemoryEvents`]
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub title: String,
    /// Clip contents, read at send time
    pub video: Bytes,
}

/// Event sink that reads and stores every clip
#[derive(Debug, Default)]
pub struct MemoryEvents {
    events: Mutex<Vec<RecordedEvent>>,
}

impl MemoryEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Wait until at least `count` events arrived
    ///
    /// Returns false if `timeout` passed first.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let received = self.events.lock().len();
            if received >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl EventSink for MemoryEvents {
    async fn send_video_event(&self, video: &ExportedVideo, title: &str) -> Result<(), TransportError> {
        let bytes = match video {
            ExportedVideo::Bytes(bytes) => bytes.clone(),
            ExportedVideo::File(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|e| TransportError::Rejected(format!("{}: {e}", path.display())))?,
        };
        self.events.lock().push(RecordedEvent {
            title: title.to_string(),
            video: bytes,
        });
        Ok(())
    }
}

/// The three in-memory transports together
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    pub agent: Arc<MemoryAgent>,
    pub streams: Arc<MemoryStreams>,
    pub events: Arc<MemoryEvents>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context over these transports
    pub fn context(&self) -> HubContext {
        HubContext::new(
            Arc::clone(&self.agent) as Arc<dyn AgentTransport>,
            Arc::clone(&self.streams) as Arc<dyn StreamTransport>,
            Arc::clone(&self.events) as Arc<dyn EventSink>,
        )
    }
}
