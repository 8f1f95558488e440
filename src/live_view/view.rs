//! Live view publisher

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::buffer::{
    BufferConfig, ExportRequest, ExportedVideo, FrameBuffer, FrameRecord, VideoMuxer, VideoSpec,
};
use crate::context::HubContext;
use crate::error::Result;
use crate::media::is_h264_frame;
use crate::transport::{EventSink, StreamHandle};

use super::kind::StreamKind;
use super::metadata::build_metadata;
use super::overlay::{BoundingBox, Detection, LineOverlay, Overlays, TextOverlay};

/// The device stream a live view publishes
#[derive(Debug, Clone)]
pub struct StreamSource {
    pub device_mxid: String,
    pub kind: StreamKind,
    pub width: u32,
    pub height: u32,
    /// Frame rate; [`StreamKind::DEFAULT_FPS`] when unknown
    pub fps: Option<u32>,
}

impl StreamSource {
    pub fn new(device_mxid: impl Into<String>, kind: StreamKind, width: u32, height: u32) -> Self {
        Self {
            device_mxid: device_mxid.into(),
            kind,
            width,
            height,
            fps: None,
        }
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }
}

/// Live view creation options
#[derive(Debug, Clone)]
pub struct LiveViewOptions {
    /// Display name
    pub name: String,
    /// Registry key; derived from device and stream kind when unset
    pub unique_key: Option<String>,
    /// Skip automatic publishing; frames are only buffered and
    /// [`LiveView::publish`] must be called by the application
    pub manual_publish: bool,
    /// Seconds of frames kept for video export (0 = disabled)
    pub max_buffer_seconds: f64,
}

impl LiveViewOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unique_key: None,
            manual_publish: false,
            max_buffer_seconds: 0.0,
        }
    }

    pub fn unique_key(mut self, key: impl Into<String>) -> Self {
        self.unique_key = Some(key.into());
        self
    }

    pub fn manual_publish(mut self) -> Self {
        self.manual_publish = true;
        self
    }

    pub fn max_buffer_seconds(mut self, seconds: f64) -> Self {
        self.max_buffer_seconds = seconds;
        self
    }
}

/// A published video stream with overlays and an export buffer
pub struct LiveView {
    name: String,
    unique_key: String,
    device_mxid: String,
    kind: StreamKind,
    width: u32,
    height: u32,
    fps: u32,
    manual_publish: bool,
    stream: Arc<dyn StreamHandle>,
    events: Arc<dyn EventSink>,
    muxer: Arc<dyn VideoMuxer>,
    buffer: Arc<FrameBuffer>,
    overlays: Mutex<Overlays>,
    format_checked: AtomicBool,
    epoch: Instant,
}

impl LiveView {
    /// Create a live view and register it in the context's registry
    ///
    /// A view registered earlier under the same unique key is replaced.
    pub fn create(
        ctx: &HubContext,
        source: StreamSource,
        options: LiveViewOptions,
    ) -> Result<Arc<LiveView>> {
        source.kind.ensure_live_view()?;

        let fps = source.fps.unwrap_or(StreamKind::DEFAULT_FPS);
        let unique_key = options
            .unique_key
            .unwrap_or_else(|| source.kind.default_unique_key(&source.device_mxid));
        let stream = ctx
            .streams()
            .create_video(&source.device_mxid, &unique_key, &options.name);
        let buffer_config = BufferConfig::new(options.max_buffer_seconds, f64::from(fps));

        let view = Arc::new(LiveView {
            name: options.name,
            unique_key,
            device_mxid: source.device_mxid,
            kind: source.kind,
            width: source.width,
            height: source.height,
            fps,
            manual_publish: options.manual_publish,
            stream,
            events: Arc::clone(ctx.events()),
            muxer: Arc::clone(ctx.muxer()),
            buffer: Arc::new(FrameBuffer::with_config(buffer_config)),
            overlays: Mutex::new(Overlays::default()),
            format_checked: AtomicBool::new(false),
            epoch: Instant::now(),
        });

        tracing::info!(
            name = %view.name,
            unique_key = %view.unique_key,
            mxid = %view.device_mxid,
            kind = %view.kind,
            buffer_frames = view.buffer.capacity(),
            "Live view created"
        );

        ctx.live_views().register(Arc::clone(&view));
        Ok(view)
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry key, also the remote stream key
    pub fn unique_key(&self) -> &str {
        &self.unique_key
    }

    /// MXID of the source device
    pub fn device_mxid(&self) -> &str {
        &self.device_mxid
    }

    /// Kind of the source stream
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Frame rate used for buffering and exports
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Frame width and height
    pub fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Check if frames are only buffered, not published
    pub fn is_manual_publish(&self) -> bool {
        self.manual_publish
    }

    /// Export buffer of this view
    pub fn buffer(&self) -> &Arc<FrameBuffer> {
        &self.buffer
    }

    /// Add a labelled rectangle to the next publish
    pub fn add_rectangle(&self, bbox: BoundingBox, label: impl Into<String>) {
        self.overlays.lock().detections.push(Detection::new(bbox, label));
    }

    /// Add text to the next publish
    pub fn add_text(&self, text: TextOverlay) {
        self.overlays.lock().texts.push(text);
    }

    /// Add a line to the next publish
    pub fn add_line(&self, line: LineOverlay) {
        self.overlays.lock().lines.push(line);
    }

    /// Overlays waiting for the next publish
    pub fn pending_overlays(&self) -> Overlays {
        self.overlays.lock().clone()
    }

    /// Publish a frame with the pending overlays, then clear them
    ///
    /// The first frame is checked for H.264; a mismatch is logged once and
    /// publishing goes on.
    pub async fn publish(&self, data: bytes::Bytes) -> Result<()> {
        if !self.format_checked.swap(true, Ordering::Relaxed) && !is_h264_frame(&data) {
            tracing::warn!(
                unique_key = %self.unique_key,
                "Frame is not H.264 encoded, check the device pipeline configuration"
            );
        }

        let overlays = std::mem::take(&mut *self.overlays.lock());
        let metadata = build_metadata(self.width, self.height, &overlays)?;
        let timestamp_ms = self.epoch.elapsed().as_millis() as u64;

        self.stream
            .publish_video_data(data, timestamp_ms, &metadata)
            .await?;
        Ok(())
    }

    /// Handle a frame coming from the device
    ///
    /// Publishes it unless the view is in manual mode, then buffers it.
    pub async fn on_frame(&self, frame: FrameRecord) {
        if !self.manual_publish {
            if let Err(e) = self.publish(frame.data.clone()).await {
                tracing::debug!(unique_key = %self.unique_key, error = %e, "Publish failed");
            }
        }
        self.buffer.push(frame);
    }

    fn export_request(&self, before_seconds: f64, after_seconds: f64) -> ExportRequest {
        ExportRequest::new(
            before_seconds,
            after_seconds,
            VideoSpec {
                fps: self.fps,
                width: self.width,
                height: self.height,
            },
        )
    }

    /// Export a clip in the background and hand it to `on_complete`
    ///
    /// Argument and disabled-buffer errors are returned immediately. The
    /// export is best-effort: it may never finish if the application
    /// shuts down first.
    pub fn export_video<F>(
        &self,
        before_seconds: f64,
        after_seconds: f64,
        on_complete: F,
    ) -> Result<JoinHandle<()>>
    where
        F: FnOnce(Result<ExportedVideo>) + Send + 'static,
    {
        let request = self.export_request(before_seconds, after_seconds);
        let export = self.buffer.save_video(request, Arc::clone(&self.muxer))?;
        let unique_key = self.unique_key.clone();

        Ok(tokio::spawn(async move {
            match export.await {
                Ok(result) => on_complete(result),
                Err(e) => tracing::error!(unique_key = %unique_key, error = %e, "Export task failed"),
            }
        }))
    }

    /// Export a clip and send it as a video event titled `title`
    ///
    /// A clip written to disk is deleted once the event was sent.
    pub fn save_video_event(
        &self,
        before_seconds: f64,
        after_seconds: f64,
        title: impl Into<String>,
    ) -> Result<JoinHandle<()>> {
        let request = self.export_request(before_seconds, after_seconds);
        let export = self.buffer.save_video(request, Arc::clone(&self.muxer))?;
        let events = Arc::clone(&self.events);
        let unique_key = self.unique_key.clone();
        let title = title.into();

        Ok(tokio::spawn(async move {
            let video = match export.await {
                Ok(Ok(video)) => video,
                Ok(Err(e)) => {
                    tracing::error!(unique_key = %unique_key, error = %e, "Video event export failed");
                    return;
                }
                Err(e) => {
                    tracing::error!(unique_key = %unique_key, error = %e, "Export task failed");
                    return;
                }
            };

            match events.send_video_event(&video, &title).await {
                Ok(()) => tracing::info!(unique_key = %unique_key, title = %title, "Video event sent"),
                Err(e) => {
                    tracing::error!(unique_key = %unique_key, error = %e, "Failed to send video event")
                }
            }

            if let Some(path) = video.path() {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    tracing::debug!(path = %path.display(), error = %e, "Failed to remove clip");
                }
            }
        }))
    }
}

impl std::fmt::Debug for LiveView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveView")
            .field("name", &self.name)
            .field("unique_key", &self.unique_key)
            .field("device_mxid", &self.device_mxid)
            .field("kind", &self.kind)
            .field("fps", &self.fps)
            .field("manual_publish", &self.manual_publish)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::sync::oneshot;

    use super::*;
    use crate::buffer::RawH264Muxer;
    use crate::error::Error;
    use crate::transport::MemoryHub;

    const IDR: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84];
    const SLICE: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x41, 0x9A];

    fn camera(mxid: &str) -> StreamSource {
        StreamSource::new(mxid, StreamKind::Camera, 1280, 720).fps(10)
    }

    fn frame(ts_ms: u64, data: &'static [u8]) -> FrameRecord {
        FrameRecord::new(Duration::from_millis(ts_ms), Bytes::from_static(data))
    }

    #[tokio::test]
    async fn test_create_registers_with_default_key() {
        let hub = MemoryHub::new();
        let ctx = hub.context();

        let view = LiveView::create(&ctx, camera("A"), LiveViewOptions::new("Color")).unwrap();

        assert_eq!(view.unique_key(), "A_camera_encoded");
        assert_eq!(view.fps(), 10);
        assert!(!view.buffer().is_enabled());
        assert!(ctx.live_views().get_by_key("A_camera_encoded").is_some());
        assert_eq!(hub.streams.stream("A_camera_encoded").unwrap().camera_serial, "A");
    }

    #[tokio::test]
    async fn test_create_rejects_neural_stream() {
        let ctx = MemoryHub::new().context();
        let source = StreamSource::new("A", StreamKind::Neural, 416, 416);

        let result = LiveView::create(&ctx, source, LiveViewOptions::new("Detections"));
        assert!(matches!(result, Err(Error::UnsupportedStream(_))));
        assert!(ctx.live_views().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_fps_defaults() {
        let ctx = MemoryHub::new().context();
        let source = StreamSource::new("A", StreamKind::Stereo, 640, 400);

        let view = LiveView::create(&ctx, source, LiveViewOptions::new("Depth")).unwrap();
        assert_eq!(view.fps(), StreamKind::DEFAULT_FPS);
    }

    #[tokio::test]
    async fn test_publish_sends_overlays_then_clears() {
        let hub = MemoryHub::new();
        let view = LiveView::create(&hub.context(), camera("A"), LiveViewOptions::new("Color")).unwrap();

        view.add_rectangle([1, 2, 3, 4], "person");
        view.add_text(TextOverlay::new("hello", (0, 0)));
        view.add_line(LineOverlay::new((0, 0), (10, 10)));
        view.publish(Bytes::from_static(IDR)).await.unwrap();
        view.publish(Bytes::from_static(SLICE)).await.unwrap();

        let published = hub.streams.stream("A_camera_encoded").unwrap().published();
        assert_eq!(published.len(), 2);

        let first = &published[0].metadata;
        assert_eq!(first["frame_shape"], serde_json::json!([720, 1280]));
        assert_eq!(first["objects"].as_array().unwrap().len(), 3);
        assert_eq!(first["objects"][0]["detections"][0]["label"], "person");

        let second = &published[1].metadata;
        assert_eq!(second["objects"].as_array().unwrap().len(), 1);
        assert!(second["objects"][0]["detections"].as_array().unwrap().is_empty());
        assert!(published[1].timestamp_ms >= published[0].timestamp_ms);
        assert!(view.pending_overlays().is_empty());
    }

    #[tokio::test]
    async fn test_publish_accepts_non_h264() {
        let hub = MemoryHub::new();
        let view = LiveView::create(&hub.context(), camera("A"), LiveViewOptions::new("Color")).unwrap();

        view.publish(Bytes::from_static(b"\xff\xd8jpeg")).await.unwrap();
        view.publish(Bytes::from_static(b"\xff\xd8jpeg")).await.unwrap();

        assert_eq!(hub.streams.stream("A_camera_encoded").unwrap().published_count(), 2);
    }

    #[tokio::test]
    async fn test_on_frame_manual_publish_only_buffers() {
        let hub = MemoryHub::new();
        let options = LiveViewOptions::new("Color")
            .manual_publish()
            .max_buffer_seconds(1.0);
        let view = LiveView::create(&hub.context(), camera("A"), options).unwrap();

        view.on_frame(frame(0, IDR)).await;
        view.on_frame(frame(100, SLICE)).await;

        assert_eq!(hub.streams.stream("A_camera_encoded").unwrap().published_count(), 0);
        assert_eq!(view.buffer().len(), 2);
    }

    #[tokio::test]
    async fn test_export_video_calls_back() {
        let hub = MemoryHub::new();
        let ctx = hub.context().with_muxer(Arc::new(RawH264Muxer::default()));
        let options = LiveViewOptions::new("Color").max_buffer_seconds(2.0);
        let view = LiveView::create(&ctx, camera("A"), options).unwrap();

        for i in 0..10 {
            view.on_frame(frame(i * 100, if i == 0 { IDR } else { SLICE })).await;
        }

        let (tx, rx) = oneshot::channel();
        view.export_video(1.0, 0.0, move |result| {
            let _ = tx.send(result);
        })
        .unwrap();
        view.on_frame(frame(1000, SLICE)).await;

        let video = rx.await.unwrap().unwrap();
        let path = video.path().unwrap().to_path_buf();
        let bytes = video.into_bytes().await.unwrap();
        assert_eq!(bytes.len(), IDR.len() + 9 * SLICE.len());
        let _ = tokio::fs::remove_file(path).await;
    }

    #[tokio::test]
    async fn test_export_video_disabled_buffer() {
        let ctx = MemoryHub::new().context();
        let view = LiveView::create(&ctx, camera("A"), LiveViewOptions::new("Color")).unwrap();

        let result = view.export_video(1.0, 1.0, |_| {});
        assert!(matches!(result, Err(Error::BufferDisabled)));
    }

    #[tokio::test]
    async fn test_save_video_event_sends_and_removes_clip() {
        let hub = MemoryHub::new();
        let dir = std::env::temp_dir().join(format!("camfleet-event-{}", uuid::Uuid::new_v4()));
        let ctx = hub.context().with_muxer(Arc::new(RawH264Muxer::new(&dir)));
        let options = LiveViewOptions::new("Color").max_buffer_seconds(2.0);
        let view = LiveView::create(&ctx, camera("A"), options).unwrap();

        view.on_frame(frame(0, IDR)).await;
        view.on_frame(frame(100, SLICE)).await;

        let task = view.save_video_event(1.0, 0.1, "person detected").unwrap();
        view.on_frame(frame(200, SLICE)).await;
        task.await.unwrap();

        let events = hub.events.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "person detected");
        assert_eq!(events[0].video.len(), IDR.len() + 2 * SLICE.len());

        let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
