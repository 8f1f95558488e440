//! Fixed-capacity frame ring buffer with live taps
//!
//! The buffer keeps the most recent frames of one live view so that a
//! video export can reach back in time. Exports also need the frames that
//! arrive *after* the trigger; they get them through a tap, an unbounded
//! per-request queue that receives a copy of every pushed frame.
//!
//! ```text
//!   push(frame) ──► frames: [f0 f1 f2 ... fN]   (oldest evicted)
//!        │
//!        └──► taps: { token_a: tx ─► export A
//!                     token_b: tx ─► export B }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::config::BufferConfig;
use super::export::{ExportRequest, ExportedVideo, VideoMuxer};
use super::frame::FrameRecord;

/// Identifier of a live tap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TapToken(Uuid);

impl TapToken {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TapToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiving side of a tap
///
/// Every frame pushed after the tap was opened lands in its queue. The
/// queue is unbounded; a slow reader makes it grow.
#[derive(Debug)]
pub struct Tap {
    token: TapToken,
    rx: mpsc::UnboundedReceiver<FrameRecord>,
}

impl Tap {
    /// Token used to close this tap
    pub fn token(&self) -> TapToken {
        self.token
    }

    /// Wait for the next frame
    ///
    /// Returns `None` once the tap was closed or the buffer dropped.
    pub async fn recv(&mut self) -> Option<FrameRecord> {
        self.rx.recv().await
    }

    /// Take a pending frame without waiting
    pub fn try_recv(&mut self) -> Option<FrameRecord> {
        self.rx.try_recv().ok()
    }
}

struct BufferInner {
    frames: VecDeque<FrameRecord>,
    taps: HashMap<TapToken, mpsc::UnboundedSender<FrameRecord>>,
}

impl BufferInner {
    fn open_tap(&mut self) -> Tap {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = TapToken::generate();
        self.taps.insert(token, tx);
        Tap { token, rx }
    }
}

/// Ring buffer of recent frames
pub struct FrameBuffer {
    capacity: usize,
    config: BufferConfig,
    inner: Mutex<BufferInner>,
}

impl FrameBuffer {
    /// Create a buffer holding at most `capacity` frames
    ///
    /// A capacity of zero disables buffering: pushes are only forwarded
    /// to taps and exports fail with [`Error::BufferDisabled`].
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, BufferConfig::default())
    }

    /// Create a buffer sized from a time window and frame rate
    pub fn with_config(config: BufferConfig) -> Self {
        let capacity = config.capacity();
        Self::build(capacity, config)
    }

    fn build(capacity: usize, config: BufferConfig) -> Self {
        Self {
            capacity,
            config,
            inner: Mutex::new(BufferInner {
                frames: VecDeque::with_capacity(capacity),
                taps: HashMap::new(),
            }),
        }
    }

    /// Maximum number of frames kept
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether buffering is enabled (capacity above zero)
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Number of frames currently buffered
    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    /// Check if the buffer holds no frames
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of open taps
    pub fn tap_count(&self) -> usize {
        self.inner.lock().taps.len()
    }

    /// Append a frame
    ///
    /// Evicts the oldest frame when full and forwards a copy to every open
    /// tap. Taps whose reader is gone are dropped.
    pub fn push(&self, frame: FrameRecord) {
        let mut inner = self.inner.lock();

        inner.taps.retain(|token, tx| {
            let open = tx.send(frame.clone()).is_ok();
            if !open {
                tracing::debug!(tap = %token, "Dropping tap with closed reader");
            }
            open
        });

        if self.capacity == 0 {
            return;
        }
        if inner.frames.len() == self.capacity {
            inner.frames.pop_front();
        }
        inner.frames.push_back(frame);
    }

    /// Get frames at positions `[start, end)`
    ///
    /// `end = None` means up to the newest frame. Out of range bounds are
    /// clamped.
    pub fn slice(&self, start: usize, end: Option<usize>) -> Vec<FrameRecord> {
        let inner = self.inner.lock();
        let len = inner.frames.len();
        let end = end.unwrap_or(len).min(len);
        if start >= end {
            return Vec::new();
        }
        inner.frames.range(start..end).cloned().collect()
    }

    /// Open a tap receiving every subsequently pushed frame
    pub fn open_tap(&self) -> Tap {
        self.inner.lock().open_tap()
    }

    /// Close a tap
    ///
    /// Returns false if the token was unknown. Other taps are untouched.
    pub fn close_tap(&self, token: TapToken) -> bool {
        self.inner.lock().taps.remove(&token).is_some()
    }

    /// Timestamps of the oldest and newest buffered frames
    pub fn timestamp_range(&self) -> Option<(Duration, Duration)> {
        let inner = self.inner.lock();
        let first = inner.frames.front()?.timestamp;
        let last = inner.frames.back()?.timestamp;
        Some((first, last))
    }

    /// Export a clip around "now"
    ///
    /// Takes the last `before_seconds * fps` buffered frames, then collects
    /// frames from a tap until `after_seconds` have elapsed past the newest
    /// buffered frame (the pivot), and hands the sequence to `muxer`.
    /// Collection and muxing run on a spawned task; argument errors are
    /// returned immediately. Must be called within a Tokio runtime.
    pub fn save_video(
        self: &Arc<Self>,
        request: ExportRequest,
        muxer: Arc<dyn VideoMuxer>,
    ) -> Result<JoinHandle<Result<ExportedVideo>>> {
        if !self.is_enabled() {
            return Err(Error::BufferDisabled);
        }
        request.validate()?;

        let before_count = request.before_frame_count();

        // Slice and tap under one lock so no frame falls between them
        let (before, pivot, tap) = {
            let mut inner = self.inner.lock();
            let start = inner.frames.len().saturating_sub(before_count);
            let before: Vec<FrameRecord> = inner.frames.range(start..).cloned().collect();
            let pivot = inner.frames.back().map(|f| f.timestamp);
            (before, pivot, inner.open_tap())
        };

        let after = Duration::from_secs_f64(request.after_seconds);
        let deadline = tokio::time::Instant::now() + after + self.config.after_grace;
        let buffer = Arc::clone(self);

        tracing::debug!(
            tap = %tap.token(),
            before_frames = before.len(),
            after_secs = request.after_seconds,
            "Video export started"
        );

        Ok(tokio::spawn(async move {
            let token = tap.token();
            let after_frames = collect_after(tap, pivot, after, deadline).await;
            buffer.close_tap(token);

            let mut frames = before;
            frames.extend(after_frames);

            tracing::debug!(tap = %token, frames = frames.len(), "Video export collected");

            muxer.mux(frames, request.spec(), request.output).await
        }))
    }
}

/// Collect frames newer than `pivot` until they span `after`
///
/// Without a pivot the first received frame takes its place. Stops early
/// at `deadline` or when the tap closes.
async fn collect_after(
    mut tap: Tap,
    mut pivot: Option<Duration>,
    after: Duration,
    deadline: tokio::time::Instant,
) -> Vec<FrameRecord> {
    let mut frames = Vec::new();
    if after.is_zero() && pivot.is_some() {
        return frames;
    }

    loop {
        let frame = match tokio::time::timeout_at(deadline, tap.recv()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(
                    tap = %tap.token(),
                    collected = frames.len(),
                    "Video export timed out waiting for frames"
                );
                break;
            }
        };

        match pivot {
            None => {
                pivot = Some(frame.timestamp);
                frames.push(frame);
                if after.is_zero() {
                    break;
                }
            }
            Some(origin) if frame.timestamp <= origin => continue,
            Some(origin) => {
                let elapsed = frame.timestamp - origin;
                frames.push(frame);
                if elapsed >= after {
                    break;
                }
            }
        }
    }

    frames
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("taps", &self.tap_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::buffer::export::{ExportOutput, VideoSpec};

    const SPEC: VideoSpec = VideoSpec {
        fps: 10,
        width: 1280,
        height: 720,
    };

    /// Muxer that records what it was given
    #[derive(Default)]
    struct CollectingMuxer {
        frames: Mutex<Vec<FrameRecord>>,
    }

    #[async_trait]
    impl VideoMuxer for CollectingMuxer {
        async fn mux(
            &self,
            frames: Vec<FrameRecord>,
            _spec: VideoSpec,
            _output: ExportOutput,
        ) -> Result<ExportedVideo> {
            let count = frames.len();
            *self.frames.lock() = frames;
            Ok(ExportedVideo::Bytes(Bytes::from(vec![0u8; count])))
        }
    }

    fn frame(ts_ms: u64) -> FrameRecord {
        FrameRecord::new(Duration::from_millis(ts_ms), ts_ms.to_be_bytes().to_vec())
    }

    fn timestamps(frames: &[FrameRecord]) -> Vec<u64> {
        frames.iter().map(|f| f.timestamp.as_millis() as u64).collect()
    }

    #[test]
    fn test_push_evicts_oldest() {
        let buffer = FrameBuffer::new(5);

        for i in 0..8 {
            buffer.push(frame(i * 100));
        }

        assert_eq!(buffer.len(), 5);
        assert_eq!(
            timestamps(&buffer.slice(0, None)),
            vec![300, 400, 500, 600, 700]
        );
    }

    #[test]
    fn test_push_below_capacity_keeps_all() {
        let buffer = FrameBuffer::new(10);

        for i in 0..4 {
            buffer.push(frame(i));
        }

        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.timestamp_range(), Some((Duration::ZERO, Duration::from_millis(3))));
    }

    #[test]
    fn test_slice_ranges() {
        let buffer = FrameBuffer::new(10);
        for i in 0..6 {
            buffer.push(frame(i));
        }

        assert_eq!(timestamps(&buffer.slice(1, Some(4))), vec![1, 2, 3]);
        assert_eq!(timestamps(&buffer.slice(4, None)), vec![4, 5]);
        assert_eq!(timestamps(&buffer.slice(0, Some(100))), vec![0, 1, 2, 3, 4, 5]);
        assert!(buffer.slice(4, Some(2)).is_empty());
        assert!(buffer.slice(9, None).is_empty());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let buffer = FrameBuffer::new(0);
        let mut tap = buffer.open_tap();

        buffer.push(frame(1));

        assert!(!buffer.is_enabled());
        assert!(buffer.is_empty());
        assert_eq!(tap.try_recv().map(|f| f.timestamp), Some(Duration::from_millis(1)));
    }

    #[test]
    fn test_taps_are_independent() {
        let buffer = FrameBuffer::new(4);
        let mut first = buffer.open_tap();
        let mut second = buffer.open_tap();
        assert_ne!(first.token(), second.token());
        assert_eq!(buffer.tap_count(), 2);

        buffer.push(frame(10));
        assert!(buffer.close_tap(first.token()));
        assert!(!buffer.close_tap(first.token()));
        buffer.push(frame(20));

        assert_eq!(buffer.tap_count(), 1);
        assert_eq!(first.try_recv().map(|f| f.timestamp.as_millis()), Some(10));
        assert!(first.try_recv().is_none());
        assert_eq!(second.try_recv().map(|f| f.timestamp.as_millis()), Some(10));
        assert_eq!(second.try_recv().map(|f| f.timestamp.as_millis()), Some(20));
    }

    #[test]
    fn test_dropped_tap_is_pruned_on_push() {
        let buffer = FrameBuffer::new(4);
        let tap = buffer.open_tap();
        drop(tap);

        buffer.push(frame(1));

        assert_eq!(buffer.tap_count(), 0);
    }

    #[tokio::test]
    async fn test_save_video_spans_before_and_after() {
        let config = BufferConfig::new(5.0, 10.0).after_grace(Duration::from_secs(2));
        let buffer = Arc::new(FrameBuffer::with_config(config));
        assert_eq!(buffer.capacity(), 50);

        for i in 0..50 {
            buffer.push(frame(i * 100));
        }

        let muxer = Arc::new(CollectingMuxer::default());
        let handle = buffer
            .save_video(ExportRequest::new(2.0, 1.0, SPEC), muxer.clone())
            .unwrap();

        for i in 50..66 {
            buffer.push(frame(i * 100));
        }

        let video = handle.await.unwrap().unwrap();
        assert_eq!(video, ExportedVideo::Bytes(Bytes::from(vec![0u8; 30])));

        let frames = muxer.frames.lock().clone();
        let ts = timestamps(&frames);
        assert_eq!(ts.first(), Some(&3000));
        assert_eq!(ts.last(), Some(&5900));
        assert!(ts.windows(2).all(|w| w[1] == w[0] + 100));
        assert_eq!(buffer.tap_count(), 0);
    }

    #[tokio::test]
    async fn test_save_video_ignores_frames_not_after_pivot() {
        let buffer = Arc::new(FrameBuffer::new(10));
        for i in 0..10 {
            buffer.push(frame(i * 100));
        }

        let muxer = Arc::new(CollectingMuxer::default());
        let handle = buffer
            .save_video(ExportRequest::new(0.5, 0.2, SPEC), muxer.clone())
            .unwrap();

        // Late duplicate of the pivot, then real progress
        buffer.push(frame(900));
        buffer.push(frame(1000));
        buffer.push(frame(1100));

        handle.await.unwrap().unwrap();
        assert_eq!(
            timestamps(&muxer.frames.lock()),
            vec![500, 600, 700, 800, 900, 1000, 1100]
        );
    }

    #[tokio::test]
    async fn test_save_video_zero_before_keeps_newest_frame_as_pivot() {
        let buffer = Arc::new(FrameBuffer::new(10));
        for i in 0..10 {
            buffer.push(frame(i * 100));
        }

        let muxer = Arc::new(CollectingMuxer::default());
        let handle = buffer
            .save_video(ExportRequest::new(0.0, 0.2, SPEC), muxer.clone())
            .unwrap();

        buffer.push(frame(900));
        buffer.push(frame(1000));
        buffer.push(frame(1100));
        buffer.push(frame(1200));

        handle.await.unwrap().unwrap();
        assert_eq!(timestamps(&muxer.frames.lock()), vec![1000, 1100]);
        assert_eq!(buffer.len(), 10);
    }

    #[tokio::test]
    async fn test_save_video_empty_buffer_uses_first_tapped_frame() {
        let buffer = Arc::new(FrameBuffer::new(10));
        let muxer = Arc::new(CollectingMuxer::default());

        let handle = buffer
            .save_video(ExportRequest::new(1.0, 0.2, SPEC), muxer.clone())
            .unwrap();

        for i in 0..5 {
            buffer.push(frame(1000 + i * 100));
        }

        handle.await.unwrap().unwrap();
        assert_eq!(timestamps(&muxer.frames.lock()), vec![1000, 1100, 1200]);
    }

    #[tokio::test]
    async fn test_save_video_times_out_with_partial_clip() {
        let config = BufferConfig::new(1.0, 10.0).after_grace(Duration::from_millis(20));
        let buffer = Arc::new(FrameBuffer::with_config(config));
        for i in 0..10 {
            buffer.push(frame(i * 100));
        }

        let muxer = Arc::new(CollectingMuxer::default());
        let handle = buffer
            .save_video(ExportRequest::new(0.3, 0.05, SPEC), muxer.clone())
            .unwrap();

        handle.await.unwrap().unwrap();
        assert_eq!(timestamps(&muxer.frames.lock()), vec![700, 800, 900]);
        assert_eq!(buffer.tap_count(), 0);
    }

    #[tokio::test]
    async fn test_save_video_invalid_arguments() {
        let buffer = Arc::new(FrameBuffer::new(10));
        let muxer: Arc<dyn VideoMuxer> = Arc::new(CollectingMuxer::default());

        let result = buffer.save_video(ExportRequest::new(-1.0, 1.0, SPEC), muxer.clone());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));

        let result = buffer.save_video(ExportRequest::new(1.0, -1.0, SPEC), muxer);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert_eq!(buffer.tap_count(), 0);
    }

    #[tokio::test]
    async fn test_save_video_disabled() {
        let buffer = Arc::new(FrameBuffer::new(0));
        let muxer: Arc<dyn VideoMuxer> = Arc::new(CollectingMuxer::default());

        let result = buffer.save_video(ExportRequest::new(1.0, 1.0, SPEC), muxer);
        assert!(matches!(result, Err(Error::BufferDisabled)));
    }
}
