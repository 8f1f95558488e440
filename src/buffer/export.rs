//! Video export requests and muxing
//!
//! An export turns a run of buffered frames into a clip. The muxer is a
//! collaborator: the crate ships [`RawH264Muxer`], which writes an Annex-B
//! elementary stream, and applications can plug in a container muxer.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::media::h264::is_random_access_point;

use super::frame::FrameRecord;

/// Where the muxed clip should end up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportOutput {
    /// Write a file and return its path
    #[default]
    File,
    /// Return the clip in memory
    Bytes,
}

/// A finished clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportedVideo {
    /// Clip written to disk
    File(PathBuf),
    /// Clip held in memory
    Bytes(Bytes),
}

impl ExportedVideo {
    /// Path of the clip, if it was written to disk
    pub fn path(&self) -> Option<&Path> {
        match self {
            ExportedVideo::File(path) => Some(path),
            ExportedVideo::Bytes(_) => None,
        }
    }

    /// Clip bytes, reading the file if needed
    pub async fn into_bytes(self) -> Result<Bytes> {
        match self {
            ExportedVideo::Bytes(bytes) => Ok(bytes),
            ExportedVideo::File(path) => Ok(Bytes::from(tokio::fs::read(path).await?)),
        }
    }
}

/// Target clip parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSpec {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

/// Parameters of one export
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Seconds of buffered history to include
    pub before_seconds: f64,
    /// Seconds of new frames to wait for
    pub after_seconds: f64,
    /// Frame rate of the source stream
    pub fps: u32,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// File or in-memory result
    pub output: ExportOutput,
}

impl ExportRequest {
    /// Create a request producing a file
    pub fn new(before_seconds: f64, after_seconds: f64, spec: VideoSpec) -> Self {
        Self {
            before_seconds,
            after_seconds,
            fps: spec.fps,
            width: spec.width,
            height: spec.height,
            output: ExportOutput::File,
        }
    }

    /// Return the clip in memory instead of writing a file
    pub fn in_memory(mut self) -> Self {
        self.output = ExportOutput::Bytes;
        self
    }

    /// Check durations and frame rate
    pub fn validate(&self) -> Result<()> {
        if !(self.before_seconds >= 0.0 && self.before_seconds.is_finite())
            || !(self.after_seconds >= 0.0 && self.after_seconds.is_finite())
        {
            return Err(Error::InvalidArgument(format!(
                "before_seconds ({}) and after_seconds ({}) must be non-negative",
                self.before_seconds, self.after_seconds
            )));
        }
        if self.fps == 0 {
            return Err(Error::InvalidArgument("fps must be positive".into()));
        }
        Ok(())
    }

    /// Number of buffered frames the "before" part asks for
    pub fn before_frame_count(&self) -> usize {
        (self.before_seconds * f64::from(self.fps)).round() as usize
    }

    /// Clip parameters handed to the muxer
    pub fn spec(&self) -> VideoSpec {
        VideoSpec {
            fps: self.fps,
            width: self.width,
            height: self.height,
        }
    }
}

/// Turns an ordered frame sequence into a clip
#[async_trait]
pub trait VideoMuxer: Send + Sync {
    async fn mux(
        &self,
        frames: Vec<FrameRecord>,
        spec: VideoSpec,
        output: ExportOutput,
    ) -> Result<ExportedVideo>;
}

/// Muxer producing a raw Annex-B H.264 stream (`.h264`)
///
/// Leading frames are dropped up to the first one a decoder can start
/// from (SPS or IDR slice).
#[derive(Debug, Clone)]
pub struct RawH264Muxer {
    output_dir: PathBuf,
}

impl RawH264Muxer {
    /// Create a muxer writing files into `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Directory clips are written to
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl Default for RawH264Muxer {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("camfleet"))
    }
}

#[async_trait]
impl VideoMuxer for RawH264Muxer {
    async fn mux(
        &self,
        frames: Vec<FrameRecord>,
        spec: VideoSpec,
        output: ExportOutput,
    ) -> Result<ExportedVideo> {
        let decodable: Vec<&FrameRecord> = frames
            .iter()
            .skip_while(|f| !is_random_access_point(&f.data))
            .collect();

        if decodable.is_empty() {
            return Err(Error::Mux(format!(
                "no decodable frame among {} frames",
                frames.len()
            )));
        }

        let size = decodable.iter().map(|f| f.size()).sum();
        let mut stream = BytesMut::with_capacity(size);
        for frame in &decodable {
            stream.extend_from_slice(&frame.data);
        }
        let stream = stream.freeze();

        tracing::debug!(
            frames = decodable.len(),
            skipped = frames.len() - decodable.len(),
            bytes = stream.len(),
            fps = spec.fps,
            "Muxed H.264 clip"
        );

        match output {
            ExportOutput::Bytes => Ok(ExportedVideo::Bytes(stream)),
            ExportOutput::File => {
                tokio::fs::create_dir_all(&self.output_dir).await?;
                let path = self
                    .output_dir
                    .join(format!("{}.h264", uuid::Uuid::new_v4()));
                tokio::fs::write(&path, &stream).await?;
                Ok(ExportedVideo::File(path))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const SPEC: VideoSpec = VideoSpec {
        fps: 10,
        width: 640,
        height: 480,
    };

    fn idr(ts_ms: u64) -> FrameRecord {
        FrameRecord::new(
            Duration::from_millis(ts_ms),
            vec![0x00, 0x00, 0x00, 0x01, 0x65, 0x88],
        )
    }

    fn inter(ts_ms: u64) -> FrameRecord {
        FrameRecord::new(
            Duration::from_millis(ts_ms),
            vec![0x00, 0x00, 0x00, 0x01, 0x41, 0x9A],
        )
    }

    #[test]
    fn test_validate_rejects_negative() {
        let req = ExportRequest::new(-1.0, 2.0, SPEC);
        assert!(matches!(req.validate(), Err(Error::InvalidArgument(_))));

        let req = ExportRequest::new(1.0, -0.5, SPEC);
        assert!(matches!(req.validate(), Err(Error::InvalidArgument(_))));

        let req = ExportRequest::new(f64::NAN, 1.0, SPEC);
        assert!(matches!(req.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_validate_rejects_zero_fps() {
        let spec = VideoSpec { fps: 0, ..SPEC };
        let req = ExportRequest::new(1.0, 1.0, spec);
        assert!(matches!(req.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_before_frame_count() {
        assert_eq!(ExportRequest::new(2.0, 0.0, SPEC).before_frame_count(), 20);
        assert_eq!(ExportRequest::new(0.25, 0.0, SPEC).before_frame_count(), 3);
        assert_eq!(ExportRequest::new(0.0, 0.0, SPEC).before_frame_count(), 0);
    }

    #[tokio::test]
    async fn test_raw_muxer_skips_to_keyframe() {
        let muxer = RawH264Muxer::default();
        let frames = vec![inter(0), inter(100), idr(200), inter(300)];

        let video = muxer
            .mux(frames, SPEC, ExportOutput::Bytes)
            .await
            .unwrap();

        let bytes = video.into_bytes().await.unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes[4], 0x65);
    }

    #[tokio::test]
    async fn test_raw_muxer_without_keyframe_fails() {
        let muxer = RawH264Muxer::default();
        let result = muxer
            .mux(vec![inter(0), inter(100)], SPEC, ExportOutput::Bytes)
            .await;

        assert!(matches!(result, Err(Error::Mux(_))));
    }

    #[tokio::test]
    async fn test_raw_muxer_writes_file() {
        let dir = std::env::temp_dir().join(format!("camfleet-test-{}", uuid::Uuid::new_v4()));
        let muxer = RawH264Muxer::new(&dir);

        let video = muxer
            .mux(vec![idr(0), inter(100)], SPEC, ExportOutput::File)
            .await
            .unwrap();

        let path = video.path().unwrap().to_path_buf();
        assert!(path.starts_with(&dir));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("h264"));

        let bytes = video.into_bytes().await.unwrap();
        assert_eq!(bytes.len(), 12);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
