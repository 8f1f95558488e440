//! Frame buffering for event-triggered video export
//!
//! Each live view owns a [`FrameBuffer`]: a fixed-capacity ring of recent
//! encoded frames. An export request slices the history, taps the live
//! feed for the "after" window on its own task, and hands the frames to a
//! [`VideoMuxer`].
//!
//! # Flow
//!
//! ```text
//!   save_video(before=2s, after=3s)
//!        │
//!        ├─ slice last 2s ─────────────┐
//!        ├─ open tap ──► wait for 3s ──┤
//!        │              (spawned task) ▼
//!        └─ JoinHandle ◄──── muxer.mux(before + after)
//! ```
//!
//! # Zero-Copy Design
//!
//! Frames hold `bytes::Bytes`, so the ring, every tap and the muxer share
//! one allocation per frame.

pub mod config;
pub mod export;
pub mod frame;
pub mod ring;

pub use config::BufferConfig;
pub use export::{ExportOutput, ExportRequest, ExportedVideo, RawH264Muxer, VideoMuxer, VideoSpec};
pub use frame::FrameRecord;
pub use ring::{FrameBuffer, Tap, TapToken};
