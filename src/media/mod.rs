//! Media inspection helpers
//!
//! This module provides:
//! - H.264 Annex-B NAL unit iteration
//! - Encoded-frame sanity checks used by live views and the muxer

pub mod h264;

pub use h264::{is_h264_frame, is_random_access_point, AnnexBIterator, NaluType};
