//! Stream kinds

use crate::error::{Error, Result};

/// What produces a device stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Color or mono camera
    Camera,
    /// Stereo depth
    Stereo,
    /// Neural network output
    Neural,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Camera => "camera",
            StreamKind::Stereo => "stereo",
            StreamKind::Neural => "neural",
        }
    }

    /// Frame rate used when the stream does not report one
    pub const DEFAULT_FPS: u32 = 30;

    /// Check this kind can back a live view
    ///
    /// Only camera and stereo streams carry encoded video.
    pub fn ensure_live_view(&self) -> Result<()> {
        match self {
            StreamKind::Camera | StreamKind::Stereo => Ok(()),
            StreamKind::Neural => Err(Error::UnsupportedStream(format!(
                "{} streams cannot be published as a live view",
                self.as_str()
            ))),
        }
    }

    /// Default unique key of a live view on this stream
    pub fn default_unique_key(&self, device_mxid: &str) -> String {
        format!("{}_{}_encoded", device_mxid, self.as_str())
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_view_capability() {
        assert!(StreamKind::Camera.ensure_live_view().is_ok());
        assert!(StreamKind::Stereo.ensure_live_view().is_ok());
        assert!(matches!(
            StreamKind::Neural.ensure_live_view(),
            Err(Error::UnsupportedStream(_))
        ));
    }

    #[test]
    fn test_default_unique_key() {
        assert_eq!(
            StreamKind::Stereo.default_unique_key("18443010D1B3F31200"),
            "18443010D1B3F31200_stereo_encoded"
        );
    }
}
