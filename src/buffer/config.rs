//! Frame buffer configuration

use std::time::Duration;

/// Frame buffer configuration options
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Seconds of history to keep (0 = buffering disabled)
    pub max_seconds: f64,

    /// Frame rate used to turn `max_seconds` into a frame count
    pub fps: f64,

    /// Extra wall-clock time an export waits for its "after" window
    pub after_grace: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_seconds: 0.0,
            fps: 30.0,
            after_grace: Duration::from_secs(5),
        }
    }
}

impl BufferConfig {
    /// Create a config keeping `max_seconds` of frames at `fps`
    pub fn new(max_seconds: f64, fps: f64) -> Self {
        Self {
            max_seconds,
            fps,
            ..Default::default()
        }
    }

    /// Set the "after" window grace period
    pub fn after_grace(mut self, grace: Duration) -> Self {
        self.after_grace = grace;
        self
    }

    /// Number of frames the buffer holds
    ///
    /// Computed once as `max_seconds * fps`, rounded. Non-finite or
    /// negative inputs give zero.
    pub fn capacity(&self) -> usize {
        let frames = (self.max_seconds * self.fps).round();
        if frames.is_finite() && frames > 0.0 {
            frames as usize
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BufferConfig::default();

        assert_eq!(config.capacity(), 0);
        assert_eq!(config.after_grace, Duration::from_secs(5));
    }

    #[test]
    fn test_capacity_rounds() {
        assert_eq!(BufferConfig::new(10.0, 30.0).capacity(), 300);
        assert_eq!(BufferConfig::new(1.5, 29.97).capacity(), 45);
        assert_eq!(BufferConfig::new(0.01, 30.0).capacity(), 0);
    }

    #[test]
    fn test_capacity_rejects_nonsense() {
        assert_eq!(BufferConfig::new(-3.0, 30.0).capacity(), 0);
        assert_eq!(BufferConfig::new(f64::NAN, 30.0).capacity(), 0);
        assert_eq!(BufferConfig::new(f64::INFINITY, 30.0).capacity(), 0);
    }

    #[test]
    fn test_builder_after_grace() {
        let config = BufferConfig::new(5.0, 10.0).after_grace(Duration::from_millis(250));

        assert_eq!(config.after_grace, Duration::from_millis(250));
        assert_eq!(config.capacity(), 50);
    }
}
