//! Coordinator configuration

use std::time::Duration;

/// Coordinator configuration options
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Pause between two reporting rounds
    pub report_interval: Duration,

    /// Pause between two polling rounds
    pub poll_interval: Duration,

    /// Pause between two connection checks; also the startup device check
    pub connect_interval: Duration,

    /// Time allowed for one attach attempt (open + start)
    pub connect_timeout: Duration,

    /// Time allowed for each loop to finish at shutdown
    pub join_timeout: Duration,

    /// Capacity of the device event channel
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            report_interval: Duration::from_secs(10),
            poll_interval: Duration::from_micros(500),
            connect_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(30),
            join_timeout: Duration::from_secs(10),
            event_capacity: 64,
        }
    }
}

impl CoordinatorConfig {
    /// Set the reporting cadence
    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Set the polling cadence
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the connection check cadence
    pub fn connect_interval(mut self, interval: Duration) -> Self {
        self.connect_interval = interval;
        self
    }

    /// Set the per-attempt attach timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-loop shutdown join timeout
    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Set the event channel capacity (at least 1)
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();

        assert_eq!(config.report_interval, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_micros(500));
        assert_eq!(config.connect_interval, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.event_capacity, 64);
    }

    #[test]
    fn test_builder_chaining() {
        let config = CoordinatorConfig::default()
            .report_interval(Duration::from_millis(20))
            .poll_interval(Duration::from_millis(1))
            .connect_interval(Duration::from_millis(10))
            .connect_timeout(Duration::from_millis(100))
            .join_timeout(Duration::from_millis(200))
            .event_capacity(0);

        assert_eq!(config.report_interval, Duration::from_millis(20));
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.connect_interval, Duration::from_millis(10));
        assert_eq!(config.connect_timeout, Duration::from_millis(100));
        assert_eq!(config.join_timeout, Duration::from_millis(200));
        assert_eq!(config.event_capacity, 1);
    }
}
