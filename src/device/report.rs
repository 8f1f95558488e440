//! Device info and statistics snapshots
//!
//! These are the payloads the reporting loop forwards to the remote agent.
//! Field names match what the agent expects on the wire.

use serde::Serialize;

use super::state::ConnectionState;

const UNKNOWN: &str = "unknown";

/// Point-in-time description of a device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub mxid: String,
    pub protocol: String,
    pub platform: String,
    pub product_name: String,
    pub board_name: String,
    pub board_rev: String,
    pub bootloader_version: String,
    pub state: ConnectionState,
}

impl DeviceInfo {
    /// Create an info record with every descriptive field set to "unknown"
    pub fn unknown(mxid: impl Into<String>) -> Self {
        Self {
            mxid: mxid.into(),
            protocol: UNKNOWN.into(),
            platform: UNKNOWN.into(),
            product_name: UNKNOWN.into(),
            board_name: UNKNOWN.into(),
            board_rev: UNKNOWN.into(),
            bootloader_version: UNKNOWN.into(),
            state: ConnectionState::Disconnected,
        }
    }
}

/// Point-in-time resource usage of a device
///
/// Usages are percentages, temperatures are hundredths of a degree
/// Celsius, memory figures are bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceStats {
    pub mxid: String,
    pub css_usage: i64,
    pub mss_usage: i64,
    pub ddr_mem_free: i64,
    pub ddr_mem_total: i64,
    pub cmx_mem_free: i64,
    pub cmx_mem_total: i64,
    pub css_temp: i64,
    pub mss_temp: i64,
    pub upa_temp: i64,
    pub dss_temp: i64,
    pub temp: i64,
}

impl DeviceStats {
    /// Create an empty stats record for a device
    pub fn new(mxid: impl Into<String>) -> Self {
        Self {
            mxid: mxid.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_wire_shape() {
        let mut info = DeviceInfo::unknown("1844301011B546F500");
        info.state = ConnectionState::Connected;

        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["mxid"], "1844301011B546F500");
        assert_eq!(value["product_name"], "unknown");
        assert_eq!(value["state"], "connected");
    }

    #[test]
    fn test_stats_wire_shape() {
        let mut stats = DeviceStats::new("1844301011B546F500");
        stats.css_usage = 42;
        stats.temp = 4350;

        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["css_usage"], 42);
        assert_eq!(value["temp"], 4350);
        assert_eq!(value["ddr_mem_free"], 0);
    }
}
