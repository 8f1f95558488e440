//! Simulated devices
//!
//! A [`DeviceDriver`] backed by scripted in-process devices. Each device
//! emits synthetic Annex-B H.264 frames at its stream frame rates and can
//! be told to disconnect, refuse to open or fail individual calls. Used by
//! tests and the demo; no hardware needed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::buffer::FrameRecord;
use crate::error::DriverError;

use super::driver::{DeviceDescriptor, DeviceDriver, DeviceSession, PollOutcome, StreamPacket};
use super::report::{DeviceInfo, DeviceStats};

const KEYFRAME: &[u8] = &[
    0x00, 0x00, 0x00, 0x01, 0x67, 0x64, 0x00, 0x1F, // SPS
    0x00, 0x00, 0x00, 0x01, 0x68, 0xEE, 0x3C, 0x80, // PPS
    0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00, // IDR
];

const INTER_FRAME: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x41, 0x9A, 0x02, 0x00];

/// One synthetic output stream
#[derive(Debug, Clone)]
struct SimulatedStream {
    unique_key: String,
    fps: u32,
}

/// Script for one simulated device
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    mxid: String,
    product_name: String,
    streams: Vec<SimulatedStream>,
    disconnect_after: Option<u64>,
    open_failures: u32,
    fail_start: bool,
    fail_info: bool,
    fail_stats: bool,
    fail_close: bool,
    hang_open: bool,
    hang_poll: bool,
}

impl SimulatedDevice {
    /// Create a well-behaved device with no streams
    pub fn new(mxid: impl Into<String>) -> Self {
        Self {
            mxid: mxid.into(),
            product_name: "OAK-D".into(),
            streams: Vec::new(),
            disconnect_after: None,
            open_failures: 0,
            fail_start: false,
            fail_info: false,
            fail_stats: false,
            fail_close: false,
            hang_open: false,
            hang_poll: false,
        }
    }

    pub fn mxid(&self) -> &str {
        &self.mxid
    }

    /// Set the reported product name
    pub fn product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = name.into();
        self
    }

    /// Emit frames for the live view `unique_key` at `fps`
    pub fn with_stream(mut self, unique_key: impl Into<String>, fps: u32) -> Self {
        self.streams.push(SimulatedStream {
            unique_key: unique_key.into(),
            fps: fps.max(1),
        });
        self
    }

    /// Report a disconnect after `polls` successful polls of each session
    pub fn disconnect_after(mut self, polls: u64) -> Self {
        self.disconnect_after = Some(polls);
        self
    }

    /// Refuse the first `count` open attempts
    pub fn open_failures(mut self, count: u32) -> Self {
        self.open_failures = count;
        self
    }

    /// Fail every session start
    pub fn fail_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Fail info queries
    pub fn fail_info(mut self) -> Self {
        self.fail_info = true;
        self
    }

    /// Fail stats queries
    pub fn fail_stats(mut self) -> Self {
        self.fail_stats = true;
        self
    }

    /// Fail session close
    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Never return from open
    pub fn hang_open(mut self) -> Self {
        self.hang_open = true;
        self
    }

    /// Never return from poll
    pub fn hang_poll(mut self) -> Self {
        self.hang_poll = true;
        self
    }
}

/// Call counters of one simulated device, across all its sessions
#[derive(Debug, Default)]
pub struct SessionCounters {
    opens: AtomicU64,
    starts: AtomicU64,
    polls: AtomicU64,
    closes: AtomicU64,
    frames: AtomicU64,
}

impl SessionCounters {
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn starts(&self) -> u64 {
        self.starts.load(Ordering::Relaxed)
    }

    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::Relaxed)
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

struct DeviceSlot {
    script: SimulatedDevice,
    counters: Arc<SessionCounters>,
    available: AtomicBool,
    remaining_open_failures: AtomicU32,
}

/// Driver over simulated devices
#[derive(Default)]
pub struct SimulatedDriver {
    devices: RwLock<HashMap<String, Arc<DeviceSlot>>>,
}

impl SimulatedDriver {
    /// Create a driver with no devices
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug in a device, replacing any device with the same MXID
    pub fn add_device(&self, device: SimulatedDevice) {
        let slot = DeviceSlot {
            remaining_open_failures: AtomicU32::new(device.open_failures),
            counters: Arc::new(SessionCounters::default()),
            available: AtomicBool::new(true),
            script: device,
        };
        self.devices
            .write()
            .insert(slot.script.mxid.clone(), Arc::new(slot));
    }

    /// Counters of a device
    pub fn counters(&self, mxid: &str) -> Option<Arc<SessionCounters>> {
        self.devices
            .read()
            .get(mxid)
            .map(|slot| Arc::clone(&slot.counters))
    }

    /// Unplug (`false`) or replug (`true`) a device
    ///
    /// An unplugged device reports a disconnect on its next poll and
    /// refuses new sessions.
    pub fn set_available(&self, mxid: &str, available: bool) {
        if let Some(slot) = self.devices.read().get(mxid) {
            slot.available.store(available, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl DeviceDriver for SimulatedDriver {
    async fn open(&self, device: &DeviceDescriptor) -> Result<Box<dyn DeviceSession>, DriverError> {
        let slot = self
            .devices
            .read()
            .get(&device.mxid)
            .cloned()
            .ok_or_else(|| DriverError::Unavailable(format!("{} not found", device.mxid)))?;

        if !slot.available.load(Ordering::Relaxed) {
            return Err(DriverError::Unavailable(format!("{} unplugged", device.mxid)));
        }

        let refused = slot
            .remaining_open_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(DriverError::Unavailable(format!("{} busy", device.mxid)));
        }

        slot.counters.opens.fetch_add(1, Ordering::Relaxed);
        if slot.script.hang_open {
            std::future::pending::<()>().await;
        }

        let emitted = vec![0; slot.script.streams.len()];

        Ok(Box::new(SimulatedSession {
            slot,
            started_at: None,
            polls: 0,
            emitted,
        }))
    }
}

struct SimulatedSession {
    slot: Arc<DeviceSlot>,
    started_at: Option<Instant>,
    polls: u64,
    emitted: Vec<u64>,
}

impl SimulatedSession {
    fn due_frames(&mut self, elapsed: Duration) -> Vec<StreamPacket> {
        let mut packets = Vec::new();

        for (stream, emitted) in self.slot.script.streams.iter().zip(self.emitted.iter_mut()) {
            let fps = u64::from(stream.fps);
            let due = (elapsed.as_secs_f64() * fps as f64) as u64 + 1;

            while *emitted < due {
                let index = *emitted;
                let data = if index % fps == 0 {
                    Bytes::from_static(KEYFRAME)
                } else {
                    Bytes::from_static(INTER_FRAME)
                };
                let timestamp = Duration::from_secs_f64(index as f64 / fps as f64);
                packets.push(StreamPacket::new(
                    stream.unique_key.clone(),
                    FrameRecord::new(timestamp, data),
                ));
                *emitted += 1;
            }
        }

        packets
    }
}

#[async_trait]
impl DeviceSession for SimulatedSession {
    async fn start(&mut self) -> Result<(), DriverError> {
        if self.slot.script.fail_start {
            return Err(DriverError::Other("pipeline start failed".into()));
        }
        self.slot.counters.starts.fetch_add(1, Ordering::Relaxed);
        self.started_at = Some(Instant::now());
        Ok(())
    }

    async fn poll(&mut self) -> PollOutcome {
        self.slot.counters.polls.fetch_add(1, Ordering::Relaxed);
        self.polls += 1;
        if self.slot.script.hang_poll {
            std::future::pending::<()>().await;
        }

        let unplugged = !self.slot.available.load(Ordering::Relaxed);
        let exhausted = self
            .slot
            .script
            .disconnect_after
            .is_some_and(|limit| self.polls > limit);
        if unplugged || exhausted {
            return PollOutcome::Disconnected;
        }

        let Some(started_at) = self.started_at else {
            return PollOutcome::Data(Vec::new());
        };

        let packets = self.due_frames(started_at.elapsed());
        self.slot
            .counters
            .frames
            .fetch_add(packets.len() as u64, Ordering::Relaxed);
        PollOutcome::Data(packets)
    }

    async fn info(&self) -> Result<DeviceInfo, DriverError> {
        if self.slot.script.fail_info {
            return Err(DriverError::Unsupported("device info".into()));
        }

        let mut info = DeviceInfo::unknown(self.slot.script.mxid.clone());
        info.protocol = "X_LINK_USB_VSC".into();
        info.platform = "X_LINK_MYRIAD_X".into();
        info.product_name = self.slot.script.product_name.clone();
        info.board_name = "DM9098".into();
        info.board_rev = "R3M1E3".into();
        info.bootloader_version = "0.0.26".into();
        Ok(info)
    }

    async fn stats(&self) -> Result<DeviceStats, DriverError> {
        if self.slot.script.fail_stats {
            return Err(DriverError::Unsupported("device stats".into()));
        }

        let mut stats = DeviceStats::new(self.slot.script.mxid.clone());
        stats.css_usage = 21;
        stats.mss_usage = 13;
        stats.ddr_mem_total = 358_612_992;
        stats.ddr_mem_free = 201_326_592;
        stats.cmx_mem_total = 2_621_440;
        stats.cmx_mem_free = 1_048_576;
        stats.css_temp = 4312;
        stats.mss_temp = 4290;
        stats.upa_temp = 4355;
        stats.dss_temp = 4401;
        stats.temp = 4339;
        Ok(stats)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.slot.counters.closes.fetch_add(1, Ordering::Relaxed);
        if self.slot.script.fail_close {
            return Err(DriverError::Other("close timed out".into()));
        }
        Ok(())
    }
}
