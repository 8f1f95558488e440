//! Devices and their sessions
//!
//! A device is identified by its MXID for the whole life of the
//! application; sessions on it come and go as it connects, disconnects
//! and reconnects.
//!
//! - [`DeviceDriver`] / [`DeviceSession`]: the driver collaborator
//! - [`DeviceHandle`]: one started session plus its connection state
//! - [`DeviceInfo`] / [`DeviceStats`]: report payloads for the agent
//! - [`simulated`]: scripted in-process devices

pub mod driver;
pub mod handle;
pub mod report;
pub mod simulated;
pub mod state;

pub use driver::{DeviceDescriptor, DeviceDriver, DeviceSession, PollOutcome, StreamPacket};
pub use handle::DeviceHandle;
pub use report::{DeviceInfo, DeviceStats};
pub use simulated::{SessionCounters, SimulatedDevice, SimulatedDriver};
pub use state::ConnectionState;
