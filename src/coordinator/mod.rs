//! Device lifecycle coordination
//!
//! The [`DeviceCoordinator`] owns the device set and drives three loops
//! over it:
//!
//! ```text
//!   connection loop ── reattach disconnected devices  (connect_interval)
//!   reporting loop  ── info + stats ──► AgentTransport (report_interval)
//!   polling loop    ── poll ──► LiveView::on_frame    (poll_interval)
//! ```
//!
//! All three share one cancellation token. `stop()` cancels it, joins the
//! loops (connection, reporting, polling), destroys the remote streams and
//! closes every booted device.

pub mod config;
pub mod device_set;
mod loops;
pub mod manager;
pub mod phase;

pub use config::CoordinatorConfig;
pub use device_set::{DeviceEntry, DeviceSet};
pub use manager::DeviceCoordinator;
pub use phase::{CoordinatorPhase, DeviceEvent};
