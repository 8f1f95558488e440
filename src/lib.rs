//! camfleet: lifecycle coordination for fleets of cloud-connected cameras
//!
//! The crate boots a set of edge camera devices, polls them for encoded
//! video, publishes that video (with overlays) as live views, reports device
//! health to a remote agent, keeps a short frame history for event clips,
//! and shuts everything down in a fixed order.
//!
//! Device drivers and remote transports are collaborators behind traits;
//! [`device::simulated`] and [`transport::memory`] provide in-process
//! implementations.
//!
//! # Architecture
//!
//! ```text
//!                        DeviceCoordinator
//!          ┌──────────────────┼───────────────────┐
//!   connection loop     polling loop        reporting loop
//!   (reattach)               │                    │
//!          │           DeviceHandle::poll   info/stats reports
//!          ▼                 │                    ▼
//!     DeviceDriver           ▼              AgentTransport
//!                     LiveView::on_frame
//!                       ├─► StreamHandle (frame + overlay metadata)
//!                       └─► FrameBuffer ──► export ──► VideoMuxer ──► EventSink
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use camfleet::coordinator::DeviceCoordinator;
//! use camfleet::device::{DeviceDescriptor, SimulatedDevice, SimulatedDriver};
//! use camfleet::live_view::{LiveView, LiveViewOptions, StreamKind, StreamSource};
//! use camfleet::transport::MemoryHub;
//!
//! # async fn run() -> camfleet::Result<()> {
//! let driver = Arc::new(SimulatedDriver::new());
//! driver.add_device(SimulatedDevice::new("A").with_stream("A_camera_encoded", 30));
//!
//! let coordinator = DeviceCoordinator::new(driver, MemoryHub::new().context());
//! let view = LiveView::create(
//!     coordinator.context(),
//!     StreamSource::new("A", StreamKind::Camera, 1920, 1080).fps(30),
//!     LiveViewOptions::new("Color").max_buffer_seconds(10.0),
//! )?;
//!
//! coordinator.add_device(DeviceDescriptor::new("A"))?;
//! coordinator.start().await?;
//!
//! view.add_rectangle([100, 100, 300, 400], "person");
//! view.save_video_event(5.0, 5.0, "Person detected")?;
//!
//! coordinator.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod context;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod live_view;
pub mod media;
pub mod stats;
pub mod transport;
pub mod watchdog;

pub use context::HubContext;
pub use coordinator::{CoordinatorConfig, CoordinatorPhase, DeviceCoordinator, DeviceEvent};
pub use error::{DriverError, Error, Result, TransportError};
pub use live_view::{LiveView, LiveViewOptions, LiveViewRegistry};
pub use watchdog::{WatchDog, WatchDogStatus};
