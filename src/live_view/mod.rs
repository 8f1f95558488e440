//! Live views
//!
//! A live view publishes one device stream to the remote side, with the
//! overlays the application drew since the previous frame, and keeps a
//! [`FrameBuffer`](crate::buffer::FrameBuffer) for event clips.
//!
//! ```text
//!   polling loop ──► LiveView::on_frame(frame)
//!                        ├─► publish: frame + metadata(overlays) ──► StreamHandle
//!                        └─► buffer.push(frame) ──► taps (exports)
//! ```

pub mod kind;
pub mod metadata;
pub mod overlay;
pub mod registry;
pub mod view;

pub use kind::StreamKind;
pub use metadata::build_metadata;
pub use overlay::{BoundingBox, Color, Detection, LineOverlay, OverlayObject, Overlays, TextOverlay};
pub use registry::LiveViewRegistry;
pub use view::{LiveView, LiveViewOptions, StreamSource};
