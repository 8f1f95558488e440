//! Error types for camfleet
//!
//! The crate-level [`Error`] covers coordinator, buffer and live view
//! operations. Collaborator failures have their own enums so a driver or
//! transport implementation does not depend on the crate error.

use crate::coordinator::CoordinatorPhase;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Crate error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad caller input (negative durations, zero fps, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Export requested on a live view whose buffer size is zero
    #[error("frame buffering is disabled (max buffer size is zero)")]
    BufferDisabled,

    /// A device with the same MXID is already registered
    #[error("device {0}: already registered")]
    DuplicateDevice(String),

    /// No device with this MXID is registered
    #[error("device {0}: not found")]
    DeviceNotFound(String),

    /// Opening or starting a device session failed
    #[error("device {mxid}: could not start: {source}")]
    DeviceStart {
        mxid: String,
        #[source]
        source: DriverError,
    },

    /// Closing a device session during shutdown failed
    #[error("device {mxid}: could not exit: {source}")]
    DeviceExit {
        mxid: String,
        #[source]
        source: DriverError,
    },

    /// Tearing down the remote streams failed
    #[error("destroy all streams failed: {0}")]
    DestroyStreams(#[source] TransportError),

    /// Any other transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The stream kind cannot back a live view
    #[error("unsupported stream: {0}")]
    UnsupportedStream(String),

    /// Operation not allowed in the coordinator's current phase
    #[error("coordinator is {0:?}")]
    InvalidPhase(CoordinatorPhase),

    /// `ping` on a watchdog that was never started
    #[error("watchdog {0}: not started")]
    WatchDogNotStarted(String),

    /// The muxer could not produce a clip
    #[error("mux failed: {0}")]
    Mux(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reported by a device driver or session
#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    /// The device could not be found or opened
    #[error("device unavailable: {0}")]
    Unavailable(String),

    /// The session is no longer connected
    #[error("device disconnected")]
    Disconnected,

    /// A query (info, stats) is not supported by the device
    #[error("not supported: {0}")]
    Unsupported(String),

    /// Anything else the driver reports
    #[error("{0}")]
    Other(String),
}

/// Errors reported by the agent, stream or event transports
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The remote side is not reachable
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The remote side rejected the request
    #[error("rejected: {0}")]
    Rejected(String),
}
