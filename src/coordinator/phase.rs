//! Coordinator phases and device events

/// Lifecycle phase of a coordinator run
///
/// ```text
/// Idle ──start()──► Starting ──device present──► Running
///                       │                           │
///                       └────────stop()─────────────┴──► Stopping ──► Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinatorPhase {
    /// Created, not started
    Idle,
    /// Waiting for a device and booting the initial set
    Starting,
    /// All three loops running
    Running,
    /// Shutdown in progress
    Stopping,
    /// Terminal
    Stopped,
}

impl CoordinatorPhase {
    /// Check if the loops can be (or are) running
    pub fn is_active(&self) -> bool {
        matches!(self, CoordinatorPhase::Starting | CoordinatorPhase::Running)
    }
}

/// Connection change of one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A session was opened and started
    Connected { mxid: String },
    /// The session was lost or closed
    Disconnected { mxid: String },
}

impl DeviceEvent {
    pub fn mxid(&self) -> &str {
        match self {
            DeviceEvent::Connected { mxid } | DeviceEvent::Disconnected { mxid } => mxid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_phases() {
        assert!(!CoordinatorPhase::Idle.is_active());
        assert!(CoordinatorPhase::Starting.is_active());
        assert!(CoordinatorPhase::Running.is_active());
        assert!(!CoordinatorPhase::Stopping.is_active());
        assert!(!CoordinatorPhase::Stopped.is_active());
    }
}
