//! The coordinator's device collection
//!
//! Entries keep insertion order and are handed out as `Arc`s, so the loops
//! iterate a snapshot while add/remove go on. Each entry owns a slot that
//! holds the device's session handle while it is connected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::device::{ConnectionState, DeviceDescriptor, DeviceHandle};
use crate::error::{Error, Result};

/// One device known to the coordinator
///
/// The state is only written while the slot lock is held, so a reader that
/// holds the slot sees the state matching the slot contents.
pub struct DeviceEntry {
    descriptor: DeviceDescriptor,
    slot: Mutex<Option<DeviceHandle>>,
    state: RwLock<ConnectionState>,
    booted: AtomicBool,
}

impl DeviceEntry {
    fn new(descriptor: DeviceDescriptor) -> Self {
        Self {
            descriptor,
            slot: Mutex::new(None),
            state: RwLock::new(ConnectionState::Disconnected),
            booted: AtomicBool::new(false),
        }
    }

    pub fn mxid(&self) -> &str {
        &self.descriptor.mxid
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether a session was ever started on this device
    pub fn was_booted(&self) -> bool {
        self.booted.load(Ordering::Relaxed)
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    pub(crate) fn mark_booted(&self) {
        self.booted.store(true, Ordering::Relaxed);
    }

    pub(crate) fn slot(&self) -> &Mutex<Option<DeviceHandle>> {
        &self.slot
    }
}

impl std::fmt::Debug for DeviceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceEntry")
            .field("mxid", &self.descriptor.mxid)
            .field("state", &self.state())
            .field("booted", &self.was_booted())
            .finish()
    }
}

/// Insertion-ordered set of devices keyed by MXID
#[derive(Debug, Default)]
pub struct DeviceSet {
    entries: RwLock<Vec<Arc<DeviceEntry>>>,
}

impl DeviceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device
    ///
    /// Fails with [`Error::DuplicateDevice`] if the MXID is already present.
    pub fn insert(&self, descriptor: DeviceDescriptor) -> Result<Arc<DeviceEntry>> {
        let mut entries = self.entries.write();
        if entries.iter().any(|e| e.mxid() == descriptor.mxid) {
            return Err(Error::DuplicateDevice(descriptor.mxid));
        }

        let entry = Arc::new(DeviceEntry::new(descriptor));
        entries.push(Arc::clone(&entry));
        Ok(entry)
    }

    /// Remove a device, returning its entry
    pub fn remove(&self, mxid: &str) -> Option<Arc<DeviceEntry>> {
        let mut entries = self.entries.write();
        let index = entries.iter().position(|e| e.mxid() == mxid)?;
        Some(entries.remove(index))
    }

    /// Check that this very entry is still registered
    pub fn contains(&self, entry: &Arc<DeviceEntry>) -> bool {
        self.entries.read().iter().any(|e| Arc::ptr_eq(e, entry))
    }

    pub fn get(&self, mxid: &str) -> Option<Arc<DeviceEntry>> {
        self.entries.read().iter().find(|e| e.mxid() == mxid).cloned()
    }

    /// Entries in insertion order, as of now
    pub fn snapshot(&self) -> Vec<Arc<DeviceEntry>> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of devices in the connected state
    pub fn connected_count(&self) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|e| e.state() == ConnectionState::Connected)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_rejects_duplicates() {
        let set = DeviceSet::new();
        set.insert(DeviceDescriptor::new("A")).unwrap();

        let result = set.insert(DeviceDescriptor::new("A").with_name("again"));
        assert!(matches!(result, Err(Error::DuplicateDevice(mxid)) if mxid == "A"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_snapshot_keeps_insertion_order() {
        let set = DeviceSet::new();
        for mxid in ["C", "A", "B"] {
            set.insert(DeviceDescriptor::new(mxid)).unwrap();
        }
        set.remove("A");
        set.insert(DeviceDescriptor::new("A")).unwrap();

        let order: Vec<String> = set.snapshot().iter().map(|e| e.mxid().to_string()).collect();
        assert_eq!(order, vec!["C", "B", "A"]);
    }

    #[test]
    fn test_snapshot_survives_removal() {
        let set = DeviceSet::new();
        set.insert(DeviceDescriptor::new("A")).unwrap();
        let snapshot = set.snapshot();

        assert!(set.contains(&snapshot[0]));
        assert!(set.remove("A").is_some());
        assert!(set.remove("A").is_none());
        assert!(!set.contains(&snapshot[0]));
        assert!(set.is_empty());
        assert_eq!(snapshot[0].mxid(), "A");
    }

    #[test]
    fn test_connected_count_follows_state() {
        let set = DeviceSet::new();
        let a = set.insert(DeviceDescriptor::new("A")).unwrap();
        set.insert(DeviceDescriptor::new("B")).unwrap();
        assert_eq!(set.connected_count(), 0);

        a.set_state(ConnectionState::Connected);
        assert_eq!(set.connected_count(), 1);
        assert_eq!(set.get("A").unwrap().state(), ConnectionState::Connected);
    }

    #[test]
    fn test_concurrent_add_remove() {
        let set = Arc::new(DeviceSet::new());

        let workers: Vec<_> = (0..4)
            .map(|w| {
                let set = Arc::clone(&set);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let mxid = format!("{w}-{i}");
                        set.insert(DeviceDescriptor::new(&mxid)).unwrap();
                        let _ = set.snapshot();
                        if i % 2 == 0 {
                            assert!(set.remove(&mxid).is_some());
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(set.len(), 200);
        let mut mxids: Vec<String> = set.snapshot().iter().map(|e| e.mxid().to_string()).collect();
        mxids.sort();
        mxids.dedup();
        assert_eq!(mxids.len(), 200);
    }
}
