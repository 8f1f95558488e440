//! Live view registry
//!
//! Owned by the application context. Views are kept in registration order;
//! registering a key twice replaces the earlier view in place.

use std::sync::Arc;

use parking_lot::RwLock;

use super::view::LiveView;

/// Registry of live views by unique key and name
#[derive(Debug, Default)]
pub struct LiveViewRegistry {
    views: RwLock<Vec<Arc<LiveView>>>,
}

impl LiveViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view under its unique key
    ///
    /// Returns the view it replaced, if any.
    pub fn register(&self, view: Arc<LiveView>) -> Option<Arc<LiveView>> {
        let mut views = self.views.write();

        if let Some(slot) = views.iter_mut().find(|v| v.unique_key() == view.unique_key()) {
            tracing::debug!(unique_key = %view.unique_key(), "Replacing live view");
            return Some(std::mem::replace(slot, view));
        }

        views.push(view);
        None
    }

    /// Remove the view registered under `unique_key`
    pub fn unregister(&self, unique_key: &str) -> Option<Arc<LiveView>> {
        let mut views = self.views.write();
        let index = views.iter().position(|v| v.unique_key() == unique_key)?;
        Some(views.remove(index))
    }

    /// View registered under `unique_key`
    pub fn get_by_key(&self, unique_key: &str) -> Option<Arc<LiveView>> {
        self.views
            .read()
            .iter()
            .find(|v| v.unique_key() == unique_key)
            .cloned()
    }

    /// First view named `name`
    pub fn get_by_name(&self, name: &str) -> Option<Arc<LiveView>> {
        self.views.read().iter().find(|v| v.name() == name).cloned()
    }

    /// Views fed by device `mxid`
    pub fn views_for_device(&self, mxid: &str) -> Vec<Arc<LiveView>> {
        self.views
            .read()
            .iter()
            .filter(|v| v.device_mxid() == mxid)
            .cloned()
            .collect()
    }

    /// Number of registered views
    pub fn len(&self) -> usize {
        self.views.read().len()
    }

    /// Check if no view is registered
    pub fn is_empty(&self) -> bool {
        self.views.read().is_empty()
    }
}
