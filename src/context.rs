//! Application context
//!
//! Bundles the remote collaborators, the clip muxer and the live view
//! registry. Cheap to clone; every clone shares the same registry.

use std::sync::Arc;

use crate::buffer::{RawH264Muxer, VideoMuxer};
use crate::live_view::LiveViewRegistry;
use crate::transport::{AgentTransport, EventSink, StreamTransport};

/// Shared handles used by the coordinator and the live views
#[derive(Clone)]
pub struct HubContext {
    agent: Arc<dyn AgentTransport>,
    streams: Arc<dyn StreamTransport>,
    events: Arc<dyn EventSink>,
    muxer: Arc<dyn VideoMuxer>,
    live_views: Arc<LiveViewRegistry>,
}

impl HubContext {
    /// Create a context with the raw H.264 muxer and an empty registry
    pub fn new(
        agent: Arc<dyn AgentTransport>,
        streams: Arc<dyn StreamTransport>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            agent,
            streams,
            events,
            muxer: Arc::new(RawH264Muxer::default()),
            live_views: Arc::new(LiveViewRegistry::new()),
        }
    }

    /// Use another muxer for clip exports
    pub fn with_muxer(mut self, muxer: Arc<dyn VideoMuxer>) -> Self {
        self.muxer = muxer;
        self
    }

    pub fn agent(&self) -> &Arc<dyn AgentTransport> {
        &self.agent
    }

    pub fn streams(&self) -> &Arc<dyn StreamTransport> {
        &self.streams
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    pub fn muxer(&self) -> &Arc<dyn VideoMuxer> {
        &self.muxer
    }

    pub fn live_views(&self) -> &Arc<LiveViewRegistry> {
        &self.live_views
    }
}

impl std::fmt::Debug for HubContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubContext")
            .field("live_views", &self.live_views.len())
            .finish_non_exhaustive()
    }
}
