//! In-process channel engine
//!
//! Implements the channel contract entirely in memory. Every client gets
//! its own `MemoryProvider`; providers created from the same engine see the
//! same channels, so several members can meet in one process. The engine
//! behaviour that matters to rooms (relay propagation delay, native
//! failures) can be tuned at runtime.

mod channel;
mod member;
mod state;

pub use channel::MemoryChannel;
pub use member::{MemoryBot, MemoryLocalPerson};
pub use state::DEFAULT_MAX_SUBSCRIBERS;

use crate::error::{ChannelError, Result};
use crate::traits::{Channel, ChannelProvider};
use crate::types::ChannelId;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use state::SharedChannel;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Capacity of each channel's event broadcast
const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// When a relay publication becomes enumerable after start-forwarding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayVisibility {
    #[default]
    Immediate,
    Delayed(Duration),
    /// The relay id is returned but the publication never shows up
    Never,
}

/// Tunable engine behaviour
#[derive(Debug, Clone, Default)]
pub struct EngineBehavior {
    pub relay_visibility: RelayVisibility,
    pub fail_start_forwarding: bool,
    pub fail_stop_forwarding: bool,
}

/// In-memory engine shared by all clients of one process
pub struct MemoryEngine {
    channels: DashMap<ChannelId, Arc<SharedChannel>>,
    behavior: Arc<RwLock<EngineBehavior>>,
    event_capacity: usize,
}

impl MemoryEngine {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_behavior(EngineBehavior::default())
    }

    #[must_use]
    pub fn with_behavior(behavior: EngineBehavior) -> Arc<Self> {
        Self::with_event_capacity(behavior, DEFAULT_EVENT_CAPACITY)
    }

    /// Engine whose channels buffer at most `event_capacity` undelivered
    /// events per receiver; slower receivers observe a lag.
    #[must_use]
    pub fn with_event_capacity(behavior: EngineBehavior, event_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            channels: DashMap::new(),
            behavior: Arc::new(RwLock::new(behavior)),
            event_capacity: event_capacity.max(1),
        })
    }

    /// A client handle onto this engine
    #[must_use]
    pub fn provider(self: &Arc<Self>) -> MemoryProvider {
        MemoryProvider {
            engine: Arc::clone(self),
        }
    }

    pub fn set_relay_visibility(&self, visibility: RelayVisibility) {
        self.behavior.write().relay_visibility = visibility;
    }

    pub fn set_fail_start_forwarding(&self, fail: bool) {
        self.behavior.write().fail_start_forwarding = fail;
    }

    pub fn set_fail_stop_forwarding(&self, fail: bool) {
        self.behavior.write().fail_stop_forwarding = fail;
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn lookup(&self, name: Option<&str>, id: Option<&ChannelId>) -> Option<Arc<SharedChannel>> {
        if let Some(id) = id {
            return self.channels.get(id).map(|entry| Arc::clone(entry.value()));
        }
        let name = name?;
        self.channels
            .iter()
            .find(|entry| entry.value().name.as_deref() == Some(name))
            .map(|entry| Arc::clone(entry.value()))
    }

    fn insert(&self, name: Option<&str>, metadata: Option<&str>) -> Result<Arc<SharedChannel>> {
        if let Some(name) = name {
            if self.lookup(Some(name), None).is_some() {
                return Err(ChannelError::AlreadyExists(format!("channel {name}")));
            }
        }
        let shared = Arc::new(SharedChannel::new(
            name,
            metadata,
            Arc::clone(&self.behavior),
            self.event_capacity,
        ));
        self.channels.insert(shared.id.clone(), Arc::clone(&shared));
        info!(channel_id = %shared.id, name = ?name, "Channel created");
        Ok(shared)
    }
}

/// One client's view of a `MemoryEngine`
#[derive(Clone)]
pub struct MemoryProvider {
    engine: Arc<MemoryEngine>,
}

impl MemoryProvider {
    #[must_use]
    pub fn engine(&self) -> &Arc<MemoryEngine> {
        &self.engine
    }

    fn view(shared: Arc<SharedChannel>) -> Arc<dyn Channel> {
        Arc::new(MemoryChannel::new(shared))
    }
}

#[async_trait]
impl ChannelProvider for MemoryProvider {
    async fn create(
        &self,
        name: Option<&str>,
        metadata: Option<&str>,
    ) -> Result<Arc<dyn Channel>> {
        self.engine.insert(name, metadata).map(Self::view)
    }

    async fn find(&self, name: Option<&str>, id: Option<&ChannelId>) -> Result<Arc<dyn Channel>> {
        if name.is_none() && id.is_none() {
            return Err(ChannelError::InvalidInput(
                "either name or id is required".to_string(),
            ));
        }
        self.engine
            .lookup(name, id)
            .map(Self::view)
            .ok_or_else(|| ChannelError::NotFound(format!("channel {name:?}/{id:?}")))
    }

    async fn find_or_create(
        &self,
        name: Option<&str>,
        metadata: Option<&str>,
    ) -> Result<Arc<dyn Channel>> {
        if let Some(shared) = self.engine.lookup(name, None) {
            return Ok(Self::view(shared));
        }
        self.engine.insert(name, metadata).map(Self::view)
    }
}
