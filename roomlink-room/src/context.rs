//! Explicit room context
//!
//! Holds everything rooms of one application share: the channel provider,
//! configuration and the task tracker running room event pumps. Contexts
//! are independent of each other; nothing here is process-wide.

use crate::config::RoomConfig;
use crate::error::{Error, Result};
use crate::task_tracker::TaskTracker;
use roomlink_channel::ChannelProvider;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;

pub struct RoomContext {
    provider: Arc<dyn ChannelProvider>,
    config: RoomConfig,
    tasks: TaskTracker,
    active: AtomicBool,
}

impl RoomContext {
    /// Set up a context on the current tokio runtime
    pub fn setup(provider: Arc<dyn ChannelProvider>, config: RoomConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|_| Error::InvalidInput("a tokio runtime is required".to_string()))?;

        info!(
            bot_subtype = %config.relay.bot_subtype,
            resolve_attempts = config.relay.resolve_attempts,
            "Room context set up"
        );

        Ok(Arc::new(Self {
            provider,
            config,
            tasks: TaskTracker::new(runtime),
            active: AtomicBool::new(true),
        }))
    }

    #[must_use]
    pub fn is_setup(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    #[must_use]
    pub const fn config(&self) -> &RoomConfig {
        &self.config
    }

    #[must_use]
    pub const fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    pub(crate) fn provider(&self) -> Result<&Arc<dyn ChannelProvider>> {
        if !self.is_setup() {
            return Err(Error::ContextNotSetup);
        }
        Ok(&self.provider)
    }

    /// Stop every room event pump and wait for background work to finish
    pub async fn teardown(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            info!(live_tasks = self.tasks.size(), "Tearing down room context");
        }
        self.tasks.cancel_all();
        self.tasks.drain().await;
    }
}
