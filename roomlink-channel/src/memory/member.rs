use super::state::SharedChannel;
use crate::error::{ChannelError, Result};
use crate::model::{
    ForwardingDescriptor, LocalStream, PublicationInfo, PublicationOptions, SubscriptionInfo,
    SubscriptionOptions,
};
use crate::traits::{LocalPerson, RelayBot};
use crate::types::{ForwardingId, MemberId, PublicationId, SubscriptionId};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn ensure_active(disposed: &AtomicBool) -> Result<()> {
    if disposed.load(Ordering::Acquire) {
        return Err(ChannelError::Disposed);
    }
    Ok(())
}

/// Local member of an in-memory channel
pub struct MemoryLocalPerson {
    shared: Arc<SharedChannel>,
    id: MemberId,
    disposed: Arc<AtomicBool>,
}

impl MemoryLocalPerson {
    pub(crate) fn new(shared: Arc<SharedChannel>, id: MemberId, disposed: Arc<AtomicBool>) -> Self {
        Self {
            shared,
            id,
            disposed,
        }
    }
}

#[async_trait]
impl LocalPerson for MemoryLocalPerson {
    fn id(&self) -> MemberId {
        self.id.clone()
    }

    async fn publish(
        &self,
        stream: LocalStream,
        options: PublicationOptions,
    ) -> Result<PublicationInfo> {
        ensure_active(&self.disposed)?;
        self.shared.publish(&self.id, stream, options)
    }

    async fn unpublish(&self, publication: &PublicationId) -> Result<()> {
        ensure_active(&self.disposed)?;
        self.shared.unpublish(Some(&self.id), publication)
    }

    async fn subscribe(
        &self,
        publication: &PublicationId,
        options: SubscriptionOptions,
    ) -> Result<SubscriptionInfo> {
        ensure_active(&self.disposed)?;
        self.shared.subscribe(&self.id, publication, options)
    }

    async fn unsubscribe(&self, subscription: &SubscriptionId) -> Result<()> {
        ensure_active(&self.disposed)?;
        self.shared.unsubscribe(Some(&self.id), subscription)
    }

    async fn update_metadata(&self, metadata: &str) -> Result<()> {
        ensure_active(&self.disposed)?;
        self.shared.update_member_metadata(&self.id, metadata)
    }

    async fn leave(&self) -> Result<()> {
        ensure_active(&self.disposed)?;
        self.shared.leave(&self.id)
    }
}

/// Relay bot living inside an in-memory channel
pub struct MemoryBot {
    shared: Arc<SharedChannel>,
    id: MemberId,
    subtype: String,
    disposed: Arc<AtomicBool>,
}

impl MemoryBot {
    pub(crate) fn new(
        shared: Arc<SharedChannel>,
        id: MemberId,
        subtype: String,
        disposed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            shared,
            id,
            subtype,
            disposed,
        }
    }
}

#[async_trait]
impl RelayBot for MemoryBot {
    fn id(&self) -> MemberId {
        self.id.clone()
    }

    fn subtype(&self) -> String {
        self.subtype.clone()
    }

    async fn start_forwarding(
        &self,
        publication: &PublicationId,
        max_subscribers: Option<u32>,
    ) -> Result<ForwardingDescriptor> {
        ensure_active(&self.disposed)?;
        self.shared
            .start_forwarding(&self.id, publication, max_subscribers)
    }

    async fn stop_forwarding(&self, forwarding: &ForwardingId) -> Result<()> {
        ensure_active(&self.disposed)?;
        self.shared.stop_forwarding(&self.id, forwarding)
    }
}
