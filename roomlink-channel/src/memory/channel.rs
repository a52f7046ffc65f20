use super::member::{MemoryBot, MemoryLocalPerson};
use super::state::SharedChannel;
use crate::error::{ChannelError, Result};
use crate::event::ChannelEvent;
use crate::model::{
    ChannelState, Encoding, MemberInfo, MemberInit, MemberKind, MemberSide, PublicationInfo,
    SubscriptionInfo, SubscriptionOptions,
};
use crate::traits::{Channel, LocalPerson, RelayBot};
use crate::types::{ChannelId, MemberId, PublicationId, SubscriptionId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// A client's handle onto a shared in-memory channel
pub struct MemoryChannel {
    shared: Arc<SharedChannel>,
    local: RwLock<Option<Arc<MemoryLocalPerson>>>,
    disposed: Arc<AtomicBool>,
}

impl MemoryChannel {
    pub(crate) fn new(shared: Arc<SharedChannel>) -> Self {
        Self {
            shared,
            local: RwLock::new(None),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ChannelError::Disposed);
        }
        Ok(())
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn id(&self) -> ChannelId {
        self.shared.id.clone()
    }

    fn name(&self) -> Option<String> {
        self.shared.name.clone()
    }

    fn metadata(&self) -> String {
        self.shared.metadata()
    }

    fn state(&self) -> ChannelState {
        self.shared.state()
    }

    fn members(&self) -> Vec<MemberInfo> {
        self.shared.members()
    }

    fn publications(&self) -> Vec<PublicationInfo> {
        self.shared.publications()
    }

    fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.shared.subscriptions()
    }

    fn member(&self, id: &MemberId) -> Option<MemberInfo> {
        self.shared.member(id)
    }

    fn local_person(&self) -> Option<Arc<dyn LocalPerson>> {
        let local = self.local.read().clone()?;
        self.shared.member(&local.id())?;
        Some(local as Arc<dyn LocalPerson>)
    }

    fn side_of(&self, member: &MemberId) -> MemberSide {
        match self.local.read().as_ref() {
            Some(local) if &local.id() == member => MemberSide::Local,
            _ => MemberSide::Remote,
        }
    }

    fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.subscribe_events()
    }

    async fn update_metadata(&self, metadata: &str) -> Result<()> {
        self.ensure_active()?;
        self.shared.update_metadata(metadata)
    }

    async fn join(&self, init: MemberInit) -> Result<Arc<dyn LocalPerson>> {
        self.ensure_active()?;
        let member = self.shared.join(init)?;
        let person = Arc::new(MemoryLocalPerson::new(
            Arc::clone(&self.shared),
            member.id,
            Arc::clone(&self.disposed),
        ));
        *self.local.write() = Some(Arc::clone(&person));
        Ok(person)
    }

    async fn leave(&self, member: &MemberId) -> Result<()> {
        self.ensure_active()?;
        self.shared.leave(member)
    }

    async fn update_member_metadata(&self, member: &MemberId, metadata: &str) -> Result<()> {
        self.ensure_active()?;
        self.shared.update_member_metadata(member, metadata)
    }

    async fn close(&self) -> Result<()> {
        self.ensure_active()?;
        self.shared.close()
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            debug!(channel_id = %self.shared.id, "Channel handle disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    async fn enable_publication(&self, id: &PublicationId) -> Result<()> {
        self.ensure_active()?;
        self.shared.set_publication_enabled(id, true)
    }

    async fn disable_publication(&self, id: &PublicationId) -> Result<()> {
        self.ensure_active()?;
        self.shared.set_publication_enabled(id, false)
    }

    async fn cancel_publication(&self, id: &PublicationId) -> Result<()> {
        self.ensure_active()?;
        self.shared.unpublish(None, id)
    }

    async fn update_publication_metadata(&self, id: &PublicationId, metadata: &str) -> Result<()> {
        self.ensure_active()?;
        self.shared.update_publication_metadata(id, metadata)
    }

    async fn update_publication_encodings(
        &self,
        id: &PublicationId,
        encodings: Vec<Encoding>,
    ) -> Result<()> {
        self.ensure_active()?;
        self.shared.update_publication_encodings(id, encodings)
    }

    async fn change_preferred_encoding(
        &self,
        id: &SubscriptionId,
        encoding_id: &str,
    ) -> Result<()> {
        self.ensure_active()?;
        self.shared.change_preferred_encoding(id, encoding_id)
    }

    async fn cancel_subscription(&self, id: &SubscriptionId) -> Result<()> {
        self.ensure_active()?;
        self.shared.unsubscribe(None, id)
    }

    async fn subscribe_as(
        &self,
        member: &MemberId,
        publication: &PublicationId,
    ) -> Result<SubscriptionInfo> {
        self.ensure_active()?;
        self.shared
            .subscribe(member, publication, SubscriptionOptions::default())
    }

    async fn unsubscribe_as(&self, member: &MemberId, subscription: &SubscriptionId) -> Result<()> {
        self.ensure_active()?;
        self.shared.unsubscribe(Some(member), subscription)
    }

    async fn create_bot(&self, subtype: &str) -> Result<Arc<dyn RelayBot>> {
        self.ensure_active()?;
        let member = self.shared.join(MemberInit {
            kind: MemberKind::Bot {
                subtype: subtype.to_string(),
            },
            ..Default::default()
        })?;
        Ok(Arc::new(MemoryBot::new(
            Arc::clone(&self.shared),
            member.id,
            subtype.to_string(),
            Arc::clone(&self.disposed),
        )))
    }

    fn bot(&self, id: &MemberId) -> Option<Arc<dyn RelayBot>> {
        let MemberKind::Bot { subtype } = self.shared.is_bot(id)? else {
            return None;
        };
        Some(Arc::new(MemoryBot::new(
            Arc::clone(&self.shared),
            id.clone(),
            subtype,
            Arc::clone(&self.disposed),
        )))
    }
}
