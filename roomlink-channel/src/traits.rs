//! Channel primitive contract
//!
//! These traits are the only boundary between rooms and the engine that
//! actually moves media. Every call that crosses into the engine is async;
//! enumerations (`members`, `publications`, ...) are point-in-time reads.

use crate::error::Result;
use crate::event::ChannelEvent;
use crate::model::{
    ChannelState, Encoding, ForwardingDescriptor, LocalStream, MemberInfo, MemberInit, MemberSide,
    PublicationInfo, PublicationOptions, SubscriptionInfo, SubscriptionOptions,
};
use crate::types::{ChannelId, ForwardingId, MemberId, PublicationId, SubscriptionId};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Entry point for creating or locating channels
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    async fn create(&self, name: Option<&str>, metadata: Option<&str>)
        -> Result<Arc<dyn Channel>>;

    async fn find(&self, name: Option<&str>, id: Option<&ChannelId>) -> Result<Arc<dyn Channel>>;

    async fn find_or_create(
        &self,
        name: Option<&str>,
        metadata: Option<&str>,
    ) -> Result<Arc<dyn Channel>>;
}

/// A joined or joinable channel as seen from this client
#[async_trait]
pub trait Channel: Send + Sync {
    fn id(&self) -> ChannelId;

    fn name(&self) -> Option<String>;

    fn metadata(&self) -> String;

    fn state(&self) -> ChannelState;

    /// Members that have not left
    fn members(&self) -> Vec<MemberInfo>;

    /// Publications that have not been canceled
    fn publications(&self) -> Vec<PublicationInfo>;

    /// Subscriptions that have not been canceled
    fn subscriptions(&self) -> Vec<SubscriptionInfo>;

    fn bots(&self) -> Vec<MemberInfo> {
        self.members()
            .into_iter()
            .filter(|member| member.kind.is_bot())
            .collect()
    }

    fn member(&self, id: &MemberId) -> Option<MemberInfo> {
        self.members().into_iter().find(|member| &member.id == id)
    }

    fn publication(&self, id: &PublicationId) -> Option<PublicationInfo> {
        self.publications()
            .into_iter()
            .find(|publication| &publication.id == id)
    }

    fn subscription(&self, id: &SubscriptionId) -> Option<SubscriptionInfo> {
        self.subscriptions()
            .into_iter()
            .find(|subscription| &subscription.id == id)
    }

    /// The member this client joined with, if any
    fn local_person(&self) -> Option<Arc<dyn LocalPerson>>;

    fn side_of(&self, member: &MemberId) -> MemberSide {
        match self.local_person() {
            Some(local) if &local.id() == member => MemberSide::Local,
            _ => MemberSide::Remote,
        }
    }

    /// Subscribe to this channel's notifications
    fn events(&self) -> broadcast::Receiver<ChannelEvent>;

    async fn update_metadata(&self, metadata: &str) -> Result<()>;

    async fn join(&self, init: MemberInit) -> Result<Arc<dyn LocalPerson>>;

    async fn leave(&self, member: &MemberId) -> Result<()>;

    async fn update_member_metadata(&self, member: &MemberId, metadata: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;

    /// Release this client's handle; no further events are delivered
    fn dispose(&self);

    fn is_disposed(&self) -> bool;

    async fn enable_publication(&self, id: &PublicationId) -> Result<()>;

    async fn disable_publication(&self, id: &PublicationId) -> Result<()>;

    async fn cancel_publication(&self, id: &PublicationId) -> Result<()>;

    async fn update_publication_metadata(&self, id: &PublicationId, metadata: &str) -> Result<()>;

    async fn update_publication_encodings(
        &self,
        id: &PublicationId,
        encodings: Vec<Encoding>,
    ) -> Result<()>;

    async fn change_preferred_encoding(&self, id: &SubscriptionId, encoding_id: &str)
        -> Result<()>;

    async fn cancel_subscription(&self, id: &SubscriptionId) -> Result<()>;

    /// Subscribe on behalf of a remote member
    async fn subscribe_as(
        &self,
        member: &MemberId,
        publication: &PublicationId,
    ) -> Result<SubscriptionInfo>;

    /// Unsubscribe on behalf of a remote member
    async fn unsubscribe_as(&self, member: &MemberId, subscription: &SubscriptionId) -> Result<()>;

    /// Ask the engine to add a relay bot of the given subtype
    async fn create_bot(&self, subtype: &str) -> Result<Arc<dyn RelayBot>>;

    /// Native handle of an existing bot member
    fn bot(&self, id: &MemberId) -> Option<Arc<dyn RelayBot>>;
}

/// The member this client acts as
#[async_trait]
pub trait LocalPerson: Send + Sync {
    fn id(&self) -> MemberId;

    async fn publish(
        &self,
        stream: LocalStream,
        options: PublicationOptions,
    ) -> Result<PublicationInfo>;

    async fn unpublish(&self, publication: &PublicationId) -> Result<()>;

    async fn subscribe(
        &self,
        publication: &PublicationId,
        options: SubscriptionOptions,
    ) -> Result<SubscriptionInfo>;

    async fn unsubscribe(&self, subscription: &SubscriptionId) -> Result<()>;

    async fn update_metadata(&self, metadata: &str) -> Result<()>;

    async fn leave(&self) -> Result<()>;
}

/// Native side of a relay bot
#[async_trait]
pub trait RelayBot: Send + Sync {
    fn id(&self) -> MemberId;

    fn subtype(&self) -> String;

    async fn start_forwarding(
        &self,
        publication: &PublicationId,
        max_subscribers: Option<u32>,
    ) -> Result<ForwardingDescriptor>;

    async fn stop_forwarding(&self, forwarding: &ForwardingId) -> Result<()>;
}
