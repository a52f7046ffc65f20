use crate::error::succeeded;
use crate::member::RoomMember;
use crate::publication::RoomPublication;
use crate::room::RoomInner;
use roomlink_channel::{
    ContentType, MemberId, PublicationId, SubscriptionId, SubscriptionInfo, SubscriptionOptions,
    SubscriptionState,
};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSubscriptionOptions {
    pub preferred_encoding_id: Option<String>,
}

impl RoomSubscriptionOptions {
    pub(crate) fn to_channel(&self) -> SubscriptionOptions {
        SubscriptionOptions {
            preferred_encoding_id: self.preferred_encoding_id.clone(),
        }
    }
}

/// Room-level view of a subscription
#[derive(Debug, Clone)]
pub struct RoomSubscription {
    room: Weak<RoomInner>,
    info: SubscriptionInfo,
}

impl RoomSubscription {
    pub(crate) const fn new(room: Weak<RoomInner>, info: SubscriptionInfo) -> Self {
        Self { room, info }
    }

    #[must_use]
    pub const fn id(&self) -> &SubscriptionId {
        &self.info.id
    }

    #[must_use]
    pub const fn content_type(&self) -> ContentType {
        self.info.content_type
    }

    #[must_use]
    pub const fn publication_id(&self) -> &PublicationId {
        &self.info.publication
    }

    #[must_use]
    pub fn publication(&self) -> Option<RoomPublication> {
        let room = self.room()?;
        let publication = room.channel.publication(&self.info.publication)?;
        Some(room.publication_view(publication))
    }

    #[must_use]
    pub const fn subscriber_id(&self) -> &MemberId {
        &self.info.subscriber
    }

    #[must_use]
    pub fn subscriber(&self) -> Option<RoomMember> {
        self.room()?.member(&self.info.subscriber)
    }

    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.live()
            .map_or(SubscriptionState::Canceled, |subscription| subscription.state)
    }

    #[must_use]
    pub fn preferred_encoding_id(&self) -> Option<String> {
        self.live().map_or_else(
            || self.info.preferred_encoding_id.clone(),
            |subscription| subscription.preferred_encoding_id,
        )
    }

    pub async fn change_preferred_encoding(&self, encoding_id: &str) -> bool {
        let Some(room) = self.room() else {
            return false;
        };
        succeeded(
            room.channel
                .change_preferred_encoding(self.id(), encoding_id)
                .await,
            "change_preferred_encoding",
        )
    }

    pub async fn cancel(&self) -> bool {
        let Some(room) = self.room() else {
            return false;
        };
        succeeded(
            room.channel.cancel_subscription(self.id()).await,
            "cancel_subscription",
        )
    }

    fn room(&self) -> Option<Arc<RoomInner>> {
        RoomInner::active(&self.room)
    }

    fn live(&self) -> Option<SubscriptionInfo> {
        self.room()?.channel.subscription(self.id())
    }
}

impl PartialEq for RoomSubscription {
    fn eq(&self, other: &Self) -> bool {
        self.info.id == other.info.id
    }
}

impl Eq for RoomSubscription {}

impl Hash for RoomSubscription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.info.id.hash(state);
    }
}
