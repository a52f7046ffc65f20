//! Room-level publications
//!
//! In a relayed room the surfaced publication is a relay; its metadata,
//! state, stream and publisher are read from the origin, and mutating
//! operations are applied to the origin (the engine propagates them).

use crate::error::succeeded;
use crate::member::RoomMember;
use crate::room::RoomInner;
use crate::subscription::RoomSubscription;
use roomlink_channel::{
    Codec, ContentType, Encoding, MemberId, PublicationId, PublicationInfo, PublicationOptions,
    PublicationState, StreamId,
};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// Options for publishing into a room
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomPublicationOptions {
    pub metadata: Option<String>,
    pub codec_capabilities: Vec<Codec>,
    pub encodings: Vec<Encoding>,
    pub is_enabled: Option<bool>,
    /// Subscriber limit of the relay; relayed rooms only
    pub max_subscribers: Option<u32>,
}

impl RoomPublicationOptions {
    pub(crate) fn to_channel(&self) -> PublicationOptions {
        PublicationOptions {
            metadata: self.metadata.clone(),
            codec_capabilities: self.codec_capabilities.clone(),
            encodings: self.encodings.clone(),
            is_enabled: self.is_enabled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoomPublication {
    room: Weak<RoomInner>,
    info: PublicationInfo,
}

impl RoomPublication {
    pub(crate) const fn new(room: Weak<RoomInner>, info: PublicationInfo) -> Self {
        Self { room, info }
    }

    #[must_use]
    pub const fn id(&self) -> &PublicationId {
        &self.info.id
    }

    #[must_use]
    pub const fn content_type(&self) -> ContentType {
        self.info.content_type
    }

    /// True when this publication relays another one
    #[must_use]
    pub const fn is_relay(&self) -> bool {
        self.info.is_relay()
    }

    #[must_use]
    pub const fn origin_id(&self) -> Option<&PublicationId> {
        self.info.origin.as_ref()
    }

    /// Current channel view of the origin publication
    #[must_use]
    pub fn origin(&self) -> Option<PublicationInfo> {
        let origin_id = self.origin_id()?;
        self.room()?.channel.publication(origin_id)
    }

    #[must_use]
    pub fn metadata(&self) -> String {
        self.source()
            .map_or_else(|| self.info.metadata.clone(), |source| source.metadata)
    }

    /// `Canceled` once the publication (or its origin) is gone
    #[must_use]
    pub fn state(&self) -> PublicationState {
        self.source()
            .map_or(PublicationState::Canceled, |source| source.state)
    }

    #[must_use]
    pub fn stream(&self) -> Option<StreamId> {
        self.source().and_then(|source| source.stream)
    }

    #[must_use]
    pub fn codec_capabilities(&self) -> Vec<Codec> {
        self.source().map_or_else(
            || self.info.codec_capabilities.clone(),
            |source| source.codec_capabilities,
        )
    }

    #[must_use]
    pub fn encodings(&self) -> Vec<Encoding> {
        self.source()
            .map_or_else(|| self.info.encodings.clone(), |source| source.encodings)
    }

    /// The member that published the stream; the origin's publisher for a
    /// relay
    #[must_use]
    pub fn publisher_id(&self) -> Option<MemberId> {
        if self.is_relay() {
            return self.origin().map(|origin| origin.publisher);
        }
        Some(self.info.publisher.clone())
    }

    #[must_use]
    pub fn publisher(&self) -> Option<RoomMember> {
        let publisher = self.publisher_id()?;
        self.room()?.member(&publisher)
    }

    #[must_use]
    pub fn subscriptions(&self) -> Vec<RoomSubscription> {
        let Some(room) = self.room() else {
            return Vec::new();
        };
        room.subscriptions()
            .into_iter()
            .filter(|subscription| subscription.publication_id() == self.id())
            .collect()
    }

    pub async fn enable(&self) -> bool {
        let Some(room) = self.room() else {
            return false;
        };
        succeeded(
            room.channel.enable_publication(self.target()).await,
            "enable_publication",
        )
    }

    pub async fn disable(&self) -> bool {
        let Some(room) = self.room() else {
            return false;
        };
        succeeded(
            room.channel.disable_publication(self.target()).await,
            "disable_publication",
        )
    }

    pub async fn cancel(&self) -> bool {
        let Some(room) = self.room() else {
            return false;
        };
        succeeded(
            room.channel.cancel_publication(self.target()).await,
            "cancel_publication",
        )
    }

    pub async fn update_metadata(&self, metadata: &str) -> bool {
        let Some(room) = self.room() else {
            return false;
        };
        succeeded(
            room.channel
                .update_publication_metadata(self.target(), metadata)
                .await,
            "update_publication_metadata",
        )
    }

    pub async fn update_encodings(&self, encodings: Vec<Encoding>) -> bool {
        let Some(room) = self.room() else {
            return false;
        };
        succeeded(
            room.channel
                .update_publication_encodings(self.target(), encodings)
                .await,
            "update_publication_encodings",
        )
    }

    fn room(&self) -> Option<Arc<RoomInner>> {
        RoomInner::active(&self.room)
    }

    /// Publication that mutations apply to
    fn target(&self) -> &PublicationId {
        self.origin_id().unwrap_or(&self.info.id)
    }

    fn source(&self) -> Option<PublicationInfo> {
        self.room()?.channel.publication(self.target())
    }
}

impl PartialEq for RoomPublication {
    fn eq(&self, other: &Self) -> bool {
        self.info.id == other.info.id
    }
}

impl Eq for RoomPublication {}

impl Hash for RoomPublication {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.info.id.hash(state);
    }
}
