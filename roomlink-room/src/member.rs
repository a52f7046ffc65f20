//! Room members
//!
//! A `RoomMember` is a view over a channel member plus a weak reference to
//! its room. Once the member leaves or the room is disposed, its operations
//! fail and its live attributes fall back to the last known values.

use crate::error::{absent_on_error, succeeded, Error, Result};
use crate::publication::{RoomPublication, RoomPublicationOptions};
use crate::room::RoomInner;
use crate::subscription::{RoomSubscription, RoomSubscriptionOptions};
use roomlink_channel::{
    LocalPerson, LocalStream, MemberId, MemberInfo, MemberInit, MemberKind, MemberSide,
    MemberState, PublicationId, SubscriptionId, DEFAULT_KEEP_ALIVE_INTERVAL_SEC,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::{Arc, Weak};

/// Settings for joining a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomMemberInit {
    pub name: Option<String>,
    pub metadata: Option<String>,
    pub keep_alive_interval_sec: u32,
    pub keep_alive_interval_gap_sec: u32,
}

impl Default for RoomMemberInit {
    fn default() -> Self {
        Self {
            name: None,
            metadata: None,
            keep_alive_interval_sec: DEFAULT_KEEP_ALIVE_INTERVAL_SEC,
            keep_alive_interval_gap_sec: DEFAULT_KEEP_ALIVE_INTERVAL_SEC,
        }
    }
}

impl RoomMemberInit {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub(crate) fn into_channel(self) -> MemberInit {
        MemberInit {
            name: self.name,
            metadata: self.metadata,
            keep_alive_interval_sec: self.keep_alive_interval_sec,
            keep_alive_interval_gap_sec: self.keep_alive_interval_gap_sec,
            kind: MemberKind::Person,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoomMember {
    room: Weak<RoomInner>,
    info: MemberInfo,
    side: MemberSide,
}

impl RoomMember {
    pub(crate) const fn new(room: Weak<RoomInner>, info: MemberInfo, side: MemberSide) -> Self {
        Self { room, info, side }
    }

    #[must_use]
    pub const fn id(&self) -> &MemberId {
        &self.info.id
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.info.name.as_deref()
    }

    #[must_use]
    pub const fn kind(&self) -> &MemberKind {
        &self.info.kind
    }

    #[must_use]
    pub const fn side(&self) -> MemberSide {
        self.side
    }

    #[must_use]
    pub fn metadata(&self) -> String {
        self.live()
            .map_or_else(|| self.info.metadata.clone(), |member| member.metadata)
    }

    #[must_use]
    pub fn state(&self) -> MemberState {
        if self.live().is_some() {
            MemberState::Joined
        } else {
            MemberState::Left
        }
    }

    /// Room publications published by this member
    #[must_use]
    pub fn publications(&self) -> Vec<RoomPublication> {
        let Some(room) = self.room() else {
            return Vec::new();
        };
        room.publications()
            .into_iter()
            .filter(|publication| publication.publisher_id().as_ref() == Some(self.id()))
            .collect()
    }

    /// Room subscriptions held by this member
    #[must_use]
    pub fn subscriptions(&self) -> Vec<RoomSubscription> {
        let Some(room) = self.room() else {
            return Vec::new();
        };
        room.subscriptions()
            .into_iter()
            .filter(|subscription| subscription.subscriber_id() == self.id())
            .collect()
    }

    pub async fn update_metadata(&self, metadata: &str) -> bool {
        let Some(room) = self.room() else {
            return false;
        };
        succeeded(
            room.channel
                .update_member_metadata(self.id(), metadata)
                .await,
            "update_member_metadata",
        )
    }

    pub async fn leave(&self) -> bool {
        let Some(room) = self.room() else {
            return false;
        };
        succeeded(room.channel.leave(self.id()).await, "leave")
    }

    pub(crate) fn room(&self) -> Option<Arc<RoomInner>> {
        RoomInner::active(&self.room)
    }

    fn live(&self) -> Option<MemberInfo> {
        self.room()?.channel.member(self.id())
    }
}

impl PartialEq for RoomMember {
    fn eq(&self, other: &Self) -> bool {
        self.info.id == other.info.id
    }
}

impl Eq for RoomMember {}

impl Hash for RoomMember {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.info.id.hash(state);
    }
}

/// The member this client joined a room with
#[derive(Clone)]
pub struct LocalRoomMember {
    member: RoomMember,
    person: Arc<dyn LocalPerson>,
}

impl fmt::Debug for LocalRoomMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRoomMember")
            .field("member", &self.member)
            .finish_non_exhaustive()
    }
}

impl Deref for LocalRoomMember {
    type Target = RoomMember;

    fn deref(&self) -> &Self::Target {
        &self.member
    }
}

impl LocalRoomMember {
    pub(crate) fn new(member: RoomMember, person: Arc<dyn LocalPerson>) -> Self {
        Self { member, person }
    }

    #[must_use]
    pub const fn as_member(&self) -> &RoomMember {
        &self.member
    }

    /// Publish a stream
    ///
    /// In a relayed room the returned publication is the relay, not the
    /// origin. `Ok(None)` covers every ordinary refusal. Errors are
    /// `Error::Disposed` once the room is gone and `Error::RelayProtocol`
    /// when the relay protocol itself broke.
    pub async fn publish(
        &self,
        stream: LocalStream,
        options: RoomPublicationOptions,
    ) -> Result<Option<RoomPublication>> {
        let Some(room) = self.room() else {
            return Err(Error::Disposed);
        };
        room.publish_as(self.person.as_ref(), stream, options).await
    }

    pub async fn unpublish(&self, publication: &RoomPublication) -> bool {
        let Some(room) = self.room() else {
            return false;
        };
        room.unpublish_as(self.person.as_ref(), publication).await
    }

    pub async fn subscribe(
        &self,
        publication: &PublicationId,
        options: RoomSubscriptionOptions,
    ) -> Option<RoomSubscription> {
        let room = self.room()?;
        let subscription = absent_on_error(
            self.person
                .subscribe(publication, options.to_channel())
                .await,
            "subscribe",
        )?;
        Some(room.subscription_view(subscription))
    }

    pub async fn unsubscribe(&self, subscription: &SubscriptionId) -> bool {
        if self.room().is_none() {
            return false;
        }
        succeeded(self.person.unsubscribe(subscription).await, "unsubscribe")
    }
}

/// Another member of the room
#[derive(Debug, Clone)]
pub struct RemoteRoomMember {
    member: RoomMember,
}

impl Deref for RemoteRoomMember {
    type Target = RoomMember;

    fn deref(&self) -> &Self::Target {
        &self.member
    }
}

impl RemoteRoomMember {
    pub(crate) const fn new(member: RoomMember) -> Self {
        Self { member }
    }

    #[must_use]
    pub const fn as_member(&self) -> &RoomMember {
        &self.member
    }

    /// Subscribe on behalf of this member
    pub async fn subscribe(&self, publication: &PublicationId) -> Option<RoomSubscription> {
        let room = self.room()?;
        let subscription = absent_on_error(
            room.channel.subscribe_as(self.id(), publication).await,
            "subscribe_as",
        )?;
        Some(room.subscription_view(subscription))
    }

    pub async fn unsubscribe(&self, subscription: &SubscriptionId) -> bool {
        let Some(room) = self.room() else {
            return false;
        };
        succeeded(
            room.channel.unsubscribe_as(self.id(), subscription).await,
            "unsubscribe_as",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoomConfig;
    use crate::context::RoomContext;
    use crate::room::{Room, RoomType};
    use async_trait::async_trait;
    use mockall::mock;
    use roomlink_channel::memory::MemoryEngine;
    use roomlink_channel::{
        ChannelError, ContentType, PublicationInfo, PublicationOptions, PublicationState,
        SubscriptionInfo, SubscriptionOptions,
    };

    mock! {
        pub Person {}

        #[async_trait]
        impl LocalPerson for Person {
            fn id(&self) -> MemberId;
            async fn publish(
                &self,
                stream: LocalStream,
                options: PublicationOptions,
            ) -> roomlink_channel::Result<PublicationInfo>;
            async fn unpublish(&self, publication: &PublicationId) -> roomlink_channel::Result<()>;
            async fn subscribe(
                &self,
                publication: &PublicationId,
                options: SubscriptionOptions,
            ) -> roomlink_channel::Result<SubscriptionInfo>;
            async fn unsubscribe(&self, subscription: &SubscriptionId) -> roomlink_channel::Result<()>;
            async fn update_metadata(&self, metadata: &str) -> roomlink_channel::Result<()>;
            async fn leave(&self) -> roomlink_channel::Result<()>;
        }
    }

    async fn direct_room() -> (Arc<RoomContext>, Room) {
        let provider = Arc::new(MemoryEngine::new().provider());
        let context = RoomContext::setup(provider, RoomConfig::default()).unwrap();
        let room = Room::create(&context, RoomType::Direct, Some("mock"), None)
            .await
            .unwrap()
            .unwrap();
        (context, room)
    }

    fn mocked_member(room: &Room, person: MockPerson) -> LocalRoomMember {
        let info = MemberInfo {
            id: MemberId::new("mock-member"),
            name: Some("mock".to_string()),
            metadata: String::new(),
            kind: MemberKind::Person,
            state: MemberState::Joined,
        };
        let member = room.inner().member_view(info);
        LocalRoomMember::new(member, Arc::new(person))
    }

    #[tokio::test]
    async fn test_direct_publish_delegates_to_person() {
        let (_context, room) = direct_room().await;
        let mut person = MockPerson::new();
        person
            .expect_publish()
            .withf(|_, options| options.is_enabled == Some(false))
            .times(1)
            .returning(|stream, options| {
                Ok(PublicationInfo {
                    id: PublicationId::new("pub-1"),
                    publisher: MemberId::new("mock-member"),
                    content_type: stream.content_type,
                    metadata: options.metadata.unwrap_or_default(),
                    state: PublicationState::Disabled,
                    origin: None,
                    stream: Some(stream.id),
                    codec_capabilities: Vec::new(),
                    encodings: Vec::new(),
                })
            });
        person
            .expect_unpublish()
            .withf(|id| id.as_str() == "pub-1")
            .times(1)
            .returning(|_| Ok(()));

        let member = mocked_member(&room, person);
        let publication = member
            .publish(
                LocalStream::video(),
                RoomPublicationOptions {
                    metadata: Some("camera".to_string()),
                    is_enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(publication.id().as_str(), "pub-1");
        assert_eq!(publication.content_type(), ContentType::Video);
        assert!(member.unpublish(&publication).await);
    }

    #[tokio::test]
    async fn test_direct_publish_failure_is_absent() {
        let (_context, room) = direct_room().await;
        let mut person = MockPerson::new();
        person
            .expect_publish()
            .returning(|_, _| Err(ChannelError::AlreadyExists("stream".to_string())));

        let member = mocked_member(&room, person);
        let publication = member
            .publish(LocalStream::audio(), RoomPublicationOptions::default())
            .await
            .unwrap();
        assert!(publication.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_failures_are_absent() {
        let (_context, room) = direct_room().await;
        let mut person = MockPerson::new();
        person
            .expect_subscribe()
            .returning(|id, _| Err(ChannelError::NotFound(format!("publication {id}"))));
        person
            .expect_unsubscribe()
            .returning(|id| Err(ChannelError::NotFound(format!("subscription {id}"))));

        let member = mocked_member(&room, person);
        assert!(member
            .subscribe(&PublicationId::new("missing"), RoomSubscriptionOptions::default())
            .await
            .is_none());
        assert!(!member.unsubscribe(&SubscriptionId::new("missing")).await);
    }

    #[tokio::test]
    async fn test_disposed_room_skips_person() {
        let (_context, room) = direct_room().await;
        let person = MockPerson::new();
        let member = mocked_member(&room, person);
        room.dispose();

        // no expectations set: any call on the mock would panic
        let result = member
            .publish(LocalStream::audio(), RoomPublicationOptions::default())
            .await;
        assert!(matches!(result, Err(Error::Disposed)));
        assert!(!member.unsubscribe(&SubscriptionId::new("s")).await);
        assert_eq!(member.state(), MemberState::Left);
    }

    #[test]
    fn test_member_init_is_person() {
        let init = RoomMemberInit::named("alice").into_channel();
        assert_eq!(init.name.as_deref(), Some("alice"));
        assert_eq!(init.kind, MemberKind::Person);
        assert_eq!(init.keep_alive_interval_sec, DEFAULT_KEEP_ALIVE_INTERVAL_SEC);
    }

    #[test]
    fn test_member_init_from_partial_json() {
        let init: RoomMemberInit =
            serde_json::from_str(r#"{"name":"bob","keep_alive_interval_sec":10}"#).unwrap();
        assert_eq!(init.name.as_deref(), Some("bob"));
        assert_eq!(init.metadata, None);
        assert_eq!(init.keep_alive_interval_sec, 10);
        assert_eq!(init.keep_alive_interval_gap_sec, DEFAULT_KEEP_ALIVE_INTERVAL_SEC);
    }
}
