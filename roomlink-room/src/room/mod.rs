//! Rooms
//!
//! A room wraps one channel and re-exposes it with room semantics. Its
//! member, publication and subscription views are recomputed from the
//! channel on every read; the room keeps no copy of channel state.
//!
//! Two topologies exist:
//!
//! - **Direct**: channel events and lists pass through unchanged.
//! - **Relayed**: a relay agent re-publishes every stream. Only relay
//!   publications are surfaced, and bots are hidden from members and
//!   subscriptions.
//!
//! Each room runs one event pump on the context's task tracker, which
//! translates channel events into `RoomEvent`s.

mod direct;
mod event;
mod relayed;

pub use event::RoomEvent;

use crate::config::RelayConfig;
use crate::context::RoomContext;
use crate::error::{absent_on_error, succeeded, Result};
use crate::member::{LocalRoomMember, RemoteRoomMember, RoomMember, RoomMemberInit};
use crate::publication::{RoomPublication, RoomPublicationOptions};
use crate::relay::RelayAgent;
use crate::subscription::RoomSubscription;
use crate::task_tracker::TaskHandle;
use dashmap::DashSet;
use parking_lot::Mutex;
use roomlink_channel::{
    Channel, ChannelEvent, ChannelId, ChannelState, LocalPerson, LocalStream,
    MemberId, MemberInfo, MemberSide, PublicationInfo, SubscriptionInfo,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// Room topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    /// Peer-to-peer mesh
    Direct,
    /// Streams are relayed by a server-side agent
    Relayed,
}

impl std::fmt::Display for RoomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Relayed => write!(f, "relayed"),
        }
    }
}

pub(crate) struct RoomInner {
    pub(crate) channel: Arc<dyn Channel>,
    pub(crate) room_type: RoomType,
    pub(crate) relay: RelayConfig,
    events: broadcast::Sender<RoomEvent>,
    /// Serializes relayed publish against stream-published handling
    publish_lock: tokio::sync::Mutex<()>,
    agent: Mutex<Option<Arc<RelayAgent>>>,
    known_bots: DashSet<MemberId>,
    pump: Mutex<Option<TaskHandle<()>>>,
    disposed: AtomicBool,
}

impl RoomInner {
    /// The room behind a view, unless it is gone or disposed
    pub(crate) fn active(room: &Weak<Self>) -> Option<Arc<Self>> {
        room.upgrade().filter(|room| !room.is_disposed())
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn member_view(self: &Arc<Self>, info: MemberInfo) -> RoomMember {
        let side = self.channel.side_of(&info.id);
        RoomMember::new(Arc::downgrade(self), info, side)
    }

    pub(crate) fn publication_view(self: &Arc<Self>, info: PublicationInfo) -> RoomPublication {
        RoomPublication::new(Arc::downgrade(self), info)
    }

    pub(crate) fn subscription_view(self: &Arc<Self>, info: SubscriptionInfo) -> RoomSubscription {
        RoomSubscription::new(Arc::downgrade(self), info)
    }

    /// True for any bot member, including bots that already left
    pub(crate) fn is_bot_member(&self, id: &MemberId) -> bool {
        if self.known_bots.contains(id) {
            return true;
        }
        match self.channel.member(id) {
            Some(member) if member.kind.is_bot() => {
                self.known_bots.insert(member.id);
                true
            }
            _ => false,
        }
    }

    fn remember_bot(&self, member: &MemberInfo) {
        if member.kind.is_bot() {
            self.known_bots.insert(member.id.clone());
        }
    }

    pub(crate) fn members(self: &Arc<Self>) -> Vec<RoomMember> {
        if self.is_disposed() {
            return Vec::new();
        }
        self.channel
            .members()
            .into_iter()
            .filter(|member| self.room_type == RoomType::Direct || !member.kind.is_bot())
            .map(|member| self.member_view(member))
            .collect()
    }

    pub(crate) fn publications(self: &Arc<Self>) -> Vec<RoomPublication> {
        if self.is_disposed() {
            return Vec::new();
        }
        self.channel
            .publications()
            .into_iter()
            .filter(|publication| self.room_type == RoomType::Direct || publication.is_relay())
            .map(|publication| self.publication_view(publication))
            .collect()
    }

    pub(crate) fn subscriptions(self: &Arc<Self>) -> Vec<RoomSubscription> {
        if self.is_disposed() {
            return Vec::new();
        }
        self.channel
            .subscriptions()
            .into_iter()
            .filter(|subscription| {
                self.room_type == RoomType::Direct || !self.is_bot_member(&subscription.subscriber)
            })
            .map(|subscription| self.subscription_view(subscription))
            .collect()
    }

    pub(crate) fn member(self: &Arc<Self>, id: &MemberId) -> Option<RoomMember> {
        self.members().into_iter().find(|member| member.id() == id)
    }

    /// The relay agent of a relayed room
    ///
    /// The agent object is cached so its forwarding set survives between
    /// calls; it is rebuilt only if the bot behind it is gone.
    pub(crate) fn relay_agent(&self) -> Option<Arc<RelayAgent>> {
        if self.room_type != RoomType::Relayed || self.is_disposed() {
            return None;
        }
        let bots: Vec<MemberInfo> = self
            .channel
            .bots()
            .into_iter()
            .filter(|bot| bot.kind.is_bot_of(&self.relay.bot_subtype))
            .collect();

        let mut cached = self.agent.lock();
        if let Some(agent) = cached.as_ref() {
            let id = agent.id();
            if bots.iter().any(|bot| bot.id == id) {
                return Some(Arc::clone(agent));
            }
        }

        let bot = bots.first().and_then(|bot| self.channel.bot(&bot.id))?;
        let agent = Arc::new(RelayAgent::new(
            bot,
            Arc::clone(&self.channel),
            self.relay.clone(),
        ));
        debug!(room_id = %self.channel.id(), bot_id = %agent.id(), "Relay agent attached");
        *cached = Some(Arc::clone(&agent));
        Some(agent)
    }

    pub(crate) async fn publish_as(
        self: &Arc<Self>,
        person: &dyn LocalPerson,
        stream: LocalStream,
        options: RoomPublicationOptions,
    ) -> Result<Option<RoomPublication>> {
        match self.room_type {
            RoomType::Direct => Ok(direct::publish(self, person, stream, options).await),
            RoomType::Relayed => relayed::publish(self, person, stream, options).await,
        }
    }

    pub(crate) async fn unpublish_as(
        self: &Arc<Self>,
        person: &dyn LocalPerson,
        publication: &RoomPublication,
    ) -> bool {
        match self.room_type {
            RoomType::Direct => direct::unpublish(person, publication).await,
            RoomType::Relayed => relayed::unpublish(self, person, publication).await,
        }
    }

    fn start_event_pump(self: &Arc<Self>, context: &RoomContext) {
        let mut events = self.channel.events();
        let room = Arc::downgrade(self);
        let room_id = self.channel.id();

        let handle = context.tasks().launch("room-event-pump", async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            room_id = %room_id,
                            skipped,
                            "Room event pump lagged behind channel, resyncing lists"
                        );
                        let Some(room) = RoomInner::active(&room) else {
                            break;
                        };
                        room.resync();
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(room) = RoomInner::active(&room) else {
                    break;
                };
                room.dispatch(event).await;
            }
            debug!(room_id = %room_id, "Room event pump stopped");
        });
        *self.pump.lock() = Some(handle);
    }

    async fn dispatch(self: &Arc<Self>, event: ChannelEvent) {
        if let ChannelEvent::MemberJoined(member) = &event {
            self.remember_bot(member);
        }
        let event_type = event.event_type();
        let translated = match self.room_type {
            RoomType::Direct => direct::translate(self, event),
            RoomType::Relayed => relayed::translate(self, event).await,
        };
        if translated.is_empty() {
            debug!(room_id = %self.channel.id(), event_type, "Channel event not surfaced");
        }
        for event in translated {
            // no listeners is fine
            let _ = self.events.send(event);
        }
    }

    /// Announce every list as changed after channel events were skipped
    fn resync(&self) {
        for event in [
            RoomEvent::MemberListChanged,
            RoomEvent::PublicationListChanged,
            RoomEvent::SubscriptionListChanged,
        ] {
            let _ = self.events.send(event);
        }
    }

    fn stop_event_pump(&self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.cancel();
        }
    }
}

impl Drop for RoomInner {
    fn drop(&mut self) {
        self.stop_event_pump();
    }
}

/// Application-facing handle of a room
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Room {
    inner: Arc<RoomInner>,
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.inner.channel.id())
            .field("room_type", &self.inner.room_type)
            .field("disposed", &self.inner.is_disposed())
            .finish()
    }
}

impl Room {
    /// Create a new room
    ///
    /// Returns `Ok(None)` when the channel cannot be created (for example,
    /// the name is taken).
    pub async fn create(
        context: &RoomContext,
        room_type: RoomType,
        name: Option<&str>,
        metadata: Option<&str>,
    ) -> Result<Option<Self>> {
        let result = context.provider()?.create(name, metadata).await;
        Self::open(context, room_type, result, "create").await
    }

    pub async fn find(
        context: &RoomContext,
        room_type: RoomType,
        name: Option<&str>,
        id: Option<&ChannelId>,
    ) -> Result<Option<Self>> {
        let result = context.provider()?.find(name, id).await;
        Self::open(context, room_type, result, "find").await
    }

    pub async fn find_or_create(
        context: &RoomContext,
        room_type: RoomType,
        name: Option<&str>,
        metadata: Option<&str>,
    ) -> Result<Option<Self>> {
        let result = context.provider()?.find_or_create(name, metadata).await;
        Self::open(context, room_type, result, "find_or_create").await
    }

    async fn open(
        context: &RoomContext,
        room_type: RoomType,
        channel: roomlink_channel::Result<Arc<dyn Channel>>,
        operation: &'static str,
    ) -> Result<Option<Self>> {
        let channel = match channel {
            Ok(channel) => channel,
            Err(err) if err.is_expected() => {
                debug!(operation, error = %err, "Room not available");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let relay = context.config().relay.clone();
        if room_type == RoomType::Relayed {
            relayed::ensure_agent(channel.as_ref(), &relay).await?;
        }

        let (events, _) = broadcast::channel(context.config().events.capacity);
        let inner = Arc::new(RoomInner {
            channel,
            room_type,
            relay,
            events,
            publish_lock: tokio::sync::Mutex::new(()),
            agent: Mutex::new(None),
            known_bots: DashSet::new(),
            pump: Mutex::new(None),
            disposed: AtomicBool::new(false),
        });
        for bot in inner.channel.bots() {
            inner.remember_bot(&bot);
        }
        inner.start_event_pump(context);

        info!(
            room_id = %inner.channel.id(),
            room_type = %room_type,
            operation,
            "Room opened"
        );
        Ok(Some(Self { inner }))
    }

    pub(crate) const fn inner(&self) -> &Arc<RoomInner> {
        &self.inner
    }

    #[must_use]
    pub fn id(&self) -> ChannelId {
        self.inner.channel.id()
    }

    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.inner.channel.name()
    }

    #[must_use]
    pub fn metadata(&self) -> String {
        self.inner.channel.metadata()
    }

    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.inner.channel.state()
    }

    #[must_use]
    pub fn room_type(&self) -> RoomType {
        self.inner.room_type
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Subscribe to room notifications
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<RoomEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn members(&self) -> Vec<RoomMember> {
        self.inner.members()
    }

    #[must_use]
    pub fn publications(&self) -> Vec<RoomPublication> {
        self.inner.publications()
    }

    #[must_use]
    pub fn subscriptions(&self) -> Vec<RoomSubscription> {
        self.inner.subscriptions()
    }

    #[must_use]
    pub fn member(&self, id: &MemberId) -> Option<RoomMember> {
        self.inner.member(id)
    }

    /// The member this client joined with
    #[must_use]
    pub fn local_member(&self) -> Option<LocalRoomMember> {
        if self.inner.is_disposed() {
            return None;
        }
        let person = self.inner.channel.local_person()?;
        let info = self.inner.channel.member(&person.id())?;
        Some(LocalRoomMember::new(self.inner.member_view(info), person))
    }

    #[must_use]
    pub fn remote_member(&self, id: &MemberId) -> Option<RemoteRoomMember> {
        let member = self.member(id)?;
        (member.side() == MemberSide::Remote).then(|| RemoteRoomMember::new(member))
    }

    /// The relay agent; always `None` for direct rooms
    #[must_use]
    pub fn relay_agent(&self) -> Option<Arc<RelayAgent>> {
        self.inner.relay_agent()
    }

    /// Join as a person
    pub async fn join(&self, init: RoomMemberInit) -> Option<LocalRoomMember> {
        if self.inner.is_disposed() {
            return None;
        }
        let result = self.inner.channel.join(init.into_channel()).await;
        let person = absent_on_error(result, "join")?;
        let info = self.inner.channel.member(&person.id())?;
        info!(room_id = %self.id(), member_id = %info.id, "Joined room");
        Some(LocalRoomMember::new(self.inner.member_view(info), person))
    }

    pub async fn leave(&self, member: &RoomMember) -> bool {
        if self.inner.is_disposed() {
            return false;
        }
        succeeded(self.inner.channel.leave(member.id()).await, "leave")
    }

    pub async fn update_metadata(&self, metadata: &str) -> bool {
        if self.inner.is_disposed() {
            return false;
        }
        succeeded(
            self.inner.channel.update_metadata(metadata).await,
            "update_metadata",
        )
    }

    pub async fn close(&self) -> bool {
        if self.inner.is_disposed() {
            return false;
        }
        succeeded(self.inner.channel.close().await, "close")
    }

    /// Release this room handle
    ///
    /// Stops the event pump and disposes the channel handle. Irreversible;
    /// afterwards lists are empty and operations fail.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.stop_event_pump();
        self.inner.channel.dispose();
        info!(room_id = %self.id(), "Room disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_type_serde() {
        assert_eq!(serde_json::to_string(&RoomType::Relayed).unwrap(), r#""relayed""#);
        let parsed: RoomType = serde_json::from_str(r#""direct""#).unwrap();
        assert_eq!(parsed, RoomType::Direct);
        assert_eq!(RoomType::Relayed.to_string(), "relayed");
    }
}
