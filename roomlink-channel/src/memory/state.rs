//! Shared state of one in-memory channel
//!
//! All clients that locate the same channel share one `SharedChannel`.
//! Mutations happen under a single write lock; the resulting events are
//! collected and sent only after the lock is released.

use super::EngineBehavior;
use super::RelayVisibility;
use crate::error::{ChannelError, Result};
use crate::event::ChannelEvent;
use crate::model::{
    ChannelState, Encoding, ForwardingConfigure, ForwardingDescriptor, LocalStream, MemberInfo,
    MemberInit, MemberKind, MemberState, PublicationInfo, PublicationOptions, PublicationState,
    SubscriptionInfo, SubscriptionOptions, SubscriptionState,
};
use crate::types::{ChannelId, ForwardingId, MemberId, PublicationId, SubscriptionId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Default subscriber limit of a forwarding when the caller sets none
pub const DEFAULT_MAX_SUBSCRIBERS: u32 = 10;

#[derive(Debug, Clone)]
struct ForwardingRecord {
    bot: MemberId,
    origin: PublicationId,
    relay: PublicationId,
    bot_subscription: SubscriptionId,
    max_subscribers: u32,
}

#[derive(Debug, Default)]
struct ChannelData {
    metadata: String,
    closed: bool,
    members: HashMap<MemberId, MemberInfo>,
    publications: HashMap<PublicationId, PublicationInfo>,
    subscriptions: HashMap<SubscriptionId, SubscriptionInfo>,
    forwardings: HashMap<ForwardingId, ForwardingRecord>,
}

impl ChannelData {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ChannelError::InvalidInput("channel is closed".to_string()));
        }
        Ok(())
    }

    fn joined_member(&self, id: &MemberId) -> Result<&MemberInfo> {
        self.members
            .get(id)
            .filter(|member| member.state == MemberState::Joined)
            .ok_or_else(|| ChannelError::NotFound(format!("member {id}")))
    }

    fn live_publication(&self, id: &PublicationId) -> Result<&PublicationInfo> {
        self.publications
            .get(id)
            .filter(|publication| publication.state != PublicationState::Canceled)
            .ok_or_else(|| ChannelError::NotFound(format!("publication {id}")))
    }

    fn live_subscription(&self, id: &SubscriptionId) -> Result<&SubscriptionInfo> {
        self.subscriptions
            .get(id)
            .filter(|subscription| subscription.state != SubscriptionState::Canceled)
            .ok_or_else(|| ChannelError::NotFound(format!("subscription {id}")))
    }

    fn cancel_subscription(&mut self, id: &SubscriptionId, events: &mut Vec<ChannelEvent>) {
        if let Some(subscription) = self.subscriptions.get_mut(id) {
            if subscription.state != SubscriptionState::Canceled {
                subscription.state = SubscriptionState::Canceled;
                events.push(ChannelEvent::PublicationUnsubscribed(subscription.clone()));
            }
        }
    }

    /// Cancel a publication together with its subscriptions and any relay
    /// publications forwarded from it.
    fn cancel_publication(&mut self, id: &PublicationId, events: &mut Vec<ChannelEvent>) {
        let subscription_ids: Vec<SubscriptionId> = self
            .subscriptions
            .values()
            .filter(|s| &s.publication == id && s.state != SubscriptionState::Canceled)
            .map(|s| s.id.clone())
            .collect();
        for subscription_id in &subscription_ids {
            self.cancel_subscription(subscription_id, events);
        }

        let forwarding_ids: Vec<ForwardingId> = self
            .forwardings
            .iter()
            .filter(|(_, record)| &record.origin == id)
            .map(|(forwarding_id, _)| forwarding_id.clone())
            .collect();
        for forwarding_id in &forwarding_ids {
            self.remove_forwarding(forwarding_id, events);
        }

        if let Some(publication) = self.publications.get_mut(id) {
            if publication.state != PublicationState::Canceled {
                publication.state = PublicationState::Canceled;
                events.push(ChannelEvent::StreamUnpublished(publication.clone()));
            }
        }
    }

    fn remove_forwarding(&mut self, id: &ForwardingId, events: &mut Vec<ChannelEvent>) -> bool {
        let Some(record) = self.forwardings.remove(id) else {
            return false;
        };
        self.cancel_subscription(&record.bot_subscription, events);
        self.cancel_publication(&record.relay, events);
        true
    }

    fn relays_of(&self, origin: &PublicationId) -> Vec<PublicationId> {
        self.publications
            .values()
            .filter(|p| p.origin.as_ref() == Some(origin) && p.state != PublicationState::Canceled)
            .map(|p| p.id.clone())
            .collect()
    }
}

/// State shared by every client view of one channel
pub(crate) struct SharedChannel {
    pub(crate) id: ChannelId,
    pub(crate) name: Option<String>,
    data: RwLock<ChannelData>,
    events: broadcast::Sender<ChannelEvent>,
    behavior: Arc<RwLock<EngineBehavior>>,
}

impl SharedChannel {
    pub(crate) fn new(
        name: Option<&str>,
        metadata: Option<&str>,
        behavior: Arc<RwLock<EngineBehavior>>,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            id: ChannelId::generate(),
            name: name.map(ToString::to_string),
            data: RwLock::new(ChannelData {
                metadata: metadata.unwrap_or_default().to_string(),
                ..Default::default()
            }),
            events,
            behavior,
        }
    }

    fn emit(&self, events: Vec<ChannelEvent>) {
        for event in events {
            debug!(channel_id = %self.id, event_type = event.event_type(), "Channel event");
            // No receivers is not an error for the engine
            let _ = self.events.send(event);
        }
    }

    pub(crate) fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    pub(crate) fn metadata(&self) -> String {
        self.data.read().metadata.clone()
    }

    pub(crate) fn state(&self) -> ChannelState {
        if self.data.read().closed {
            ChannelState::Closed
        } else {
            ChannelState::Opened
        }
    }

    pub(crate) fn members(&self) -> Vec<MemberInfo> {
        self.data
            .read()
            .members
            .values()
            .filter(|m| m.state == MemberState::Joined)
            .cloned()
            .collect()
    }

    pub(crate) fn member(&self, id: &MemberId) -> Option<MemberInfo> {
        self.data.read().joined_member(id).ok().cloned()
    }

    pub(crate) fn publications(&self) -> Vec<PublicationInfo> {
        self.data
            .read()
            .publications
            .values()
            .filter(|p| p.state != PublicationState::Canceled)
            .cloned()
            .collect()
    }

    pub(crate) fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.data
            .read()
            .subscriptions
            .values()
            .filter(|s| s.state != SubscriptionState::Canceled)
            .cloned()
            .collect()
    }

    pub(crate) fn update_metadata(&self, metadata: &str) -> Result<()> {
        {
            let mut data = self.data.write();
            data.ensure_open()?;
            data.metadata = metadata.to_string();
        }
        self.emit(vec![ChannelEvent::MetadataUpdated {
            metadata: metadata.to_string(),
        }]);
        Ok(())
    }

    pub(crate) fn close(&self) -> Result<()> {
        {
            let mut data = self.data.write();
            data.ensure_open()?;
            data.closed = true;
        }
        info!(channel_id = %self.id, "Channel closed");
        self.emit(vec![ChannelEvent::Closed]);
        Ok(())
    }

    pub(crate) fn join(&self, init: MemberInit) -> Result<MemberInfo> {
        let member = {
            let mut data = self.data.write();
            data.ensure_open()?;
            if let Some(name) = &init.name {
                let taken = data.members.values().any(|m| {
                    m.state == MemberState::Joined && m.name.as_deref() == Some(name.as_str())
                });
                if taken {
                    return Err(ChannelError::AlreadyExists(format!("member name {name}")));
                }
            }
            let member = MemberInfo {
                id: MemberId::generate(),
                name: init.name,
                metadata: init.metadata.unwrap_or_default(),
                kind: init.kind,
                state: MemberState::Joined,
            };
            data.members.insert(member.id.clone(), member.clone());
            member
        };
        info!(channel_id = %self.id, member_id = %member.id, kind = ?member.kind, "Member joined");
        self.emit(vec![
            ChannelEvent::MemberJoined(member.clone()),
            ChannelEvent::MemberListChanged,
        ]);
        Ok(member)
    }

    pub(crate) fn leave(&self, id: &MemberId) -> Result<()> {
        let mut events = Vec::new();
        {
            let mut data = self.data.write();
            data.joined_member(id)?;

            let forwarding_ids: Vec<ForwardingId> = data
                .forwardings
                .iter()
                .filter(|(_, record)| &record.bot == id)
                .map(|(forwarding_id, _)| forwarding_id.clone())
                .collect();
            for forwarding_id in &forwarding_ids {
                data.remove_forwarding(forwarding_id, &mut events);
            }

            let publication_ids: Vec<PublicationId> = data
                .publications
                .values()
                .filter(|p| &p.publisher == id && p.state != PublicationState::Canceled)
                .map(|p| p.id.clone())
                .collect();
            for publication_id in &publication_ids {
                data.cancel_publication(publication_id, &mut events);
            }

            let subscription_ids: Vec<SubscriptionId> = data
                .subscriptions
                .values()
                .filter(|s| &s.subscriber == id && s.state != SubscriptionState::Canceled)
                .map(|s| s.id.clone())
                .collect();
            for subscription_id in &subscription_ids {
                data.cancel_subscription(subscription_id, &mut events);
            }

            if let Some(member) = data.members.get_mut(id) {
                member.state = MemberState::Left;
                events.push(ChannelEvent::MemberLeft(member.clone()));
            }
        }
        with_list_changes(&mut events);
        events.push(ChannelEvent::MemberListChanged);
        info!(channel_id = %self.id, member_id = %id, "Member left");
        self.emit(events);
        Ok(())
    }

    pub(crate) fn update_member_metadata(&self, id: &MemberId, metadata: &str) -> Result<()> {
        let member = {
            let mut data = self.data.write();
            data.joined_member(id)?;
            let Some(member) = data.members.get_mut(id) else {
                return Err(ChannelError::NotFound(format!("member {id}")));
            };
            member.metadata = metadata.to_string();
            member.clone()
        };
        self.emit(vec![ChannelEvent::MemberMetadataUpdated {
            member,
            metadata: metadata.to_string(),
        }]);
        Ok(())
    }

    pub(crate) fn publish(
        &self,
        actor: &MemberId,
        stream: LocalStream,
        options: PublicationOptions,
    ) -> Result<PublicationInfo> {
        let publication = {
            let mut data = self.data.write();
            data.ensure_open()?;
            data.joined_member(actor)?;
            let duplicate = data.publications.values().any(|p| {
                &p.publisher == actor
                    && p.state != PublicationState::Canceled
                    && p.stream.as_ref() == Some(&stream.id)
            });
            if duplicate {
                return Err(ChannelError::AlreadyExists(format!(
                    "stream {} is already published",
                    stream.id
                )));
            }
            let state = if options.is_enabled == Some(false) {
                PublicationState::Disabled
            } else {
                PublicationState::Enabled
            };
            let publication = PublicationInfo {
                id: PublicationId::generate(),
                publisher: actor.clone(),
                content_type: stream.content_type,
                metadata: options.metadata.unwrap_or_default(),
                state,
                origin: None,
                stream: Some(stream.id),
                codec_capabilities: options.codec_capabilities,
                encodings: options.encodings,
            };
            data.publications
                .insert(publication.id.clone(), publication.clone());
            publication
        };
        debug!(
            channel_id = %self.id,
            publication_id = %publication.id,
            publisher = %actor,
            "Stream published"
        );
        self.emit(vec![
            ChannelEvent::StreamPublished(publication.clone()),
            ChannelEvent::PublicationListChanged,
        ]);
        Ok(publication)
    }

    /// Cancel a publication; with an actor, only its publisher may do so
    pub(crate) fn unpublish(&self, actor: Option<&MemberId>, id: &PublicationId) -> Result<()> {
        let mut events = Vec::new();
        {
            let mut data = self.data.write();
            let publication = data.live_publication(id)?;
            if let Some(actor) = actor {
                if &publication.publisher != actor {
                    return Err(ChannelError::InvalidInput(format!(
                        "publication {id} is not published by {actor}"
                    )));
                }
            }
            data.cancel_publication(id, &mut events);
        }
        with_list_changes(&mut events);
        self.emit(events);
        Ok(())
    }

    pub(crate) fn set_publication_enabled(&self, id: &PublicationId, enabled: bool) -> Result<()> {
        let target = if enabled {
            PublicationState::Enabled
        } else {
            PublicationState::Disabled
        };
        let mut events = Vec::new();
        {
            let mut data = self.data.write();
            data.live_publication(id)?;
            let mut affected = vec![id.clone()];
            affected.extend(data.relays_of(id));
            for publication_id in affected {
                if let Some(publication) = data.publications.get_mut(&publication_id) {
                    if publication.state == target {
                        continue;
                    }
                    publication.state = target;
                    let snapshot = publication.clone();
                    events.push(if enabled {
                        ChannelEvent::PublicationEnabled(snapshot)
                    } else {
                        ChannelEvent::PublicationDisabled(snapshot)
                    });
                }
            }
        }
        self.emit(events);
        Ok(())
    }

    pub(crate) fn update_publication_metadata(
        &self,
        id: &PublicationId,
        metadata: &str,
    ) -> Result<()> {
        let mut events = Vec::new();
        {
            let mut data = self.data.write();
            data.live_publication(id)?;
            let mut affected = vec![id.clone()];
            affected.extend(data.relays_of(id));
            for publication_id in affected {
                if let Some(publication) = data.publications.get_mut(&publication_id) {
                    publication.metadata = metadata.to_string();
                    events.push(ChannelEvent::PublicationMetadataUpdated {
                        publication: publication.clone(),
                        metadata: metadata.to_string(),
                    });
                }
            }
        }
        self.emit(events);
        Ok(())
    }

    pub(crate) fn update_publication_encodings(
        &self,
        id: &PublicationId,
        encodings: Vec<Encoding>,
    ) -> Result<()> {
        let mut data = self.data.write();
        data.live_publication(id)?;
        if let Some(publication) = data.publications.get_mut(id) {
            publication.encodings = encodings;
        }
        Ok(())
    }

    pub(crate) fn subscribe(
        &self,
        actor: &MemberId,
        publication_id: &PublicationId,
        options: SubscriptionOptions,
    ) -> Result<SubscriptionInfo> {
        let subscription = {
            let mut data = self.data.write();
            data.ensure_open()?;
            data.joined_member(actor)?;
            let publication = data.live_publication(publication_id)?;
            if &publication.publisher == actor {
                return Err(ChannelError::InvalidInput(format!(
                    "cannot subscribe to own publication {publication_id}"
                )));
            }
            let content_type = publication.content_type;
            let already = data.subscriptions.values().any(|s| {
                &s.subscriber == actor
                    && &s.publication == publication_id
                    && s.state != SubscriptionState::Canceled
            });
            if already {
                return Err(ChannelError::AlreadyExists(format!(
                    "publication {publication_id} is already subscribed"
                )));
            }
            if let Some(record) = data
                .forwardings
                .values()
                .find(|record| &record.relay == publication_id)
            {
                let current = data
                    .subscriptions
                    .values()
                    .filter(|s| {
                        &s.publication == publication_id && s.state != SubscriptionState::Canceled
                    })
                    .count();
                if current >= record.max_subscribers as usize {
                    return Err(ChannelError::InvalidInput(format!(
                        "publication {publication_id} reached its subscriber limit"
                    )));
                }
            }
            let subscription = SubscriptionInfo {
                id: SubscriptionId::generate(),
                publication: publication_id.clone(),
                subscriber: actor.clone(),
                content_type,
                state: SubscriptionState::Enabled,
                preferred_encoding_id: options.preferred_encoding_id,
            };
            data.subscriptions
                .insert(subscription.id.clone(), subscription.clone());
            subscription
        };
        self.emit(vec![
            ChannelEvent::PublicationSubscribed(subscription.clone()),
            ChannelEvent::SubscriptionListChanged,
        ]);
        Ok(subscription)
    }

    /// Cancel a subscription; with an actor, only its subscriber may do so
    pub(crate) fn unsubscribe(&self, actor: Option<&MemberId>, id: &SubscriptionId) -> Result<()> {
        let mut events = Vec::new();
        {
            let mut data = self.data.write();
            let subscription = data.live_subscription(id)?;
            if let Some(actor) = actor {
                if &subscription.subscriber != actor {
                    return Err(ChannelError::NotFound(format!(
                        "subscription {id} of member {actor}"
                    )));
                }
            }
            data.cancel_subscription(id, &mut events);
        }
        events.push(ChannelEvent::SubscriptionListChanged);
        self.emit(events);
        Ok(())
    }

    pub(crate) fn change_preferred_encoding(
        &self,
        id: &SubscriptionId,
        encoding_id: &str,
    ) -> Result<()> {
        let mut data = self.data.write();
        data.live_subscription(id)?;
        if let Some(subscription) = data.subscriptions.get_mut(id) {
            subscription.preferred_encoding_id = Some(encoding_id.to_string());
        }
        Ok(())
    }

    pub(crate) fn start_forwarding(
        self: &Arc<Self>,
        bot: &MemberId,
        origin_id: &PublicationId,
        max_subscribers: Option<u32>,
    ) -> Result<ForwardingDescriptor> {
        let behavior = self.behavior.read().clone();
        if behavior.fail_start_forwarding {
            return Err(ChannelError::Native("start forwarding rejected".to_string()));
        }

        let mut events = Vec::new();
        let (descriptor, relay) = {
            let mut data = self.data.write();
            data.ensure_open()?;
            let bot_member = data.joined_member(bot)?;
            if !bot_member.kind.is_bot() {
                return Err(ChannelError::InvalidInput(format!("member {bot} is not a bot")));
            }
            let origin = data.live_publication(origin_id)?.clone();
            if origin.is_relay() {
                return Err(ChannelError::InvalidInput(format!(
                    "publication {origin_id} is already a relay"
                )));
            }

            let bot_subscription = SubscriptionInfo {
                id: SubscriptionId::generate(),
                publication: origin.id.clone(),
                subscriber: bot.clone(),
                content_type: origin.content_type,
                state: SubscriptionState::Enabled,
                preferred_encoding_id: None,
            };
            data.subscriptions
                .insert(bot_subscription.id.clone(), bot_subscription.clone());
            events.push(ChannelEvent::PublicationSubscribed(bot_subscription.clone()));
            events.push(ChannelEvent::SubscriptionListChanged);

            let relay = PublicationInfo {
                id: PublicationId::generate(),
                publisher: bot.clone(),
                content_type: origin.content_type,
                metadata: origin.metadata.clone(),
                state: origin.state,
                origin: Some(origin.id.clone()),
                stream: None,
                codec_capabilities: origin.codec_capabilities.clone(),
                encodings: origin.encodings.clone(),
            };
            let configure = ForwardingConfigure {
                max_subscribers: max_subscribers.unwrap_or(DEFAULT_MAX_SUBSCRIBERS),
            };
            let descriptor = ForwardingDescriptor {
                id: ForwardingId::generate(),
                configure,
                relaying_publication_id: relay.id.clone(),
            };
            data.forwardings.insert(
                descriptor.id.clone(),
                ForwardingRecord {
                    bot: bot.clone(),
                    origin: origin.id.clone(),
                    relay: relay.id.clone(),
                    bot_subscription: bot_subscription.id,
                    max_subscribers: configure.max_subscribers,
                },
            );
            (descriptor, relay)
        };
        self.emit(events);

        info!(
            channel_id = %self.id,
            forwarding_id = %descriptor.id,
            origin_publication_id = %origin_id,
            relaying_publication_id = %relay.id,
            "Forwarding started"
        );

        match behavior.relay_visibility {
            RelayVisibility::Immediate => self.reveal_relay(&descriptor.id, relay),
            RelayVisibility::Delayed(delay) => {
                let shared = Arc::clone(self);
                let forwarding_id = descriptor.id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    shared.reveal_relay(&forwarding_id, relay);
                });
            }
            RelayVisibility::Never => {
                warn!(
                    channel_id = %self.id,
                    relaying_publication_id = %relay.id,
                    "Relay publication will never become visible"
                );
            }
        }

        Ok(descriptor)
    }

    /// Make a relay publication enumerable and announce it
    fn reveal_relay(&self, forwarding_id: &ForwardingId, mut relay: PublicationInfo) {
        {
            let mut data = self.data.write();
            if !data.forwardings.contains_key(forwarding_id) {
                return;
            }
            if let Some(origin) = relay.origin.as_ref().and_then(|o| data.publications.get(o)) {
                relay.state = origin.state;
                relay.metadata = origin.metadata.clone();
            }
            data.publications.insert(relay.id.clone(), relay.clone());
        }
        self.emit(vec![
            ChannelEvent::StreamPublished(relay),
            ChannelEvent::PublicationListChanged,
        ]);
    }

    pub(crate) fn stop_forwarding(&self, bot: &MemberId, id: &ForwardingId) -> Result<()> {
        if self.behavior.read().fail_stop_forwarding {
            return Err(ChannelError::Native("stop forwarding rejected".to_string()));
        }
        let mut events = Vec::new();
        {
            let mut data = self.data.write();
            match data.forwardings.get(id) {
                Some(record) if &record.bot == bot => {}
                _ => return Err(ChannelError::NotFound(format!("forwarding {id}"))),
            }
            data.remove_forwarding(id, &mut events);
        }
        with_list_changes(&mut events);
        info!(channel_id = %self.id, forwarding_id = %id, "Forwarding stopped");
        self.emit(events);
        Ok(())
    }

    pub(crate) fn is_bot(&self, id: &MemberId) -> Option<MemberKind> {
        self.member(id)
            .map(|member| member.kind)
            .filter(MemberKind::is_bot)
    }
}

/// Append the list-changed notifications implied by a batch of events
fn with_list_changes(events: &mut Vec<ChannelEvent>) {
    let publications = events
        .iter()
        .any(|e| matches!(e, ChannelEvent::StreamUnpublished(_)));
    let subscriptions = events
        .iter()
        .any(|e| matches!(e, ChannelEvent::PublicationUnsubscribed(_)));
    if publications {
        events.push(ChannelEvent::PublicationListChanged);
    }
    if subscriptions {
        events.push(ChannelEvent::SubscriptionListChanged);
    }
}
