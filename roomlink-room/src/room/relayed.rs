//! Relayed room behaviour
//!
//! Applications only ever see relay publications here. Origin
//! publications, bot members and the bots' own subscriptions stay hidden.

use super::{direct, RoomEvent, RoomInner};
use crate::config::RelayConfig;
use crate::error::{succeeded, Error, Result};
use crate::publication::{RoomPublication, RoomPublicationOptions};
use roomlink_channel::{Channel, ChannelEvent, LocalPerson, LocalStream};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Make sure the channel has a relay agent of the configured subtype
pub(super) async fn ensure_agent(channel: &dyn Channel, settings: &RelayConfig) -> Result<()> {
    let present = channel
        .bots()
        .iter()
        .any(|bot| bot.kind.is_bot_of(&settings.bot_subtype));
    if present {
        return Ok(());
    }

    match channel.create_bot(&settings.bot_subtype).await {
        Ok(bot) => {
            info!(
                channel_id = %channel.id(),
                bot_id = %bot.id(),
                subtype = %settings.bot_subtype,
                "Relay agent created"
            );
            Ok(())
        }
        Err(err) => {
            warn!(channel_id = %channel.id(), error = %err, "Failed to create relay agent");
            Err(Error::RelayAgentMissing)
        }
    }
}

pub(super) async fn translate(room: &Arc<RoomInner>, event: ChannelEvent) -> Vec<RoomEvent> {
    if let ChannelEvent::StreamPublished(publication) = &event {
        let relay = publication.is_relay();
        // wait out any publish that is still creating its relay
        let _publishing = room.publish_lock.lock().await;
        if !relay {
            return Vec::new();
        }
        return direct::translate(room, event);
    }

    let hidden = match &event {
        ChannelEvent::MemberJoined(member)
        | ChannelEvent::MemberLeft(member)
        | ChannelEvent::MemberMetadataUpdated { member, .. } => member.kind.is_bot(),
        ChannelEvent::StreamUnpublished(publication)
        | ChannelEvent::PublicationEnabled(publication)
        | ChannelEvent::PublicationDisabled(publication)
        | ChannelEvent::PublicationMetadataUpdated { publication, .. } => !publication.is_relay(),
        ChannelEvent::PublicationSubscribed(subscription)
        | ChannelEvent::PublicationUnsubscribed(subscription) => {
            room.is_bot_member(&subscription.subscriber)
        }
        _ => false,
    };
    if hidden {
        return Vec::new();
    }
    direct::translate(room, event)
}

/// Publish the stream, then have the agent relay it
///
/// Holds the room's publish lock for both steps. An origin publication
/// whose relay could not be started is left in place.
pub(super) async fn publish(
    room: &Arc<RoomInner>,
    person: &dyn LocalPerson,
    stream: LocalStream,
    options: RoomPublicationOptions,
) -> Result<Option<RoomPublication>> {
    let _publishing = room.publish_lock.lock().await;

    let origin = match person.publish(stream, options.to_channel()).await {
        Ok(origin) => origin,
        Err(err) => {
            debug!(room_id = %room.channel.id(), error = %err, "Origin publish refused");
            return Ok(None);
        }
    };

    let Some(agent) = room.relay_agent() else {
        error!(
            room_id = %room.channel.id(),
            origin_publication_id = %origin.id,
            "Relay agent not found, origin publication left unrelayed"
        );
        return Ok(None);
    };

    match agent.start_forwarding(&origin, options.max_subscribers).await {
        Ok(forwarding) => Ok(Some(
            room.publication_view(forwarding.relaying_publication().clone()),
        )),
        Err(Error::Channel(err)) => {
            warn!(
                room_id = %room.channel.id(),
                origin_publication_id = %origin.id,
                error = %err,
                "Start forwarding failed, origin publication left unrelayed"
            );
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Stop the relay, then unpublish its origin
///
/// Only relay publications are accepted. If stopping the relay fails the
/// origin stays published.
pub(super) async fn unpublish(
    room: &Arc<RoomInner>,
    person: &dyn LocalPerson,
    publication: &RoomPublication,
) -> bool {
    let Some(origin_id) = publication.origin_id() else {
        warn!(publication_id = %publication.id(), "Not a relay publication");
        return false;
    };
    let Some(agent) = room.relay_agent() else {
        error!(room_id = %room.channel.id(), "Relay agent not found");
        return false;
    };

    if let Some(forwarding) = agent.forwarding_for_relay(publication.id()) {
        if !agent.stop_forwarding(&forwarding).await {
            return false;
        }
    }

    succeeded(person.unpublish(origin_id).await, "unpublish")
}
