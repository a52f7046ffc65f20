//! Direct (peer-to-peer) room behaviour

use super::{RoomEvent, RoomInner};
use crate::error::{absent_on_error, succeeded};
use crate::publication::{RoomPublication, RoomPublicationOptions};
use roomlink_channel::{ChannelEvent, LocalPerson, LocalStream};
use std::sync::Arc;
use tracing::debug;

/// Translate a channel event one to one
///
/// Channel list-changed notifications are dropped; the room emits its own
/// right after the change they belong to.
pub(super) fn translate(room: &Arc<RoomInner>, event: ChannelEvent) -> Vec<RoomEvent> {
    match event {
        ChannelEvent::Closed => vec![RoomEvent::Closed],
        ChannelEvent::MetadataUpdated { metadata } => vec![RoomEvent::MetadataUpdated { metadata }],
        ChannelEvent::MemberJoined(member) => vec![
            RoomEvent::MemberJoined(room.member_view(member)),
            RoomEvent::MemberListChanged,
        ],
        ChannelEvent::MemberLeft(member) => vec![
            RoomEvent::MemberLeft(room.member_view(member)),
            RoomEvent::MemberListChanged,
        ],
        ChannelEvent::MemberMetadataUpdated { member, metadata } => {
            vec![RoomEvent::MemberMetadataUpdated {
                member: room.member_view(member),
                metadata,
            }]
        }
        ChannelEvent::StreamPublished(publication) => vec![
            RoomEvent::StreamPublished(room.publication_view(publication)),
            RoomEvent::PublicationListChanged,
        ],
        ChannelEvent::StreamUnpublished(publication) => vec![
            RoomEvent::StreamUnpublished(room.publication_view(publication)),
            RoomEvent::PublicationListChanged,
        ],
        ChannelEvent::PublicationEnabled(publication) => {
            vec![RoomEvent::PublicationEnabled(room.publication_view(publication))]
        }
        ChannelEvent::PublicationDisabled(publication) => {
            vec![RoomEvent::PublicationDisabled(room.publication_view(publication))]
        }
        ChannelEvent::PublicationMetadataUpdated {
            publication,
            metadata,
        } => vec![RoomEvent::PublicationMetadataUpdated {
            publication: room.publication_view(publication),
            metadata,
        }],
        ChannelEvent::PublicationSubscribed(subscription) => vec![
            RoomEvent::PublicationSubscribed(room.subscription_view(subscription)),
            RoomEvent::SubscriptionListChanged,
        ],
        ChannelEvent::PublicationUnsubscribed(subscription) => vec![
            RoomEvent::PublicationUnsubscribed(room.subscription_view(subscription)),
            RoomEvent::SubscriptionListChanged,
        ],
        ChannelEvent::Error(message) => vec![RoomEvent::Error(message)],
        ChannelEvent::MemberListChanged
        | ChannelEvent::PublicationListChanged
        | ChannelEvent::SubscriptionListChanged => Vec::new(),
    }
}

pub(super) async fn publish(
    room: &Arc<RoomInner>,
    person: &dyn LocalPerson,
    stream: LocalStream,
    options: RoomPublicationOptions,
) -> Option<RoomPublication> {
    let publication = absent_on_error(
        person.publish(stream, options.to_channel()).await,
        "publish",
    )?;
    debug!(
        room_id = %room.channel.id(),
        publication_id = %publication.id,
        "Stream published"
    );
    Some(room.publication_view(publication))
}

pub(super) async fn unpublish(person: &dyn LocalPerson, publication: &RoomPublication) -> bool {
    succeeded(person.unpublish(publication.id()).await, "unpublish")
}
