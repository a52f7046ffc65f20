use crate::member::RoomMember;
use crate::publication::RoomPublication;
use crate::subscription::RoomSubscription;

/// Room-level notification
///
/// Delivered over a broadcast channel; every listener sees every event.
/// List-changed variants follow the individual change they summarize.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    Closed,
    MetadataUpdated {
        metadata: String,
    },
    MemberListChanged,
    MemberJoined(RoomMember),
    MemberLeft(RoomMember),
    MemberMetadataUpdated {
        member: RoomMember,
        metadata: String,
    },
    PublicationListChanged,
    StreamPublished(RoomPublication),
    StreamUnpublished(RoomPublication),
    PublicationEnabled(RoomPublication),
    PublicationDisabled(RoomPublication),
    PublicationMetadataUpdated {
        publication: RoomPublication,
        metadata: String,
    },
    SubscriptionListChanged,
    PublicationSubscribed(RoomSubscription),
    PublicationUnsubscribed(RoomSubscription),
    Error(String),
}

impl RoomEvent {
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::MetadataUpdated { .. } => "metadata_updated",
            Self::MemberListChanged => "member_list_changed",
            Self::MemberJoined(_) => "member_joined",
            Self::MemberLeft(_) => "member_left",
            Self::MemberMetadataUpdated { .. } => "member_metadata_updated",
            Self::PublicationListChanged => "publication_list_changed",
            Self::StreamPublished(_) => "stream_published",
            Self::StreamUnpublished(_) => "stream_unpublished",
            Self::PublicationEnabled(_) => "publication_enabled",
            Self::PublicationDisabled(_) => "publication_disabled",
            Self::PublicationMetadataUpdated { .. } => "publication_metadata_updated",
            Self::SubscriptionListChanged => "subscription_list_changed",
            Self::PublicationSubscribed(_) => "publication_subscribed",
            Self::PublicationUnsubscribed(_) => "publication_unsubscribed",
            Self::Error(_) => "error",
        }
    }
}
