//! Notifications emitted by a channel

use crate::model::{MemberInfo, PublicationInfo, SubscriptionInfo};

/// Every state change a channel reports
///
/// Delivered through a broadcast channel, so any number of listeners can
/// observe the same channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Closed,
    MetadataUpdated { metadata: String },
    MemberListChanged,
    MemberJoined(MemberInfo),
    MemberLeft(MemberInfo),
    MemberMetadataUpdated { member: MemberInfo, metadata: String },
    PublicationListChanged,
    StreamPublished(PublicationInfo),
    StreamUnpublished(PublicationInfo),
    PublicationEnabled(PublicationInfo),
    PublicationDisabled(PublicationInfo),
    PublicationMetadataUpdated {
        publication: PublicationInfo,
        metadata: String,
    },
    SubscriptionListChanged,
    PublicationSubscribed(SubscriptionInfo),
    PublicationUnsubscribed(SubscriptionInfo),
    Error(String),
}

impl ChannelEvent {
    /// Short name used in logs
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
