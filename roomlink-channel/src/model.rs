//! Value types exchanged with the channel primitive

use crate::types::{ForwardingId, MemberId, PublicationId, StreamId, SubscriptionId};
use serde::{Deserialize, Serialize};

/// Default keep-alive interval for joining members, in seconds
pub const DEFAULT_KEEP_ALIVE_INTERVAL_SEC: u32 = 30;

/// Channel lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Opened,
    Closed,
}

/// Where a member lives relative to the observing client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberSide {
    Local,
    Remote,
}

/// Closed set of member kinds known to this client
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MemberKind {
    Person,
    Bot { subtype: String },
    Unknown,
}

impl MemberKind {
    #[must_use]
    pub const fn is_bot(&self) -> bool {
        matches!(self, Self::Bot { .. })
    }

    /// True when this is a bot of the given subtype
    #[must_use]
    pub fn is_bot_of(&self, wanted: &str) -> bool {
        matches!(self, Self::Bot { subtype } if subtype == wanted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberState {
    Joined,
    Left,
}

/// Media content carried by a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Audio,
    Video,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationState {
    Enabled,
    Disabled,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionState {
    Enabled,
    Disabled,
    Canceled,
}

/// Codec capability offered by a publisher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codec {
    pub mime_type: String,
}

impl Codec {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
        }
    }
}

/// Encoding parameters of a published stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    pub id: Option<String>,
    pub max_bitrate: Option<u32>,
    pub scale_resolution_down_by: Option<f64>,
    pub max_framerate: Option<f64>,
}

/// Initial settings for joining a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInit {
    pub name: Option<String>,
    pub metadata: Option<String>,
    pub keep_alive_interval_sec: u32,
    pub keep_alive_interval_gap_sec: u32,
    pub kind: MemberKind,
}

impl Default for MemberInit {
    fn default() -> Self {
        Self {
            name: None,
            metadata: None,
            keep_alive_interval_sec: DEFAULT_KEEP_ALIVE_INTERVAL_SEC,
            keep_alive_interval_gap_sec: DEFAULT_KEEP_ALIVE_INTERVAL_SEC,
            kind: MemberKind::Person,
        }
    }
}

/// Point-in-time view of a channel member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub id: MemberId,
    pub name: Option<String>,
    pub metadata: String,
    pub kind: MemberKind,
    pub state: MemberState,
}

/// Handle to a local media or data stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalStream {
    pub id: StreamId,
    pub content_type: ContentType,
}

impl LocalStream {
    #[must_use]
    pub fn new(content_type: ContentType) -> Self {
        Self {
            id: StreamId::generate(),
            content_type,
        }
    }

    #[must_use]
    pub fn audio() -> Self {
        Self::new(ContentType::Audio)
    }

    #[must_use]
    pub fn video() -> Self {
        Self::new(ContentType::Video)
    }

    #[must_use]
    pub fn data() -> Self {
        Self::new(ContentType::Data)
    }
}

/// Channel-level publish options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicationOptions {
    pub metadata: Option<String>,
    pub codec_capabilities: Vec<Codec>,
    pub encodings: Vec<Encoding>,
    pub is_enabled: Option<bool>,
}

/// Channel-level subscribe options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    pub preferred_encoding_id: Option<String>,
}

/// Point-in-time view of a publication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationInfo {
    pub id: PublicationId,
    pub publisher: MemberId,
    pub content_type: ContentType,
    pub metadata: String,
    pub state: PublicationState,
    /// Source publication when this one is a relay
    pub origin: Option<PublicationId>,
    pub stream: Option<StreamId>,
    pub codec_capabilities: Vec<Codec>,
    pub encodings: Vec<Encoding>,
}

impl PublicationInfo {
    #[must_use]
    pub const fn is_relay(&self) -> bool {
        self.origin.is_some()
    }
}

/// Point-in-time view of a subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub publication: PublicationId,
    pub subscriber: MemberId,
    pub content_type: ContentType,
    pub state: SubscriptionState,
    pub preferred_encoding_id: Option<String>,
}

/// Relay settings applied when a bot starts forwarding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingConfigure {
    pub max_subscribers: u32,
}

/// Result of a successful start-forwarding call
///
/// The relaying publication named here is not guaranteed to be visible in
/// the channel's publication set yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingDescriptor {
    pub id: ForwardingId,
    pub configure: ForwardingConfigure,
    pub relaying_publication_id: PublicationId,
}
