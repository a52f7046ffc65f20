//! Channel primitive for roomlink
//!
//! A channel is the room-independent building block: members join it,
//! publish streams into it and subscribe to each other's publications.
//! Rooms are layered on top of this contract.
//!
//! ## Contents
//!
//! - **`Channel`** / **`ChannelProvider`**: async contract of the engine
//! - **`LocalPerson`**: the member this client acts as
//! - **`RelayBot`**: native handle of a forwarding bot
//! - **`ChannelEvent`**: notifications, delivered over `tokio::sync::broadcast`
//! - **`memory`**: an in-process engine implementing the contract
//!
//! ## Usage
//!
//! ```rust,ignore
//! use roomlink_channel::memory::MemoryEngine;
//! use roomlink_channel::{ChannelProvider, MemberInit};
//!
//! let engine = MemoryEngine::new();
//! let provider = engine.provider();
//! let channel = provider.create(Some("lobby"), None).await?;
//! let alice = channel.join(MemberInit::default()).await?;
//! ```

mod error;
mod event;
pub mod memory;
mod model;
mod traits;
mod types;

pub use error::{ChannelError, Result};
pub use event::ChannelEvent;
pub use model::{
    ChannelState, Codec, ContentType, Encoding, ForwardingConfigure, ForwardingDescriptor,
    LocalStream, MemberInfo, MemberInit, MemberKind, MemberSide, MemberState, PublicationInfo,
    PublicationOptions, PublicationState, SubscriptionInfo, SubscriptionOptions,
    SubscriptionState, DEFAULT_KEEP_ALIVE_INTERVAL_SEC,
};
pub use traits::{Channel, ChannelProvider, LocalPerson, RelayBot};
pub use types::{
    generate_id, ChannelId, ForwardingId, MemberId, PublicationId, StreamId, SubscriptionId,
};
