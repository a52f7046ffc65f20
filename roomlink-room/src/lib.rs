//! Room synchronization and relay coordination for roomlink
//!
//! Rooms sit on top of a `roomlink_channel::Channel`: members join, publish
//! streams and subscribe to each other. A room keeps no state of its own;
//! every list it returns is rebuilt from the channel, and channel events are
//! translated into room events by a per-room pump running on the context's
//! task tracker.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use roomlink_channel::memory::MemoryEngine;
//! use roomlink_room::{Room, RoomConfig, RoomContext, RoomMemberInit, RoomType};
//!
//! let provider = Arc::new(MemoryEngine::new().provider());
//! let context = RoomContext::setup(provider, RoomConfig::default())?;
//! let room = Room::create(&context, RoomType::Relayed, Some("lobby"), None)
//!     .await?
//!     .expect("room");
//! let alice = room.join(RoomMemberInit::named("alice")).await.expect("joined");
//! ```

pub mod config;
mod context;
mod error;
pub mod logging;
mod member;
mod publication;
mod relay;
mod room;
mod subscription;
pub mod task_tracker;

pub use config::{EventConfig, LoggingConfig, RelayConfig, RoomConfig};
pub use context::RoomContext;
pub use error::{Error, Result};
pub use member::{LocalRoomMember, RemoteRoomMember, RoomMember, RoomMemberInit};
pub use publication::{RoomPublication, RoomPublicationOptions};
pub use relay::{Forwarding, ForwardingState, RelayAgent};
pub use room::{Room, RoomEvent, RoomType};
pub use subscription::{RoomSubscription, RoomSubscriptionOptions};
pub use task_tracker::{TaskError, TaskHandle, TaskTracker};

pub use roomlink_channel as channel;
