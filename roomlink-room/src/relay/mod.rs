//! Relay agent and forwarding records

mod agent;
mod forwarding;

pub use agent::RelayAgent;
pub use forwarding::{Forwarding, ForwardingState};
