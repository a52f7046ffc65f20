//! Identifier types shared by channels, members, publications and subscriptions

use nanoid::nanoid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generate a 12-character nanoid for entity IDs
#[must_use]
pub fn generate_id() -> String {
    nanoid!(12)
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Create a fresh random identifier
            #[must_use]
            pub fn generate() -> Self {
                Self(generate_id())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

define_id!(
    /// Unique identifier for a channel
    ChannelId
);
define_id!(
    /// Unique identifier for a channel member
    MemberId
);
define_id!(
    /// Unique identifier for a publication
    PublicationId
);
define_id!(
    /// Unique identifier for a subscription
    SubscriptionId
);
define_id!(
    /// Unique identifier for a forwarding created by a relay bot
    ForwardingId
);
define_id!(
    /// Identifier of a local stream handed to `publish`
    StreamId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = PublicationId::generate();
        let b = PublicationId::generate();
        assert_eq!(a.as_str().len(), 12);
        assert_ne!(a, b);
    }

    #[test]
    fn test_id_display_and_conversion() {
        let id = MemberId::from("alice");
        assert_eq!(id.to_string(), "alice");
        assert_eq!(MemberId::new(String::from("alice")), id);
    }
}
