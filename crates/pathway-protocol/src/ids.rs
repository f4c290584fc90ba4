//! Typed ID wrappers.
//!
//! IDs are opaque String wrappers (serde-transparent). Identifiers minted by
//! this workspace are UUID v4; identifiers supplied by callers (chat ids,
//! user ids) are accepted verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string value.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Create a new ID using UUID v4 (random).
            pub fn new_uuid() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// View as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new_uuid()
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

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id!(
    /// Primary identifier of a session record.
    SessionId
);
typed_id!(
    /// Stable key addressing a conversation's execution state in the checkpoint store.
    ThreadId
);
typed_id!(
    /// External-facing conversation identifier.
    ChatId
);
typed_id!(
    /// Owner of a session.
    UserId
);
typed_id!(
    /// Identifier of a single persisted checkpoint.
    CheckpointId
);

impl ThreadId {
    /// Whether the identifier carries no value. A session holding an empty
    /// thread id cannot address checkpoint state.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}
