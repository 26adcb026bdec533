// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! String-backed identifier newtypes.
//!
//! Unlike ids this project mints itself (which could use a fixed-width,
//! prefix-tagged buffer), every identifier here is handed to us by an
//! external system — an agent's own session id, a message or part file
//! stem, a tool-call id minted by the agent runtime. Sizes and formats
//! are opaque, so each is a thin `String` wrapper rather than a fixed
//! capacity buffer.

/// Define a `String`-backed identifier newtype with the usual conversions.
macro_rules! define_string_id {
    ($(#[$meta:meta])* pub struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
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

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

define_string_id! {
    /// Identifier for one conversation between a user and one agent instance.
    ///
    /// Opaque to the daemon: for the OpenCode adapter this is the agent's own
    /// session id (the stem of `session/<projectId>/<sessionId>.json`).
    pub struct SessionId;
}

define_string_id! {
    /// Identifier for a single user or assistant message within a session.
    pub struct MessageId;
}

define_string_id! {
    /// Identifier for a message fragment (text run, reasoning span, tool call, step marker).
    pub struct PartId;
}

define_string_id! {
    /// Identifier the agent runtime assigns to one tool invocation.
    pub struct ToolCallId;
}

define_string_id! {
    /// Identifier for a pending approval request.
    pub struct RequestId;
}

#[cfg(test)]
#[path = "ids_tests.rs"]
mod tests;
