//! Typed identifiers for messages, sessions, and in-flight executions.
//!
//! Wire ids (`msg_id`, `session`) are chosen by whoever sends the message and
//! are only required to be unique strings; front-ends use UUIDs, hex digests,
//! or `<hex>_<pid>_<n>`. They are kept as opaque text. Ids this kernel mints
//! are UUIDv7 text.
//!
//! [`CorrelationId`] never leaves the kernel/engine pair and wraps a UUIDv7
//! directly. The `short()` form (first 8 chars) is for log lines only, never
//! a lookup key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A protocol message identifier (`header.msg_id`).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MsgId(String);

/// A protocol session identifier (`header.session`).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

/// Key of one pending execution inside the kernel.
///
/// Sent to the engine with every evaluation request. Engines that echo it
/// back on terminal events let the kernel detect out-of-order replies.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(uuid::Uuid);

// ── Wire ids ────────────────────────────────────────────────────────────────

macro_rules! impl_wire_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Mint a new id (UUIDv7 text).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7().to_string())
            }

            /// First 8 characters, for log lines.
            pub fn short(&self) -> String {
                self.0.chars().take(8).collect()
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<String> for $T {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($name, "({})"), self.short())
            }
        }
    };
}

impl_wire_id!(MsgId, "MsgId");
impl_wire_id!(SessionId, "SessionId");

// ── Kernel-internal ids ─────────────────────────────────────────────────────

impl CorrelationId {
    /// Create a new time-ordered ID (UUIDv7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// First 8 hex characters, for log lines.
    pub fn short(&self) -> String {
        self.0.as_simple().to_string()[..8].to_string()
    }

    /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<uuid::Uuid> for CorrelationId {
    fn from(u: uuid::Uuid) -> Self {
        Self(u)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({})", self.short())
    }
}
