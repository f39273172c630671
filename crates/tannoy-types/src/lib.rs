//! Shared types and identifiers for the Tannoy agent pool.
//!
//! This crate provides the vocabulary used across all Tannoy crates:
//! room, text-channel, and member identifiers, the secret connection
//! token, participant descriptors, and the membership-change snapshot
//! carried by platform events.
//!
//! No crate in the workspace depends on anything *except* `tannoy-types`
//! for cross-cutting type definitions. This keeps the dependency graph
//! clean and prevents circular dependencies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A voice-capable room within the platform that agents can join and leave.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A text channel within the platform. Command replies go back to the
/// text channel a command arrived on, never anywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextChannelId(String);

impl TextChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TextChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric platform identity of a participant. Admin allowlists are
/// expressed in these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(pub u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique id of a chat message, assigned by the platform. Used by the
/// command dispatcher to process each message exactly once even though
/// every live connection observes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A secret connection token identifying one agent to the platform.
///
/// `Debug` and `Display` never print the full value; logs and panics get a
/// short fingerprint only.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Secret(String);

impl Secret {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The full token, for handing to the platform transport.
    pub fn reveal(&self) -> &str {
        &self.0
    }

    /// A short non-reversible prefix safe to put in logs.
    pub fn fingerprint(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(6)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({}…)", self.fingerprint())
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}…", self.fingerprint())
    }
}

/// A participant visible somewhere on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: MemberId,
    /// Name as shown in the room, used verbatim in announcements.
    pub display_name: String,
    /// Whether the participant is itself an automated account. Automated
    /// participants are never counted as an audience and are announced as
    /// "service droid" rather than by name.
    pub automated: bool,
}

/// Ephemeral before/after snapshot carried by each membership event.
/// `None` means "not in any voice room".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipChange {
    pub member: Participant,
    pub before: Option<RoomId>,
    pub after: Option<RoomId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_debug_is_redacted() {
        let secret = Secret::new("abcdef0123456789-very-secret");
        let debug = format!("{:?}", secret);
        assert!(debug.contains("abcdef"));
        assert!(!debug.contains("very-secret"));
    }

    #[test]
    fn secret_fingerprint_handles_short_tokens() {
        let secret = Secret::new("ab");
        assert_eq!(secret.fingerprint(), "ab");
    }

    #[test]
    fn membership_change_carries_before_and_after() {
        let change = MembershipChange {
            member: Participant {
                id: MemberId(42),
                display_name: "Ann".to_string(),
                automated: false,
            },
            before: None,
            after: Some(RoomId::new("lounge")),
        };
        assert_eq!(change.after.as_ref().unwrap().as_str(), "lounge");
        assert!(change.before.is_none());
    }
}
