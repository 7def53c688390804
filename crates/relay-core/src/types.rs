//! Common types shared across the relay engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a live connection.
///
/// Generated by the registry at registration time; never reused while the
/// connection is alive. Serialized on the wire as the `socketId` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh connection identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// View the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A verified identity attached to a connection.
///
/// Produced by the deployment's [`IdentityVerifier`](crate::IdentityVerifier)
/// at handshake time. Absence of an identity is a valid state (anonymous
/// connection), not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Verified subject identifier (the `sub` claim of the credential).
    pub subject: String,
}

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.subject)
    }
}

/// Current time in milliseconds since the Unix epoch.
///
/// All timestamps on outbound events are assigned server-side with this;
/// client-supplied timestamps are never trusted.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_unique() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn test_connection_id_serializes_as_plain_string() {
        let id = ConnectionId::from("abc-123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc-123\"");
    }

    #[test]
    fn test_now_millis_is_recent() {
        let ts = now_millis();
        // Sanity bound: after 2024-01-01 and not absurdly far in the future.
        assert!(ts > 1_704_067_200_000);
    }
}
