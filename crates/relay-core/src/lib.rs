//! Core relay engine: connection registry, room membership, message routing
//! and presence.
//!
//! This crate is transport-agnostic. The embedding server owns sockets and
//! handshakes; the engine owns everything after a connection is accepted.
//! Each connection gets an outbound `mpsc` channel at registration, and all
//! deliveries (fan-out, presence, direct replies) flow through it.
//!
//! # Architecture
//!
//! - [`engine::RelayEngine`] is the composition root and single dispatch
//!   point for inbound events.
//! - [`registry::ConnectionRegistry`] holds the live connections and their
//!   outbound channels.
//! - [`rooms::RoomTable`] tracks room membership in both directions.
//! - [`routing::MessageRouter`] computes recipient sets and stamps
//!   envelopes.
//! - [`presence::PresenceNotifier`] emits join/leave/disconnect events.
//!
//! Identity verification is a seam: the server plugs in an
//! [`IdentityVerifier`] and calls it before the engine ever sees the
//! connection.

pub mod engine;
pub mod error;
pub mod events;
pub mod presence;
pub mod registry;
pub mod rooms;
pub mod routing;
pub mod types;

pub use engine::{RegistrySnapshot, RelayEngine};
pub use error::{AuthError, RelayError};
pub use events::{ClientEvent, MessageBody, ServerEvent};
pub use registry::{ConnectionRegistry, SendResult};
pub use rooms::RoomTable;
pub use routing::{DeliveryReceipt, MessageRouter};
pub use types::{ConnectionId, Identity};

use std::future::Future;

/// Credential verification at handshake time.
///
/// Implementations decide the deployment's policy for absent credentials:
/// `Ok(None)` admits the connection anonymously, `Err` rejects the
/// handshake before any engine state is created. A present-but-invalid
/// credential must always reject.
pub trait IdentityVerifier: Send + Sync + 'static {
    fn verify(
        &self,
        credential: Option<&str>,
    ) -> impl Future<Output = Result<Option<Identity>, AuthError>> + Send;
}
