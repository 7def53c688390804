//! Connection registry.

mod connection_registry;

pub use connection_registry::{
    ConnectionEntry, ConnectionRegistry, ConnectionSnapshot, SendResult,
    OUTBOUND_CHANNEL_CAPACITY,
};
