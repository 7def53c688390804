//! Message routing and fan-out.
//!
//! The router computes the recipient set for an inbound message (a room's
//! current members, or every connection when no room is given), stamps the
//! envelope with server-assigned sender metadata, and dispatches it to each
//! recipient's transport. Fan-out is best effort per recipient: one failed
//! delivery is logged and never aborts the rest.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::events::{MessageBody, ServerEvent};
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomTable;
use crate::types::{now_millis, ConnectionId};

/// Outcome of a routing operation, returned to the sender.
///
/// `ok` means routing was attempted, not that every peer received the
/// event; peers with failed deliveries simply miss it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub ok: bool,
    /// Recipients whose transports accepted the event
    pub delivered: usize,
    /// Recipients skipped over a dead or saturated transport
    pub failed: usize,
}

impl DeliveryReceipt {
    fn attempted(delivered: usize, failed: usize) -> Self {
        Self {
            ok: true,
            delivered,
            failed,
        }
    }
}

/// Routes user messages and announcements to their recipient sets.
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomTable>,
}

impl MessageRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, rooms: Arc<RoomTable>) -> Self {
        Self { registry, rooms }
    }

    /// Route a user message from `sender`.
    ///
    /// With a target room, recipients are the room's members at send time,
    /// sender included (self-echo is intentional). Without one, the message
    /// goes to every registered connection. The envelope is stamped with
    /// the sender's id, verified identity and a server-side timestamp,
    /// overwriting anything the client supplied for those fields.
    #[instrument(skip(self, body), fields(sender = %sender, room = body.room.as_deref().unwrap_or("(global)")))]
    pub async fn route_message(&self, sender: &ConnectionId, body: MessageBody) -> DeliveryReceipt {
        let user_id = self.registry.identity_of(sender).map(|i| i.subject);
        let room = body.room.clone();
        let event = ServerEvent::Msg {
            body: body.strip_reserved(),
            socket_id: sender.clone(),
            user_id,
            timestamp: now_millis(),
        };

        let (delivered, failed) = match room.as_deref() {
            Some(room) => {
                let members = self.rooms.members_of(room).await;
                self.registry.send_to_many(members.iter(), &event)
            }
            None => self.registry.broadcast(&event),
        };

        if failed > 0 {
            warn!(delivered, failed, "Partial delivery failure during fan-out");
        } else {
            debug!(delivered, "Message routed");
        }
        DeliveryReceipt::attempted(delivered, failed)
    }

    /// Broadcast an announcement from `sender` to every connection.
    ///
    /// Announcements always ignore room scoping and arrive on a channel
    /// distinct from regular messages.
    #[instrument(skip(self, text), fields(sender = %sender))]
    pub async fn announce(&self, sender: &ConnectionId, text: String) -> DeliveryReceipt {
        let user_id = self.registry.identity_of(sender).map(|i| i.subject);
        let event = ServerEvent::Announcement {
            text,
            socket_id: sender.clone(),
            user_id,
            timestamp: now_millis(),
        };

        let (delivered, failed) = self.registry.broadcast(&event);
        if failed > 0 {
            warn!(delivered, failed, "Partial delivery failure during announcement");
        }
        DeliveryReceipt::attempted(delivered, failed)
    }
}
