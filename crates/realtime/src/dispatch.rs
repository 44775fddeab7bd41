//! Inbound frame dispatch.

use tracing::{trace, warn};

use bizosaas_protocol::InboundMessage;

use crate::registry::SubscriptionRegistry;

/// Routes text frames to the registry.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    registry: SubscriptionRegistry,
    max_message_size: usize,
}

impl Dispatcher {
    pub(crate) fn new(registry: SubscriptionRegistry, max_message_size: usize) -> Self {
        Self {
            registry,
            max_message_size,
        }
    }

    /// Parses one text frame and fans it out. Malformed or oversized frames
    /// are dropped. Returns the number of listeners invoked.
    pub(crate) fn handle_text(&self, text: &str) -> usize {
        if text.len() > self.max_message_size {
            warn!("message too large ({} bytes), dropping", text.len());
            return 0;
        }

        let msg = match InboundMessage::parse(text) {
            Ok(m) => m,
            Err(e) => {
                warn!("failed to parse message: {e}");
                return 0;
            }
        };

        let delivered = self.registry.dispatch(&msg);
        if delivered == 0 {
            trace!(msg_type = %msg.msg_type, "no listeners for message type");
        } else {
            trace!(msg_type = %msg.msg_type, delivered, "dispatched message");
        }
        delivered
    }
}
