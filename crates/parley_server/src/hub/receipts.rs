#![forbid(unsafe_code)]

use std::sync::Arc;

use parley_domain::{Channel, Message, MessageId, MessageTarget, ServerEvent, UserId};
use tracing::debug;

use super::fanout::merge_conns;
use super::{Hub, HubError, routing_miss};

impl Hub {
	/// Record `reader` on the message and tell everyone who can see it.
	///
	/// Repeating a read still broadcasts; the stored reader set does not grow.
	pub(super) async fn mark_read(&self, id: MessageId, reader: &UserId) -> Result<Message, HubError> {
		let message = self.store.mark_read(id, reader).await?;
		metrics::counter!("parley_server_read_receipts_total").increment(1);

		let event = Arc::new(ServerEvent::MessageRead { message: message.clone() });
		let queued = match &message.target {
			MessageTarget::Room(room) => {
				let members = self.rooms.members_of(room);
				self.outbound.deliver_many(&members, &Channel::Room(room.clone()), &event)
			}
			MessageTarget::Direct(receiver) => {
				let sender_conns = self.registry.connections_of(&message.sender);
				let receiver_conns = self.registry.connections_of(receiver);
				let conns = merge_conns([sender_conns.as_slice(), receiver_conns.as_slice()]);
				if conns.is_empty() {
					routing_miss("receipt");
				}
				self.deliver_direct(&conns, &event)
			}
		};

		debug!(message_id = %message.id, reader = %reader, readers = message.read_by.len(), queued, "receipts: propagated");
		Ok(message)
	}
}
