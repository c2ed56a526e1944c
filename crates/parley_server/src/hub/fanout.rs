#![forbid(unsafe_code)]

use std::sync::Arc;

use parley_domain::{Channel, ConnId, Message, MessageTarget, ServerEvent, UserId};
use tracing::debug;

use super::{Hub, HubError, routing_miss};

impl Hub {
	/// Persist, then fan out. Nothing is delivered if persistence fails.
	pub(super) async fn send(&self, conn: ConnId, sender: &UserId, content: &str, target: MessageTarget) -> Result<Message, HubError> {
		if content.trim().is_empty() {
			return Err(HubError::InvalidArgument("message content is empty".to_string()));
		}

		let message = self
			.store
			.create_message(sender, content, &target)
			.await
			.map_err(HubError::Persistence)?;
		metrics::counter!("parley_server_messages_persisted_total", "target" => if message.target.is_group() { "room" } else { "direct" })
			.increment(1);

		self.stop_typing(conn, None);

		let event = Arc::new(ServerEvent::NewMessage { message: message.clone() });
		let queued = match &message.target {
			MessageTarget::Direct(receiver) => {
				let receiver_conns = self.registry.connections_of(receiver);
				if receiver_conns.is_empty() {
					routing_miss("message");
				}
				let sender_conns = self.registry.connections_of(sender);
				let recipients = merge_conns([std::slice::from_ref(&conn), sender_conns.as_slice(), receiver_conns.as_slice()]);
				self.deliver_direct(&recipients, &event)
			}
			MessageTarget::Room(room) => {
				let members = self.rooms.members_of(room);
				self.outbound.deliver_many(&members, &Channel::Room(room.clone()), &event)
			}
		};

		if self.cfg.debug_logs {
			debug!(conn_id = conn.0, message_id = %message.id, queued, "fanout: message delivered");
		}
		Ok(message)
	}
}

/// Concatenate connection lists, keeping the first occurrence of each.
pub(super) fn merge_conns<'a>(lists: impl IntoIterator<Item = &'a [ConnId]>) -> Vec<ConnId> {
	let mut out: Vec<ConnId> = Vec::new();
	for conn in lists.into_iter().flatten().copied() {
		if !out.contains(&conn) {
			out.push(conn);
		}
	}
	out
}
