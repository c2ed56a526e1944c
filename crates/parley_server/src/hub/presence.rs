#![forbid(unsafe_code)]

use std::sync::Arc;

use parley_domain::{Channel, ServerEvent, UserId};
use tracing::{debug, warn};

use super::Hub;

impl Hub {
	/// Broadcast `user`'s status to every registered connection, the user's own included.
	pub(super) fn announce(&self, user: &UserId, is_online: bool) -> usize {
		let event = Arc::new(ServerEvent::UserStatus {
			user: user.clone(),
			is_online,
		});
		let conns = self.registry.all_connections();
		let queued = self.outbound.deliver_many(&conns, &Channel::Presence, &event);

		metrics::counter!("parley_server_presence_broadcasts_total", "status" => if is_online { "online" } else { "offline" })
			.increment(1);
		debug!(user = %user, is_online, targets = conns.len(), queued, "presence: announced");
		queued
	}

	/// Persisted status is best effort; the broadcast has already gone out.
	pub(super) async fn persist_presence(&self, user: &UserId, is_online: bool) {
		if let Err(e) = self.store.update_online_status(user, is_online).await {
			metrics::counter!("parley_server_presence_persist_failures_total").increment(1);
			warn!(user = %user, is_online, error = %e, "presence: failed to persist online status");
		}
	}

	/// Teardown runs from `Drop`, so the offline write happens on a spawned task.
	pub(super) fn spawn_persist_offline(self: &Arc<Self>, user: UserId) {
		let Ok(handle) = tokio::runtime::Handle::try_current() else {
			warn!(user = %user, "presence: no runtime, offline status not persisted");
			return;
		};

		let hub = Arc::clone(self);
		handle.spawn(async move {
			// A reconnect that landed first already recorded the user online.
			if hub.registry.resolve(&user).is_some() {
				return;
			}
			hub.persist_presence(&user, false).await;
		});
	}
}
