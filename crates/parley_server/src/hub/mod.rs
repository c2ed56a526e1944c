#![forbid(unsafe_code)]

//! Live coordination core: who is connected, which rooms they watch, who is typing, and where
//! each outbound event goes.
//!
//! In-memory bookkeeping never suspends; only calls into the [`MessageStore`] do.

mod error;
mod fanout;
mod outbound;
mod presence;
mod receipts;
mod registry;
mod rooms;
mod typing;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parley_domain::{Channel, ClientEvent, ConnId, HistoryQuery, Message, RoomId, ServerEvent, TypingTarget, UserId};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::store::MessageStore;

pub use error::HubError;
pub use outbound::{Delivery, Outbound, OutboundQueues};
pub use registry::{Departed, ReconnectPolicy, Registered, Registry};
pub use rooms::RoomMembership;
pub use typing::{TypingRecord, TypingTracker};

#[derive(Debug, Clone)]
pub struct HubConfig {
	/// Bound of each connection's outbound queue.
	pub outbound_queue_capacity: usize,
	pub reconnect_policy: ReconnectPolicy,
	pub debug_logs: bool,
}

impl Default for HubConfig {
	fn default() -> Self {
		Self {
			outbound_queue_capacity: 256,
			reconnect_policy: ReconnectPolicy::Supersede,
			debug_logs: false,
		}
	}
}

/// Point-in-time counters, served on `/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubStats {
	pub connections: usize,
	pub online_users: usize,
	pub rooms: usize,
	pub typing: usize,
}

/// Successful outcome of a client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
	Ack,
	/// The persisted (or updated) message.
	Message(Message),
	/// Stored messages, oldest first.
	History(Vec<Message>),
}

pub struct Hub {
	cfg: HubConfig,
	next_conn: AtomicU64,
	registry: Registry,
	rooms: RoomMembership,
	typing: TypingTracker,
	outbound: OutboundQueues,
	store: Arc<dyn MessageStore>,
}

impl Hub {
	pub fn new(cfg: HubConfig, store: Arc<dyn MessageStore>) -> Arc<Self> {
		Arc::new(Self {
			registry: Registry::new(cfg.reconnect_policy),
			rooms: RoomMembership::new(),
			typing: TypingTracker::new(),
			outbound: OutboundQueues::new(cfg.outbound_queue_capacity, cfg.debug_logs),
			next_conn: AtomicU64::new(1),
			store,
			cfg,
		})
	}

	pub fn config(&self) -> &HubConfig {
		&self.cfg
	}

	pub fn store(&self) -> &Arc<dyn MessageStore> {
		&self.store
	}

	/// Attach a new connection for `user` and announce it online.
	///
	/// Dropping the returned [`Session`] is the only way to detach; every teardown path goes
	/// through it.
	pub async fn connect(self: &Arc<Self>, user: UserId) -> (Session, mpsc::Receiver<Outbound>) {
		let conn = ConnId(self.next_conn.fetch_add(1, Ordering::Relaxed));
		let rx = self.outbound.attach(conn);

		// Announced under the identity's registry entry so a racing teardown cannot follow it
		// with a stale offline status.
		let registered = self.registry.register_with(&user, conn, |_| {
			self.announce(&user, true);
		});
		for old in &registered.superseded {
			if self.registry.policy() == ReconnectPolicy::CloseSuperseded {
				self.outbound.close(*old, "superseded");
			}
			debug!(conn_id = conn.0, superseded = old.0, user = %user, "hub: connection superseded");
		}

		let session = Session {
			hub: Arc::clone(self),
			conn,
			user: user.clone(),
		};

		info!(conn_id = conn.0, user = %user, "hub: connected");
		self.persist_presence(&user, true).await;

		(session, rx)
	}

	/// Apply one client event on behalf of `conn`.
	pub async fn handle(&self, conn: ConnId, user: &UserId, event: ClientEvent) -> Result<Reply, HubError> {
		metrics::counter!("parley_server_commands_total", "kind" => event.kind()).increment(1);

		match event {
			ClientEvent::Send { content, target } => self.send(conn, user, &content, target).await.map(Reply::Message),
			ClientEvent::JoinRoom(room) => {
				let joined = self.rooms.join(&room, conn);
				if self.cfg.debug_logs {
					debug!(conn_id = conn.0, room = %room, joined, "hub: join room");
				}
				Ok(Reply::Ack)
			}
			ClientEvent::LeaveRoom(room) => {
				let left = self.rooms.leave(&room, conn);
				if self.cfg.debug_logs {
					debug!(conn_id = conn.0, room = %room, left, "hub: leave room");
				}
				Ok(Reply::Ack)
			}
			ClientEvent::Typing(target) => {
				self.start_typing(conn, user, target);
				Ok(Reply::Ack)
			}
			ClientEvent::StopTyping(target) => {
				self.stop_typing(conn, Some(&target));
				Ok(Reply::Ack)
			}
			ClientEvent::MarkRead(id) => self.mark_read(id, user).await.map(Reply::Message),
			ClientEvent::FetchHistory(query) => {
				let messages = match &query {
					HistoryQuery::Conversation(peer) => self.store.conversation(user, peer).await?,
					HistoryQuery::Room(room) => self.store.room_history(room).await?,
				};
				Ok(Reply::History(messages))
			}
		}
	}

	pub fn stats(&self) -> HubStats {
		HubStats {
			connections: self.outbound.len(),
			online_users: self.registry.online_users(),
			rooms: self.rooms.room_count(),
			typing: self.typing.len(),
		}
	}

	/// Current live connections of `user`.
	pub fn connections_of(&self, user: &UserId) -> Vec<ConnId> {
		self.registry.connections_of(user)
	}

	/// Most recent live connection of `user`.
	pub fn resolve(&self, user: &UserId) -> Option<ConnId> {
		self.registry.resolve(user)
	}

	pub fn members_of(&self, room: &RoomId) -> Vec<ConnId> {
		self.rooms.members_of(room)
	}

	pub fn typing_state(&self, conn: ConnId) -> Option<TypingRecord> {
		self.typing.current(conn)
	}

	fn start_typing(&self, conn: ConnId, user: &UserId, target: TypingTarget) {
		let record = TypingRecord {
			user: user.clone(),
			target: target.clone(),
		};

		if let Some(prev) = self.typing.start(conn, user.clone(), target)
			&& prev.target != record.target
		{
			self.emit_typing(conn, &prev, false);
		}
		self.emit_typing(conn, &record, true);
	}

	/// Returns `false` if `conn` was idle. The recorded target wins over `requested`.
	fn stop_typing(&self, conn: ConnId, requested: Option<&TypingTarget>) -> bool {
		let Some(record) = self.typing.stop(conn) else {
			return false;
		};

		if let Some(requested) = requested
			&& *requested != record.target
		{
			debug!(
				conn_id = conn.0,
				requested = requested.id_str(),
				recorded = record.target.id_str(),
				"hub: stop-typing target differs from recorded target"
			);
		}

		self.emit_typing(conn, &record, false);
		true
	}

	fn emit_typing(&self, conn: ConnId, record: &TypingRecord, is_typing: bool) {
		let event = Arc::new(ServerEvent::UserTyping {
			user: record.user.clone(),
			is_typing,
		});

		match &record.target {
			TypingTarget::User(peer) => {
				let conns = self.registry.connections_of(peer);
				if conns.is_empty() {
					routing_miss("typing");
					return;
				}
				self.deliver_direct(&conns, &event);
			}
			TypingTarget::Room(room) => {
				let own = self.registry.connections_of(&record.user);
				let conns: Vec<ConnId> = self
					.rooms
					.members_of(room)
					.into_iter()
					.filter(|c| *c != conn && !own.contains(c))
					.collect();
				self.outbound.deliver_many(&conns, &Channel::Room(room.clone()), &event);
			}
		}
	}

	/// Deliver on each connection's own channel.
	fn deliver_direct(&self, conns: &[ConnId], event: &Arc<ServerEvent>) -> usize {
		conns
			.iter()
			.filter(|c| self.outbound.deliver(**c, &Channel::Conn(**c), event) == Delivery::Queued)
			.count()
	}

	/// Unconditional cleanup for a closing connection. Safe to call more than once.
	fn teardown(self: &Arc<Self>, conn: ConnId) {
		if !self.outbound.detach(conn) {
			return;
		}

		// Typing first: room recipients are resolved from memberships that are removed next.
		self.stop_typing(conn, None);
		let rooms = self.rooms.leave_all(conn);

		let departed = self.registry.unregister_with(conn, |user| {
			self.announce(user, false);
		});
		match departed {
			Some(Departed { user, went_offline }) => {
				info!(conn_id = conn.0, user = %user, rooms = rooms.len(), went_offline, "hub: disconnected");
				if went_offline {
					self.spawn_persist_offline(user);
				}
			}
			None => {
				debug!(conn_id = conn.0, "hub: superseded connection closed");
			}
		}
	}
}

fn routing_miss(kind: &'static str) {
	metrics::counter!("parley_server_routing_miss_total", "kind" => kind).increment(1);
}

/// One live connection attached to the hub. Dropping it tears the connection down.
pub struct Session {
	hub: Arc<Hub>,
	conn: ConnId,
	user: UserId,
}

impl Session {
	pub fn conn_id(&self) -> ConnId {
		self.conn
	}

	pub fn user(&self) -> &UserId {
		&self.user
	}

	pub async fn handle(&self, event: ClientEvent) -> Result<Reply, HubError> {
		self.hub.handle(self.conn, &self.user, event).await
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.hub.teardown(self.conn);
	}
}

#[cfg(test)]
mod hub_tests;
