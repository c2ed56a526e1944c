#![forbid(unsafe_code)]

use std::sync::Arc;

use dashmap::DashMap;
use parley_domain::{Channel, ConnId, ServerEvent};
use tokio::sync::mpsc;
use tracing::debug;

/// Items queued for one connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
	Event { channel: Channel, event: Arc<ServerEvent> },
	/// The connection was superseded and should be closed by its writer.
	Close { reason: &'static str },
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
	Queued,
	/// Queue full; the event was dropped for this connection only.
	Dropped,
	/// No live queue for the connection.
	Miss,
}

/// Per-connection bounded outbound queues.
///
/// Delivery never waits: a full or closed queue only affects its own connection.
#[derive(Debug)]
pub struct OutboundQueues {
	capacity: usize,
	senders: DashMap<ConnId, mpsc::Sender<Outbound>>,
	debug_logs: bool,
}

impl OutboundQueues {
	pub fn new(capacity: usize, debug_logs: bool) -> Self {
		Self {
			capacity: capacity.max(1),
			senders: DashMap::new(),
			debug_logs,
		}
	}

	pub fn attach(&self, conn: ConnId) -> mpsc::Receiver<Outbound> {
		let (tx, rx) = mpsc::channel(self.capacity);
		self.senders.insert(conn, tx);
		rx
	}

	/// Returns `false` if `conn` had no queue.
	pub fn detach(&self, conn: ConnId) -> bool {
		self.senders.remove(&conn).is_some()
	}

	pub fn deliver(&self, conn: ConnId, channel: &Channel, event: &Arc<ServerEvent>) -> Delivery {
		let Some(tx) = self.senders.get(&conn).map(|s| s.clone()) else {
			return Delivery::Miss;
		};

		match tx.try_send(Outbound::Event {
			channel: channel.clone(),
			event: Arc::clone(event),
		}) {
			Ok(()) => {
				metrics::counter!("parley_server_deliveries_total").increment(1);
				Delivery::Queued
			}
			Err(mpsc::error::TrySendError::Full(_)) => {
				metrics::counter!("parley_server_deliveries_dropped_total", "reason" => "queue_full").increment(1);
				if self.debug_logs {
					debug!(conn_id = conn.0, %channel, kind = event.kind(), "outbound: dropped, queue full");
				}
				Delivery::Dropped
			}
			Err(mpsc::error::TrySendError::Closed(_)) => {
				// The queue stays attached until the session detaches it; teardown keys off that.
				metrics::counter!("parley_server_deliveries_dropped_total", "reason" => "closed").increment(1);
				Delivery::Miss
			}
		}
	}

	/// Deliver to each connection in `conns`; returns how many were queued.
	pub fn deliver_many(&self, conns: &[ConnId], channel: &Channel, event: &Arc<ServerEvent>) -> usize {
		let mut queued = 0;
		for conn in conns {
			if self.deliver(*conn, channel, event) == Delivery::Queued {
				queued += 1;
			}
		}

		if self.debug_logs {
			debug!(%channel, kind = event.kind(), targets = conns.len(), queued, "outbound: fanned out");
		}
		queued
	}

	pub fn len(&self) -> usize {
		self.senders.len()
	}

	pub fn is_empty(&self) -> bool {
		self.senders.is_empty()
	}

	pub fn close(&self, conn: ConnId, reason: &'static str) {
		if let Some(tx) = self.senders.get(&conn).map(|s| s.clone()) {
			// A full queue still closes: the writer sees the channel end once the hub detaches it.
			let _ = tx.try_send(Outbound::Close { reason });
		}
	}
}
