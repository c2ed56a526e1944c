#![forbid(unsafe_code)]

use dashmap::DashMap;
use parley_domain::{ConnId, TypingTarget, UserId};

/// An in-progress "typing toward target" state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingRecord {
	pub user: UserId,
	pub target: TypingTarget,
}

/// At most one `TypingRecord` per connection.
#[derive(Debug, Default)]
pub struct TypingTracker {
	records: DashMap<ConnId, TypingRecord>,
}

impl TypingTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record `conn` as typing toward `target`, returning the record it replaced.
	pub fn start(&self, conn: ConnId, user: UserId, target: TypingTarget) -> Option<TypingRecord> {
		self.records.insert(conn, TypingRecord { user, target })
	}

	/// Move `conn` back to idle. `None` if it was already idle.
	pub fn stop(&self, conn: ConnId) -> Option<TypingRecord> {
		self.records.remove(&conn).map(|(_, rec)| rec)
	}

	pub fn current(&self, conn: ConnId) -> Option<TypingRecord> {
		self.records.get(&conn).map(|r| r.clone())
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}
}
