#![forbid(unsafe_code)]

use std::collections::HashSet;

use dashmap::DashMap;
use parley_domain::{ConnId, RoomId};

/// Live room subscriptions, for delivery routing only.
///
/// Keeps a reverse index so a closing connection can leave all of its rooms without scanning.
#[derive(Debug, Default)]
pub struct RoomMembership {
	members: DashMap<RoomId, HashSet<ConnId>>,
	rooms_by_conn: DashMap<ConnId, HashSet<RoomId>>,
}

impl RoomMembership {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns `false` if `conn` was already a member.
	pub fn join(&self, room: &RoomId, conn: ConnId) -> bool {
		let inserted = self.members.entry(room.clone()).or_default().insert(conn);
		if inserted {
			self.rooms_by_conn.entry(conn).or_default().insert(room.clone());
		}
		inserted
	}

	/// Returns `false` if `conn` was not a member.
	pub fn leave(&self, room: &RoomId, conn: ConnId) -> bool {
		let removed = self
			.members
			.get_mut(room)
			.map(|mut set| set.remove(&conn))
			.unwrap_or(false);

		if removed {
			self.members.remove_if(room, |_, set| set.is_empty());
			if let Some(mut rooms) = self.rooms_by_conn.get_mut(&conn) {
				rooms.remove(room);
			}
			self.rooms_by_conn.remove_if(&conn, |_, rooms| rooms.is_empty());
		}
		removed
	}

	/// Remove `conn` from every room it joined; returns those rooms.
	pub fn leave_all(&self, conn: ConnId) -> Vec<RoomId> {
		let Some((_, rooms)) = self.rooms_by_conn.remove(&conn) else {
			return Vec::new();
		};

		for room in &rooms {
			if let Some(mut set) = self.members.get_mut(room) {
				set.remove(&conn);
			}
			self.members.remove_if(room, |_, set| set.is_empty());
		}

		rooms.into_iter().collect()
	}

	/// Current members of `room`; empty if nobody is subscribed.
	pub fn members_of(&self, room: &RoomId) -> Vec<ConnId> {
		self.members
			.get(room)
			.map(|set| set.iter().copied().collect())
			.unwrap_or_default()
	}

	pub fn is_member(&self, room: &RoomId, conn: ConnId) -> bool {
		self.members.get(room).is_some_and(|set| set.contains(&conn))
	}

	pub fn room_count(&self) -> usize {
		self.members.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn room(id: &str) -> RoomId {
		RoomId::new(id).unwrap()
	}

	#[test]
	fn join_and_leave_are_idempotent() {
		let rooms = RoomMembership::new();
		let g = room("g");

		assert!(rooms.join(&g, ConnId(1)));
		assert!(!rooms.join(&g, ConnId(1)));
		assert_eq!(rooms.members_of(&g), vec![ConnId(1)]);

		assert!(rooms.leave(&g, ConnId(1)));
		assert!(!rooms.leave(&g, ConnId(1)));
		assert!(rooms.members_of(&g).is_empty());
		assert_eq!(rooms.room_count(), 0, "empty rooms are dropped");
	}

	#[test]
	fn leave_all_clears_every_room_of_a_connection() {
		let rooms = RoomMembership::new();
		let (a, b) = (room("a"), room("b"));

		rooms.join(&a, ConnId(1));
		rooms.join(&b, ConnId(1));
		rooms.join(&b, ConnId(2));

		let mut left = rooms.leave_all(ConnId(1));
		left.sort();
		assert_eq!(left, vec![a.clone(), b.clone()]);

		assert!(!rooms.is_member(&a, ConnId(1)));
		assert_eq!(rooms.members_of(&b), vec![ConnId(2)]);
		assert_eq!(rooms.room_count(), 1);
		assert!(rooms.leave_all(ConnId(1)).is_empty());
	}
}
