#![forbid(unsafe_code)]

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{MessageId, ParseIdError, RoomId, UserId};

/// Where a message is addressed: exactly one peer or exactly one room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
pub enum MessageTarget {
	Direct(UserId),
	Room(RoomId),
}

impl MessageTarget {
	/// Build a target from the optional receiver/room pair used on the wire and in storage rows.
	pub fn from_parts(receiver: Option<UserId>, room: Option<RoomId>) -> Result<Self, ParseIdError> {
		match (receiver, room) {
			(Some(receiver), None) => Ok(MessageTarget::Direct(receiver)),
			(None, Some(room)) => Ok(MessageTarget::Room(room)),
			(Some(_), Some(_)) => Err(ParseIdError::InvalidFormat(
				"message target has both receiver and room".into(),
			)),
			(None, None) => Err(ParseIdError::InvalidFormat("message target has neither receiver nor room".into())),
		}
	}

	pub fn receiver(&self) -> Option<&UserId> {
		match self {
			MessageTarget::Direct(user) => Some(user),
			MessageTarget::Room(_) => None,
		}
	}

	pub fn room(&self) -> Option<&RoomId> {
		match self {
			MessageTarget::Direct(_) => None,
			MessageTarget::Room(room) => Some(room),
		}
	}

	pub fn is_group(&self) -> bool {
		matches!(self, MessageTarget::Room(_))
	}
}

/// A persisted message as returned by the message store.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Message {
	pub id: MessageId,
	pub sender: UserId,
	pub target: MessageTarget,
	pub content: String,
	pub is_read: bool,
	/// Readers in first-read order; never contains duplicates.
	pub read_by: Vec<UserId>,
	pub created_at_unix_ms: i64,
}

impl Message {
	pub fn receiver(&self) -> Option<&UserId> {
		self.target.receiver()
	}

	pub fn room(&self) -> Option<&RoomId> {
		self.target.room()
	}

	/// Marks the message read by `reader`. Returns `false` if `reader` had already read it.
	pub fn add_reader(&mut self, reader: UserId) -> bool {
		self.is_read = true;
		if self.read_by.contains(&reader) {
			return false;
		}
		self.read_by.push(reader);
		true
	}
}
