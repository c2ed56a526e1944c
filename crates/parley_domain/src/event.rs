#![forbid(unsafe_code)]

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Message, MessageId, MessageTarget, ParseIdError, RoomId, UserId};

/// Who a typing indicator is shown to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
pub enum TypingTarget {
	User(UserId),
	Room(RoomId),
}

impl TypingTarget {
	/// Parse the `(target, is_group)` pair clients send.
	pub fn from_wire(target: &str, is_group: bool) -> Result<Self, ParseIdError> {
		if is_group {
			Ok(TypingTarget::Room(RoomId::new(target.to_string())?))
		} else {
			Ok(TypingTarget::User(UserId::new(target.to_string())?))
		}
	}

	pub fn is_group(&self) -> bool {
		matches!(self, TypingTarget::Room(_))
	}

	pub fn id_str(&self) -> &str {
		match self {
			TypingTarget::User(user) => user.as_str(),
			TypingTarget::Room(room) => room.as_str(),
		}
	}
}

/// Which stored messages a history fetch returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryQuery {
	/// Direct messages between the caller and this peer, both directions.
	Conversation(UserId),
	Room(RoomId),
}

/// Events a connected client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
	Send { content: String, target: MessageTarget },
	JoinRoom(RoomId),
	LeaveRoom(RoomId),
	Typing(TypingTarget),
	StopTyping(TypingTarget),
	MarkRead(MessageId),
	FetchHistory(HistoryQuery),
}

impl ClientEvent {
	/// Stable name used for logs and metric labels.
	pub const fn kind(&self) -> &'static str {
		match self {
			ClientEvent::Send { .. } => "send",
			ClientEvent::JoinRoom(_) => "join_room",
			ClientEvent::LeaveRoom(_) => "leave_room",
			ClientEvent::Typing(_) => "typing",
			ClientEvent::StopTyping(_) => "stop_typing",
			ClientEvent::MarkRead(_) => "mark_read",
			ClientEvent::FetchHistory(_) => "fetch_history",
		}
	}
}

/// Events the server pushes to connections.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(tag = "type", rename_all = "snake_case"))]
pub enum ServerEvent {
	UserStatus { user: UserId, is_online: bool },
	NewMessage { message: Message },
	UserTyping { user: UserId, is_typing: bool },
	MessageRead { message: Message },
}

impl ServerEvent {
	pub const fn kind(&self) -> &'static str {
		match self {
			ServerEvent::UserStatus { .. } => "user_status",
			ServerEvent::NewMessage { .. } => "new_message",
			ServerEvent::UserTyping { .. } => "user_typing",
			ServerEvent::MessageRead { .. } => "message_read",
		}
	}
}
