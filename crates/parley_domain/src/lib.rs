#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod event;
mod message;

pub use event::{ClientEvent, HistoryQuery, ServerEvent, TypingTarget};
pub use message::{Message, MessageTarget};

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

/// Stable user identity issued by the account service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct UserId(String);

impl UserId {
	/// Create a non-empty `UserId`.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(id))
	}
	pub fn as_str(&self) -> &str {
		&self.0
	}
	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for UserId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for UserId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		UserId::new(s.to_string())
	}
}

/// Group (room) identifier owned by the group service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct RoomId(String);

impl RoomId {
	/// Create a non-empty `RoomId`.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(id))
	}
	pub fn as_str(&self) -> &str {
		&self.0
	}
	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for RoomId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for RoomId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		RoomId::new(s.to_string())
	}
}

/// Store-assigned message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct MessageId(pub uuid::Uuid);

impl MessageId {
	/// Create a new random message id.
	pub fn new_v4() -> Self {
		Self(uuid::Uuid::new_v4())
	}
}

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for MessageId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}
		uuid::Uuid::parse_str(s)
			.map(Self)
			.map_err(|e| ParseIdError::InvalidFormat(format!("message id: {e}")))
	}
}

/// Handle of one live transport connection. Unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Delivery channel an outbound event was routed through.
///
/// Room channels are namespaced so they never collide with per-connection delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
	/// Process-wide presence announcements.
	Presence,
	/// Events fanned out to the subscribers of a room.
	Room(RoomId),
	/// Events addressed to one connection.
	Conn(ConnId),
}

impl Channel {
	pub const PRESENCE: &'static str = "presence";
	pub const ROOM_PREFIX: &'static str = "room:";
	pub const CONN_PREFIX: &'static str = "conn:";

	/// Parse a channel name (`presence`, `room:<id>` or `conn:<n>`).
	pub fn parse(s: &str) -> Result<Self, ParseIdError> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}

		if s == Self::PRESENCE {
			return Ok(Channel::Presence);
		}

		if let Some(room) = s.strip_prefix(Self::ROOM_PREFIX) {
			return Ok(Channel::Room(RoomId::new(room.to_string())?));
		}

		if let Some(conn) = s.strip_prefix(Self::CONN_PREFIX) {
			let n = conn
				.parse::<u64>()
				.map_err(|_| ParseIdError::InvalidFormat(format!("expected conn:<number>, got {s}")))?;
			return Ok(Channel::Conn(ConnId(n)));
		}

		Err(ParseIdError::InvalidFormat(format!(
			"expected presence, room:<id> or conn:<n>, got {s}"
		)))
	}
}

impl fmt::Display for Channel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Channel::Presence => f.write_str(Self::PRESENCE),
			Channel::Room(room) => write!(f, "{}{}", Self::ROOM_PREFIX, room),
			Channel::Conn(conn) => write!(f, "{}{}", Self::CONN_PREFIX, conn),
		}
	}
}

impl FromStr for Channel {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Channel::parse(s)
	}
}
