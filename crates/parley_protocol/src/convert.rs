#![forbid(unsafe_code)]

use parley_domain::{
	ClientEvent, HistoryQuery, Message, MessageId, MessageTarget, ParseIdError, RoomId, ServerEvent, TypingTarget, UserId,
};
use thiserror::Error;

use crate::pb;

#[derive(Debug, Error)]
pub enum ConvertError {
	#[error("missing field: {0}")]
	MissingField(&'static str),

	#[error("invalid id: {0}")]
	InvalidId(#[from] ParseIdError),
}

fn opt_user(s: &str) -> Result<Option<UserId>, ParseIdError> {
	if s.trim().is_empty() {
		Ok(None)
	} else {
		UserId::new(s).map(Some)
	}
}

fn opt_room(s: &str) -> Result<Option<RoomId>, ParseIdError> {
	if s.trim().is_empty() {
		Ok(None)
	} else {
		RoomId::new(s).map(Some)
	}
}

impl From<&Message> for pb::MessageRecord {
	fn from(m: &Message) -> Self {
		pb::MessageRecord {
			id: m.id.to_string(),
			sender_id: m.sender.to_string(),
			receiver_id: m.receiver().map(ToString::to_string).unwrap_or_default(),
			room_id: m.room().map(ToString::to_string).unwrap_or_default(),
			content: m.content.clone(),
			is_read: m.is_read,
			read_by: m.read_by.iter().map(ToString::to_string).collect(),
			created_at_unix_ms: m.created_at_unix_ms,
		}
	}
}

impl TryFrom<pb::MessageRecord> for Message {
	type Error = ConvertError;

	fn try_from(r: pb::MessageRecord) -> Result<Self, Self::Error> {
		let read_by = r
			.read_by
			.into_iter()
			.map(UserId::new)
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Message {
			id: r.id.parse::<MessageId>()?,
			sender: UserId::new(r.sender_id)?,
			target: MessageTarget::from_parts(opt_user(&r.receiver_id)?, opt_room(&r.room_id)?)?,
			content: r.content,
			is_read: r.is_read,
			read_by,
			created_at_unix_ms: r.created_at_unix_ms,
		})
	}
}

impl TryFrom<pb::Command> for ClientEvent {
	type Error = ConvertError;

	fn try_from(cmd: pb::Command) -> Result<Self, Self::Error> {
		use pb::command::Kind;

		let kind = cmd.kind.ok_or(ConvertError::MissingField("command.kind"))?;
		let event = match kind {
			Kind::SendMessage(m) => ClientEvent::Send {
				target: MessageTarget::from_parts(opt_user(&m.receiver_id)?, opt_room(&m.room_id)?)?,
				content: m.content,
			},
			Kind::JoinRoom(j) => ClientEvent::JoinRoom(RoomId::new(j.room_id)?),
			Kind::LeaveRoom(l) => ClientEvent::LeaveRoom(RoomId::new(l.room_id)?),
			Kind::Typing(t) => ClientEvent::Typing(TypingTarget::from_wire(&t.target_id, t.is_group)?),
			Kind::StopTyping(t) => ClientEvent::StopTyping(TypingTarget::from_wire(&t.target_id, t.is_group)?),
			Kind::MarkRead(r) => ClientEvent::MarkRead(r.message_id.parse()?),
			Kind::FetchHistory(h) => match (opt_user(&h.peer_id)?, opt_room(&h.room_id)?) {
				(Some(peer), None) => ClientEvent::FetchHistory(HistoryQuery::Conversation(peer)),
				(None, Some(room)) => ClientEvent::FetchHistory(HistoryQuery::Room(room)),
				_ => {
					return Err(ParseIdError::InvalidFormat("history query needs exactly one of peer or room".into()).into());
				}
			},
		};
		Ok(event)
	}
}

fn typing_pb(target: &TypingTarget) -> pb::Typing {
	pb::Typing {
		target_id: target.id_str().to_string(),
		is_group: target.is_group(),
	}
}

impl From<&ClientEvent> for pb::Command {
	fn from(ev: &ClientEvent) -> Self {
		use pb::command::Kind;

		let kind = match ev {
			ClientEvent::Send { content, target } => Kind::SendMessage(pb::SendMessage {
				content: content.clone(),
				receiver_id: target.receiver().map(ToString::to_string).unwrap_or_default(),
				room_id: target.room().map(ToString::to_string).unwrap_or_default(),
			}),
			ClientEvent::JoinRoom(room) => Kind::JoinRoom(pb::JoinRoom {
				room_id: room.to_string(),
			}),
			ClientEvent::LeaveRoom(room) => Kind::LeaveRoom(pb::LeaveRoom {
				room_id: room.to_string(),
			}),
			ClientEvent::Typing(target) => Kind::Typing(typing_pb(target)),
			ClientEvent::StopTyping(target) => Kind::StopTyping(typing_pb(target)),
			ClientEvent::MarkRead(id) => Kind::MarkRead(pb::MarkRead {
				message_id: id.to_string(),
			}),
			ClientEvent::FetchHistory(HistoryQuery::Conversation(peer)) => Kind::FetchHistory(pb::FetchHistory {
				peer_id: peer.to_string(),
				room_id: String::new(),
			}),
			ClientEvent::FetchHistory(HistoryQuery::Room(room)) => Kind::FetchHistory(pb::FetchHistory {
				peer_id: String::new(),
				room_id: room.to_string(),
			}),
		};
		pb::Command { kind: Some(kind) }
	}
}

impl From<&ServerEvent> for pb::event_envelope::Event {
	fn from(ev: &ServerEvent) -> Self {
		use pb::event_envelope::Event;

		match ev {
			ServerEvent::UserStatus { user, is_online } => Event::UserStatus(pb::UserStatus {
				user_id: user.to_string(),
				is_online: *is_online,
			}),
			ServerEvent::NewMessage { message } => Event::NewMessage(message.into()),
			ServerEvent::UserTyping { user, is_typing } => Event::UserTyping(pb::UserTyping {
				user_id: user.to_string(),
				is_typing: *is_typing,
			}),
			ServerEvent::MessageRead { message } => Event::MessageRead(message.into()),
		}
	}
}

impl TryFrom<pb::event_envelope::Event> for ServerEvent {
	type Error = ConvertError;

	fn try_from(ev: pb::event_envelope::Event) -> Result<Self, Self::Error> {
		use pb::event_envelope::Event;

		Ok(match ev {
			Event::UserStatus(s) => ServerEvent::UserStatus {
				user: UserId::new(s.user_id)?,
				is_online: s.is_online,
			},
			Event::NewMessage(m) => ServerEvent::NewMessage { message: m.try_into()? },
			Event::UserTyping(t) => ServerEvent::UserTyping {
				user: UserId::new(t.user_id)?,
				is_typing: t.is_typing,
			},
			Event::MessageRead(m) => ServerEvent::MessageRead { message: m.try_into()? },
		})
	}
}
