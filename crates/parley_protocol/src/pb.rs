#![forbid(unsafe_code)]

//! Wire messages (`parley.v1`).
//!
//! Declared directly with the `prost` derives; field tags are part of the wire contract and must
//! never be reused.

/// Top-level frame payload on both the control and the events stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
	#[prost(uint32, tag = "1")]
	pub version: u32,
	/// Echoed by the server on the matching `CommandResult`/`Pong`.
	#[prost(string, tag = "2")]
	pub request_id: ::prost::alloc::string::String,
	#[prost(oneof = "envelope::Msg", tags = "10, 11, 12, 13, 14, 15, 16, 17")]
	pub msg: ::core::option::Option<envelope::Msg>,
}

pub mod envelope {
	#[derive(Clone, PartialEq, ::prost::Oneof)]
	pub enum Msg {
		#[prost(message, tag = "10")]
		Hello(super::Hello),
		#[prost(message, tag = "11")]
		Welcome(super::Welcome),
		#[prost(message, tag = "12")]
		Ping(super::Ping),
		#[prost(message, tag = "13")]
		Pong(super::Pong),
		#[prost(message, tag = "14")]
		Command(super::Command),
		#[prost(message, tag = "15")]
		CommandResult(super::CommandResult),
		#[prost(message, tag = "16")]
		Event(super::EventEnvelope),
		#[prost(message, tag = "17")]
		Error(super::Error),
	}
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Hello {
	#[prost(string, tag = "1")]
	pub client_name: ::prost::alloc::string::String,
	#[prost(string, tag = "2")]
	pub client_instance_id: ::prost::alloc::string::String,
	/// Identity issued by the account service; required.
	#[prost(string, tag = "3")]
	pub user_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Welcome {
	#[prost(string, tag = "1")]
	pub server_name: ::prost::alloc::string::String,
	#[prost(string, tag = "2")]
	pub server_instance_id: ::prost::alloc::string::String,
	#[prost(int64, tag = "3")]
	pub server_time_unix_ms: i64,
	#[prost(uint32, tag = "4")]
	pub max_frame_bytes: u32,
	#[prost(uint64, tag = "5")]
	pub conn_id: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ping {
	#[prost(int64, tag = "1")]
	pub client_time_unix_ms: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Pong {
	#[prost(int64, tag = "1")]
	pub client_time_unix_ms: i64,
	#[prost(int64, tag = "2")]
	pub server_time_unix_ms: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
	#[prost(string, tag = "1")]
	pub code: ::prost::alloc::string::String,
	#[prost(string, tag = "2")]
	pub message: ::prost::alloc::string::String,
	#[prost(string, tag = "3")]
	pub request_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Command {
	#[prost(oneof = "command::Kind", tags = "1, 2, 3, 4, 5, 6, 7")]
	pub kind: ::core::option::Option<command::Kind>,
}

pub mod command {
	#[derive(Clone, PartialEq, ::prost::Oneof)]
	pub enum Kind {
		#[prost(message, tag = "1")]
		SendMessage(super::SendMessage),
		#[prost(message, tag = "2")]
		JoinRoom(super::JoinRoom),
		#[prost(message, tag = "3")]
		LeaveRoom(super::LeaveRoom),
		#[prost(message, tag = "4")]
		Typing(super::Typing),
		#[prost(message, tag = "5")]
		StopTyping(super::Typing),
		#[prost(message, tag = "6")]
		MarkRead(super::MarkRead),
		#[prost(message, tag = "7")]
		FetchHistory(super::FetchHistory),
	}
}

/// Exactly one of `receiver_id` / `room_id` must be non-empty.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SendMessage {
	#[prost(string, tag = "1")]
	pub content: ::prost::alloc::string::String,
	#[prost(string, tag = "2")]
	pub receiver_id: ::prost::alloc::string::String,
	#[prost(string, tag = "3")]
	pub room_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JoinRoom {
	#[prost(string, tag = "1")]
	pub room_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LeaveRoom {
	#[prost(string, tag = "1")]
	pub room_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Typing {
	/// Peer user id, or room id when `is_group` is set.
	#[prost(string, tag = "1")]
	pub target_id: ::prost::alloc::string::String,
	#[prost(bool, tag = "2")]
	pub is_group: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MarkRead {
	#[prost(string, tag = "1")]
	pub message_id: ::prost::alloc::string::String,
}

/// Exactly one of `peer_id` / `room_id` must be non-empty.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FetchHistory {
	#[prost(string, tag = "1")]
	pub peer_id: ::prost::alloc::string::String,
	#[prost(string, tag = "2")]
	pub room_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandResult {
	#[prost(enumeration = "command_result::Status", tag = "1")]
	pub status: i32,
	/// Set for `SendMessage` and `MarkRead`.
	#[prost(message, optional, tag = "2")]
	pub message: ::core::option::Option<MessageRecord>,
	/// Set for `FetchHistory`, oldest first.
	#[prost(message, repeated, tag = "3")]
	pub messages: ::prost::alloc::vec::Vec<MessageRecord>,
	#[prost(string, tag = "4")]
	pub error_code: ::prost::alloc::string::String,
	#[prost(string, tag = "5")]
	pub detail: ::prost::alloc::string::String,
}

pub mod command_result {
	#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
	#[repr(i32)]
	pub enum Status {
		Unspecified = 0,
		Ok = 1,
		Error = 2,
	}
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageRecord {
	#[prost(string, tag = "1")]
	pub id: ::prost::alloc::string::String,
	#[prost(string, tag = "2")]
	pub sender_id: ::prost::alloc::string::String,
	#[prost(string, tag = "3")]
	pub receiver_id: ::prost::alloc::string::String,
	#[prost(string, tag = "4")]
	pub room_id: ::prost::alloc::string::String,
	#[prost(string, tag = "5")]
	pub content: ::prost::alloc::string::String,
	#[prost(bool, tag = "6")]
	pub is_read: bool,
	#[prost(string, repeated, tag = "7")]
	pub read_by: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
	#[prost(int64, tag = "8")]
	pub created_at_unix_ms: i64,
}

/// Server-pushed event, delivered on the events stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventEnvelope {
	/// Channel the event was routed through (`presence`, `room:<id>`, `conn:<n>`).
	#[prost(string, tag = "1")]
	pub topic: ::prost::alloc::string::String,
	#[prost(int64, tag = "2")]
	pub server_time_unix_ms: i64,
	#[prost(oneof = "event_envelope::Event", tags = "10, 11, 12, 13")]
	pub event: ::core::option::Option<event_envelope::Event>,
}

pub mod event_envelope {
	#[derive(Clone, PartialEq, ::prost::Oneof)]
	pub enum Event {
		#[prost(message, tag = "10")]
		UserStatus(super::UserStatus),
		#[prost(message, tag = "11")]
		NewMessage(super::MessageRecord),
		#[prost(message, tag = "12")]
		UserTyping(super::UserTyping),
		#[prost(message, tag = "13")]
		MessageRead(super::MessageRecord),
	}
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserStatus {
	#[prost(string, tag = "1")]
	pub user_id: ::prost::alloc::string::String,
	#[prost(bool, tag = "2")]
	pub is_online: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserTyping {
	#[prost(string, tag = "1")]
	pub user_id: ::prost::alloc::string::String,
	#[prost(bool, tag = "2")]
	pub is_typing: bool,
}
