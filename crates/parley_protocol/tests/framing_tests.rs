use bytes::BytesMut;
use parley_domain::{ClientEvent, HistoryQuery, ServerEvent, TypingTarget, UserId};
use parley_protocol::pb::{self, envelope::Msg};
use parley_protocol::version::PROTOCOL_VERSION_U32;
use parley_protocol::{
	DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_LEN, FramingError, decode_frame, encode_frame, encode_frame_into,
	try_decode_frame_from_buffer,
};

fn command_envelope(request_id: &str, ev: &ClientEvent) -> pb::Envelope {
	pb::Envelope {
		version: PROTOCOL_VERSION_U32,
		request_id: request_id.to_string(),
		msg: Some(Msg::Command(ev.into())),
	}
}

#[test]
fn command_survives_framing() {
	let ev = ClientEvent::Typing(TypingTarget::User(UserId::new("bob").unwrap()));
	let env = command_envelope("req-1", &ev);

	let frame = encode_frame(&env, DEFAULT_MAX_FRAME_SIZE).expect("encode");
	let (decoded, consumed) = decode_frame::<pb::Envelope>(&frame, DEFAULT_MAX_FRAME_SIZE).expect("decode");
	assert_eq!(consumed, frame.len());
	assert_eq!(decoded.request_id, "req-1");

	let Some(Msg::Command(cmd)) = decoded.msg else {
		panic!("expected command");
	};
	assert_eq!(ClientEvent::try_from(cmd).expect("convert"), ev);
}

#[test]
fn incremental_buffer_yields_frames_in_order() {
	let first = command_envelope(
		"a",
		&ClientEvent::FetchHistory(HistoryQuery::Conversation(UserId::new("bob").unwrap())),
	);
	let second = pb::Envelope {
		version: PROTOCOL_VERSION_U32,
		request_id: "b".into(),
		msg: Some(Msg::Ping(pb::Ping { client_time_unix_ms: 5 })),
	};

	let mut wire = BytesMut::new();
	encode_frame_into(&mut wire, &first, DEFAULT_MAX_FRAME_SIZE).expect("encode first");
	encode_frame_into(&mut wire, &second, DEFAULT_MAX_FRAME_SIZE).expect("encode second");

	// Feed the stream two bytes at a time like a slow reader would.
	let mut buf = BytesMut::new();
	let mut out = Vec::new();
	for chunk in wire.chunks(2) {
		buf.extend_from_slice(chunk);
		while let Some(env) = try_decode_frame_from_buffer::<pb::Envelope>(&mut buf, DEFAULT_MAX_FRAME_SIZE).expect("ok") {
			out.push(env);
		}
	}

	assert_eq!(out, vec![first, second]);
	assert!(buf.is_empty());
}

#[test]
fn event_envelope_carries_topic() {
	let ev = ServerEvent::UserStatus {
		user: UserId::new("alice").unwrap(),
		is_online: true,
	};
	let env = pb::Envelope {
		version: PROTOCOL_VERSION_U32,
		request_id: String::new(),
		msg: Some(Msg::Event(pb::EventEnvelope {
			topic: "presence".into(),
			server_time_unix_ms: 1,
			event: Some((&ev).into()),
		})),
	};

	let frame = encode_frame(&env, DEFAULT_MAX_FRAME_SIZE).expect("encode");
	let (decoded, _) = decode_frame::<pb::Envelope>(&frame, DEFAULT_MAX_FRAME_SIZE).expect("decode");
	let Some(Msg::Event(event)) = decoded.msg else {
		panic!("expected event");
	};
	assert_eq!(event.topic, "presence");
	assert_eq!(ServerEvent::try_from(event.event.expect("event body")).expect("convert"), ev);
}

#[test]
fn oversized_frames_are_rejected_both_ways() {
	let env = pb::Envelope {
		version: PROTOCOL_VERSION_U32,
		request_id: "x".repeat(128),
		msg: None,
	};
	assert!(matches!(encode_frame(&env, 32), Err(FramingError::FrameTooLarge { .. })));

	let mut buf = BytesMut::new();
	buf.extend_from_slice(&(DEFAULT_MAX_FRAME_SIZE as u32 + 1).to_be_bytes());
	assert!(matches!(
		try_decode_frame_from_buffer::<pb::Envelope>(&mut buf, DEFAULT_MAX_FRAME_SIZE),
		Err(FramingError::FrameTooLarge { .. })
	));
	assert_eq!(buf.len(), FRAME_HEADER_LEN);
}
