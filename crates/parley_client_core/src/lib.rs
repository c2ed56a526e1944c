#![forbid(unsafe_code)]

//! QUIC client for the parley server: handshake, typed commands, and the events stream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use bytes::BytesMut;
use parley_domain::{
	Channel, ClientEvent, HistoryQuery, Message, MessageId, MessageTarget, RoomId, ServerEvent, TypingTarget, UserId,
};
use parley_protocol::framing::{DEFAULT_MAX_FRAME_SIZE, FramingError, encode_frame, try_decode_frame_from_buffer};
use parley_protocol::version::PROTOCOL_VERSION_U32;
use parley_protocol::{ConvertError, pb};
use quinn::{ClientConfig as QuinnClientConfig, Endpoint, TransportConfig, VarInt};
use tokio::io::AsyncWriteExt as _;
use tracing::{debug, info, warn};

/// Client session configuration (v1).
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Remote server address.
	pub server_addr: SocketAddr,

	/// TLS server name (SNI).
	pub server_name: String,

	/// Client identifier.
	pub client_name: String,

	/// Client instance id.
	pub client_instance_id: String,

	/// Identity announced in `Hello.user_id`.
	pub user_id: String,

	/// Maximum inbound/outbound frame size.
	pub max_frame_bytes: usize,

	/// Timeout for connect + handshake.
	pub connect_timeout: Duration,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			server_addr: SocketAddr::from(([127, 0, 0, 1], 18303)),
			server_name: "localhost".to_string(),
			client_name: format!("parley-client-core/{}", env!("CARGO_PKG_VERSION")),
			client_instance_id: "dev-instance".to_string(),
			user_id: String::new(),
			max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
			connect_timeout: Duration::from_secs(15),
		}
	}
}

/// Errors for client core operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientCoreError {
	/// QUIC endpoint setup failed.
	#[error("failed to create QUIC endpoint: {0}")]
	Endpoint(String),

	/// Connection establishment failed.
	#[error("failed to connect: {0}")]
	Connect(String),

	/// Protocol framing error.
	#[error(transparent)]
	Framing(#[from] FramingError),

	/// Protocol error (unexpected message ordering/types).
	#[error("protocol error: {0}")]
	Protocol(String),

	/// A server payload did not map onto domain types.
	#[error("invalid payload: {0}")]
	Convert(#[from] ConvertError),

	/// The server rejected the request.
	#[error("server error {code}: {detail}")]
	Server { code: String, detail: String },

	/// IO error.
	#[error("io error: {0}")]
	Io(String),

	/// Other error.
	#[error("error: {0}")]
	Other(String),
}

impl From<anyhow::Error> for ClientCoreError {
	fn from(e: anyhow::Error) -> Self {
		ClientCoreError::Other(format!("{e:#}"))
	}
}

/// A server-pushed event with the channel it was published on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedEvent {
	pub channel: Channel,
	pub event: ServerEvent,
	pub server_time_unix_ms: i64,
}

/// Control half of a session (commands, ping, close).
pub struct SessionControl {
	conn: quinn::Connection,
	control_send: quinn::SendStream,
	control_recv: quinn::RecvStream,
	control_buf: BytesMut,
	max_frame_bytes: usize,
	next_request: u64,
	events_opened: bool,
	// Dropping the endpoint would tear the connection down.
	_endpoint: Endpoint,
}

/// Events reader half of a session.
pub struct SessionEvents {
	events_recv: quinn::RecvStream,
	// Keep the send half alive so the peer doesn't see an immediate FIN.
	_events_send_keepalive: quinn::SendStream,
	buf: BytesMut,
	max_frame_bytes: usize,
}

impl SessionControl {
	/// Connect and perform the v1 handshake.
	pub async fn connect(cfg: ClientConfig) -> Result<(Self, pb::Welcome), ClientCoreError> {
		let endpoint = make_client_endpoint(cfg.server_addr).map_err(|e| ClientCoreError::Endpoint(format!("{e:#}")))?;

		let quinn_cfg = make_insecure_client_config().map_err(|e| ClientCoreError::Endpoint(format!("{e:#}")))?;

		let connect_timeout = cfg.connect_timeout;
		let server_addr = cfg.server_addr;
		let server_name = cfg.server_name.clone();

		let connecting = endpoint
			.connect_with(quinn_cfg, server_addr, &server_name)
			.map_err(|e| ClientCoreError::Connect(format!("connect_with({server_addr}, sni={server_name}): {e}")))?;

		let conn = match tokio::time::timeout(connect_timeout, connecting).await {
			Ok(Ok(c)) => c,
			Ok(Err(e)) => {
				return Err(ClientCoreError::Connect(format!(
					"connect failed (addr={server_addr}, sni={server_name}): {e}"
				)));
			}
			Err(_) => {
				return Err(ClientCoreError::Connect(format!(
					"connect timeout after {connect_timeout:?} (addr={server_addr}, sni={server_name})"
				)));
			}
		};

		info!(remote = %conn.remote_address(), "connected");

		let (mut control_send, mut control_recv) = tokio::time::timeout(connect_timeout, conn.open_bi())
			.await
			.map_err(|_| ClientCoreError::Io(format!("timeout opening control stream after {connect_timeout:?}")))?
			.map_err(|e| ClientCoreError::Io(format!("open_bi(control) failed: {e}")))?;

		let hello = pb::Hello {
			client_name: cfg.client_name,
			client_instance_id: cfg.client_instance_id,
			user_id: cfg.user_id,
		};
		let env = pb::Envelope {
			version: PROTOCOL_VERSION_U32,
			request_id: String::new(),
			msg: Some(pb::envelope::Msg::Hello(hello)),
		};
		write_envelope(&mut control_send, &env, cfg.max_frame_bytes)
			.await
			.map_err(|e| ClientCoreError::Io(format!("send Hello failed: {e}")))?;

		let mut control_buf = BytesMut::with_capacity(8 * 1024);
		let welcome_env = tokio::time::timeout(
			connect_timeout,
			read_one_envelope(&mut control_recv, &mut control_buf, cfg.max_frame_bytes),
		)
		.await
		.map_err(|_| ClientCoreError::Protocol(format!("timeout waiting for Welcome after {connect_timeout:?}")))??;

		let welcome = match welcome_env.msg {
			Some(pb::envelope::Msg::Welcome(w)) => w,
			Some(pb::envelope::Msg::Error(e)) => {
				return Err(ClientCoreError::Server {
					code: e.code,
					detail: e.message,
				});
			}
			other => {
				return Err(ClientCoreError::Protocol(format!("expected Welcome, got {other:?}")));
			}
		};

		debug!(
			server_name = %welcome.server_name,
			server_instance_id = %welcome.server_instance_id,
			max_frame_bytes = welcome.max_frame_bytes,
			conn_id = welcome.conn_id,
			"received Welcome"
		);

		let control = Self {
			conn,
			control_send,
			control_recv,
			control_buf,
			max_frame_bytes: (welcome.max_frame_bytes as usize).min(cfg.max_frame_bytes),
			next_request: 1,
			events_opened: false,
			_endpoint: endpoint,
		};

		Ok((control, welcome))
	}

	/// Send a raw command and await its result. Rejections are returned as results, not errors.
	pub async fn send_command(&mut self, command: pb::Command) -> Result<pb::CommandResult, ClientCoreError> {
		let request_id = format!("req-{}", self.next_request);
		self.next_request += 1;

		let env = pb::Envelope {
			version: PROTOCOL_VERSION_U32,
			request_id: request_id.clone(),
			msg: Some(pb::envelope::Msg::Command(command)),
		};

		write_envelope(&mut self.control_send, &env, self.max_frame_bytes).await?;

		let resp = read_one_envelope(&mut self.control_recv, &mut self.control_buf, self.max_frame_bytes).await?;
		if resp.request_id != request_id {
			return Err(ClientCoreError::Protocol(format!(
				"response for {:?} while waiting for {request_id:?}",
				resp.request_id
			)));
		}
		match resp.msg {
			Some(pb::envelope::Msg::CommandResult(r)) => Ok(r),
			other => Err(ClientCoreError::Protocol(format!("expected CommandResult, got {other:?}"))),
		}
	}

	async fn request(&mut self, event: &ClientEvent) -> Result<pb::CommandResult, ClientCoreError> {
		debug!(kind = event.kind(), "sending command");
		let result = self.send_command(event.into()).await?;
		expect_ok(result)
	}

	async fn request_message(&mut self, event: &ClientEvent) -> Result<Message, ClientCoreError> {
		let result = self.request(event).await?;
		let record = result
			.message
			.ok_or_else(|| ClientCoreError::Protocol("command result carried no message".to_string()))?;
		Ok(Message::try_from(record)?)
	}

	async fn request_history(&mut self, query: HistoryQuery) -> Result<Vec<Message>, ClientCoreError> {
		let result = self.request(&ClientEvent::FetchHistory(query)).await?;
		let messages = result
			.messages
			.into_iter()
			.map(Message::try_from)
			.collect::<Result<Vec<_>, _>>()?;
		Ok(messages)
	}

	pub async fn send_direct(&mut self, receiver: &UserId, content: &str) -> Result<Message, ClientCoreError> {
		self.request_message(&ClientEvent::Send {
			content: content.to_string(),
			target: MessageTarget::Direct(receiver.clone()),
		})
		.await
	}

	pub async fn send_to_room(&mut self, room: &RoomId, content: &str) -> Result<Message, ClientCoreError> {
		self.request_message(&ClientEvent::Send {
			content: content.to_string(),
			target: MessageTarget::Room(room.clone()),
		})
		.await
	}

	pub async fn join_room(&mut self, room: &RoomId) -> Result<(), ClientCoreError> {
		self.request(&ClientEvent::JoinRoom(room.clone())).await.map(|_| ())
	}

	pub async fn leave_room(&mut self, room: &RoomId) -> Result<(), ClientCoreError> {
		self.request(&ClientEvent::LeaveRoom(room.clone())).await.map(|_| ())
	}

	pub async fn typing(&mut self, target: TypingTarget) -> Result<(), ClientCoreError> {
		self.request(&ClientEvent::Typing(target)).await.map(|_| ())
	}

	pub async fn stop_typing(&mut self, target: TypingTarget) -> Result<(), ClientCoreError> {
		self.request(&ClientEvent::StopTyping(target)).await.map(|_| ())
	}

	/// Mark a message read; returns it with the updated reader set.
	pub async fn mark_read(&mut self, id: MessageId) -> Result<Message, ClientCoreError> {
		self.request_message(&ClientEvent::MarkRead(id)).await
	}

	/// Direct messages between this user and `peer`, oldest first.
	pub async fn history_with(&mut self, peer: &UserId) -> Result<Vec<Message>, ClientCoreError> {
		self.request_history(HistoryQuery::Conversation(peer.clone())).await
	}

	pub async fn room_history(&mut self, room: &RoomId) -> Result<Vec<Message>, ClientCoreError> {
		self.request_history(HistoryQuery::Room(room.clone())).await
	}

	/// Send a keepalive ping and await the pong response.
	pub async fn ping(&mut self, client_time_unix_ms: i64) -> Result<pb::Pong, ClientCoreError> {
		let env = pb::Envelope {
			version: PROTOCOL_VERSION_U32,
			request_id: String::new(),
			msg: Some(pb::envelope::Msg::Ping(pb::Ping { client_time_unix_ms })),
		};

		write_envelope(&mut self.control_send, &env, self.max_frame_bytes).await?;

		let resp = read_one_envelope(&mut self.control_recv, &mut self.control_buf, self.max_frame_bytes).await?;
		match resp.msg {
			Some(pb::envelope::Msg::Pong(p)) => Ok(p),
			other => Err(ClientCoreError::Protocol(format!("expected Pong, got {other:?}"))),
		}
	}

	/// Open the events stream. Events published before this are held by the server.
	pub async fn open_events_stream(&mut self) -> Result<SessionEvents, ClientCoreError> {
		if self.events_opened {
			return Err(ClientCoreError::Protocol(
				"events stream already opened; reuse the existing SessionEvents".to_string(),
			));
		}

		debug!("open_events_stream(): opening events stream (client open_bi)");
		let (mut send, recv) = self
			.conn
			.open_bi()
			.await
			.map_err(|e| ClientCoreError::Io(format!("open_bi(events) failed: {e}")))?;

		// Force a STREAM frame so the server observes the stream promptly.
		send.write_all(&[0u8])
			.await
			.map_err(|e| ClientCoreError::Io(format!("failed to write events stream activation byte: {e}")))?;
		send.flush()
			.await
			.map_err(|e| ClientCoreError::Io(format!("failed to flush events stream activation byte: {e}")))?;

		self.events_opened = true;

		Ok(SessionEvents {
			events_recv: recv,
			_events_send_keepalive: send,
			buf: BytesMut::with_capacity(16 * 1024),
			max_frame_bytes: self.max_frame_bytes,
		})
	}

	pub fn close(&self, code: u32, reason: &str) {
		self.conn.close(VarInt::from_u32(code), reason.as_bytes());
	}
}

impl SessionEvents {
	/// Next pushed event; `None` once the server finishes the stream.
	pub async fn next_event(&mut self) -> Result<Option<ReceivedEvent>, ClientCoreError> {
		let mut tmp = [0u8; 8192];

		loop {
			match try_decode_frame_from_buffer::<pb::Envelope>(&mut self.buf, self.max_frame_bytes)? {
				Some(env) => match env.msg {
					Some(pb::envelope::Msg::Event(ev)) => return decode_event(ev).map(Some),
					other => {
						warn!("unexpected message on events stream: {:?}", other);
						continue;
					}
				},
				None => {}
			}

			let n = match self.events_recv.read(&mut tmp).await {
				Ok(Some(n)) => n,
				Ok(None) => {
					info!("events stream closed");
					return Ok(None);
				}
				Err(e) => return Err(ClientCoreError::Io(e.to_string())),
			};

			self.buf.extend_from_slice(&tmp[..n]);
		}
	}

	/// Run the events loop until EOF or error.
	pub async fn run_events_loop<F>(&mut self, mut on_event: F) -> Result<(), ClientCoreError>
	where
		F: FnMut(ReceivedEvent),
	{
		while let Some(ev) = self.next_event().await? {
			debug!(channel = %ev.channel, kind = ev.event.kind(), "events stream decoded");
			on_event(ev);
		}
		Ok(())
	}
}

fn expect_ok(result: pb::CommandResult) -> Result<pb::CommandResult, ClientCoreError> {
	if result.status == pb::command_result::Status::Ok as i32 {
		Ok(result)
	} else {
		Err(ClientCoreError::Server {
			code: result.error_code,
			detail: result.detail,
		})
	}
}

fn decode_event(ev: pb::EventEnvelope) -> Result<ReceivedEvent, ClientCoreError> {
	let channel = Channel::parse(&ev.topic)
		.map_err(|e| ClientCoreError::Protocol(format!("invalid event topic {:?}: {e}", ev.topic)))?;
	let event = ev
		.event
		.ok_or_else(|| ClientCoreError::Protocol("event envelope without event".to_string()))?;

	Ok(ReceivedEvent {
		channel,
		event: ServerEvent::try_from(event)?,
		server_time_unix_ms: ev.server_time_unix_ms,
	})
}

async fn write_envelope(
	send: &mut quinn::SendStream,
	env: &pb::Envelope,
	max_frame_bytes: usize,
) -> Result<(), ClientCoreError> {
	let frame = encode_frame(env, max_frame_bytes).map_err(ClientCoreError::Framing)?;
	send.write_all(&frame).await.map_err(|e| ClientCoreError::Io(e.to_string()))?;
	send.flush().await.map_err(|e| ClientCoreError::Io(e.to_string()))?;
	Ok(())
}

async fn read_one_envelope(
	recv: &mut quinn::RecvStream,
	buf: &mut BytesMut,
	max_frame_bytes: usize,
) -> Result<pb::Envelope, ClientCoreError> {
	let mut tmp = [0u8; 8192];

	loop {
		// Try decoding first in case buffer already has a full frame.
		match try_decode_frame_from_buffer::<pb::Envelope>(buf, max_frame_bytes) {
			Ok(Some(env)) => return Ok(env),
			Ok(None) => {}
			Err(e) => return Err(ClientCoreError::Framing(e)),
		}

		let n = match recv.read(&mut tmp).await {
			Ok(Some(n)) => n,
			Ok(None) => {
				return Err(ClientCoreError::Protocol(
					"stream closed before receiving full message".to_string(),
				));
			}
			Err(e) => return Err(ClientCoreError::Io(e.to_string())),
		};

		buf.extend_from_slice(&tmp[..n]);
	}
}

fn make_client_endpoint(server_addr: SocketAddr) -> anyhow::Result<Endpoint> {
	let bind: SocketAddr = if server_addr.is_ipv6() {
		SocketAddr::from(([0u16; 8], 0))
	} else {
		SocketAddr::from(([0, 0, 0, 0], 0))
	};
	let endpoint = Endpoint::client(bind).context("create client endpoint")?;
	Ok(endpoint)
}

/// Dev-only TLS config that skips server cert validation.
fn make_insecure_client_config() -> anyhow::Result<QuinnClientConfig> {
	let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

	#[derive(Debug)]
	struct NoVerifier;

	impl rustls::client::danger::ServerCertVerifier for NoVerifier {
		fn verify_server_cert(
			&self,
			_end_entity: &rustls::pki_types::CertificateDer<'_>,
			_intermediates: &[rustls::pki_types::CertificateDer<'_>],
			_server_name: &rustls::pki_types::ServerName<'_>,
			_ocsp_response: &[u8],
			_now: rustls::pki_types::UnixTime,
		) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
			Ok(rustls::client::danger::ServerCertVerified::assertion())
		}

		fn verify_tls12_signature(
			&self,
			_message: &[u8],
			_cert: &rustls::pki_types::CertificateDer<'_>,
			_dss: &rustls::DigitallySignedStruct,
		) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
			Err(rustls::Error::General("TLS1.2 not supported".into()))
		}

		fn verify_tls13_signature(
			&self,
			_message: &[u8],
			_cert: &rustls::pki_types::CertificateDer<'_>,
			_dss: &rustls::DigitallySignedStruct,
		) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
			Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
		}

		fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
			vec![
				rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
				rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
				rustls::SignatureScheme::RSA_PSS_SHA256,
				rustls::SignatureScheme::RSA_PSS_SHA384,
				rustls::SignatureScheme::RSA_PSS_SHA512,
				rustls::SignatureScheme::ED25519,
			]
		}
	}

	let mut tls = rustls::ClientConfig::builder()
		.with_root_certificates(rustls::RootCertStore::empty())
		.with_no_client_auth();

	tls.dangerous().set_certificate_verifier(Arc::new(NoVerifier));
	tls.alpn_protocols = vec![parley_protocol::ALPN.to_vec()];

	let quic_tls = quinn::crypto::rustls::QuicClientConfig::try_from(tls)?;

	let mut cfg = QuinnClientConfig::new(Arc::new(quic_tls));

	// Control + events streams, both client-opened.
	let mut transport = TransportConfig::default();
	transport.max_concurrent_bidi_streams(VarInt::from_u32(4));
	transport.max_concurrent_uni_streams(VarInt::from_u32(0));
	transport.keep_alive_interval(Some(Duration::from_secs(15)));
	cfg.transport_config(Arc::new(transport));

	Ok(cfg)
}
