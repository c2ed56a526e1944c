#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use parley_domain::{ClientEvent, ConnId, UserId};
use parley_protocol::framing::{DEFAULT_MAX_FRAME_SIZE, encode_frame};
use parley_protocol::version::PROTOCOL_VERSION_U32;
use parley_protocol::{codes, pb};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clock::unix_ms_now;
use crate::hub::{Hub, HubError, Outbound, Reply, Session};

const REJECT_LINGER: std::time::Duration = std::time::Duration::from_secs(2);

/// Per-connection server settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
	pub max_frame_bytes: usize,

	/// Reported in `Welcome.server_instance_id`.
	pub server_instance_id: String,

	/// Events held back until the client opens its events stream.
	pub pending_events_limit: usize,
}

impl Default for ConnectionSettings {
	fn default() -> Self {
		Self {
			max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
			server_instance_id: "parley".to_string(),
			pending_events_limit: 256,
		}
	}
}

/// Drive one QUIC connection: handshake, command loop, and the events writer.
///
/// The hub session lives exactly as long as this function; returning from it (for any reason)
/// tears the connection down in the hub.
pub async fn handle_connection(
	connection: quinn::Connection,
	hub: Arc<Hub>,
	settings: ConnectionSettings,
) -> anyhow::Result<()> {
	struct ConnectionGaugeGuard;
	impl Drop for ConnectionGaugeGuard {
		fn drop(&mut self) {
			metrics::gauge!("parley_server_active_connections").decrement(1.0);
		}
	}

	metrics::gauge!("parley_server_active_connections").increment(1.0);
	let _conn_guard = ConnectionGaugeGuard;

	let remote = connection.remote_address();
	let (mut control_send, control_recv) = connection
		.accept_bi()
		.await
		.context("accept control bidirectional stream")?;

	let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<pb::Envelope>();
	let reader_task = tokio::spawn(read_control_frames(control_recv, ctrl_tx, settings.max_frame_bytes));

	let hello = match wait_for_hello(&mut ctrl_rx).await {
		Ok(hello) => hello,
		Err(e) => {
			reader_task.abort();
			return Err(e);
		}
	};

	let user = match UserId::new(hello.user_id.clone()) {
		Ok(user) => user,
		Err(e) => {
			warn!(%remote, client_name = %hello.client_name, error = %e, "rejecting Hello without a usable user id");
			send_envelope(
				&mut control_send,
				pb::Envelope {
					version: PROTOCOL_VERSION_U32,
					request_id: String::new(),
					msg: Some(pb::envelope::Msg::Error(pb::Error {
						code: codes::UNAUTHENTICATED.to_string(),
						message: "hello.user_id is required".to_string(),
						request_id: String::new(),
					})),
				},
				settings.max_frame_bytes,
			)
			.await
			.ok();
			let _ = control_send.finish();
			reader_task.abort();
			// Give the client a moment to read the error before the connection is dropped.
			let _ = tokio::time::timeout(REJECT_LINGER, connection.closed()).await;
			return Ok(());
		}
	};

	info!(
		%remote,
		client_name = %hello.client_name,
		client_instance_id = %hello.client_instance_id,
		user = %user,
		"received Hello"
	);
	metrics::counter!("parley_server_hello_total").increment(1);

	let (session, outbound_rx) = hub.connect(user).await;
	let conn_id = session.conn_id();

	let welcome = pb::Welcome {
		server_name: format!("parley-server/{}", env!("CARGO_PKG_VERSION")),
		server_instance_id: settings.server_instance_id.clone(),
		server_time_unix_ms: unix_ms_now(),
		max_frame_bytes: u32::try_from(settings.max_frame_bytes).unwrap_or(u32::MAX),
		conn_id: conn_id.0,
	};

	if let Err(e) = send_envelope(
		&mut control_send,
		pb::Envelope {
			version: PROTOCOL_VERSION_U32,
			request_id: String::new(),
			msg: Some(pb::envelope::Msg::Welcome(welcome)),
		},
		settings.max_frame_bytes,
	)
	.await
	{
		reader_task.abort();
		return Err(e.context("send Welcome"));
	}

	let events_task = tokio::spawn(run_events_stream(
		connection.clone(),
		outbound_rx,
		conn_id,
		settings.clone(),
	));

	let loop_result = async {
		while let Some(env) = ctrl_rx.recv().await {
			let Some(msg) = env.msg else {
				continue;
			};

			match msg {
				pb::envelope::Msg::Ping(ping) => {
					send_envelope(
						&mut control_send,
						pb::Envelope {
							version: PROTOCOL_VERSION_U32,
							request_id: env.request_id,
							msg: Some(pb::envelope::Msg::Pong(pb::Pong {
								client_time_unix_ms: ping.client_time_unix_ms,
								server_time_unix_ms: unix_ms_now(),
							})),
						},
						settings.max_frame_bytes,
					)
					.await?;
				}

				pb::envelope::Msg::Command(cmd) => {
					let result = handle_command(&session, cmd).await;
					send_envelope(
						&mut control_send,
						pb::Envelope {
							version: PROTOCOL_VERSION_U32,
							request_id: env.request_id,
							msg: Some(pb::envelope::Msg::CommandResult(result)),
						},
						settings.max_frame_bytes,
					)
					.await?;
				}

				pb::envelope::Msg::Hello(_) => {
					debug!(conn_id = conn_id.0, "ignoring duplicate Hello");
				}

				other => {
					warn!(conn_id = conn_id.0, "unhandled control message: {:?}", other);
				}
			}
		}
		Ok::<(), anyhow::Error>(())
	}
	.await;

	debug!(conn_id = conn_id.0, "control stream finished");
	drop(session);

	reader_task.abort();
	let _ = reader_task.await;
	match events_task.await {
		Ok(Err(e)) => debug!(conn_id = conn_id.0, error = %e, "events stream ended with error"),
		Err(e) if e.is_panic() => warn!(conn_id = conn_id.0, "events task panicked"),
		_ => {}
	}

	loop_result
}

async fn read_control_frames(
	mut control_recv: quinn::RecvStream,
	ctrl_tx: mpsc::UnboundedSender<pb::Envelope>,
	max_frame_bytes: usize,
) -> anyhow::Result<()> {
	let mut buf = Vec::<u8>::with_capacity(16 * 1024);
	let mut tmp = [0u8; 8192];

	loop {
		let n = match control_recv.read(&mut tmp).await {
			Ok(Some(n)) => n,
			Ok(None) => return Ok(()),
			Err(e) => return Err(anyhow!(e).context("control stream read failed")),
		};

		metrics::counter!("parley_server_control_bytes_in_total").increment(n as u64);

		buf.extend_from_slice(&tmp[..n]);

		loop {
			match parley_protocol::decode_frame::<pb::Envelope>(&buf, max_frame_bytes) {
				Ok((msg, used)) => {
					buf.drain(0..used);
					metrics::counter!("parley_server_envelopes_in_total").increment(1);

					if ctrl_tx.send(msg).is_err() {
						return Ok(());
					}
				}
				Err(parley_protocol::FramingError::InsufficientData { .. }) => break,
				Err(e) => {
					metrics::counter!("parley_server_control_decode_errors_total").increment(1);
					return Err(anyhow!(e).context("failed to decode control frame"));
				}
			}
		}
	}
}

async fn wait_for_hello(ctrl_rx: &mut mpsc::UnboundedReceiver<pb::Envelope>) -> anyhow::Result<pb::Hello> {
	while let Some(env) = ctrl_rx.recv().await {
		let Some(msg) = env.msg else { continue };
		if let pb::envelope::Msg::Hello(h) = msg {
			return Ok(h);
		}
	}
	Err(anyhow!("connection closed before Hello"))
}

async fn handle_command(session: &Session, cmd: pb::Command) -> pb::CommandResult {
	let event = match ClientEvent::try_from(cmd) {
		Ok(event) => event,
		Err(e) => {
			debug!(conn_id = session.conn_id().0, error = %e, "rejecting malformed command");
			return command_error(codes::INVALID_ARGUMENT, e.to_string());
		}
	};

	let kind = event.kind();
	match session.handle(event).await {
		Ok(reply) => command_ok(reply),
		Err(e) => {
			match &e {
				HubError::Persistence(_) => {
					warn!(conn_id = session.conn_id().0, user = %session.user(), kind, error = %e, "command failed")
				}
				_ => debug!(conn_id = session.conn_id().0, kind, error = %e, "command rejected"),
			}
			command_error(e.code(), e.to_string())
		}
	}
}

fn command_ok(reply: Reply) -> pb::CommandResult {
	let mut result = pb::CommandResult {
		status: pb::command_result::Status::Ok as i32,
		..Default::default()
	};
	match reply {
		Reply::Ack => {}
		Reply::Message(message) => result.message = Some((&message).into()),
		Reply::History(messages) => result.messages = messages.iter().map(pb::MessageRecord::from).collect(),
	}
	result
}

fn command_error(code: &str, detail: String) -> pb::CommandResult {
	pb::CommandResult {
		status: pb::command_result::Status::Error as i32,
		error_code: code.to_string(),
		detail,
		..Default::default()
	}
}

enum EventsStep {
	Opened(quinn::SendStream),
	Item(Option<Outbound>),
}

/// Writer for the client-opened events stream. Ends when the hub detaches the connection.
async fn run_events_stream(
	connection: quinn::Connection,
	mut outbound: mpsc::Receiver<Outbound>,
	conn_id: ConnId,
	settings: ConnectionSettings,
) -> anyhow::Result<()> {
	let mut events_send: Option<quinn::SendStream> = None;
	let mut pending: VecDeque<pb::EventEnvelope> = VecDeque::new();

	loop {
		let step = if events_send.is_none() {
			tokio::select! {
				accepted = connection.accept_bi() => {
					let (send, _recv) = accepted.context("accept events bidirectional stream")?;
					EventsStep::Opened(send)
				}
				item = outbound.recv() => EventsStep::Item(item),
			}
		} else {
			EventsStep::Item(outbound.recv().await)
		};

		let item = match step {
			EventsStep::Opened(mut send) => {
				info!(conn_id = conn_id.0, pending = pending.len(), "accepted events stream (server will only write)");
				for env in pending.drain(..) {
					write_event(&mut send, env, settings.max_frame_bytes).await?;
				}
				events_send = Some(send);
				continue;
			}
			EventsStep::Item(Some(item)) => item,
			EventsStep::Item(None) => break,
		};

		match item {
			Outbound::Event { channel, event } => {
				let env = pb::EventEnvelope {
					topic: channel.to_string(),
					server_time_unix_ms: unix_ms_now(),
					event: Some(pb::event_envelope::Event::from(event.as_ref())),
				};

				match events_send.as_mut() {
					Some(send) => write_event(send, env, settings.max_frame_bytes).await?,
					None => {
						if pending.len() >= settings.pending_events_limit {
							pending.pop_front();
							metrics::counter!("parley_server_deliveries_dropped_total", "reason" => "events_stream_not_open")
								.increment(1);
						}
						pending.push_back(env);
					}
				}
			}
			Outbound::Close { reason } => {
				info!(conn_id = conn_id.0, reason, "closing connection");
				connection.close(quinn::VarInt::from_u32(1), reason.as_bytes());
				break;
			}
		}
	}

	if let Some(mut send) = events_send {
		let _ = send.finish();
	}
	Ok(())
}

async fn write_event(send: &mut quinn::SendStream, env: pb::EventEnvelope, max_frame_bytes: usize) -> anyhow::Result<()> {
	let frame = encode_frame(
		&pb::Envelope {
			version: PROTOCOL_VERSION_U32,
			request_id: String::new(),
			msg: Some(pb::envelope::Msg::Event(env)),
		},
		max_frame_bytes,
	)
	.map_err(|e| anyhow!(e))?;

	metrics::counter!("parley_server_events_out_total").increment(1);
	send.write_all(&frame).await.context("events stream write")?;
	Ok(())
}

async fn send_envelope(send: &mut quinn::SendStream, env: pb::Envelope, max_frame_bytes: usize) -> anyhow::Result<()> {
	let frame = encode_frame(&env, max_frame_bytes).map_err(|e| anyhow!(e))?;
	metrics::counter!("parley_server_envelopes_out_total").increment(1);
	metrics::counter!("parley_server_control_bytes_out_total").increment(frame.len() as u64);

	send.write_all(&frame).await.context("stream write")?;
	Ok(())
}
