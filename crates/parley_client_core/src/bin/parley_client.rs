#![forbid(unsafe_code)]

use parley_client_core::{ClientConfig, ReceivedEvent, SessionControl};
use parley_domain::{MessageId, RoomId, ServerEvent, UserId};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::{info, warn};

const DEFAULT_ENDPOINT: &str = "quic://127.0.0.1:18303";

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: parley_client --user id [--connect quic://host:port] [--sni name] [--room id]...\n\
\n\
Options:\n\
	--connect   Server endpoint (default: {DEFAULT_ENDPOINT})\n\
	--sni       TLS server name/SNI (default: host from --connect)\n\
	--user      User id announced in the handshake (required)\n\
	--room      Room to join after connecting (repeatable)\n\
	--help      Show this help\n\
\n\
Input (one per line on stdin):\n\
	@user text        send a direct message\n\
	#room text        send to a room\n\
	/join room        join a room\n\
	/leave room       leave a room\n\
	/history @user    direct conversation history (or #room)\n\
	/read id          mark a message read\n"
	);
	std::process::exit(2)
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,parley_client_core=debug".to_string());
	tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

struct Args {
	endpoint: String,
	sni: Option<String>,
	user: UserId,
	rooms: Vec<RoomId>,
}

fn parse_args() -> Args {
	let mut endpoint = DEFAULT_ENDPOINT.to_string();
	let mut sni = None;
	let mut user = None;
	let mut rooms = Vec::new();

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--connect" | "--endpoint" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--connect must be non-empty (expected quic://host:port)");
					usage_and_exit();
				}
				endpoint = v;
			}
			"--sni" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--sni must be non-empty");
					usage_and_exit();
				}
				sni = Some(v);
			}
			"--user" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				user = Some(UserId::new(v).unwrap_or_else(|e| {
					eprintln!("Invalid --user value: {e}");
					usage_and_exit()
				}));
			}
			"--room" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				rooms.push(RoomId::new(v).unwrap_or_else(|e| {
					eprintln!("Invalid --room value: {e}");
					usage_and_exit()
				}));
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	let Some(user) = user else {
		eprintln!("--user is required");
		usage_and_exit();
	};

	Args {
		endpoint,
		sni,
		user,
		rooms,
	}
}

/// Split `quic://host:port` (scheme optional) into host and port.
fn split_endpoint(endpoint: &str) -> anyhow::Result<(String, u16)> {
	let rest = endpoint.trim();
	let rest = rest.strip_prefix("quic://").unwrap_or(rest);
	let (host, port) = rest
		.rsplit_once(':')
		.ok_or_else(|| anyhow::anyhow!("expected host:port, got {endpoint:?}"))?;
	let host = host.trim_start_matches('[').trim_end_matches(']');
	if host.is_empty() {
		anyhow::bail!("missing host in {endpoint:?}");
	}
	let port: u16 = port.parse().map_err(|e| anyhow::anyhow!("invalid port in {endpoint:?}: {e}"))?;
	Ok((host.to_string(), port))
}

fn print_event(ev: ReceivedEvent) {
	match ev.event {
		ServerEvent::UserStatus { user, is_online } => {
			println!("[{}] {user} is {}", ev.channel, if is_online { "online" } else { "offline" });
		}
		ServerEvent::NewMessage { message } => {
			println!("[{}] {} ({}): {}", ev.channel, message.sender, message.id, message.content);
		}
		ServerEvent::UserTyping { user, is_typing } => {
			if is_typing {
				println!("[{}] {user} is typing...", ev.channel);
			}
		}
		ServerEvent::MessageRead { message } => {
			let readers: Vec<String> = message.read_by.iter().map(ToString::to_string).collect();
			println!("[{}] {} read by {}", ev.channel, message.id, readers.join(", "));
		}
	}
}

async fn run_line(control: &mut SessionControl, line: &str) -> anyhow::Result<()> {
	let line = line.trim();
	if line.is_empty() {
		return Ok(());
	}

	if let Some(rest) = line.strip_prefix('/') {
		let (cmd, arg) = rest.split_once(' ').unwrap_or((rest, ""));
		let arg = arg.trim();
		match cmd {
			"join" => control.join_room(&RoomId::new(arg)?).await?,
			"leave" => control.leave_room(&RoomId::new(arg)?).await?,
			"read" => {
				let id: MessageId = arg.parse()?;
				let message = control.mark_read(id).await?;
				info!(id = %message.id, readers = message.read_by.len(), "marked read");
			}
			"history" => {
				let messages = if let Some(room) = arg.strip_prefix('#') {
					control.room_history(&RoomId::new(room)?).await?
				} else {
					control.history_with(&UserId::new(arg.trim_start_matches('@'))?).await?
				};
				for m in messages {
					println!("  {} {}: {}", m.id, m.sender, m.content);
				}
			}
			other => warn!(command = other, "unknown command"),
		}
		return Ok(());
	}

	let (target, content) = line.split_once(' ').unwrap_or((line, ""));
	let message = if let Some(room) = target.strip_prefix('#') {
		control.send_to_room(&RoomId::new(room)?, content).await?
	} else if let Some(user) = target.strip_prefix('@') {
		control.send_direct(&UserId::new(user)?, content).await?
	} else {
		warn!("expected @user or #room prefix");
		return Ok(());
	};
	info!(id = %message.id, "sent");
	Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();
	let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
	let args = parse_args();

	let (host, port) = split_endpoint(&args.endpoint).unwrap_or_else(|e| {
		eprintln!("Invalid --connect value: {e:#}");
		usage_and_exit()
	});
	let server_addr = tokio::net::lookup_host((host.as_str(), port))
		.await?
		.next()
		.ok_or_else(|| anyhow::anyhow!("no addresses for {host}:{port}"))?;

	let cfg = ClientConfig {
		server_addr,
		server_name: args.sni.unwrap_or(host),
		client_name: format!("parley-client-cli/{}", env!("CARGO_PKG_VERSION")),
		client_instance_id: format!("cli-{}", std::process::id()),
		user_id: args.user.to_string(),
		..ClientConfig::default()
	};
	info!(server = %cfg.server_addr, sni = %cfg.server_name, user = %cfg.user_id, "connecting");

	let (mut control, welcome) = SessionControl::connect(cfg).await?;
	info!(conn_id = welcome.conn_id, server = %welcome.server_name, "connected");

	for room in &args.rooms {
		control.join_room(room).await?;
		info!(%room, "joined");
	}

	let mut events = control.open_events_stream().await?;
	let printer = tokio::spawn(async move {
		if let Err(e) = events.run_events_loop(print_event).await {
			warn!(error = %e, "events loop ended");
		}
	});

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	while let Some(line) = lines.next_line().await? {
		if let Err(e) = run_line(&mut control, &line).await {
			warn!(error = %e, "command failed");
		}
	}

	control.close(0, "bye");
	printer.abort();
	Ok(())
}
