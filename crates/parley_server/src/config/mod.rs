#![forbid(unsafe_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};
use parley_protocol::framing::DEFAULT_MAX_FRAME_SIZE;
use serde::Deserialize;
use tracing::{info, warn};

use crate::hub::{HubConfig, ReconnectPolicy};

/// Used when neither the config file nor `--bind` names an address.
pub const DEFAULT_BIND: &str = "127.0.0.1:18303";

/// Default config path: `~/.parley/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".parley").join("config.toml"))
}

/// Load the server config from TOML at `path` (missing file means defaults) plus env overrides.
pub fn load_server_config_from_path(path: &Path) -> anyhow::Result<ServerConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ServerConfig::from_file(file_cfg);

	apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());

	Ok(cfg)
}

/// Server config (v1).
#[derive(Debug, Clone)]
pub struct ServerConfig {
	pub server: ServerSettings,
	pub hub: HubConfig,
	pub persistence: PersistenceSettings,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self::from_file(FileConfig::default())
	}
}

/// Listener settings loaded by the server.
#[derive(Debug, Clone)]
pub struct ServerSettings {
	/// QUIC listen address.
	pub bind: SocketAddr,
	/// PEM-encoded certificate path for QUIC/TLS.
	pub tls_cert_path: Option<PathBuf>,
	/// PEM-encoded private key path for QUIC/TLS.
	pub tls_key_path: Option<PathBuf>,
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	/// Optional health/readiness HTTP bind address (host:port).
	pub health_bind: Option<String>,
	/// Upper bound for a single frame in either direction.
	pub max_frame_bytes: usize,
}

/// Persistence settings loaded by the server.
#[derive(Debug, Clone, Default)]
pub struct PersistenceSettings {
	/// Database URL (sqlite: or postgres:). Absent means the in-memory store.
	pub database_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	server: FileServerSettings,

	#[serde(default)]
	hub: FileHubSettings,

	#[serde(default)]
	persistence: FilePersistenceSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	bind: Option<String>,
	tls_cert_path: Option<String>,
	tls_key_path: Option<String>,
	metrics_bind: Option<String>,
	health_bind: Option<String>,
	max_frame_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileHubSettings {
	outbound_queue_capacity: Option<usize>,
	reconnect_policy: Option<String>,
	debug_logs: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FilePersistenceSettings {
	database_url: Option<String>,
}

impl ServerConfig {
	fn from_file(file: FileConfig) -> Self {
		let defaults = HubConfig::default();

		let bind = file
			.server
			.bind
			.filter(|s| !s.trim().is_empty())
			.and_then(|s| match parse_bind(&s) {
				Ok(addr) => Some(addr),
				Err(e) => {
					warn!(error = %e, bind = %s, "server config: invalid bind in config file; using default");
					None
				}
			})
			.unwrap_or_else(default_bind);

		let reconnect_policy = file
			.hub
			.reconnect_policy
			.filter(|s| !s.trim().is_empty())
			.and_then(|s| match s.parse::<ReconnectPolicy>() {
				Ok(policy) => Some(policy),
				Err(e) => {
					warn!(error = %e, "hub config: invalid reconnect_policy in config file; using default");
					None
				}
			})
			.unwrap_or(defaults.reconnect_policy);

		Self {
			server: ServerSettings {
				bind,
				tls_cert_path: file.server.tls_cert_path.filter(|s| !s.trim().is_empty()).map(PathBuf::from),
				tls_key_path: file.server.tls_key_path.filter(|s| !s.trim().is_empty()).map(PathBuf::from),
				metrics_bind: file.server.metrics_bind.filter(|s| !s.trim().is_empty()),
				health_bind: file.server.health_bind.filter(|s| !s.trim().is_empty()),
				max_frame_bytes: file
					.server
					.max_frame_bytes
					.filter(|v| *v > 0)
					.unwrap_or(DEFAULT_MAX_FRAME_SIZE),
			},
			hub: HubConfig {
				outbound_queue_capacity: file
					.hub
					.outbound_queue_capacity
					.filter(|v| *v > 0)
					.unwrap_or(defaults.outbound_queue_capacity),
				reconnect_policy,
				debug_logs: file.hub.debug_logs.unwrap_or(defaults.debug_logs),
			},
			persistence: PersistenceSettings {
				database_url: file.persistence.database_url.filter(|s| !s.trim().is_empty()),
			},
		}
	}
}

fn default_bind() -> SocketAddr {
	SocketAddr::from(([127, 0, 0, 1], 18303))
}

/// Parse `host:port`, optionally prefixed with `quic://`. The host must be an IP literal.
pub fn parse_bind(s: &str) -> anyhow::Result<SocketAddr> {
	let s = s.trim();
	let rest = s.strip_prefix("quic://").unwrap_or(s);
	if rest.is_empty() {
		return Err(anyhow!("empty bind address (expected host:port)"));
	}
	rest.parse::<SocketAddr>()
		.with_context(|| format!("invalid bind address {rest:?} (expected ip:port)"))
}

fn parse_env_bool(v: &str) -> Option<bool> {
	match v.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

/// Apply `PARLEY_*` overrides. `lookup` is `std::env::var` outside of tests.
fn apply_env_overrides(cfg: &mut ServerConfig, lookup: impl Fn(&str) -> Option<String>) {
	let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

	if let Some(v) = get("PARLEY_BIND") {
		match parse_bind(&v) {
			Ok(addr) => {
				cfg.server.bind = addr;
				info!(%addr, "server config: bind overridden by env");
			}
			Err(e) => warn!(error = %e, "server config: ignoring invalid PARLEY_BIND"),
		}
	}

	if let Some(v) = get("PARLEY_TLS_CERT") {
		cfg.server.tls_cert_path = Some(PathBuf::from(v));
		info!("server config: tls_cert_path overridden by env");
	}

	if let Some(v) = get("PARLEY_TLS_KEY") {
		cfg.server.tls_key_path = Some(PathBuf::from(v));
		info!("server config: tls_key_path overridden by env");
	}

	if let Some(v) = get("PARLEY_METRICS_BIND") {
		cfg.server.metrics_bind = Some(v);
		info!("server config: metrics_bind overridden by env");
	}

	if let Some(v) = get("PARLEY_HEALTH_BIND") {
		cfg.server.health_bind = Some(v);
		info!("server config: health_bind overridden by env");
	}

	if let Some(v) = get("PARLEY_MAX_FRAME_BYTES") {
		match v.parse::<usize>() {
			Ok(bytes) if bytes > 0 => {
				cfg.server.max_frame_bytes = bytes;
				info!(bytes, "server config: max_frame_bytes overridden by env");
			}
			_ => warn!(value = %v, "server config: ignoring invalid PARLEY_MAX_FRAME_BYTES"),
		}
	}

	if let Some(v) = get("PARLEY_OUTBOUND_QUEUE_CAPACITY") {
		match v.parse::<usize>() {
			Ok(capacity) if capacity > 0 => {
				cfg.hub.outbound_queue_capacity = capacity;
				info!(capacity, "hub config: outbound_queue_capacity overridden by env");
			}
			_ => warn!(value = %v, "hub config: ignoring invalid PARLEY_OUTBOUND_QUEUE_CAPACITY"),
		}
	}

	if let Some(v) = get("PARLEY_RECONNECT_POLICY") {
		match v.parse::<ReconnectPolicy>() {
			Ok(policy) => {
				cfg.hub.reconnect_policy = policy;
				info!(%policy, "hub config: reconnect_policy overridden by env");
			}
			Err(e) => warn!(error = %e, "hub config: ignoring invalid PARLEY_RECONNECT_POLICY"),
		}
	}

	if let Some(v) = get("PARLEY_HUB_DEBUG_LOGS") {
		match parse_env_bool(&v) {
			Some(enabled) => {
				cfg.hub.debug_logs = enabled;
				info!(enabled, "hub config: debug_logs overridden by env");
			}
			None => warn!(value = %v, "hub config: ignoring invalid PARLEY_HUB_DEBUG_LOGS"),
		}
	}

	if let Some(v) = get("PARLEY_DATABASE_URL") {
		cfg.persistence.database_url = Some(v);
		info!("persistence: database_url overridden by env");
	}

	if cfg.server.tls_cert_path.is_some() != cfg.server.tls_key_path.is_some() {
		warn!("server config: tls_cert_path and tls_key_path must both be set; using dev self-signed cert");
	}
}
