#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;

use parley_server::config::{DEFAULT_BIND, default_config_path, load_server_config_from_path, parse_bind};
use parley_server::hub::Hub;
use parley_server::quic::QuicServerConfig;
use parley_server::server::connection::ConnectionSettings;
use parley_server::server::health::{HealthState, spawn_health_server};
use parley_server::server::serve;
use parley_server::store::open_store;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: parley_server [--bind quic://host:port] [--config path]\n\
\n\
Options:\n\
\t--bind     Bind endpoint (default: quic://{DEFAULT_BIND}, or [server].bind from the config)\n\
\t--config   Config file (default: ~/.parley/config.toml)\n\
\t--help     Show this help\n\
"
	);
	std::process::exit(2)
}

struct Args {
	bind: Option<SocketAddr>,
	config: Option<PathBuf>,
}

fn parse_args() -> Args {
	let mut args = Args { bind: None, config: None };

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--bind" | "--listen" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				match parse_bind(&v) {
					Ok(addr) => args.bind = Some(addr),
					Err(e) => {
						eprintln!("{e:#}");
						usage_and_exit();
					}
				}
			}
			"--config" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--config must be non-empty");
					usage_and_exit();
				}
				args.config = Some(PathBuf::from(v));
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	args
}

fn init_rustls_crypto_provider() {
	let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,parley_server=debug".to_string());

	let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
		.ok()
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty());
	let base = tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false));

	if let Some(endpoint) = otlp_endpoint {
		use opentelemetry::global;
		use opentelemetry::trace::TracerProvider as _;
		use opentelemetry_otlp::WithExportConfig;

		match opentelemetry_otlp::SpanExporter::builder()
			.with_tonic()
			.with_endpoint(endpoint.clone())
			.build()
		{
			Ok(exporter) => {
				let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
					.with_batch_exporter(exporter)
					.build();
				let tracer = tracer_provider.tracer("parley_server");
				global::set_tracer_provider(tracer_provider);

				let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
				base.with(otel_layer).init();
				info!(endpoint = %endpoint, "otlp tracing enabled");
			}
			Err(e) => {
				base.init();
				warn!(error = %e, "failed to initialize otlp tracing");
			}
		}
	} else {
		base.init();
	}
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_rustls_crypto_provider();
	init_tracing();

	let args = parse_args();

	let config_path = match args.config {
		Some(path) => path,
		None => default_config_path()?,
	};
	let mut server_cfg = load_server_config_from_path(&config_path)?;
	info!(path = %config_path.display(), "loaded server config (toml + env overrides)");

	if let Some(bind) = args.bind {
		server_cfg.server.bind = bind;
	}

	init_metrics(server_cfg.server.metrics_bind.as_deref());

	let store = open_store(server_cfg.persistence.database_url.as_deref()).await?;
	let hub = Hub::new(server_cfg.hub.clone(), store);
	info!(
		reconnect_policy = %server_cfg.hub.reconnect_policy,
		outbound_queue_capacity = server_cfg.hub.outbound_queue_capacity,
		"hub ready"
	);

	let health_state = HealthState::new(hub.clone());
	if let Some(bind) = server_cfg.server.health_bind.as_deref() {
		match bind.parse::<SocketAddr>() {
			Ok(addr) => {
				spawn_health_server(addr, health_state.clone());
				info!(%addr, "health server listening");
			}
			Err(e) => warn!(error = %e, %bind, "invalid health bind address (expected host:port)"),
		}
	}

	let bind_addr = server_cfg.server.bind;
	let quic_cfg = QuicServerConfig::dev(bind_addr);
	let endpoint = if let (Some(cert_path), Some(key_path)) = (
		server_cfg.server.tls_cert_path.as_deref(),
		server_cfg.server.tls_key_path.as_deref(),
	) {
		info!(cert = %cert_path.display(), key = %key_path.display(), "loading TLS cert/key");
		quic_cfg.bind_endpoint_with_tls(cert_path, key_path)?
	} else {
		let (endpoint, server_cert_der) = quic_cfg.bind_dev_endpoint()?;
		info!(
			bind = %bind_addr,
			cert_der_len = server_cert_der.len(),
			"parley_server: QUIC endpoint ready (dev self-signed cert)"
		);
		endpoint
	};

	let conn_settings = ConnectionSettings {
		max_frame_bytes: server_cfg.server.max_frame_bytes,
		server_instance_id: format!("parley-{}", uuid::Uuid::new_v4()),
		pending_events_limit: server_cfg.hub.outbound_queue_capacity,
	};

	health_state.mark_ready();
	info!(bind = %bind_addr, instance = %conn_settings.server_instance_id, "parley_server: accepting connections");

	serve(endpoint, hub, conn_settings).await;

	Ok(())
}
