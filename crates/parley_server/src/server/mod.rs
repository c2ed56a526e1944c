#![forbid(unsafe_code)]

pub mod connection;
pub mod health;

use std::sync::Arc;

use tracing::{info, warn};

use crate::hub::Hub;
use crate::server::connection::{ConnectionSettings, handle_connection};

/// Accept connections on `endpoint` until it is closed, one task per connection.
pub async fn serve(endpoint: quinn::Endpoint, hub: Arc<Hub>, settings: ConnectionSettings) {
	while let Some(incoming) = endpoint.accept().await {
		metrics::counter!("parley_server_connections_total").increment(1);

		let hub = Arc::clone(&hub);
		let settings = settings.clone();
		tokio::spawn(async move {
			match incoming.await {
				Ok(connection) => {
					let remote = connection.remote_address();
					info!(%remote, "accepted connection");

					if let Err(e) = handle_connection(connection, hub, settings).await {
						warn!(%remote, error = %e, "connection handler exited with error");
					}
				}
				Err(e) => {
					warn!(error = %e, "failed to establish QUIC connection");
				}
			}
		});
	}

	info!("endpoint closed; no longer accepting connections");
}
