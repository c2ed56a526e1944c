#![forbid(unsafe_code)]

mod memory;
mod sql;

use std::sync::Arc;

use parley_domain::{Message, MessageId, MessageTarget, RoomId, UserId};
use thiserror::Error;
use tracing::info;

pub use memory::InMemoryStore;
pub use sql::SqlStore;

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("message not found: {0}")]
	NotFound(MessageId),

	#[error("database error: {0}")]
	Backend(#[from] sqlx::Error),

	#[error("corrupt row: {0}")]
	Corrupt(String),
}

/// Durable message and presence storage used by the hub.
#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
	/// Persist a new message and return it with its store-assigned identity.
	async fn create_message(&self, sender: &UserId, content: &str, target: &MessageTarget) -> Result<Message, StoreError>;

	/// Set the read flag and add `reader` to the reader set; returns the updated message.
	async fn mark_read(&self, id: MessageId, reader: &UserId) -> Result<Message, StoreError>;

	/// Record the last known online state of `user`.
	async fn update_online_status(&self, user: &UserId, is_online: bool) -> Result<(), StoreError>;

	/// Last recorded online state; `None` if never recorded.
	async fn online_status(&self, user: &UserId) -> Result<Option<bool>, StoreError>;

	/// Direct messages between `a` and `b` in either direction, oldest first.
	async fn conversation(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>, StoreError>;

	/// Messages sent to `room`, oldest first.
	async fn room_history(&self, room: &RoomId) -> Result<Vec<Message>, StoreError>;
}

/// Open the configured backend: SQL when `database_url` is set, in-memory otherwise.
pub async fn open_store(database_url: Option<&str>) -> anyhow::Result<Arc<dyn MessageStore>> {
	match database_url {
		Some(url) => {
			let store = SqlStore::connect(url).await?;
			info!(backend = store.backend_name(), "message store: sql");
			Ok(Arc::new(store))
		}
		None => {
			info!("message store: in-memory (nothing survives a restart)");
			Ok(Arc::new(InMemoryStore::new()))
		}
	}
}
