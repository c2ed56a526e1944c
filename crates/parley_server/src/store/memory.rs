#![forbid(unsafe_code)]

use std::collections::HashMap;

use parley_domain::{Message, MessageId, MessageTarget, RoomId, UserId};
use tokio::sync::Mutex;

use super::{MessageStore, StoreError};
use crate::clock::unix_ms_now;

#[derive(Debug, Default)]
struct Inner {
	/// Insertion order doubles as creation order.
	messages: Vec<Message>,
	index: HashMap<MessageId, usize>,
	presence: HashMap<UserId, bool>,
}

/// Process-local store for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
	inner: Mutex<Inner>,
}

impl InMemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn message_count(&self) -> usize {
		self.inner.lock().await.messages.len()
	}
}

#[async_trait::async_trait]
impl MessageStore for InMemoryStore {
	async fn create_message(&self, sender: &UserId, content: &str, target: &MessageTarget) -> Result<Message, StoreError> {
		let msg = Message {
			id: MessageId::new_v4(),
			sender: sender.clone(),
			target: target.clone(),
			content: content.to_string(),
			is_read: false,
			read_by: Vec::new(),
			created_at_unix_ms: unix_ms_now(),
		};

		let mut guard = self.inner.lock().await;
		let idx = guard.messages.len();
		guard.index.insert(msg.id, idx);
		guard.messages.push(msg.clone());
		Ok(msg)
	}

	async fn mark_read(&self, id: MessageId, reader: &UserId) -> Result<Message, StoreError> {
		let mut guard = self.inner.lock().await;
		let Some(&idx) = guard.index.get(&id) else {
			return Err(StoreError::NotFound(id));
		};

		let msg = &mut guard.messages[idx];
		msg.add_reader(reader.clone());
		Ok(msg.clone())
	}

	async fn update_online_status(&self, user: &UserId, is_online: bool) -> Result<(), StoreError> {
		self.inner.lock().await.presence.insert(user.clone(), is_online);
		Ok(())
	}

	async fn online_status(&self, user: &UserId) -> Result<Option<bool>, StoreError> {
		Ok(self.inner.lock().await.presence.get(user).copied())
	}

	async fn conversation(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>, StoreError> {
		let guard = self.inner.lock().await;
		let mut out: Vec<Message> = guard
			.messages
			.iter()
			.filter(|m| match m.receiver() {
				Some(r) => (&m.sender == a && r == b) || (&m.sender == b && r == a),
				None => false,
			})
			.cloned()
			.collect();
		out.sort_by_key(|m| m.created_at_unix_ms);
		Ok(out)
	}

	async fn room_history(&self, room: &RoomId) -> Result<Vec<Message>, StoreError> {
		let guard = self.inner.lock().await;
		let mut out: Vec<Message> = guard.messages.iter().filter(|m| m.room() == Some(room)).cloned().collect();
		out.sort_by_key(|m| m.created_at_unix_ms);
		Ok(out)
	}
}
