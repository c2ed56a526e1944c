#![forbid(unsafe_code)]

use std::collections::HashMap;

use anyhow::{Context as _, anyhow};
use parley_domain::{Message, MessageId, MessageTarget, RoomId, UserId};

use super::{MessageStore, StoreError};
use crate::clock::unix_ms_now;

/// `(id, sender_id, receiver_id, room_id, content, is_read, created_at_unix_ms)`
type MessageRow = (String, String, Option<String>, Option<String>, String, bool, i64);

/// `(message_id, reader_id)`
type ReaderRow = (String, String);

#[derive(Clone)]
enum Backend {
	Sqlite(sqlx::SqlitePool),
	Postgres(sqlx::PgPool),
}

/// `sqlx`-backed store; the schema is migrated on connect.
#[derive(Clone)]
pub struct SqlStore {
	backend: Backend,
}

impl SqlStore {
	pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
		if database_url.starts_with("sqlite:") {
			let pool = sqlx::SqlitePool::connect(database_url).await.context("connect sqlite")?;
			sqlx::migrate!("migrations/sqlite")
				.run(&pool)
				.await
				.context("run sqlite migrations")?;

			Ok(Self {
				backend: Backend::Sqlite(pool),
			})
		} else if database_url.starts_with("postgres:") || database_url.starts_with("postgresql:") {
			let pool = sqlx::PgPool::connect(database_url).await.context("connect postgres")?;
			sqlx::migrate!("migrations/postgres")
				.run(&pool)
				.await
				.context("run postgres migrations")?;

			Ok(Self {
				backend: Backend::Postgres(pool),
			})
		} else {
			Err(anyhow!("unsupported database_url (use sqlite: or postgres:)"))
		}
	}

	pub fn backend_name(&self) -> &'static str {
		match self.backend {
			Backend::Sqlite(_) => "sqlite",
			Backend::Postgres(_) => "postgres",
		}
	}
}

fn decode_message(row: MessageRow, read_by: Vec<String>) -> Result<Message, StoreError> {
	let (id, sender, receiver, room, content, is_read, created_at_unix_ms) = row;

	let corrupt = |what: &str, e: parley_domain::ParseIdError| StoreError::Corrupt(format!("message {id}: {what}: {e}"));

	let receiver = receiver.map(UserId::new).transpose().map_err(|e| corrupt("receiver_id", e))?;
	let room = room.map(RoomId::new).transpose().map_err(|e| corrupt("room_id", e))?;
	let target = MessageTarget::from_parts(receiver, room).map_err(|e| corrupt("target", e))?;
	let sender = UserId::new(sender).map_err(|e| corrupt("sender_id", e))?;
	let read_by = read_by
		.into_iter()
		.map(UserId::new)
		.collect::<Result<Vec<_>, _>>()
		.map_err(|e| corrupt("reader_id", e))?;
	let parsed_id = id.parse::<MessageId>().map_err(|e| corrupt("id", e))?;

	Ok(Message {
		id: parsed_id,
		sender,
		target,
		content,
		is_read,
		read_by,
		created_at_unix_ms,
	})
}

fn decode_with_readers(rows: Vec<MessageRow>, readers: Vec<ReaderRow>) -> Result<Vec<Message>, StoreError> {
	let mut by_message: HashMap<String, Vec<String>> = HashMap::new();
	for (message_id, reader_id) in readers {
		by_message.entry(message_id).or_default().push(reader_id);
	}

	rows.into_iter()
		.map(|row| {
			let read_by = by_message.remove(&row.0).unwrap_or_default();
			decode_message(row, read_by)
		})
		.collect()
}

#[async_trait::async_trait]
impl MessageStore for SqlStore {
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

		let id = msg.id.to_string();
		let receiver = msg.receiver().map(|u| u.as_str());
		let room = msg.room().map(|r| r.as_str());

		match &self.backend {
			Backend::Sqlite(pool) => {
				sqlx::query(
					"INSERT INTO messages (id, sender_id, receiver_id, room_id, content, is_read, created_at_unix_ms) \
					VALUES (?, ?, ?, ?, ?, ?, ?)",
				)
				.bind(id.as_str())
				.bind(sender.as_str())
				.bind(receiver)
				.bind(room)
				.bind(content)
				.bind(false)
				.bind(msg.created_at_unix_ms)
				.execute(pool)
				.await?;
			}
			Backend::Postgres(pool) => {
				sqlx::query(
					"INSERT INTO messages (id, sender_id, receiver_id, room_id, content, is_read, created_at_unix_ms) \
					VALUES ($1, $2, $3, $4, $5, $6, $7)",
				)
				.bind(id.as_str())
				.bind(sender.as_str())
				.bind(receiver)
				.bind(room)
				.bind(content)
				.bind(false)
				.bind(msg.created_at_unix_ms)
				.execute(pool)
				.await?;
			}
		}

		Ok(msg)
	}

	async fn mark_read(&self, id: MessageId, reader: &UserId) -> Result<Message, StoreError> {
		let key = id.to_string();

		let (row, readers) = match &self.backend {
			Backend::Sqlite(pool) => {
				let mut tx = pool.begin().await?;
				let row: Option<MessageRow> = sqlx::query_as(
					"SELECT id, sender_id, receiver_id, room_id, content, is_read, created_at_unix_ms \
					FROM messages WHERE id = ?",
				)
				.bind(key.as_str())
				.fetch_optional(&mut *tx)
				.await?;
				let Some(row) = row else {
					return Err(StoreError::NotFound(id));
				};

				sqlx::query(
					"INSERT INTO message_readers (message_id, reader_id) VALUES (?, ?) \
					ON CONFLICT (message_id, reader_id) DO NOTHING",
				)
				.bind(key.as_str())
				.bind(reader.as_str())
				.execute(&mut *tx)
				.await?;

				sqlx::query("UPDATE messages SET is_read = ? WHERE id = ?")
					.bind(true)
					.bind(key.as_str())
					.execute(&mut *tx)
					.await?;

				let readers: Vec<(String,)> =
					sqlx::query_as("SELECT reader_id FROM message_readers WHERE message_id = ? ORDER BY seq ASC")
						.bind(key.as_str())
						.fetch_all(&mut *tx)
						.await?;

				tx.commit().await?;
				(row, readers)
			}
			Backend::Postgres(pool) => {
				let mut tx = pool.begin().await?;
				let row: Option<MessageRow> = sqlx::query_as(
					"SELECT id, sender_id, receiver_id, room_id, content, is_read, created_at_unix_ms \
					FROM messages WHERE id = $1 FOR UPDATE",
				)
				.bind(key.as_str())
				.fetch_optional(&mut *tx)
				.await?;
				let Some(row) = row else {
					return Err(StoreError::NotFound(id));
				};

				sqlx::query(
					"INSERT INTO message_readers (message_id, reader_id) VALUES ($1, $2) \
					ON CONFLICT (message_id, reader_id) DO NOTHING",
				)
				.bind(key.as_str())
				.bind(reader.as_str())
				.execute(&mut *tx)
				.await?;

				sqlx::query("UPDATE messages SET is_read = TRUE WHERE id = $1")
					.bind(key.as_str())
					.execute(&mut *tx)
					.await?;

				let readers: Vec<(String,)> =
					sqlx::query_as("SELECT reader_id FROM message_readers WHERE message_id = $1 ORDER BY seq ASC")
						.bind(key.as_str())
						.fetch_all(&mut *tx)
						.await?;

				tx.commit().await?;
				(row, readers)
			}
		};

		let mut row = row;
		row.5 = true;
		decode_message(row, readers.into_iter().map(|(r,)| r).collect())
	}

	async fn update_online_status(&self, user: &UserId, is_online: bool) -> Result<(), StoreError> {
		let now = unix_ms_now();
		match &self.backend {
			Backend::Sqlite(pool) => {
				sqlx::query(
					"INSERT INTO user_presence (user_id, is_online, updated_at_unix_ms) VALUES (?, ?, ?) \
					ON CONFLICT (user_id) DO UPDATE SET is_online = excluded.is_online, \
					updated_at_unix_ms = excluded.updated_at_unix_ms",
				)
				.bind(user.as_str())
				.bind(is_online)
				.bind(now)
				.execute(pool)
				.await?;
			}
			Backend::Postgres(pool) => {
				sqlx::query(
					"INSERT INTO user_presence (user_id, is_online, updated_at_unix_ms) VALUES ($1, $2, $3) \
					ON CONFLICT (user_id) DO UPDATE SET is_online = EXCLUDED.is_online, \
					updated_at_unix_ms = EXCLUDED.updated_at_unix_ms",
				)
				.bind(user.as_str())
				.bind(is_online)
				.bind(now)
				.execute(pool)
				.await?;
			}
		}
		Ok(())
	}

	async fn online_status(&self, user: &UserId) -> Result<Option<bool>, StoreError> {
		let row: Option<(bool,)> = match &self.backend {
			Backend::Sqlite(pool) => {
				sqlx::query_as("SELECT is_online FROM user_presence WHERE user_id = ?")
					.bind(user.as_str())
					.fetch_optional(pool)
					.await?
			}
			Backend::Postgres(pool) => {
				sqlx::query_as("SELECT is_online FROM user_presence WHERE user_id = $1")
					.bind(user.as_str())
					.fetch_optional(pool)
					.await?
			}
		};
		Ok(row.map(|(online,)| online))
	}

	async fn conversation(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>, StoreError> {
		let (rows, readers): (Vec<MessageRow>, Vec<ReaderRow>) = match &self.backend {
			Backend::Sqlite(pool) => {
				let rows = sqlx::query_as(
					"SELECT id, sender_id, receiver_id, room_id, content, is_read, created_at_unix_ms FROM messages \
					WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1) \
					ORDER BY created_at_unix_ms ASC, seq ASC",
				)
				.bind(a.as_str())
				.bind(b.as_str())
				.fetch_all(pool)
				.await?;

				let readers = sqlx::query_as(
					"SELECT r.message_id, r.reader_id FROM message_readers r JOIN messages m ON m.id = r.message_id \
					WHERE (m.sender_id = ?1 AND m.receiver_id = ?2) OR (m.sender_id = ?2 AND m.receiver_id = ?1) \
					ORDER BY r.seq ASC",
				)
				.bind(a.as_str())
				.bind(b.as_str())
				.fetch_all(pool)
				.await?;

				(rows, readers)
			}
			Backend::Postgres(pool) => {
				let rows = sqlx::query_as(
					"SELECT id, sender_id, receiver_id, room_id, content, is_read, created_at_unix_ms FROM messages \
					WHERE (sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1) \
					ORDER BY created_at_unix_ms ASC, seq ASC",
				)
				.bind(a.as_str())
				.bind(b.as_str())
				.fetch_all(pool)
				.await?;

				let readers = sqlx::query_as(
					"SELECT r.message_id, r.reader_id FROM message_readers r JOIN messages m ON m.id = r.message_id \
					WHERE (m.sender_id = $1 AND m.receiver_id = $2) OR (m.sender_id = $2 AND m.receiver_id = $1) \
					ORDER BY r.seq ASC",
				)
				.bind(a.as_str())
				.bind(b.as_str())
				.fetch_all(pool)
				.await?;

				(rows, readers)
			}
		};

		decode_with_readers(rows, readers)
	}

	async fn room_history(&self, room: &RoomId) -> Result<Vec<Message>, StoreError> {
		let (rows, readers): (Vec<MessageRow>, Vec<ReaderRow>) = match &self.backend {
			Backend::Sqlite(pool) => {
				let rows = sqlx::query_as(
					"SELECT id, sender_id, receiver_id, room_id, content, is_read, created_at_unix_ms FROM messages \
					WHERE room_id = ? ORDER BY created_at_unix_ms ASC, seq ASC",
				)
				.bind(room.as_str())
				.fetch_all(pool)
				.await?;

				let readers = sqlx::query_as(
					"SELECT r.message_id, r.reader_id FROM message_readers r JOIN messages m ON m.id = r.message_id \
					WHERE m.room_id = ? ORDER BY r.seq ASC",
				)
				.bind(room.as_str())
				.fetch_all(pool)
				.await?;

				(rows, readers)
			}
			Backend::Postgres(pool) => {
				let rows = sqlx::query_as(
					"SELECT id, sender_id, receiver_id, room_id, content, is_read, created_at_unix_ms FROM messages \
					WHERE room_id = $1 ORDER BY created_at_unix_ms ASC, seq ASC",
				)
				.bind(room.as_str())
				.fetch_all(pool)
				.await?;

				let readers = sqlx::query_as(
					"SELECT r.message_id, r.reader_id FROM message_readers r JOIN messages m ON m.id = r.message_id \
					WHERE m.room_id = $1 ORDER BY r.seq ASC",
				)
				.bind(room.as_str())
				.fetch_all(pool)
				.await?;

				(rows, readers)
			}
		};

		decode_with_readers(rows, readers)
	}
}
