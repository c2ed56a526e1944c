#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use parley_domain::{Channel, ClientEvent, HistoryQuery, Message, MessageId, MessageTarget, RoomId, ServerEvent, TypingTarget, UserId};
use tokio::sync::mpsc;

use super::*;
use crate::store::{InMemoryStore, StoreError};

fn user(id: &str) -> UserId {
	UserId::new(id).unwrap()
}

fn room(id: &str) -> RoomId {
	RoomId::new(id).unwrap()
}

fn hub(cfg: HubConfig) -> (Arc<Hub>, Arc<InMemoryStore>) {
	let store = Arc::new(InMemoryStore::new());
	(Hub::new(cfg, store.clone()), store)
}

fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Outbound> {
	let mut out = Vec::new();
	while let Ok(item) = rx.try_recv() {
		out.push(item);
	}
	out
}

fn events(rx: &mut mpsc::Receiver<Outbound>) -> Vec<(Channel, ServerEvent)> {
	drain(rx)
		.into_iter()
		.filter_map(|item| match item {
			Outbound::Event { channel, event } => Some((channel, (*event).clone())),
			Outbound::Close { .. } => None,
		})
		.collect()
}

fn typing(who: &str, is_typing: bool) -> ServerEvent {
	ServerEvent::UserTyping {
		user: user(who),
		is_typing,
	}
}

fn status(who: &str, is_online: bool) -> ServerEvent {
	ServerEvent::UserStatus {
		user: user(who),
		is_online,
	}
}

fn send_room(content: &str, to: &str) -> ClientEvent {
	ClientEvent::Send {
		content: content.to_string(),
		target: MessageTarget::Room(room(to)),
	}
}

fn send_direct(content: &str, to: &str) -> ClientEvent {
	ClientEvent::Send {
		content: content.to_string(),
		target: MessageTarget::Direct(user(to)),
	}
}

fn expect_message(reply: Result<Reply, HubError>) -> Message {
	match reply {
		Ok(Reply::Message(message)) => message,
		other => panic!("expected a message reply, got {other:?}"),
	}
}

#[tokio::test]
async fn connect_announces_presence_to_everyone() {
	let (hub, store) = hub(HubConfig::default());

	let (_alice, mut alice_rx) = hub.connect(user("alice")).await;
	assert_eq!(events(&mut alice_rx), vec![(Channel::Presence, status("alice", true))]);

	let (_bob, mut bob_rx) = hub.connect(user("bob")).await;
	assert_eq!(events(&mut alice_rx), vec![(Channel::Presence, status("bob", true))]);
	assert_eq!(events(&mut bob_rx), vec![(Channel::Presence, status("bob", true))]);

	assert_eq!(store.online_status(&user("bob")).await.unwrap(), Some(true));
	assert_eq!(hub.stats().online_users, 2);
}

#[tokio::test]
async fn room_message_reaches_every_member() {
	let (hub, _store) = hub(HubConfig::default());
	let (alice, mut alice_rx) = hub.connect(user("alice")).await;
	let (bob, mut bob_rx) = hub.connect(user("bob")).await;
	let (_carol, mut carol_rx) = hub.connect(user("carol")).await;

	alice.handle(ClientEvent::JoinRoom(room("lobby"))).await.unwrap();
	bob.handle(ClientEvent::JoinRoom(room("lobby"))).await.unwrap();
	drain(&mut alice_rx);
	drain(&mut bob_rx);
	drain(&mut carol_rx);

	let message = expect_message(alice.handle(send_room("hi", "lobby")).await);
	assert_eq!(message.content, "hi");
	assert_eq!(message.sender, user("alice"));

	let expected = vec![(Channel::Room(room("lobby")), ServerEvent::NewMessage { message })];
	assert_eq!(events(&mut alice_rx), expected);
	assert_eq!(events(&mut bob_rx), expected);
	assert!(events(&mut carol_rx).is_empty());
}

#[tokio::test]
async fn room_message_is_not_delivered_to_non_members() {
	let (hub, _store) = hub(HubConfig::default());
	let (alice, mut alice_rx) = hub.connect(user("alice")).await;
	let (_bob, mut bob_rx) = hub.connect(user("bob")).await;
	drain(&mut alice_rx);
	drain(&mut bob_rx);

	expect_message(alice.handle(send_room("anyone?", "empty")).await);
	assert!(events(&mut alice_rx).is_empty());
	assert!(events(&mut bob_rx).is_empty());
}

#[tokio::test]
async fn direct_message_reaches_both_parties_on_their_own_channel() {
	let (hub, _store) = hub(HubConfig::default());
	let (alice, mut alice_rx) = hub.connect(user("alice")).await;
	let (bob, mut bob_rx) = hub.connect(user("bob")).await;
	let (_carol, mut carol_rx) = hub.connect(user("carol")).await;
	drain(&mut alice_rx);
	drain(&mut bob_rx);
	drain(&mut carol_rx);

	let message = expect_message(alice.handle(send_direct("psst", "bob")).await);
	let event = ServerEvent::NewMessage { message };

	assert_eq!(events(&mut alice_rx), vec![(Channel::Conn(alice.conn_id()), event.clone())]);
	assert_eq!(events(&mut bob_rx), vec![(Channel::Conn(bob.conn_id()), event)]);
	assert!(events(&mut carol_rx).is_empty());
}

#[tokio::test]
async fn direct_message_to_offline_user_is_persisted_without_delivery() {
	let (hub, store) = hub(HubConfig::default());
	let (alice, mut alice_rx) = hub.connect(user("alice")).await;
	drain(&mut alice_rx);

	let message = expect_message(alice.handle(send_direct("later", "bob")).await);
	assert_eq!(store.message_count().await, 1);
	assert_eq!(
		events(&mut alice_rx),
		vec![(Channel::Conn(alice.conn_id()), ServerEvent::NewMessage { message: message.clone() })]
	);

	// No replay on connect; history is fetched explicitly.
	let (bob, mut bob_rx) = hub.connect(user("bob")).await;
	assert_eq!(events(&mut bob_rx), vec![(Channel::Presence, status("bob", true))]);

	let history = bob.handle(ClientEvent::FetchHistory(HistoryQuery::Conversation(user("alice")))).await;
	assert_eq!(history.unwrap(), Reply::History(vec![message]));
}

#[tokio::test]
async fn empty_content_is_rejected_before_persistence() {
	let (hub, store) = hub(HubConfig::default());
	let (alice, _alice_rx) = hub.connect(user("alice")).await;

	let err = alice.handle(send_room("   ", "lobby")).await.unwrap_err();
	assert!(matches!(err, HubError::InvalidArgument(_)));
	assert_eq!(err.code(), parley_protocol::codes::INVALID_ARGUMENT);
	assert_eq!(store.message_count().await, 0);
}

struct FailingStore;

#[async_trait::async_trait]
impl MessageStore for FailingStore {
	async fn create_message(&self, _: &UserId, _: &str, _: &MessageTarget) -> Result<Message, StoreError> {
		Err(StoreError::Corrupt("disk unavailable".into()))
	}

	async fn mark_read(&self, id: MessageId, _: &UserId) -> Result<Message, StoreError> {
		Err(StoreError::NotFound(id))
	}

	async fn update_online_status(&self, _: &UserId, _: bool) -> Result<(), StoreError> {
		Err(StoreError::Corrupt("disk unavailable".into()))
	}

	async fn online_status(&self, _: &UserId) -> Result<Option<bool>, StoreError> {
		Ok(None)
	}

	async fn conversation(&self, _: &UserId, _: &UserId) -> Result<Vec<Message>, StoreError> {
		Ok(Vec::new())
	}

	async fn room_history(&self, _: &RoomId) -> Result<Vec<Message>, StoreError> {
		Ok(Vec::new())
	}
}

#[tokio::test]
async fn persistence_failure_delivers_nothing() {
	let hub = Hub::new(HubConfig::default(), Arc::new(FailingStore));
	let (alice, mut alice_rx) = hub.connect(user("alice")).await;
	let (bob, mut bob_rx) = hub.connect(user("bob")).await;
	alice.handle(ClientEvent::JoinRoom(room("lobby"))).await.unwrap();
	bob.handle(ClientEvent::JoinRoom(room("lobby"))).await.unwrap();
	drain(&mut alice_rx);
	drain(&mut bob_rx);

	let err = alice.handle(send_room("lost", "lobby")).await.unwrap_err();
	assert!(matches!(err, HubError::Persistence(_)));
	assert_eq!(err.code(), parley_protocol::codes::PERSISTENCE);
	assert!(events(&mut alice_rx).is_empty());
	assert!(events(&mut bob_rx).is_empty());
}

#[tokio::test]
async fn presence_persist_failure_does_not_block_connect() {
	let hub = Hub::new(HubConfig::default(), Arc::new(FailingStore));
	let (_alice, mut alice_rx) = hub.connect(user("alice")).await;
	assert_eq!(events(&mut alice_rx), vec![(Channel::Presence, status("alice", true))]);
	assert_eq!(hub.resolve(&user("alice")).map(|c| c.0), Some(1));
}

#[tokio::test]
async fn group_typing_skips_the_typist() {
	let (hub, _store) = hub(HubConfig::default());
	let (alice, mut alice_rx) = hub.connect(user("alice")).await;
	let (bob, mut bob_rx) = hub.connect(user("bob")).await;
	alice.handle(ClientEvent::JoinRoom(room("lobby"))).await.unwrap();
	bob.handle(ClientEvent::JoinRoom(room("lobby"))).await.unwrap();
	drain(&mut alice_rx);
	drain(&mut bob_rx);

	alice
		.handle(ClientEvent::Typing(TypingTarget::Room(room("lobby"))))
		.await
		.unwrap();
	assert_eq!(events(&mut bob_rx), vec![(Channel::Room(room("lobby")), typing("alice", true))]);
	assert!(events(&mut alice_rx).is_empty());

	alice
		.handle(ClientEvent::StopTyping(TypingTarget::Room(room("lobby"))))
		.await
		.unwrap();
	assert_eq!(events(&mut bob_rx), vec![(Channel::Room(room("lobby")), typing("alice", false))]);
	assert_eq!(hub.typing_state(alice.conn_id()), None);
}

#[tokio::test]
async fn direct_typing_goes_to_peer_connection() {
	let (hub, _store) = hub(HubConfig::default());
	let (alice, mut alice_rx) = hub.connect(user("alice")).await;
	let (bob, mut bob_rx) = hub.connect(user("bob")).await;
	drain(&mut alice_rx);
	drain(&mut bob_rx);

	alice.handle(ClientEvent::Typing(TypingTarget::User(user("bob")))).await.unwrap();
	assert_eq!(events(&mut bob_rx), vec![(Channel::Conn(bob.conn_id()), typing("alice", true))]);
	assert!(events(&mut alice_rx).is_empty());
}

#[tokio::test]
async fn typing_to_offline_user_is_dropped_and_not_replayed() {
	let (hub, _store) = hub(HubConfig::default());
	let (alice, mut alice_rx) = hub.connect(user("alice")).await;
	drain(&mut alice_rx);

	let reply = alice.handle(ClientEvent::Typing(TypingTarget::User(user("bob")))).await;
	assert_eq!(reply.unwrap(), Reply::Ack);
	assert!(events(&mut alice_rx).is_empty());

	let (_bob, mut bob_rx) = hub.connect(user("bob")).await;
	assert_eq!(events(&mut bob_rx), vec![(Channel::Presence, status("bob", true))]);
}

#[tokio::test]
async fn switching_typing_target_closes_the_previous_indicator() {
	let (hub, _store) = hub(HubConfig::default());
	let (alice, mut alice_rx) = hub.connect(user("alice")).await;
	let (bob, mut bob_rx) = hub.connect(user("bob")).await;
	let (carol, mut carol_rx) = hub.connect(user("carol")).await;
	drain(&mut alice_rx);
	drain(&mut bob_rx);
	drain(&mut carol_rx);

	alice.handle(ClientEvent::Typing(TypingTarget::User(user("bob")))).await.unwrap();
	alice.handle(ClientEvent::Typing(TypingTarget::User(user("carol")))).await.unwrap();

	assert_eq!(
		events(&mut bob_rx),
		vec![
			(Channel::Conn(bob.conn_id()), typing("alice", true)),
			(Channel::Conn(bob.conn_id()), typing("alice", false)),
		]
	);
	assert_eq!(events(&mut carol_rx), vec![(Channel::Conn(carol.conn_id()), typing("alice", true))]);
}

#[tokio::test]
async fn repeated_typing_rebroadcasts_and_idle_stop_is_silent() {
	let (hub, _store) = hub(HubConfig::default());
	let (alice, mut alice_rx) = hub.connect(user("alice")).await;
	let (bob, mut bob_rx) = hub.connect(user("bob")).await;
	drain(&mut alice_rx);
	drain(&mut bob_rx);

	alice
		.handle(ClientEvent::StopTyping(TypingTarget::User(user("bob"))))
		.await
		.unwrap();
	assert!(events(&mut bob_rx).is_empty());

	alice.handle(ClientEvent::Typing(TypingTarget::User(user("bob")))).await.unwrap();
	alice.handle(ClientEvent::Typing(TypingTarget::User(user("bob")))).await.unwrap();
	assert_eq!(
		events(&mut bob_rx),
		vec![
			(Channel::Conn(bob.conn_id()), typing("alice", true)),
			(Channel::Conn(bob.conn_id()), typing("alice", true)),
		]
	);
}

#[tokio::test]
async fn sending_clears_typing_indicator() {
	let (hub, _store) = hub(HubConfig::default());
	let (alice, mut alice_rx) = hub.connect(user("alice")).await;
	let (bob, mut bob_rx) = hub.connect(user("bob")).await;
	drain(&mut alice_rx);
	drain(&mut bob_rx);

	alice.handle(ClientEvent::Typing(TypingTarget::User(user("bob")))).await.unwrap();
	let message = expect_message(alice.handle(send_direct("done", "bob")).await);

	assert_eq!(
		events(&mut bob_rx),
		vec![
			(Channel::Conn(bob.conn_id()), typing("alice", true)),
			(Channel::Conn(bob.conn_id()), typing("alice", false)),
			(Channel::Conn(bob.conn_id()), ServerEvent::NewMessage { message }),
		]
	);
	assert_eq!(hub.typing_state(alice.conn_id()), None);
}

#[tokio::test]
async fn disconnect_while_typing_emits_exactly_one_stop() {
	let (hub, _store) = hub(HubConfig::default());
	let (alice, mut alice_rx) = hub.connect(user("alice")).await;
	let (bob, mut bob_rx) = hub.connect(user("bob")).await;
	alice.handle(ClientEvent::JoinRoom(room("lobby"))).await.unwrap();
	bob.handle(ClientEvent::JoinRoom(room("lobby"))).await.unwrap();
	alice
		.handle(ClientEvent::Typing(TypingTarget::Room(room("lobby"))))
		.await
		.unwrap();
	drain(&mut alice_rx);
	drain(&mut bob_rx);

	drop(alice);

	assert_eq!(
		events(&mut bob_rx),
		vec![
			(Channel::Room(room("lobby")), typing("alice", false)),
			(Channel::Presence, status("alice", false)),
		]
	);
	assert_eq!(hub.members_of(&room("lobby")), vec![bob.conn_id()]);
	assert_eq!(hub.stats().typing, 0);
}

#[tokio::test]
async fn disconnect_persists_offline_status() {
	let (hub, store) = hub(HubConfig::default());
	let (alice, _alice_rx) = hub.connect(user("alice")).await;
	drop(alice);

	tokio::time::timeout(Duration::from_secs(2), async {
		while store.online_status(&user("alice")).await.unwrap() != Some(false) {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.expect("offline status persisted");
	assert_eq!(hub.resolve(&user("alice")), None);
}

#[tokio::test]
async fn mark_read_is_broadcast_each_time_but_recorded_once() {
	let (hub, store) = hub(HubConfig::default());
	let (alice, mut alice_rx) = hub.connect(user("alice")).await;
	let (bob, mut bob_rx) = hub.connect(user("bob")).await;
	drain(&mut alice_rx);

	let message = expect_message(alice.handle(send_direct("read me", "bob")).await);
	drain(&mut alice_rx);
	drain(&mut bob_rx);

	let first = expect_message(bob.handle(ClientEvent::MarkRead(message.id)).await);
	let second = expect_message(bob.handle(ClientEvent::MarkRead(message.id)).await);
	assert_eq!(first.read_by, vec![user("bob")]);
	assert_eq!(second.read_by, vec![user("bob")]);
	assert!(second.is_read);

	let receipt = ServerEvent::MessageRead { message: second };
	assert_eq!(
		events(&mut alice_rx),
		vec![
			(Channel::Conn(alice.conn_id()), receipt.clone()),
			(Channel::Conn(alice.conn_id()), receipt.clone()),
		]
	);
	assert_eq!(events(&mut bob_rx).len(), 2);

	let stored = store.conversation(&user("alice"), &user("bob")).await.unwrap();
	assert_eq!(stored[0].read_by, vec![user("bob")]);
}

#[tokio::test]
async fn room_receipt_goes_to_room_members() {
	let (hub, _store) = hub(HubConfig::default());
	let (alice, mut alice_rx) = hub.connect(user("alice")).await;
	let (bob, mut bob_rx) = hub.connect(user("bob")).await;
	alice.handle(ClientEvent::JoinRoom(room("lobby"))).await.unwrap();
	bob.handle(ClientEvent::JoinRoom(room("lobby"))).await.unwrap();

	let message = expect_message(alice.handle(send_room("news", "lobby")).await);
	drain(&mut alice_rx);
	drain(&mut bob_rx);

	let read = expect_message(bob.handle(ClientEvent::MarkRead(message.id)).await);
	let expected = vec![(Channel::Room(room("lobby")), ServerEvent::MessageRead { message: read })];
	assert_eq!(events(&mut alice_rx), expected);
	assert_eq!(events(&mut bob_rx), expected);
}

#[tokio::test]
async fn mark_read_of_unknown_message_is_not_found() {
	let (hub, _store) = hub(HubConfig::default());
	let (alice, _alice_rx) = hub.connect(user("alice")).await;

	let err = alice.handle(ClientEvent::MarkRead(MessageId::new_v4())).await.unwrap_err();
	assert!(matches!(err, HubError::NotFound(_)));
	assert_eq!(err.code(), parley_protocol::codes::NOT_FOUND);
}

#[tokio::test]
async fn supersede_keeps_user_online_when_old_connection_closes() {
	let (hub, _store) = hub(HubConfig::default());
	let (_bob, mut bob_rx) = hub.connect(user("bob")).await;
	let (first, mut first_rx) = hub.connect(user("alice")).await;
	let (second, _second_rx) = hub.connect(user("alice")).await;
	drain(&mut bob_rx);

	assert_eq!(hub.resolve(&user("alice")), Some(second.conn_id()));
	assert!(drain(&mut first_rx).iter().all(|item| matches!(item, Outbound::Event { .. })));

	drop(first);
	assert!(events(&mut bob_rx).is_empty());
	assert_eq!(hub.connections_of(&user("alice")), vec![second.conn_id()]);

	drop(second);
	assert_eq!(events(&mut bob_rx), vec![(Channel::Presence, status("alice", false))]);
}

#[tokio::test]
async fn close_superseded_tells_the_old_connection_to_close() {
	let (hub, _store) = hub(HubConfig {
		reconnect_policy: ReconnectPolicy::CloseSuperseded,
		..HubConfig::default()
	});
	let (_first, mut first_rx) = hub.connect(user("alice")).await;
	let (second, _second_rx) = hub.connect(user("alice")).await;

	let closes: Vec<&'static str> = drain(&mut first_rx)
		.into_iter()
		.filter_map(|item| match item {
			Outbound::Close { reason } => Some(reason),
			Outbound::Event { .. } => None,
		})
		.collect();
	assert_eq!(closes, vec!["superseded"]);
	assert_eq!(hub.resolve(&user("alice")), Some(second.conn_id()));
}

#[tokio::test]
async fn closed_superseded_connection_still_cleans_up() {
	let (hub, _store) = hub(HubConfig {
		reconnect_policy: ReconnectPolicy::CloseSuperseded,
		..HubConfig::default()
	});
	let (bob, mut bob_rx) = hub.connect(user("bob")).await;
	let (first, first_rx) = hub.connect(user("alice")).await;
	let first_conn = first.conn_id();
	first.handle(ClientEvent::JoinRoom(room("g"))).await.unwrap();
	first.handle(ClientEvent::Typing(TypingTarget::User(user("bob")))).await.unwrap();
	bob.handle(ClientEvent::JoinRoom(room("g"))).await.unwrap();

	let (second, _second_rx) = hub.connect(user("alice")).await;
	// The writer exits on Close and drops its receiver before the session goes away.
	drop(first_rx);
	expect_message(bob.handle(send_room("anyone?", "g")).await);
	drain(&mut bob_rx);

	drop(first);
	assert_eq!(hub.members_of(&room("g")), vec![bob.conn_id()]);
	assert_eq!(hub.typing_state(first_conn), None);
	assert_eq!(hub.resolve(&user("alice")), Some(second.conn_id()));
	assert_eq!(events(&mut bob_rx), vec![(Channel::Conn(bob.conn_id()), typing("alice", false))]);
}

#[tokio::test]
async fn teardown_runs_after_the_writer_has_gone() {
	let (hub, _store) = hub(HubConfig::default());
	let (bob, mut bob_rx) = hub.connect(user("bob")).await;
	let (alice, alice_rx) = hub.connect(user("alice")).await;
	let (carol, _carol_rx) = hub.connect(user("carol")).await;
	let alice_conn = alice.conn_id();

	alice.handle(ClientEvent::JoinRoom(room("g"))).await.unwrap();
	carol.handle(ClientEvent::JoinRoom(room("g"))).await.unwrap();
	alice.handle(ClientEvent::Typing(TypingTarget::User(user("bob")))).await.unwrap();
	drain(&mut bob_rx);

	// Deliveries to a connection whose writer is gone must not count as its teardown.
	drop(alice_rx);
	expect_message(carol.handle(send_room("hello g", "g")).await);

	drop(alice);
	assert_eq!(hub.resolve(&user("alice")), None);
	assert_eq!(hub.members_of(&room("g")), vec![carol.conn_id()]);
	assert_eq!(hub.typing_state(alice_conn), None);
	assert_eq!(
		hub.stats(),
		HubStats {
			connections: 2,
			online_users: 2,
			rooms: 1,
			typing: 0,
		}
	);
	assert_eq!(
		events(&mut bob_rx),
		vec![
			(Channel::Conn(bob.conn_id()), typing("alice", false)),
			(Channel::Presence, status("alice", false)),
		]
	);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn offline_is_never_announced_over_a_newer_connect() {
	let (hub, _store) = hub(HubConfig {
		outbound_queue_capacity: 4096,
		..HubConfig::default()
	});
	let (_bob, mut bob_rx) = hub.connect(user("bob")).await;
	drain(&mut bob_rx);

	let mut tasks = Vec::new();
	for _ in 0..8 {
		let hub = Arc::clone(&hub);
		tasks.push(tokio::spawn(async move {
			for _ in 0..50 {
				let (session, _rx) = hub.connect(user("alice")).await;
				tokio::task::yield_now().await;
				drop(session);
			}
		}));
	}
	for task in tasks {
		task.await.unwrap();
	}

	let statuses: Vec<bool> = events(&mut bob_rx)
		.into_iter()
		.filter_map(|(_, ev)| match ev {
			ServerEvent::UserStatus { user, is_online } if user.as_str() == "alice" => Some(is_online),
			_ => None,
		})
		.collect();

	// Each offline follows an online; an offline that overtook a reconnect would show up twice in a row.
	assert!(statuses.windows(2).all(|w| w[0] || w[1]), "{statuses:?}");
	assert_eq!(statuses.last(), Some(&false));
	assert_eq!(hub.resolve(&user("alice")), None);
}

#[tokio::test]
async fn multi_device_goes_offline_with_the_last_connection() {
	let (hub, _store) = hub(HubConfig {
		reconnect_policy: ReconnectPolicy::MultiDevice,
		..HubConfig::default()
	});
	let (_bob, mut bob_rx) = hub.connect(user("bob")).await;
	let (phone, _phone_rx) = hub.connect(user("alice")).await;
	let (laptop, mut laptop_rx) = hub.connect(user("alice")).await;
	drain(&mut bob_rx);
	drain(&mut laptop_rx);

	assert_eq!(hub.connections_of(&user("alice")), vec![phone.conn_id(), laptop.conn_id()]);

	drop(phone);
	assert!(events(&mut bob_rx).is_empty());

	// Direct messages reach every device of the receiver.
	let (carol, _carol_rx) = hub.connect(user("carol")).await;
	drain(&mut bob_rx);
	drain(&mut laptop_rx);
	expect_message(carol.handle(send_direct("hey", "alice")).await);
	assert_eq!(events(&mut laptop_rx).len(), 1);

	drop(laptop);
	assert_eq!(events(&mut bob_rx), vec![(Channel::Presence, status("alice", false))]);
}

#[tokio::test]
async fn leave_room_stops_room_delivery() {
	let (hub, _store) = hub(HubConfig::default());
	let (alice, mut alice_rx) = hub.connect(user("alice")).await;
	let (bob, mut bob_rx) = hub.connect(user("bob")).await;
	alice.handle(ClientEvent::JoinRoom(room("lobby"))).await.unwrap();
	bob.handle(ClientEvent::JoinRoom(room("lobby"))).await.unwrap();
	bob.handle(ClientEvent::LeaveRoom(room("lobby"))).await.unwrap();
	drain(&mut alice_rx);
	drain(&mut bob_rx);

	expect_message(alice.handle(send_room("still there?", "lobby")).await);
	assert_eq!(events(&mut alice_rx).len(), 1);
	assert!(events(&mut bob_rx).is_empty());
}

#[tokio::test]
async fn stats_follow_connections() {
	let (hub, _store) = hub(HubConfig::default());
	let (alice, _alice_rx) = hub.connect(user("alice")).await;
	alice.handle(ClientEvent::JoinRoom(room("lobby"))).await.unwrap();

	assert_eq!(
		hub.stats(),
		HubStats {
			connections: 1,
			online_users: 1,
			rooms: 1,
			typing: 0,
		}
	);

	drop(alice);
	assert_eq!(
		hub.stats(),
		HubStats {
			connections: 0,
			online_users: 0,
			rooms: 0,
			typing: 0,
		}
	);
}
