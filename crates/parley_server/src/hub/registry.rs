#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parley_domain::{ConnId, UserId};

/// What happens to an identity's existing connection when the same identity connects again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconnectPolicy {
	/// The newer connection replaces the mapping; the older one stays open but unregistered.
	#[default]
	Supersede,
	/// Like `Supersede`, and the older connection is told to close.
	CloseSuperseded,
	/// Every live connection stays registered; the identity goes offline with the last one.
	MultiDevice,
}

impl ReconnectPolicy {
	pub const fn as_str(self) -> &'static str {
		match self {
			ReconnectPolicy::Supersede => "supersede",
			ReconnectPolicy::CloseSuperseded => "close_superseded",
			ReconnectPolicy::MultiDevice => "multi_device",
		}
	}
}

impl fmt::Display for ReconnectPolicy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ReconnectPolicy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
			"supersede" => Ok(ReconnectPolicy::Supersede),
			"close_superseded" => Ok(ReconnectPolicy::CloseSuperseded),
			"multi_device" => Ok(ReconnectPolicy::MultiDevice),
			other => Err(format!(
				"unknown reconnect policy {other:?} (expected supersede, close_superseded or multi_device)"
			)),
		}
	}
}

/// Result of `Registry::register`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Registered {
	/// Connections that lost their association with the identity.
	pub superseded: Vec<ConnId>,
}

/// Result of `Registry::unregister` when the connection was still associated.
#[derive(Debug, PartialEq, Eq)]
pub struct Departed {
	pub user: UserId,
	/// No connection is left for `user`.
	pub went_offline: bool,
}

/// Bidirectional identity ↔ connection map.
///
/// Each identity's connection list is mutated under its own map shard, so a connect racing a
/// disconnect for the same identity is linearized while unrelated identities never contend.
#[derive(Debug)]
pub struct Registry {
	policy: ReconnectPolicy,
	by_user: DashMap<UserId, Vec<ConnId>>,
	by_conn: DashMap<ConnId, UserId>,
}

impl Registry {
	pub fn new(policy: ReconnectPolicy) -> Self {
		Self {
			policy,
			by_user: DashMap::new(),
			by_conn: DashMap::new(),
		}
	}

	pub fn policy(&self) -> ReconnectPolicy {
		self.policy
	}

	pub fn register(&self, user: &UserId, conn: ConnId) -> Registered {
		self.register_with(user, conn, |_| {})
	}

	/// Like [`Registry::register`], running `on_registered` while the identity's entry is still
	/// held. Announcements made from it are ordered with every other change to that identity.
	pub fn register_with(&self, user: &UserId, conn: ConnId, on_registered: impl FnOnce(&Registered)) -> Registered {
		let mut out = Registered::default();
		let mut conns = self.by_user.entry(user.clone()).or_default();

		match self.policy {
			ReconnectPolicy::Supersede | ReconnectPolicy::CloseSuperseded => {
				for old in conns.drain(..).filter(|c| *c != conn) {
					self.by_conn.remove(&old);
					out.superseded.push(old);
				}
				conns.push(conn);
			}
			ReconnectPolicy::MultiDevice => {
				if !conns.contains(&conn) {
					conns.push(conn);
				}
			}
		}

		self.by_conn.insert(conn, user.clone());
		on_registered(&out);
		out
	}

	/// Drop `conn`'s association. `None` if it had none (never registered or already superseded).
	pub fn unregister(&self, conn: ConnId) -> Option<Departed> {
		self.unregister_with(conn, |_| {})
	}

	/// Like [`Registry::unregister`]; `on_offline` runs while the identity's entry is held, so no
	/// concurrent register for the same identity can land between the decision and the callback.
	pub fn unregister_with(&self, conn: ConnId, on_offline: impl FnOnce(&UserId)) -> Option<Departed> {
		let (_, user) = self.by_conn.remove(&conn)?;

		let went_offline = match self.by_user.entry(user.clone()) {
			Entry::Occupied(mut entry) => {
				entry.get_mut().retain(|c| *c != conn);
				if entry.get().is_empty() {
					on_offline(&user);
					entry.remove();
					true
				} else {
					false
				}
			}
			// A racing supersede already emptied and removed the entry; that teardown reported it.
			Entry::Vacant(_) => false,
		};

		Some(Departed { user, went_offline })
	}

	/// Most recent live connection of `user`.
	pub fn resolve(&self, user: &UserId) -> Option<ConnId> {
		self.by_user.get(user).and_then(|conns| conns.last().copied())
	}

	/// All live connections of `user`, oldest first.
	pub fn connections_of(&self, user: &UserId) -> Vec<ConnId> {
		self.by_user.get(user).map(|conns| conns.clone()).unwrap_or_default()
	}

	pub fn identity_of(&self, conn: ConnId) -> Option<UserId> {
		self.by_conn.get(&conn).map(|u| u.clone())
	}

	/// Every registered connection, in no particular order.
	pub fn all_connections(&self) -> Vec<ConnId> {
		self.by_conn.iter().map(|e| *e.key()).collect()
	}

	pub fn connection_count(&self) -> usize {
		self.by_conn.len()
	}

	pub fn online_users(&self) -> usize {
		self.by_user.iter().filter(|e| !e.value().is_empty()).count()
	}
}
