#![forbid(unsafe_code)]

use parley_protocol::codes;
use thiserror::Error;

use crate::store::StoreError;

/// Failures surfaced to the client that issued a command.
///
/// Offline recipients are not errors; they are counted and skipped.
#[derive(Debug, Error)]
pub enum HubError {
	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	#[error("not found: {0}")]
	NotFound(String),

	#[error("persistence failed: {0}")]
	Persistence(#[source] StoreError),
}

impl HubError {
	/// Wire error code for `CommandResult.error_code`.
	pub fn code(&self) -> &'static str {
		match self {
			HubError::InvalidArgument(_) => codes::INVALID_ARGUMENT,
			HubError::NotFound(_) => codes::NOT_FOUND,
			HubError::Persistence(_) => codes::PERSISTENCE,
		}
	}
}

impl From<StoreError> for HubError {
	fn from(e: StoreError) -> Self {
		match e {
			StoreError::NotFound(id) => HubError::NotFound(format!("message {id}")),
			other => HubError::Persistence(other),
		}
	}
}
