//! Storage contracts and built-in credential store implementations.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// crates.io
use time::OffsetDateTime;
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Boxed future returned by [`CredentialStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract for the device's long-lived credentials.
///
/// The engine persists exactly one logical record (refresh token + user id) and is
/// the store's only writer; implementations are used exclusively from the worker
/// after construction.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Opens the backing storage, creating it when absent.
	fn open_or_create(&self) -> StoreFuture<'_, ()>;

	/// Fetches the persisted refresh token, if any.
	fn refresh_token(&self) -> StoreFuture<'_, Option<TokenSecret>>;

	/// Persists or replaces the refresh token.
	fn set_refresh_token<'a>(&'a self, token: &'a TokenSecret) -> StoreFuture<'a, ()>;

	/// Fetches the persisted user identifier, if any.
	fn user_id(&self) -> StoreFuture<'_, Option<String>>;

	/// Persists or replaces the user identifier.
	fn set_user_id<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, ()>;

	/// Erases the persisted record.
	fn clear(&self) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// On-disk layout of the single credential record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
	/// Persisted refresh token; `None` once cleared.
	pub refresh_token: Option<TokenSecret>,
	/// Persisted opaque user identifier.
	pub user_id: Option<String>,
	/// Instant of the last mutation, for operator inspection only.
	pub updated_at: Option<OffsetDateTime>,
}
impl CredentialRecord {
	/// Returns `true` when the record carries no credential material.
	pub fn is_empty(&self) -> bool {
		self.refresh_token.as_ref().is_none_or(TokenSecret::is_empty)
			&& self.user_id.as_ref().is_none_or(String::is_empty)
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;
	use crate::error::Error;

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let crate_error: Error = store_error.clone().into();

		assert!(matches!(crate_error, Error::Storage(_)));
		assert!(crate_error.to_string().contains("database unreachable"));

		let source = StdError::source(&crate_error)
			.expect("Crate error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn record_emptiness_ignores_the_timestamp() {
		let mut record = CredentialRecord::default();

		assert!(record.is_empty());

		record.updated_at = Some(OffsetDateTime::now_utc());

		assert!(record.is_empty());

		record.refresh_token = Some(TokenSecret::new("refresh-1"));

		assert!(!record.is_empty());
	}
}
