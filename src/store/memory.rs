//! Thread-safe in-memory [`CredentialStore`] for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	store::{CredentialRecord, CredentialStore, StoreFuture},
};

type RecordCell = Arc<RwLock<CredentialRecord>>;

/// Storage backend that keeps the credential record in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(RecordCell);
impl MemoryStore {
	/// Returns a copy of the current record; test helper.
	pub fn record(&self) -> CredentialRecord {
		self.0.read().clone()
	}

	/// Seeds the store with a refresh token, as a prior process run would have.
	pub fn seed_refresh_token(&self, token: impl Into<String>) {
		self.0.write().refresh_token = Some(TokenSecret::new(token));
	}
}
impl CredentialStore for MemoryStore {
	fn open_or_create(&self) -> StoreFuture<'_, ()> {
		Box::pin(async { Ok(()) })
	}

	fn refresh_token(&self) -> StoreFuture<'_, Option<TokenSecret>> {
		let cell = self.0.clone();

		Box::pin(async move {
			Ok(cell.read().refresh_token.clone().filter(|token| !token.is_empty()))
		})
	}

	fn set_refresh_token<'a>(&'a self, token: &'a TokenSecret) -> StoreFuture<'a, ()> {
		let cell = self.0.clone();
		let token = token.clone();

		Box::pin(async move {
			cell.write().refresh_token = Some(token);

			Ok(())
		})
	}

	fn user_id(&self) -> StoreFuture<'_, Option<String>> {
		let cell = self.0.clone();

		Box::pin(async move { Ok(cell.read().user_id.clone().filter(|id| !id.is_empty())) })
	}

	fn set_user_id<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, ()> {
		let cell = self.0.clone();
		let user_id = user_id.to_owned();

		Box::pin(async move {
			cell.write().user_id = Some(user_id);

			Ok(())
		})
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		let cell = self.0.clone();

		Box::pin(async move {
			*cell.write() = CredentialRecord::default();

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::CredentialStore;

	#[tokio::test]
	async fn round_trips_refresh_token_and_user_id() {
		let store = MemoryStore::default();

		assert_eq!(store.refresh_token().await.expect("Fetch should succeed."), None);

		store
			.set_refresh_token(&TokenSecret::new("refresh-1"))
			.await
			.expect("Set should succeed.");
		store.set_user_id("user-1").await.expect("Set should succeed.");

		assert_eq!(
			store.refresh_token().await.expect("Fetch should succeed."),
			Some(TokenSecret::new("refresh-1"))
		);
		assert_eq!(
			store.user_id().await.expect("Fetch should succeed."),
			Some("user-1".into())
		);
	}

	#[tokio::test]
	async fn clear_erases_the_record() {
		let store = MemoryStore::default();

		store
			.set_refresh_token(&TokenSecret::new("refresh-1"))
			.await
			.expect("Set should succeed.");
		store.clear().await.expect("Clear should succeed.");

		assert!(store.record().is_empty());
		assert_eq!(store.refresh_token().await.expect("Fetch should succeed."), None);
	}

	#[tokio::test]
	async fn empty_values_read_back_as_absent() {
		let store = MemoryStore::default();

		store.set_refresh_token(&TokenSecret::default()).await.expect("Set should succeed.");
		store.set_user_id("").await.expect("Set should succeed.");

		assert_eq!(store.refresh_token().await.expect("Fetch should succeed."), None);
		assert_eq!(store.user_id().await.expect("Fetch should succeed."), None);
	}
}
