//! File-backed [`CredentialStore`] persisting the record as JSON after each mutation.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// crates.io
use time::OffsetDateTime;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	store::{CredentialRecord, CredentialStore, StoreError, StoreFuture},
};

/// Persists the credential record to a JSON file, writing atomically via a
/// temporary-file rename on every mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<CredentialRecord>>,
}
impl FileStore {
	/// Creates a store at the provided path; data is loaded by [`open_or_create`].
	///
	/// [`open_or_create`]: CredentialStore::open_or_create
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into(), inner: Arc::new(RwLock::new(CredentialRecord::default())) }
	}

	fn load(path: &Path) -> Result<CredentialRecord, StoreError> {
		if !path.exists() {
			return Ok(CredentialRecord::default());
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(CredentialRecord::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(&self, record: &CredentialRecord) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized = serde_json::to_vec_pretty(record).map_err(|e| {
			StoreError::Serialization { message: format!("Failed to serialize record: {e}") }
		})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn mutate(
		&self,
		apply: impl FnOnce(&mut CredentialRecord),
	) -> Result<(), StoreError> {
		let mut record = self.inner.write();

		apply(&mut record);
		record.updated_at = Some(OffsetDateTime::now_utc());

		self.persist(&record)
	}
}
impl CredentialStore for FileStore {
	fn open_or_create(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let loaded = Self::load(&self.path)?;

			*self.inner.write() = loaded;

			Ok(())
		})
	}

	fn refresh_token(&self) -> StoreFuture<'_, Option<TokenSecret>> {
		Box::pin(async move {
			Ok(self.inner.read().refresh_token.clone().filter(|token| !token.is_empty()))
		})
	}

	fn set_refresh_token<'a>(&'a self, token: &'a TokenSecret) -> StoreFuture<'a, ()> {
		Box::pin(async move { self.mutate(|record| record.refresh_token = Some(token.clone())) })
	}

	fn user_id(&self) -> StoreFuture<'_, Option<String>> {
		Box::pin(async move { Ok(self.inner.read().user_id.clone().filter(|id| !id.is_empty())) })
	}

	fn set_user_id<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move { self.mutate(|record| record.user_id = Some(user_id.to_owned())) })
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.mutate(|record| {
				record.refresh_token = None;
				record.user_id = None;
			})
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn temp_store() -> (tempfile::TempDir, FileStore) {
		let dir = tempfile::tempdir().expect("Temporary directory should be created.");
		let store = FileStore::new(dir.path().join("credentials.json"));

		(dir, store)
	}

	#[tokio::test]
	async fn persists_across_reopen() {
		let (dir, store) = temp_store();

		store.open_or_create().await.expect("Open should succeed.");
		store
			.set_refresh_token(&TokenSecret::new("refresh-1"))
			.await
			.expect("Set should succeed.");
		store.set_user_id("user-1").await.expect("Set should succeed.");

		let reopened = FileStore::new(dir.path().join("credentials.json"));

		reopened.open_or_create().await.expect("Reopen should succeed.");

		assert_eq!(
			reopened.refresh_token().await.expect("Fetch should succeed."),
			Some(TokenSecret::new("refresh-1"))
		);
		assert_eq!(
			reopened.user_id().await.expect("Fetch should succeed."),
			Some("user-1".into())
		);
	}

	#[tokio::test]
	async fn clear_survives_reopen() {
		let (dir, store) = temp_store();

		store.open_or_create().await.expect("Open should succeed.");
		store
			.set_refresh_token(&TokenSecret::new("refresh-1"))
			.await
			.expect("Set should succeed.");
		store.clear().await.expect("Clear should succeed.");

		let reopened = FileStore::new(dir.path().join("credentials.json"));

		reopened.open_or_create().await.expect("Reopen should succeed.");

		assert_eq!(reopened.refresh_token().await.expect("Fetch should succeed."), None);
	}

	#[tokio::test]
	async fn missing_file_opens_empty() {
		let (_dir, store) = temp_store();

		store.open_or_create().await.expect("Open should succeed.");

		assert_eq!(store.refresh_token().await.expect("Fetch should succeed."), None);
		assert_eq!(store.user_id().await.expect("Fetch should succeed."), None);
	}

	#[tokio::test]
	async fn corrupt_file_is_a_serialization_error() {
		let (dir, store) = temp_store();

		fs::write(dir.path().join("credentials.json"), b"not json")
			.expect("Fixture write should succeed.");

		let result = store.open_or_create().await;

		assert!(matches!(result, Err(StoreError::Serialization { .. })));
	}
}
