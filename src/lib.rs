//! Code-Based Linking for voice devices—hand the user a short code, and a background
//! worker turns it into a persisted, auto-refreshing OAuth 2.0 device-grant credential.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod adapter;
pub mod auth;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod obs;
pub mod observer;
pub mod retry;
pub mod store;

mod flow;

#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use tokio::sync::Notify;
	// self
	use crate::{
		adapter::CblAuthorizer,
		auth::{CustomerProfile, FlowStatus},
		config::AuthConfig,
		observer::{AuthorizationManager, CblAuthorizationObserver},
		store::CredentialStore,
	};

	/// Records every reported state transition and lets tests await a matching one.
	#[derive(Debug, Default)]
	pub struct RecordingManager {
		events: Mutex<Vec<FlowStatus>>,
		notify: Notify,
	}
	impl RecordingManager {
		/// Snapshot of the transitions reported so far, in report order.
		pub fn events(&self) -> Vec<FlowStatus> {
			self.events.lock().clone()
		}

		/// Waits until a reported transition satisfies the predicate; returns the most
		/// recent match. Wrap in a timeout when the transition might never arrive.
		pub async fn wait_for(&self, predicate: impl Fn(&FlowStatus) -> bool) -> FlowStatus {
			loop {
				let notified = self.notify.notified();

				if let Some(status) =
					self.events.lock().iter().rev().copied().find(|status| predicate(status))
				{
					return status;
				}

				notified.await;
			}
		}
	}
	impl AuthorizationManager for RecordingManager {
		fn report_state_change(&self, status: FlowStatus, _adapter_id: &str, _user_id: &str) {
			self.events.lock().push(status);
			self.notify.notify_waiters();
		}
	}

	/// Records observer callbacks for assertions.
	#[derive(Debug, Default)]
	pub struct RecordingObserver {
		code_pairs: Mutex<Vec<(Url, String)>>,
		polls: AtomicUsize,
		profiles: Mutex<Vec<CustomerProfile>>,
	}
	impl RecordingObserver {
		/// Code pairs presented to the user so far.
		pub fn code_pairs(&self) -> Vec<(Url, String)> {
			self.code_pairs.lock().clone()
		}

		/// Number of poll attempts announced so far.
		pub fn poll_count(&self) -> usize {
			self.polls.load(Ordering::SeqCst)
		}

		/// Customer profiles delivered so far.
		pub fn profiles(&self) -> Vec<CustomerProfile> {
			self.profiles.lock().clone()
		}
	}
	impl CblAuthorizationObserver for RecordingObserver {
		fn on_request_authorization(&self, verification_uri: &Url, user_code: &str) {
			self.code_pairs.lock().push((verification_uri.clone(), user_code.to_owned()));
		}

		fn on_checking_for_authorization(&self) {
			self.polls.fetch_add(1, Ordering::SeqCst);
		}

		fn on_customer_profile_available(&self, profile: &CustomerProfile) {
			self.profiles.lock().push(profile.clone());
		}
	}

	/// Flow configuration pointed at a mock server, with timings shortened so tests
	/// run against real clocks.
	pub fn test_config(base_url: &str) -> AuthConfig {
		let parse = |path: &str| {
			Url::parse(&format!("{base_url}{path}"))
				.expect("Mock endpoint URL should parse successfully.")
		};

		AuthConfig::builder("client-test")
			.code_pair_url(parse("/auth/O2/create/codepair"))
			.token_url(parse("/auth/O2/token"))
			.customer_profile_url(parse("/user/profile"))
			.request_timeout(Duration::from_secs(5))
			.refresh_head_start(Duration::ZERO)
			.poll_interval_bounds(Duration::from_millis(50), Duration::from_millis(400))
			.build()
			.expect("Test configuration should build successfully.")
	}

	/// Spawns a reqwest-backed authorizer against a mock server with a recording
	/// manager attached.
	pub async fn spawn_test_authorizer(
		base_url: &str,
		store: Arc<dyn CredentialStore>,
	) -> (CblAuthorizer, Arc<RecordingManager>) {
		let manager = Arc::new(RecordingManager::default());
		let authorizer = CblAuthorizer::spawn(test_config(base_url), store, manager.clone())
			.await
			.expect("Test authorizer should spawn successfully.");

		(authorizer, manager)
	}
}

mod _prelude {
	pub use std::{
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use tokio::time::Instant;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {cbl_auth as _, httpmock as _};
