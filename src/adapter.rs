//! Public façade for Code-Based Linking authorization.
//!
//! [`CblAuthorizer`] owns a background worker driving the device-grant state machine.
//! The façade itself never blocks: authorize/reset/failure reports are forwarded to
//! the worker over a command channel, and token/state reads copy values out of a
//! shared snapshot. Dropping the authorizer cancels the worker; [`shutdown`] awaits
//! its termination as well.
//!
//! [`shutdown`]: CblAuthorizer::shutdown

// crates.io
use tokio::{
	sync::mpsc::{self, UnboundedSender},
	task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
// self
#[cfg(feature = "reqwest")] use crate::{error::ConfigError, http::ReqwestExchange};
use crate::{
	_prelude::*,
	auth::{FlowStatus, LifecycleState, TokenSecret, TokenState},
	config::AuthConfig,
	flow::{AuthorizeRequest, Command, FlowState, Shared, engine::Engine},
	http::HttpExchange,
	observer::{AuthorizationManager, CblAuthorizationObserver},
	store::CredentialStore,
};

/// Identifier reported to the authorization manager alongside every state change.
pub const DEFAULT_ADAPTER_ID: &str = "cbl-adapter";

/// Handle to a running Code-Based Linking authorization flow.
#[derive(Debug)]
pub struct CblAuthorizer {
	shared: Arc<Shared>,
	commands: UnboundedSender<Command>,
	cancel: CancellationToken,
	worker: Mutex<Option<JoinHandle<()>>>,
	adapter_id: String,
}
impl CblAuthorizer {
	/// Spawns an authorizer backed by a default [`ReqwestClient`].
	#[cfg(feature = "reqwest")]
	pub async fn spawn(
		config: AuthConfig,
		store: Arc<dyn CredentialStore>,
		manager: Arc<dyn AuthorizationManager>,
	) -> Result<Self> {
		let client = ReqwestClient::builder()
			.timeout(config.request_timeout)
			.build()
			.map_err(ConfigError::http_client_build)?;

		Self::spawn_with_exchange(
			config,
			Arc::new(ReqwestExchange::with_client(client)),
			store,
			manager,
		)
		.await
	}

	/// Spawns an authorizer over a caller-supplied transport.
	///
	/// Opens the credential store and, when a refresh token was persisted by a prior
	/// run, starts directly in the refresh loop: the state enters authorizing without
	/// a notification, and the first report is the outcome of that refresh.
	pub async fn spawn_with_exchange(
		config: AuthConfig,
		http: Arc<dyn HttpExchange>,
		store: Arc<dyn CredentialStore>,
		manager: Arc<dyn AuthorizationManager>,
	) -> Result<Self> {
		store.open_or_create().await?;

		let refresh_token = store.refresh_token().await?;
		let user_id = store.user_id().await?.unwrap_or_default();
		let mut token = TokenState::default();
		let (initial_state, initial_status) = match refresh_token {
			Some(refresh_token) => {
				tracing::info!("Rehydrating a persisted refresh token.");

				token.refresh_token = refresh_token;

				(FlowState::RefreshingToken, FlowStatus::ok(LifecycleState::Authorizing))
			},
			None => (FlowState::Idle, FlowStatus::default()),
		};
		let shared = Arc::new(Shared::new(initial_status, user_id));
		let (commands, receiver) = mpsc::unbounded_channel();
		let cancel = CancellationToken::new();
		let adapter_id = DEFAULT_ADAPTER_ID.to_owned();
		let engine = Engine {
			config,
			adapter_id: adapter_id.clone(),
			http,
			store,
			manager,
			shared: shared.clone(),
			commands: receiver,
			cancel: cancel.clone(),
			token,
			observer: None,
			customer_profile_requested: false,
			reset_pending: false,
			auth_failure_pending: false,
		};
		let worker = tokio::spawn(engine.run(initial_state));

		Ok(Self { shared, commands, cancel, worker: Mutex::new(Some(worker)), adapter_id })
	}

	/// Starts an authorization attempt with the user-id-only profile scope.
	///
	/// Returns `false` when an attempt is already in flight or a credential is
	/// already held; a reset is required before re-authorizing in that case.
	pub fn authorize_using_cbl(&self, observer: Arc<dyn CblAuthorizationObserver>) -> bool {
		self.request_authorization(observer, false)
	}

	/// Starts an authorization attempt that also requests the customer's name and
	/// email, delivered via [`CblAuthorizationObserver::on_customer_profile_available`].
	pub fn authorize_using_cbl_with_customer_profile(
		&self,
		observer: Arc<dyn CblAuthorizationObserver>,
	) -> bool {
		self.request_authorization(observer, true)
	}

	fn request_authorization(
		&self,
		observer: Arc<dyn CblAuthorizationObserver>,
		customer_profile: bool,
	) -> bool {
		{
			let mut published = self.shared.published.write();

			if published.auth_in_flight
				|| !matches!(
					published.status.state,
					LifecycleState::Uninitialized | LifecycleState::UnrecoverableError
				) {
				tracing::warn!(
					state = %published.status.state,
					"Rejecting an authorize request; authorization is already active."
				);

				return false;
			}

			published.auth_in_flight = true;
		}

		let request = AuthorizeRequest { observer, customer_profile };

		if self.commands.send(Command::Authorize(request)).is_err() {
			self.shared.set_auth_in_flight(false);

			tracing::warn!("Authorize request arrived after shutdown.");

			return false;
		}

		true
	}

	/// Current access token; empty when no valid token is held.
	pub fn auth_token(&self) -> TokenSecret {
		self.shared.access_token()
	}

	/// Last reported `(state, error)` pair.
	pub fn state(&self) -> FlowStatus {
		self.shared.status()
	}

	/// Identifier reported alongside state changes.
	pub fn id(&self) -> &str {
		&self.adapter_id
	}

	/// Erases in-memory and persisted credentials, returning to the uninitialized
	/// state. Honored at the worker's next safe point; in-flight requests are not
	/// interrupted mid-exchange.
	pub fn reset(&self) {
		if self.commands.send(Command::Reset).is_err() {
			tracing::warn!("Reset request arrived after shutdown.");
		}
	}

	/// Reports that a request using `token` was rejected by the cloud with an
	/// authorization failure, prompting an immediate refresh. Stale reports against a
	/// token this authorizer no longer holds are ignored.
	pub fn on_auth_failure(&self, token: &str) {
		let current = self.shared.access_token();

		if !token.is_empty() && token != current.expose() {
			tracing::debug!("Ignoring an authorization-failure report for a stale token.");

			return;
		}
		if self.commands.send(Command::AuthFailure).is_err() {
			tracing::warn!("Authorization-failure report arrived after shutdown.");
		}
	}

	/// Cancels the worker and awaits its termination.
	///
	/// After return no further callbacks fire, and token reads observe an empty
	/// token. Persisted credentials are left intact for the next run. Idempotent.
	pub async fn shutdown(&self) {
		self.cancel.cancel();

		let worker = self.worker.lock().take();

		if let Some(worker) = worker
			&& let Err(e) = worker.await
		{
			tracing::error!(error = %e, "Authorization worker terminated abnormally.");
		}

		let mut published = self.shared.published.write();

		published.access_token = TokenSecret::default();
		published.auth_in_flight = false;
	}
}
impl Drop for CblAuthorizer {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}
