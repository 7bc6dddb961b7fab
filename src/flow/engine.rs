//! Worker-side implementation of the authorization flow.
//!
//! The engine owns all mutable flow state and runs on a single background task. It
//! reacts to façade commands, drives the code-pair/exchange/refresh loops against the
//! authorization server, and publishes `(state, error)` transitions through the shared
//! snapshot. Shutdown arrives through the cancellation token and preempts any wait.

// crates.io
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	auth::{CustomerProfile, FlowStatus, LifecycleState, TokenSecret, TokenState},
	codec::{self, CodePair, TokenGrant},
	config::AuthConfig,
	error::{ErrorKind, TransportError},
	flow::{AuthorizeRequest, Command, FlowState, Shared},
	http::{HttpExchange, HttpResponse},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	observer::{AuthorizationManager, CblAuthorizationObserver},
	retry::RetryScheduler,
	store::CredentialStore,
};

/// Multiplier applied to the poll interval on each `slow_down` response.
const SLOW_DOWN_FACTOR: u32 = 2;

/// Why a wait ended.
enum Wake {
	/// The deadline elapsed.
	Deadline,
	/// A reset command arrived; `reset_pending` has been set.
	Reset,
	/// An authorization-failure signal arrived; `auth_failure_pending` has been set.
	AuthFailure,
	/// A new authorize request arrived.
	Authorize(AuthorizeRequest),
	/// The worker was cancelled or the façade dropped.
	Cancelled,
}

/// Outcome of a retry loop inside one flow stage.
enum StepOutcome<T> {
	/// The stage completed.
	Done(T),
	/// A terminal error aborted the flow.
	Failed(ErrorKind),
	/// A reset or shutdown preempted the stage.
	Interrupted,
}

/// An issued code pair together with its engine-side deadlines.
struct PendingCodePair {
	pair: CodePair,
	/// Server-suggested interval clamped to the configured bounds.
	interval: Duration,
	/// Monotonic deadline after which the pair can no longer be exchanged.
	expires_at: Instant,
}

/// The background flow worker. Constructed by the façade, consumed by [`Engine::run`].
pub(crate) struct Engine {
	pub config: AuthConfig,
	pub adapter_id: String,
	pub http: Arc<dyn HttpExchange>,
	pub store: Arc<dyn CredentialStore>,
	pub manager: Arc<dyn AuthorizationManager>,
	pub shared: Arc<Shared>,
	pub commands: UnboundedReceiver<Command>,
	pub cancel: CancellationToken,
	pub token: TokenState,
	pub observer: Option<Arc<dyn CblAuthorizationObserver>>,
	pub customer_profile_requested: bool,
	pub reset_pending: bool,
	pub auth_failure_pending: bool,
}
impl Engine {
	/// Runs the state machine until shutdown.
	pub async fn run(mut self, mut state: FlowState) {
		tracing::debug!(adapter_id = %self.adapter_id, "Authorization flow worker started.");

		loop {
			if self.cancel.is_cancelled() {
				break;
			}

			let next = match state {
				FlowState::Idle => self.handle_idle().await,
				FlowState::RequestingToken => self.handle_requesting_token().await,
				FlowState::RefreshingToken => self.handle_refreshing_token().await,
				FlowState::ClearingData => self.handle_clearing_data().await,
				FlowState::Stopping => break,
			};

			// A reset observed mid-stage is honored before anything else runs.
			state = if self.reset_pending { FlowState::ClearingData } else { next };
		}

		tracing::debug!(adapter_id = %self.adapter_id, "Authorization flow worker exited.");
	}

	async fn handle_idle(&mut self) -> FlowState {
		tracing::debug!("Waiting for an authorization request.");

		loop {
			match self.next_wake(None).await {
				Wake::Cancelled => return FlowState::Stopping,
				Wake::Reset => return FlowState::ClearingData,
				Wake::Authorize(request) => {
					self.observer = Some(request.observer);
					self.customer_profile_requested = request.customer_profile;

					return FlowState::RequestingToken;
				},
				// A stale failure signal from a finished flow carries no meaning here.
				Wake::AuthFailure => self.auth_failure_pending = false,
				Wake::Deadline => {},
			}
		}
	}

	async fn handle_requesting_token(&mut self) -> FlowState {
		self.publish(FlowStatus::ok(LifecycleState::Authorizing));

		let span = FlowSpan::new(FlowKind::CodePair, "handle_requesting_token");
		let pending = match span.instrument(self.request_code_pair()).await {
			StepOutcome::Done(pending) => pending,
			StepOutcome::Failed(kind) => return self.fail_flow(kind),
			StepOutcome::Interrupted => return FlowState::Idle,
		};
		let span = FlowSpan::new(FlowKind::TokenExchange, "handle_requesting_token");
		let (grant, requested_at) = match span.instrument(self.exchange_token(&pending)).await {
			StepOutcome::Done(done) => done,
			StepOutcome::Failed(kind) => return self.fail_flow(kind),
			StepOutcome::Interrupted => return FlowState::Idle,
		};
		let access_token = grant.access_token.clone();

		// The exchange proves possession of the device code, not that the refresh
		// token works. The grant is installed already expired and unverified so that
		// REFRESHED is only ever reported after a refresh has succeeded.
		self.install_grant(grant, requested_at, Duration::ZERO, false).await;

		let span = FlowSpan::new(FlowKind::Profile, "handle_requesting_token");

		span.instrument(self.fetch_customer_profile(&access_token)).await;

		FlowState::RefreshingToken
	}

	async fn handle_refreshing_token(&mut self) -> FlowState {
		let mut retry_count = 0_u32;
		let mut next_refresh = self.refresh_deadline();

		loop {
			if self.should_interrupt() {
				return FlowState::Idle;
			}

			let expires_at = self.token.expires_at();
			let refreshed = self.shared.status().state == LifecycleState::Refreshed;
			// Retry backoff can push the scheduled refresh past the token's own
			// expiry; once REFRESHED has been reported, the earlier expiry wins.
			let mut about_to_expire = refreshed && expires_at < next_refresh;

			// A failure signal may also have arrived while the engine was busy with a
			// request; honor it before scheduling the next wait.
			if std::mem::take(&mut self.auth_failure_pending) {
				tracing::info!("Authorization failure reported; refreshing the access token now.");

				about_to_expire = false;
			} else {
				let deadline = if about_to_expire { expires_at } else { next_refresh };

				match self.sleep_interruptible(deadline, true).await {
					Wake::Cancelled => return FlowState::Stopping,
					Wake::Reset => return FlowState::Idle,
					Wake::AuthFailure => {
						self.auth_failure_pending = false;

						tracing::info!(
							"Authorization failure reported; refreshing the access token now."
						);

						about_to_expire = false;
					},
					Wake::Deadline | Wake::Authorize(_) => {},
				}
			}

			if about_to_expire {
				tracing::warn!("Access token expired before a refresh completed.");

				self.token.access_token = TokenSecret::default();
				self.shared.set_access_token(TokenSecret::default());
				self.publish(FlowStatus::ok(LifecycleState::Expired));

				continue;
			}

			obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Attempt);

			let requested_at = Instant::now();
			let span = FlowSpan::new(FlowKind::Refresh, "handle_refreshing_token");
			let response = span.instrument(self.send_refresh_request()).await;
			let decoded = match response {
				Ok(response) => codec::decode_token_grant(&response),
				Err(e) => {
					tracing::warn!(error = %e, "Refresh request failed at the transport level.");

					Err(ErrorKind::UnknownError)
				},
			};

			match decoded {
				Ok(grant) => {
					obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Success);

					retry_count = 0;

					let expires_in = grant.expires_in;

					self.install_grant(grant, requested_at, expires_in, true).await;

					next_refresh = self.refresh_deadline();

					self.shared.set_auth_in_flight(false);
					self.publish(FlowStatus::ok(LifecycleState::Refreshed));
				},
				Err(kind) if kind.is_retriable() => {
					obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Failure);
					tracing::debug!(error = %kind, retry_count, "Retrying the token refresh.");

					next_refresh = RetryScheduler::time_to_retry(retry_count);
					retry_count += 1;
				},
				Err(kind) => {
					obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Failure);

					// An `invalid_request` against a refresh token that has never
					// minted an access token means the client id is not enabled for
					// this linking method.
					let kind = if kind == ErrorKind::InvalidRequest && !self.token.verified {
						ErrorKind::InvalidCblClientId
					} else {
						kind
					};

					return self.fail_flow(kind);
				},
			}
		}
	}

	async fn handle_clearing_data(&mut self) -> FlowState {
		tracing::info!("Clearing persisted and in-memory credentials.");

		self.reset_pending = false;
		self.auth_failure_pending = false;

		if let Err(e) = self.store.clear().await {
			tracing::error!(error = %e, "Failed to erase the persisted credential record.");
		}

		self.token = TokenState::default();
		self.observer = None;
		self.customer_profile_requested = false;

		self.shared.clear_credentials();
		self.publish(FlowStatus::default());

		FlowState::Idle
	}

	/// Requests a device/user code pair, retrying retriable failures with backoff.
	async fn request_code_pair(&mut self) -> StepOutcome<PendingCodePair> {
		let mut retry_count = 0_u32;

		loop {
			if self.should_interrupt() {
				return StepOutcome::Interrupted;
			}

			obs::record_flow_outcome(FlowKind::CodePair, FlowOutcome::Attempt);

			let decoded = match self.send_code_pair_request().await {
				Ok(response) => codec::decode_code_pair(&response),
				Err(e) => {
					tracing::warn!(
						error = %e,
						"Code-pair request failed at the transport level."
					);

					Err(ErrorKind::UnknownError)
				},
			};

			match decoded {
				Ok(pair) => {
					obs::record_flow_outcome(FlowKind::CodePair, FlowOutcome::Success);

					let interval = pair
						.interval
						.clamp(self.config.min_poll_interval, self.config.max_poll_interval);
					let expires_at = Instant::now() + pair.expires_in;

					tracing::info!(user_code = %pair.user_code, "Received a code pair.");

					if let Some(observer) = &self.observer {
						observer.on_request_authorization(&pair.verification_uri, &pair.user_code);
					}

					return StepOutcome::Done(PendingCodePair { pair, interval, expires_at });
				},
				Err(kind) if kind.is_retriable() => {
					obs::record_flow_outcome(FlowKind::CodePair, FlowOutcome::Failure);
					tracing::debug!(error = %kind, retry_count, "Retrying the code-pair request.");
				},
				Err(kind) => {
					obs::record_flow_outcome(FlowKind::CodePair, FlowOutcome::Failure);

					return StepOutcome::Failed(kind);
				},
			}

			let deadline = RetryScheduler::time_to_retry(retry_count);

			retry_count += 1;

			if let Wake::Cancelled | Wake::Reset = self.sleep_interruptible(deadline, false).await {
				return StepOutcome::Interrupted;
			}
		}
	}

	/// Polls the token endpoint until the user approves the code pair.
	async fn exchange_token(
		&mut self,
		pending: &PendingCodePair,
	) -> StepOutcome<(TokenGrant, Instant)> {
		let mut interval = pending.interval;

		loop {
			if self.should_interrupt() {
				return StepOutcome::Interrupted;
			}
			if Instant::now() >= pending.expires_at {
				tracing::warn!("Code pair expired before the user approved it.");

				return StepOutcome::Failed(ErrorKind::InvalidCodePair);
			}

			if let Some(observer) = &self.observer {
				observer.on_checking_for_authorization();
			}

			obs::record_flow_outcome(FlowKind::TokenExchange, FlowOutcome::Attempt);

			let requested_at = Instant::now();
			let decoded = match self.send_token_request(&pending.pair).await {
				Ok(response) => codec::decode_token_grant(&response),
				Err(e) => {
					tracing::warn!(error = %e, "Token request failed at the transport level.");

					Err(ErrorKind::UnknownError)
				},
			};

			match decoded {
				Ok(grant) => {
					obs::record_flow_outcome(FlowKind::TokenExchange, FlowOutcome::Success);

					return StepOutcome::Done((grant, requested_at));
				},
				Err(ErrorKind::SlowDown) => {
					obs::record_flow_outcome(FlowKind::TokenExchange, FlowOutcome::Failure);

					interval = (interval * SLOW_DOWN_FACTOR).min(self.config.max_poll_interval);

					tracing::debug!(
						interval = interval.as_secs(),
						"Server asked to slow down polling."
					);
				},
				Err(kind) if kind.is_retriable() => {
					obs::record_flow_outcome(FlowKind::TokenExchange, FlowOutcome::Failure);
					tracing::trace!(error = %kind, "User has not approved the code pair yet.");
				},
				Err(kind) => {
					obs::record_flow_outcome(FlowKind::TokenExchange, FlowOutcome::Failure);

					return StepOutcome::Failed(kind);
				},
			}

			if let Wake::Cancelled | Wake::Reset =
				self.sleep_interruptible(Instant::now() + interval, false).await
			{
				return StepOutcome::Interrupted;
			}
		}
	}

	/// Fetches the customer profile for a freshly minted access token.
	///
	/// Never fails the flow: a missing or malformed profile is logged and the
	/// authorization proceeds without it.
	async fn fetch_customer_profile(&mut self, access_token: &TokenSecret) {
		obs::record_flow_outcome(FlowKind::Profile, FlowOutcome::Attempt);

		let mut url = self.config.customer_profile_url.clone();

		url.query_pairs_mut().append_pair("access_token", access_token.expose());

		let response = match self.http.get(&url, &[]).await {
			Ok(response) => response,
			Err(e) => {
				obs::record_flow_outcome(FlowKind::Profile, FlowOutcome::Failure);
				tracing::warn!(error = %e, "Profile request failed at the transport level.");

				return;
			},
		};
		let doc = match codec::decode_customer_profile(&response) {
			Ok(doc) => doc,
			Err(kind) => {
				obs::record_flow_outcome(FlowKind::Profile, FlowOutcome::Failure);
				tracing::warn!(error = %kind, "Customer profile could not be decoded.");

				return;
			},
		};

		obs::record_flow_outcome(FlowKind::Profile, FlowOutcome::Success);

		match doc.user_id.filter(|id| !id.is_empty()) {
			Some(id) => {
				self.shared.set_user_id(&id);

				if let Err(e) = self.store.set_user_id(&id).await {
					tracing::error!(error = %e, "Failed to persist the user identifier.");
				}
			},
			None => tracing::warn!("Customer profile carried no user identifier."),
		}

		if self.customer_profile_requested {
			let profile = CustomerProfile {
				name: doc.name.unwrap_or_default(),
				email: doc.email.unwrap_or_default(),
			};

			if profile.name.is_empty() && profile.email.is_empty() {
				tracing::warn!("Customer profile carried neither a name nor an email.");
			} else if let Some(observer) = &self.observer {
				observer.on_customer_profile_available(&profile);
			}
		}
	}

	async fn send_code_pair_request(&self) -> Result<HttpResponse, TransportError> {
		let scope = self.config.scopes_for(self.customer_profile_requested);
		let mut form = vec![
			("response_type", "device_code"),
			("client_id", self.config.client_id.as_str()),
			("scope", scope.as_str()),
		];

		if let Some(data) = &self.config.scope_data {
			form.push(("scope_data", data.as_str()));
		}

		let mut headers = Vec::new();

		if let Some(locale) = &self.config.locale {
			headers.push(("Accept-Language".to_owned(), locale.clone()));
		}

		self.http
			.post_form(&self.config.code_pair_url, &headers, &form, self.config.request_timeout)
			.await
	}

	async fn send_token_request(&self, pair: &CodePair) -> Result<HttpResponse, TransportError> {
		let form = [
			("grant_type", "device_code"),
			("device_code", pair.device_code.as_str()),
			("user_code", pair.user_code.as_str()),
		];

		self.http
			.post_form(&self.config.token_url, &[], &form, self.config.request_timeout)
			.await
	}

	async fn send_refresh_request(&self) -> Result<HttpResponse, TransportError> {
		let mut timeout = self.config.request_timeout;

		// While a valid token is held, a refresh that outlasts it would mask the
		// expiry; cap the request at the remaining lifetime.
		if self.shared.status().state == LifecycleState::Refreshed {
			let remaining = self.token.expires_at().duration_since(Instant::now());

			if !remaining.is_zero() && timeout > remaining {
				timeout = remaining;
			}
		}

		let form = [
			("grant_type", "refresh_token"),
			("refresh_token", self.token.refresh_token.expose()),
			("client_id", self.config.client_id.as_str()),
		];

		self.http.post_form(&self.config.token_url, &[], &form, timeout).await
	}

	/// Installs a token grant, mirrors the access token into the snapshot, and
	/// persists the refresh token.
	async fn install_grant(
		&mut self,
		grant: TokenGrant,
		requested_at: Instant,
		expires_in: Duration,
		verified: bool,
	) {
		self.token = TokenState {
			access_token: grant.access_token,
			refresh_token: grant.refresh_token,
			requested_at,
			expires_in,
			verified,
		};

		self.shared.set_access_token(self.token.access_token.clone());

		if let Err(e) = self.store.set_refresh_token(&self.token.refresh_token).await {
			tracing::error!(error = %e, "Failed to persist the refresh token.");
		}
	}

	/// Scheduled refresh instant: the token expiry minus the configured head start,
	/// clamped to now when the margin has already been consumed.
	fn refresh_deadline(&self) -> Instant {
		self.token
			.expires_at()
			.checked_sub(self.config.refresh_head_start)
			.unwrap_or_else(Instant::now)
	}

	fn fail_flow(&mut self, kind: ErrorKind) -> FlowState {
		// The persisted record is left for an explicit reset, but a token that just
		// failed terminally must not stay readable.
		self.token.access_token = TokenSecret::default();

		self.shared.set_access_token(TokenSecret::default());
		self.shared.set_auth_in_flight(false);
		self.publish(FlowStatus { state: LifecycleState::UnrecoverableError, error: kind });

		FlowState::Idle
	}

	fn should_interrupt(&self) -> bool {
		self.reset_pending || self.cancel.is_cancelled()
	}

	/// Publishes a `(state, error)` transition, suppressing pairs equal to the last
	/// reported one. The manager callback runs outside the snapshot lock.
	fn publish(&self, status: FlowStatus) {
		let user_id = {
			let mut published = self.shared.published.write();

			if published.status == status {
				return;
			}

			published.status = status;

			published.user_id.clone()
		};

		tracing::debug!(state = %status.state, error = %status.error, "Reporting a state change.");
		self.manager.report_state_change(status, &self.adapter_id, &user_id);
	}

	/// Waits for the deadline, a command, or cancellation, latching reset and
	/// failure signals into their pending flags.
	async fn next_wake(&mut self, deadline: Option<Instant>) -> Wake {
		let wake = tokio::select! {
			_ = self.cancel.cancelled() => Wake::Cancelled,
			command = self.commands.recv() => match command {
				None => Wake::Cancelled,
				Some(Command::Reset) => Wake::Reset,
				Some(Command::AuthFailure) => Wake::AuthFailure,
				Some(Command::Authorize(request)) => Wake::Authorize(request),
			},
			_ = sleep_until_or_forever(deadline) => Wake::Deadline,
		};

		match &wake {
			Wake::Reset => self.reset_pending = true,
			Wake::AuthFailure => self.auth_failure_pending = true,
			_ => {},
		}

		wake
	}

	/// Sleeps until the deadline while absorbing signals that are meaningless
	/// mid-stage. Authorization-failure wakes are surfaced only when requested.
	async fn sleep_interruptible(&mut self, deadline: Instant, wake_on_auth_failure: bool) -> Wake {
		loop {
			match self.next_wake(Some(deadline)).await {
				Wake::AuthFailure if !wake_on_auth_failure => {},
				Wake::Authorize(_) => {
					// The façade's in-flight gate rejects these; one can still race in.
					tracing::warn!("Ignoring an authorize request received mid-flow.");
				},
				wake => return wake,
			}
		}
	}
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => std::future::pending().await,
	}
}
