//! The authorization state machine: flow states, façade commands, and the shared
//! snapshot read by concurrent callers.

pub(crate) mod engine;

// self
use crate::{
	_prelude::*,
	auth::{FlowStatus, TokenSecret},
	observer::CblAuthorizationObserver,
};

/// Top-level states of the background authorization flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FlowState {
	/// Waiting for an authorize request, a reset, or shutdown.
	Idle,
	/// Running the device-code request plus polling exchange.
	RequestingToken,
	/// Holding a refresh token; running the periodic refresh loop.
	RefreshingToken,
	/// Erasing persisted and in-memory credentials.
	ClearingData,
	/// Terminal; the worker exits.
	Stopping,
}

/// One accepted Code-Based Linking attempt.
pub(crate) struct AuthorizeRequest {
	/// UI sink for this attempt.
	pub observer: Arc<dyn CblAuthorizationObserver>,
	/// Whether the customer profile (name/email) scope was requested.
	pub customer_profile: bool,
}

/// Commands sent from the façade to the worker. Shutdown travels separately via the
/// cancellation token so it preempts even a full command queue.
pub(crate) enum Command {
	/// Begin a new authorization attempt.
	Authorize(AuthorizeRequest),
	/// Clear credentials and return to idle.
	Reset,
	/// A consumer's call using the current access token was rejected by the cloud.
	AuthFailure,
}

/// Snapshot published by the worker and copied out by façade readers.
#[derive(Clone, Debug, Default)]
pub(crate) struct Published {
	/// Last reported `(state, error)` pair.
	pub status: FlowStatus,
	/// Current access token; empty when none is valid.
	pub access_token: TokenSecret,
	/// Opaque user identifier; empty until a profile fetch supplies one.
	pub user_id: String,
	/// Whether an authorization attempt is currently in flight.
	pub auth_in_flight: bool,
}

/// Single-writer/multi-reader cell shared between the worker and the façade.
///
/// The worker is the only writer after construction; readers copy values out under a
/// short read lock and never receive references into the snapshot.
#[derive(Debug, Default)]
pub(crate) struct Shared {
	pub published: RwLock<Published>,
}
impl Shared {
	pub fn new(status: FlowStatus, user_id: String) -> Self {
		Self {
			published: RwLock::new(Published {
				status,
				access_token: TokenSecret::default(),
				user_id,
				auth_in_flight: false,
			}),
		}
	}

	pub fn status(&self) -> FlowStatus {
		self.published.read().status
	}

	pub fn access_token(&self) -> TokenSecret {
		self.published.read().access_token.clone()
	}

	pub fn set_access_token(&self, token: TokenSecret) {
		self.published.write().access_token = token;
	}

	pub fn set_user_id(&self, user_id: &str) {
		self.published.write().user_id = user_id.to_owned();
	}

	pub fn set_auth_in_flight(&self, in_flight: bool) {
		self.published.write().auth_in_flight = in_flight;
	}

	/// Resets everything except the reported status, which the worker publishes
	/// separately so the dedup check stays in one place.
	pub fn clear_credentials(&self) {
		let mut published = self.published.write();

		published.access_token = TokenSecret::default();
		published.user_id.clear();
		published.auth_in_flight = false;
	}
}
