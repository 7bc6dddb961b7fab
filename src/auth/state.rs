//! Lifecycle states, the externally reported status pair, and in-memory token state.

// self
use crate::{_prelude::*, auth::TokenSecret, error::ErrorKind};

/// Externally visible lifecycle of the authorization adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleState {
	/// No credential is held and no attempt is running.
	Uninitialized,
	/// An authorization attempt (code pair, polling, or first refresh) is in flight.
	Authorizing,
	/// A valid access token is held.
	Refreshed,
	/// The access token expired before a refresh completed.
	Expired,
	/// A terminal error ended the attempt; a new authorize call is required.
	UnrecoverableError,
}
impl LifecycleState {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Uninitialized => "uninitialized",
			Self::Authorizing => "authorizing",
			Self::Refreshed => "refreshed",
			Self::Expired => "expired",
			Self::UnrecoverableError => "unrecoverable_error",
		}
	}
}
impl Display for LifecycleState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// The `(state, error)` pair reported to the authorization manager.
///
/// A transition is reported only when the pair differs from the previously reported
/// one; equal pairs are suppressed at the publishing site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowStatus {
	/// Current lifecycle state.
	pub state: LifecycleState,
	/// Error that accompanied the transition; [`ErrorKind::Success`] when none.
	pub error: ErrorKind,
}
impl FlowStatus {
	/// Status pair for a clean transition into `state`.
	pub const fn ok(state: LifecycleState) -> Self {
		Self { state, error: ErrorKind::Success }
	}
}
impl Default for FlowStatus {
	fn default() -> Self {
		Self::ok(LifecycleState::Uninitialized)
	}
}

/// Customer profile data forwarded to the observer when the profile scope was granted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomerProfile {
	/// Customer name; may be empty.
	pub name: String,
	/// Customer email; may be empty.
	pub email: String,
}

/// In-memory credential state, owned and mutated exclusively by the flow engine.
///
/// Invariant: a non-empty access token implies a non-empty refresh token. The expiry
/// is only meaningful while an access token is held.
#[derive(Clone, Debug)]
pub(crate) struct TokenState {
	/// Current bearer credential; empty when none is valid.
	pub access_token: TokenSecret,
	/// Current refresh token; empty until the first successful exchange.
	pub refresh_token: TokenSecret,
	/// When the request that produced this state was sent.
	pub requested_at: Instant,
	/// Access-token lifetime relative to `requested_at`.
	pub expires_in: Duration,
	/// Whether this refresh token has minted at least one access token.
	///
	/// `false` only right after the initial device-code exchange; rehydrated tokens
	/// count as verified.
	pub verified: bool,
}
impl TokenState {
	/// Monotonic deadline for access-token validity.
	pub fn expires_at(&self) -> Instant {
		self.requested_at + self.expires_in
	}
}
impl Default for TokenState {
	fn default() -> Self {
		Self {
			access_token: TokenSecret::default(),
			refresh_token: TokenSecret::default(),
			requested_at: Instant::now(),
			expires_in: Duration::ZERO,
			verified: true,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn default_status_is_uninitialized_success() {
		let status = FlowStatus::default();

		assert_eq!(status.state, LifecycleState::Uninitialized);
		assert_eq!(status.error, ErrorKind::Success);
	}

	#[test]
	fn empty_token_state_counts_as_verified() {
		let state = TokenState::default();

		assert!(state.access_token.is_empty());
		assert!(state.refresh_token.is_empty());
		assert!(state.verified);
	}

	#[test]
	fn expiry_is_relative_to_the_request_instant() {
		let mut state = TokenState::default();

		state.expires_in = Duration::from_secs(30);

		assert_eq!(state.expires_at(), state.requested_at + Duration::from_secs(30));
	}
}
