//! Notification boundaries consumed by the flow engine.

// self
use crate::{_prelude::*, auth::{CustomerProfile, FlowStatus}};

/// Sink for lifecycle transitions, implemented by the SDK's authorization manager.
///
/// Callbacks are invoked from the engine's worker, strictly in transition order, and
/// only when the `(state, error)` pair changed. Implementations must not call back
/// into the adapter synchronously from this method.
pub trait AuthorizationManager
where
	Self: Send + Sync,
{
	/// Reports a lifecycle transition for the identified adapter and user.
	fn report_state_change(&self, status: FlowStatus, adapter_id: &str, user_id: &str);
}

/// UI-facing sink for one Code-Based Linking attempt.
pub trait CblAuthorizationObserver
where
	Self: Send + Sync,
{
	/// A code pair was issued; present `verification_uri` and `user_code` to the user.
	fn on_request_authorization(&self, verification_uri: &Url, user_code: &str);

	/// The engine is about to poll the token endpoint for user approval.
	fn on_checking_for_authorization(&self) {}

	/// Profile data became available after a successful exchange.
	///
	/// Only invoked when the attempt requested the customer profile and the profile
	/// fetch returned at least one of name/email. A fetch failure is logged and never
	/// fails the authorization.
	fn on_customer_profile_available(&self, profile: &CustomerProfile) {
		let _ = profile;
	}
}
