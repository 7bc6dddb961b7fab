//! Authorizer configuration: endpoints, scopes, and flow timing parameters.

// std
use std::time::Duration;
// self
use crate::{_prelude::*, error::ConfigError};

/// Default code-pair endpoint.
pub const DEFAULT_CODE_PAIR_URL: &str = "https://api.amazon.com/auth/O2/create/codepair";
/// Default token endpoint, used for both the device-code exchange and refreshes.
pub const DEFAULT_TOKEN_URL: &str = "https://api.amazon.com/auth/O2/token";
/// Default customer-profile endpoint.
pub const DEFAULT_CUSTOMER_PROFILE_URL: &str = "https://api.amazon.com/user/profile";
/// Default base scope requested for every authorization.
pub const DEFAULT_SCOPE: &str = "alexa:all";
/// Scope granting access to the customer's name and email.
pub const SCOPE_PROFILE: &str = "profile";
/// Scope tying the access token to an opaque user identifier only.
pub const SCOPE_PROFILE_USER_ID: &str = "profile:user_id";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_REFRESH_HEAD_START: Duration = Duration::from_secs(600);
const DEFAULT_MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Immutable configuration consumed by the flow engine.
///
/// Build via [`AuthConfig::builder`]; defaults target the Login-with-Amazon endpoints
/// the voice service uses, and every endpoint/timing can be overridden for other
/// authorization servers or for tests.
#[derive(Clone, Debug)]
pub struct AuthConfig {
	/// OAuth 2.0 client identifier sent with every request.
	pub client_id: String,
	/// Base scope requested for the device grant.
	pub scope: String,
	/// Optional `scope_data` JSON blob forwarded on the code-pair request.
	pub scope_data: Option<String>,
	/// Locale forwarded as `Accept-Language` on the code-pair request.
	pub locale: Option<String>,
	/// Endpoint issuing device/user code pairs.
	pub code_pair_url: Url,
	/// Endpoint exchanging device codes and refresh tokens for access tokens.
	pub token_url: Url,
	/// Endpoint serving the customer profile for a bearer token.
	pub customer_profile_url: Url,
	/// Per-request timeout applied to every exchange.
	pub request_timeout: Duration,
	/// Safety margin subtracted from the token expiry to schedule the next refresh.
	pub refresh_head_start: Duration,
	/// Lower bound for the token poll interval.
	pub min_poll_interval: Duration,
	/// Ceiling the poll interval doubles toward on `slow_down` responses.
	pub max_poll_interval: Duration,
}
impl AuthConfig {
	/// Returns a builder seeded with the default endpoints and timings.
	pub fn builder(client_id: impl Into<String>) -> AuthConfigBuilder {
		AuthConfigBuilder {
			client_id: client_id.into(),
			scope: DEFAULT_SCOPE.into(),
			scope_data: None,
			locale: None,
			code_pair_url: None,
			token_url: None,
			customer_profile_url: None,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			refresh_head_start: DEFAULT_REFRESH_HEAD_START,
			min_poll_interval: DEFAULT_MIN_POLL_INTERVAL,
			max_poll_interval: DEFAULT_MAX_POLL_INTERVAL,
		}
	}

	/// Full scope string for a code-pair request.
	///
	/// The profile scope is appended when the caller asked for customer-profile data;
	/// otherwise the user-id-only scope keeps the token tied to an account without
	/// exposing name or email.
	pub fn scopes_for(&self, customer_profile: bool) -> String {
		let extra = if customer_profile { SCOPE_PROFILE } else { SCOPE_PROFILE_USER_ID };

		format!("{} {extra}", self.scope)
	}
}

/// Builder for [`AuthConfig`].
#[derive(Clone, Debug)]
pub struct AuthConfigBuilder {
	client_id: String,
	scope: String,
	scope_data: Option<String>,
	locale: Option<String>,
	code_pair_url: Option<Url>,
	token_url: Option<Url>,
	customer_profile_url: Option<Url>,
	request_timeout: Duration,
	refresh_head_start: Duration,
	min_poll_interval: Duration,
	max_poll_interval: Duration,
}
impl AuthConfigBuilder {
	/// Overrides the base scope.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = scope.into();

		self
	}

	/// Attaches a `scope_data` payload describing the device.
	pub fn scope_data(mut self, data: impl Into<String>) -> Self {
		self.scope_data = Some(data.into());

		self
	}

	/// Sets the locale advertised on the code-pair request.
	pub fn locale(mut self, locale: impl Into<String>) -> Self {
		self.locale = Some(locale.into());

		self
	}

	/// Overrides the code-pair endpoint.
	pub fn code_pair_url(mut self, url: Url) -> Self {
		self.code_pair_url = Some(url);

		self
	}

	/// Overrides the token endpoint.
	pub fn token_url(mut self, url: Url) -> Self {
		self.token_url = Some(url);

		self
	}

	/// Overrides the customer-profile endpoint.
	pub fn customer_profile_url(mut self, url: Url) -> Self {
		self.customer_profile_url = Some(url);

		self
	}

	/// Overrides the per-request timeout.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Overrides the refresh head start.
	pub fn refresh_head_start(mut self, head_start: Duration) -> Self {
		self.refresh_head_start = head_start;

		self
	}

	/// Overrides the poll interval bounds.
	pub fn poll_interval_bounds(mut self, min: Duration, max: Duration) -> Self {
		self.min_poll_interval = min;
		self.max_poll_interval = max;

		self
	}

	/// Validates and produces the [`AuthConfig`].
	pub fn build(self) -> Result<AuthConfig, ConfigError> {
		if self.client_id.is_empty() {
			return Err(ConfigError::MissingClientId);
		}
		if self.min_poll_interval > self.max_poll_interval {
			return Err(ConfigError::InvalidPollBounds);
		}

		Ok(AuthConfig {
			client_id: self.client_id,
			scope: self.scope,
			scope_data: self.scope_data,
			locale: self.locale,
			code_pair_url: parse_default(self.code_pair_url, DEFAULT_CODE_PAIR_URL)?,
			token_url: parse_default(self.token_url, DEFAULT_TOKEN_URL)?,
			customer_profile_url: parse_default(
				self.customer_profile_url,
				DEFAULT_CUSTOMER_PROFILE_URL,
			)?,
			request_timeout: self.request_timeout,
			refresh_head_start: self.refresh_head_start,
			min_poll_interval: self.min_poll_interval,
			max_poll_interval: self.max_poll_interval,
		})
	}
}

fn parse_default(configured: Option<Url>, fallback: &str) -> Result<Url, ConfigError> {
	match configured {
		Some(url) => Ok(url),
		None => Url::parse(fallback)
			.map_err(|e| ConfigError::InvalidEndpoint { url: fallback.into(), source: e }),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn builder_applies_defaults() {
		let config = AuthConfig::builder("client-1")
			.build()
			.expect("Default configuration should build successfully.");

		assert_eq!(config.code_pair_url.as_str(), DEFAULT_CODE_PAIR_URL);
		assert_eq!(config.token_url.as_str(), DEFAULT_TOKEN_URL);
		assert_eq!(config.request_timeout, Duration::from_secs(60));
		assert_eq!(config.refresh_head_start, Duration::from_secs(600));
		assert_eq!(config.min_poll_interval, Duration::from_secs(5));
		assert_eq!(config.max_poll_interval, Duration::from_secs(60));
	}

	#[test]
	fn builder_rejects_empty_client_id() {
		assert!(matches!(
			AuthConfig::builder("").build(),
			Err(ConfigError::MissingClientId)
		));
	}

	#[test]
	fn builder_rejects_inverted_poll_bounds() {
		let result = AuthConfig::builder("client-1")
			.poll_interval_bounds(Duration::from_secs(10), Duration::from_secs(5))
			.build();

		assert!(matches!(result, Err(ConfigError::InvalidPollBounds)));
	}

	#[test]
	fn scope_selection_follows_profile_request() {
		let config = AuthConfig::builder("client-1")
			.build()
			.expect("Default configuration should build successfully.");

		assert_eq!(config.scopes_for(false), "alexa:all profile:user_id");
		assert_eq!(config.scopes_for(true), "alexa:all profile");
	}
}
