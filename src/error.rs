//! Engine-level error types and the authorization-server error taxonomy.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
}

/// Configuration and validation failures raised while constructing an authorizer.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Client identifier was empty.
	#[error("Client identifier must not be empty.")]
	MissingClientId,
	/// An endpoint URL could not be parsed.
	#[error("Endpoint URL `{url}` is invalid.")]
	InvalidEndpoint {
		/// The rejected URL string.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Poll interval bounds are inverted.
	#[error("Minimum poll interval exceeds the maximum poll interval.")]
	InvalidPollBounds,
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}

/// Transport-level failures (network, IO).
///
/// The flow engine never surfaces these directly; a request that produced no HTTP
/// response at all is folded into [`ErrorKind::UnknownError`] and retried.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the authorization server.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the authorization server.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Symbolic outcome of one authorization-server exchange.
///
/// This is data flowing through the state machine, not a `std::error::Error`: every
/// response decodes to exactly one of these values, and the retriable/terminal split
/// decides whether the engine schedules another attempt or aborts the flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// The exchange succeeded.
	Success,
	/// The user has not yet approved the code pair; poll again.
	AuthorizationPending,
	/// The server asked for a longer poll interval.
	SlowDown,
	/// The request was malformed.
	InvalidRequest,
	/// A request value (typically the client id) was rejected.
	InvalidValue,
	/// The device/user code pair is invalid or has expired locally.
	InvalidCodePair,
	/// The grant backing the refresh token has expired or been revoked.
	AuthorizationExpired,
	/// The client is not authorized for the requested grant.
	UnauthorizedClient,
	/// The server does not support the requested grant type.
	UnsupportedGrantType,
	/// The server reported an internal failure; retry with backoff.
	ServerError,
	/// A failure internal to this engine.
	InternalError,
	/// The client id is not enabled for Code-Based Linking.
	InvalidCblClientId,
	/// The response could not be classified (transport failure, unparsable body).
	UnknownError,
}
impl ErrorKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Success => "success",
			Self::AuthorizationPending => "authorization_pending",
			Self::SlowDown => "slow_down",
			Self::InvalidRequest => "invalid_request",
			Self::InvalidValue => "invalid_value",
			Self::InvalidCodePair => "invalid_code_pair",
			Self::AuthorizationExpired => "authorization_expired",
			Self::UnauthorizedClient => "unauthorized_client",
			Self::UnsupportedGrantType => "unsupported_grant_type",
			Self::ServerError => "server_error",
			Self::InternalError => "internal_error",
			Self::InvalidCblClientId => "invalid_cbl_client_id",
			Self::UnknownError => "unknown_error",
		}
	}

	/// Maps the `error` field of an authorization-server response body.
	///
	/// Unrecognized names map to [`ErrorKind::UnknownError`]; an empty name means the
	/// body carried no error and maps to [`ErrorKind::Success`].
	pub fn from_error_code(code: &str) -> Self {
		match code {
			"" => Self::Success,
			"authorization_pending" => Self::AuthorizationPending,
			"invalid_client" | "InvalidValue" => Self::InvalidValue,
			"invalid_code_pair" => Self::InvalidCodePair,
			"invalid_grant" => Self::AuthorizationExpired,
			"invalid_request" => Self::InvalidRequest,
			"servererror" => Self::ServerError,
			"slow_down" => Self::SlowDown,
			"unauthorized_client" => Self::UnauthorizedClient,
			"unsupported_grant_type" => Self::UnsupportedGrantType,
			_ => {
				tracing::warn!(
					error = code,
					"Authorization server reported an unknown error name."
				);

				Self::UnknownError
			},
		}
	}

	/// Maps an HTTP status code, before any body-level `error` field is consulted.
	pub const fn from_status(status: u16) -> Self {
		match status {
			200 => Self::Success,
			400 => Self::InvalidRequest,
			500..=599 => Self::ServerError,
			_ => Self::UnknownError,
		}
	}

	/// Returns `true` when another attempt is warranted after backoff.
	pub const fn is_retriable(self) -> bool {
		matches!(
			self,
			Self::AuthorizationPending | Self::SlowDown | Self::ServerError | Self::UnknownError
		)
	}

	/// Returns `true` when the current attempt must be aborted and surfaced.
	pub const fn is_terminal(self) -> bool {
		!matches!(self, Self::Success) && !self.is_retriable()
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn error_names_map_to_taxonomy() {
		assert_eq!(ErrorKind::from_error_code(""), ErrorKind::Success);
		assert_eq!(
			ErrorKind::from_error_code("authorization_pending"),
			ErrorKind::AuthorizationPending
		);
		assert_eq!(ErrorKind::from_error_code("invalid_client"), ErrorKind::InvalidValue);
		assert_eq!(ErrorKind::from_error_code("InvalidValue"), ErrorKind::InvalidValue);
		assert_eq!(ErrorKind::from_error_code("invalid_grant"), ErrorKind::AuthorizationExpired);
		assert_eq!(ErrorKind::from_error_code("servererror"), ErrorKind::ServerError);
		assert_eq!(ErrorKind::from_error_code("no_such_error"), ErrorKind::UnknownError);
	}

	#[test]
	fn status_codes_map_to_taxonomy() {
		assert_eq!(ErrorKind::from_status(200), ErrorKind::Success);
		assert_eq!(ErrorKind::from_status(400), ErrorKind::InvalidRequest);
		assert_eq!(ErrorKind::from_status(500), ErrorKind::ServerError);
		assert_eq!(ErrorKind::from_status(503), ErrorKind::ServerError);
		assert_eq!(ErrorKind::from_status(0), ErrorKind::UnknownError);
		assert_eq!(ErrorKind::from_status(302), ErrorKind::UnknownError);
	}

	#[test]
	fn retriable_and_terminal_partition_the_taxonomy() {
		let retriable = [
			ErrorKind::AuthorizationPending,
			ErrorKind::SlowDown,
			ErrorKind::ServerError,
			ErrorKind::UnknownError,
		];
		let terminal = [
			ErrorKind::InvalidRequest,
			ErrorKind::InvalidValue,
			ErrorKind::InvalidCodePair,
			ErrorKind::AuthorizationExpired,
			ErrorKind::UnauthorizedClient,
			ErrorKind::UnsupportedGrantType,
			ErrorKind::InternalError,
			ErrorKind::InvalidCblClientId,
		];

		for kind in retriable {
			assert!(kind.is_retriable());
			assert!(!kind.is_terminal());
		}
		for kind in terminal {
			assert!(kind.is_terminal());
			assert!(!kind.is_retriable());
		}

		assert!(!ErrorKind::Success.is_retriable());
		assert!(!ErrorKind::Success.is_terminal());
	}
}
