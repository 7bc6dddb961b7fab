//! Redacting wrapper for token material.

// self
use crate::_prelude::*;

/// Token secret wrapper keeping credential material out of logs.
///
/// An empty secret means "no credential held"; the engine uses that sentinel for both
/// access and refresh tokens before authorization completes.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when no credential is held.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl From<String> for TokenSecret {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		if self.0.is_empty() {
			f.debug_tuple("TokenSecret").field(&"<empty>").finish()
		} else {
			f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
		}
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(if self.0.is_empty() { "<empty>" } else { "<redacted>" })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn formatters_redact_non_empty_secrets() {
		let secret = TokenSecret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}

	#[test]
	fn empty_secret_is_distinguishable() {
		let secret = TokenSecret::default();

		assert!(secret.is_empty());
		assert_eq!(format!("{secret}"), "<empty>");
	}

	#[test]
	fn serde_round_trips_as_a_plain_string() {
		let secret = TokenSecret::new("refresh-1");
		let json = serde_json::to_string(&secret).expect("Secret should serialize.");

		assert_eq!(json, "\"refresh-1\"");

		let back: TokenSecret = serde_json::from_str(&json).expect("Secret should deserialize.");

		assert_eq!(back, secret);
	}
}
