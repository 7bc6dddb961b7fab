//! Typed decoding of authorization-server responses.
//!
//! Every exchange funnels through [`classify`]: the HTTP status is mapped first, then
//! a recognized `error` field in the body refines the result, and an unparsable body
//! on a 200 is *never* treated as success. Payload decoders return the symbolic
//! [`ErrorKind`] on failure so the flow engine can apply its retriable/terminal
//! policy uniformly.

// crates.io
use serde_json::Value;
// self
use crate::{_prelude::*, auth::TokenSecret, error::ErrorKind, http::HttpResponse};

/// Expected `token_type` value in token responses.
const TOKEN_TYPE_BEARER: &str = "bearer";
/// Ceiling applied to server-reported lifetimes. Some servers send sentinel
/// "never expires" values that would overflow instant arithmetic.
const MAX_LIFETIME: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Decoded code-pair response (RFC 8628 device authorization response).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodePair {
	/// Short human-readable code the user enters on a second device.
	pub user_code: String,
	/// Opaque machine-readable code polled against the token endpoint.
	pub device_code: String,
	/// URI the user visits to approve the linking attempt.
	pub verification_uri: Url,
	/// Lifetime of the code pair.
	pub expires_in: Duration,
	/// Server-suggested poll interval; the engine clamps it to its configured bounds.
	pub interval: Duration,
}

/// Decoded token response, from either a device-code exchange or a refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
	/// Short-lived bearer credential.
	pub access_token: TokenSecret,
	/// Long-lived credential minting new access tokens.
	pub refresh_token: TokenSecret,
	/// Reported access-token lifetime.
	pub expires_in: Duration,
}

/// Decoded customer-profile document; all fields are optional on the wire.
#[derive(Clone, Debug, Default)]
pub struct CustomerProfileDoc {
	/// Opaque identifier for the linked account.
	pub user_id: Option<String>,
	/// Customer name, present when the profile scope was granted.
	pub name: Option<String>,
	/// Customer email, present when the profile scope was granted.
	pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCodePair {
	user_code: Option<String>,
	device_code: Option<String>,
	verification_uri: Option<String>,
	expires_in: Option<u64>,
	interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawTokenGrant {
	access_token: Option<String>,
	refresh_token: Option<String>,
	token_type: Option<String>,
	expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
	user_id: Option<String>,
	name: Option<String>,
	email: Option<String>,
}

/// Classifies a response into the error taxonomy and returns the parsed body, if any.
pub fn classify(response: &HttpResponse) -> (ErrorKind, Option<Value>) {
	let mut kind = ErrorKind::from_status(response.status);
	let mut deserializer = serde_json::Deserializer::from_str(&response.body);
	let document = match serde_path_to_error::deserialize::<_, Value>(&mut deserializer) {
		Ok(document) => document,
		Err(e) => {
			tracing::warn!(
				status = response.status,
				error = %e,
				"Authorization server returned an unparsable body."
			);

			if kind == ErrorKind::Success {
				kind = ErrorKind::UnknownError;
			}

			return (kind, None);
		},
	};

	if kind != ErrorKind::Success
		&& let Some(error) = document.get("error").and_then(Value::as_str)
		&& !error.is_empty()
	{
		kind = ErrorKind::from_error_code(error);
	}

	(kind, Some(document))
}

/// Decodes a code-pair response, requiring every field the poll loop depends on.
pub fn decode_code_pair(response: &HttpResponse) -> Result<CodePair, ErrorKind> {
	let raw: RawCodePair = decode_payload(response)?;
	let user_code = raw.user_code.unwrap_or_default();
	let device_code = raw.device_code.unwrap_or_default();
	let verification_uri = raw.verification_uri.unwrap_or_default();
	let expires_in = raw.expires_in.unwrap_or_default();

	if user_code.is_empty() || device_code.is_empty() || verification_uri.is_empty() || expires_in == 0
	{
		tracing::warn!(
			user_code,
			verification_uri,
			expires_in,
			"Code-pair response is missing a required property."
		);

		return Err(ErrorKind::UnknownError);
	}

	let verification_uri = Url::parse(&verification_uri).map_err(|e| {
		tracing::warn!(error = %e, "Code-pair response carried an invalid verification URI.");

		ErrorKind::UnknownError
	})?;

	Ok(CodePair {
		user_code,
		device_code,
		verification_uri,
		expires_in: Duration::from_secs(expires_in).min(MAX_LIFETIME),
		interval: Duration::from_secs(raw.interval.unwrap_or_default()).min(MAX_LIFETIME),
	})
}

/// Decodes a token response, requiring a bearer token pair with a positive lifetime.
pub fn decode_token_grant(response: &HttpResponse) -> Result<TokenGrant, ErrorKind> {
	let raw: RawTokenGrant = decode_payload(response)?;
	let access_token = raw.access_token.unwrap_or_default();
	let refresh_token = raw.refresh_token.unwrap_or_default();
	let token_type = raw.token_type.unwrap_or_default();
	let expires_in = raw.expires_in.unwrap_or_default();

	if access_token.is_empty()
		|| refresh_token.is_empty()
		|| token_type != TOKEN_TYPE_BEARER
		|| expires_in == 0
	{
		tracing::warn!(
			token_type,
			expires_in,
			"Token response is missing a required property."
		);

		return Err(ErrorKind::UnknownError);
	}

	Ok(TokenGrant {
		access_token: TokenSecret::new(access_token),
		refresh_token: TokenSecret::new(refresh_token),
		expires_in: Duration::from_secs(expires_in).min(MAX_LIFETIME),
	})
}

/// Decodes a customer-profile response; field presence is left to the caller.
pub fn decode_customer_profile(response: &HttpResponse) -> Result<CustomerProfileDoc, ErrorKind> {
	let raw: RawProfile = decode_payload(response)?;

	Ok(CustomerProfileDoc { user_id: raw.user_id, name: raw.name, email: raw.email })
}

fn decode_payload<T>(response: &HttpResponse) -> Result<T, ErrorKind>
where
	T: serde::de::DeserializeOwned,
{
	let (kind, document) = classify(response);

	if kind != ErrorKind::Success {
		return Err(kind);
	}

	let document = document.ok_or(ErrorKind::UnknownError)?;

	serde_path_to_error::deserialize(document).map_err(|e| {
		tracing::warn!(error = %e, "Authorization server payload failed to decode.");

		ErrorKind::UnknownError
	})
}
