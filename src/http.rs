//! Transport primitives for authorization-server exchanges.
//!
//! The engine talks to the authorization server exclusively through
//! [`HttpExchange`]: a POST/GET contract returning an HTTP status code plus body.
//! Retry and backoff never live here; the flow engine owns them, so transports stay
//! single-shot. The default [`ReqwestExchange`] implementation is enabled by the
//! `reqwest` feature.

// self
use crate::{_prelude::*, error::TransportError};

/// Raw result of one HTTP exchange: the status code and the unparsed body.
#[derive(Clone, Debug, Default)]
pub struct HttpResponse {
	/// HTTP status code; `0` never occurs (no-response failures surface as errors).
	pub status: u16,
	/// Response body, possibly empty.
	pub body: String,
}

/// Boxed future returned by [`HttpExchange`] methods.
pub type ExchangeFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of calling the authorization server.
///
/// Implementations perform exactly one request per call and report transport-level
/// failures (DNS, TCP, TLS, timeout) as [`TransportError`]; HTTP-level failures are
/// ordinary [`HttpResponse`] values whose status the decoder classifies. The trait is
/// object-safe so the engine can hold `Arc<dyn HttpExchange>` supplied by the host.
pub trait HttpExchange
where
	Self: 'static + Send + Sync,
{
	/// Sends a form-urlencoded POST with the provided extra headers and timeout.
	fn post_form<'a>(
		&'a self,
		url: &'a Url,
		headers: &'a [(String, String)],
		form: &'a [(&'a str, &'a str)],
		timeout: Duration,
	) -> ExchangeFuture<'a, HttpResponse>;

	/// Sends a GET with the provided extra headers.
	fn get<'a>(
		&'a self,
		url: &'a Url,
		headers: &'a [(String, String)],
	) -> ExchangeFuture<'a, HttpResponse>;
}

/// Thin wrapper around [`ReqwestClient`] implementing [`HttpExchange`].
///
/// Token endpoints return their results directly; configure any custom client to not
/// follow redirects before passing it in.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestExchange(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestExchange {
	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	async fn read_response(response: reqwest::Response) -> Result<HttpResponse, TransportError> {
		let status = response.status().as_u16();
		let body = response.text().await?;

		Ok(HttpResponse { status, body })
	}
}
#[cfg(feature = "reqwest")]
impl HttpExchange for ReqwestExchange {
	fn post_form<'a>(
		&'a self,
		url: &'a Url,
		headers: &'a [(String, String)],
		form: &'a [(&'a str, &'a str)],
		timeout: Duration,
	) -> ExchangeFuture<'a, HttpResponse> {
		let client = self.0.clone();
		let url = url.clone();
		let form: Vec<(String, String)> =
			form.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();

		Box::pin(async move {
			let mut request = client.post(url).timeout(timeout).form(&form);

			for (name, value) in headers {
				request = request.header(name, value);
			}

			Self::read_response(request.send().await?).await
		})
	}

	fn get<'a>(
		&'a self,
		url: &'a Url,
		headers: &'a [(String, String)],
	) -> ExchangeFuture<'a, HttpResponse> {
		let client = self.0.clone();
		let url = url.clone();

		Box::pin(async move {
			let mut request = client.get(url);

			for (name, value) in headers {
				request = request.header(name, value);
			}

			Self::read_response(request.send().await?).await
		})
	}
}
