//! Client for the registry's token exchange endpoints.
//!
//! Two calls make up the exchange: `POST /oauth2/exchange` trades an identity token for a
//! registry refresh token, and `POST /oauth2/token` trades that refresh token (or an empty one,
//! for anonymous pulls) for an access token scoped to a single challenge. Both travel through a
//! [`ClientWithMiddleware`] so the caller's retry and tracing middleware apply to them as well.

mod grant;

pub use grant::TokenGrant;

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, RefreshToken},
	error::{ConfigError, TransientError, TransportError},
	http::ResponseMetadata,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

const EXCHANGE_PATH: [&str; 2] = ["oauth2", "exchange"];
const TOKEN_PATH: [&str; 2] = ["oauth2", "token"];
const MAX_REASON_LEN: usize = 256;

/// Token exchange client bound to one registry endpoint.
#[derive(Clone)]
pub struct AuthenticationClient {
	endpoint: Url,
	exchange_url: Url,
	token_url: Url,
	http: ClientWithMiddleware,
}
impl AuthenticationClient {
	/// Creates a client for `endpoint` (e.g. `https://example.azurecr.io`) sending through `http`.
	pub fn new(endpoint: Url, http: impl Into<ClientWithMiddleware>) -> Result<Self> {
		let exchange_url = endpoint_path(&endpoint, EXCHANGE_PATH)?;
		let token_url = endpoint_path(&endpoint, TOKEN_PATH)?;

		Ok(Self { endpoint, exchange_url, token_url, http: http.into() })
	}

	/// Parses `endpoint` and creates a client sending through `http`.
	pub fn from_endpoint(endpoint: &str, http: impl Into<ClientWithMiddleware>) -> Result<Self> {
		let url = Url::parse(endpoint).map_err(|source| ConfigError::InvalidEndpoint {
			endpoint: endpoint.to_owned(),
			source,
		})?;

		Self::new(url, http)
	}

	/// Registry endpoint the client talks to.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Trades an identity token for a registry refresh token valid for `service`.
	pub async fn exchange_identity_token(
		&self,
		service: &str,
		identity_token: &AccessToken,
	) -> Result<RefreshToken> {
		const KIND: FlowKind = FlowKind::RefreshToken;

		let span = FlowSpan::new(KIND, "exchange_identity_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let form = [
					("grant_type", TokenGrant::AccessToken.as_str()),
					("service", service),
					("access_token", identity_token.expose()),
				];
				let response = self
					.http
					.post(self.exchange_url.clone())
					.form(&form)
					.send()
					.await
					.map_err(Error::from)?;
				let body: RefreshTokenResponse = read_token_response(response).await?;

				RefreshToken::from_jwt(body.refresh_token)
			})
			.await;

		obs::record_flow_result(KIND, &result);

		result
	}

	/// Trades `refresh_token` for an access token covering `scope` on `service`.
	///
	/// Anonymous callers pass an empty refresh token with [`TokenGrant::Password`].
	pub async fn exchange_refresh_token(
		&self,
		service: &str,
		scope: &str,
		refresh_token: &str,
		grant: TokenGrant,
	) -> Result<AccessToken> {
		const KIND: FlowKind = FlowKind::AccessToken;

		let span = FlowSpan::new(KIND, "exchange_refresh_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let form = [
					("grant_type", grant.as_str()),
					("service", service),
					("scope", scope),
					("refresh_token", refresh_token),
				];
				let issued_at = OffsetDateTime::now_utc();
				let response = self
					.http
					.post(self.token_url.clone())
					.form(&form)
					.send()
					.await
					.map_err(Error::from)?;
				let body: AccessTokenResponse = read_token_response(response).await?;
				let mut token = AccessToken::new(body.access_token);

				if let Some(expires_at) = body
					.expires_in
					.filter(|secs| *secs > 0)
					.and_then(|secs| issued_at.checked_add(Duration::seconds(secs)))
				{
					token = token.with_expires_at(expires_at);
				}

				Ok(token)
			})
			.await;

		obs::record_flow_result(KIND, &result);

		result
	}
}
impl Debug for AuthenticationClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthenticationClient").field("endpoint", &self.endpoint.as_str()).finish()
	}
}

#[derive(Deserialize)]
struct RefreshTokenResponse {
	refresh_token: String,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
	access_token: String,
	#[serde(default)]
	expires_in: Option<i64>,
}

#[derive(Default, Deserialize)]
struct ErrorResponse {
	#[serde(default)]
	errors: Vec<ErrorEntry>,
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	error_description: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEntry {
	#[serde(default)]
	code: Option<String>,
	#[serde(default)]
	message: Option<String>,
}

fn endpoint_path(endpoint: &Url, path: [&str; 2]) -> Result<Url> {
	let mut url = endpoint.clone();

	url.path_segments_mut()
		.map_err(|_| ConfigError::CannotBeBase { endpoint: endpoint.to_string() })?
		.pop_if_empty()
		.extend(path);
	url.set_query(None);
	url.set_fragment(None);

	Ok(url)
}

async fn read_token_response<T>(response: Response) -> Result<T>
where
	T: DeserializeOwned,
{
	let meta = ResponseMetadata::from_response(&response);
	let status = response.status();
	let body = response.bytes().await.map_err(TransportError::from)?;

	if !status.is_success() {
		return Err(map_status_error(status, meta, &body));
	}

	serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(&body))
		.map_err(|source| TransientError::TokenResponseParse { source, status: meta.status }.into())
}

fn map_status_error(status: StatusCode, meta: ResponseMetadata, body: &[u8]) -> Error {
	let reason = error_reason(status, body);

	match status {
		StatusCode::BAD_REQUEST => Error::InvalidGrant { reason },
		StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::InvalidClient { reason },
		_ => TransientError::TokenEndpoint {
			message: reason,
			status: meta.status,
			retry_after: meta.retry_after,
		}
		.into(),
	}
}

fn error_reason(status: StatusCode, body: &[u8]) -> String {
	let parsed = serde_json::from_slice::<ErrorResponse>(body).unwrap_or_default();
	let from_errors = parsed
		.errors
		.into_iter()
		.filter_map(|entry| match (entry.code, entry.message) {
			(Some(code), Some(message)) => Some(format!("{code}: {message}")),
			(code, message) => code.or(message),
		})
		.collect::<Vec<_>>();

	if !from_errors.is_empty() {
		return truncate(from_errors.join("; "));
	}
	if let Some(reason) = parsed.error_description.or(parsed.error) {
		return truncate(reason);
	}

	let text = String::from_utf8_lossy(body);
	let text = text.trim();

	if text.is_empty() { status.to_string() } else { truncate(text.to_owned()) }
}

fn truncate(mut reason: String) -> String {
	if reason.len() > MAX_REASON_LEN {
		let mut cut = MAX_REASON_LEN;

		while !reason.is_char_boundary(cut) {
			cut -= 1;
		}

		reason.truncate(cut);
		reason.push_str("...");
	}

	reason
}
