//! Crate-level error types shared by the cache, the exchange client, and the policy.
//!
//! Every failure carries a retry classification. Structural protocol failures (bad challenge
//! headers, malformed JWTs, local misconfiguration, rejected credentials) are non-retriable so the
//! pipeline's [`RetryPolicy`](crate::retry::RetryPolicy) gives up on them immediately, while
//! transport and upstream availability failures stay retriable.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The registry's bearer challenge could not be interpreted.
	#[error(transparent)]
	Challenge(#[from] ChallengeError),
	/// A refresh token did not carry a decodable expiry.
	#[error(transparent)]
	Jwt(#[from] JwtError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Outcome of a refresh shared by every caller that waited on it.
	#[error(transparent)]
	Shared(Arc<Error>),

	/// Token endpoint rejected the presented grant (bad identity or refresh token).
	#[error("Token endpoint rejected the grant: {reason}.")]
	InvalidGrant {
		/// Endpoint- or crate-supplied reason string.
		reason: String,
	},
	/// Token endpoint refused to authenticate the caller.
	#[error("Token endpoint refused the client: {reason}.")]
	InvalidClient {
		/// Endpoint- or crate-supplied reason string.
		reason: String,
	},
	/// The identity credential failed to produce a token.
	#[error("Identity credential failed: {reason}.")]
	Credential {
		/// Credential-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Returns `true` when a generic retry layer may re-issue the request that failed.
	pub fn is_retriable(&self) -> bool {
		match self {
			Self::Transient(_) => true,
			Self::Transport(e) => e.is_retriable(),
			Self::Shared(inner) => inner.is_retriable(),
			Self::Config(_)
			| Self::Challenge(_)
			| Self::Jwt(_)
			| Self::InvalidGrant { .. }
			| Self::InvalidClient { .. }
			| Self::Credential { .. } => false,
		}
	}

	/// Returns the underlying error, looking through [`Error::Shared`] wrappers.
	pub fn root(&self) -> &Error {
		match self {
			Self::Shared(inner) => inner.root(),
			other => other,
		}
	}

	/// Builds a credential failure from any displayable reason.
	pub fn credential(reason: impl Display) -> Self {
		Self::Credential { reason: reason.to_string() }
	}
}
impl From<reqwest_middleware::Error> for Error {
	fn from(e: reqwest_middleware::Error) -> Self {
		match e {
			reqwest_middleware::Error::Reqwest(inner) => TransportError::from(inner).into(),
			reqwest_middleware::Error::Middleware(inner) => match inner.downcast::<Error>() {
				Ok(err) => err,
				Err(other) => TransportError::Middleware { source: other.into() }.into(),
			},
		}
	}
}
impl From<Error> for reqwest_middleware::Error {
	fn from(e: Error) -> Self {
		reqwest_middleware::Error::middleware(e)
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Registry endpoint cannot serve token exchanges.
	#[error("Registry endpoint `{endpoint}` is invalid.")]
	InvalidEndpoint {
		/// Offending endpoint.
		endpoint: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Registry endpoint cannot carry a path (e.g. `data:` URLs).
	#[error("Registry endpoint `{endpoint}` cannot be used as a base URL.")]
	CannotBeBase {
		/// Offending endpoint.
		endpoint: String,
	},
	/// Access token contains bytes that are not valid in an HTTP header.
	#[error("Access token cannot be encoded as an Authorization header.")]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
}

/// Failures interpreting the `WWW-Authenticate` header of a 401 response.
#[derive(Debug, ThisError)]
pub enum ChallengeError {
	/// The 401 response carried no challenge at all.
	#[error("Unauthorized response is missing the WWW-Authenticate header.")]
	MissingHeader,
	/// The challenge header is not valid visible ASCII.
	#[error("WWW-Authenticate header is not valid ASCII.")]
	InvalidHeader(#[from] reqwest::header::ToStrError),
	/// The challenge did not name the service to request tokens for.
	#[error("WWW-Authenticate challenge `{challenge}` does not name a service.")]
	MissingService {
		/// The raw challenge value.
		challenge: String,
	},
}

/// Failures decoding the expiry embedded in a refresh token.
#[derive(Debug, ThisError)]
pub enum JwtError {
	/// Token does not have a claims segment.
	#[error("Token has {segments} dot-separated segment(s); expected at least 2.")]
	MalformedToken {
		/// Number of segments found.
		segments: usize,
	},
	/// Claims segment is not valid base64.
	#[error("Token claims are not valid base64.")]
	Base64(#[from] base64::DecodeError),
	/// Claims segment is not JSON with an integer `exp`.
	#[error("Token claims are not valid JSON.")]
	Claims(#[from] serde_path_to_error::Error<serde_json::Error>),
	/// `exp` does not fit a representable instant.
	#[error("Token expiry {exp} is out of range.")]
	ExpiryOutOfRange {
		/// Raw Unix timestamp.
		exp: i64,
	},
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the registry.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
		/// Whether re-sending the request may succeed (connect, timeout, send failures).
		retriable: bool,
	},
	/// A foreign middleware in the pipeline failed.
	#[error("Pipeline middleware failed while calling the registry.")]
	Middleware {
		/// The middleware's error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error, retriable: bool) -> Self {
		Self::Network { source: Box::new(src), retriable }
	}

	/// Returns `true` for network failures worth re-sending.
	pub fn is_retriable(&self) -> bool {
		match self {
			Self::Network { retriable, .. } => *retriable,
			Self::Middleware { .. } => false,
		}
	}
}
impl From<reqwest::Error> for TransportError {
	fn from(e: reqwest::Error) -> Self {
		let retriable = is_retriable_reqwest(&e);

		Self::network(e, retriable)
	}
}

/// Reports whether a pipeline error may be retried.
///
/// Errors raised by this crate answer through [`Error::is_retriable`]. Transport errors are
/// retriable only when the request never completed; foreign middleware errors never are.
pub fn is_retriable(err: &reqwest_middleware::Error) -> bool {
	match err {
		reqwest_middleware::Error::Reqwest(e) => is_retriable_reqwest(e),
		reqwest_middleware::Error::Middleware(inner) =>
			inner.downcast_ref::<Error>().is_some_and(Error::is_retriable),
	}
}

fn is_retriable_reqwest(err: &reqwest::Error) -> bool {
	err.is_connect() || err.is_timeout() || err.is_request()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn structural_failures_are_not_retriable() {
		let challenge = Error::from(ChallengeError::MissingHeader);
		let jwt = Error::from(JwtError::MalformedToken { segments: 1 });
		let rejected = Error::InvalidClient { reason: "denied".into() };

		assert!(!challenge.is_retriable());
		assert!(!jwt.is_retriable());
		assert!(!rejected.is_retriable());
	}

	#[test]
	fn transient_failures_stay_retriable_through_sharing() {
		let transient = Error::from(TransientError::TokenEndpoint {
			message: "busy".into(),
			status: Some(503),
			retry_after: None,
		});
		let shared = Error::Shared(Arc::new(transient));

		assert!(shared.is_retriable());
		assert!(matches!(shared.root(), Error::Transient(_)));
	}

	#[test]
	fn middleware_round_trip_preserves_classification() {
		let err: reqwest_middleware::Error =
			Error::from(ChallengeError::MissingService { challenge: "Bearer realm=\"r\"".into() })
				.into();

		assert!(!is_retriable(&err));
		assert!(matches!(
			Error::from(err),
			Error::Challenge(ChallengeError::MissingService { .. })
		));
	}

	#[test]
	fn reqwest_builder_errors_are_not_retriable() {
		let err = reqwest::Client::new()
			.get("not a url")
			.build()
			.expect_err("Relative URLs cannot build a request.");

		assert!(err.is_builder());
		assert!(!is_retriable(&reqwest_middleware::Error::Reqwest(err)));

		let err = reqwest::Client::new()
			.get("registry.invalid/v2/")
			.build()
			.expect_err("Relative URLs cannot build a request.");

		assert!(!Error::from(TransportError::from(err)).is_retriable());
	}

	#[tokio::test]
	async fn refused_connections_are_retriable() {
		let err = reqwest::Client::new()
			.get("http://127.0.0.1:1/v2/")
			.send()
			.await
			.expect_err("Nothing listens on port 1.");

		assert!(err.is_connect());
		assert!(Error::from(TransportError::from(err)).is_retriable());
	}
}
