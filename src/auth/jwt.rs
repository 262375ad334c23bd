//! Expiry extraction from JWT-shaped refresh tokens.
//!
//! Signatures are not verified; the registry issued the token and only its lifetime is needed to
//! decide when the cached copy goes stale.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::{_prelude::*, error::JwtError};

#[derive(Deserialize)]
struct ExpiryClaims {
	exp: i64,
}

/// Decodes the `exp` claim of `token` into an absolute instant.
pub fn expires_at(token: &str) -> Result<OffsetDateTime, JwtError> {
	let segments = token.split('.').collect::<Vec<_>>();

	if segments.len() < 2 {
		return Err(JwtError::MalformedToken { segments: segments.len() });
	}

	let payload = STANDARD.decode(pad(segments[1]))?;
	let claims: ExpiryClaims =
		serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(&payload))?;

	OffsetDateTime::from_unix_timestamp(claims.exp)
		.map_err(|_| JwtError::ExpiryOutOfRange { exp: claims.exp })
}

// Maps the URL-safe alphabet onto the standard one and restores stripped padding.
fn pad(segment: &str) -> String {
	let mut buf = segment.replace('-', "+").replace('_', "/");

	while buf.len() % 4 != 0 {
		buf.push('=');
	}

	buf
}
