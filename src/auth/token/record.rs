//! Access and refresh token records issued by the registry's token endpoints.

// self
use crate::{
	_prelude::*,
	auth::{jwt, token::secret::TokenSecret},
};

/// Short-lived bearer token attached to registry requests.
///
/// Identity credentials hand these out as well; in that role the token is only ever presented to
/// the registry's exchange endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessToken {
	/// Bearer secret; callers must avoid logging it.
	pub secret: TokenSecret,
	/// Expiry instant when the issuer reported one.
	pub expires_at: Option<OffsetDateTime>,
}
impl AccessToken {
	/// Wraps a bearer secret with no known expiry.
	pub fn new(secret: impl Into<String>) -> Self {
		Self { secret: TokenSecret::new(secret), expires_at: None }
	}

	/// Records the instant at which the token stops being accepted.
	pub fn with_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Returns the raw bearer value.
	pub fn expose(&self) -> &str {
		self.secret.expose()
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("secret", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Registry refresh token whose expiry is read from its own `exp` claim.
#[derive(Clone, Serialize, Deserialize)]
pub struct RefreshToken {
	/// Refresh secret; callers must avoid logging it.
	pub secret: TokenSecret,
	/// Expiry instant decoded from the token claims.
	pub expires_at: OffsetDateTime,
}
impl RefreshToken {
	/// Parses the token's claims to learn when it expires.
	pub fn from_jwt(token: impl Into<String>) -> Result<Self> {
		let secret = TokenSecret::new(token);
		let expires_at = jwt::expires_at(secret.expose())?;

		Ok(Self { secret, expires_at })
	}

	/// Returns the raw refresh value.
	pub fn expose(&self) -> &str {
		self.secret.expose()
	}
}
impl Debug for RefreshToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshToken")
			.field("secret", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
	use time::macros;
	// self
	use super::*;

	#[test]
	fn access_token_debug_redacts_secret() {
		let token = AccessToken::new("access").with_expires_at(macros::datetime!(2025-01-01 01:00 UTC));
		let rendered = format!("{token:?}");

		assert_eq!(token.expose(), "access");
		assert!(rendered.contains("<redacted>"));
		assert!(!rendered.contains("\"access\""));
	}

	#[test]
	fn refresh_token_reads_expiry_from_claims() {
		let claims = URL_SAFE_NO_PAD.encode(br#"{"exp":1735693200}"#);
		let token = RefreshToken::from_jwt(format!("header.{claims}.signature"))
			.expect("Refresh token with valid claims should parse.");

		assert_eq!(token.expires_at, macros::datetime!(2025-01-01 01:00 UTC));
		assert!(format!("{token:?}").contains("<redacted>"));
	}
}
