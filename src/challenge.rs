//! Parsing of the `WWW-Authenticate: Bearer ...` challenge a registry returns with a 401.

// crates.io
use reqwest::header::{HeaderMap, WWW_AUTHENTICATE};
// self
use crate::{_prelude::*, error::ChallengeError};

/// Scope requested when the challenge does not name one.
pub const DEFAULT_SCOPE: &str = "registry:catalog:*";

/// Service and scope a registry demands tokens for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Challenge {
	/// Logical service the tokens must be issued for.
	pub service: String,
	/// Resource/permission scope the access token must cover.
	pub scope: String,
}
impl Challenge {
	/// Reads the challenge from a 401 response's headers.
	pub fn from_headers(headers: &HeaderMap) -> Result<Self, ChallengeError> {
		let raw = headers.get(WWW_AUTHENTICATE).ok_or(ChallengeError::MissingHeader)?;

		raw.to_str()?.parse()
	}
}
impl FromStr for Challenge {
	type Err = ChallengeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let trimmed = s.trim();
		let params = match trimmed.split_once(char::is_whitespace) {
			Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest,
			_ => trimmed,
		};
		let mut service = None;
		let mut scope = None;

		for pair in split_params(params) {
			let Some((key, value)) = pair.split_once('=') else {
				continue;
			};
			let value = value.trim().trim_matches('"').trim();

			match key.trim() {
				"service" => service = Some(value),
				"scope" => scope = Some(value),
				_ => {},
			}
		}

		let service = service
			.filter(|value| !value.is_empty())
			.ok_or_else(|| ChallengeError::MissingService { challenge: s.to_owned() })?;
		let scope = scope.filter(|value| !value.is_empty()).unwrap_or(DEFAULT_SCOPE);

		Ok(Self { service: service.to_owned(), scope: scope.to_owned() })
	}
}

// Splits on commas outside double quotes.
fn split_params(params: &str) -> impl Iterator<Item = &str> {
	let mut quoted = false;

	params.split(move |c: char| {
		if c == '"' {
			quoted = !quoted;
		}

		c == ',' && !quoted
	})
}
