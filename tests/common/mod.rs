#![allow(dead_code)]

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use time::{Duration, OffsetDateTime};
// self
use registry_challenge_auth::{reqwest::Client as ReqwestClient, url::Url};

pub const SERVICE: &str = "registry.example.com";
pub const IDENTITY_TOKEN: &str = "identity-token";

/// Builds an unsigned JWT whose payload carries `exp`.
pub fn jwt_with_exp(exp: i64) -> String {
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
	let payload = URL_SAFE_NO_PAD.encode(format!("{{\"exp\":{exp},\"sub\":\"registry\"}}"));

	format!("{header}.{payload}.signature")
}

/// Registry refresh token expiring three hours from now.
pub fn fresh_refresh_token() -> String {
	jwt_with_exp((OffsetDateTime::now_utc() + Duration::hours(3)).unix_timestamp())
}

pub fn bearer_challenge(server_url: &str, scope: &str) -> String {
	format!("Bearer realm=\"{server_url}/oauth2/token\",service=\"{SERVICE}\",scope=\"{scope}\"")
}

pub fn endpoint(base_url: &str) -> Url {
	Url::parse(base_url).expect("Mock server URL should parse.")
}

/// Builds a reqwest client that accepts the self-signed certificates produced by `httpmock`.
pub fn test_http_client() -> ReqwestClient {
	ReqwestClient::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Failed to build insecure Reqwest client for tests.")
}
