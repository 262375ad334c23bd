//! HTTP helpers shared by the policy, the exchange client, and the retry middleware.
//!
//! [`ResponseMetadata`] captures the status and Retry-After hint of a response so error mapping
//! can classify failures consistently, and [`probe_request`] builds the bodiless copy of an
//! outgoing request the policy sends to discover the registry's challenge.

// crates.io
use reqwest::header::{HeaderMap, RETRY_AFTER};
use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;

/// Metadata captured from an HTTP response for downstream error mapping.
///
/// Additional metadata fields may be added in future releases, so downstream code
/// should construct values using field names instead of struct update syntax.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response was received.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}
impl ResponseMetadata {
	/// Captures the status and Retry-After hint of `response`.
	pub fn from_response(response: &Response) -> Self {
		Self {
			status: Some(response.status().as_u16()),
			retry_after: parse_retry_after(response.headers()),
		}
	}
}

/// Copies method, URL, headers, version, and timeout of `request`, leaving the body empty.
pub fn probe_request(request: &Request) -> Request {
	let mut probe = Request::new(request.method().clone(), request.url().clone());

	*probe.headers_mut() = request.headers().clone();
	*probe.version_mut() = request.version();
	*probe.timeout_mut() = request.timeout().copied();

	probe
}

/// Parses a Retry-After header given as delta-seconds or an RFC 2822 date.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// crates.io
	use reqwest::{
		Method,
		header::{AUTHORIZATION, HeaderValue},
	};
	// self
	use super::*;

	#[test]
	fn probe_drops_body_but_keeps_headers() {
		let mut request = Request::new(
			Method::PUT,
			Url::parse("https://example.azurecr.io/v2/hello/manifests/latest")
				.expect("Fixture URL should parse."),
		);

		request.headers_mut().insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
		*request.body_mut() = Some("{\"schemaVersion\":2}".into());
		*request.timeout_mut() = Some(std::time::Duration::from_secs(5));

		let probe = probe_request(&request);

		assert_eq!(probe.method(), &Method::PUT);
		assert_eq!(probe.url(), request.url());
		assert_eq!(probe.headers().get(AUTHORIZATION), request.headers().get(AUTHORIZATION));
		assert_eq!(probe.timeout(), Some(&std::time::Duration::from_secs(5)));
		assert!(probe.body().is_none());
		assert!(request.body().is_some(), "Original request must keep its body.");
	}

	#[test]
	fn retry_after_accepts_delta_seconds() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(7)));

		headers.insert(RETRY_AFTER, HeaderValue::from_static("Mon, 01 Jan 2001 00:00:00 +0000"));

		assert_eq!(parse_retry_after(&headers), None, "Past dates carry no delay.");
	}
}
