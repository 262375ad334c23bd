//! Generic pipeline retry middleware.
//!
//! Re-sends requests that failed with a transport error or came back with a throttling or
//! availability status (408, 429, 500, 502, 503, 504), using exponential backoff capped at
//! `max_delay` and honoring Retry-After. Errors are consulted through [`error::is_retriable`] so
//! challenge and token-decoding failures raised by
//! [`AuthenticationPolicy`](crate::policy::AuthenticationPolicy) are never retried. Requests with
//! streaming bodies cannot be replayed and are sent exactly once.

// crates.io
use reqwest_middleware::{Middleware, Next};
// self
use crate::{_prelude::*, error, http::parse_retry_after, obs};

/// Exponential-backoff retry middleware.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Retries allowed after the first attempt.
	pub max_retries: u32,
	/// Delay before the first retry; doubles for each further retry.
	pub base_delay: Duration,
	/// Upper bound for any single delay, including Retry-After hints.
	pub max_delay: Duration,
}
impl RetryPolicy {
	const DEFAULT_BASE_DELAY: Duration = Duration::milliseconds(800);
	const DEFAULT_MAX_DELAY: Duration = Duration::seconds(60);
	const DEFAULT_MAX_RETRIES: u32 = 3;

	/// A policy that never retries.
	pub fn disabled() -> Self {
		Self { max_retries: 0, ..Self::default() }
	}

	/// Overrides the number of retries (defaults to 3).
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;

		self
	}

	/// Overrides the initial backoff delay (defaults to 800 milliseconds).
	pub fn with_base_delay(mut self, delay: Duration) -> Self {
		self.base_delay = if delay.is_negative() { Duration::ZERO } else { delay };

		self
	}

	/// Overrides the delay cap (defaults to 60 seconds).
	pub fn with_max_delay(mut self, delay: Duration) -> Self {
		self.max_delay = if delay.is_negative() { Duration::ZERO } else { delay };

		self
	}

	/// Returns `true` for statuses worth re-sending.
	pub fn is_retriable_status(status: StatusCode) -> bool {
		matches!(
			status,
			StatusCode::REQUEST_TIMEOUT
				| StatusCode::TOO_MANY_REQUESTS
				| StatusCode::INTERNAL_SERVER_ERROR
				| StatusCode::BAD_GATEWAY
				| StatusCode::SERVICE_UNAVAILABLE
				| StatusCode::GATEWAY_TIMEOUT
		)
	}

	/// Backoff before retry number `retry` (1-based).
	pub fn backoff(&self, retry: u32) -> Duration {
		let factor = 1_i32 << retry.saturating_sub(1).min(20);

		self.base_delay.checked_mul(factor).unwrap_or(self.max_delay).min(self.max_delay)
	}

	fn retry_delay(
		&self,
		outcome: &reqwest_middleware::Result<Response>,
		attempt: u32,
	) -> Option<Duration> {
		if attempt > self.max_retries {
			return None;
		}

		match outcome {
			Ok(response) if Self::is_retriable_status(response.status()) => {
				let delay = parse_retry_after(response.headers())
					.map(|hint| hint.min(self.max_delay))
					.unwrap_or_else(|| self.backoff(attempt));

				obs::record_retry(attempt, delay, &response.status());

				Some(delay)
			},
			Err(err) if error::is_retriable(err) => {
				let delay = self.backoff(attempt);

				obs::record_retry(attempt, delay, err);

				Some(delay)
			},
			_ => None,
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: Self::DEFAULT_MAX_RETRIES,
			base_delay: Self::DEFAULT_BASE_DELAY,
			max_delay: Self::DEFAULT_MAX_DELAY,
		}
	}
}
#[async_trait::async_trait]
impl Middleware for RetryPolicy {
	async fn handle(
		&self,
		req: Request,
		extensions: &mut ::http::Extensions,
		next: Next<'_>,
	) -> reqwest_middleware::Result<Response> {
		let mut attempt = 0;

		loop {
			let Some(attempt_req) = req.try_clone() else {
				return next.run(req, extensions).await;
			};
			let outcome = next.clone().run(attempt_req, extensions).await;

			attempt += 1;

			let Some(delay) = self.retry_delay(&outcome, attempt) else {
				return outcome;
			};

			drop(outcome);
			tokio::time::sleep(delay.unsigned_abs()).await;
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn backoff_doubles_and_caps() {
		let policy = RetryPolicy::default()
			.with_base_delay(Duration::milliseconds(100))
			.with_max_delay(Duration::milliseconds(350));

		assert_eq!(policy.backoff(1), Duration::milliseconds(100));
		assert_eq!(policy.backoff(2), Duration::milliseconds(200));
		assert_eq!(policy.backoff(3), Duration::milliseconds(350));
		assert_eq!(policy.backoff(40), Duration::milliseconds(350));
	}

	#[test]
	fn only_throttling_and_availability_statuses_retry() {
		assert!(RetryPolicy::is_retriable_status(StatusCode::SERVICE_UNAVAILABLE));
		assert!(RetryPolicy::is_retriable_status(StatusCode::TOO_MANY_REQUESTS));
		assert!(!RetryPolicy::is_retriable_status(StatusCode::UNAUTHORIZED));
		assert!(!RetryPolicy::is_retriable_status(StatusCode::NOT_IMPLEMENTED));
	}

	#[test]
	fn non_retriable_errors_stop_immediately() {
		let policy = RetryPolicy::default();
		let err: reqwest_middleware::Error =
			Error::from(crate::error::ChallengeError::MissingHeader).into();

		assert_eq!(policy.retry_delay(&Err(err), 1), None);
		assert_eq!(RetryPolicy::disabled().max_retries, 0);
	}
}
