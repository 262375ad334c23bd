mod common;

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// crates.io
use httpmock::prelude::*;
use time::Duration;
// self
use common::test_http_client;
use registry_challenge_auth::{
	error::{Error, TransientError},
	reqwest::{Request, Response, StatusCode},
	reqwest_middleware::{self, ClientBuilder, Middleware, Next},
	retry::RetryPolicy,
};

fn fast_retry(max_retries: u32) -> RetryPolicy {
	RetryPolicy::default()
		.with_max_retries(max_retries)
		.with_base_delay(Duration::milliseconds(5))
		.with_max_delay(Duration::milliseconds(20))
}

// Fails the first `failures` attempts with the configured error before letting requests through.
struct FailFirst {
	failures: usize,
	seen: AtomicUsize,
	transient: bool,
}
impl FailFirst {
	fn new(failures: usize, transient: bool) -> Self {
		Self { failures, seen: AtomicUsize::new(0), transient }
	}
}
#[async_trait::async_trait]
impl Middleware for FailFirst {
	async fn handle(
		&self,
		req: Request,
		extensions: &mut http::Extensions,
		next: Next<'_>,
	) -> reqwest_middleware::Result<Response> {
		if self.seen.fetch_add(1, Ordering::SeqCst) < self.failures {
			let err = if self.transient {
				Error::from(TransientError::TokenEndpoint {
					message: "flaky upstream".into(),
					status: Some(503),
					retry_after: None,
				})
			} else {
				Error::InvalidGrant { reason: "refresh token revoked".into() }
			};

			return Err(err.into());
		}

		next.run(req, extensions).await
	}
}

#[tokio::test]
async fn retriable_statuses_are_retried_until_exhausted() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v2/");
			then.status(503).header("retry-after", "0");
		})
		.await;
	let client = ClientBuilder::new(test_http_client()).with(fast_retry(2)).build();
	let response = client.get(server.url("/v2/")).send().await?;

	assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

	mock.assert_calls_async(3).await;

	Ok(())
}

#[tokio::test]
async fn client_errors_are_not_retried() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v2/missing/tags/list");
			then.status(404);
		})
		.await;
	let client = ClientBuilder::new(test_http_client()).with(fast_retry(3)).build();
	let response = client.get(server.url("/v2/missing/tags/list")).send().await?;

	assert_eq!(response.status(), StatusCode::NOT_FOUND);

	mock.assert_calls_async(1).await;

	Ok(())
}

#[tokio::test]
async fn transient_middleware_errors_are_retried() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(PUT).path("/v2/app/blobs/uploads/1").body("layer");
			then.status(201);
		})
		.await;
	let client = ClientBuilder::new(test_http_client())
		.with(fast_retry(3))
		.with(FailFirst::new(2, true))
		.build();
	let response = client.put(server.url("/v2/app/blobs/uploads/1")).body("layer").send().await?;

	assert_eq!(response.status(), StatusCode::CREATED);

	mock.assert_calls_async(1).await;

	Ok(())
}

#[tokio::test]
async fn non_retriable_middleware_errors_stop_the_pipeline() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v2/");
			then.status(200);
		})
		.await;
	let client = ClientBuilder::new(test_http_client())
		.with(fast_retry(3))
		.with(FailFirst::new(1, false))
		.build();
	let err = client
		.get(server.url("/v2/"))
		.send()
		.await
		.expect_err("Non-retriable errors must surface on the first attempt.");

	assert!(matches!(Error::from(err), Error::InvalidGrant { .. }));

	mock.assert_calls_async(0).await;
}
