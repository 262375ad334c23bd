// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use time::{Duration, OffsetDateTime};
// self
use registry_challenge_auth::{
	cache::{ExpiringResource, ExpiringResourceOptions},
	error::Error,
};

const CALLERS: usize = 16;

fn slow_counter_cache(
	calls: Arc<AtomicUsize>,
	fail: bool,
) -> Arc<ExpiringResource<String, ()>> {
	let cache = ExpiringResource::new(move |_: ()| {
		let calls = calls.clone();

		async move {
			let call = calls.fetch_add(1, Ordering::SeqCst) + 1;

			tokio::time::sleep(std::time::Duration::from_millis(100)).await;

			if fail {
				return Err(Error::credential(format!("attempt {call} offline")));
			}

			Ok((format!("token-{call}"), OffsetDateTime::now_utc() + Duration::hours(1)))
		}
	});

	Arc::new(cache)
}

// Call `n` (1-based) sleeps `delays_ms[n - 1]` (0 past the end) and yields `token-n`.
fn scripted_cache(
	calls: Arc<AtomicUsize>,
	delays_ms: &'static [u64],
	lifetime: Duration,
) -> Arc<ExpiringResource<String, ()>> {
	let options = ExpiringResourceOptions::default().with_retry_cooldown(Duration::ZERO);
	let cache = ExpiringResource::with_options(
		move |_: ()| {
			let calls = calls.clone();

			async move {
				let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
				let delay = delays_ms.get(call - 1).copied().unwrap_or_default();

				tokio::time::sleep(std::time::Duration::from_millis(delay)).await;

				Ok((format!("token-{call}"), OffsetDateTime::now_utc() + lifetime))
			}
		},
		options,
	);

	Arc::new(cache)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_acquisition() {
	let calls = Arc::new(AtomicUsize::new(0));
	let cache = slow_counter_cache(calls.clone(), false);
	let handles = (0..CALLERS)
		.map(|_| {
			let cache = cache.clone();

			tokio::spawn(async move { cache.get(()).await })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let value = handle
			.await
			.expect("Cache task should not panic.")
			.expect("Concurrent callers should all receive the refreshed value.");

		assert_eq!(value, "token-1");
	}

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(cache.metrics().acquisitions(), 1);
	assert_eq!(cache.metrics().hits() as usize, CALLERS - 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_failure_and_recover_later() {
	let calls = Arc::new(AtomicUsize::new(0));
	let cache = slow_counter_cache(calls.clone(), true);
	let handles = (0..CALLERS)
		.map(|_| {
			let cache = cache.clone();

			tokio::spawn(async move { cache.get(()).await })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let err = handle
			.await
			.expect("Cache task should not panic.")
			.expect_err("Callers without a cached value must see the failure.");

		assert!(
			matches!(err.root(), Error::Credential { reason } if reason == "attempt 1 offline"),
			"Every waiter should observe the same failed attempt, got {err}."
		);
	}

	assert_eq!(calls.load(Ordering::SeqCst), 1);

	// Failures are not cached: the next caller acquires again.
	let err = cache.get(()).await.expect_err("Acquire still fails.");

	assert!(matches!(err.root(), Error::Credential { reason } if reason == "attempt 2 offline"));
	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert_eq!(cache.metrics().failures(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn eager_window_serves_current_value_while_refresh_runs() {
	let calls = Arc::new(AtomicUsize::new(0));
	// Values expire in two minutes, inside the default five-minute eager window.
	let cache = scripted_cache(calls.clone(), &[0, 300], Duration::minutes(2));

	assert_eq!(cache.get(()).await.expect("Initial acquire should succeed."), "token-1");

	let refresher = {
		let cache = cache.clone();

		tokio::spawn(async move { cache.get(()).await })
	};

	tokio::time::sleep(std::time::Duration::from_millis(50)).await;

	let value = tokio::time::timeout(std::time::Duration::from_millis(150), cache.get(()))
		.await
		.expect("Callers holding a valid value must not wait on the running refresh.")
		.expect("Cached value should be served.");

	assert_eq!(value, "token-1");
	assert_eq!(calls.load(Ordering::SeqCst), 2);

	let refreshed = refresher
		.await
		.expect("Refresh task should not panic.")
		.expect("Eager refresh should succeed.");

	assert_eq!(refreshed, "token-2");
	assert_eq!(cache.get(()).await.expect("Refreshed value should be served."), "token-2");
	assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_refresher_hands_over_to_next_waiter() {
	let calls = Arc::new(AtomicUsize::new(0));
	let cache = scripted_cache(calls.clone(), &[200, 100], Duration::hours(1));
	let refresher = {
		let cache = cache.clone();

		tokio::spawn(async move { cache.get(()).await })
	};

	tokio::time::sleep(std::time::Duration::from_millis(30)).await;

	let waiter = {
		let cache = cache.clone();

		tokio::spawn(async move { cache.get(()).await })
	};

	tokio::time::sleep(std::time::Duration::from_millis(40)).await;
	refresher.abort();

	let aborted = refresher.await.expect_err("Aborted refresher should not complete.");

	assert!(aborted.is_cancelled());
	assert_eq!(cache.expires_at(), None, "Cancelled refresh must leave the slot untouched.");

	let value = waiter
		.await
		.expect("Waiter task should not panic.")
		.expect("Waiter should take over the refresh.");

	assert_eq!(value, "token-2");
	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert_eq!(cache.get(()).await.expect("Cached value should be served."), "token-2");
	assert_eq!(calls.load(Ordering::SeqCst), 2);
}
