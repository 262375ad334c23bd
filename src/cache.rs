//! Single-slot cache for a short-lived value, refreshed through a caller-supplied acquire
//! function.
//!
//! [`ExpiringResource::get`] serves the cached value while it is comfortably valid. Once the value
//! enters the refresh window the next caller (at most once per cool-down) makes a best-effort
//! refresh and falls back to the still-valid value if that fails. An expired or missing value
//! forces a refresh whose error is surfaced. Every refresh runs under one async guard, so at most
//! one acquire call is in flight; callers queued behind it take its outcome instead of acquiring
//! again.

mod metrics;

pub use metrics::CacheMetrics;

// self
use crate::{_prelude::*, obs};

/// Boxed future produced by an acquire function: the new value and its absolute expiry.
pub type AcquireFuture<V> = Pin<Box<dyn Future<Output = Result<(V, OffsetDateTime)>> + Send>>;

type AcquireFn<V, S> = dyn Fn(S) -> AcquireFuture<V> + Send + Sync;
type Clock = dyn Fn() -> OffsetDateTime + Send + Sync;

/// Timing knobs for eager refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpiringResourceOptions {
	/// How long before expiry callers start refreshing eagerly.
	pub refresh_window: Duration,
	/// Minimum gap between two eager refresh attempts.
	pub retry_cooldown: Duration,
}
impl ExpiringResourceOptions {
	const DEFAULT_REFRESH_WINDOW: Duration = Duration::minutes(5);
	const DEFAULT_RETRY_COOLDOWN: Duration = Duration::seconds(30);

	/// Overrides the eager refresh window (defaults to 5 minutes).
	pub fn with_refresh_window(mut self, window: Duration) -> Self {
		self.refresh_window = if window.is_negative() { Duration::ZERO } else { window };

		self
	}

	/// Overrides the eager refresh cool-down (defaults to 30 seconds).
	pub fn with_retry_cooldown(mut self, cooldown: Duration) -> Self {
		self.retry_cooldown = if cooldown.is_negative() { Duration::ZERO } else { cooldown };

		self
	}
}
impl Default for ExpiringResourceOptions {
	fn default() -> Self {
		Self {
			refresh_window: Self::DEFAULT_REFRESH_WINDOW,
			retry_cooldown: Self::DEFAULT_RETRY_COOLDOWN,
		}
	}
}

/// Expiring value of type `V`, acquired with a per-call context of type `S`.
pub struct ExpiringResource<V, S> {
	acquire: Box<AcquireFn<V, S>>,
	slot: Mutex<Slot<V>>,
	refresh_guard: AsyncMutex<()>,
	options: ExpiringResourceOptions,
	clock: Arc<Clock>,
	metrics: CacheMetrics,
}
impl<V, S> ExpiringResource<V, S>
where
	V: 'static + Clone + Send + Sync,
	S: 'static + Send,
{
	/// Creates an empty cache backed by `acquire` with default options.
	pub fn new<F, Fut>(acquire: F) -> Self
	where
		F: 'static + Send + Sync + Fn(S) -> Fut,
		Fut: 'static + Send + Future<Output = Result<(V, OffsetDateTime)>>,
	{
		Self::with_options(acquire, ExpiringResourceOptions::default())
	}

	/// Creates an empty cache backed by `acquire` with explicit options.
	pub fn with_options<F, Fut>(acquire: F, options: ExpiringResourceOptions) -> Self
	where
		F: 'static + Send + Sync + Fn(S) -> Fut,
		Fut: 'static + Send + Future<Output = Result<(V, OffsetDateTime)>>,
	{
		Self {
			acquire: Box::new(move |state| -> AcquireFuture<V> { Box::pin(acquire(state)) }),
			slot: Mutex::new(Slot::empty()),
			refresh_guard: AsyncMutex::new(()),
			options,
			clock: Arc::new(OffsetDateTime::now_utc),
			metrics: CacheMetrics::default(),
		}
	}

	/// Replaces the wall clock used for expiry decisions.
	pub fn with_clock(mut self, clock: impl 'static + Send + Sync + Fn() -> OffsetDateTime) -> Self {
		self.clock = Arc::new(clock);

		self
	}

	/// Returns the eager refresh options in effect.
	pub fn options(&self) -> ExpiringResourceOptions {
		self.options
	}

	/// Returns the cache's counters.
	pub fn metrics(&self) -> &CacheMetrics {
		&self.metrics
	}

	/// Expiry of the cached value, if one was ever acquired.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		let slot = self.slot.lock();

		slot.value.as_ref().map(|_| slot.expires_at)
	}

	/// Returns a valid value, refreshing it through the acquire function when required.
	///
	/// `state` is handed to the acquire function unchanged and is dropped unused when the cached
	/// value is served. Errors surface only when no unexpired value exists to fall back on.
	pub async fn get(&self, state: S) -> Result<V> {
		let now = self.now();
		let plan = self.slot.lock().plan(now, &self.options);

		match plan {
			Plan::Serve(value) => {
				self.metrics.record_hit();

				Ok(value)
			},
			Plan::Eager(value) => {
				let Some(_guard) = self.refresh_guard.try_lock() else {
					// Another caller is refreshing; the current value is still valid.
					self.metrics.record_hit();

					return Ok(value);
				};
				let now = self.now();
				let replanned = self.slot.lock().plan(now, &self.options);

				if let Plan::Serve(value) = replanned {
					self.metrics.record_hit();

					return Ok(value);
				}

				self.refresh(state, now).await
			},
			Plan::Acquire { epoch } => {
				let _guard = self.refresh_guard.lock().await;
				let now = self.now();
				let settled = self.slot.lock().settled_since(epoch, now);

				match settled {
					Some(Ok(value)) => {
						self.metrics.record_hit();

						Ok(value)
					},
					Some(Err(err)) => Err(Error::Shared(err)),
					None => self.refresh(state, now).await,
				}
			},
		}
	}

	async fn refresh(&self, state: S, started_at: OffsetDateTime) -> Result<V> {
		self.metrics.record_acquisition();

		let outcome = (self.acquire)(state).await;
		let mut slot = self.slot.lock();

		slot.last_attempt = Some(started_at);
		slot.attempts += 1;

		match outcome {
			Ok((value, expires_at)) => {
				slot.value = Some(value.clone());
				slot.expires_at = expires_at;
				slot.last_failure = None;

				Ok(value)
			},
			Err(err) => {
				self.metrics.record_failure();

				if let Some(value) = slot.valid_at(self.now()) {
					self.metrics.record_swallowed();
					obs::record_swallowed_refresh(&err);

					return Ok(value);
				}

				let shared = Arc::new(err);

				slot.last_failure = Some(shared.clone());

				Err(Error::Shared(shared))
			},
		}
	}

	fn now(&self) -> OffsetDateTime {
		(self.clock)()
	}
}
impl<V, S> Debug for ExpiringResource<V, S> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let slot = self.slot.lock();

		f.debug_struct("ExpiringResource")
			.field("cached", &slot.value.is_some())
			.field("expires_at", &slot.expires_at)
			.field("last_attempt", &slot.last_attempt)
			.field("options", &self.options)
			.finish()
	}
}

struct Slot<V> {
	value: Option<V>,
	expires_at: OffsetDateTime,
	last_attempt: Option<OffsetDateTime>,
	// Completed refresh attempts; lets queued callers spot a refresh that finished meanwhile.
	attempts: u64,
	last_failure: Option<Arc<Error>>,
}
impl<V> Slot<V>
where
	V: Clone,
{
	fn empty() -> Self {
		Self {
			value: None,
			expires_at: OffsetDateTime::UNIX_EPOCH,
			last_attempt: None,
			attempts: 0,
			last_failure: None,
		}
	}

	fn valid_at(&self, now: OffsetDateTime) -> Option<V> {
		if self.expires_at > now { self.value.clone() } else { None }
	}

	fn plan(&self, now: OffsetDateTime, options: &ExpiringResourceOptions) -> Plan<V> {
		let Some(value) = self.valid_at(now) else {
			return Plan::Acquire { epoch: self.attempts };
		};
		let expiring = self
			.expires_at
			.checked_sub(options.refresh_window)
			.is_none_or(|window_start| window_start <= now);
		let cooled_down = self
			.last_attempt
			.is_none_or(|attempted_at| attempted_at + options.retry_cooldown <= now);

		if expiring && cooled_down { Plan::Eager(value) } else { Plan::Serve(value) }
	}

	fn settled_since(&self, epoch: u64, now: OffsetDateTime) -> Option<Result<V, Arc<Error>>> {
		if self.attempts == epoch {
			return None;
		}
		if let Some(value) = self.valid_at(now) {
			return Some(Ok(value));
		}

		self.last_failure.clone().map(Err)
	}
}

enum Plan<V> {
	Serve(V),
	Eager(V),
	Acquire { epoch: u64 },
}
