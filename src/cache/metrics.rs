// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for cache lookups and refreshes.
#[derive(Debug, Default)]
pub struct CacheMetrics {
	hits: AtomicU64,
	acquisitions: AtomicU64,
	failures: AtomicU64,
	swallowed: AtomicU64,
}
impl CacheMetrics {
	/// Returns the number of lookups answered from the cached value.
	pub fn hits(&self) -> u64 {
		self.hits.load(Ordering::Relaxed)
	}

	/// Returns the number of acquire function invocations.
	pub fn acquisitions(&self) -> u64 {
		self.acquisitions.load(Ordering::Relaxed)
	}

	/// Returns the number of failed acquire calls (including swallowed ones).
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Returns the number of eager refresh failures hidden behind a still-valid value.
	pub fn swallowed(&self) -> u64 {
		self.swallowed.load(Ordering::Relaxed)
	}

	pub(crate) fn record_hit(&self) {
		self.hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_acquisition(&self) {
		self.acquisitions.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_swallowed(&self) {
		self.swallowed.fetch_add(1, Ordering::Relaxed);
	}
}
