use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Current time on the process-local monotonic clock, in nanoseconds since
/// an arbitrary epoch fixed at first use.
pub(crate) fn now_nanos() -> i64 {
	let epoch = *EPOCH.get_or_init(Instant::now);
	// u128 nanos exceed i64 range only after ~292 years of process uptime.
	Instant::now().duration_since(epoch).as_nanos() as i64
}

/// Absolute deadline for an entry inserted now with the given TTL.
pub(crate) fn deadline_after(ttl: Duration) -> i64 {
	let ttl = i64::try_from(ttl.as_nanos()).unwrap_or(i64::MAX);
	now_nanos().saturating_add(ttl)
}

/// An entry stored in a [`Cache`](crate::Cache).
///
/// Items are owned by the cache. All methods are safe to call concurrently.
///
/// The cache may later delete or evict a key, but an `Arc<Item>` previously
/// returned by `get`/`peek` stays valid; it then represents a snapshot no
/// longer reachable from the cache.
pub struct Item<T> {
	key: Arc<str>,
	value: T,
	/// Cost in abstract units, fixed at insert time.
	weight: u64,
	/// Tick assigned at insert, never updated while the item lives.
	created: u64,
	/// Deadline in monotonic nanoseconds.
	expires: AtomicI64,
	last_access: AtomicU64,
	hits: AtomicU64,
}

impl<T> Item<T> {
	pub(crate) fn new(key: Arc<str>, value: T, expires: i64, weight: u64, tick: u64) -> Self {
		Self {
			key,
			value,
			weight,
			created: tick,
			expires: AtomicI64::new(expires),
			last_access: AtomicU64::new(tick),
			hits: AtomicU64::new(0),
		}
	}

	/// The stored value.
	pub fn value(&self) -> &T {
		&self.value
	}

	/// The lookup key.
	pub fn key(&self) -> &str {
		&self.key
	}

	/// Whether the item is expired at the current time.
	pub fn expired(&self) -> bool {
		self.expires.load(Ordering::Relaxed) < now_nanos()
	}

	/// Remaining time-to-live. Zero once the item has expired.
	pub fn ttl(&self) -> Duration {
		let remaining = self.expires.load(Ordering::Relaxed) - now_nanos();
		if remaining <= 0 {
			Duration::ZERO
		} else {
			Duration::from_nanos(remaining as u64)
		}
	}

	/// Move the expiration deadline to now + `ttl`.
	///
	/// A `ttl` shorter than the remaining time shortens the item's life.
	pub fn extend(&self, ttl: Duration) {
		self.expires.store(deadline_after(ttl), Ordering::Relaxed);
	}

	/// Record one hit event: store the access tick and bump the hit counter.
	///
	/// The two stores are not observed atomically as a pair; rankers tolerate
	/// any stable snapshot of them.
	pub(crate) fn touch(&self, tick: u64) {
		self.last_access.store(tick, Ordering::Relaxed);
		self.hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn key_shared(&self) -> Arc<str> {
		Arc::clone(&self.key)
	}

	pub(crate) fn weight(&self) -> u64 {
		self.weight
	}

	pub(crate) fn created_tick(&self) -> u64 {
		self.created
	}

	pub(crate) fn last_access_tick(&self) -> u64 {
		self.last_access.load(Ordering::Relaxed)
	}

	pub(crate) fn hits(&self) -> u64 {
		self.hits.load(Ordering::Relaxed)
	}
}

impl<T: std::fmt::Debug> std::fmt::Debug for Item<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Item")
			.field("key", &self.key)
			.field("value", &self.value)
			.field("weight", &self.weight)
			.field("hits", &self.hits.load(Ordering::Relaxed))
			.finish_non_exhaustive()
	}
}

/// Weight used when no weigher is configured.
///
/// A coarse byte approximation: key length plus the shallow size of the
/// value type. Heap-backed values should supply a real weigher.
pub(crate) fn default_weigh<T>(key: &str, _value: &T) -> u64 {
	(key.len() + std::mem::size_of::<T>()) as u64
}
