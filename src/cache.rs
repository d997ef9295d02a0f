use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;

use crate::config::{Config, EvictionPolicy, ExpirationPolicy, Weigher};
use crate::item::{self, Item};
use crate::metrics::CacheMetrics;
use crate::shard::Shard;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Stable 32-bit FNV-1a digest of the key bytes.
///
/// Fixed so that equal configurations route equal keys to the same shard
/// across runs within one process.
fn fnv1a(key: &str) -> u32 {
	let mut digest = FNV_OFFSET_BASIS;
	for byte in key.bytes() {
		digest ^= u32::from(byte);
		digest = digest.wrapping_mul(FNV_PRIME);
	}
	digest
}

/// A sharded in-memory cache with per-item TTL and weight-bounded capacity.
///
/// Keys are strings; values are any `T`. Each successful `get` updates an
/// access tick and hit counter on the item. When the summed weight of stored
/// items exceeds the configured capacity, `set` evicts synchronously using
/// sampled candidate selection under the configured policy (default:
/// sampled LRU).
///
/// # TTL
///
/// Expiration is observed lazily on read; there is no background sweeper.
/// By default expired items are treated as misses; configure
/// [`ExpirationPolicy::ReturnExpired`] to have `get`/`peek` return them.
///
/// # Concurrency
///
/// All methods take `&self` and are safe to call from any thread; share the
/// cache with `Arc<Cache<T>>`. Each shard is guarded by its own
/// readers-writer lock, and cache-wide state is kept in atomics, so there is
/// no global lock.
///
/// # Returned items
///
/// `get`/`peek` return `Arc<Item<T>>` handles. If the key is later evicted
/// or deleted, a previously returned handle stays usable but may refer to an
/// item no longer reachable from the cache.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sampled_cache::{Cache, Config};
///
/// let cache = Cache::new(Config::new());
/// cache.set("user:1", "alice".to_string(), Duration::from_secs(60));
///
/// let item = cache.get("user:1").expect("just inserted");
/// assert_eq!(item.value(), "alice");
/// ```
pub struct Cache<T> {
	shards: Box<[Shard<T>]>,
	shard_mask: u32,

	max_weight: i64,
	items_to_prune: usize,
	sample_size: usize,
	eviction_policy: EvictionPolicy,
	expiration_policy: ExpirationPolicy,
	weigher: Weigher<T>,

	/// Logical clock issuing strictly increasing access ticks.
	access_clock: AtomicU64,
	/// Summed weight of live items. May transiently overshoot `max_weight`
	/// between a mutation and the eviction loop that follows it.
	size: AtomicI64,

	hits: AtomicU64,
	misses: AtomicU64,
	inserts: AtomicU64,
	updates: AtomicU64,
	evictions: AtomicU64,
	removals: AtomicU64,
}

impl<T: 'static> Cache<T> {
	/// Construct a cache from `config`.
	///
	/// Invalid configuration fields are silently replaced with defaults;
	/// construction never fails.
	pub fn new(config: Config<T>) -> Self {
		let cfg = config.normalized();
		let shards: Box<[Shard<T>]> = (0..cfg.shards).map(|_| Shard::new()).collect();
		let weigher = cfg.weigher.unwrap_or_else(|| Arc::new(item::default_weigh::<T>));

		Self {
			shards,
			shard_mask: (cfg.shards - 1) as u32,
			max_weight: cfg.max_weight.min(i64::MAX as u64) as i64,
			items_to_prune: cfg.items_to_prune,
			sample_size: cfg.sample_size,
			eviction_policy: cfg.eviction_policy,
			expiration_policy: cfg.expiration_policy,
			weigher,
			access_clock: AtomicU64::new(0),
			size: AtomicI64::new(0),
			hits: AtomicU64::new(0),
			misses: AtomicU64::new(0),
			inserts: AtomicU64::new(0),
			updates: AtomicU64::new(0),
			evictions: AtomicU64::new(0),
			removals: AtomicU64::new(0),
		}
	}

	/// Insert or update `key` with a TTL.
	///
	/// An existing item under the same key is displaced. Runs the eviction
	/// loop before returning if the cache is over its weight capacity.
	pub fn set(&self, key: &str, value: T, ttl: Duration) {
		// The weigher runs before any shard lock is taken.
		let weight = (self.weigher)(key, &value).min(i64::MAX as u64);
		let expires = item::deadline_after(ttl);
		let tick = self.next_tick();
		let item = Arc::new(Item::new(Arc::from(key), value, expires, weight, tick));

		match self.shard_for(key).set(item) {
			Some(old) => {
				self.size.fetch_sub(old.weight() as i64, Ordering::Relaxed);
				self.updates.fetch_add(1, Ordering::Relaxed);
			}
			None => {
				self.inserts.fetch_add(1, Ordering::Relaxed);
			}
		}
		self.size.fetch_add(weight as i64, Ordering::Relaxed);

		self.evict_if_needed();
	}

	/// Look up `key`, touching its access metadata on a hit.
	///
	/// Returns `None` for absent keys, and for expired keys under
	/// [`ExpirationPolicy::TreatExpiredAsMiss`].
	pub fn get(&self, key: &str) -> Option<Arc<Item<T>>> {
		match self.shard_for(key).get(key) {
			Some(item) if !self.miss_on_expiry(&item) => {
				item.touch(self.next_tick());
				self.hits.fetch_add(1, Ordering::Relaxed);
				Some(item)
			}
			_ => {
				self.misses.fetch_add(1, Ordering::Relaxed);
				None
			}
		}
	}

	/// Look up `key` without updating access metadata or counters.
	///
	/// Useful for checking a key without influencing eviction. The
	/// expiration policy still applies.
	pub fn peek(&self, key: &str) -> Option<Arc<Item<T>>> {
		let item = self.shard_for(key).get(key)?;
		if self.miss_on_expiry(&item) {
			return None;
		}
		Some(item)
	}

	/// Remove `key` if present.
	pub fn delete(&self, key: &str) {
		if let Some(item) = self.shard_for(key).delete(key) {
			self.size.fetch_sub(item.weight() as i64, Ordering::Relaxed);
			self.removals.fetch_add(1, Ordering::Relaxed);
		}
	}

	/// Update the value of an existing key, preserving its remaining TTL.
	///
	/// Returns `false` if the key does not exist. Time may elapse between
	/// the read and the re-insert, so the preserved TTL can come out
	/// slightly shorter than the remainder observed by the caller.
	pub fn replace(&self, key: &str, value: T) -> bool {
		let Some(item) = self.peek_raw(key) else {
			return false;
		};
		self.set(key, value, item.ttl());
		true
	}

	/// Move the expiration of an existing key to now + `ttl`.
	///
	/// Returns `false` if the key does not exist. Counts as an access.
	pub fn extend(&self, key: &str, ttl: Duration) -> bool {
		let Some(item) = self.peek_raw(key) else {
			return false;
		};
		item.extend(ttl);
		item.touch(self.next_tick());
		true
	}

	/// Remove all items and reset the counters.
	pub fn clear(&self) {
		for shard in &self.shards {
			shard.clear();
		}
		self.size.store(0, Ordering::Relaxed);
		self.hits.store(0, Ordering::Relaxed);
		self.misses.store(0, Ordering::Relaxed);
		self.inserts.store(0, Ordering::Relaxed);
		self.updates.store(0, Ordering::Relaxed);
		self.evictions.store(0, Ordering::Relaxed);
		self.removals.store(0, Ordering::Relaxed);
	}

	/// Call `f` for each key/value until it returns `false`.
	///
	/// Shards are visited in index order and the callback runs under each
	/// shard's read lock in turn; keep it quick and do not call back into
	/// the cache from it. Entries are delivered regardless of expiration.
	/// There is no cross-shard snapshot: concurrent writers may be observed
	/// in some shards and not others.
	pub fn range<F>(&self, mut f: F)
	where
		F: FnMut(&str, &T) -> bool,
	{
		for shard in &self.shards {
			if !shard.for_each(&mut f) {
				return;
			}
		}
	}

	/// All items whose key contains `pattern` as a substring.
	///
	/// Matched keys are read through [`get`](Cache::get), so their access
	/// metadata is touched; an entry that expires as a miss between the
	/// match and the read is dropped from the result.
	pub fn filter(&self, pattern: &str) -> Vec<Arc<Item<T>>> {
		let mut matched = Vec::new();
		self.range(|key, _| {
			if key.contains(pattern) {
				matched.push(key.to_owned());
			}
			true
		});
		// The reads happen after iteration so no shard lock is re-entered.
		matched.iter().filter_map(|key| self.get(key)).collect()
	}

	/// Number of keys currently stored.
	pub fn item_count(&self) -> usize {
		self.shards.iter().map(Shard::item_count).sum()
	}

	/// Alias for [`item_count`](Cache::item_count).
	pub fn len(&self) -> usize {
		self.item_count()
	}

	/// Whether the cache holds no items.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// A snapshot of the cache's activity counters.
	pub fn metrics(&self) -> CacheMetrics {
		CacheMetrics {
			hits: self.hits.load(Ordering::Relaxed),
			misses: self.misses.load(Ordering::Relaxed),
			inserts: self.inserts.load(Ordering::Relaxed),
			updates: self.updates.load(Ordering::Relaxed),
			evictions: self.evictions.load(Ordering::Relaxed),
			removals: self.removals.load(Ordering::Relaxed),
			weight: self.size.load(Ordering::Relaxed),
			max_weight: self.max_weight as u64,
			item_count: self.item_count(),
		}
	}

	/// Lookup ignoring the expiration policy. Used by `replace`/`extend`,
	/// which operate on present-but-expired keys too.
	fn peek_raw(&self, key: &str) -> Option<Arc<Item<T>>> {
		self.shard_for(key).get(key)
	}

	fn miss_on_expiry(&self, item: &Item<T>) -> bool {
		self.expiration_policy == ExpirationPolicy::TreatExpiredAsMiss && item.expired()
	}

	fn shard_for(&self, key: &str) -> &Shard<T> {
		&self.shards[(fnv1a(key) & self.shard_mask) as usize]
	}

	fn next_tick(&self) -> u64 {
		self.access_clock.fetch_add(1, Ordering::Relaxed) + 1
	}

	/// Evict until the cache is back under its weight capacity, up to
	/// `items_to_prune` iterations.
	///
	/// A candidate that loses its compare-and-remove race was already
	/// replaced by a concurrent `set`; the loop moves on without adjusting
	/// the size, since the displaced weight was accounted by that `set`.
	fn evict_if_needed(&self) {
		for _ in 0..self.items_to_prune {
			if self.size.load(Ordering::Relaxed) <= self.max_weight {
				return;
			}

			let Some(candidate) = self.pick_eviction_candidate() else {
				return;
			};

			if self.shard_for(candidate.key()).delete_if_same(candidate.key(), &candidate) {
				self.size.fetch_sub(candidate.weight() as i64, Ordering::Relaxed);
				self.evictions.fetch_add(1, Ordering::Relaxed);
			}
		}
	}

	fn pick_eviction_candidate(&self) -> Option<Arc<Item<T>>> {
		// Sampling cannot beat a full scan while the cache is small.
		if self.item_count() <= self.sample_size {
			return match self.eviction_policy {
				EvictionPolicy::SampledLru => self.scan_oldest(),
				EvictionPolicy::SampledLhd => self.scan_least_hit_dense(),
			};
		}

		match self.eviction_policy {
			EvictionPolicy::SampledLru => self.pick_sampled_lru().or_else(|| self.scan_oldest()),
			EvictionPolicy::SampledLhd => {
				self.pick_sampled_lhd().or_else(|| self.scan_least_hit_dense())
			}
		}
	}

	/// Draw `sample_size` items across random shards; the winner is the one
	/// with the smallest access tick.
	fn pick_sampled_lru(&self) -> Option<Arc<Item<T>>> {
		let mut rng = rand::thread_rng();
		let mut best: Option<(Arc<Item<T>>, u64)> = None;

		for _ in 0..self.sample_size {
			let shard = &self.shards[rng.gen_range(0..self.shards.len())];
			let Some(item) = shard.sample_nth(rng.gen::<u64>()) else {
				continue;
			};

			let tick = item.last_access_tick();
			if best.as_ref().is_none_or(|(_, best_tick)| tick < *best_tick) {
				best = Some((item, tick));
			}
		}

		best.map(|(item, _)| item)
	}

	/// Draw `sample_size` items across random shards; the winner is the one
	/// with the lowest hit density.
	fn pick_sampled_lhd(&self) -> Option<Arc<Item<T>>> {
		let now_tick = self.access_clock.load(Ordering::Relaxed).max(1);
		let mut rng = rand::thread_rng();
		let mut best: Option<Arc<Item<T>>> = None;

		for _ in 0..self.sample_size {
			let shard = &self.shards[rng.gen_range(0..self.shards.len())];
			let Some(item) = shard.sample_nth(rng.gen::<u64>()) else {
				continue;
			};

			if best.as_ref().is_none_or(|current| lhd_prefers(&item, current, now_tick)) {
				best = Some(item);
			}
		}

		best
	}

	/// Full scan for the globally oldest access tick.
	fn scan_oldest(&self) -> Option<Arc<Item<T>>> {
		let mut best: Option<(Arc<Item<T>>, u64)> = None;

		for shard in &self.shards {
			shard.scan(&mut |item| {
				let tick = item.last_access_tick();
				if best.as_ref().is_none_or(|(_, best_tick)| tick < *best_tick) {
					best = Some((Arc::clone(item), tick));
				}
			});
		}

		best.map(|(item, _)| item)
	}

	/// Full scan for the globally lowest hit density.
	fn scan_least_hit_dense(&self) -> Option<Arc<Item<T>>> {
		let now_tick = self.access_clock.load(Ordering::Relaxed).max(1);
		let mut best: Option<Arc<Item<T>>> = None;

		for shard in &self.shards {
			shard.scan(&mut |item| {
				if best.as_ref().is_none_or(|current| lhd_prefers(item, current, now_tick)) {
					best = Some(Arc::clone(item));
				}
			});
		}

		best
	}
}

/// Whether `candidate` ranks as a better eviction victim than `current`
/// under least-hit-density.
///
/// Densities `hits / (age * weight)` are compared by 128-bit
/// cross-multiplication, avoiding both division and overflow. Ties prefer
/// the heavier item, then the older access tick.
fn lhd_prefers<T>(candidate: &Item<T>, current: &Item<T>, now_tick: u64) -> bool {
	let (cand_hits, cand_denom) = lhd_stats(candidate, now_tick);
	let (cur_hits, cur_denom) = lhd_stats(current, now_tick);

	let cand_cross = u128::from(cand_hits) * u128::from(cur_denom);
	let cur_cross = u128::from(cur_hits) * u128::from(cand_denom);
	if cand_cross != cur_cross {
		return cand_cross < cur_cross;
	}

	if candidate.weight() != current.weight() {
		return candidate.weight() > current.weight();
	}

	candidate.last_access_tick() < current.last_access_tick()
}

/// Hit count and density denominator for an item, with age and weight both
/// clamped to at least 1.
fn lhd_stats<T>(item: &Item<T>, now_tick: u64) -> (u64, u64) {
	let age = now_tick.saturating_sub(item.created_tick()).max(1);
	let weight = item.weight().max(1);
	(item.hits(), age.saturating_mul(weight))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn string_cache() -> Cache<String> {
		Cache::new(Config::new())
	}

	#[test]
	fn test_fnv1a_reference_digests() {
		assert_eq!(fnv1a(""), 0x811c_9dc5);
		assert_eq!(fnv1a("a"), 0xe40c_292c);
		assert_eq!(fnv1a("foobar"), 0xbf9c_f968);
	}

	#[test]
	fn test_routing_is_stable() {
		let cache = string_cache();
		let first = cache.shard_for("some-key") as *const _;
		let second = cache.shard_for("some-key") as *const _;
		assert_eq!(first, second);
	}

	#[test]
	fn test_ticks_strictly_increase() {
		let cache = string_cache();
		let mut last = 0;
		for _ in 0..1000 {
			let tick = cache.next_tick();
			assert!(tick > last);
			last = tick;
		}
	}

	#[test]
	fn test_set_get_roundtrip() {
		let cache = string_cache();
		cache.set("k", "v".to_string(), Duration::from_secs(1));

		let item = cache.get("k").expect("k should be present");
		assert_eq!(item.value(), "v");
		assert_eq!(item.key(), "k");
	}

	#[test]
	fn test_get_touches_metadata_and_peek_does_not() {
		let cache = string_cache();
		cache.set("k", "v".to_string(), Duration::from_secs(60));

		let before = cache.peek("k").expect("k should be present");
		let hits_before = before.hits();
		let tick_before = before.last_access_tick();

		cache.peek("k");
		let after_peek = cache.peek("k").expect("k should be present");
		assert_eq!(after_peek.hits(), hits_before);
		assert_eq!(after_peek.last_access_tick(), tick_before);

		cache.get("k");
		let after_get = cache.peek("k").expect("k should be present");
		assert_eq!(after_get.hits(), hits_before + 1);
		assert!(after_get.last_access_tick() > tick_before);
	}

	#[test]
	fn test_empty_key_is_usable() {
		let cache = string_cache();
		cache.set("", "empty".to_string(), Duration::from_secs(1));
		assert_eq!(cache.get("").expect("empty key should work").value(), "empty");
	}

	#[test]
	fn test_huge_weight_does_not_panic() {
		let cache: Cache<u64> = Cache::new(Config::new().weigher(|_, _| u64::MAX));
		cache.set("a", 1, Duration::from_secs(1));
		cache.set("b", 2, Duration::from_secs(1));
		cache.delete("a");
		cache.delete("b");
	}

	#[test]
	fn test_size_tracks_displacement() {
		let cache: Cache<u64> =
			Cache::new(Config::new().max_weight(1_000_000).weigher(|_, value| *value));

		cache.set("k", 100, Duration::from_secs(60));
		assert_eq!(cache.metrics().weight, 100);

		cache.set("k", 40, Duration::from_secs(60));
		assert_eq!(cache.metrics().weight, 40);

		cache.delete("k");
		assert_eq!(cache.metrics().weight, 0);
	}

	#[test]
	fn test_metrics_counters() {
		let cache = string_cache();
		cache.set("a", "1".to_string(), Duration::from_secs(60));
		cache.set("a", "2".to_string(), Duration::from_secs(60));
		cache.set("b", "3".to_string(), Duration::from_secs(60));
		cache.get("a");
		cache.get("missing");
		cache.delete("b");

		let metrics = cache.metrics();
		assert_eq!(metrics.inserts, 2);
		assert_eq!(metrics.updates, 1);
		assert_eq!(metrics.hits, 1);
		assert_eq!(metrics.misses, 1);
		assert_eq!(metrics.removals, 1);
		assert_eq!(metrics.item_count, 1);

		cache.clear();
		let metrics = cache.metrics();
		assert_eq!(metrics.total_accesses(), 0);
		assert_eq!(metrics.total_writes(), 0);
		assert_eq!(metrics.item_count, 0);
	}

	#[test]
	fn test_lhd_ranking_prefers_low_density() {
		let dense = Item::new(Arc::from("dense"), 0u64, i64::MAX, 10, 1);
		let sparse = Item::new(Arc::from("sparse"), 0u64, i64::MAX, 10, 1);
		for tick in 2..12 {
			dense.touch(tick);
		}

		assert!(lhd_prefers(&sparse, &dense, 100));
		assert!(!lhd_prefers(&dense, &sparse, 100));
	}

	#[test]
	fn test_lhd_tie_breaks_on_weight_then_recency() {
		// Equal densities of zero: the heavier item is the better victim.
		let light = Item::new(Arc::from("light"), 0u64, i64::MAX, 1, 1);
		let heavy = Item::new(Arc::from("heavy"), 0u64, i64::MAX, 50, 1);
		assert!(lhd_prefers(&heavy, &light, 100));
		assert!(!lhd_prefers(&light, &heavy, 100));

		// Equal weight falls back to the older access tick.
		let old = Item::new(Arc::from("old"), 0u64, i64::MAX, 10, 1);
		let recent = Item::new(Arc::from("recent"), 0u64, i64::MAX, 10, 5);
		assert!(lhd_prefers(&old, &recent, 100));
	}

	#[test]
	fn test_cache_is_send_sync() {
		fn assert_send<T: Send>() {}
		fn assert_sync<T: Sync>() {}

		assert_send::<Cache<String>>();
		assert_sync::<Cache<String>>();
	}
}
