//! Cache performance counters.

/// A point-in-time snapshot of cache activity.
///
/// Counters accumulate from construction (or the last [`clear`]) and are
/// read with relaxed atomics, so a snapshot taken under concurrent traffic
/// is approximate but never torn per field.
///
/// [`clear`]: crate::Cache::clear
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sampled_cache::{Cache, Config};
///
/// let cache = Cache::new(Config::new());
/// cache.set("k", "v".to_string(), Duration::from_secs(60));
/// cache.get("k");
/// cache.get("missing");
///
/// let metrics = cache.metrics();
/// assert_eq!(metrics.hits, 1);
/// assert_eq!(metrics.misses, 1);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
	/// Lookups that returned an item.
	pub hits: u64,
	/// Lookups that returned nothing, including expired entries reported
	/// as misses.
	pub misses: u64,
	/// `set` calls that created a new key.
	pub inserts: u64,
	/// `set` calls that replaced an existing key.
	pub updates: u64,
	/// Items removed by the eviction loop.
	pub evictions: u64,
	/// Items removed by explicit `delete`.
	pub removals: u64,
	/// Summed weight of live items at snapshot time.
	pub weight: i64,
	/// Configured weight capacity.
	pub max_weight: u64,
	/// Number of live items at snapshot time.
	pub item_count: usize,
}

impl CacheMetrics {
	/// Hit rate as a ratio in `[0.0, 1.0]`. Zero when there were no lookups.
	pub fn hit_rate(&self) -> f64 {
		let total = self.hits + self.misses;
		if total == 0 {
			0.0
		} else {
			self.hits as f64 / total as f64
		}
	}

	/// Fraction of the weight capacity currently in use.
	pub fn utilization(&self) -> f64 {
		if self.max_weight == 0 {
			0.0
		} else {
			self.weight.max(0) as f64 / self.max_weight as f64
		}
	}

	/// Total lookups observed, hit or miss.
	pub fn total_accesses(&self) -> u64 {
		self.hits + self.misses
	}

	/// Total `set` calls observed.
	pub fn total_writes(&self) -> u64 {
		self.inserts + self.updates
	}
}
