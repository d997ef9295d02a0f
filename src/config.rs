use std::sync::Arc;

/// Application-defined weight for a key/value pair.
///
/// When set on [`Config`], the cache uses it to compute the cost of storing
/// an item. This matters for heap-backed values (strings, vectors, maps)
/// where the default shallow estimate undercounts real memory.
///
/// The cache calls the weigher on every `set`, outside any shard lock; keep
/// it fast and allocation-free.
pub type Weigher<T> = Arc<dyn Fn(&str, &T) -> u64 + Send + Sync>;

/// Strategy used to rank eviction candidates when the cache is over weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
	/// Sampled least-recently-used: evict the candidate with the oldest
	/// access tick.
	#[default]
	SampledLru,
	/// Sampled least-hit-density: evict the candidate with the lowest
	/// `hits / (age * weight)`, tolerating scan-like access patterns
	/// better than LRU.
	SampledLhd,
}

/// How `get` and `peek` treat entries whose TTL has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpirationPolicy {
	/// Report expired items as absent. The default.
	#[default]
	TreatExpiredAsMiss,
	/// Return expired items; callers check [`Item::expired`](crate::Item::expired)
	/// themselves.
	ReturnExpired,
}

/// Cache configuration.
///
/// A plain struct: set the fields you care about (directly or through the
/// chainable setters) and pass it to [`Cache::new`](crate::Cache::new).
/// Invalid fields are silently replaced with their defaults at construction;
/// configuration never fails and never panics.
///
/// # Example
///
/// ```
/// use sampled_cache::{Cache, Config, EvictionPolicy};
///
/// let cache: Cache<String> = Cache::new(
/// 	Config::new()
/// 		.shards(8)
/// 		.max_weight(1 << 20)
/// 		.eviction_policy(EvictionPolicy::SampledLhd),
/// );
/// assert!(cache.is_empty());
/// ```
pub struct Config<T> {
	/// Number of independent shard partitions.
	///
	/// Must be a power of two; anything else is replaced with 16.
	pub shards: usize,

	/// Upper bound on the summed weight of stored items.
	///
	/// When the total exceeds this, `set` evicts. Must be positive; zero is
	/// replaced with 5000.
	pub max_weight: u64,

	/// Cap on eviction iterations per `set` call.
	///
	/// Must be positive; zero is replaced with 500.
	pub items_to_prune: usize,

	/// Candidates drawn per eviction iteration.
	///
	/// Larger values improve eviction quality at O(sample_size) extra cost
	/// per iteration. Must be positive; zero is replaced with 32.
	pub sample_size: usize,

	/// Ranking used to pick eviction victims.
	pub eviction_policy: EvictionPolicy,

	/// Treatment of expired entries on the read path.
	pub expiration_policy: ExpirationPolicy,

	/// Optional custom weight function.
	///
	/// `None` means `key.len() + size_of::<T>()`.
	pub weigher: Option<Weigher<T>>,
}

impl<T> Config<T> {
	/// A configuration with every field at its default.
	pub fn new() -> Self {
		Self {
			shards: 16,
			max_weight: 5000,
			items_to_prune: 500,
			sample_size: 32,
			eviction_policy: EvictionPolicy::default(),
			expiration_policy: ExpirationPolicy::default(),
			weigher: None,
		}
	}

	/// Set the shard count. Rounded to 16 at construction unless a power of two.
	pub fn shards(mut self, shards: usize) -> Self {
		self.shards = shards;
		self
	}

	/// Set the weight capacity.
	pub fn max_weight(mut self, max_weight: u64) -> Self {
		self.max_weight = max_weight;
		self
	}

	/// Set the per-`set` eviction iteration cap.
	pub fn items_to_prune(mut self, items_to_prune: usize) -> Self {
		self.items_to_prune = items_to_prune;
		self
	}

	/// Set the number of candidates drawn per eviction iteration.
	pub fn sample_size(mut self, sample_size: usize) -> Self {
		self.sample_size = sample_size;
		self
	}

	/// Set the eviction ranking policy.
	pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
		self.eviction_policy = policy;
		self
	}

	/// Set the expired-entry treatment for `get`/`peek`.
	pub fn expiration_policy(mut self, policy: ExpirationPolicy) -> Self {
		self.expiration_policy = policy;
		self
	}

	/// Set a custom weight function.
	pub fn weigher(mut self, weigher: impl Fn(&str, &T) -> u64 + Send + Sync + 'static) -> Self {
		self.weigher = Some(Arc::new(weigher));
		self
	}

	/// Replace invalid fields with their defaults.
	///
	/// Shard counts above `u32::MAX` cannot be masked into a 32-bit digest
	/// and fall back to the default as well.
	pub(crate) fn normalized(mut self) -> Self {
		if self.shards == 0 || self.shards > u32::MAX as usize || !self.shards.is_power_of_two() {
			self.shards = 16;
		}
		if self.max_weight == 0 {
			self.max_weight = 5000;
		}
		if self.items_to_prune == 0 {
			self.items_to_prune = 500;
		}
		if self.sample_size == 0 {
			self.sample_size = 32;
		}
		self
	}
}

impl<T> Default for Config<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> Clone for Config<T> {
	fn clone(&self) -> Self {
		Self {
			shards: self.shards,
			max_weight: self.max_weight,
			items_to_prune: self.items_to_prune,
			sample_size: self.sample_size,
			eviction_policy: self.eviction_policy,
			expiration_policy: self.expiration_policy,
			weigher: self.weigher.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let cfg: Config<String> = Config::new();
		assert_eq!(cfg.shards, 16);
		assert_eq!(cfg.max_weight, 5000);
		assert_eq!(cfg.items_to_prune, 500);
		assert_eq!(cfg.sample_size, 32);
		assert_eq!(cfg.eviction_policy, EvictionPolicy::SampledLru);
		assert_eq!(cfg.expiration_policy, ExpirationPolicy::TreatExpiredAsMiss);
		assert!(cfg.weigher.is_none());
	}

	#[test]
	fn test_normalize_replaces_invalid_fields() {
		let cfg: Config<String> = Config::new()
			.shards(12)
			.max_weight(0)
			.items_to_prune(0)
			.sample_size(0);
		let cfg = cfg.normalized();
		assert_eq!(cfg.shards, 16);
		assert_eq!(cfg.max_weight, 5000);
		assert_eq!(cfg.items_to_prune, 500);
		assert_eq!(cfg.sample_size, 32);
	}

	#[test]
	fn test_normalize_keeps_valid_fields() {
		let cfg: Config<u64> = Config::new()
			.shards(4)
			.max_weight(100)
			.items_to_prune(2)
			.sample_size(8)
			.normalized();
		assert_eq!(cfg.shards, 4);
		assert_eq!(cfg.max_weight, 100);
		assert_eq!(cfg.items_to_prune, 2);
		assert_eq!(cfg.sample_size, 8);
	}

	#[test]
	fn test_normalize_rejects_oversized_shard_count() {
		let cfg: Config<u64> = Config::new().shards(1 << 33).normalized();
		assert_eq!(cfg.shards, 16);
	}

	#[test]
	fn test_weigher_setter() {
		let cfg: Config<String> = Config::new().weigher(|key, value: &String| (key.len() + value.len()) as u64);
		let weigher = cfg.weigher.expect("weigher should be set");
		assert_eq!(weigher("ab", &"cde".to_string()), 5);
	}
}
