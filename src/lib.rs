//! # Sampled Cache
//!
//! A sharded, concurrent, in-process key-value cache with:
//! - **Per-item TTL**, observed lazily on read (no background sweeper)
//! - **Weight-bounded capacity** in user-defined units, not item count
//! - **Sampled eviction** with two ranking policies: recency (LRU) and
//!   hit density (LHD)
//! - **Read-optimized concurrency** via fine-grained sharding; reads update
//!   access metadata with atomics, never the shard write lock
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use sampled_cache::{Cache, Config};
//!
//! // Weigh entries by payload size and cap the total at 1 MiB.
//! let cache: Cache<Vec<u8>> = Cache::new(
//! 	Config::new()
//! 		.max_weight(1024 * 1024)
//! 		.weigher(|key, value: &Vec<u8>| (key.len() + value.len()) as u64),
//! );
//!
//! cache.set("session:42", vec![1, 2, 3], Duration::from_secs(300));
//!
//! if let Some(item) = cache.get("session:42") {
//! 	assert_eq!(item.value(), &[1, 2, 3]);
//! }
//!
//! // peek inspects without influencing eviction.
//! assert!(cache.peek("session:42").is_some());
//! ```
//!
//! ## Eviction
//!
//! When the summed weight exceeds the configured `max_weight`, `set` evicts
//! synchronously before returning. Candidates are drawn by random-index
//! sampling across shards in O(sample_size), independent of cache size;
//! small caches fall back to an exact scan. [`EvictionPolicy::SampledLru`]
//! evicts the least recently used sample, [`EvictionPolicy::SampledLhd`]
//! the sample with the lowest `hits / (age × weight)`, which holds up
//! better under scan-like access patterns.
//!
//! ## Thread Safety
//!
//! The cache is `Send + Sync`; share it across threads with `Arc`:
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//! use std::time::Duration;
//! use sampled_cache::{Cache, Config};
//!
//! let cache = Arc::new(Cache::new(Config::new()));
//!
//! let handles: Vec<_> = (0..4)
//! 	.map(|t| {
//! 		let cache = Arc::clone(&cache);
//! 		thread::spawn(move || {
//! 			cache.set(&format!("key-{t}"), t, Duration::from_secs(60));
//! 		})
//! 	})
//! 	.collect();
//!
//! for handle in handles {
//! 	handle.join().unwrap();
//! }
//! assert_eq!(cache.len(), 4);
//! ```
//!
//! Item handles returned by `get`/`peek` are `Arc`s: they stay valid after
//! the key is evicted or deleted, and are safe to hold across `.await`
//! points in async code.

mod cache;
mod config;
mod item;
mod metrics;
mod shard;

pub use cache::Cache;
pub use config::{Config, EvictionPolicy, ExpirationPolicy, Weigher};
pub use item::Item;
pub use metrics::CacheMetrics;
