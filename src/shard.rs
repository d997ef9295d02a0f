use std::sync::Arc;

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::item::Item;

/// One lockable partition of the key space.
///
/// Three structures move in lockstep under a single readers-writer lock:
/// `store` is the primary map, `items` is a dense vector of the same
/// references enabling O(1) random-index sampling, and `pos` maps each key
/// to its slot in `items`. Deletion swap-removes from `items` so the vector
/// stays dense; the order of `items` is not meaningful.
pub(crate) struct Shard<T> {
	inner: RwLock<ShardInner<T>>,
}

struct ShardInner<T> {
	store: HashMap<Arc<str>, Arc<Item<T>>, RandomState>,
	items: Vec<Arc<Item<T>>>,
	pos: HashMap<Arc<str>, usize, RandomState>,
}

impl<T> Shard<T> {
	pub(crate) fn new() -> Self {
		Self {
			inner: RwLock::new(ShardInner {
				store: HashMap::with_hasher(RandomState::new()),
				items: Vec::new(),
				pos: HashMap::with_hasher(RandomState::new()),
			}),
		}
	}

	pub(crate) fn item_count(&self) -> usize {
		self.inner.read().store.len()
	}

	/// Look up a key. Does not update access metadata.
	pub(crate) fn get(&self, key: &str) -> Option<Arc<Item<T>>> {
		self.inner.read().store.get(key).cloned()
	}

	/// Insert or replace the entry for the item's key.
	///
	/// Returns the displaced item when the key was already present. A
	/// replacement overwrites the old slot in `items` in place, so the
	/// key set of all three structures stays identical.
	pub(crate) fn set(&self, item: Arc<Item<T>>) -> Option<Arc<Item<T>>> {
		let key = item.key_shared();
		let mut inner = self.inner.write();

		if let Some(&idx) = inner.pos.get(item.key()) {
			inner.items[idx] = Arc::clone(&item);
			inner.store.insert(key, item)
		} else {
			let idx = inner.items.len();
			inner.items.push(Arc::clone(&item));
			inner.pos.insert(Arc::clone(&key), idx);
			inner.store.insert(key, item);
			None
		}
	}

	/// Remove a key, returning the displaced item.
	pub(crate) fn delete(&self, key: &str) -> Option<Arc<Item<T>>> {
		self.inner.write().remove(key)
	}

	/// Remove a key only if its stored reference is identity-equal to
	/// `expected`.
	///
	/// Eviction uses this so that a candidate sampled under the read lock
	/// never clobbers an entry a concurrent `set` has already replaced.
	pub(crate) fn delete_if_same(&self, key: &str, expected: &Arc<Item<T>>) -> bool {
		let mut inner = self.inner.write();
		let same = inner.store.get(key).is_some_and(|current| Arc::ptr_eq(current, expected));
		if same {
			inner.remove(key);
		}
		same
	}

	/// The item at index `n mod len(items)`, or `None` when empty.
	///
	/// The caller supplies `n` from its own randomness source; the shard
	/// guarantees nothing beyond modulo over the current length.
	pub(crate) fn sample_nth(&self, n: u64) -> Option<Arc<Item<T>>> {
		let inner = self.inner.read();
		if inner.items.is_empty() {
			return None;
		}
		let idx = (n % inner.items.len() as u64) as usize;
		inner.items.get(idx).cloned()
	}

	pub(crate) fn clear(&self) {
		let mut inner = self.inner.write();
		inner.store.clear();
		inner.items.clear();
		inner.pos.clear();
	}

	/// Call `f` for every entry, in unspecified order, stopping at the first
	/// `false` return and propagating it.
	///
	/// The callback runs under the shard read lock; keep it quick and do not
	/// call back into this shard from it.
	pub(crate) fn for_each<F>(&self, f: &mut F) -> bool
	where
		F: FnMut(&str, &T) -> bool,
	{
		let inner = self.inner.read();
		for item in inner.store.values() {
			if !f(item.key(), item.value()) {
				return false;
			}
		}
		true
	}

	/// Visit every item reference under the read lock.
	///
	/// Used by the deterministic eviction scans.
	pub(crate) fn scan<F>(&self, f: &mut F)
	where
		F: FnMut(&Arc<Item<T>>),
	{
		let inner = self.inner.read();
		for item in &inner.items {
			f(item);
		}
	}
}

impl<T> ShardInner<T> {
	/// Swap-remove `key` from all three structures.
	///
	/// The moved element's `pos` entry is rewritten before the vector is
	/// shortened, keeping `items[pos[k]]` valid for every remaining key.
	fn remove(&mut self, key: &str) -> Option<Arc<Item<T>>> {
		let item = self.store.remove(key)?;
		if let Some(idx) = self.pos.remove(key) {
			let last = self.items.len() - 1;
			if idx != last {
				let moved = self.items[last].key_shared();
				self.pos.insert(moved, idx);
			}
			self.items.swap_remove(idx);
		}
		Some(item)
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::item::deadline_after;

	fn make_item(key: &str, weight: u64) -> Arc<Item<u64>> {
		Arc::new(Item::new(
			Arc::from(key),
			0,
			deadline_after(Duration::from_secs(60)),
			weight,
			1,
		))
	}

	fn assert_coherent(shard: &Shard<u64>) {
		let inner = shard.inner.read();
		assert_eq!(inner.store.len(), inner.items.len());
		assert_eq!(inner.store.len(), inner.pos.len());
		for (key, item) in &inner.store {
			let idx = inner.pos[key];
			assert!(Arc::ptr_eq(&inner.items[idx], item), "items[pos[{key}]] out of sync");
		}
	}

	#[test]
	fn test_set_and_get() {
		let shard = Shard::new();
		assert!(shard.set(make_item("a", 1)).is_none());
		assert_eq!(shard.get("a").expect("a should exist").key(), "a");
		assert!(shard.get("missing").is_none());
		assert_eq!(shard.item_count(), 1);
		assert_coherent(&shard);
	}

	#[test]
	fn test_set_replaces_in_place() {
		let shard = Shard::new();
		let first = make_item("a", 1);
		let second = make_item("a", 2);

		shard.set(Arc::clone(&first));
		let displaced = shard.set(Arc::clone(&second)).expect("first should be displaced");

		assert!(Arc::ptr_eq(&displaced, &first));
		assert!(Arc::ptr_eq(&shard.get("a").expect("a should exist"), &second));
		assert_eq!(shard.item_count(), 1);
		assert_coherent(&shard);
	}

	#[test]
	fn test_delete_missing_returns_none() {
		let shard: Shard<u64> = Shard::new();
		assert!(shard.delete("nope").is_none());
	}

	#[test]
	fn test_delete_swaps_last_into_hole() {
		let shard = Shard::new();
		for key in ["a", "b", "c", "d"] {
			shard.set(make_item(key, 1));
		}

		// Deleting a middle key forces the swap path.
		let removed = shard.delete("b").expect("b should exist");
		assert_eq!(removed.key(), "b");
		assert_eq!(shard.item_count(), 3);
		assert_coherent(&shard);

		for key in ["a", "c", "d"] {
			assert!(shard.get(key).is_some(), "{key} should survive the swap");
		}

		// Deleting the last slot exercises the no-swap path.
		let last_key = shard.sample_nth(u64::MAX).expect("shard not empty").key().to_string();
		shard.delete(&last_key);
		assert_coherent(&shard);
	}

	#[test]
	fn test_delete_if_same_compares_identity() {
		let shard = Shard::new();
		let original = make_item("a", 1);
		shard.set(Arc::clone(&original));

		// A replacement with the same key is a different identity.
		let replacement = make_item("a", 1);
		shard.set(Arc::clone(&replacement));

		assert!(!shard.delete_if_same("a", &original));
		assert_eq!(shard.item_count(), 1);

		assert!(shard.delete_if_same("a", &replacement));
		assert_eq!(shard.item_count(), 0);
		assert_coherent(&shard);
	}

	#[test]
	fn test_delete_if_same_missing_key() {
		let shard = Shard::new();
		let stray = make_item("a", 1);
		assert!(!shard.delete_if_same("a", &stray));
	}

	#[test]
	fn test_sample_nth_wraps_modulo() {
		let shard = Shard::new();
		assert!(shard.sample_nth(3).is_none());

		shard.set(make_item("a", 1));
		shard.set(make_item("b", 1));

		let direct = shard.sample_nth(1).expect("index 1");
		let wrapped = shard.sample_nth(3).expect("index 3 mod 2");
		assert!(Arc::ptr_eq(&direct, &wrapped));
	}

	#[test]
	fn test_clear_resets_everything() {
		let shard = Shard::new();
		for key in ["a", "b", "c"] {
			shard.set(make_item(key, 1));
		}
		shard.clear();
		assert_eq!(shard.item_count(), 0);
		assert!(shard.sample_nth(0).is_none());
		assert_coherent(&shard);
	}

	#[test]
	fn test_for_each_stops_on_false() {
		let shard = Shard::new();
		for key in ["a", "b", "c"] {
			shard.set(make_item(key, 1));
		}

		let mut seen = 0;
		let finished = shard.for_each(&mut |_, _| {
			seen += 1;
			false
		});
		assert!(!finished);
		assert_eq!(seen, 1);

		let mut all = 0;
		let finished = shard.for_each(&mut |_, _| {
			all += 1;
			true
		});
		assert!(finished);
		assert_eq!(all, 3);
	}

	#[test]
	fn test_scan_visits_every_item() {
		let shard = Shard::new();
		for key in ["a", "b", "c"] {
			shard.set(make_item(key, 1));
		}

		let mut keys = Vec::new();
		shard.scan(&mut |item| keys.push(item.key().to_string()));
		keys.sort();
		assert_eq!(keys, ["a", "b", "c"]);
	}
}
