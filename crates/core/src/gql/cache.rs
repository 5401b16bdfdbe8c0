use std::time::{Duration, Instant};

use dashmap::DashMap;
use quick_cache::sync::Cache;

use crate::cnf::{PAGE_CACHE_ENABLED, PAGE_CACHE_SIZE, page_cache_ttl};
use crate::expr::Where;
use crate::val::{Row, Value};

type Slot = (String, String, String);

/// Rows loaded while resolving relations, scoped to one request.
///
/// Single rows are keyed by `(table, column, value)`, where `column` is the
/// column the row was looked up by. Groups hold every row of `table` whose
/// `column` equals `value`, as loaded for a reverse relation. Entries are
/// only ever inserted, so concurrent resolvers can share one cache.
#[derive(Debug, Default)]
pub struct RelationCache {
	rows: DashMap<Slot, Option<Row>>,
	groups: DashMap<Slot, Vec<Row>>,
}

impl RelationCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Looks up a row. The outer `None` means it was never loaded, the inner
	/// `None` that it was loaded and does not exist.
	pub fn row(&self, table: &str, column: &str, key: &str) -> Option<Option<Row>> {
		self.rows.get(&slot(table, column, key)).map(|r| r.value().clone())
	}

	pub fn put_row(&self, table: &str, column: &str, key: &str, row: Option<Row>) {
		self.rows.insert(slot(table, column, key), row);
	}

	pub fn group(&self, table: &str, column: &str, key: &str) -> Option<Vec<Row>> {
		self.groups.get(&slot(table, column, key)).map(|r| r.value().clone())
	}

	pub fn put_group(&self, table: &str, column: &str, key: &str, rows: Vec<Row>) {
		self.groups.insert(slot(table, column, key), rows);
	}

	pub fn len(&self) -> usize {
		self.rows.len() + self.groups.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

fn slot(table: &str, column: &str, key: &str) -> Slot {
	(table.to_owned(), column.to_owned(), key.to_owned())
}

/// Identifies a cached page or first-row result
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PageKey {
	table: String,
	operation: &'static str,
	generation: u64,
	filter: String,
	pagination: String,
	raw: Option<Where>,
}

/// A size and age bounded cache of query results.
///
/// Each table carries a generation number which is part of every key.
/// Writing to a table bumps its generation, so older results are never
/// found again and age out of the cache.
pub struct PageCache {
	cache: Cache<PageKey, (Instant, Value)>,
	generations: DashMap<String, u64>,
	ttl: Duration,
	enabled: bool,
}

impl std::fmt::Debug for PageCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PageCache")
			.field("len", &self.cache.len())
			.field("ttl", &self.ttl)
			.field("enabled", &self.enabled)
			.finish()
	}
}

impl Default for PageCache {
	fn default() -> Self {
		Self::new(*PAGE_CACHE_SIZE, page_cache_ttl(), *PAGE_CACHE_ENABLED)
	}
}

impl PageCache {
	pub fn new(capacity: usize, ttl: Duration, enabled: bool) -> Self {
		Self {
			cache: Cache::new(capacity.max(1)),
			generations: DashMap::new(),
			ttl,
			enabled,
		}
	}

	pub fn enabled(&self) -> bool {
		self.enabled
	}

	pub fn key(
		&self,
		table: &str,
		operation: &'static str,
		filter: &str,
		pagination: &str,
		raw: Option<&Where>,
	) -> PageKey {
		PageKey {
			table: table.to_owned(),
			operation,
			generation: self.generations.get(table).map(|g| *g).unwrap_or_default(),
			filter: filter.to_owned(),
			pagination: pagination.to_owned(),
			raw: raw.cloned(),
		}
	}

	pub fn get(&self, key: &PageKey) -> Option<Value> {
		let (at, value) = self.cache.get(key)?;
		if at.elapsed() > self.ttl {
			self.cache.remove(key);
			return None;
		}
		trace!("Page cache hit for `{}` {}", key.table, key.operation);
		Some(value)
	}

	pub fn insert(&self, key: PageKey, value: Value) {
		self.cache.insert(key, (Instant::now(), value));
	}

	/// Makes every cached result of a table unreachable
	pub fn invalidate(&self, table: &str) {
		*self.generations.entry(table.to_owned()).or_default() += 1;
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn relation_cache_distinguishes_missing_from_unloaded() {
		let cache = RelationCache::new();
		assert_eq!(cache.row("foo", "id", "1"), None);
		cache.put_row("foo", "id", "1", None);
		assert_eq!(cache.row("foo", "id", "1"), Some(None));
		let row = json!({"id": 2}).as_object().cloned();
		cache.put_row("foo", "id", "2", row.clone());
		assert_eq!(cache.row("foo", "id", "2"), Some(row));
		assert!(cache.group("bar", "foo", "1").is_none());
		cache.put_group("bar", "foo", "1", vec![]);
		assert_eq!(cache.group("bar", "foo", "1"), Some(vec![]));
		assert_eq!(cache.len(), 3);
	}

	#[test]
	fn page_cache_round_trip_and_invalidation() {
		let cache = PageCache::new(10, Duration::from_secs(60), true);
		let key = cache.key("foo", "page", "a=1", "", None);
		cache.insert(key.clone(), json!({"total": 1}));
		assert_eq!(cache.get(&key), Some(json!({"total": 1})));
		cache.invalidate("foo");
		let fresh = cache.key("foo", "page", "a=1", "", None);
		assert_ne!(key, fresh);
		assert_eq!(cache.get(&fresh), None);
		// Other tables keep their entries
		let other = cache.key("bar", "page", "", "", None);
		cache.insert(other.clone(), json!(1));
		cache.invalidate("foo");
		assert_eq!(cache.get(&other), Some(json!(1)));
	}

	#[test]
	fn page_cache_expires_entries() {
		let cache = PageCache::new(10, Duration::ZERO, true);
		let key = cache.key("foo", "first", "", "", None);
		cache.insert(key.clone(), json!(null));
		std::thread::sleep(Duration::from_millis(2));
		assert_eq!(cache.get(&key), None);
	}
}
