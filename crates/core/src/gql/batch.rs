//! Batching of relation fields resolved after the eager load.
//!
//! Rows past the maximum depth, rows returned by overrides, and relation
//! fields called with their own arguments all resolve their relations one
//! parent at a time. Each of those calls hands a [`RelationKey`] to a
//! [`DataLoader`](async_graphql::dataloader::DataLoader), which collects
//! the keys of every sibling call and reads them back with one `IN` query
//! per relation and argument set.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_graphql::dataloader::Loader as BatchLoader;

use super::cache::RelationCache;
use super::ext::ArgsExt;
use super::loader::{Loader, page};
use super::resolver::read_query;
use crate::catalog::{Relation, SchemaGraph};
use crate::err::Error;
use crate::expr::Pagination;
use crate::kvs::Adapter;
use crate::val::{Row, Value, key_of};

/// The arguments which narrow a relation field
const NARROWING: [&str; 3] = ["filter", "pagination", "where"];

/// One relation lookup for one parent row
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RelationKey {
	pub table: String,
	pub field: String,
	/// The narrowing arguments and the `_debug` flag, as JSON text
	pub args: String,
	/// The parent's key value, as JSON text
	pub key: String,
}

impl RelationKey {
	pub fn new(table: &str, field: &str, args: &Row, key: &Value) -> Result<Self, Error> {
		let mut narrowed = narrowing(args);
		if args.get_bool("_debug").unwrap_or_default() {
			narrowed.insert("_debug".to_owned(), Value::Bool(true));
		}
		Ok(Self {
			table: table.to_owned(),
			field: field.to_owned(),
			args: serde_json::to_string(&narrowed)?,
			key: serde_json::to_string(key)?,
		})
	}
}

/// Keeps only the non-null `filter`, `pagination` and `where` arguments
pub fn narrowing(args: &Row) -> Row {
	let mut out = Row::new();
	for k in NARROWING {
		if let Some(v) = args.get(k).filter(|v| !v.is_null()) {
			out.insert(k.to_owned(), v.clone());
		}
	}
	out
}

/// Loads the relation fields of many parents at once
pub struct RelationBatch {
	graph: Arc<SchemaGraph>,
	adapter: Arc<dyn Adapter>,
	max_depth: usize,
}

impl RelationBatch {
	pub fn new(graph: Arc<SchemaGraph>, adapter: Arc<dyn Adapter>, max_depth: usize) -> Self {
		Self {
			graph,
			adapter,
			max_depth,
		}
	}

	async fn load_keys(&self, keys: &[RelationKey]) -> Result<HashMap<RelationKey, Value>, Error> {
		let mut groups: BTreeMap<(&str, &str, &str), Vec<&RelationKey>> = BTreeMap::new();
		for key in keys {
			groups.entry((&key.table, &key.field, &key.args)).or_default().push(key);
		}
		let mut out = HashMap::with_capacity(keys.len());
		for ((table, field, args), keys) in groups {
			let args: Row = serde_json::from_str(args)?;
			self.load_group(table, field, &args, &keys, &mut out).await?;
		}
		Ok(out)
	}

	async fn load_group(
		&self,
		table: &str,
		field: &str,
		args: &Row,
		keys: &[&RelationKey],
		out: &mut HashMap<RelationKey, Value>,
	) -> Result<(), Error> {
		let relation = self
			.graph
			.get(table)?
			.relation(field)
			.ok_or_else(|| Error::InvalidInput(format!("No relation {field} on `{table}`")))?;
		let (target, column, reverse) = match relation {
			Relation::Forward {
				target,
				target_column,
				..
			} => (target, target_column, false),
			Relation::Reverse {
				table: child,
				column,
				..
			} => (child, column, true),
		};
		let values = keys
			.iter()
			.map(|k| serde_json::from_str::<Value>(&k.key))
			.collect::<Result<Vec<_>, _>>()?;
		let query = read_query(&target, args)?;
		// Offset and limit apply per parent, so only the ordering reaches the read
		let window = query.pagination.clone();
		let query = query
			.paginate(Pagination {
				order: window.order.clone(),
				..Default::default()
			})
			.within(column.as_str(), values.clone());
		if args.get_bool("_debug").unwrap_or_default() {
			info!("{field} of `{table}` for {} rows: {query}", keys.len());
		}
		let rows = self.adapter.select(&query).await?;
		let mut by_key: HashMap<String, Vec<Row>> = HashMap::new();
		for row in rows {
			if let Some(k) = row.get(&column).and_then(key_of) {
				by_key.entry(k).or_default().push(row);
			}
		}
		// Slice every parent's window, then load the next level for all of them at once
		let offset = window.offset.unwrap_or(0) as usize;
		let limit = window.limit.map(|l| l as usize).unwrap_or(usize::MAX);
		let mut items = Vec::new();
		let mut spans = Vec::with_capacity(keys.len());
		for value in values.iter() {
			let group = key_of(value).and_then(|k| by_key.get(&k).cloned()).unwrap_or_default();
			let total = group.len() as u64;
			let start = items.len();
			let take = if reverse {
				limit
			} else {
				1
			};
			items.extend(group.into_iter().skip(offset).take(take));
			spans.push((total, start..items.len()));
		}
		let cache = RelationCache::new();
		Loader::new(&self.graph, self.adapter.as_ref(), &cache, self.max_depth)
			.load(&mut items, &target, 1)
			.await?;
		for (key, (total, span)) in keys.iter().zip(spans) {
			let value = if reverse {
				page(total, &target, items[span].to_vec())
			} else {
				items[span].first().cloned().map(Value::Object).unwrap_or_default()
			};
			out.insert((*key).clone(), value);
		}
		Ok(())
	}
}

impl BatchLoader<RelationKey> for RelationBatch {
	type Value = Value;
	type Error = Arc<Error>;

	async fn load(&self, keys: &[RelationKey]) -> Result<HashMap<RelationKey, Value>, Arc<Error>> {
		trace!("Batch loading {} relation keys", keys.len());
		self.load_keys(keys).await.map_err(Arc::new)
	}
}
