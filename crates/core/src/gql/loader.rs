//! Batched loading of relation fields.
//!
//! Loading runs in two phases. The fetch phase walks the relation graph
//! breadth first, one depth level at a time: for every relation of every
//! table in the current level it collects the distinct keys of the level's
//! rows, skips the keys the [`RelationCache`] already resolved, and issues a
//! single `IN` read for the rest. The rows it finds form the next level. The
//! assemble phase then attaches the cached rows onto each item, matching by
//! key, and never touches the database.
//!
//! Traversal stops at the maximum depth, which is what breaks cycles in
//! self-referencing or mutually referencing tables.

use std::collections::{BTreeMap, HashSet};

use super::cache::RelationCache;
use crate::catalog::{Relation, SchemaGraph, TableNode};
use crate::err::Error;
use crate::kvs::{Adapter, Query};
use crate::val::{Map, Row, Value, key_of};

/// Which relations of the top level items are attached
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Edges {
	/// Many-to-one relations only
	Forward,
	/// One-to-many relations only
	Reverse,
	Both,
}

impl Edges {
	fn allows(&self, relation: &Relation) -> bool {
		match (self, relation) {
			(Edges::Both, _) => true,
			(
				Edges::Forward,
				Relation::Forward {
					..
				},
			) => true,
			(
				Edges::Reverse,
				Relation::Reverse {
					..
				},
			) => true,
			_ => false,
		}
	}
}

/// Builds the `{total, tablename, items}` payload of a page
pub fn page(total: u64, table: &str, items: Vec<Row>) -> Value {
	let mut out = Map::new();
	out.insert("total".to_owned(), Value::from(total));
	out.insert("tablename".to_owned(), Value::from(table));
	out.insert("items".to_owned(), Value::Array(items.into_iter().map(Value::Object).collect()));
	Value::Object(out)
}

pub struct Loader<'a> {
	graph: &'a SchemaGraph,
	adapter: &'a dyn Adapter,
	cache: &'a RelationCache,
	max_depth: usize,
}

impl<'a> Loader<'a> {
	pub fn new(
		graph: &'a SchemaGraph,
		adapter: &'a dyn Adapter,
		cache: &'a RelationCache,
		max_depth: usize,
	) -> Self {
		Self {
			graph,
			adapter,
			cache,
			max_depth,
		}
	}

	/// Attaches every relation field to `items`, which sit at `depth`
	pub async fn load(&self, items: &mut [Row], table: &str, depth: usize) -> Result<(), Error> {
		self.load_edges(items, table, depth, Edges::Both).await
	}

	/// Attaches the related row of every foreign key column to `items`
	pub async fn load_foreign(
		&self,
		items: &mut [Row],
		table: &str,
		depth: usize,
	) -> Result<(), Error> {
		self.load_edges(items, table, depth, Edges::Forward).await
	}

	/// Attaches a `{total, tablename, items}` aggregate per reverse relation to `items`
	pub async fn load_reverse(
		&self,
		items: &mut [Row],
		table: &str,
		depth: usize,
	) -> Result<(), Error> {
		self.load_edges(items, table, depth, Edges::Reverse).await
	}

	async fn load_edges(
		&self,
		items: &mut [Row],
		table: &str,
		depth: usize,
		edges: Edges,
	) -> Result<(), Error> {
		if depth >= self.max_depth || items.is_empty() {
			return Ok(());
		}
		let Some(node) = self.graph.table(table) else {
			return Ok(());
		};
		self.fetch(items, node, depth, edges).await?;
		for item in items.iter_mut() {
			self.assemble(item, node, depth, edges);
		}
		Ok(())
	}

	/// Fills the relation cache level by level
	async fn fetch(
		&self,
		items: &[Row],
		node: &TableNode,
		depth: usize,
		edges: Edges,
	) -> Result<(), Error> {
		let mut visited: HashSet<(String, String)> = HashSet::new();
		let mut level: BTreeMap<String, Vec<Row>> = BTreeMap::new();
		level.insert(node.name.clone(), items.to_vec());
		let mut current = depth;
		while current < self.max_depth && !level.is_empty() {
			trace!("Loading relations of {} tables at depth {current}", level.len());
			let mut next: BTreeMap<String, Vec<Row>> = BTreeMap::new();
			for (table, rows) in level.iter() {
				let Some(node) = self.graph.table(table) else {
					continue;
				};
				for relation in node.relations() {
					if current == depth && !edges.allows(&relation) {
						continue;
					}
					let found = match &relation {
						Relation::Forward {
							column,
							target,
							target_column,
							..
						} => self.fetch_forward(rows, column, target, target_column).await?,
						Relation::Reverse {
							table: child,
							column,
							local_column,
							..
						} => self.fetch_reverse(rows, child, column, local_column).await?,
					};
					let target = relation.target();
					for row in found {
						if visited.insert((target.to_owned(), self.row_key(target, &row))) {
							next.entry(target.to_owned()).or_default().push(row);
						}
					}
				}
			}
			level = next;
			current += 1;
		}
		Ok(())
	}

	/// Loads the rows of `target` referenced by `column`, returning every referenced row
	async fn fetch_forward(
		&self,
		rows: &[Row],
		column: &str,
		target: &str,
		target_column: &str,
	) -> Result<Vec<Row>, Error> {
		let keys = distinct(rows, column);
		let missing: Vec<Value> = keys
			.iter()
			.filter(|(k, _)| self.cache.row(target, target_column, k).is_none())
			.map(|(_, v)| v.clone())
			.collect();
		if !missing.is_empty() {
			debug!("Loading {} rows of `{target}` by `{target_column}`", missing.len());
			let query = Query::table(target).within(target_column, missing);
			let mut loaded: BTreeMap<String, Row> = BTreeMap::new();
			for row in self.adapter.select(&query).await? {
				if let Some(k) = row.get(target_column).and_then(key_of) {
					loaded.entry(k).or_insert(row);
				}
			}
			for (k, _) in keys.iter() {
				if self.cache.row(target, target_column, k).is_none() {
					self.cache.put_row(target, target_column, k, loaded.remove(k));
				}
			}
		}
		Ok(keys
			.iter()
			.filter_map(|(k, _)| self.cache.row(target, target_column, k).flatten())
			.collect())
	}

	/// Loads the rows of `child` whose `column` references `local_column` of `rows`
	async fn fetch_reverse(
		&self,
		rows: &[Row],
		child: &str,
		column: &str,
		local_column: &str,
	) -> Result<Vec<Row>, Error> {
		let keys = distinct(rows, local_column);
		let missing: Vec<Value> = keys
			.iter()
			.filter(|(k, _)| self.cache.group(child, column, k).is_none())
			.map(|(_, v)| v.clone())
			.collect();
		if !missing.is_empty() {
			debug!("Loading rows of `{child}` for {} keys by `{column}`", missing.len());
			let query = Query::table(child).within(column, missing);
			let mut groups: BTreeMap<String, Vec<Row>> = BTreeMap::new();
			for row in self.adapter.select(&query).await? {
				if let Some(k) = row.get(column).and_then(key_of) {
					groups.entry(k).or_default().push(row);
				}
			}
			for (k, _) in keys.iter() {
				if self.cache.group(child, column, k).is_none() {
					self.cache.put_group(child, column, k, groups.remove(k).unwrap_or_default());
				}
			}
		}
		Ok(keys
			.iter()
			.flat_map(|(k, _)| self.cache.group(child, column, k).unwrap_or_default())
			.collect())
	}

	/// Attaches cached relations onto a row, down to the maximum depth
	fn assemble(&self, row: &mut Row, node: &TableNode, depth: usize, edges: Edges) {
		if depth >= self.max_depth {
			return;
		}
		for relation in node.relations() {
			if !edges.allows(&relation) {
				continue;
			}
			let value = match &relation {
				Relation::Forward {
					column,
					target,
					target_column,
					..
				} => {
					let found = row
						.get(column)
						.and_then(key_of)
						.and_then(|k| self.cache.row(target, target_column, &k))
						.flatten();
					match (found, self.graph.table(target)) {
						(Some(mut related), Some(target)) => {
							self.assemble(&mut related, target, depth + 1, Edges::Both);
							Value::Object(related)
						}
						(Some(related), None) => Value::Object(related),
						(None, _) => Value::Null,
					}
				}
				Relation::Reverse {
					table: child,
					column,
					local_column,
					..
				} => {
					let mut items = row
						.get(local_column)
						.and_then(key_of)
						.and_then(|k| self.cache.group(child, column, &k))
						.unwrap_or_default();
					if let Some(child) = self.graph.table(child) {
						for item in items.iter_mut() {
							self.assemble(item, child, depth + 1, Edges::Both);
						}
					}
					page(items.len() as u64, child, items)
				}
			};
			row.insert(relation.field().to_owned(), value);
		}
	}

	/// Identifies a row of a table, by primary key where there is one
	fn row_key(&self, table: &str, row: &Row) -> String {
		self.graph
			.table(table)
			.and_then(|t| t.primary_key.as_ref())
			.and_then(|pk| row.get(pk))
			.and_then(key_of)
			.unwrap_or_else(|| Value::Object(row.clone()).to_string())
	}
}

/// The distinct non-null values of a column, keyed canonically, in first-seen order
fn distinct(rows: &[Row], column: &str) -> Vec<(String, Value)> {
	let mut seen = HashSet::new();
	rows.iter()
		.filter_map(|r| r.get(column))
		.filter_map(|v| key_of(v).map(|k| (k, v.clone())))
		.filter(|(k, _)| seen.insert(k.clone()))
		.collect()
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use test_log::test;

	use super::*;
	use crate::catalog::read_schema;
	use crate::kvs::mem::Datastore;
	use crate::kvs::{ColumnDef, TableDef};

	fn row(v: Value) -> Row {
		v.as_object().cloned().unwrap()
	}

	async fn blog() -> (Datastore, SchemaGraph) {
		let ds = Datastore::new();
		ds.create_table(
			&TableDef::new("author")
				.column(ColumnDef::new("id", "integer").primary())
				.column(ColumnDef::new("name", "text")),
		)
		.await
		.unwrap();
		ds.create_table(
			&TableDef::new("post")
				.column(ColumnDef::new("id", "integer").primary())
				.column(ColumnDef::new("title", "text"))
				.column(ColumnDef::new("author", "integer").references("author", "id")),
		)
		.await
		.unwrap();
		for name in ["Ada", "Grace"] {
			ds.insert("author", &row(json!({ "name": name })), "id").await.unwrap();
		}
		for (title, author) in [("One", 1), ("Two", 1), ("Three", 2), ("Four", 1)] {
			ds.insert("post", &row(json!({"title": title, "author": author})), "id").await.unwrap();
		}
		let graph = read_schema(&ds, "public", &[]).await.unwrap();
		ds.reset_reads();
		(ds, graph)
	}

	#[test(tokio::test)]
	async fn forward_loads_are_batched_and_matched_by_key() {
		let (ds, graph) = blog().await;
		let cache = RelationCache::new();
		let loader = Loader::new(&graph, &ds, &cache, 1);
		let mut items = ds.select(&Query::table("post")).await.unwrap();
		items.reverse();
		ds.reset_reads();
		loader.load_foreign(&mut items, "post", 0).await.unwrap();
		assert_eq!(ds.reads("author"), 1);
		for item in items.iter() {
			assert_eq!(item["author_author"]["id"], item["author"]);
		}
		assert_eq!(items[0]["author_author"]["name"], json!("Ada"));
		assert_eq!(items[1]["author_author"]["name"], json!("Grace"));
	}

	#[test(tokio::test)]
	async fn reverse_loads_group_children() {
		let (ds, graph) = blog().await;
		let cache = RelationCache::new();
		let loader = Loader::new(&graph, &ds, &cache, 1);
		let mut items = ds.select(&Query::table("author")).await.unwrap();
		ds.reset_reads();
		loader.load_reverse(&mut items, "author", 0).await.unwrap();
		assert_eq!(ds.reads("post"), 1);
		assert_eq!(items[0]["post"]["total"], json!(3));
		assert_eq!(items[0]["post"]["tablename"], json!("post"));
		assert_eq!(items[1]["post"]["total"], json!(1));
		assert_eq!(items[1]["post"]["items"][0]["title"], json!("Three"));
	}

	#[test(tokio::test)]
	async fn cached_keys_are_not_queried_again() {
		let (ds, graph) = blog().await;
		let cache = RelationCache::new();
		let loader = Loader::new(&graph, &ds, &cache, 1);
		let mut items = ds.select(&Query::table("post")).await.unwrap();
		ds.reset_reads();
		loader.load(&mut items, "post", 0).await.unwrap();
		loader.load(&mut items, "post", 0).await.unwrap();
		assert_eq!(ds.reads("author"), 1);
		assert!(!cache.is_empty());
	}

	#[test(tokio::test)]
	async fn nested_levels_issue_one_read_per_relation() {
		let (ds, graph) = blog().await;
		let cache = RelationCache::new();
		let loader = Loader::new(&graph, &ds, &cache, 3);
		let mut items = ds.select(&Query::table("post")).await.unwrap();
		ds.reset_reads();
		loader.load(&mut items, "post", 0).await.unwrap();
		// post -> author, author -> post, post -> author (cached)
		assert_eq!(ds.reads("author"), 1);
		assert_eq!(ds.reads("post"), 1);
		let nested = &items[0]["author_author"]["post"];
		assert_eq!(nested["total"], json!(3));
		assert_eq!(nested["items"][0]["author_author"]["name"], json!("Ada"));
		assert!(nested["items"][0]["author_author"].get("post").is_none());
	}

	#[test(tokio::test)]
	async fn missing_and_null_references_attach_null() {
		let (ds, graph) = blog().await;
		let cache = RelationCache::new();
		let loader = Loader::new(&graph, &ds, &cache, 1);
		let mut items = vec![row(json!({"id": 8, "author": 99})), row(json!({"id": 9, "author": null}))];
		loader.load(&mut items, "post", 0).await.unwrap();
		assert_eq!(items[0]["author_author"], Value::Null);
		assert_eq!(items[1]["author_author"], Value::Null);
		assert_eq!(cache.row("author", "id", "99"), Some(None));
	}

	#[test(tokio::test)]
	async fn self_references_stop_at_the_depth_bound() {
		let ds = Datastore::new();
		ds.create_table(
			&TableDef::new("node")
				.column(ColumnDef::new("id", "integer").primary())
				.column(ColumnDef::new("parent", "integer").references("node", "id")),
		)
		.await
		.unwrap();
		ds.insert("node", &row(json!({"id": 1, "parent": 1})), "id").await.unwrap();
		ds.insert("node", &row(json!({"id": 2, "parent": 1})), "id").await.unwrap();
		let graph = read_schema(&ds, "public", &[]).await.unwrap();
		let cache = RelationCache::new();
		let loader = Loader::new(&graph, &ds, &cache, 3);
		let mut items = ds.select(&Query::table("node")).await.unwrap();
		loader.load(&mut items, "node", 0).await.unwrap();
		let start = Value::Object(items[1].clone());
		let mut level = &start;
		for _ in 0..3 {
			level = &level["parent_node"];
			assert_eq!(level["id"], json!(1));
		}
		assert!(level.get("parent_node").is_none());
		assert_eq!(items[0]["node"]["total"], json!(2));
	}

	#[test(tokio::test)]
	async fn nothing_is_loaded_at_the_depth_bound() {
		let (ds, graph) = blog().await;
		let cache = RelationCache::new();
		let loader = Loader::new(&graph, &ds, &cache, 2);
		let mut items = ds.select(&Query::table("post")).await.unwrap();
		ds.reset_reads();
		loader.load(&mut items, "post", 2).await.unwrap();
		assert_eq!(ds.reads("author"), 0);
		assert!(items[0].get("author_author").is_none());
	}

	#[test(tokio::test)]
	async fn load_errors_propagate() {
		let (ds, graph) = blog().await;
		ds.drop_table("author").await.unwrap();
		let cache = RelationCache::new();
		let loader = Loader::new(&graph, &ds, &cache, 1);
		let mut items = vec![row(json!({"id": 1, "author": 1}))];
		assert!(loader.load(&mut items, "post", 0).await.is_err());
	}
}
