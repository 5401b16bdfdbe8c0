//! The resolver table handed to the GraphQL executor.
//!
//! Every generated root field dispatches to one of the built-in operations
//! of [`Resolver`], unless the host installed an override for it. Relation
//! fields return what the loader attached eagerly. Anything else goes
//! through the request's [`RelationCache`] and then the relation batcher.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_graphql::dataloader::DataLoader;
use futures::future::BoxFuture;
use indexmap::IndexMap;

use super::batch::{RelationBatch, RelationKey, narrowing};
use super::cache::{PageCache, RelationCache};
use super::ext::{ArgsExt, type_name};
use super::loader::{Loader, page};
use super::sdl::{MUTATION, QUERY};
use crate::catalog::{Relation, SchemaGraph};
use crate::cnf::MAX_RELATION_DEPTH;
use crate::err::Error;
use crate::expr::{Where, parse_filter, parse_pagination};
use crate::kvs::{Adapter, Query};
use crate::val::{Row, Value, is_truthy, key_of};

pub type ResolverFuture = BoxFuture<'static, Result<Value, Error>>;

/// A field resolver: receives the call and produces the field value
pub type BoxResolver = Arc<dyn Fn(Call) -> ResolverFuture + Send + Sync>;

/// A replacement for a built-in operation
pub type Override = Arc<dyn Fn(Call, Ioc) -> ResolverFuture + Send + Sync>;

/// Decides whether a call may go ahead
pub type Validator = Arc<dyn Fn(Gate) -> BoxFuture<'static, bool> + Send + Sync>;

/// Produces the error returned for a call the validator refused
pub type Rejected = Arc<dyn Fn(Gate) -> Error + Send + Sync>;

/// A single invocation of a field resolver
#[derive(Clone, Debug)]
pub struct Call {
	/// The value of the parent object, absent for root fields
	pub parent: Option<Value>,
	pub args: Row,
	/// Relation rows loaded during the current request
	pub cache: Arc<RelationCache>,
}

impl Call {
	pub fn new(parent: Option<Value>, args: Row, cache: Arc<RelationCache>) -> Self {
		Self {
			parent,
			args,
			cache,
		}
	}
}

/// The call details seen by the validator
#[derive(Clone, Debug)]
pub struct Gate {
	pub type_name: String,
	pub field: String,
	pub args: Row,
}

/// The built-in operations which can be overridden
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Builtin {
	GetPage,
	GetFirst,
	PutItem,
}

impl Builtin {
	pub fn as_str(&self) -> &'static str {
		match self {
			Builtin::GetPage => "getPage",
			Builtin::GetFirst => "getFirstOf",
			Builtin::PutItem => "putItem",
		}
	}
}

impl FromStr for Builtin {
	type Err = Error;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"getPage" => Ok(Builtin::GetPage),
			"getFirst" | "getFirstOf" => Ok(Builtin::GetFirst),
			"putItem" => Ok(Builtin::PutItem),
			_ => Err(Error::OverrideNotFound(s.to_owned())),
		}
	}
}

impl fmt::Display for Builtin {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The context injected into overrides
#[derive(Clone, Debug)]
pub struct Ioc {
	/// The resolver whose built-in was overridden, for delegating back
	pub resolver: Resolver,
	pub table: String,
	/// The raw database handle
	pub db: Arc<dyn Adapter>,
}

/// Overrides and the authorization gate installed by the host
#[derive(Clone, Default)]
pub struct Hooks {
	overrides: HashMap<Builtin, Override>,
	validator: Option<Validator>,
	rejected: Option<Rejected>,
}

impl fmt::Debug for Hooks {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Hooks")
			.field("overrides", &self.overrides.keys().collect::<Vec<_>>())
			.field("validator", &self.validator.is_some())
			.field("rejected", &self.rejected.is_some())
			.finish()
	}
}

impl Hooks {
	/// Installs an override for the built-in with the given name
	pub fn on(&mut self, name: &str, callback: Override) -> Result<(), Error> {
		let builtin: Builtin = name.parse()?;
		debug!("Installing override for `{builtin}`");
		self.overrides.insert(builtin, callback);
		Ok(())
	}

	pub fn set_validator(&mut self, validator: Validator) {
		self.validator = Some(validator);
	}

	pub fn set_rejected(&mut self, rejected: Rejected) {
		self.rejected = Some(rejected);
	}

	fn override_for(&self, builtin: Builtin) -> Option<&Override> {
		self.overrides.get(&builtin)
	}
}

/// Field resolvers keyed by type name, then field name
#[derive(Clone, Default)]
pub struct ResolverTable {
	entries: IndexMap<String, IndexMap<String, BoxResolver>>,
}

impl fmt::Debug for ResolverTable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut map = f.debug_map();
		for (ty, fields) in self.entries.iter() {
			map.entry(ty, &fields.keys().collect::<Vec<_>>());
		}
		map.finish()
	}
}

impl ResolverTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the resolver of a field, replacing any earlier one
	pub fn insert(&mut self, type_name: &str, field: &str, resolver: BoxResolver) {
		self.entries.entry(type_name.to_owned()).or_default().insert(field.to_owned(), resolver);
	}

	pub fn get(&self, type_name: &str, field: &str) -> Option<&BoxResolver> {
		self.entries.get(type_name).and_then(|f| f.get(field))
	}

	pub fn contains(&self, type_name: &str, field: &str) -> bool {
		self.get(type_name, field).is_some()
	}

	/// Iterates over every (type, field, resolver) entry
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &BoxResolver)> {
		self.entries.iter().flat_map(|(ty, fields)| {
			fields.iter().map(move |(f, r)| (ty.as_str(), f.as_str(), r))
		})
	}

	pub fn len(&self) -> usize {
		self.entries.values().map(IndexMap::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Calls the resolver of a field directly
	pub async fn call(&self, type_name: &str, field: &str, call: Call) -> Result<Value, Error> {
		match self.get(type_name, field) {
			Some(resolver) => resolver(call).await,
			None => Err(Error::InvalidInput(format!("No resolver for {type_name}.{field}"))),
		}
	}
}

/// The built-in operations over a snapshot of the schema graph
#[derive(Clone)]
pub struct Resolver {
	graph: Arc<SchemaGraph>,
	adapter: Arc<dyn Adapter>,
	pages: Arc<PageCache>,
	batch: Arc<DataLoader<RelationBatch>>,
	max_depth: usize,
}

impl fmt::Debug for Resolver {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Resolver")
			.field("tables", &self.graph.len())
			.field("adapter", &self.adapter.kind())
			.field("max_depth", &self.max_depth)
			.finish()
	}
}

impl Resolver {
	pub fn new(graph: Arc<SchemaGraph>, adapter: Arc<dyn Adapter>, pages: Arc<PageCache>) -> Self {
		let max_depth = *MAX_RELATION_DEPTH;
		Self {
			batch: batcher(&graph, &adapter, max_depth),
			graph,
			adapter,
			pages,
			max_depth,
		}
	}

	pub fn with_max_depth(mut self, max_depth: usize) -> Self {
		self.max_depth = max_depth;
		self.batch = batcher(&self.graph, &self.adapter, max_depth);
		self
	}

	pub fn graph(&self) -> &SchemaGraph {
		&self.graph
	}

	pub fn adapter(&self) -> &Arc<dyn Adapter> {
		&self.adapter
	}

	fn loader<'a>(&'a self, cache: &'a RelationCache) -> Loader<'a> {
		Loader::new(&self.graph, self.adapter.as_ref(), cache, self.max_depth)
	}

	/// Every table whose results can carry rows of `table`, itself included.
	///
	/// Relations are always present in both directions, so these are the
	/// tables within `max_depth` relation hops.
	fn embedding(&self, table: &str) -> BTreeSet<String> {
		let mut seen = BTreeSet::from([table.to_owned()]);
		let mut level = vec![table.to_owned()];
		for _ in 0..self.max_depth {
			let mut next = Vec::new();
			for name in level.iter() {
				let Some(node) = self.graph.table(name) else {
					continue;
				};
				for relation in node.relations() {
					let other = match relation {
						Relation::Forward {
							target,
							..
						} => target,
						Relation::Reverse {
							table,
							..
						} => table,
					};
					if seen.insert(other.clone()) {
						next.push(other);
					}
				}
			}
			level = next;
		}
		seen
	}

	/// Runs a read through the page cache, when it is enabled and not bypassed
	async fn cached<F>(
		&self,
		table: &str,
		operation: &'static str,
		args: &Row,
		query: &Query,
		run: F,
	) -> Result<Value, Error>
	where
		F: Future<Output = Result<Value, Error>>,
	{
		if args.get_bool("_debug").unwrap_or_default() {
			info!("{operation} `{table}`: {query}");
		}
		if !self.pages.enabled() || args.get_bool("_cache") == Some(false) {
			return run.await;
		}
		let key = self.pages.key(
			table,
			operation,
			args.get_str("filter").unwrap_or_default(),
			args.get_str("pagination").unwrap_or_default(),
			query.raw.as_ref(),
		);
		if let Some(value) = self.pages.get(&key) {
			return Ok(value);
		}
		let value = run.await?;
		self.pages.insert(key, value.clone());
		Ok(value)
	}

	/// Returns `{total, tablename, items}` for the rows matching the arguments
	pub async fn get_page(
		&self,
		table: &str,
		args: &Row,
		cache: &RelationCache,
	) -> Result<Value, Error> {
		self.graph.get(table)?;
		let query = read_query(table, args)?;
		self.cached(table, "getPage", args, &query, async {
			let total = self.adapter.count(&query.unpaginated()).await?;
			let mut items = self.adapter.select(&query).await?;
			self.loader(cache).load(&mut items, table, 0).await?;
			Ok(page(total, table, items))
		})
		.await
	}

	/// Returns the first row matching the arguments, or null
	pub async fn get_first(
		&self,
		table: &str,
		args: &Row,
		cache: &RelationCache,
	) -> Result<Value, Error> {
		self.graph.get(table)?;
		let query = read_query(table, args)?;
		self.cached(table, "getFirst", args, &query, async {
			match self.adapter.first(&query).await? {
				Some(mut row) => {
					self.loader(cache).load(std::slice::from_mut(&mut row), table, 0).await?;
					Ok(Value::Object(row))
				}
				None => Ok(Value::Null),
			}
		})
		.await
	}

	/// Inserts or updates the `input` row and returns it as stored.
	///
	/// A missing or falsy primary key inserts a new row. Otherwise the row
	/// with that key is updated, or inserted when there is none. The primary
	/// key is never part of the update.
	pub async fn put_item(
		&self,
		table: &str,
		args: &Row,
		cache: &RelationCache,
	) -> Result<Value, Error> {
		let node = self.graph.get(table)?;
		let pk =
			node.primary_key.as_deref().ok_or_else(|| Error::NoPrimaryKey(table.to_owned()))?;
		let mut input = args
			.get_object("input")
			.cloned()
			.ok_or_else(|| Error::InvalidInput(format!("Missing input for `{table}`")))?;
		input.remove("_debug");
		let debug = args.get_bool("_debug").unwrap_or_default();
		let key = match input.get(pk).filter(|v| is_truthy(v)).cloned() {
			None => {
				input.remove(pk);
				if debug {
					let row = Value::Object(input.clone());
					info!("putItem `{table}`: insert {row}");
				}
				self.adapter.insert(table, &input, pk).await?
			}
			Some(key) => {
				let existing = Query::table(table).within(pk, vec![key.clone()]);
				if self.adapter.count(&existing).await? > 0 {
					input.remove(pk);
					if debug {
						let set = Value::Object(input.clone());
						info!("putItem `{table}`: update {pk} = {key} with {set}");
					}
					if !input.is_empty() {
						self.adapter.update(table, pk, &key, &input).await?;
					}
					key
				} else {
					if debug {
						let row = Value::Object(input.clone());
						info!("putItem `{table}`: insert {row}");
					}
					self.adapter.insert(table, &input, pk).await?
				}
			}
		};
		for name in self.embedding(table) {
			self.pages.invalidate(&name);
		}
		match self.adapter.first(&Query::table(table).within(pk, vec![key])).await? {
			Some(mut row) => {
				self.loader(cache).load(std::slice::from_mut(&mut row), table, 0).await?;
				Ok(Value::Object(row))
			}
			None => Ok(Value::Null),
		}
	}

	/// Resolves a relation field of a row of `table`
	pub async fn relation(
		&self,
		table: &str,
		field: &str,
		parent: &Value,
		args: &Row,
		cache: &RelationCache,
	) -> Result<Value, Error> {
		let narrowed = !narrowing(args).is_empty();
		if !narrowed {
			if let Some(value) = parent.get(field) {
				return Ok(value.clone());
			}
		}
		let relation = self
			.graph
			.get(table)?
			.relation(field)
			.ok_or_else(|| Error::InvalidInput(format!("No relation {field} on `{table}`")))?;
		let (local, target, column, reverse) = match &relation {
			Relation::Forward {
				column,
				target,
				target_column,
				..
			} => (column, target, target_column, false),
			Relation::Reverse {
				table: child,
				column,
				local_column,
				..
			} => (local_column, child, column, true),
		};
		let empty = || {
			if reverse {
				page(0, target, Vec::new())
			} else {
				Value::Null
			}
		};
		let Some((key, slot)) = parent.get(local).and_then(|v| Some((v, key_of(v)?))) else {
			return Ok(empty());
		};
		if !narrowed {
			let hit = if reverse {
				cache.group(target, column, &slot).map(|rows| page(rows.len() as u64, target, rows))
			} else {
				cache.row(target, column, &slot).map(|row| row.map(Value::Object).unwrap_or_default())
			};
			if let Some(value) = hit {
				return Ok(value);
			}
		}
		let value = self
			.batch
			.load_one(RelationKey::new(table, field, args, key)?)
			.await
			.map_err(Error::Batch)?
			.unwrap_or_else(empty);
		if !narrowed {
			if reverse {
				let rows: Vec<Row> = value["items"]
					.as_array()
					.map(|items| items.iter().filter_map(|v| v.as_object().cloned()).collect())
					.unwrap_or_default();
				cache.put_group(target, column, &slot, rows);
			} else {
				cache.put_row(target, column, &slot, value.as_object().cloned());
			}
		}
		Ok(value)
	}

	/// Builds the resolver table for every table of the graph
	pub fn resolvers(&self, hooks: &Hooks) -> ResolverTable {
		let hooks = Arc::new(hooks.clone());
		let mut table = ResolverTable::new();
		for node in self.graph.tables() {
			let ty = type_name(&node.name);
			let get_page = self.builtin(&hooks, Builtin::GetPage, &node.name);
			table.insert(QUERY, &format!("getPage{ty}"), get_page);
			if node.primary_key.is_some() {
				let get_first = self.builtin(&hooks, Builtin::GetFirst, &node.name);
				table.insert(QUERY, &format!("getFirst{ty}"), get_first);
				let put_item = self.builtin(&hooks, Builtin::PutItem, &node.name);
				table.insert(MUTATION, &format!("putItem{ty}"), put_item);
			}
			for relation in node.relations() {
				let resolver = self.relation_field(&node.name, relation.field());
				table.insert(&ty, relation.field(), resolver);
			}
		}
		table
	}

	fn builtin(&self, hooks: &Arc<Hooks>, builtin: Builtin, table: &str) -> BoxResolver {
		let resolver = self.clone();
		let hooks = hooks.clone();
		let table = table.to_owned();
		Arc::new(move |call: Call| -> ResolverFuture {
			let resolver = resolver.clone();
			let hooks = hooks.clone();
			let table = table.clone();
			Box::pin(async move {
				if let Some(callback) = hooks.override_for(builtin) {
					let ioc = Ioc {
						db: resolver.adapter.clone(),
						resolver,
						table,
					};
					return callback(call, ioc).await;
				}
				match builtin {
					Builtin::GetPage => resolver.get_page(&table, &call.args, &call.cache).await,
					Builtin::GetFirst => resolver.get_first(&table, &call.args, &call.cache).await,
					Builtin::PutItem => resolver.put_item(&table, &call.args, &call.cache).await,
				}
			})
		})
	}

	fn relation_field(&self, table: &str, field: &str) -> BoxResolver {
		let resolver = self.clone();
		let table = table.to_owned();
		let field = field.to_owned();
		Arc::new(move |call: Call| -> ResolverFuture {
			let resolver = resolver.clone();
			let table = table.clone();
			let field = field.clone();
			Box::pin(async move {
				let parent = call.parent.unwrap_or_default();
				resolver.relation(&table, &field, &parent, &call.args, &call.cache).await
			})
		})
	}
}

fn batcher(
	graph: &Arc<SchemaGraph>,
	adapter: &Arc<dyn Adapter>,
	max_depth: usize,
) -> Arc<DataLoader<RelationBatch>> {
	let batch = RelationBatch::new(graph.clone(), adapter.clone(), max_depth);
	Arc::new(DataLoader::new(batch, tokio::spawn))
}

/// Builds the read described by the `filter`, `pagination` and `where` arguments
pub(crate) fn read_query(table: &str, args: &Row) -> Result<Query, Error> {
	let mut query = Query::table(table);
	if let Some(filter) = args.get_str("filter") {
		query = query.filter(parse_filter(filter)?);
	}
	if let Some(pagination) = args.get_str("pagination") {
		query = query.paginate(parse_pagination(pagination)?);
	}
	if let Some(raw) = args.get_object("where") {
		let raw: Where = serde_json::from_value(Value::Object(raw.clone()))?;
		query = query.raw(Some(raw));
	}
	Ok(query)
}

/// Wraps a resolver so the validator sees every call before it runs
pub fn gated(hooks: &Hooks, type_name: &str, field: &str, inner: BoxResolver) -> BoxResolver {
	let Some(validator) = hooks.validator.clone() else {
		return inner;
	};
	let rejected = hooks.rejected.clone();
	let type_name = type_name.to_owned();
	let field = field.to_owned();
	Arc::new(move |call: Call| -> ResolverFuture {
		let validator = validator.clone();
		let rejected = rejected.clone();
		let inner = inner.clone();
		let gate = Gate {
			type_name: type_name.clone(),
			field: field.clone(),
			args: call.args.clone(),
		};
		Box::pin(async move {
			if validator(gate.clone()).await {
				return inner(call).await;
			}
			warn!("Rejected call to {}.{}", gate.type_name, gate.field);
			Err(match rejected {
				Some(rejected) => rejected(gate),
				None => Error::Unauthorized {
					type_name: gate.type_name,
					field: gate.field,
				},
			})
		})
	})
}

/// Wraps every entry of a table with the validator
pub fn gate_all(hooks: &Hooks, table: ResolverTable) -> ResolverTable {
	if hooks.validator.is_none() {
		return table;
	}
	let mut out = ResolverTable::new();
	for (ty, field, resolver) in table.iter() {
		out.insert(ty, field, gated(hooks, ty, field, resolver.clone()));
	}
	out
}
