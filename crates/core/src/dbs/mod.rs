//! The entry point for host applications.
//!
//! [`Db2Graphql`] owns the datastore, the current schema graph and the
//! compiler, and hands out the SDL text, the resolver table and the
//! executable schema built from them. Introspection is lazy: the graph is
//! read on first use and only read again on refresh. A refresh swaps in a
//! new graph, so resolver tables built earlier keep serving the snapshot
//! they were built from.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_graphql::dynamic::Schema;
use parking_lot::RwLock;

use crate::catalog::{SchemaGraph, read_schema};
use crate::cnf::MAX_RELATION_DEPTH;
use crate::err::Error;
use crate::gql::cache::PageCache;
use crate::gql::compiler::Compiler;
use crate::gql::error::GqlError;
use crate::gql::resolver::{
	BoxResolver, Hooks, Override, Rejected, Resolver, ResolverTable, Validator, gate_all,
};
use crate::gql::schema::generate_schema;
use crate::gql::sdl::CompiledSchema;
use crate::kvs::{Adapter, AlterOp, Datastore, Descriptor, TableDef};

pub struct Db2Graphql {
	ds: Datastore,
	graph: ArcSwapOption<SchemaGraph>,
	compiler: Compiler,
	hooks: RwLock<Hooks>,
	custom: RwLock<ResolverTable>,
	pages: Arc<PageCache>,
	max_depth: usize,
}

impl std::fmt::Debug for Db2Graphql {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Db2Graphql")
			.field("ds", &self.ds)
			.field("introspected", &self.graph.load().is_some())
			.field("hooks", &*self.hooks.read())
			.finish()
	}
}

impl Db2Graphql {
	/// Connects to the database described by the descriptor
	pub async fn connect(descriptor: Descriptor) -> Result<Self, Error> {
		Ok(Self::from_datastore(Datastore::new(&descriptor).await?))
	}

	/// Serves a database through an adapter supplied by the host
	pub fn with_adapter(
		adapter: Arc<dyn Adapter>,
		namespace: impl Into<String>,
		exclude: Vec<String>,
	) -> Self {
		Self::from_datastore(Datastore::from_adapter(adapter, namespace, exclude))
	}

	fn from_datastore(ds: Datastore) -> Self {
		Self {
			ds,
			graph: ArcSwapOption::empty(),
			compiler: Compiler::new(),
			hooks: RwLock::new(Hooks::default()),
			custom: RwLock::new(ResolverTable::new()),
			pages: Arc::new(PageCache::default()),
			max_depth: *MAX_RELATION_DEPTH,
		}
	}

	pub fn with_page_cache(mut self, pages: PageCache) -> Self {
		self.pages = Arc::new(pages);
		self
	}

	pub fn with_max_depth(mut self, max_depth: usize) -> Self {
		self.max_depth = max_depth;
		self
	}

	pub fn datastore(&self) -> &Datastore {
		&self.ds
	}

	/// The raw database handle
	pub fn adapter(&self) -> &Arc<dyn Adapter> {
		self.ds.adapter()
	}

	/// Returns the schema graph, introspecting the database when there is
	/// none yet or when asked to. A failed introspection leaves the previous
	/// graph in place.
	pub async fn get_database_schema(&self, refresh: bool) -> Result<Arc<SchemaGraph>, Error> {
		if !refresh {
			if let Some(graph) = self.graph.load_full() {
				return Ok(graph);
			}
		}
		let graph = read_schema(self.ds.adapter().as_ref(), self.ds.namespace(), self.ds.exclude())
			.await?;
		let graph = Arc::new(graph);
		self.graph.store(Some(graph.clone()));
		self.compiler.invalidate();
		Ok(graph)
	}

	/// Returns the compiled schema: generated types followed by manual additions
	pub async fn get_schema(&self, refresh: bool) -> Result<CompiledSchema, Error> {
		let graph = self.get_database_schema(refresh).await?;
		Ok(self.compiler.build_schema(&graph, self.ds.dialect()))
	}

	/// Returns the schema definition language text
	pub async fn get_sdl(&self, refresh: bool) -> Result<String, Error> {
		let graph = self.get_database_schema(refresh).await?;
		Ok(self.compiler.get_sdl(&graph, self.ds.dialect(), refresh))
	}

	/// Returns the resolver table.
	///
	/// With `with_database` the table holds the generated resolvers, then
	/// the resolvers added by the host; otherwise only the latter. Every
	/// entry passes through the validator when one is set.
	pub async fn get_resolvers(
		&self,
		refresh: bool,
		with_database: bool,
	) -> Result<ResolverTable, Error> {
		let hooks = self.hooks.read().clone();
		let mut table = match with_database {
			true => self.resolver(refresh).await?.resolvers(&hooks),
			false => ResolverTable::new(),
		};
		for (ty, field, resolver) in self.custom.read().iter() {
			table.insert(ty, field, resolver.clone());
		}
		Ok(gate_all(&hooks, table))
	}

	/// Returns the resolver over the current graph, for calling built-ins directly
	pub async fn resolver(&self, refresh: bool) -> Result<Resolver, Error> {
		let graph = self.get_database_schema(refresh).await?;
		Ok(Resolver::new(graph, self.ds.adapter().clone(), self.pages.clone())
			.with_max_depth(self.max_depth))
	}

	/// Builds an executable schema wired to the resolver table.
	///
	/// Hosts should add a fresh `Arc<RelationCache>` to the data of every
	/// request they execute, so relation fields share what the request
	/// already loaded.
	pub async fn get_executable_schema(&self, refresh: bool) -> Result<Schema, GqlError> {
		let compiled = self.get_schema(refresh).await?;
		let resolvers = self.get_resolvers(false, true).await?;
		generate_schema(&compiled, &resolvers)
	}

	/// Adds a field with parameters to any type, for example
	/// `add("Query", "hello", "String", &[("name", "String!")])`
	pub fn add(
		&self,
		type_name: &str,
		field: &str,
		ty: &str,
		params: &[(&str, &str)],
	) -> Result<(), Error> {
		self.compiler.add(type_name, field, ty, params)
	}

	pub fn add_type(&self, type_name: &str, fields: &[(&str, &str)]) -> Result<(), Error> {
		self.compiler.add_type(type_name, fields)
	}

	pub fn add_input(&self, input: &str, fields: &[(&str, &str)]) -> Result<(), Error> {
		self.compiler.add_input(input, fields)
	}

	pub fn add_query(&self, field: &str, ty: &str, params: &[(&str, &str)]) -> Result<(), Error> {
		self.compiler.add_query(field, ty, params)
	}

	pub fn add_mutation(&self, field: &str, ty: &str, params: &[(&str, &str)]) -> Result<(), Error> {
		self.compiler.add_mutation(field, ty, params)
	}

	/// Sets the resolver of a field, taking precedence over a generated one
	pub fn add_resolver(&self, type_name: &str, field: &str, resolver: BoxResolver) {
		self.custom.write().insert(type_name, field, resolver);
	}

	/// Replaces the built-in `getPage`, `getFirstOf` or `putItem`
	pub fn on(&self, name: &str, callback: Override) -> Result<(), Error> {
		self.hooks.write().on(name, callback)
	}

	pub fn set_validator(&self, validator: Validator) {
		self.hooks.write().set_validator(validator);
	}

	pub fn set_rejected(&self, rejected: Rejected) {
		self.hooks.write().set_rejected(rejected);
	}

	/// Creates a table. The schema graph is not refreshed.
	pub async fn create_table(&self, table: &TableDef) -> Result<(), Error> {
		self.ds.adapter().create_table(table).await
	}

	/// Drops a table. The schema graph is not refreshed.
	pub async fn drop_table(&self, table: &str) -> Result<(), Error> {
		self.ds.adapter().drop_table(table).await
	}

	/// Alters a table. The schema graph is not refreshed.
	pub async fn alter_table(&self, table: &str, ops: &[AlterOp]) -> Result<(), Error> {
		self.ds.adapter().alter_table(table, ops).await
	}
}
