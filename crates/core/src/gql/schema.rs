//! Turns a compiled schema and a resolver table into an executable
//! `async-graphql` dynamic schema.
//!
//! Objects travel between resolvers as owned JSON values. A field without
//! an entry in the resolver table reads the key of the same name from its
//! parent object.

use std::sync::Arc;

use async_graphql::dynamic::{
	Field, FieldFuture, FieldValue, InputObject, InputValue, Object, ResolverContext, Schema,
	TypeRef,
};
use async_graphql::Value as GqlValue;

use super::cache::RelationCache;
use super::error::{GqlError, internal_error, schema_error};
use super::resolver::{BoxResolver, Call, ResolverTable};
use super::sdl::{CONDITION, CompiledSchema, FieldDecl, Fields, MUTATION, QUERY, Type};
use crate::val::{Row, Value};

/// Builds the executable schema.
///
/// Requests should carry an `Arc<RelationCache>` as request data, so every
/// relation field of the request shares the rows already loaded. Without
/// one, each field falls back to a cache of its own.
pub fn generate_schema(
	compiled: &CompiledSchema,
	resolvers: &ResolverTable,
) -> Result<Schema, GqlError> {
	if compiled.types.get(QUERY).is_none_or(|q| q.is_empty()) {
		return Err(schema_error("no tables found in database"));
	}
	let mutation = compiled.types.get(MUTATION).is_some_and(|m| !m.is_empty()).then_some(MUTATION);
	let mut schema = Schema::build(QUERY, mutation, None);
	for (name, fields) in compiled.types.iter() {
		if fields.is_empty() {
			continue;
		}
		trace!("adding type: {name}");
		let mut object = Object::new(name);
		for decl in fields.values() {
			object = object.field(field(decl, resolvers.get(name, &decl.name).cloned()));
		}
		schema = schema.register(object);
	}
	for (name, fields) in compiled.inputs.iter().filter(|(name, _)| name.as_str() != CONDITION) {
		schema = schema.register(input(name, fields));
	}
	schema = schema.register(input(CONDITION, &CompiledSchema::condition_fields()));
	schema.finish().map_err(|e| schema_error(e.to_string()))
}

fn type_ref(ty: &Type) -> TypeRef {
	match ty {
		Type::Named(name) => TypeRef::named(name.clone()),
		Type::List(inner) => TypeRef::List(Box::new(type_ref(inner))),
		Type::NonNull(inner) => TypeRef::NonNull(Box::new(type_ref(inner))),
	}
}

fn input(name: &str, fields: &Fields) -> InputObject {
	fields.values().fold(InputObject::new(name), |object, decl| {
		object.field(InputValue::new(&decl.name, type_ref(&decl.ty)))
	})
}

fn field(decl: &FieldDecl, resolver: Option<BoxResolver>) -> Field {
	let name = decl.name.clone();
	let field = Field::new(&decl.name, type_ref(&decl.ty), move |ctx: ResolverContext| {
		let name = name.clone();
		let resolver = resolver.clone();
		FieldFuture::new(async move {
			let parent = ctx.parent_value.downcast_ref::<Value>().cloned();
			let Some(resolver) = resolver else {
				let value = parent.and_then(|p| p.get(&name).cloned()).unwrap_or_default();
				return Ok(to_field_value(value)?);
			};
			let args = arguments(&ctx)?;
			trace!("received request for {name} with args: {args:?}");
			let cache = match ctx.data_opt::<Arc<RelationCache>>() {
				Some(cache) => cache.clone(),
				None => {
					debug!("No relation cache in the request data, {name} uses its own");
					Arc::default()
				}
			};
			let out = resolver(Call::new(parent, args, cache)).await?;
			Ok(to_field_value(out)?)
		})
	});
	decl.params.iter().fold(field, |field, (param, ty)| {
		field.argument(InputValue::new(param, type_ref(ty)))
	})
}

fn arguments(ctx: &ResolverContext) -> Result<Row, GqlError> {
	let mut out = Row::new();
	for (name, value) in ctx.args.as_index_map() {
		let value = value
			.clone()
			.into_json()
			.map_err(|e| internal_error(format!("failed to read argument {name}: {e}")))?;
		out.insert(name.to_string(), value);
	}
	Ok(out)
}

fn to_field_value<'a>(value: Value) -> Result<Option<FieldValue<'a>>, GqlError> {
	match value {
		Value::Null => Ok(None),
		value => item(value).map(Some),
	}
}

fn item<'a>(value: Value) -> Result<FieldValue<'a>, GqlError> {
	match value {
		Value::Null => Ok(FieldValue::NULL),
		Value::Object(_) => Ok(FieldValue::owned_any(value)),
		Value::Array(items) => {
			let items = items.into_iter().map(item).collect::<Result<Vec<_>, _>>()?;
			Ok(FieldValue::list(items))
		}
		scalar => {
			let out = GqlValue::from_json(scalar)
				.map_err(|e| internal_error(format!("failed to convert value: {e}")))?;
			Ok(FieldValue::value(out))
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::catalog::{Dialect, read_schema};
	use crate::gql::cache::PageCache;
	use crate::gql::compiler::Compiler;
	use crate::gql::resolver::{Hooks, Resolver};
	use crate::kvs::mem::Datastore;
	use crate::kvs::{Adapter, ColumnDef, TableDef};

	async fn schema() -> (Arc<Datastore>, Schema) {
		let ds = Arc::new(Datastore::new());
		ds.create_table(&TableDef::new("foo").column(ColumnDef::new("bar", "integer").primary()))
			.await
			.unwrap();
		ds.create_table(
			&TableDef::new("bar")
				.column(ColumnDef::new("foo", "integer").primary())
				.column(ColumnDef::new("bar", "integer").references("foo", "bar")),
		)
		.await
		.unwrap();
		let graph = Arc::new(read_schema(ds.as_ref(), "public", &[]).await.unwrap());
		let compiled = Compiler::new().build_schema(&graph, Dialect::Postgres);
		let resolver = Resolver::new(graph, ds.clone(), Arc::new(PageCache::default()));
		let table = resolver.resolvers(&Hooks::default());
		(ds, generate_schema(&compiled, &table).unwrap())
	}

	async fn blog() -> (Arc<Datastore>, Schema) {
		let ds = Arc::new(Datastore::new());
		ds.create_table(&TableDef::new("author").column(ColumnDef::new("id", "integer").primary()))
			.await
			.unwrap();
		ds.create_table(
			&TableDef::new("post")
				.column(ColumnDef::new("id", "integer").primary())
				.column(ColumnDef::new("author", "integer").references("author", "id")),
		)
		.await
		.unwrap();
		for _ in 0..2 {
			ds.insert("author", &Row::new(), "id").await.unwrap();
		}
		for n in 0..8 {
			ds.insert("post", json!({"author": n % 2 + 1}).as_object().unwrap(), "id").await.unwrap();
		}
		let graph = Arc::new(read_schema(ds.as_ref(), "public", &[]).await.unwrap());
		let compiled = Compiler::new().build_schema(&graph, Dialect::Postgres);
		let resolver =
			Resolver::new(graph, ds.clone(), Arc::new(PageCache::default())).with_max_depth(1);
		let table = resolver.resolvers(&Hooks::default());
		ds.reset_reads();
		(ds, generate_schema(&compiled, &table).unwrap())
	}

	async fn run(schema: &Schema, query: &str) -> serde_json::Value {
		let request = async_graphql::Request::new(query).data(Arc::new(RelationCache::new()));
		let response = schema.execute(request).await;
		assert!(response.errors.is_empty(), "{:?}", response.errors);
		response.data.into_json().unwrap()
	}

	#[tokio::test]
	async fn executes_generated_queries() {
		let (_, schema) = schema().await;
		let out = run(&schema, "{ getPageFoo { total tablename items { bar } } }").await;
		assert_eq!(out, json!({"getPageFoo": {"total": 0, "tablename": "foo", "items": []}}));
	}

	#[tokio::test]
	async fn executes_mutations_and_relations() {
		let (ds, schema) = schema().await;
		run(&schema, "mutation { putItemFoo(input: { bar: 1 }) { bar } }").await;
		run(&schema, "mutation { putItemBar(input: { foo: 1, bar: 1 }) { foo } }").await;
		ds.reset_reads();
		let out = run(
			&schema,
			r#"{ getFirstFoo(filter: "bar=1") { bar bar_bar { total items { foo bar_foo { bar } } } } }"#,
		)
		.await;
		assert_eq!(
			out,
			json!({"getFirstFoo": {"bar": 1, "bar_bar": {"total": 1, "items": [{"foo": 1, "bar_foo": {"bar": 1}}]}}})
		);
		assert_eq!(ds.reads("bar"), 1);
	}

	#[tokio::test]
	async fn relation_arguments_narrow_the_page() {
		let (ds, schema) = schema().await;
		ds.insert("foo", json!({"bar": 1}).as_object().unwrap(), "bar").await.unwrap();
		for foo in 1..=3 {
			ds.insert("bar", json!({"foo": foo, "bar": 1}).as_object().unwrap(), "foo").await.unwrap();
		}
		let out = run(
			&schema,
			r#"{ getPageFoo { items { bar_bar(filter: "foo>1", pagination: "orderby=foo desc") { total items { foo } } } } }"#,
		)
		.await;
		assert_eq!(
			out["getPageFoo"]["items"][0]["bar_bar"],
			json!({"total": 2, "items": [{"foo": 3}, {"foo": 2}]})
		);
	}

	#[tokio::test]
	async fn relations_past_the_depth_limit_are_batched() {
		let (ds, schema) = blog().await;
		let out = run(&schema, "{ getPagePost { items { author_author { post { total } } } } }").await;
		let items = out["getPagePost"]["items"].as_array().unwrap();
		assert_eq!(items.len(), 8);
		assert!(items.iter().all(|i| i["author_author"]["post"]["total"] == json!(4)));
		assert_eq!(ds.reads("author"), 1);
		assert_eq!(ds.reads("post"), 2);
		// Narrowed fields batch per argument set
		ds.reset_reads();
		let out = run(
			&schema,
			r#"{ getPagePost { items { author_author { post(pagination: "limit=1;orderby=id desc") { total items { id } } } } } }"#,
		)
		.await;
		let first = &out["getPagePost"]["items"][0]["author_author"]["post"];
		assert_eq!(first, &json!({"total": 4, "items": [{"id": 7}]}));
		assert_eq!(ds.reads("post"), 2);
	}

	#[tokio::test]
	async fn requests_without_a_relation_cache_still_resolve() {
		let (_, schema) = blog().await;
		let response = schema.execute("{ getPagePost { items { author_author { post { total } } } } }").await;
		assert!(response.errors.is_empty(), "{:?}", response.errors);
		let out = response.data.into_json().unwrap();
		assert_eq!(out["getPagePost"]["items"][7]["author_author"]["post"]["total"], json!(4));
	}

	#[tokio::test]
	async fn resolver_errors_are_reported() {
		let (_, schema) = schema().await;
		let response = schema.execute(r#"{ getPageFoo(filter: "bar") { total } }"#).await;
		assert_eq!(response.errors.len(), 1);
		assert!(response.errors[0].message.contains("Filter operation not suported in: bar"));
	}

	#[test]
	fn empty_schemas_are_rejected() {
		let err = generate_schema(&CompiledSchema::default(), &ResolverTable::new()).unwrap_err();
		assert!(matches!(err, GqlError::Schema(_)));
	}
}
