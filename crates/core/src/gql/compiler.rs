use indexmap::IndexMap;
use parking_lot::RwLock;

use super::ext::{input_name, page_name, type_name};
use super::sdl::{CONDITION, CompiledSchema, FieldDecl, MUTATION, QUERY, Type};
use crate::catalog::{Dialect, Relation, SchemaGraph};
use crate::err::Error;

/// The parameters shared by query fields and reverse relation fields
pub fn read_params() -> IndexMap<String, Type> {
	let mut params = IndexMap::new();
	params.insert("filter".to_owned(), Type::named("String"));
	params.insert("pagination".to_owned(), Type::named("String"));
	params.insert("where".to_owned(), Type::named(CONDITION));
	params.insert("_debug".to_owned(), Type::named("Boolean"));
	params.insert("_cache".to_owned(), Type::named("Boolean"));
	params
}

fn write_params(table: &str) -> IndexMap<String, Type> {
	let mut params = IndexMap::new();
	params.insert("_debug".to_owned(), Type::named("Boolean"));
	params.insert("input".to_owned(), Type::non_null(Type::named(input_name(table))));
	params
}

/// Projects a schema graph into a [`CompiledSchema`].
///
/// Per table this emits an object type with a field per mappable column
/// and per relation, a `Page<Type>` wrapper, `getPage<Type>` and, when the
/// table has a primary key, `getFirst<Type>`, `putItem<Type>` and the
/// `Input<Type>` input. Columns whose type does not map are left out.
pub fn compile(graph: &SchemaGraph, dialect: Dialect) -> CompiledSchema {
	let mut out = CompiledSchema::default();
	for node in graph.tables() {
		let ty = type_name(&node.name);
		let mut columns = Vec::with_capacity(node.columns.len());
		for (column, attrs) in node.columns.iter() {
			match dialect.map_column_type(column, attrs) {
				Ok(scalar) => columns.push(FieldDecl::new(column, Type::named(scalar.as_str()))),
				Err(e) => warn!("Leaving column out of type `{ty}`: {e}"),
			}
		}
		let relations = node.relations();
		if columns.is_empty() && relations.is_empty() {
			warn!("Leaving table `{}` out of the schema as it has no usable columns", node.name);
			continue;
		}
		for field in columns.iter() {
			out.add_field(&ty, field.clone());
		}
		for relation in relations {
			let field = match &relation {
				Relation::Forward {
					field,
					target,
					..
				} => FieldDecl::new(field, Type::named(type_name(target))),
				Relation::Reverse {
					field,
					table,
					..
				} => FieldDecl::new(field, Type::named(page_name(table))).with_params(read_params()),
			};
			out.add_field(&ty, field);
		}
		let page = page_name(&node.name);
		out.add_field(&page, FieldDecl::new("total", Type::named("Int")));
		out.add_field(&page, FieldDecl::new("tablename", Type::named("String")));
		out.add_field(&page, FieldDecl::new("items", Type::list(Type::named(&ty))));
		out.add_field(
			QUERY,
			FieldDecl::new(format!("getPage{ty}"), Type::named(&page)).with_params(read_params()),
		);
		if node.primary_key.is_some() {
			out.add_field(
				QUERY,
				FieldDecl::new(format!("getFirst{ty}"), Type::named(&ty)).with_params(read_params()),
			);
			out.add_field(
				MUTATION,
				FieldDecl::new(format!("putItem{ty}"), Type::named(&ty))
					.with_params(write_params(&node.name)),
			);
			let input = input_name(&node.name);
			for field in columns {
				out.add_input_field(&input, field);
			}
		}
	}
	out
}

/// Compiles the schema graph and merges in manual additions.
///
/// Generated types and fields come first; manual additions follow in the
/// order they were made, and replace generated fields of the same name.
/// The SDL text is memoized until a refresh or a new addition.
#[derive(Debug, Default)]
pub struct Compiler {
	additions: RwLock<CompiledSchema>,
	sdl: RwLock<Option<String>>,
}

impl Compiler {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds the full compiled schema from the current graph
	pub fn build_schema(&self, graph: &SchemaGraph, dialect: Dialect) -> CompiledSchema {
		let mut schema = compile(graph, dialect);
		schema.merge(&self.additions.read());
		schema
	}

	/// Returns the SDL text, rebuilding it when asked to or when nothing is memoized
	pub fn get_sdl(&self, graph: &SchemaGraph, dialect: Dialect, refresh: bool) -> String {
		if !refresh {
			if let Some(sdl) = self.sdl.read().as_ref() {
				return sdl.clone();
			}
		}
		let sdl = self.build_schema(graph, dialect).to_sdl();
		*self.sdl.write() = Some(sdl.clone());
		sdl
	}

	/// Adds a field with parameters to any object type
	pub fn add(
		&self,
		type_name: &str,
		field: &str,
		ty: &str,
		params: &[(&str, &str)],
	) -> Result<(), Error> {
		let mut decl = FieldDecl::new(field, ty.parse()?);
		for (name, ty) in params {
			decl.params.insert((*name).to_owned(), ty.parse()?);
		}
		self.additions.write().add_field(type_name, decl);
		self.invalidate();
		Ok(())
	}

	/// Adds an object type with plain fields
	pub fn add_type(&self, type_name: &str, fields: &[(&str, &str)]) -> Result<(), Error> {
		let decls = parse_fields(fields)?;
		let mut additions = self.additions.write();
		additions.types.entry(type_name.to_owned()).or_default();
		for decl in decls {
			additions.add_field(type_name, decl);
		}
		drop(additions);
		self.invalidate();
		Ok(())
	}

	/// Adds an input type with plain fields
	pub fn add_input(&self, input: &str, fields: &[(&str, &str)]) -> Result<(), Error> {
		let decls = parse_fields(fields)?;
		let mut additions = self.additions.write();
		for decl in decls {
			additions.add_input_field(input, decl);
		}
		drop(additions);
		self.invalidate();
		Ok(())
	}

	pub fn add_query(&self, field: &str, ty: &str, params: &[(&str, &str)]) -> Result<(), Error> {
		self.add(QUERY, field, ty, params)
	}

	pub fn add_mutation(&self, field: &str, ty: &str, params: &[(&str, &str)]) -> Result<(), Error> {
		self.add(MUTATION, field, ty, params)
	}

	/// Drops the memoized SDL text
	pub fn invalidate(&self) {
		*self.sdl.write() = None;
	}
}

fn parse_fields(fields: &[(&str, &str)]) -> Result<Vec<FieldDecl>, Error> {
	fields.iter().map(|(name, ty)| Ok(FieldDecl::new(*name, ty.parse()?))).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::catalog::{ColumnAttrs, ForeignRef, TableNode};

	fn scenario() -> SchemaGraph {
		let mut graph = SchemaGraph::new("public");
		graph.insert(
			TableNode::new("foo")
				.with_primary_key("bar")
				.with_column("bar", ColumnAttrs::new("integer", false)),
		);
		graph.insert(
			TableNode::new("bar")
				.with_primary_key("foo")
				.with_column("foo", ColumnAttrs::new("integer", false))
				.with_column("bar", ColumnAttrs::new("integer", true)),
		);
		graph
			.link(
				"bar",
				"bar",
				ForeignRef {
					schema: "public".to_owned(),
					table: "foo".to_owned(),
					column: "bar".to_owned(),
				},
			)
			.unwrap();
		graph
	}

	const PARAMS: &str =
		"(filter: String, pagination: String, where: Condition, _debug: Boolean, _cache: Boolean)";

	#[test]
	fn compiles_the_two_table_scenario() {
		let sdl = Compiler::new().get_sdl(&scenario(), Dialect::Postgres, false);
		let expected = format!(
			"type Bar {{
  foo: Int
  bar: Int
  bar_foo: Foo
}}

type PageBar {{
  total: Int
  tablename: String
  items: [Bar]
}}

type Foo {{
  bar: Int
  bar_bar{PARAMS}: PageBar
}}

type PageFoo {{
  total: Int
  tablename: String
  items: [Foo]
}}

type Query {{
  getPageBar{PARAMS}: PageBar
  getFirstBar{PARAMS}: Bar
  getPageFoo{PARAMS}: PageFoo
  getFirstFoo{PARAMS}: Foo
}}

type Mutation {{
  putItemBar(_debug: Boolean, input: InputBar!): Bar
  putItemFoo(_debug: Boolean, input: InputFoo!): Foo
}}

input InputBar {{
  foo: Int
  bar: Int
}}

input InputFoo {{
  bar: Int
}}

input Condition {{
  sql: String!
  val: [String!]!
}}
"
		);
		assert_eq!(sdl, expected);
	}

	#[test]
	fn sdl_is_idempotent() {
		let graph = scenario();
		let compiler = Compiler::new();
		let a = compiler.get_sdl(&graph, Dialect::Postgres, false);
		let b = compiler.get_sdl(&graph, Dialect::Postgres, false);
		let c = compiler.get_sdl(&graph, Dialect::Postgres, true);
		assert_eq!(a, b);
		assert_eq!(a, c);
	}

	#[test]
	fn memoized_sdl_survives_until_refresh() {
		let compiler = Compiler::new();
		let a = compiler.get_sdl(&scenario(), Dialect::Postgres, false);
		let empty = SchemaGraph::new("public");
		assert_eq!(compiler.get_sdl(&empty, Dialect::Postgres, false), a);
		assert_ne!(compiler.get_sdl(&empty, Dialect::Postgres, true), a);
	}

	#[test]
	fn unknown_column_types_are_left_out() {
		let mut graph = SchemaGraph::new("public");
		graph.insert(
			TableNode::new("doc")
				.with_primary_key("id")
				.with_column("id", ColumnAttrs::new("integer", false))
				.with_column("body", ColumnAttrs::new("jsonb", true)),
		);
		let schema = compile(&graph, Dialect::Postgres);
		assert!(schema.field("Doc", "id").is_some());
		assert!(schema.field("Doc", "body").is_none());
		assert!(!schema.inputs["InputDoc"].contains_key("body"));
		// The type mapper itself stays strict
		let attrs = &graph.table("doc").unwrap().columns["body"];
		assert!(Dialect::Postgres.map_column_type("body", attrs).is_err());
	}

	#[test]
	fn tables_without_primary_key_only_list() {
		let mut graph = SchemaGraph::new("public");
		graph.insert(TableNode::new("log").with_column("line", ColumnAttrs::new("text", true)));
		let schema = compile(&graph, Dialect::Postgres);
		assert!(schema.field(QUERY, "getPageLog").is_some());
		assert!(schema.field(QUERY, "getFirstLog").is_none());
		assert!(!schema.types.contains_key(MUTATION));
		assert!(!schema.inputs.contains_key("InputLog"));
	}

	#[test]
	fn tables_without_usable_columns_are_left_out() {
		let mut graph = SchemaGraph::new("public");
		graph.insert(TableNode::new("blob").with_column("data", ColumnAttrs::new("bytea", true)));
		let schema = compile(&graph, Dialect::Postgres);
		assert!(schema.types.is_empty());
	}

	#[test]
	fn manual_additions_follow_generated_content() {
		let compiler = Compiler::new();
		compiler.add_type("Stats", &[("tables", "Int!")]).unwrap();
		compiler.add_query("getStats", "Stats", &[]).unwrap();
		compiler.add_mutation("reset", "Boolean", &[("force", "Boolean")]).unwrap();
		compiler.add("Foo", "label", "String", &[]).unwrap();
		let schema = compiler.build_schema(&scenario(), Dialect::Postgres);
		let types: Vec<&String> = schema.types.keys().collect();
		assert_eq!(types, vec!["Bar", "PageBar", "Query", "Mutation", "Foo", "PageFoo", "Stats"]);
		let sdl = schema.to_sdl();
		assert!(sdl.find("type Stats").unwrap() < sdl.find("type Query").unwrap());
		assert!(sdl.find("type PageFoo").unwrap() < sdl.find("type Stats").unwrap());
		let query: Vec<&String> = schema.types[QUERY].keys().collect();
		assert_eq!(query.last().map(|s| s.as_str()), Some("getStats"));
		let foo: Vec<&String> = schema.types["Foo"].keys().collect();
		assert_eq!(foo, vec!["bar", "bar_bar", "label"]);
		assert_eq!(
			schema.field(MUTATION, "reset").unwrap().to_string(),
			"reset(force: Boolean): Boolean"
		);
	}

	#[test]
	fn additions_invalidate_the_memo_and_are_order_independent() {
		let graph = scenario();
		let a = Compiler::new();
		a.get_sdl(&graph, Dialect::Postgres, false);
		a.add_type("Extra", &[("x", "Int")]).unwrap();
		a.add_input("ExtraInput", &[("x", "Int")]).unwrap();
		let b = Compiler::new();
		b.add_input("ExtraInput", &[("x", "Int")]).unwrap();
		b.add_type("Extra", &[("x", "Int")]).unwrap();
		assert_eq!(
			a.get_sdl(&graph, Dialect::Postgres, false),
			b.get_sdl(&graph, Dialect::Postgres, false)
		);
		assert!(a.get_sdl(&graph, Dialect::Postgres, false).contains("type Extra {\n  x: Int\n}"));
	}

	#[test]
	fn invalid_additions_are_rejected() {
		let compiler = Compiler::new();
		assert!(matches!(compiler.add_query("bad", "[Int", &[]), Err(Error::InvalidType(_))));
		assert!(compiler.build_schema(&SchemaGraph::new("public"), Dialect::Postgres).types.is_empty());
	}
}
