//! The compiled form of a GraphQL schema and its textual rendering.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::err::Error;

/// A GraphQL type reference such as `Int`, `[Foo]` or `InputFoo!`
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Type {
	Named(String),
	List(Box<Type>),
	NonNull(Box<Type>),
}

impl Type {
	pub fn named(name: impl Into<String>) -> Self {
		Type::Named(name.into())
	}

	pub fn list(inner: Type) -> Self {
		Type::List(Box::new(inner))
	}

	pub fn non_null(inner: Type) -> Self {
		match inner {
			Type::NonNull(_) => inner,
			inner => Type::NonNull(Box::new(inner)),
		}
	}

	/// The named type at the core of this reference
	pub fn base(&self) -> &str {
		match self {
			Type::Named(name) => name,
			Type::List(inner) | Type::NonNull(inner) => inner.base(),
		}
	}
}

impl fmt::Display for Type {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Type::Named(name) => f.write_str(name),
			Type::List(inner) => write!(f, "[{inner}]"),
			Type::NonNull(inner) => write!(f, "{inner}!"),
		}
	}
}

impl FromStr for Type {
	type Err = Error;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if let Some(inner) = s.strip_suffix('!') {
			return match inner.parse()? {
				Type::NonNull(_) => Err(Error::InvalidType(s.to_owned())),
				inner => Ok(Type::NonNull(Box::new(inner))),
			};
		}
		if let Some(inner) = s.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
			return Ok(Type::list(inner.parse()?));
		}
		let mut chars = s.chars();
		let valid = chars.next().is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
			&& chars.all(|c| c == '_' || c.is_ascii_alphanumeric());
		match valid {
			true => Ok(Type::named(s)),
			false => Err(Error::InvalidType(s.to_owned())),
		}
	}
}

/// A field of an object or input type
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldDecl {
	pub name: String,
	pub ty: Type,
	pub params: IndexMap<String, Type>,
}

impl FieldDecl {
	pub fn new(name: impl Into<String>, ty: Type) -> Self {
		Self {
			name: name.into(),
			ty,
			params: IndexMap::new(),
		}
	}

	pub fn with_params(mut self, params: IndexMap<String, Type>) -> Self {
		self.params = params;
		self
	}
}

impl fmt::Display for FieldDecl {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.name)?;
		if !self.params.is_empty() {
			let params: Vec<String> = self.params.iter().map(|(k, v)| format!("{k}: {v}")).collect();
			write!(f, "({})", params.join(", "))?;
		}
		write!(f, ": {}", self.ty)
	}
}

pub type Fields = IndexMap<String, FieldDecl>;

pub const QUERY: &str = "Query";
pub const MUTATION: &str = "Mutation";
pub const CONDITION: &str = "Condition";

/// Object and input types keyed by name, each holding its fields by name.
///
/// Insertion order is kept, and is the order of the rendered SDL, apart
/// from `Query` and `Mutation` which always follow the other object types.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CompiledSchema {
	pub types: IndexMap<String, Fields>,
	pub inputs: IndexMap<String, Fields>,
}

impl CompiledSchema {
	/// Adds a field to an object type, creating the type if needed.
	/// A field of the same name is replaced in place.
	pub fn add_field(&mut self, type_name: &str, field: FieldDecl) {
		self.types.entry(type_name.to_owned()).or_default().insert(field.name.clone(), field);
	}

	/// Adds a field to an input type, creating the type if needed
	pub fn add_input_field(&mut self, input: &str, field: FieldDecl) {
		self.inputs.entry(input.to_owned()).or_default().insert(field.name.clone(), field);
	}

	/// Merges another schema into this one, after the existing entries
	pub fn merge(&mut self, other: &CompiledSchema) {
		for (name, fields) in other.types.iter() {
			let target = self.types.entry(name.clone()).or_default();
			for (k, v) in fields.iter() {
				target.insert(k.clone(), v.clone());
			}
		}
		for (name, fields) in other.inputs.iter() {
			let target = self.inputs.entry(name.clone()).or_default();
			for (k, v) in fields.iter() {
				target.insert(k.clone(), v.clone());
			}
		}
	}

	pub fn field(&self, type_name: &str, field: &str) -> Option<&FieldDecl> {
		self.types.get(type_name).and_then(|t| t.get(field))
	}

	/// The fields of the `Condition` input accepted by `where` parameters
	pub fn condition_fields() -> Fields {
		let mut fields = Fields::new();
		fields.insert("sql".to_owned(), FieldDecl::new("sql", Type::non_null(Type::named("String"))));
		let values = Type::non_null(Type::list(Type::non_null(Type::named("String"))));
		fields.insert("val".to_owned(), FieldDecl::new("val", values));
		fields
	}

	/// Renders the schema in the GraphQL schema definition language
	pub fn to_sdl(&self) -> String {
		let mut blocks = Vec::new();
		let roots = [QUERY, MUTATION];
		let others = self.types.iter().filter(|(name, _)| !roots.contains(&name.as_str()));
		let roots = roots.iter().filter_map(|r| self.types.get_key_value(*r));
		for (name, fields) in others.chain(roots) {
			if !fields.is_empty() {
				blocks.push(block("type", name, fields));
			}
		}
		for (name, fields) in self.inputs.iter().filter(|(name, _)| name.as_str() != CONDITION) {
			if !fields.is_empty() {
				blocks.push(block("input", name, fields));
			}
		}
		blocks.push(block("input", CONDITION, &Self::condition_fields()));
		blocks.join("\n\n") + "\n"
	}
}

fn block(kind: &str, name: &str, fields: &Fields) -> String {
	let mut out = format!("{kind} {name} {{\n");
	for field in fields.values() {
		out.push_str(&format!("  {field}\n"));
	}
	out.push('}');
	out
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case("Int")]
	#[case("[Foo]")]
	#[case("InputFoo!")]
	#[case("[String!]!")]
	#[case("[[Int]]")]
	fn parses_and_renders_types(#[case] s: &str) {
		assert_eq!(s.parse::<Type>().unwrap().to_string(), s);
	}

	#[rstest]
	#[case("")]
	#[case("Int!!")]
	#[case("[Int")]
	#[case("1Int")]
	#[case("In t")]
	fn rejects_invalid_types(#[case] s: &str) {
		assert!(matches!(s.parse::<Type>(), Err(Error::InvalidType(_))));
	}

	#[test]
	fn renders_roots_after_objects_and_condition_last() {
		let mut schema = CompiledSchema::default();
		schema.add_field(QUERY, FieldDecl::new("hello", Type::named("String")));
		schema.add_field("Foo", FieldDecl::new("bar", Type::named("Int")));
		schema.add_input_field("InputFoo", FieldDecl::new("bar", Type::named("Int")));
		assert_eq!(
			schema.to_sdl(),
			"type Foo {\n  bar: Int\n}\n\ntype Query {\n  hello: String\n}\n\ninput InputFoo {\n  bar: Int\n}\n\ninput Condition {\n  sql: String!\n  val: [String!]!\n}\n"
		);
	}

	#[test]
	fn renders_parameters() {
		let mut params = IndexMap::new();
		params.insert("filter".to_owned(), Type::named("String"));
		params.insert("input".to_owned(), Type::non_null(Type::named("InputFoo")));
		let field = FieldDecl::new("putItemFoo", Type::named("Foo")).with_params(params);
		assert_eq!(field.to_string(), "putItemFoo(filter: String, input: InputFoo!): Foo");
	}

	#[test]
	fn merge_appends_and_replaces_in_place() {
		let mut a = CompiledSchema::default();
		a.add_field("Foo", FieldDecl::new("a", Type::named("Int")));
		a.add_field("Foo", FieldDecl::new("b", Type::named("Int")));
		let mut b = CompiledSchema::default();
		b.add_field("Foo", FieldDecl::new("a", Type::named("String")));
		b.add_field("Foo", FieldDecl::new("c", Type::named("Int")));
		a.merge(&b);
		let fields: Vec<String> = a.types["Foo"].values().map(|f| f.to_string()).collect();
		assert_eq!(fields, vec!["a: String", "b: Int", "c: Int"]);
	}
}
