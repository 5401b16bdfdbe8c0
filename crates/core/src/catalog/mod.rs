//! The schema graph read from a database catalog.
//!
//! A [`SchemaGraph`] holds one [`TableNode`] per table. Every foreign key
//! is recorded twice: as a [`ForeignRef`] on the owning column, and as a
//! [`ReverseRelation`] on the referenced table. [`SchemaGraph::link`] is the
//! only way to add either, so the two directions never drift apart.

mod dialect;
mod reader;

use std::collections::BTreeMap;
use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::err::Error;

pub use self::dialect::{Dialect, OutputType};
pub use self::reader::read_schema;

/// The table referenced by a foreign key column
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ForeignRef {
	pub schema: String,
	pub table: String,
	pub column: String,
}

/// The attributes of a single column
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ColumnAttrs {
	pub data_type: String,
	pub nullable: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub foreign: Option<ForeignRef>,
}

impl ColumnAttrs {
	pub fn new(data_type: impl Into<String>, nullable: bool) -> Self {
		Self {
			data_type: data_type.into(),
			nullable,
			foreign: None,
		}
	}
}

/// An inbound foreign key, seen from the referenced table
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ReverseRelation {
	/// The table which holds the foreign key
	pub foreign_table: String,
	/// The foreign key column on that table
	pub foreign_column: String,
	/// The column of this table which the foreign key references
	pub local_column: String,
}

/// A relation field exposed on the type of a table
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Relation {
	/// Many-to-one: `column` of this table references `target_column` of `target`
	Forward {
		field: String,
		column: String,
		target: String,
		target_column: String,
	},
	/// One-to-many: rows of `table` whose `column` references `local_column` of this table
	Reverse {
		field: String,
		table: String,
		column: String,
		local_column: String,
	},
}

impl Relation {
	/// The name of the field which exposes this relation
	pub fn field(&self) -> &str {
		match self {
			Relation::Forward {
				field,
				..
			}
			| Relation::Reverse {
				field,
				..
			} => field,
		}
	}
	/// The table on the other side of this relation
	pub fn target(&self) -> &str {
		match self {
			Relation::Forward {
				target,
				..
			} => target,
			Relation::Reverse {
				table,
				..
			} => table,
		}
	}
}

/// A single table of the schema graph
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TableNode {
	pub name: String,
	pub primary_key: Option<String>,
	pub columns: IndexMap<String, ColumnAttrs>,
	pub reverse_relations: Vec<ReverseRelation>,
}

impl TableNode {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Default::default()
		}
	}

	pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
		self.primary_key = Some(column.into());
		self
	}

	pub fn with_column(mut self, name: impl Into<String>, attrs: ColumnAttrs) -> Self {
		self.columns.insert(name.into(), attrs);
		self
	}

	/// Computes the relation fields of this table.
	///
	/// Forward relations are named `<column>_<target>`. Reverse relations are
	/// named after the referencing table, or `<table>_<column>` when that name
	/// is already taken by a column or an earlier field. Any name which is still
	/// taken gets underscores appended until it is free.
	pub fn relations(&self) -> Vec<Relation> {
		let mut taken: HashSet<String> = self.columns.keys().cloned().collect();
		let mut out = Vec::with_capacity(self.reverse_relations.len());
		for (column, attrs) in self.columns.iter() {
			if let Some(fk) = &attrs.foreign {
				let field = claim(&mut taken, format!("{column}_{}", fk.table), None);
				out.push(Relation::Forward {
					field,
					column: column.clone(),
					target: fk.table.clone(),
					target_column: fk.column.clone(),
				});
			}
		}
		for rev in self.reverse_relations.iter() {
			let fallback = format!("{}_{}", rev.foreign_table, rev.foreign_column);
			let field = claim(&mut taken, rev.foreign_table.clone(), Some(fallback));
			out.push(Relation::Reverse {
				field,
				table: rev.foreign_table.clone(),
				column: rev.foreign_column.clone(),
				local_column: rev.local_column.clone(),
			});
		}
		out
	}

	/// Finds a relation by the name of its field
	pub fn relation(&self, field: &str) -> Option<Relation> {
		self.relations().into_iter().find(|r| r.field() == field)
	}
}

fn claim(taken: &mut HashSet<String>, name: String, fallback: Option<String>) -> String {
	let mut name = match fallback {
		Some(fallback) if taken.contains(&name) => fallback,
		_ => name,
	};
	while taken.contains(&name) {
		name.push('_');
	}
	taken.insert(name.clone());
	name
}

/// The normalized schema of one database namespace
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SchemaGraph {
	pub namespace: String,
	tables: BTreeMap<String, TableNode>,
}

impl SchemaGraph {
	pub fn new(namespace: impl Into<String>) -> Self {
		Self {
			namespace: namespace.into(),
			tables: BTreeMap::new(),
		}
	}

	/// Adds a table node, replacing any table of the same name
	pub fn insert(&mut self, node: TableNode) {
		self.tables.insert(node.name.clone(), node);
	}

	/// Records a foreign key in both directions.
	///
	/// The owning column gets its [`ForeignRef`], and the referenced table
	/// gets a matching [`ReverseRelation`]. Both tables must already exist.
	pub fn link(&mut self, table: &str, column: &str, target: ForeignRef) -> Result<(), Error> {
		if !self.tables.contains_key(&target.table) {
			return Err(Error::TableNotFound(target.table));
		}
		let owner = self.tables.get_mut(table).ok_or_else(|| Error::TableNotFound(table.to_owned()))?;
		let attrs = owner.columns.get_mut(column).ok_or_else(|| Error::ColumnNotFound {
			table: table.to_owned(),
			column: column.to_owned(),
		})?;
		let reverse = ReverseRelation {
			foreign_table: table.to_owned(),
			foreign_column: column.to_owned(),
			local_column: target.column.clone(),
		};
		let referenced = target.table.clone();
		attrs.foreign = Some(target);
		if let Some(node) = self.tables.get_mut(&referenced) {
			if !node.reverse_relations.contains(&reverse) {
				node.reverse_relations.push(reverse);
			}
		}
		Ok(())
	}

	pub fn table(&self, name: &str) -> Option<&TableNode> {
		self.tables.get(name)
	}

	/// Fetches a table, failing when it is not part of the graph
	pub fn get(&self, name: &str) -> Result<&TableNode, Error> {
		self.tables.get(name).ok_or_else(|| Error::TableNotFound(name.to_owned()))
	}

	/// Iterates the tables in name order
	pub fn tables(&self) -> impl Iterator<Item = &TableNode> {
		self.tables.values()
	}

	pub fn len(&self) -> usize {
		self.tables.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tables.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn fk(table: &str, column: &str) -> ForeignRef {
		ForeignRef {
			schema: "public".to_owned(),
			table: table.to_owned(),
			column: column.to_owned(),
		}
	}

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
		graph.link("bar", "bar", fk("foo", "bar")).unwrap();
		graph
	}

	#[test]
	fn link_is_bidirectional() {
		let graph = scenario();
		let bar = graph.table("bar").unwrap();
		assert_eq!(bar.columns["bar"].foreign, Some(fk("foo", "bar")));
		let foo = graph.table("foo").unwrap();
		assert_eq!(
			foo.reverse_relations,
			vec![ReverseRelation {
				foreign_table: "bar".to_owned(),
				foreign_column: "bar".to_owned(),
				local_column: "bar".to_owned(),
			}]
		);
	}

	#[test]
	fn every_forward_edge_has_a_reverse_edge() {
		let graph = scenario();
		for node in graph.tables() {
			for (column, attrs) in node.columns.iter() {
				if let Some(fk) = &attrs.foreign {
					let target = graph.table(&fk.table).unwrap();
					assert!(
						target
							.reverse_relations
							.iter()
							.any(|r| r.foreign_table == node.name && &r.foreign_column == column)
					);
				}
			}
		}
	}

	#[test]
	fn link_requires_both_tables() {
		let mut graph = scenario();
		assert!(matches!(
			graph.link("bar", "bar", fk("missing", "id")),
			Err(Error::TableNotFound(t)) if t == "missing"
		));
		assert!(matches!(
			graph.link("bar", "nope", fk("foo", "bar")),
			Err(Error::ColumnNotFound { .. })
		));
	}

	#[test]
	fn linking_twice_keeps_one_reverse_entry() {
		let mut graph = scenario();
		graph.link("bar", "bar", fk("foo", "bar")).unwrap();
		assert_eq!(graph.table("foo").unwrap().reverse_relations.len(), 1);
	}

	#[test]
	fn relation_names_avoid_columns() {
		let graph = scenario();
		let bar = graph.table("bar").unwrap();
		assert_eq!(bar.relations()[0].field(), "bar_foo");
		// `foo` already has a `bar` column, so the reverse field takes the column suffix
		let foo = graph.table("foo").unwrap();
		assert_eq!(foo.relations()[0].field(), "bar_bar");
		assert!(foo.relation("bar_bar").is_some());
		assert!(foo.relation("bar").is_none());
	}

	#[test]
	fn two_foreign_keys_to_one_table_get_distinct_names() {
		let mut graph = SchemaGraph::new("public");
		graph.insert(
			TableNode::new("person")
				.with_primary_key("id")
				.with_column("id", ColumnAttrs::new("integer", false)),
		);
		graph.insert(
			TableNode::new("message")
				.with_primary_key("id")
				.with_column("id", ColumnAttrs::new("integer", false))
				.with_column("sender", ColumnAttrs::new("integer", false))
				.with_column("recipient", ColumnAttrs::new("integer", false)),
		);
		graph.link("message", "sender", fk("person", "id")).unwrap();
		graph.link("message", "recipient", fk("person", "id")).unwrap();
		let fields: Vec<_> =
			graph.table("message").unwrap().relations().iter().map(|r| r.field().to_owned()).collect();
		assert_eq!(fields, vec!["sender_person", "recipient_person"]);
		let fields: Vec<_> =
			graph.table("person").unwrap().relations().iter().map(|r| r.field().to_owned()).collect();
		assert_eq!(fields, vec!["message", "message_recipient"]);
	}

	#[test]
	fn self_reference_produces_both_fields() {
		let mut graph = SchemaGraph::new("public");
		graph.insert(
			TableNode::new("node")
				.with_primary_key("id")
				.with_column("id", ColumnAttrs::new("integer", false))
				.with_column("parent", ColumnAttrs::new("integer", true)),
		);
		graph.link("node", "parent", fk("node", "id")).unwrap();
		let fields: Vec<_> =
			graph.table("node").unwrap().relations().iter().map(|r| r.field().to_owned()).collect();
		assert_eq!(fields, vec!["parent_node", "node"]);
	}
}
