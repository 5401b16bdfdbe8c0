//! Table definitions for the schema builder passthrough.

use serde::{Deserialize, Serialize};

/// A column of a table definition
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
	pub name: String,
	pub data_type: String,
	#[serde(default = "default_nullable")]
	pub nullable: bool,
	#[serde(default)]
	pub primary: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub references: Option<(String, String)>,
}

fn default_nullable() -> bool {
	true
}

impl ColumnDef {
	pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			data_type: data_type.into(),
			nullable: true,
			primary: false,
			references: None,
		}
	}

	/// Marks the column as the primary key, which also makes it not nullable
	pub fn primary(mut self) -> Self {
		self.primary = true;
		self.nullable = false;
		self
	}

	pub fn not_null(mut self) -> Self {
		self.nullable = false;
		self
	}

	/// Adds a foreign key to `table.column`
	pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
		self.references = Some((table.into(), column.into()));
		self
	}
}

/// A `CREATE TABLE` definition
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
	pub name: String,
	pub columns: Vec<ColumnDef>,
}

impl TableDef {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			columns: Vec::new(),
		}
	}

	pub fn column(mut self, column: ColumnDef) -> Self {
		self.columns.push(column);
		self
	}

	pub fn primary_key(&self) -> Option<&str> {
		self.columns.iter().find(|c| c.primary).map(|c| c.name.as_str())
	}
}

/// A single `ALTER TABLE` change
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AlterOp {
	AddColumn(ColumnDef),
	DropColumn(String),
	Unique(Vec<String>),
	Index(Vec<String>),
	Foreign {
		column: String,
		table: String,
		target: String,
	},
}
