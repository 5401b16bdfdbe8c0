use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ColumnAttrs;
use crate::err::Error;

/// The GraphQL scalar a column is exposed as
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum OutputType {
	Boolean,
	Int,
	Float,
	String,
}

impl OutputType {
	pub fn as_str(&self) -> &'static str {
		match self {
			OutputType::Boolean => "Boolean",
			OutputType::Int => "Int",
			OutputType::Float => "Float",
			OutputType::String => "String",
		}
	}
}

impl fmt::Display for OutputType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The SQL dialect of a database, which decides how column types are mapped
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
	Postgres,
	Mssql,
	Mysql,
}

impl Dialect {
	/// Looks up a catalog data type in this dialect's type table
	pub fn map_type(&self, data_type: &str) -> Option<OutputType> {
		use OutputType::*;
		match self {
			Dialect::Postgres => match data_type {
				"boolean" => Some(Boolean),
				"numeric" => Some(Float),
				"integer" | "bigint" => Some(Int),
				"timestamp with time zone" | "character varying" | "text" | "USER-DEFINED" => {
					Some(String)
				}
				_ => None,
			},
			Dialect::Mssql => match data_type {
				"bit" => Some(Boolean),
				"numeric" | "float" | "real" | "decimal" => Some(Float),
				"int" | "tinyint" | "smallint" | "bigint" => Some(Int),
				"timestamp with time zone" | "char" | "varchar" | "text" | "nchar" | "nvarchar"
				| "ntext" | "binary" | "varbinary" | "bytea" | "USER-DEFINED" => Some(String),
				_ => None,
			},
			Dialect::Mysql => match data_type {
				"tinyint" => Some(Boolean),
				"numeric" => Some(Float),
				"int" | "bigint" => Some(Int),
				"timestamp with time zone" | "varchar" | "text" | "USER-DEFINED" => Some(String),
				_ => None,
			},
		}
	}

	/// Maps a column to its output type, failing on types outside the dialect's table
	pub fn map_column_type(&self, column: &str, attrs: &ColumnAttrs) -> Result<OutputType, Error> {
		self.map_type(&attrs.data_type).ok_or_else(|| Error::UnknownColumnType {
			column: column.to_owned(),
			data_type: attrs.data_type.clone(),
		})
	}

	/// Every data type this dialect knows about
	pub fn known_types(&self) -> &'static [&'static str] {
		match self {
			Dialect::Postgres => &[
				"boolean",
				"numeric",
				"integer",
				"bigint",
				"timestamp with time zone",
				"character varying",
				"text",
				"USER-DEFINED",
			],
			Dialect::Mssql => &[
				"bit",
				"numeric",
				"float",
				"real",
				"decimal",
				"int",
				"tinyint",
				"smallint",
				"bigint",
				"timestamp with time zone",
				"char",
				"varchar",
				"text",
				"nchar",
				"nvarchar",
				"ntext",
				"binary",
				"varbinary",
				"bytea",
				"USER-DEFINED",
			],
			Dialect::Mysql => &[
				"tinyint",
				"numeric",
				"int",
				"bigint",
				"timestamp with time zone",
				"varchar",
				"text",
				"USER-DEFINED",
			],
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Dialect::Postgres => "postgres",
			Dialect::Mssql => "mssql",
			Dialect::Mysql => "mysql",
		}
	}
}

impl FromStr for Dialect {
	type Err = Error;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"pg" | "postgres" | "postgresql" => Ok(Dialect::Postgres),
			"mssql" | "sqlserver" => Ok(Dialect::Mssql),
			"mysql" | "mysql2" => Ok(Dialect::Mysql),
			_ => Err(Error::UnsupportedClient(s.to_owned())),
		}
	}
}

impl fmt::Display for Dialect {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
