//! The capabilities the core needs from a database.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use super::Query;
use super::ddl::{AlterOp, TableDef};
use crate::catalog::Dialect;
use crate::err::Error;
use crate::val::{Row, Value};

/// A column as reported by the database catalog
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
	pub name: String,
	pub nullable: bool,
	pub data_type: String,
}

/// A foreign key constraint as reported by the database catalog
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
	pub column: String,
	pub foreign_schema: String,
	pub foreign_table: String,
	pub foreign_column: String,
}

/// A connection to a relational database.
///
/// Implementations answer catalog queries for the schema reader, run the
/// table reads and writes issued by the resolvers, and pass DDL through for
/// host applications. Every method is a suspension point; none of them
/// retry on failure.
#[async_trait::async_trait]
pub trait Adapter: Debug + Send + Sync {
	/// The name of the adapter, used in errors and logs
	fn kind(&self) -> &'static str;

	/// The dialect whose type table applies to the catalog of this database
	fn dialect(&self) -> Dialect;

	/// Lists the tables of a namespace, leaving out the excluded ones
	async fn tables(&self, namespace: &str, exclude: &[String]) -> Result<Vec<String>, Error>;

	/// Fetches the primary key column of a table, if it has one
	async fn primary_key(&self, namespace: &str, table: &str) -> Result<Option<String>, Error>;

	/// Fetches the columns of a table in declaration order
	async fn columns(&self, namespace: &str, table: &str) -> Result<Vec<ColumnInfo>, Error>;

	/// Fetches the foreign key constraints declared on a table
	async fn foreign_keys(&self, namespace: &str, table: &str) -> Result<Vec<ForeignKeyInfo>, Error>;

	/// Runs a read and returns the matching rows
	async fn select(&self, query: &Query) -> Result<Vec<Row>, Error>;

	/// Counts the rows matching a read, ignoring its pagination
	async fn count(&self, query: &Query) -> Result<u64, Error>;

	/// Fetches the first row matching a read
	async fn first(&self, query: &Query) -> Result<Option<Row>, Error> {
		let query = query.clone().limit(1);
		Ok(self.select(&query).await?.into_iter().next())
	}

	/// Inserts a row, returning the value of the `returning` column as stored
	async fn insert(&self, table: &str, row: &Row, returning: &str) -> Result<Value, Error>;

	/// Updates the row whose `key_column` equals `key`, returning the number of rows changed
	async fn update(&self, table: &str, key_column: &str, key: &Value, row: &Row) -> Result<u64, Error>;

	/// Runs a raw statement with `?` placeholders
	async fn raw(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error>;

	async fn create_table(&self, table: &TableDef) -> Result<(), Error>;

	async fn drop_table(&self, table: &str) -> Result<(), Error>;

	async fn alter_table(&self, table: &str, ops: &[AlterOp]) -> Result<(), Error>;
}
