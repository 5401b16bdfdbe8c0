use std::sync::Arc;

use serde_json::Error as JsonError;
use thiserror::Error;

/// An error originating from catalog introspection, schema compilation or request resolution.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
	/// The connection descriptor names a database client which is not known
	#[error("Unsupported database client: `{0}`")]
	UnsupportedClient(String),

	/// The database client is known, but its adapter is not available in this build
	#[error("Cannot connect to the `{0}` database as it is not enabled in this build")]
	ClientNotEnabled(String),

	/// The connection descriptor is missing connection details
	#[error("Missing connection details: {0}")]
	MissingConnection(String),

	/// A metadata query failed while reading the database catalog
	#[error("Unable to read the schema of namespace `{namespace}`: {message}")]
	Introspection {
		namespace: String,
		message: String,
	},

	/// A column has a data type which the dialect does not map to an output type
	#[error("Undefined column type: {data_type} of column {column}")]
	UnknownColumnType {
		column: String,
		data_type: String,
	},

	/// A filter clause does not contain a supported operator
	#[error("Filter operation not suported in: {0}")]
	InvalidFilter(String),

	/// A pagination parameter is malformed
	#[error("Pagination parameter not supported in: {0}")]
	InvalidPagination(String),

	/// A type expression could not be parsed
	#[error("Invalid type expression: `{0}`")]
	InvalidType(String),

	/// The table does not exist in the introspected schema
	#[error("The table `{0}` does not exist")]
	TableNotFound(String),

	/// The table exists but has no primary key
	#[error("The table `{0}` does not have a primary key")]
	NoPrimaryKey(String),

	/// The table already exists
	#[error("The table `{0}` already exists")]
	TableExists(String),

	/// The column does not exist on the table
	#[error("The column `{column}` does not exist on table `{table}`")]
	ColumnNotFound {
		table: String,
		column: String,
	},

	/// A row with the same primary key is already stored
	#[error("Duplicate key `{key}` in table `{table}`")]
	DuplicateKey {
		table: String,
		key: String,
	},

	/// An override was requested for an operation which does not exist
	#[error("Override not found: {0}")]
	OverrideNotFound(String),

	/// The authorization validator rejected the call
	#[error("Not authorized to resolve `{type_name}.{field}`")]
	Unauthorized {
		type_name: String,
		field: String,
	},

	/// The adapter does not support the requested operation
	#[error("The `{adapter}` adapter does not support {operation}")]
	Unsupported {
		adapter: &'static str,
		operation: &'static str,
	},

	/// A mutation input was not an object
	#[error("Invalid input: {0}")]
	InvalidInput(String),

	/// There was a problem with the underlying database
	#[error("There was a problem with the underlying database: {0}")]
	Ds(String),

	/// There was an error when serializing or deserializing JSON
	#[error("JSON error: {0}")]
	Json(#[from] JsonError),

	/// An error shared by every call of a batched load
	#[error(transparent)]
	Batch(Arc<Error>),
}

#[cfg(feature = "sql-postgres")]
impl From<sqlx::Error> for Error {
	fn from(e: sqlx::Error) -> Error {
		Error::Ds(e.to_string())
	}
}

#[cfg(feature = "sql-mssql")]
impl From<tiberius::error::Error> for Error {
	fn from(e: tiberius::error::Error) -> Error {
		Error::Ds(e.to_string())
	}
}
