use std::io::Error as IoError;

use db2gql_core::gql::error::GqlError;
use serde_json::Error as JsonError;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
	#[error("{0}")]
	Db(#[from] db2gql_core::err::Error),

	#[error("Couldn't build the GraphQL schema: {0}")]
	Schema(#[from] GqlError),

	#[error("Couldn't read the connection file `{path}`: {error}")]
	Config {
		path: String,
		error: JsonError,
	},

	#[error("Couldn't set up the tracing subscriber: {0}")]
	Telemetry(String),

	#[error("There was an I/O error: {0}")]
	Io(#[from] IoError),
}
