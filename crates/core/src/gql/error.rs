use thiserror::Error;

use crate::err::Error;

/// An error raised while building or serving the GraphQL schema
#[derive(Debug, Error)]
pub enum GqlError {
	#[error(transparent)]
	Db(#[from] Error),
	#[error("Invalid schema: {0}")]
	Schema(String),
	#[error("Internal error: {0}")]
	Internal(String),
}

pub fn schema_error(msg: impl Into<String>) -> GqlError {
	GqlError::Schema(msg.into())
}

/// Logs and wraps a failure which points at a bug rather than bad input
pub fn internal_error(msg: impl Into<String>) -> GqlError {
	let msg = msg.into();
	error!("{msg}");
	GqlError::Internal(msg)
}

// Resolver errors reach clients as plain messages.

impl From<GqlError> for async_graphql::Error {
	fn from(value: GqlError) -> Self {
		async_graphql::Error::new(value.to_string())
	}
}

impl From<Error> for async_graphql::Error {
	fn from(value: Error) -> Self {
		async_graphql::Error::new(value.to_string())
	}
}
