//! # db2gql core
//!
//! This crate turns the catalog of a relational database into a GraphQL API.
//! It reads tables, columns, primary keys and foreign keys into a [`catalog::SchemaGraph`],
//! compiles that graph into a schema description, and builds the resolvers which serve
//! paginated listing, single row lookups, upserts and relation traversal.
//!
//! The [`dbs::Db2Graphql`] facade ties the pieces together:
//!
//! ```no_run
//! # async fn run() -> Result<(), db2gql_core::err::Error> {
//! use db2gql_core::dbs::Db2Graphql;
//! use db2gql_core::kvs::Descriptor;
//!
//! let descriptor = Descriptor::memory();
//! let api = Db2Graphql::connect(descriptor).await?;
//! println!("{}", api.get_sdl(false).await?);
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate tracing;

#[macro_use]
mod mac;

pub mod catalog;
pub mod cnf;
pub mod dbs;
pub mod err;
pub mod expr;
pub mod gql;
pub mod kvs;
pub mod val;
