//! The database adapter layer.
//!
//! The core talks to a database only through the [`Adapter`] trait. These
//! adapters ship with the crate:
//! - `memory`: an in-memory relational store, used for tests and demos
//! - `postgres`: [PostgreSQL](https://www.postgresql.org/) through a `sqlx`
//!   connection pool, behind the `sql-postgres` feature
//! - `mssql`: SQL Server through a pool of `tiberius` clients, behind the
//!   `sql-mssql` feature
//!
//! Host applications may plug in their own [`Adapter`] implementation.

mod api;
mod ddl;
mod ds;
mod query;

pub mod mem;
pub mod sql;
pub mod tsql;

#[cfg(feature = "sql-mssql")]
mod mssql;
#[cfg(feature = "sql-postgres")]
mod postgres;

pub use self::api::{Adapter, ColumnInfo, ForeignKeyInfo};
pub use self::ddl::{AlterOp, ColumnDef, TableDef};
pub use self::ds::{Connection, Datastore, Descriptor};
pub use self::query::Query;
