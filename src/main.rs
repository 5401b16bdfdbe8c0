//! This binary is the command-line tool and GraphQL server of db2gql.
//!
//! It introspects a relational database through `db2gql-core`, and either
//! prints the generated schema or serves the generated API over HTTP.

#[macro_use]
extern crate tracing;

mod cli;
mod cnf;
mod err;
mod net;
mod telemetry;

use std::process::ExitCode;

fn main() -> ExitCode {
	cli::init()
}
