use std::path::PathBuf;

use clap::Args;
use db2gql_core::kvs::Descriptor;

use crate::err::Error;

/// The flags which select the database to introspect
#[derive(Args, Debug, Default)]
pub struct ConnectionArguments {
	#[arg(help = "Path to a JSON connection file")]
	#[arg(env = "DB2GQL_CONFIG", short = 'c', long = "config")]
	pub config: Option<PathBuf>,
	#[arg(help = "The database client: pg, mssql, mysql or memory")]
	#[arg(env = "DB2GQL_CLIENT", long)]
	pub client: Option<String>,
	#[arg(help = "The connection url of the database")]
	#[arg(env = "DB2GQL_URL", long)]
	pub url: Option<String>,
	#[arg(help = "The database schema to introspect")]
	#[arg(env = "DB2GQL_SCHEMA", long)]
	pub schema: Option<String>,
	#[arg(help = "Comma separated tables to leave out of the API")]
	#[arg(env = "DB2GQL_EXCLUDE", long, value_delimiter = ',')]
	pub exclude: Vec<String>,
}

impl ConnectionArguments {
	/// Builds the connection descriptor, with flags taking precedence over the file
	pub fn descriptor(&self) -> Result<Descriptor, Error> {
		let mut descriptor = match &self.config {
			Some(path) => {
				let text = std::fs::read_to_string(path)?;
				serde_json::from_str(&text).map_err(|error| Error::Config {
					path: path.display().to_string(),
					error,
				})?
			}
			None => Descriptor::memory(),
		};
		if let Some(client) = &self.client {
			descriptor.client = client.clone();
		}
		if let Some(url) = &self.url {
			descriptor.connection.url = Some(url.clone());
		}
		if let Some(schema) = &self.schema {
			descriptor.schema = Some(schema.clone());
		}
		descriptor.exclude.extend(self.exclude.iter().filter(|t| !t.is_empty()).cloned());
		Ok(descriptor)
	}
}
