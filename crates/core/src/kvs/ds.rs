use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::api::Adapter;
use crate::catalog::Dialect;
use crate::cnf::DEFAULT_NAMESPACE;
use crate::err::Error;

/// Connection details of a database
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Connection {
	#[serde(default, alias = "connectionString")]
	pub url: Option<String>,
	#[serde(default)]
	pub host: Option<String>,
	#[serde(default)]
	pub port: Option<u16>,
	#[serde(default)]
	pub user: Option<String>,
	#[serde(default)]
	pub password: Option<String>,
	#[serde(default)]
	pub database: Option<String>,
}

impl Connection {
	/// Builds the connection url, preferring an explicit url over individual parts
	pub fn url(&self, scheme: &str) -> Result<String, Error> {
		if let Some(url) = &self.url {
			return Ok(url.clone());
		}
		let host = self.host.as_deref().ok_or_else(|| Error::MissingConnection("host".to_owned()))?;
		let mut url = format!("{scheme}://");
		if let Some(user) = &self.user {
			url.push_str(user);
			if let Some(password) = &self.password {
				url.push(':');
				url.push_str(password);
			}
			url.push('@');
		}
		url.push_str(host);
		if let Some(port) = self.port {
			url.push_str(&format!(":{port}"));
		}
		if let Some(database) = &self.database {
			url.push('/');
			url.push_str(database);
		}
		Ok(url)
	}

	/// Builds an ADO.NET connection string, preferring an explicit one over individual parts
	pub fn ado_string(&self) -> Result<String, Error> {
		if let Some(url) = &self.url {
			return Ok(url.clone());
		}
		let host = self.host.as_deref().ok_or_else(|| Error::MissingConnection("host".to_owned()))?;
		let mut out = format!("server=tcp:{host},{}", self.port.unwrap_or(1433));
		for (key, value) in [("user", &self.user), ("password", &self.password), ("database", &self.database)] {
			if let Some(value) = value {
				out.push_str(&format!(";{key}={value}"));
			}
		}
		out.push_str(";TrustServerCertificate=true");
		Ok(out)
	}
}

/// Selects a database adapter, its connection and the tables to leave out.
///
/// This is the shape of the JSON connection file:
///
/// ```json
/// { "client": "pg", "connection": { "url": "postgres://localhost/app" }, "exclude": ["knex_migrations"] }
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
	pub client: String,
	#[serde(default)]
	pub connection: Connection,
	#[serde(default)]
	pub schema: Option<String>,
	#[serde(default)]
	pub exclude: Vec<String>,
}

impl Descriptor {
	/// A descriptor for a fresh in-memory database
	pub fn memory() -> Self {
		Self {
			client: "memory".to_owned(),
			..Default::default()
		}
	}

	/// The namespace to introspect
	pub fn namespace(&self) -> String {
		self.schema.clone().unwrap_or_else(|| DEFAULT_NAMESPACE.clone())
	}
}

/// A connected database together with the settings used to introspect it
#[derive(Clone, Debug)]
pub struct Datastore {
	adapter: Arc<dyn Adapter>,
	namespace: String,
	exclude: Vec<String>,
}

impl Datastore {
	/// Connects to the database the descriptor selects
	pub async fn new(descriptor: &Descriptor) -> Result<Datastore, Error> {
		let namespace = descriptor.namespace();
		let adapter: Arc<dyn Adapter> = match descriptor.client.as_str() {
			"memory" | "mem" => {
				info!("Starting in-memory database");
				Arc::new(super::mem::Datastore::new()) as Arc<dyn Adapter>
			}
			client => match client.parse::<Dialect>()? {
				Dialect::Postgres => {
					#[cfg(feature = "sql-postgres")]
					{
						let url = descriptor.connection.url("postgres")?;
						info!("Connecting to postgres database in namespace `{namespace}`");
						Arc::new(super::postgres::Datastore::new(&url, &namespace).await?) as Arc<dyn Adapter>
					}
					#[cfg(not(feature = "sql-postgres"))]
					return Err(Error::ClientNotEnabled(client.to_owned()));
				}
				Dialect::Mssql => {
					#[cfg(feature = "sql-mssql")]
					{
						let url = descriptor.connection.ado_string()?;
						info!("Connecting to mssql database in namespace `{namespace}`");
						Arc::new(super::mssql::Datastore::new(&url, &namespace).await?) as Arc<dyn Adapter>
					}
					#[cfg(not(feature = "sql-mssql"))]
					return Err(Error::ClientNotEnabled(client.to_owned()));
				}
				Dialect::Mysql => {
					return Err(Error::ClientNotEnabled(client.to_owned()));
				}
			},
		};
		Ok(Datastore {
			adapter,
			namespace,
			exclude: descriptor.exclude.clone(),
		})
	}

	/// Wraps an adapter supplied by the host application
	pub fn from_adapter(adapter: Arc<dyn Adapter>, namespace: impl Into<String>, exclude: Vec<String>) -> Datastore {
		Datastore {
			adapter,
			namespace: namespace.into(),
			exclude,
		}
	}

	pub fn adapter(&self) -> &Arc<dyn Adapter> {
		&self.adapter
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	pub fn exclude(&self) -> &[String] {
		&self.exclude
	}

	pub fn dialect(&self) -> Dialect {
		self.adapter.dialect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_connection_file() {
		let d: Descriptor = serde_json::from_str(
			r#"{"client":"pg","connection":{"host":"db","port":5432,"user":"app","password":"secret","database":"shop"},"exclude":["migrations"]}"#,
		)
		.unwrap();
		assert_eq!(d.connection.url("postgres").unwrap(), "postgres://app:secret@db:5432/shop");
		assert_eq!(d.exclude, vec!["migrations"]);
		assert_eq!(d.namespace(), "public");
	}

	#[test]
	fn explicit_url_wins() {
		let c = Connection {
			url: Some("postgres://x/y".to_owned()),
			host: Some("ignored".to_owned()),
			..Default::default()
		};
		assert_eq!(c.url("postgres").unwrap(), "postgres://x/y");
		assert!(matches!(Connection::default().url("postgres"), Err(Error::MissingConnection(_))));
	}

	#[test]
	fn builds_ado_strings_from_parts() {
		let c = Connection {
			host: Some("db".to_owned()),
			user: Some("sa".to_owned()),
			password: Some("secret".to_owned()),
			database: Some("shop".to_owned()),
			..Default::default()
		};
		assert_eq!(
			c.ado_string().unwrap(),
			"server=tcp:db,1433;user=sa;password=secret;database=shop;TrustServerCertificate=true"
		);
		let c = Connection {
			url: Some("server=tcp:x,1;user=u".to_owned()),
			..Default::default()
		};
		assert_eq!(c.ado_string().unwrap(), "server=tcp:x,1;user=u");
	}

	#[tokio::test]
	async fn selects_adapters_by_client() {
		let ds = Datastore::new(&Descriptor::memory()).await.unwrap();
		assert_eq!(ds.adapter().kind(), "memory");
		let mut d = Descriptor::memory();
		d.client = "oracle".to_owned();
		assert!(matches!(Datastore::new(&d).await, Err(Error::UnsupportedClient(_))));
		d.client = "mysql".to_owned();
		assert!(matches!(Datastore::new(&d).await, Err(Error::ClientNotEnabled(_))));
	}
}
