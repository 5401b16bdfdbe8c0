#![cfg(feature = "sql-mssql")]

//! The SQL Server adapter, backed by a fixed pool of `tiberius` clients.

use std::sync::atomic::{AtomicUsize, Ordering};

use tiberius::{Client, ColumnData, Config, ToSql};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::catalog::Dialect;
use crate::cnf::POOL_MAX_CONNECTIONS;
use crate::err::Error;
use crate::kvs::Query;
use crate::kvs::api::{Adapter, ColumnInfo, ForeignKeyInfo};
use crate::kvs::ddl::{AlterOp, TableDef};
use crate::kvs::{sql, tsql};
use crate::val::{Row, Value};

const TABLES: &str = "SELECT table_name FROM information_schema.tables WHERE table_schema = @P1 AND table_type = 'BASE TABLE'";

const PRIMARY_KEY: &str = "SELECT TOP (1) kcu.column_name \
	FROM information_schema.table_constraints tc \
	JOIN information_schema.key_column_usage kcu \
	ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
	WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = @P1 AND tc.table_name = @P2 AND kcu.table_name = @P2 \
	ORDER BY kcu.ordinal_position";

const COLUMNS: &str = "SELECT column_name, is_nullable, data_type \
	FROM information_schema.columns \
	WHERE table_schema = @P1 AND table_name = @P2 \
	ORDER BY ordinal_position";

const FOREIGN_KEYS: &str = "SELECT tc.name, schema_name(fk_tab.schema_id), OBJECT_NAME(fk.referenced_object_id), fc.name \
	FROM sys.foreign_key_columns fk \
	LEFT JOIN sys.columns tc ON tc.object_id = fk.parent_object_id AND tc.column_id = fk.parent_column_id \
	LEFT JOIN sys.columns fc ON fc.object_id = fk.referenced_object_id AND fc.column_id = fk.referenced_column_id \
	INNER JOIN sys.tables pk_tab ON pk_tab.object_id = fk.parent_object_id \
	INNER JOIN sys.tables fk_tab ON fk_tab.object_id = fk.referenced_object_id \
	WHERE schema_name(pk_tab.schema_id) = @P1 AND OBJECT_NAME(fk.parent_object_id) = @P2";

type Connection = Client<Compat<TcpStream>>;

pub struct Datastore {
	clients: Vec<Mutex<Connection>>,
	next: AtomicUsize,
	schema: String,
}

impl std::fmt::Debug for Datastore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Datastore")
			.field("clients", &self.clients.len())
			.field("schema", &self.schema)
			.finish()
	}
}

impl Datastore {
	/// Open a new connection pool from an ADO.NET or JDBC connection string
	pub(crate) async fn new(url: &str, schema: &str) -> Result<Datastore, Error> {
		let config = match url.strip_prefix("jdbc:") {
			Some(_) => Config::from_jdbc_string(url)?,
			None => Config::from_ado_string(url)?,
		};
		let size = (*POOL_MAX_CONNECTIONS).max(1) as usize;
		let mut clients = Vec::with_capacity(size);
		for _ in 0..size {
			clients.push(Mutex::new(connect(config.clone()).await?));
		}
		Ok(Datastore {
			clients,
			next: AtomicUsize::new(0),
			schema: schema.to_owned(),
		})
	}

	/// Takes an idle client, or waits for the next one in turn
	async fn client(&self) -> tokio::sync::MutexGuard<'_, Connection> {
		for client in self.clients.iter() {
			if let Ok(guard) = client.try_lock() {
				return guard;
			}
		}
		let n = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
		self.clients[n].lock().await
	}

	async fn fetch(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<tiberius::Row>, Error> {
		trace!("Executing: {sql}");
		let mut client = self.client().await;
		Ok(client.query(sql, params).await?.into_first_result().await?)
	}

	async fn fetch_json(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, Error> {
		self.fetch(sql, params)
			.await?
			.iter()
			.map(|r| -> Result<Row, Error> {
				let text = r.try_get::<&str, _>(0)?.unwrap_or("{}");
				Ok(serde_json::from_str(text)?)
			})
			.collect()
	}

	async fn fetch_strings(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Vec<String>>, Error> {
		self.fetch(sql, params)
			.await?
			.iter()
			.map(|r| -> Result<Vec<String>, Error> {
				(0..r.len())
					.map(|i| -> Result<String, Error> {
						Ok(r.try_get::<&str, _>(i)?.unwrap_or_default().to_owned())
					})
					.collect()
			})
			.collect()
	}

	async fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<u64, Error> {
		trace!("Executing: {sql}");
		let mut client = self.client().await;
		Ok(client.execute(sql, params).await?.total())
	}
}

async fn connect(config: Config) -> Result<Connection, Error> {
	let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| Error::Ds(e.to_string()))?;
	tcp.set_nodelay(true).map_err(|e| Error::Ds(e.to_string()))?;
	Ok(Client::connect(config, tcp.compat_write()).await?)
}

/// Converts a returned cell into JSON
fn cell(data: &ColumnData<'_>) -> Value {
	match data {
		ColumnData::U8(v) => v.map(Value::from),
		ColumnData::I16(v) => v.map(Value::from),
		ColumnData::I32(v) => v.map(Value::from),
		ColumnData::I64(v) => v.map(Value::from),
		ColumnData::F32(v) => v.map(Value::from),
		ColumnData::F64(v) => v.map(Value::from),
		ColumnData::Bit(v) => v.map(Value::from),
		ColumnData::String(v) => v.as_deref().map(Value::from),
		ColumnData::Guid(v) => v.as_ref().map(|g| Value::from(g.to_string())),
		ColumnData::Numeric(v) => v.as_ref().map(|n| {
			let text = n.to_string();
			text.parse::<serde_json::Number>().map(Value::Number).unwrap_or(Value::String(text))
		}),
		_ => None,
	}
	.unwrap_or_default()
}

#[async_trait::async_trait]
impl Adapter for Datastore {
	fn kind(&self) -> &'static str {
		"mssql"
	}

	fn dialect(&self) -> Dialect {
		Dialect::Mssql
	}

	async fn tables(&self, namespace: &str, exclude: &[String]) -> Result<Vec<String>, Error> {
		let sql = format!(
			"{TABLES} {} ORDER BY table_name",
			tsql::number_placeholders(&sql::exclude_condition(exclude), 2)
		);
		let mut params: Vec<&dyn ToSql> = vec![&namespace];
		for table in exclude {
			params.push(table);
		}
		let rows = self.fetch_strings(&sql, &params).await?;
		Ok(rows.into_iter().filter_map(|r| r.into_iter().next()).collect())
	}

	async fn primary_key(&self, namespace: &str, table: &str) -> Result<Option<String>, Error> {
		let rows = self.fetch_strings(PRIMARY_KEY, &[&namespace, &table]).await?;
		Ok(rows.into_iter().next().and_then(|r| r.into_iter().next()))
	}

	async fn columns(&self, namespace: &str, table: &str) -> Result<Vec<ColumnInfo>, Error> {
		let rows = self.fetch_strings(COLUMNS, &[&namespace, &table]).await?;
		Ok(rows
			.into_iter()
			.filter_map(|r| match <[String; 3]>::try_from(r) {
				Ok([name, nullable, data_type]) => Some(ColumnInfo {
					name,
					nullable: nullable == "YES",
					data_type,
				}),
				Err(_) => None,
			})
			.collect())
	}

	async fn foreign_keys(&self, namespace: &str, table: &str) -> Result<Vec<ForeignKeyInfo>, Error> {
		let rows = self.fetch_strings(FOREIGN_KEYS, &[&namespace, &table]).await?;
		Ok(rows
			.into_iter()
			.filter_map(|r| match <[String; 4]>::try_from(r) {
				Ok([column, foreign_schema, foreign_table, foreign_column]) => Some(ForeignKeyInfo {
					column,
					foreign_schema,
					foreign_table,
					foreign_column,
				}),
				Err(_) => None,
			})
			.collect())
	}

	async fn select(&self, query: &Query) -> Result<Vec<Row>, Error> {
		self.fetch_json(&tsql::select(&self.schema, query)?, &[]).await
	}

	async fn count(&self, query: &Query) -> Result<u64, Error> {
		let rows = self.fetch(&tsql::count(&self.schema, &query.unpaginated())?, &[]).await?;
		let count = match rows.first() {
			Some(row) => row.try_get::<i64, _>(0)?.unwrap_or_default(),
			None => 0,
		};
		Ok(count.max(0) as u64)
	}

	async fn insert(&self, table: &str, row: &Row, returning: &str) -> Result<Value, Error> {
		let columns: Vec<&String> = row.keys().collect();
		let sql = tsql::insert(&self.schema, table, &columns, returning);
		let doc = serde_json::to_string(row)?;
		let rows = match columns.is_empty() {
			true => self.fetch(&sql, &[]).await?,
			false => self.fetch(&sql, &[&doc]).await?,
		};
		Ok(rows.first().and_then(|r| r.cells().next().map(|(_, data)| cell(data))).unwrap_or_default())
	}

	async fn update(&self, table: &str, key_column: &str, key: &Value, row: &Row) -> Result<u64, Error> {
		let columns: Vec<&String> = row.keys().filter(|c| c.as_str() != key_column).collect();
		if columns.is_empty() {
			return Ok(0);
		}
		let sql = tsql::update(&self.schema, table, key_column, &columns);
		let mut doc = row.clone();
		doc.insert(key_column.to_owned(), key.clone());
		let doc = serde_json::to_string(&doc)?;
		self.execute(&sql, &[&doc]).await
	}

	async fn raw(&self, statement: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
		let params: Vec<String> = params
			.iter()
			.map(|v| match v {
				Value::String(s) => s.clone(),
				v => v.to_string(),
			})
			.collect();
		let statement = sql::inline_params(statement, &params)?;
		let lead = statement.trim_start().to_ascii_lowercase();
		if lead.starts_with("select") || lead.starts_with("with") {
			self.fetch_json(&tsql::wrap_raw(&statement), &[]).await
		} else {
			self.execute(&statement, &[]).await?;
			Ok(Vec::new())
		}
	}

	async fn create_table(&self, table: &TableDef) -> Result<(), Error> {
		self.execute(&tsql::create_table(&self.schema, table), &[]).await.map(|_| ())
	}

	async fn drop_table(&self, table: &str) -> Result<(), Error> {
		self.execute(&tsql::drop_table(&self.schema, table), &[]).await.map(|_| ())
	}

	async fn alter_table(&self, table: &str, ops: &[AlterOp]) -> Result<(), Error> {
		for op in ops {
			self.execute(&tsql::alter_table(&self.schema, table, op), &[]).await?;
		}
		Ok(())
	}
}
