#![cfg(feature = "sql-postgres")]

//! The PostgreSQL adapter, backed by a `sqlx` connection pool.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row as _};

use crate::catalog::Dialect;
use crate::cnf::POOL_MAX_CONNECTIONS;
use crate::err::Error;
use crate::kvs::Query;
use crate::kvs::api::{Adapter, ColumnInfo, ForeignKeyInfo};
use crate::kvs::ddl::{AlterOp, TableDef};
use crate::kvs::sql;
use crate::val::{Row, Value};

const TABLES: &str = "SELECT table_name::text FROM information_schema.tables WHERE table_schema = $1 AND table_type = 'BASE TABLE'";

const PRIMARY_KEY: &str = "SELECT kcu.column_name::text \
	FROM information_schema.table_constraints tc \
	JOIN information_schema.key_column_usage kcu \
	ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
	WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = $1 AND tc.table_name = $2 \
	ORDER BY kcu.ordinal_position LIMIT 1";

const COLUMNS: &str = "SELECT column_name::text, is_nullable::text, data_type::text \
	FROM information_schema.columns \
	WHERE table_schema = $1 AND table_name = $2 \
	ORDER BY ordinal_position";

const FOREIGN_KEYS: &str = "SELECT kcu.column_name::text, ccu.table_schema::text, ccu.table_name::text, ccu.column_name::text \
	FROM information_schema.table_constraints tc \
	JOIN information_schema.key_column_usage kcu \
	ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
	JOIN information_schema.constraint_column_usage ccu \
	ON ccu.constraint_name = tc.constraint_name AND ccu.constraint_schema = tc.table_schema \
	WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = $1 AND tc.table_name = $2 \
	ORDER BY kcu.ordinal_position";

#[derive(Debug, Clone)]
pub struct Datastore {
	pool: PgPool,
	schema: String,
}

impl Datastore {
	/// Open a new connection pool
	pub(crate) async fn new(url: &str, schema: &str) -> Result<Datastore, Error> {
		let pool = PgPoolOptions::new().max_connections(*POOL_MAX_CONNECTIONS).connect(url).await?;
		Ok(Datastore {
			pool,
			schema: schema.to_owned(),
		})
	}

	async fn fetch_json(&self, sql: &str) -> Result<Vec<Row>, Error> {
		trace!("Executing: {sql}");
		let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
		rows.iter()
			.map(|r| -> Result<Row, Error> {
				let text: String = r.try_get(0)?;
				Ok(serde_json::from_str(&text)?)
			})
			.collect()
	}

	async fn execute(&self, sql: &str) -> Result<u64, Error> {
		trace!("Executing: {sql}");
		Ok(sqlx::query(sql).execute(&self.pool).await?.rows_affected())
	}
}

#[async_trait::async_trait]
impl Adapter for Datastore {
	fn kind(&self) -> &'static str {
		"postgres"
	}

	fn dialect(&self) -> Dialect {
		Dialect::Postgres
	}

	async fn tables(&self, namespace: &str, exclude: &[String]) -> Result<Vec<String>, Error> {
		let sql = format!(
			"{TABLES} {} ORDER BY table_name",
			sql::number_placeholders(&sql::exclude_condition(exclude), 2)
		);
		let mut query = sqlx::query_scalar::<_, String>(&sql).bind(namespace);
		for table in exclude {
			query = query.bind(table);
		}
		Ok(query.fetch_all(&self.pool).await?)
	}

	async fn primary_key(&self, namespace: &str, table: &str) -> Result<Option<String>, Error> {
		Ok(sqlx::query_scalar::<_, String>(PRIMARY_KEY)
			.bind(namespace)
			.bind(table)
			.fetch_optional(&self.pool)
			.await?)
	}

	async fn columns(&self, namespace: &str, table: &str) -> Result<Vec<ColumnInfo>, Error> {
		let rows = sqlx::query_as::<_, (String, String, String)>(COLUMNS)
			.bind(namespace)
			.bind(table)
			.fetch_all(&self.pool)
			.await?;
		Ok(rows
			.into_iter()
			.map(|(name, nullable, data_type)| ColumnInfo {
				name,
				nullable: nullable == "YES",
				data_type,
			})
			.collect())
	}

	async fn foreign_keys(&self, namespace: &str, table: &str) -> Result<Vec<ForeignKeyInfo>, Error> {
		let rows = sqlx::query_as::<_, (String, String, String, String)>(FOREIGN_KEYS)
			.bind(namespace)
			.bind(table)
			.fetch_all(&self.pool)
			.await?;
		Ok(rows
			.into_iter()
			.map(|(column, foreign_schema, foreign_table, foreign_column)| ForeignKeyInfo {
				column,
				foreign_schema,
				foreign_table,
				foreign_column,
			})
			.collect())
	}

	async fn select(&self, query: &Query) -> Result<Vec<Row>, Error> {
		self.fetch_json(&sql::select(&self.schema, query)?).await
	}

	async fn count(&self, query: &Query) -> Result<u64, Error> {
		let sql = sql::count(&self.schema, &query.unpaginated())?;
		trace!("Executing: {sql}");
		let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
		Ok(count.max(0) as u64)
	}

	async fn insert(&self, table: &str, row: &Row, returning: &str) -> Result<Value, Error> {
		let columns: Vec<&String> = row.keys().collect();
		let sql = sql::insert(&self.schema, table, &columns, returning);
		trace!("Executing: {sql}");
		let doc = serde_json::to_string(row)?;
		let out: Option<String> = match columns.is_empty() {
			true => sqlx::query_scalar(&sql).fetch_one(&self.pool).await?,
			false => sqlx::query_scalar(&sql).bind(doc).fetch_one(&self.pool).await?,
		};
		match out {
			Some(text) => Ok(serde_json::from_str(&text)?),
			None => Ok(Value::Null),
		}
	}

	async fn update(&self, table: &str, key_column: &str, key: &Value, row: &Row) -> Result<u64, Error> {
		let columns: Vec<&String> = row.keys().filter(|c| c.as_str() != key_column).collect();
		if columns.is_empty() {
			return Ok(0);
		}
		let sql = sql::update(&self.schema, table, key_column, &columns);
		trace!("Executing: {sql}");
		let mut doc = row.clone();
		doc.insert(key_column.to_owned(), key.clone());
		let doc = serde_json::to_string(&doc)?;
		Ok(sqlx::query(&sql).bind(doc).execute(&self.pool).await?.rows_affected())
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
			let wrapped = format!("SELECT to_jsonb(t)::text FROM ({statement}) AS t");
			self.fetch_json(&wrapped).await
		} else {
			self.execute(&statement).await?;
			Ok(Vec::new())
		}
	}

	async fn create_table(&self, table: &TableDef) -> Result<(), Error> {
		self.execute(&sql::create_table(&self.schema, table)).await.map(|_| ())
	}

	async fn drop_table(&self, table: &str) -> Result<(), Error> {
		self.execute(&sql::drop_table(&self.schema, table)).await.map(|_| ())
	}

	async fn alter_table(&self, table: &str, ops: &[AlterOp]) -> Result<(), Error> {
		for op in ops {
			self.execute(&sql::alter_table(&self.schema, table, op)).await?;
		}
		Ok(())
	}
}
