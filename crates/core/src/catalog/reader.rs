use super::{ColumnAttrs, ForeignRef, SchemaGraph, TableNode};
use crate::err::Error;
use crate::kvs::Adapter;

/// Reads the catalog of a namespace into a [`SchemaGraph`].
///
/// The first pass creates a node per table with its primary key and
/// columns. The second pass reads the foreign keys and links both
/// directions, once every node exists. Foreign keys to tables outside the
/// graph, such as excluded tables, are left unlinked. Any metadata query
/// failure fails the whole read.
pub async fn read_schema(
	adapter: &dyn Adapter,
	namespace: &str,
	exclude: &[String],
) -> Result<SchemaGraph, Error> {
	let wrap = |e: Error| Error::Introspection {
		namespace: namespace.to_owned(),
		message: e.to_string(),
	};
	let tables = adapter.tables(namespace, exclude).await.map_err(wrap)?;
	info!("Reading {} tables from namespace `{namespace}`", tables.len());
	let mut graph = SchemaGraph::new(namespace);
	for table in tables.iter() {
		debug!("Reading columns of table `{table}`");
		let mut node = TableNode::new(table.as_str());
		node.primary_key = adapter.primary_key(namespace, table).await.map_err(wrap)?;
		for column in adapter.columns(namespace, table).await.map_err(wrap)? {
			node.columns.insert(column.name, ColumnAttrs::new(column.data_type, column.nullable));
		}
		graph.insert(node);
	}
	for table in tables.iter() {
		for fk in adapter.foreign_keys(namespace, table).await.map_err(wrap)? {
			if graph.table(&fk.foreign_table).is_none() {
				debug!(
					"Skipping foreign key `{table}.{}` to table `{}` outside the schema",
					fk.column, fk.foreign_table
				);
				continue;
			}
			let target = ForeignRef {
				schema: fk.foreign_schema,
				table: fk.foreign_table,
				column: fk.foreign_column,
			};
			graph.link(table, &fk.column, target).map_err(wrap)?;
		}
	}
	Ok(graph)
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicBool, Ordering};

	use super::*;
	use crate::kvs::mem::Datastore;
	use crate::kvs::{ColumnDef, ColumnInfo, ForeignKeyInfo, Query, TableDef};
	use crate::val::{Row, Value};

	async fn scenario() -> Datastore {
		let ds = Datastore::new();
		ds.create_table(&TableDef::new("foo").column(ColumnDef::new("bar", "integer").primary()))
			.await
			.unwrap();
		ds.create_table(
			&TableDef::new("bar")
				.column(ColumnDef::new("foo", "integer").primary())
				.column(ColumnDef::new("bar", "integer").references("foo", "bar")),
		)
		.await
		.unwrap();
		ds.create_table(&TableDef::new("log").column(ColumnDef::new("line", "text")))
			.await
			.unwrap();
		ds
	}

	#[tokio::test]
	async fn builds_both_relation_directions() {
		let ds = scenario().await;
		let graph = read_schema(&ds, "public", &[]).await.unwrap();
		assert_eq!(graph.len(), 3);
		let bar = graph.table("bar").unwrap();
		assert_eq!(bar.primary_key.as_deref(), Some("foo"));
		let fk = bar.columns["bar"].foreign.as_ref().unwrap();
		assert_eq!((fk.table.as_str(), fk.column.as_str()), ("foo", "bar"));
		let foo = graph.table("foo").unwrap();
		assert_eq!(foo.reverse_relations.len(), 1);
		assert_eq!(foo.reverse_relations[0].foreign_table, "bar");
		assert_eq!(foo.reverse_relations[0].foreign_column, "bar");
	}

	#[tokio::test]
	async fn tables_without_primary_key_are_kept() {
		let ds = scenario().await;
		let graph = read_schema(&ds, "public", &[]).await.unwrap();
		let log = graph.table("log").unwrap();
		assert_eq!(log.primary_key, None);
		assert_eq!(log.columns.len(), 1);
	}

	#[tokio::test]
	async fn excluded_tables_drop_their_links() {
		let ds = scenario().await;
		let graph = read_schema(&ds, "public", &["foo".to_owned()]).await.unwrap();
		assert!(graph.table("foo").is_none());
		assert_eq!(graph.table("bar").unwrap().columns["bar"].foreign, None);
	}

	#[tokio::test]
	async fn reading_twice_is_stable() {
		let ds = scenario().await;
		let a = read_schema(&ds, "public", &[]).await.unwrap();
		let b = read_schema(&ds, "public", &[]).await.unwrap();
		assert_eq!(a, b);
	}

	/// Fails foreign key lookups after the first pass has succeeded
	#[derive(Debug)]
	struct Flaky {
		inner: Datastore,
		failed: AtomicBool,
	}

	#[async_trait::async_trait]
	impl Adapter for Flaky {
		fn kind(&self) -> &'static str {
			"flaky"
		}
		fn dialect(&self) -> crate::catalog::Dialect {
			self.inner.dialect()
		}
		async fn tables(&self, ns: &str, exclude: &[String]) -> Result<Vec<String>, Error> {
			self.inner.tables(ns, exclude).await
		}
		async fn primary_key(&self, ns: &str, table: &str) -> Result<Option<String>, Error> {
			self.inner.primary_key(ns, table).await
		}
		async fn columns(&self, ns: &str, table: &str) -> Result<Vec<ColumnInfo>, Error> {
			self.inner.columns(ns, table).await
		}
		async fn foreign_keys(&self, _: &str, _: &str) -> Result<Vec<ForeignKeyInfo>, Error> {
			self.failed.store(true, Ordering::SeqCst);
			Err(Error::Ds("connection reset".to_owned()))
		}
		async fn select(&self, q: &Query) -> Result<Vec<Row>, Error> {
			self.inner.select(q).await
		}
		async fn count(&self, q: &Query) -> Result<u64, Error> {
			self.inner.count(q).await
		}
		async fn insert(&self, t: &str, r: &Row, ret: &str) -> Result<Value, Error> {
			self.inner.insert(t, r, ret).await
		}
		async fn update(&self, t: &str, k: &str, v: &Value, r: &Row) -> Result<u64, Error> {
			self.inner.update(t, k, v, r).await
		}
		async fn raw(&self, sql: &str, p: &[Value]) -> Result<Vec<Row>, Error> {
			self.inner.raw(sql, p).await
		}
		async fn create_table(&self, t: &TableDef) -> Result<(), Error> {
			self.inner.create_table(t).await
		}
		async fn drop_table(&self, t: &str) -> Result<(), Error> {
			self.inner.drop_table(t).await
		}
		async fn alter_table(&self, t: &str, ops: &[crate::kvs::AlterOp]) -> Result<(), Error> {
			self.inner.alter_table(t, ops).await
		}
	}

	#[tokio::test]
	async fn metadata_failures_fail_the_whole_read() {
		let flaky = Flaky {
			inner: scenario().await,
			failed: AtomicBool::new(false),
		};
		let err = read_schema(&flaky, "public", &[]).await.unwrap_err();
		assert!(flaky.failed.load(Ordering::SeqCst));
		match err {
			Error::Introspection {
				namespace,
				message,
			} => {
				assert_eq!(namespace, "public");
				assert!(message.contains("connection reset"));
			}
			e => panic!("unexpected error: {e}"),
		}
	}
}
