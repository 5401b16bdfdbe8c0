//! An in-memory relational store.
//!
//! Tables are created through the DDL passthrough and live for as long as
//! the datastore does. The catalog reports Postgres type names, so the
//! store compiles with the Postgres type table. Raw SQL is not supported.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::catalog::Dialect;
use crate::err::Error;
use crate::expr::{Condition, Direction, Operator};
use crate::kvs::api::{Adapter, ColumnInfo, ForeignKeyInfo};
use crate::kvs::ddl::{AlterOp, ColumnDef, TableDef};
use crate::kvs::Query;
use crate::val::{Row, Value, compare, loose_eq};

#[derive(Debug, Default)]
struct Table {
	columns: Vec<ColumnDef>,
	uniques: Vec<Vec<String>>,
	rows: Vec<Row>,
	/// The last generated or inserted integer primary key
	sequence: i64,
}

impl Table {
	fn primary_key(&self) -> Option<&str> {
		self.columns.iter().find(|c| c.primary).map(|c| c.name.as_str())
	}

	fn check_columns<'a>(
		&self,
		table: &str,
		mut names: impl Iterator<Item = &'a String>,
	) -> Result<(), Error> {
		match names.find(|n| !self.columns.iter().any(|c| &c.name == *n)) {
			Some(column) => Err(Error::ColumnNotFound {
				table: table.to_owned(),
				column: column.clone(),
			}),
			None => Ok(()),
		}
	}

	fn check_constraints(&self, table: &str, row: &Row, skip: Option<usize>) -> Result<(), Error> {
		for c in self.columns.iter().filter(|c| !c.nullable) {
			if row.get(&c.name).is_none_or(Value::is_null) {
				return Err(Error::Ds(format!(
					"null value in column \"{}\" of relation \"{table}\" violates not-null constraint",
					c.name
				)));
			}
		}
		let mut sets: Vec<Vec<String>> = self.uniques.clone();
		if let Some(pk) = self.primary_key() {
			sets.push(vec![pk.to_owned()]);
		}
		for set in sets.iter() {
			let clash = self.rows.iter().enumerate().any(|(i, other)| {
				Some(i) != skip
					&& set.iter().all(|c| {
						loose_eq(row.get(c).unwrap_or(&Value::Null), other.get(c).unwrap_or(&Value::Null))
					})
			});
			if clash {
				let key: Vec<String> =
					set.iter().map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_default()).collect();
				return Err(Error::DuplicateKey {
					table: table.to_owned(),
					key: key.join(","),
				});
			}
		}
		Ok(())
	}
}

/// The in-memory adapter
#[derive(Debug, Default)]
pub struct Datastore {
	tables: RwLock<BTreeMap<String, Table>>,
	reads: DashMap<String, usize>,
}

impl Datastore {
	/// Open a new, empty database
	pub fn new() -> Datastore {
		Datastore::default()
	}

	/// The number of row reads issued against a table so far
	pub fn reads(&self, table: &str) -> usize {
		self.reads.get(table).map(|r| *r).unwrap_or_default()
	}

	/// Resets every read counter
	pub fn reset_reads(&self) {
		self.reads.clear();
	}

	fn scan(&self, query: &Query) -> Result<Vec<Row>, Error> {
		if query.raw.is_some() {
			return Err(Error::Unsupported {
				adapter: "memory",
				operation: "raw where conditions",
			});
		}
		let tables = self.tables.read();
		let table =
			tables.get(&query.table).ok_or_else(|| Error::TableNotFound(query.table.clone()))?;
		table.check_columns(&query.table, query.filter.iter().map(|c| &c.column))?;
		table.check_columns(&query.table, query.within.iter().map(|(c, _)| c))?;
		table.check_columns(&query.table, query.pagination.order.iter().map(|o| &o.column))?;
		Ok(table
			.rows
			.iter()
			.filter(|row| {
				query.filter.iter().all(|c| matches(row, c))
					&& query.within.as_ref().is_none_or(|(column, values)| {
						let v = row.get(column).unwrap_or(&Value::Null);
						values.iter().any(|x| loose_eq(v, x))
					})
			})
			.cloned()
			.collect())
	}
}

fn matches(row: &Row, c: &Condition) -> bool {
	let lhs = match row.get(&c.column) {
		Some(v) if !v.is_null() => v,
		_ => return false,
	};
	let rhs = Value::String(c.value.clone());
	match c.operator {
		Operator::Equal => loose_eq(lhs, &rhs),
		Operator::MoreThan => compare(lhs, &rhs) == Some(Ordering::Greater),
		Operator::LessThan => compare(lhs, &rhs) == Some(Ordering::Less),
		Operator::MoreThanOrEqual => {
			matches!(compare(lhs, &rhs), Some(Ordering::Greater | Ordering::Equal))
		}
		Operator::LessThanOrEqual => {
			matches!(compare(lhs, &rhs), Some(Ordering::Less | Ordering::Equal))
		}
		Operator::Like => {
			let text = match lhs {
				Value::String(s) => s.clone(),
				v => v.to_string(),
			};
			like(&text, &c.pattern())
		}
		Operator::Inside => c.values().into_iter().any(|v| loose_eq(lhs, &Value::String(v))),
		// The right hand side names another column, or is taken literally
		Operator::Raw => loose_eq(lhs, row.get(&c.value).unwrap_or(&rhs)),
	}
}

/// Case-insensitive `LIKE` matching, where `%` matches any run of characters
fn like(text: &str, pattern: &str) -> bool {
	let text = text.to_lowercase();
	let pattern = pattern.to_lowercase();
	let parts: Vec<&str> = pattern.split('%').collect();
	let (first, last) = match parts.as_slice() {
		[only] => return text == *only,
		[first, .., last] => (*first, *last),
		[] => return text.is_empty(),
	};
	if !text.starts_with(first) {
		return false;
	}
	let mut pos = first.len();
	for part in &parts[1..parts.len() - 1] {
		match text[pos..].find(part) {
			Some(i) => pos += i + part.len(),
			None => return false,
		}
	}
	text.len() >= pos + last.len() && text[pos..].ends_with(last)
}

fn order(rows: &mut [Row], query: &Query) {
	if query.pagination.order.is_empty() {
		return;
	}
	rows.sort_by(|a, b| {
		for o in query.pagination.order.iter() {
			let x = a.get(&o.column).unwrap_or(&Value::Null);
			let y = b.get(&o.column).unwrap_or(&Value::Null);
			let cmp = compare(x, y).unwrap_or(Ordering::Equal);
			let cmp = match o.direction {
				Direction::Asc => cmp,
				Direction::Desc => cmp.reverse(),
			};
			if cmp != Ordering::Equal {
				return cmp;
			}
		}
		Ordering::Equal
	});
}

#[async_trait::async_trait]
impl Adapter for Datastore {
	fn kind(&self) -> &'static str {
		"memory"
	}

	fn dialect(&self) -> Dialect {
		Dialect::Postgres
	}

	async fn tables(&self, _namespace: &str, exclude: &[String]) -> Result<Vec<String>, Error> {
		Ok(self.tables.read().keys().filter(|t| !exclude.contains(t)).cloned().collect())
	}

	async fn primary_key(&self, _namespace: &str, table: &str) -> Result<Option<String>, Error> {
		let tables = self.tables.read();
		let table = tables.get(table).ok_or_else(|| Error::TableNotFound(table.to_owned()))?;
		Ok(table.primary_key().map(str::to_owned))
	}

	async fn columns(&self, _namespace: &str, table: &str) -> Result<Vec<ColumnInfo>, Error> {
		let tables = self.tables.read();
		let table = tables.get(table).ok_or_else(|| Error::TableNotFound(table.to_owned()))?;
		Ok(table
			.columns
			.iter()
			.map(|c| ColumnInfo {
				name: c.name.clone(),
				nullable: c.nullable,
				data_type: c.data_type.clone(),
			})
			.collect())
	}

	async fn foreign_keys(&self, namespace: &str, table: &str) -> Result<Vec<ForeignKeyInfo>, Error> {
		let tables = self.tables.read();
		let table = tables.get(table).ok_or_else(|| Error::TableNotFound(table.to_owned()))?;
		Ok(table
			.columns
			.iter()
			.filter_map(|c| {
				c.references.as_ref().map(|(t, col)| ForeignKeyInfo {
					column: c.name.clone(),
					foreign_schema: namespace.to_owned(),
					foreign_table: t.clone(),
					foreign_column: col.clone(),
				})
			})
			.collect())
	}

	async fn select(&self, query: &Query) -> Result<Vec<Row>, Error> {
		*self.reads.entry(query.table.clone()).or_default() += 1;
		let mut rows = self.scan(query)?;
		order(&mut rows, query);
		let offset = query.pagination.offset.unwrap_or(0) as usize;
		let limit = query.pagination.limit.map(|l| l as usize).unwrap_or(usize::MAX);
		Ok(rows.into_iter().skip(offset).take(limit).collect())
	}

	async fn count(&self, query: &Query) -> Result<u64, Error> {
		Ok(self.scan(query)?.len() as u64)
	}

	async fn insert(&self, table: &str, row: &Row, returning: &str) -> Result<Value, Error> {
		let mut tables = self.tables.write();
		let t = tables.get_mut(table).ok_or_else(|| Error::TableNotFound(table.to_owned()))?;
		t.check_columns(table, row.keys())?;
		let mut stored = Row::new();
		for c in t.columns.iter() {
			stored.insert(c.name.clone(), row.get(&c.name).cloned().unwrap_or(Value::Null));
		}
		let mut sequence = t.sequence;
		if let Some(pk) = t.primary_key() {
			match stored.get(pk).and_then(Value::as_i64) {
				Some(v) => sequence = sequence.max(v),
				None if stored.get(pk).is_none_or(Value::is_null) => {
					sequence += 1;
					stored.insert(pk.to_owned(), Value::from(sequence));
				}
				None => (),
			}
		}
		t.check_constraints(table, &stored, None)?;
		t.sequence = sequence;
		let out = stored.get(returning).cloned().unwrap_or(Value::Null);
		t.rows.push(stored);
		Ok(out)
	}

	async fn update(&self, table: &str, key_column: &str, key: &Value, row: &Row) -> Result<u64, Error> {
		let mut tables = self.tables.write();
		let t = tables.get_mut(table).ok_or_else(|| Error::TableNotFound(table.to_owned()))?;
		t.check_columns(table, row.keys().chain(std::iter::once(&key_column.to_owned())))?;
		let targets: Vec<usize> = t
			.rows
			.iter()
			.enumerate()
			.filter(|(_, r)| loose_eq(r.get(key_column).unwrap_or(&Value::Null), key))
			.map(|(i, _)| i)
			.collect();
		for i in targets.iter().copied() {
			let mut next = t.rows[i].clone();
			for (k, v) in row.iter() {
				next.insert(k.clone(), v.clone());
			}
			t.check_constraints(table, &next, Some(i))?;
			t.rows[i] = next;
		}
		Ok(targets.len() as u64)
	}

	async fn raw(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>, Error> {
		Err(Error::Unsupported {
			adapter: "memory",
			operation: "raw statements",
		})
	}

	async fn create_table(&self, table: &TableDef) -> Result<(), Error> {
		let mut tables = self.tables.write();
		if tables.contains_key(&table.name) {
			return Err(Error::TableExists(table.name.clone()));
		}
		trace!("Creating in-memory table `{}`", table.name);
		tables.insert(
			table.name.clone(),
			Table {
				columns: table.columns.clone(),
				..Default::default()
			},
		);
		Ok(())
	}

	async fn drop_table(&self, table: &str) -> Result<(), Error> {
		match self.tables.write().remove(table) {
			Some(_) => Ok(()),
			None => Err(Error::TableNotFound(table.to_owned())),
		}
	}

	async fn alter_table(&self, table: &str, ops: &[AlterOp]) -> Result<(), Error> {
		let mut tables = self.tables.write();
		let t = tables.get_mut(table).ok_or_else(|| Error::TableNotFound(table.to_owned()))?;
		for op in ops {
			match op {
				AlterOp::AddColumn(def) => {
					if t.columns.iter().any(|c| c.name == def.name) {
						return Err(Error::Ds(format!(
							"column \"{}\" of relation \"{table}\" already exists",
							def.name
						)));
					}
					for row in t.rows.iter_mut() {
						row.insert(def.name.clone(), Value::Null);
					}
					t.columns.push(def.clone());
				}
				AlterOp::DropColumn(name) => {
					t.check_columns(table, std::iter::once(name))?;
					t.columns.retain(|c| &c.name != name);
					for row in t.rows.iter_mut() {
						row.remove(name);
					}
				}
				AlterOp::Unique(columns) => {
					t.check_columns(table, columns.iter())?;
					t.uniques.push(columns.clone());
				}
				AlterOp::Index(columns) => {
					t.check_columns(table, columns.iter())?;
					trace!("Ignoring index on `{table}` for the in-memory store");
				}
				AlterOp::Foreign {
					column,
					table: target,
					target: target_column,
				} => {
					let def = t.columns.iter_mut().find(|c| &c.name == column).ok_or_else(|| {
						Error::ColumnNotFound {
							table: table.to_owned(),
							column: column.clone(),
						}
					})?;
					def.references = Some((target.clone(), target_column.clone()));
				}
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::expr::{parse_filter, parse_pagination};

	fn row(v: Value) -> Row {
		v.as_object().cloned().unwrap()
	}

	async fn people() -> Datastore {
		let ds = Datastore::new();
		ds.create_table(
			&TableDef::new("person")
				.column(ColumnDef::new("id", "integer").primary())
				.column(ColumnDef::new("name", "text"))
				.column(ColumnDef::new("age", "integer")),
		)
		.await
		.unwrap();
		for (name, age) in [("John Doe", 30), ("Jane Doe", 25), ("Max Power", 41)] {
			ds.insert("person", &row(json!({"name": name, "age": age})), "id").await.unwrap();
		}
		ds
	}

	#[tokio::test]
	async fn generates_sequential_keys() {
		let ds = people().await;
		let id = ds.insert("person", &row(json!({"name": "Zed"})), "id").await.unwrap();
		assert_eq!(id, json!(4));
		let id = ds.insert("person", &row(json!({"id": 10, "name": "Ten"})), "id").await.unwrap();
		assert_eq!(id, json!(10));
		let id = ds.insert("person", &row(json!({"name": "Eleven"})), "id").await.unwrap();
		assert_eq!(id, json!(11));
	}

	#[tokio::test]
	async fn rejects_duplicate_keys_and_unknown_columns() {
		let ds = people().await;
		let err = ds.insert("person", &row(json!({"id": 1})), "id").await.unwrap_err();
		assert!(matches!(err, Error::DuplicateKey { .. }));
		let err = ds.insert("person", &row(json!({"nope": 1})), "id").await.unwrap_err();
		assert!(matches!(err, Error::ColumnNotFound { .. }));
	}

	#[tokio::test]
	async fn filters_orders_and_pages() {
		let ds = people().await;
		let q = Query::table("person")
			.filter(parse_filter("name~doe").unwrap())
			.paginate(parse_pagination("orderby=age asc").unwrap());
		let rows = ds.select(&q).await.unwrap();
		let names: Vec<_> = rows.iter().map(|r| r["name"].clone()).collect();
		assert_eq!(names, vec![json!("Jane Doe"), json!("John Doe")]);
		let q = Query::table("person")
			.filter(parse_filter("age>=30").unwrap())
			.paginate(parse_pagination("orderby=age desc;limit=1;offset=1").unwrap());
		let rows = ds.select(&q).await.unwrap();
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0]["name"], json!("John Doe"));
		assert_eq!(ds.count(&q).await.unwrap(), 2);
	}

	#[tokio::test]
	async fn like_wildcards_spaces() {
		let ds = people().await;
		let q = Query::table("person").filter(parse_filter("name~max pow").unwrap());
		assert_eq!(ds.count(&q).await.unwrap(), 1);
		let q = Query::table("person").filter(parse_filter("name~doe max").unwrap());
		assert_eq!(ds.count(&q).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn inside_and_within() {
		let ds = people().await;
		let q = Query::table("person").filter(parse_filter("id#1,3").unwrap());
		assert_eq!(ds.count(&q).await.unwrap(), 2);
		let q = Query::table("person").within("id", vec![json!(2), json!("3")]);
		assert_eq!(ds.count(&q).await.unwrap(), 2);
	}

	#[tokio::test]
	async fn raw_equality_compares_columns() {
		let ds = Datastore::new();
		ds.create_table(
			&TableDef::new("pair")
				.column(ColumnDef::new("a", "integer"))
				.column(ColumnDef::new("b", "integer")),
		)
		.await
		.unwrap();
		ds.insert("pair", &row(json!({"a": 1, "b": 1})), "a").await.unwrap();
		ds.insert("pair", &row(json!({"a": 1, "b": 2})), "a").await.unwrap();
		let q = Query::table("pair").filter(parse_filter("a<=>b").unwrap());
		assert_eq!(ds.count(&q).await.unwrap(), 1);
		let q = Query::table("pair").filter(parse_filter("b<=>2").unwrap());
		assert_eq!(ds.count(&q).await.unwrap(), 1);
	}

	#[tokio::test]
	async fn updates_by_key() {
		let ds = people().await;
		let n = ds.update("person", "id", &json!(2), &row(json!({"age": 26}))).await.unwrap();
		assert_eq!(n, 1);
		let r = ds.first(&Query::table("person").within("id", vec![json!(2)])).await.unwrap();
		assert_eq!(r.unwrap()["age"], json!(26));
		let n = ds.update("person", "id", &json!(99), &row(json!({"age": 1}))).await.unwrap();
		assert_eq!(n, 0);
	}

	#[tokio::test]
	async fn counts_reads_per_table() {
		let ds = people().await;
		assert_eq!(ds.reads("person"), 0);
		ds.select(&Query::table("person")).await.unwrap();
		ds.count(&Query::table("person")).await.unwrap();
		assert_eq!(ds.reads("person"), 1);
		ds.reset_reads();
		assert_eq!(ds.reads("person"), 0);
	}

	#[tokio::test]
	async fn alters_tables() {
		let ds = people().await;
		ds.alter_table(
			"person",
			&[
				AlterOp::AddColumn(ColumnDef::new("email", "text")),
				AlterOp::Unique(vec!["email".to_owned()]),
			],
		)
		.await
		.unwrap();
		ds.update("person", "id", &json!(1), &row(json!({"email": "a@b.c"}))).await.unwrap();
		let err = ds.update("person", "id", &json!(2), &row(json!({"email": "a@b.c"}))).await;
		assert!(matches!(err, Err(Error::DuplicateKey { .. })));
		ds.alter_table("person", &[AlterOp::DropColumn("email".to_owned())]).await.unwrap();
		let cols = ds.columns("public", "person").await.unwrap();
		assert_eq!(cols.len(), 3);
		ds.drop_table("person").await.unwrap();
		assert!(ds.tables("public", &[]).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn raw_is_unsupported() {
		let ds = people().await;
		assert!(matches!(ds.raw("SELECT 1", &[]).await, Err(Error::Unsupported { .. })));
		let q = Query::table("person").raw(Some(crate::expr::Where::default()));
		assert!(matches!(ds.select(&q).await, Err(Error::Unsupported { .. })));
	}

	#[test]
	fn like_patterns() {
		assert!(like("Hello World", "%hello%"));
		assert!(like("Hello World", "%o%w%"));
		assert!(like("abc", "abc"));
		assert!(!like("abc", "%d%"));
		assert!(like("abc", "a%"));
		assert!(!like("abc", "%b"));
	}
}
