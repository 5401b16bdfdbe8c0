//! SQL text rendering for the SQL Server adapter.
//!
//! Reads return one JSON document per row, built with a correlated
//! `FOR JSON PATH` subquery. Pagination uses `TOP` when there is only a
//! limit, and `OFFSET .. FETCH` otherwise. Writes take their values from a
//! JSON document bound as `@P1`.

use crate::err::Error;
use crate::expr::{Condition, Operator};
use crate::kvs::Query;
use crate::kvs::ddl::{AlterOp, ColumnDef, TableDef};
use crate::kvs::sql::{inline_params, quote_literal, replace_placeholders};
use crate::val::Value;

const DOC: &str = "(SELECT t.* FOR JSON PATH, WITHOUT_ARRAY_WRAPPER, INCLUDE_NULL_VALUES)";

/// Rewrites `?` placeholders into numbered `@Pn` placeholders, starting at `first`
pub fn number_placeholders(sql: &str, first: usize) -> String {
	let mut n = first;
	replace_placeholders(sql, || {
		let out = format!("@P{n}");
		n += 1;
		out
	})
}

pub fn quote_ident(s: &str) -> String {
	format!("[{}]", s.replace(']', "]]"))
}

/// Renders a JSON value as a T-SQL literal, or `None` for null
pub fn value_literal(v: &Value) -> Option<String> {
	match v {
		Value::Null => None,
		Value::Bool(true) => Some("1".to_owned()),
		Value::Bool(false) => Some("0".to_owned()),
		Value::Number(n) => Some(n.to_string()),
		Value::String(s) => Some(format!("N{}", quote_literal(s))),
		v => Some(format!("N{}", quote_literal(&v.to_string()))),
	}
}

fn table_name(schema: &str, table: &str) -> String {
	format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// The `JSON_VALUE` lookup of a column in the document bound as `@P1`
fn json_field(column: &str) -> String {
	let path = format!("$.\"{}\"", column.replace('\\', "\\\\").replace('"', "\\\""));
	format!("JSON_VALUE(@P1, N{})", quote_literal(&path))
}

fn condition(c: &Condition) -> String {
	let column = format!("t.{}", quote_ident(&c.column));
	match c.operator {
		Operator::Like => {
			format!("CAST({column} AS nvarchar(max)) LIKE {}", quote_literal(&c.pattern()))
		}
		Operator::Inside => {
			let values: Vec<String> = c.values().iter().map(|v| quote_literal(v)).collect();
			format!("{column} IN ({})", values.join(", "))
		}
		Operator::Raw => format!("{column} = {}", c.value),
		op => format!("{column} {op} {}", quote_literal(&c.value)),
	}
}

fn predicates(query: &Query) -> Result<String, Error> {
	let mut clauses: Vec<String> = query.filter.iter().map(condition).collect();
	if let Some((column, values)) = &query.within {
		let values: Vec<String> = values.iter().filter_map(value_literal).collect();
		match values.is_empty() {
			true => clauses.push("1 = 0".to_owned()),
			false => clauses.push(format!("t.{} IN ({})", quote_ident(column), values.join(", "))),
		}
	}
	if let Some(raw) = &query.raw {
		clauses.push(format!("({})", inline_params(&raw.sql, &raw.values)?));
	}
	Ok(match clauses.is_empty() {
		true => String::new(),
		false => format!(" WHERE {}", clauses.join(" AND ")),
	})
}

/// Renders a read which returns each row as a JSON document
pub fn select(schema: &str, query: &Query) -> Result<String, Error> {
	let pagination = &query.pagination;
	let top = match (pagination.limit, pagination.offset) {
		(Some(limit), None) => format!("TOP ({limit}) "),
		_ => String::new(),
	};
	let mut sql = format!(
		"SELECT {top}{DOC} FROM {} AS t{}",
		table_name(schema, &query.table),
		predicates(query)?
	);
	let order: Vec<String> = pagination
		.order
		.iter()
		.map(|o| format!("t.{} {}", quote_ident(&o.column), o.direction.as_str()))
		.collect();
	if !order.is_empty() {
		sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
	}
	if let Some(offset) = pagination.offset {
		// OFFSET needs an ORDER BY clause
		if order.is_empty() {
			sql.push_str(" ORDER BY (SELECT NULL)");
		}
		sql.push_str(&format!(" OFFSET {offset} ROWS"));
		if let Some(limit) = pagination.limit {
			sql.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
		}
	}
	Ok(sql)
}

/// Renders a count of the rows a read matches
pub fn count(schema: &str, query: &Query) -> Result<String, Error> {
	Ok(format!(
		"SELECT COUNT_BIG(*) FROM {} AS t{}",
		table_name(schema, &query.table),
		predicates(query)?
	))
}

/// Wraps a raw read so it returns each row as a JSON document
pub fn wrap_raw(statement: &str) -> String {
	format!("SELECT {DOC} FROM ({statement}) AS t")
}

/// Renders an insert which outputs the inserted `returning` column
pub fn insert(schema: &str, table: &str, columns: &[&String], returning: &str) -> String {
	let name = table_name(schema, table);
	let output = format!("OUTPUT INSERTED.{}", quote_ident(returning));
	if columns.is_empty() {
		return format!("INSERT INTO {name} {output} DEFAULT VALUES");
	}
	let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
	let values: Vec<String> = columns.iter().map(|c| json_field(c)).collect();
	format!("INSERT INTO {name} ({}) {output} SELECT {}", names.join(", "), values.join(", "))
}

/// Renders an update which takes its values and its key from the bound document
pub fn update(schema: &str, table: &str, key_column: &str, columns: &[&String]) -> String {
	let set: Vec<String> =
		columns.iter().map(|c| format!("t.{} = {}", quote_ident(c), json_field(c))).collect();
	format!(
		"UPDATE t SET {} FROM {} AS t WHERE t.{} = {}",
		set.join(", "),
		table_name(schema, table),
		quote_ident(key_column),
		json_field(key_column)
	)
}

fn column_def(schema: &str, c: &ColumnDef) -> String {
	let mut sql = format!("{} {}", quote_ident(&c.name), c.data_type);
	if c.primary {
		sql.push_str(" PRIMARY KEY");
	} else if !c.nullable {
		sql.push_str(" NOT NULL");
	}
	if let Some((table, column)) = &c.references {
		sql.push_str(&format!(" REFERENCES {}({})", table_name(schema, table), quote_ident(column)));
	}
	sql
}

pub fn create_table(schema: &str, def: &TableDef) -> String {
	let columns: Vec<String> = def.columns.iter().map(|c| column_def(schema, c)).collect();
	format!("CREATE TABLE {} ({})", table_name(schema, &def.name), columns.join(", "))
}

pub fn drop_table(schema: &str, table: &str) -> String {
	format!("DROP TABLE {}", table_name(schema, table))
}

pub fn alter_table(schema: &str, table: &str, op: &AlterOp) -> String {
	let name = table_name(schema, table);
	let list = |columns: &[String]| -> String {
		columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
	};
	match op {
		AlterOp::AddColumn(c) => format!("ALTER TABLE {name} ADD {}", column_def(schema, c)),
		AlterOp::DropColumn(c) => format!("ALTER TABLE {name} DROP COLUMN {}", quote_ident(c)),
		AlterOp::Unique(columns) => format!("ALTER TABLE {name} ADD UNIQUE ({})", list(columns)),
		AlterOp::Index(columns) => {
			let index = quote_ident(&format!("{table}_{}_index", columns.join("_")));
			format!("CREATE INDEX {index} ON {name} ({})", list(columns))
		}
		AlterOp::Foreign {
			column,
			table: target,
			target: target_column,
		} => format!(
			"ALTER TABLE {name} ADD FOREIGN KEY ({}) REFERENCES {}({})",
			quote_ident(column),
			table_name(schema, target),
			quote_ident(target_column)
		),
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::expr::{Where, parse_filter, parse_pagination};

	#[test]
	fn numbers_placeholders_outside_quotes() {
		assert_eq!(number_placeholders("a = ? AND b = '?' AND c IN (?,?)", 2), "a = @P2 AND b = '?' AND c IN (@P3,@P4)");
	}

	#[test]
	fn quotes_identifiers_with_brackets() {
		assert_eq!(quote_ident("a]b"), "[a]]b]");
		assert_eq!(value_literal(&json!(true)).unwrap(), "1");
		assert_eq!(value_literal(&json!("o'neil")).unwrap(), "N'o''neil'");
		assert_eq!(value_literal(&json!(null)), None);
	}

	#[test]
	fn renders_select() {
		let q = Query::table("person")
			.filter(parse_filter("name~jo hn;id#1,2;a<=>b;age>=18").unwrap())
			.within("team", vec![json!(1), json!("x"), json!(null)])
			.raw(Some(Where {
				sql: "age < ?".to_owned(),
				values: vec!["65".to_owned()],
			}))
			.paginate(parse_pagination("orderby=age desc;limit=5;offset=10").unwrap());
		assert_eq!(
			select("dbo", &q).unwrap(),
			"SELECT (SELECT t.* FOR JSON PATH, WITHOUT_ARRAY_WRAPPER, INCLUDE_NULL_VALUES) FROM [dbo].[person] AS t WHERE CAST(t.[name] AS nvarchar(max)) LIKE '%jo%hn%' AND t.[id] IN ('1', '2') AND t.[a] = b AND t.[age] >= '18' AND t.[team] IN (1, N'x') AND (age < '65') ORDER BY t.[age] DESC OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"
		);
	}

	#[test]
	fn limits_use_top_unless_offset() {
		let q = Query::table("t").limit(3);
		assert_eq!(
			select("s", &q).unwrap(),
			"SELECT TOP (3) (SELECT t.* FOR JSON PATH, WITHOUT_ARRAY_WRAPPER, INCLUDE_NULL_VALUES) FROM [s].[t] AS t"
		);
		let q = Query::table("t").paginate(parse_pagination("offset=2").unwrap());
		assert!(select("s", &q).unwrap().ends_with(" ORDER BY (SELECT NULL) OFFSET 2 ROWS"));
	}

	#[test]
	fn empty_key_list_matches_nothing() {
		let q = Query::table("t").within("id", vec![]);
		assert_eq!(count("s", &q).unwrap(), "SELECT COUNT_BIG(*) FROM [s].[t] AS t WHERE 1 = 0");
	}

	#[test]
	fn renders_writes() {
		let a = "a".to_owned();
		let b = "b".to_owned();
		assert_eq!(
			insert("s", "t", &[&a, &b], "id"),
			"INSERT INTO [s].[t] ([a], [b]) OUTPUT INSERTED.[id] SELECT JSON_VALUE(@P1, N'$.\"a\"'), JSON_VALUE(@P1, N'$.\"b\"')"
		);
		assert_eq!(insert("s", "t", &[], "id"), "INSERT INTO [s].[t] OUTPUT INSERTED.[id] DEFAULT VALUES");
		assert_eq!(
			update("s", "t", "id", &[&a]),
			"UPDATE t SET t.[a] = JSON_VALUE(@P1, N'$.\"a\"') FROM [s].[t] AS t WHERE t.[id] = JSON_VALUE(@P1, N'$.\"id\"')"
		);
	}

	#[test]
	fn renders_ddl() {
		let def = TableDef::new("bar")
			.column(ColumnDef::new("foo", "int").primary())
			.column(ColumnDef::new("bar", "int").references("foo", "bar"));
		assert_eq!(
			create_table("dbo", &def),
			"CREATE TABLE [dbo].[bar] ([foo] int PRIMARY KEY, [bar] int REFERENCES [dbo].[foo]([bar]))"
		);
		assert_eq!(
			alter_table("dbo", "bar", &AlterOp::AddColumn(ColumnDef::new("baz", "nvarchar(20)"))),
			"ALTER TABLE [dbo].[bar] ADD [baz] nvarchar(20)"
		);
		assert_eq!(wrap_raw("SELECT 1 AS a"), format!("SELECT {DOC} FROM (SELECT 1 AS a) AS t"));
	}
}
