//! SQL text rendering for the PostgreSQL adapter, and the helpers shared
//! with the T-SQL renderer in [`super::tsql`].
//!
//! Filter values are inlined as quoted literals rather than bound, so the
//! database infers their type from the column they are compared with. The
//! right hand side of a `<=>` clause is emitted unescaped.

use crate::err::Error;
use crate::expr::{Condition, Operator};
use crate::kvs::Query;
use crate::kvs::ddl::{AlterOp, ColumnDef, TableDef};
use crate::val::Value;

/// Builds the `NOT IN` fragment which excludes tables from a catalog listing
pub fn exclude_condition(exclude: &[String]) -> String {
	if exclude.is_empty() {
		return String::new();
	}
	let placeholders = vec!["?"; exclude.len()].join(",");
	format!("AND table_name NOT IN ({placeholders})")
}

/// Rewrites `?` placeholders into numbered `$n` placeholders, starting at `first`
pub fn number_placeholders(sql: &str, first: usize) -> String {
	let mut n = first;
	replace_placeholders(sql, || {
		let out = format!("${n}");
		n += 1;
		out
	})
}

/// Replaces `?` placeholders with quoted literals of the given values
pub fn inline_params(sql: &str, params: &[String]) -> Result<String, Error> {
	let mut values = params.iter();
	let mut missing = false;
	let out = replace_placeholders(sql, || match values.next() {
		Some(v) => quote_literal(v),
		None => {
			missing = true;
			"NULL".to_owned()
		}
	});
	if missing || values.next().is_some() {
		return Err(Error::Ds(format!(
			"Expected as many bindings as placeholders in raw query: {sql}"
		)));
	}
	Ok(out)
}

pub(crate) fn replace_placeholders(sql: &str, mut next: impl FnMut() -> String) -> String {
	let mut out = String::with_capacity(sql.len());
	let mut quoted = false;
	for c in sql.chars() {
		match c {
			'\'' => {
				quoted = !quoted;
				out.push(c);
			}
			'?' if !quoted => out.push_str(&next()),
			c => out.push(c),
		}
	}
	out
}

pub fn quote_ident(s: &str) -> String {
	format!("\"{}\"", s.replace('"', "\"\""))
}

pub fn quote_literal(s: &str) -> String {
	format!("'{}'", s.replace('\'', "''"))
}

/// Renders a JSON value as a SQL literal, or `None` for null
pub fn value_literal(v: &Value) -> Option<String> {
	match v {
		Value::Null => None,
		Value::Bool(true) => Some("TRUE".to_owned()),
		Value::Bool(false) => Some("FALSE".to_owned()),
		Value::Number(n) => Some(n.to_string()),
		Value::String(s) => Some(quote_literal(s)),
		v => Some(quote_literal(&v.to_string())),
	}
}

fn table_name(schema: &str, table: &str) -> String {
	format!("{}.{}", quote_ident(schema), quote_ident(table))
}

fn condition(c: &Condition) -> String {
	let column = format!("t.{}", quote_ident(&c.column));
	match c.operator {
		Operator::Like => format!("{column}::text ILIKE {}", quote_literal(&c.pattern())),
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
			true => clauses.push("FALSE".to_owned()),
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
	let mut sql = format!(
		"SELECT to_jsonb(t)::text FROM {} AS t{}",
		table_name(schema, &query.table),
		predicates(query)?
	);
	if !query.pagination.order.is_empty() {
		let order: Vec<String> = query
			.pagination
			.order
			.iter()
			.map(|o| format!("t.{} {}", quote_ident(&o.column), o.direction.as_str()))
			.collect();
		sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
	}
	if let Some(limit) = query.pagination.limit {
		sql.push_str(&format!(" LIMIT {limit}"));
	}
	if let Some(offset) = query.pagination.offset {
		sql.push_str(&format!(" OFFSET {offset}"));
	}
	Ok(sql)
}

/// Renders a count of the rows a read matches
pub fn count(schema: &str, query: &Query) -> Result<String, Error> {
	Ok(format!(
		"SELECT COUNT(*) FROM {} AS t{}",
		table_name(schema, &query.table),
		predicates(query)?
	))
}

/// Renders an insert which takes its values from a JSON document bound as `$1`
pub fn insert(schema: &str, table: &str, columns: &[&String], returning: &str) -> String {
	let name = table_name(schema, table);
	let returning = format!("RETURNING to_jsonb({})::text", quote_ident(returning));
	if columns.is_empty() {
		return format!("INSERT INTO {name} DEFAULT VALUES {returning}");
	}
	let columns: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
	let columns = columns.join(", ");
	format!(
		"INSERT INTO {name} ({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::{name}, $1::jsonb) {returning}"
	)
}

/// Renders an update which takes its values and its key from a JSON document bound as `$1`
pub fn update(schema: &str, table: &str, key_column: &str, columns: &[&String]) -> String {
	let name = table_name(schema, table);
	let set: Vec<String> =
		columns.iter().map(|c| format!("{} = r.{}", quote_ident(c), quote_ident(c))).collect();
	let key = quote_ident(key_column);
	format!(
		"UPDATE {name} AS t SET {} FROM jsonb_populate_record(NULL::{name}, $1::jsonb) AS r WHERE t.{key} = r.{key}",
		set.join(", ")
	)
}

fn column_def(c: &ColumnDef) -> String {
	let mut sql = format!("{} {}", quote_ident(&c.name), c.data_type);
	if c.primary {
		sql.push_str(" PRIMARY KEY");
	} else if !c.nullable {
		sql.push_str(" NOT NULL");
	}
	if let Some((table, column)) = &c.references {
		sql.push_str(&format!(" REFERENCES {}({})", quote_ident(table), quote_ident(column)));
	}
	sql
}

pub fn create_table(schema: &str, def: &TableDef) -> String {
	let columns: Vec<String> = def.columns.iter().map(column_def).collect();
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
		AlterOp::AddColumn(c) => format!("ALTER TABLE {name} ADD COLUMN {}", column_def(c)),
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
