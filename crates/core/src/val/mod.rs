//! Row and value helpers.
//!
//! Rows travel through the crate as JSON objects, keyed by column name,
//! which is the shape both the adapters and the GraphQL bridge work with.

use std::cmp::Ordering;

pub use serde_json::Map;
pub use serde_json::Value;

/// A single database row, keyed by column name
pub type Row = Map<String, Value>;

/// Returns whether a value counts as set when deciding between insert and update
pub fn is_truthy(v: &Value) -> bool {
	match v {
		Value::Null => false,
		Value::Bool(b) => *b,
		Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
		Value::String(s) => !s.is_empty(),
		Value::Array(_) | Value::Object(_) => true,
	}
}

/// Renders a value into the string used to key caches and groups.
///
/// Numbers and their string forms produce the same key, so a foreign key
/// stored as `1` finds the row whose primary key is `"1"` and the other way round.
pub fn key_of(v: &Value) -> Option<String> {
	match v {
		Value::Null => None,
		Value::String(s) => Some(s.clone()),
		Value::Number(n) => Some(canonical_number(n)),
		Value::Bool(b) => Some(b.to_string()),
		v => Some(v.to_string()),
	}
}

fn canonical_number(n: &serde_json::Number) -> String {
	match (n.as_i64(), n.as_u64(), n.as_f64()) {
		(Some(i), _, _) => i.to_string(),
		(_, Some(u), _) => u.to_string(),
		(_, _, Some(f)) if f.fract() == 0.0 && f.abs() < 9.0e15 => (f as i64).to_string(),
		_ => n.to_string(),
	}
}

/// Compares two values, coercing numeric strings when the other side is a number
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
	match (a, b) {
		(Value::Null, Value::Null) => Some(Ordering::Equal),
		(Value::Null, _) => Some(Ordering::Less),
		(_, Value::Null) => Some(Ordering::Greater),
		(Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
		(Value::Number(x), Value::String(y)) => x.as_f64()?.partial_cmp(&y.trim().parse().ok()?),
		(Value::String(x), Value::Number(y)) => x.trim().parse::<f64>().ok()?.partial_cmp(&y.as_f64()?),
		(Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
		(Value::Bool(x), Value::String(y)) => y.parse::<bool>().ok().map(|y| x.cmp(&y)),
		(Value::String(x), Value::Bool(y)) => x.parse::<bool>().ok().map(|x| x.cmp(y)),
		(Value::String(x), Value::String(y)) => Some(x.cmp(y)),
		_ => None,
	}
}

/// Returns whether two values are equal under [`compare`]
pub fn loose_eq(a: &Value, b: &Value) -> bool {
	!a.is_null() && !b.is_null() && compare(a, b) == Some(Ordering::Equal)
}
