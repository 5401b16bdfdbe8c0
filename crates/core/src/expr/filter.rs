use std::sync::LazyLock;

use regex::Regex;

use super::{Condition, Filter, Operator};
use crate::err::Error;

// Alternation order gives longest-match-first at the leftmost operator position
static OPERATOR: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"<=>|>=|<=|=|>|<|~|#").expect("valid operator pattern"));

/// Parses a filter expression.
///
/// An empty or blank expression yields an empty filter. Blank clauses
/// between separators are skipped. A clause without an operator, or with
/// nothing before its operator, fails the whole expression.
pub fn parse_filter(expr: &str) -> Result<Filter, Error> {
	let mut out = Vec::new();
	for clause in expr.split(';') {
		let clause = clause.trim();
		if clause.is_empty() {
			continue;
		}
		out.push(parse_clause(clause)?);
	}
	Ok(Filter(out))
}

fn parse_clause(clause: &str) -> Result<Condition, Error> {
	let found = OPERATOR.find(clause).ok_or_else(|| Error::InvalidFilter(clause.to_owned()))?;
	let operator =
		Operator::from_symbol(found.as_str()).ok_or_else(|| Error::InvalidFilter(clause.to_owned()))?;
	let column = clause[..found.start()].trim();
	if column.is_empty() {
		return Err(Error::InvalidFilter(clause.to_owned()));
	}
	let value = clause[found.end()..].trim();
	Ok(Condition::new(operator, column, value))
}
