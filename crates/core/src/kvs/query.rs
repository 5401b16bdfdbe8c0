use std::fmt;

use crate::expr::{Filter, Operator, Pagination, Where};
use crate::val::Value;

/// A read against a single table.
///
/// This is the subset of a query builder the resolvers need: conjunctive
/// filter clauses, an optional key restriction used by batched relation
/// loads, an optional raw predicate, and pagination.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
	pub table: String,
	pub filter: Filter,
	pub within: Option<(String, Vec<Value>)>,
	pub raw: Option<Where>,
	pub pagination: Pagination,
}

impl Query {
	pub fn table(table: impl Into<String>) -> Self {
		Self {
			table: table.into(),
			..Default::default()
		}
	}

	pub fn filter(mut self, filter: Filter) -> Self {
		self.filter = filter;
		self
	}

	/// Restricts the rows to those whose `column` is one of `values`
	pub fn within(mut self, column: impl Into<String>, values: Vec<Value>) -> Self {
		self.within = Some((column.into(), values));
		self
	}

	pub fn raw(mut self, raw: Option<Where>) -> Self {
		self.raw = raw;
		self
	}

	pub fn paginate(mut self, pagination: Pagination) -> Self {
		self.pagination = pagination;
		self
	}

	pub fn limit(mut self, limit: u64) -> Self {
		self.pagination.limit = Some(limit);
		self
	}

	/// The same query without limit, offset or ordering, as used for counting
	pub fn unpaginated(&self) -> Self {
		Self {
			pagination: Pagination::default(),
			..self.clone()
		}
	}
}

impl fmt::Display for Query {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SELECT * FROM {}", self.table)?;
		let mut clauses = Vec::new();
		for c in self.filter.iter() {
			clauses.push(match c.operator {
				Operator::Like => format!("{} ILIKE '{}'", c.column, c.pattern()),
				Operator::Inside => format!("{} IN ({})", c.column, c.values().join(", ")),
				Operator::Raw => format!("{} = {}", c.column, c.value),
				op => format!("{} {} '{}'", c.column, op, c.value),
			});
		}
		if let Some((column, values)) = &self.within {
			let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
			clauses.push(format!("{column} IN ({})", values.join(", ")));
		}
		if let Some(raw) = &self.raw {
			clauses.push(format!("({raw})"));
		}
		if !clauses.is_empty() {
			write!(f, " WHERE {}", clauses.join(" AND "))?;
		}
		if !self.pagination.order.is_empty() {
			let order: Vec<String> = self
				.pagination
				.order
				.iter()
				.map(|o| format!("{} {}", o.column, o.direction.as_str()))
				.collect();
			write!(f, " ORDER BY {}", order.join(", "))?;
		}
		if let Some(limit) = self.pagination.limit {
			write!(f, " LIMIT {limit}")?;
		}
		if let Some(offset) = self.pagination.offset {
			write!(f, " OFFSET {offset}")?;
		}
		Ok(())
	}
}
