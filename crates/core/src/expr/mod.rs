//! Filter and pagination expressions.
//!
//! Clients send two small string languages, one expression per table:
//!
//! - filter: `column OP value (';' column OP value)*` where `OP` is one of
//!   `<=>`, `>=`, `<=`, `=`, `>`, `<`, `~`, `#`
//! - pagination: `name=value (';' name=value)*` where `name` is one of
//!   `limit`, `offset`, `orderby`

mod filter;
mod pagination;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use self::filter::parse_filter;
pub use self::pagination::parse_pagination;

/// A comparison operator of a filter clause
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Operator {
	/// `=`
	Equal,
	/// `>`
	MoreThan,
	/// `<`
	LessThan,
	/// `>=`
	MoreThanOrEqual,
	/// `<=`
	LessThanOrEqual,
	/// `~`, case-insensitive substring match
	Like,
	/// `#`, membership in a comma separated list
	Inside,
	/// `<=>`, the value is emitted unescaped as the right hand side of an equality
	Raw,
}

impl Operator {
	pub fn as_str(&self) -> &'static str {
		match self {
			Operator::Equal => "=",
			Operator::MoreThan => ">",
			Operator::LessThan => "<",
			Operator::MoreThanOrEqual => ">=",
			Operator::LessThanOrEqual => "<=",
			Operator::Like => "~",
			Operator::Inside => "#",
			Operator::Raw => "<=>",
		}
	}

	pub(crate) fn from_symbol(s: &str) -> Option<Self> {
		match s {
			"=" => Some(Operator::Equal),
			">" => Some(Operator::MoreThan),
			"<" => Some(Operator::LessThan),
			">=" => Some(Operator::MoreThanOrEqual),
			"<=" => Some(Operator::LessThanOrEqual),
			"~" => Some(Operator::Like),
			"#" => Some(Operator::Inside),
			"<=>" => Some(Operator::Raw),
			_ => None,
		}
	}
}

impl fmt::Display for Operator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A single `column OP value` clause
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Condition {
	pub operator: Operator,
	pub column: String,
	pub value: String,
}

impl Condition {
	pub fn new(operator: Operator, column: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			operator,
			column: column.into(),
			value: value.into(),
		}
	}

	/// The `LIKE` pattern of a `~` clause: the value wrapped in wildcards,
	/// with every space replaced by a wildcard
	pub fn pattern(&self) -> String {
		format!("%{}%", self.value.replace(' ', "%"))
	}

	/// The list of a `#` clause, split on commas
	pub fn values(&self) -> Vec<String> {
		self.value.split(',').map(|v| v.trim().to_owned()).collect()
	}
}

impl fmt::Display for Condition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}{}{}", self.column, self.operator, self.value)
	}
}

/// The parsed clauses of a filter expression, all of which must hold
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Filter(pub Vec<Condition>);

impl Filter {
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Condition> {
		self.0.iter()
	}
}

impl fmt::Display for Filter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, c) in self.0.iter().enumerate() {
			if i > 0 {
				f.write_str(";")?;
			}
			write!(f, "{c}")?;
		}
		Ok(())
	}
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Direction {
	#[default]
	Asc,
	Desc,
}

impl Direction {
	pub fn as_str(&self) -> &'static str {
		match self {
			Direction::Asc => "ASC",
			Direction::Desc => "DESC",
		}
	}
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Order {
	pub column: String,
	pub direction: Direction,
}

/// The parsed form of a pagination expression
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Pagination {
	pub limit: Option<u64>,
	pub offset: Option<u64>,
	pub order: Vec<Order>,
}

impl Pagination {
	pub fn is_empty(&self) -> bool {
		self.limit.is_none() && self.offset.is_none() && self.order.is_empty()
	}
}

/// A raw predicate with `?` placeholders and the values bound to them
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Where {
	pub sql: String,
	#[serde(rename = "val", default)]
	pub values: Vec<String>,
}

impl fmt::Display for Where {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {:?}", self.sql, self.values)
	}
}
