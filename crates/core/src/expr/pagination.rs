use super::{Direction, Order, Pagination};
use crate::err::Error;

/// Parses a pagination expression.
///
/// Recognised parameters are `limit`, `offset` and `orderby`; anything else
/// is ignored. `orderby` takes `<column> [asc|desc]` and may be repeated, in
/// which case the orderings apply in the order given.
pub fn parse_pagination(expr: &str) -> Result<Pagination, Error> {
	let mut out = Pagination::default();
	for param in expr.split(';') {
		let param = param.trim();
		if param.is_empty() {
			continue;
		}
		let (name, value) =
			param.split_once('=').ok_or_else(|| Error::InvalidPagination(param.to_owned()))?;
		let value = value.trim();
		match name.trim().to_ascii_lowercase().as_str() {
			"limit" => out.limit = Some(parse_count(param, value)?),
			"offset" => out.offset = Some(parse_count(param, value)?),
			"orderby" => out.order.push(parse_order(param, value)?),
			other => trace!("Ignoring unknown pagination parameter `{other}`"),
		}
	}
	Ok(out)
}

fn parse_count(param: &str, value: &str) -> Result<u64, Error> {
	value.parse().map_err(|_| Error::InvalidPagination(param.to_owned()))
}

fn parse_order(param: &str, value: &str) -> Result<Order, Error> {
	let mut parts = value.split_whitespace();
	let column = parts.next().ok_or_else(|| Error::InvalidPagination(param.to_owned()))?;
	let direction = match parts.next().map(str::to_ascii_lowercase).as_deref() {
		None | Some("asc") => Direction::Asc,
		Some("desc") => Direction::Desc,
		Some(_) => return Err(Error::InvalidPagination(param.to_owned())),
	};
	if parts.next().is_some() {
		return Err(Error::InvalidPagination(param.to_owned()));
	}
	Ok(Order {
		column: column.to_owned(),
		direction,
	})
}
