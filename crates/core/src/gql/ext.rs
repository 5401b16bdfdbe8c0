use crate::val::{Row, Value};

/// Turns a table name into a type name: `user_account` becomes `UserAccount`
pub fn to_camel_case(name: &str) -> String {
	name.split('_')
		.map(|part| {
			let mut chars = part.chars();
			match chars.next() {
				Some(first) => first.to_uppercase().chain(chars).collect(),
				None => String::new(),
			}
		})
		.collect()
}

/// The object type generated for a table
pub fn type_name(table: &str) -> String {
	to_camel_case(table)
}

/// The paginated wrapper type generated for a table
pub fn page_name(table: &str) -> String {
	format!("Page{}", to_camel_case(table))
}

/// The mutation input type generated for a table
pub fn input_name(table: &str) -> String {
	format!("Input{}", to_camel_case(table))
}

/// Typed access to resolver arguments
pub trait ArgsExt {
	fn get_str(&self, key: &str) -> Option<&str>;
	fn get_bool(&self, key: &str) -> Option<bool>;
	fn get_object(&self, key: &str) -> Option<&Row>;
}

impl ArgsExt for Row {
	fn get_str(&self, key: &str) -> Option<&str> {
		self.get(key).and_then(Value::as_str)
	}

	fn get_bool(&self, key: &str) -> Option<bool> {
		self.get(key).and_then(Value::as_bool)
	}

	fn get_object(&self, key: &str) -> Option<&Row> {
		self.get(key).and_then(Value::as_object)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn camel_cases_table_names() {
		assert_eq!(to_camel_case("foo"), "Foo");
		assert_eq!(to_camel_case("user_account"), "UserAccount");
		assert_eq!(to_camel_case("_private"), "Private");
		assert_eq!(to_camel_case("already_Camel"), "AlreadyCamel");
		assert_eq!(page_name("order_line"), "PageOrderLine");
		assert_eq!(input_name("foo"), "InputFoo");
	}
}
