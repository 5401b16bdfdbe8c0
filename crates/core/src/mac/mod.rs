/// Declares a setting read once from an environment variable.
///
/// Values which are missing or fail to parse as `$t` fall back to the
/// default, given either as an expression or as a closure body.
#[macro_export]
macro_rules! lazy_env_parse {
	($key:expr, $t:ty, || $default:expr) => {
		std::sync::LazyLock::new(|| {
			std::env::var($key).ok().and_then(|v| v.parse::<$t>().ok()).unwrap_or_else(|| $default)
		})
	};
	($key:expr, $t:ty, $default:expr) => {
		std::sync::LazyLock::new(|| {
			std::env::var($key).ok().and_then(|v| v.parse::<$t>().ok()).unwrap_or($default)
		})
	};
}
