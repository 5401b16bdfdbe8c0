use std::sync::LazyLock;
use std::time::Duration;

/// The maximum depth to which relations are loaded eagerly. Rows found at this
/// depth are returned without their own relations attached.
pub static MAX_RELATION_DEPTH: LazyLock<usize> =
	lazy_env_parse!("DB2GQL_MAX_RELATION_DEPTH", usize, 3);

/// The maximum number of page results held in the page cache
pub static PAGE_CACHE_SIZE: LazyLock<usize> = lazy_env_parse!("DB2GQL_PAGE_CACHE_SIZE", usize, 500);

/// How long, in seconds, a cached page result remains valid (default: 5 hours)
pub static PAGE_CACHE_TTL: LazyLock<u64> = lazy_env_parse!("DB2GQL_PAGE_CACHE_TTL", u64, 18_000);

/// Whether page and first-row queries may be answered from the page cache
pub static PAGE_CACHE_ENABLED: LazyLock<bool> =
	lazy_env_parse!("DB2GQL_PAGE_CACHE_ENABLED", bool, false);

/// The database namespace (schema) introspected when none is configured
pub static DEFAULT_NAMESPACE: LazyLock<String> =
	lazy_env_parse!("DB2GQL_DEFAULT_NAMESPACE", String, || "public".to_owned());

/// The maximum number of connections held by a SQL connection pool
pub static POOL_MAX_CONNECTIONS: LazyLock<u32> =
	lazy_env_parse!("DB2GQL_POOL_MAX_CONNECTIONS", u32, 10);

/// The page cache entry lifetime as a [`Duration`]
pub fn page_cache_ttl() -> Duration {
	Duration::from_secs(*PAGE_CACHE_TTL)
}
