use std::sync::LazyLock;

use db2gql_core::lazy_env_parse;

pub const LOGO: &str = "
     _ _       ___              _
  __| | |__   |_  )  __ _  __ _| |
 / _` | '_ \\   / /  / _` |/ _` | |
 \\__,_|_.__/  /___| \\__, |\\__, |_|
                    |___/    |_|
";

/// The publicly visible name of the server
pub const PKG_NAME: &str = "db2gql";

/// The version of the running binary
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The address the server listens on when none is given
pub const DEFAULT_BIND: &str = "127.0.0.1:4000";

/// Whether GraphiQL is served on GET requests to `/graphql`
pub static ENABLE_GRAPHQL_DASHBOARD: LazyLock<bool> =
	lazy_env_parse!("DB2GQL_ENABLE_GRAPHQL_DASHBOARD", bool, false);
