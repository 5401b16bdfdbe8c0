use std::net::SocketAddr;
use std::sync::Arc;

use clap::Args;
use db2gql_core::dbs::Db2Graphql;

use super::config::ConnectionArguments;
use crate::cnf::{DEFAULT_BIND, LOGO};
use crate::err::Error;
use crate::net;

#[derive(Args, Debug)]
pub struct StartCommandArguments {
	#[command(flatten)]
	conn: ConnectionArguments,
	#[arg(help = "The hostname or IP address to listen for connections on")]
	#[arg(env = "DB2GQL_BIND", short = 'b', long = "bind")]
	#[arg(default_value = DEFAULT_BIND)]
	listen_address: SocketAddr,
	#[arg(help = "Whether to hide the startup banner")]
	#[arg(env = "DB2GQL_NO_BANNER", long)]
	#[arg(default_value_t = false)]
	no_banner: bool,
}

#[tokio::main]
pub async fn init(
	StartCommandArguments {
		conn,
		listen_address,
		no_banner,
	}: StartCommandArguments,
) -> Result<(), Error> {
	// Check if a banner should be outputted
	if !no_banner {
		println!("{LOGO}");
	}
	// Connect to the database
	let api = Db2Graphql::connect(conn.descriptor()?).await?;
	// Introspect the database before accepting requests
	let graph = api.get_database_schema(false).await?;
	info!("Serving {} tables from namespace `{}`", graph.len(), graph.namespace);
	// Start the web server
	net::init(Arc::new(api), listen_address).await?;
	Ok(())
}
