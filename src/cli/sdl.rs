use clap::Args;
use db2gql_core::dbs::Db2Graphql;

use super::config::ConnectionArguments;
use crate::err::Error;

#[derive(Args, Debug)]
pub struct SdlCommandArguments {
	#[command(flatten)]
	conn: ConnectionArguments,
}

#[tokio::main]
pub async fn init(
	SdlCommandArguments {
		conn,
	}: SdlCommandArguments,
) -> Result<(), Error> {
	let api = Db2Graphql::connect(conn.descriptor()?).await?;
	print!("{}", api.get_sdl(false).await?);
	Ok(())
}
