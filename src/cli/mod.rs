mod config;
mod sdl;
mod start;
mod version;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::cnf::LOGO;
use sdl::SdlCommandArguments;
use start::StartCommandArguments;

const INFO: &str = "
To get started using db2gql, point it at a database and start the server:

  db2gql start --client pg --url postgres://localhost/app

Print the schema it would serve with `db2gql sdl`, using the same connection flags.
";

#[derive(Parser, Debug)]
#[command(name = "db2gql command-line interface and server", bin_name = "db2gql")]
#[command(about = INFO, before_help = LOGO)]
#[command(disable_version_flag = true, arg_required_else_help = true)]
struct Cli {
	#[arg(help = "The logging level for the command-line tool")]
	#[arg(env = "DB2GQL_LOG", short = 'l', long = "log")]
	#[arg(default_value = "info")]
	#[arg(value_parser = ["none", "full", "error", "warn", "info", "debug", "trace"])]
	#[arg(global = true)]
	log: String,
	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	#[command(about = "Introspect a database and serve its GraphQL API")]
	Start(StartCommandArguments),
	#[command(about = "Print the GraphQL schema generated for a database")]
	Sdl(SdlCommandArguments),
	#[command(about = "Output the command-line tool version information")]
	Version,
}

pub fn init() -> ExitCode {
	let args = Cli::parse();
	// Initialize logging
	if let Err(e) = crate::telemetry::builder().with_log_level(&args.log).init() {
		eprintln!("{e}");
		return ExitCode::FAILURE;
	}
	let output = match args.command {
		Commands::Start(args) => start::init(args),
		Commands::Sdl(args) => sdl::init(args),
		Commands::Version => version::init(),
	};
	if let Err(e) = output {
		error!("{e}");
		ExitCode::FAILURE
	} else {
		ExitCode::SUCCESS
	}
}

#[cfg(test)]
mod tests {
	use clap::CommandFactory;

	use super::*;

	#[test]
	fn verify_cli() {
		Cli::command().debug_assert();
	}

	#[test]
	fn parses_subcommands() {
		let cli = Cli::try_parse_from(["db2gql", "--log", "debug", "version"]).unwrap();
		assert_eq!(cli.log, "debug");
		assert!(matches!(cli.command, Commands::Version));
		let cli = Cli::try_parse_from(["db2gql", "sdl", "--client", "memory"]).unwrap();
		assert!(matches!(cli.command, Commands::Sdl(_)));
		assert!(Cli::try_parse_from(["db2gql", "--log", "loud", "version"]).is_err());
	}
}
