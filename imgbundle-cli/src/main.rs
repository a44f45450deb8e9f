//! imgbundle CLI - download a list of images as one zip archive
//!
//! This binary is a thin front end over the `imgbundle` library: it merges
//! settings from the config file and the command line, sets up logging and
//! shows progress while the library does the work.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use console::style;

use imgbundle::logging::{init_logging, LoggingConfig};
use imgbundle::ConfigFile;

use commands::config::ConfigCommands;
use commands::fetch::FetchArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "imgbundle", version, about, long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download URLs into a zip archive (or a single file for one URL)
    Fetch(FetchArgs),

    /// View or change settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", style("error:").red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let file = ConfigFile::load()?;

    let mut logging = LoggingConfig::from_settings(&file.logging);
    if cli.verbose {
        logging = logging.with_level("debug");
    }
    let _guard = init_logging(&logging)?;

    match cli.command {
        Command::Fetch(args) => commands::fetch::run(args, &file),
        Command::Config { command } => commands::config::run(command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::try_parse_from([
            "imgbundle",
            "fetch",
            "https://example.com/a.png",
            "https://example.com/b.png",
            "--name",
            "trip",
            "-c",
            "3",
            "--verbose",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Command::Fetch(args) => {
                assert_eq!(args.urls.len(), 2);
                assert_eq!(args.name.as_deref(), Some("trip"));
                assert_eq!(args.concurrency, Some(3));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_set() {
        let cli =
            Cli::try_parse_from(["imgbundle", "config", "set", "download.concurrency", "8"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Command::Config {
                command: ConfigCommands::Set { .. }
            }
        ));
    }
}
