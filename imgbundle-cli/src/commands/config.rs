//! `config` subcommands: inspect and edit the settings file.

use clap::Subcommand;
use imgbundle::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the value of a setting
    Get {
        /// Setting name as section.key (e.g. download.concurrency)
        key: String,
    },

    /// Change a setting
    Set {
        /// Setting name as section.key (e.g. download.concurrency)
        key: String,

        /// New value
        value: String,
    },

    /// List every setting
    List,

    /// Print the settings file location
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => run_get(&key),
        ConfigCommands::Set { key, value } => run_set(&key, &value),
        ConfigCommands::List => run_list(),
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown setting '{}'. Run 'imgbundle config list' to see available settings.",
            key
        ))
    })
}

fn run_get(key: &str) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let config = ConfigFile::load()?;

    let value = key.get(&config);
    if value.is_empty() {
        println!("(not set)");
    } else {
        println!("{}", value);
    }
    Ok(())
}

fn run_set(key: &str, value: &str) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let mut config = ConfigFile::load()?;

    key.set(&mut config, value)?;
    config.save()?;

    println!("Set {} = {}", key, key.get(&config));
    Ok(())
}

fn run_list() -> Result<(), CliError> {
    let config = ConfigFile::load()?;
    println!("# {}", config_file_path().display());

    let mut section = "";
    for key in ConfigKey::all() {
        if key.section() != section {
            section = key.section();
            println!();
            println!("[{}]", section);
        }

        let value = key.get(&config);
        if value.is_empty() {
            println!("{} = (not set)", key.key_name());
        } else {
            println!("{} = {}", key.key_name(), value);
        }
    }
    Ok(())
}
