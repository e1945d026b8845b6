//! Config commands

use clap::{Args, Subcommand};

use crate::config::{config_file_path, Config, ConfigKey};
use crate::output::{to_json, OutputFormat};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective value of a key
    Get {
        #[arg(value_enum)]
        key: ConfigKey,
    },
    /// Store a value in the config file
    Set {
        #[arg(value_enum)]
        key: ConfigKey,
        value: String,
    },
    /// Remove a key from the config file so its default applies
    Unset {
        #[arg(value_enum)]
        key: ConfigKey,
    },
    /// Show every key with its effective value
    List,
    /// Print the config file location
    Path,
    /// Write a config file with every key at its default
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(args: &ConfigArgs, format: OutputFormat) -> anyhow::Result<()> {
    let path = config_file_path();

    match &args.command {
        ConfigCommands::Get { key } => {
            println!("{}", Config::load()?.get(*key));
        }
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(*key, value)?;
            config.save()?;
            tracing::info!("Set {} in {}", key, path.display());
            println!("{} = {}", key, config.get(*key));
        }
        ConfigCommands::Unset { key } => {
            let mut config = Config::load()?;
            if config.unset(*key) {
                config.save()?;
            }
            println!("{} = {} (default)", key, config.get(*key));
        }
        ConfigCommands::List => {
            let entries = Config::load()?.entries();
            if format.is_json() {
                println!("{}", to_json(&entries)?);
                return Ok(());
            }

            println!("# {}", path.display());
            for entry in &entries {
                let source = if entry.explicit { "" } else { " (default)" };
                println!("{} = {}{}", entry.key, entry.value, source);
            }
        }
        ConfigCommands::Path => {
            println!("{}", path.display());
        }
        ConfigCommands::Init { force } => {
            // --force also recovers from a file that no longer parses
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at {}. Use --force to replace it.",
                    path.display()
                );
            }
            Config::defaults().save()?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}
