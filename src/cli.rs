use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wpforge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Provision WordPress environments from your terminal")]
#[command(
    long_about = "A provisioning CLI that stands up local, staging, and production WordPress environments by sequencing WP-CLI, git, and npm together with the server-provisioning and DNS APIs."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision a local development environment
    Local {
        /// Name of the site (prompted if omitted)
        #[arg(value_name = "NAME")]
        name: Option<String>,
    },

    /// Provision a staging environment
    Staging {
        /// Subdomain of the site (prompted if omitted)
        #[arg(value_name = "SUBDOMAIN")]
        subdomain: Option<String>,
    },

    /// Provision a production environment
    Production {
        /// Subdomain of the site (prompted if omitted)
        #[arg(value_name = "SUBDOMAIN")]
        subdomain: Option<String>,
    },

    /// Inspect and edit stored configuration values
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// List stored keys and values
    List,

    /// Print one stored value
    Get {
        #[arg(value_name = "KEY")]
        key: String,
    },

    /// Store a value
    Set {
        #[arg(value_name = "KEY")]
        key: String,

        #[arg(value_name = "VALUE")]
        value: String,
    },

    /// Remove a stored value
    Delete {
        #[arg(value_name = "KEY")]
        key: String,
    },
}

impl Cli {
    pub fn init_logging(&self) {
        if self.quiet {
            return;
        }

        let level = match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };

        env_logger::Builder::from_default_env()
            .filter_level(level)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn subdomain_is_optional_on_provisioning_commands() {
        let cli = Cli::try_parse_from(["wpforge", "staging"]).unwrap();
        match cli.command {
            Commands::Staging { subdomain } => assert!(subdomain.is_none()),
            _ => panic!("expected staging command"),
        }

        let cli = Cli::try_parse_from(["wpforge", "staging", "demo"]).unwrap();
        match cli.command {
            Commands::Staging { subdomain } => assert_eq!(subdomain.as_deref(), Some("demo")),
            _ => panic!("expected staging command"),
        }
    }

    #[test]
    fn config_subcommands_parse() {
        let cli = Cli::try_parse_from(["wpforge", "config", "set", "forge_token", "abc"]).unwrap();
        match cli.command {
            Commands::Config {
                command: ConfigCommand::Set { key, value },
            } => {
                assert_eq!(key, "forge_token");
                assert_eq!(value, "abc");
            }
            _ => panic!("expected config set"),
        }
    }
}
