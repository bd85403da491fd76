//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the endpoint names derived from a bundle identifier
    Names {
        /// Bundle identifier of the host application
        bundle_id: String,

        /// Output format: text, json
        #[arg(long, value_name = "FORMAT", default_value = "text")]
        format: String,
    },

    /// Launch an installer and drive it through an update
    Update {
        /// Path to the installer executable
        #[arg(long, value_name = "PATH")]
        installer: PathBuf,

        /// Bundle identifier of the host application
        #[arg(long, value_name = "STRING")]
        bundle_id: String,

        /// JSON file with the installation data
        #[arg(long, value_name = "PATH")]
        input: PathBuf,

        /// JSON file with the appcast item's archive descriptor
        #[arg(long, value_name = "PATH")]
        appcast: Option<PathBuf>,

        /// Currently installed version, for display
        #[arg(long, value_name = "VERSION", default_value = "unknown")]
        host_version: String,

        /// Resume an install whose stage 1 already completed
        #[arg(long)]
        resume: bool,

        /// The install needs system authorization
        #[arg(long)]
        needs_system_authorization: bool,

        /// Do not prompt for authorization now
        #[arg(long)]
        no_driver_interaction: bool,

        /// Do not allow any user interaction from the updater
        #[arg(long)]
        no_updater_interaction: bool,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output file path
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration in use
    Show {
        /// Output format: yaml, json
        #[arg(long, value_name = "FORMAT", default_value = "yaml")]
        format: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_update_arguments() {
        let cli = Cli::try_parse_from([
            "autoupdate",
            "update",
            "--installer",
            "/usr/local/libexec/Autoupdate",
            "--bundle-id",
            "com.example.App",
            "--input",
            "input.json",
            "--resume",
        ])
        .unwrap();

        match cli.command {
            Commands::Update {
                bundle_id,
                resume,
                no_driver_interaction,
                ..
            } => {
                assert_eq!(bundle_id, "com.example.App");
                assert!(resume);
                assert!(!no_driver_interaction);
            }
            _ => panic!("expected update command"),
        }
    }
}
