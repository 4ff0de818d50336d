use clap::{Parser, Subcommand};
use mutuals::config::MutualsConfig;
use std::path::{Path, PathBuf};

pub mod address;
pub mod config;
pub mod contacts;
pub mod fingerprint;
pub mod logging;
pub mod simulate;
pub mod version;

#[derive(Parser)]
#[command(name = "mutuals")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Private contact discovery between two parties", long_about = None)]
pub struct Cli {
    /// Path to config file (default: <config dir>/mutuals/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Normalize and fingerprint a contacts file (one identifier per line)
    Fingerprint {
        /// Contacts file; blank lines and lines starting with '#' are skipped
        #[arg(long)]
        input: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Run a full discovery session between two contacts files in-process
    Simulate {
        /// First party's contacts file
        #[arg(long)]
        first: PathBuf,

        /// Second party's contacts file
        #[arg(long)]
        second: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Derive the ledger address of a session
    Address {
        /// Session id (64 hex characters)
        #[arg(long)]
        session_id: String,
    },

    /// Write a default config file
    ConfigInit {
        /// Where to write it (default: <config dir>/mutuals/config.toml)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display version information
    Version,
}

fn load_config(path: Option<&Path>) -> Result<MutualsConfig, Box<dyn std::error::Error>> {
    let config = MutualsConfig::load_or_default(path)?;
    logging::init(&config.logging)?;
    Ok(config)
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Fingerprint { input, json } => {
            let config = load_config(config_path)?;
            fingerprint::execute(&config, &input, json)
        }
        Commands::Simulate {
            first,
            second,
            json,
        } => {
            let config = load_config(config_path)?;
            simulate::execute(&config, &first, &second, json).await
        }
        Commands::Address { session_id } => address::execute(&session_id),
        Commands::ConfigInit { path, force } => config::execute(path, force),
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_fingerprint() {
        let cli = Cli::parse_from(["mutuals", "fingerprint", "--input", "contacts.txt"]);

        assert!(cli.config.is_none());
        match cli.command {
            Commands::Fingerprint { input, json } => {
                assert_eq!(input, PathBuf::from("contacts.txt"));
                assert!(!json);
            }
            _ => panic!("Expected Fingerprint command"),
        }
    }

    #[test]
    fn test_cli_parse_simulate_with_config() {
        let cli = Cli::parse_from([
            "mutuals",
            "simulate",
            "--first",
            "alice.txt",
            "--second",
            "bob.txt",
            "--json",
            "--config",
            "/etc/mutuals/config.toml",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/etc/mutuals/config.toml")));
        match cli.command {
            Commands::Simulate {
                first,
                second,
                json,
            } => {
                assert_eq!(first, PathBuf::from("alice.txt"));
                assert_eq!(second, PathBuf::from("bob.txt"));
                assert!(json);
            }
            _ => panic!("Expected Simulate command"),
        }
    }

    #[test]
    fn test_cli_parse_address() {
        let cli = Cli::parse_from(["mutuals", "address", "--session-id", "ab"]);
        match cli.command {
            Commands::Address { session_id } => assert_eq!(session_id, "ab"),
            _ => panic!("Expected Address command"),
        }
    }

    #[test]
    fn test_cli_parse_config_init() {
        let cli = Cli::parse_from(["mutuals", "config-init"]);
        match cli.command {
            Commands::ConfigInit { path, force } => {
                assert!(path.is_none());
                assert!(!force);
            }
            _ => panic!("Expected ConfigInit command"),
        }
    }

    #[test]
    fn test_cli_parse_version() {
        let cli = Cli::parse_from(["mutuals", "version"]);
        assert!(matches!(cli.command, Commands::Version));
    }

    #[test]
    fn test_simulate_requires_both_files() {
        assert!(Cli::try_parse_from(["mutuals", "simulate", "--first", "a.txt"]).is_err());
    }
}
