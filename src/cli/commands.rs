//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// HubSpot incremental extraction CLI
#[derive(Parser, Debug)]
#[command(name = "hubspot-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (JSON, or YAML by extension)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// State file (JSON), rewritten after every checkpoint
    #[arg(short, long, global = true)]
    pub state: Option<PathBuf>,

    /// Inline state JSON
    #[arg(long, global = true)]
    pub state_json: Option<String>,

    /// Streams to sync (comma-separated, overrides the config)
    #[arg(long, global = true, value_delimiter = ',')]
    pub streams: Vec<String>,

    /// Output format for `check` and `streams`
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Exchange the refresh token and probe the API
    Check,

    /// List stream names in sync order
    Streams,

    /// Extract every selected stream to stdout
    Read,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_read() {
        let cli = Cli::try_parse_from([
            "hubspot-sync",
            "--config",
            "config.json",
            "--state",
            "state.json",
            "--streams",
            "contacts,deals",
            "read",
        ])
        .unwrap();

        assert_eq!(cli.command, Commands::Read);
        assert_eq!(cli.config, Some(PathBuf::from("config.json")));
        assert_eq!(cli.state, Some(PathBuf::from("state.json")));
        assert_eq!(cli.streams, vec!["contacts", "deals"]);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["hubspot-sync", "check", "-C", "c.yaml", "--verbose"]).unwrap();
        assert_eq!(cli.command, Commands::Check);
        assert!(cli.verbose);
        assert!(cli.streams.is_empty());
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["hubspot-sync", "--config", "c.json"]).is_err());
    }
}
