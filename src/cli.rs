//! CLI command definitions for task-manager.
//!
//! This module defines the CLI structure using clap's derive macros.

use clap::{Parser, Subcommand};

/// Task manager HTTP server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the HTTP server (default if no subcommand given)
    Serve,

    /// Load and validate configuration, then print it without secrets
    CheckConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serve_and_stderr() {
        let cli = Cli::parse_from(["task-manager"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.log, "2");
        assert!(!cli.verbose);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["task-manager", "serve", "--port", "8081", "-d", "x.db"]);
        assert_eq!(cli.command, Some(Command::Serve));
        assert_eq!(cli.port, Some(8081));
        assert_eq!(cli.database.as_deref(), Some("x.db"));
    }

    #[test]
    fn check_config_subcommand() {
        let cli = Cli::parse_from(["task-manager", "check-config", "-c", "cfg.yaml"]);
        assert_eq!(cli.command, Some(Command::CheckConfig));
        assert_eq!(cli.config.as_deref(), Some("cfg.yaml"));
    }
}
