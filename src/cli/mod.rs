//! CLI module - Command-line interface for fintrack
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};

/// fintrack - personal finance tracker backend
/// Credential service, admin gateway and owner-scoped ledgers
#[derive(Parser)]
#[command(name = "fintrack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server and the retention scheduler
    #[command(alias = "daemon")]
    Serve,

    /// Create a default config file
    Init,

    /// Create an administrator, or promote an existing account
    CreateAdmin {
        /// Email address of the account
        email: String,

        /// Display name for a new account
        #[arg(long)]
        full_name: Option<String>,

        /// Initial password; a temporary one is generated when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// List all accounts with role and last login
    #[command(alias = "ls")]
    Users,

    /// Delete login history older than the retention window now
    PruneLogins {
        /// Override the configured window (hours)
        #[arg(long)]
        hours: Option<i64>,
    },
}

pub use commands::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_admin() {
        let cli = Cli::try_parse_from([
            "fintrack",
            "create-admin",
            "admin@example.com",
            "--full-name",
            "Site Admin",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::CreateAdmin {
                email,
                full_name,
                password,
            }) => {
                assert_eq!(email, "admin@example.com");
                assert_eq!(full_name.as_deref(), Some("Site Admin"));
                assert!(password.is_none());
            }
            _ => panic!("expected create-admin"),
        }
    }

    #[test]
    fn test_parse_serve_alias() {
        let cli = Cli::try_parse_from(["fintrack", "daemon"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve)));

        let cli = Cli::try_parse_from(["fintrack"]).unwrap();
        assert!(cli.command.is_none());
    }
}
