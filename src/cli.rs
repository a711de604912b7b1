// ABOUTME: CLI argument definitions for lockclaw — thin glue over the core subsystems.
// ABOUTME: Secrets, login, permission checks, and rule management subcommands.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "lockclaw",
    about = "Credential vault, OAuth login, and command permission gate for a local agent"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage encrypted secrets.
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
    /// Authorize against a remote server and store the resulting token.
    Login {
        /// Name the token is stored under.
        server: String,
        /// Resource URL used for authorization server discovery.
        resource: String,
        /// Scopes to request (repeatable). Falls back to config defaults.
        #[arg(long = "scope")]
        scopes: Vec<String>,
    },
    /// Check whether a shell command would be permitted.
    Check {
        /// The command, given as trailing arguments.
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Manage persisted permission rules.
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum SecretAction {
    /// Print a secret's value as JSON.
    Get { name: String },
    /// Store a secret. The value is parsed as JSON, or stored as a string.
    Set { name: String, value: String },
    /// Delete a secret.
    Delete { name: String },
    /// List secret names (never values).
    List,
}

#[derive(Debug, Subcommand)]
pub enum RulesAction {
    /// Show the persisted allow and deny lists.
    List,
    /// Add an always-allow pattern (exact name or trailing-`*` prefix).
    Allow { pattern: String },
    /// Add an always-deny pattern.
    Deny { pattern: String },
    /// Remove a pattern from both lists.
    Remove { pattern: String },
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
    fn check_collects_trailing_command() {
        let cli = Cli::parse_from(["lockclaw", "check", "git", "push", "--force"]);
        match cli.command {
            Command::Check { command } => {
                assert_eq!(command, vec!["git", "push", "--force"]);
            }
            other => panic!("expected Check, got {:?}", other),
        }
    }

    #[test]
    fn login_accepts_repeated_scopes() {
        let cli = Cli::parse_from([
            "lockclaw",
            "login",
            "github",
            "https://mcp.example.com/v1",
            "--scope",
            "read",
            "--scope",
            "write",
        ]);
        match cli.command {
            Command::Login { server, scopes, .. } => {
                assert_eq!(server, "github");
                assert_eq!(scopes, vec!["read", "write"]);
            }
            other => panic!("expected Login, got {:?}", other),
        }
    }
}
