// ABOUTME: Entry point for lockclaw — wires the vault, store, gate, and auth flow together.
// ABOUTME: Parses CLI args, initializes tracing, and dispatches to the core subsystems.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lockclaw::cli::{Cli, Command, RulesAction, SecretAction};
use lockclaw::config::Config;
use lockclaw::oauth::{AuthError, AuthFlow, UrlOpener};
use lockclaw::permission::PermissionGate;
use lockclaw::prompt::TerminalPrompt;
use lockclaw::vault::{FileBackend, KeyVault, KeyringBackend, SecretStore};

/// Browser hand-off used by the binary: print the URL for the user to open.
struct ConsoleOpener;

impl UrlOpener for ConsoleOpener {
    fn open(&self, url: &str) -> Result<(), AuthError> {
        println!("Open this URL in your browser to authorize:");
        println!();
        println!("    {url}");
        println!();
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load()?;

    // One vault/store/gate context, passed down — no module-level singletons.
    let vault = Arc::new(KeyVault::new(
        Box::new(KeyringBackend::new()),
        Some(Box::new(FileBackend::new(Config::key_file_path()))),
    ));
    let store = Arc::new(SecretStore::new(vault, Config::secrets_path()));

    match cli.command {
        Command::Secret { action } => run_secret(&store, action).await,
        Command::Login {
            server,
            resource,
            scopes,
        } => {
            let scopes = if scopes.is_empty() {
                config.auth.scopes.clone()
            } else {
                scopes
            };
            let flow = AuthFlow::new(
                store,
                config.auth.client_id.clone(),
                Duration::from_secs(config.auth.callback_timeout_seconds),
            );
            run_login(&flow, &server, &resource, &scopes).await
        }
        Command::Check { command } => {
            let gate = PermissionGate::new(Config::permissions_path(), Arc::new(TerminalPrompt))?;
            run_check(&gate, &command.join(" ")).await
        }
        Command::Rules { action } => {
            let gate = PermissionGate::new(Config::permissions_path(), Arc::new(TerminalPrompt))?;
            run_rules(&gate, action)
        }
    }
}

async fn run_secret(store: &SecretStore, action: SecretAction) -> anyhow::Result<()> {
    match action {
        SecretAction::Get { name } => match store.get(&name).await? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => anyhow::bail!("no secret named '{name}'"),
        },
        SecretAction::Set { name, value } => {
            let parsed = serde_json::from_str(&value)
                .unwrap_or_else(|_| serde_json::Value::String(value));
            store.save(&name, parsed).await?;
            println!("Saved '{name}'.");
        }
        SecretAction::Delete { name } => {
            if store.delete(&name).await? {
                println!("Deleted '{name}'.");
            } else {
                anyhow::bail!("no secret named '{name}'");
            }
        }
        SecretAction::List => {
            for name in store.names().await? {
                println!("{name}");
            }
        }
    }
    Ok(())
}

async fn run_login(
    flow: &AuthFlow,
    server: &str,
    resource: &str,
    scopes: &[String],
) -> anyhow::Result<()> {
    if let Some(token) = flow.stored_token(server).await? {
        println!(
            "Already authorized for '{server}' (expires: {}).",
            token
                .expires_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
        );
        return Ok(());
    }

    let token = flow.authorize(server, resource, scopes, &ConsoleOpener).await?;
    println!(
        "Authorized '{server}'. Token stored{}.",
        token
            .expires_at
            .map(|t| format!(", expires {}", t.to_rfc3339()))
            .unwrap_or_default(),
    );
    Ok(())
}

async fn run_check(gate: &PermissionGate, command: &str) -> anyhow::Result<()> {
    match gate.check(command).await {
        Ok(allowance) => {
            println!("allowed ({allowance:?})");
            Ok(())
        }
        Err(e) => {
            anyhow::bail!("{e}");
        }
    }
}

fn run_rules(gate: &PermissionGate, action: RulesAction) -> anyhow::Result<()> {
    match action {
        RulesAction::List => {
            let rules = gate.rules_snapshot();
            println!("always-allow:");
            for rule in &rules.allow {
                println!("  {}", rule.pattern);
            }
            println!("always-deny:");
            for rule in &rules.deny {
                println!("  {}", rule.pattern);
            }
        }
        RulesAction::Allow { pattern } => {
            gate.add_allow_rule(&pattern)?;
            println!("Added always-allow rule '{pattern}'.");
        }
        RulesAction::Deny { pattern } => {
            gate.add_deny_rule(&pattern)?;
            println!("Added always-deny rule '{pattern}'.");
        }
        RulesAction::Remove { pattern } => {
            if gate.remove_rule(&pattern)? {
                println!("Removed '{pattern}'.");
            } else {
                anyhow::bail!("no rule matching '{pattern}'");
            }
        }
    }
    Ok(())
}
