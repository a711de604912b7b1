// ABOUTME: Terminal implementation of the permission prompt capability.
// ABOUTME: Presents the five choices on stdout and reads one line; unrecognized input denies.

use async_trait::async_trait;

use crate::permission::{PermissionPrompt, PromptChoice, PromptRequest};

/// Stdin-backed prompt wired into the gate by the binary.
pub struct TerminalPrompt;

#[async_trait]
impl PermissionPrompt for TerminalPrompt {
    async fn ask(&self, request: &PromptRequest) -> PromptChoice {
        println!();
        println!("The agent wants to run:");
        println!("    {}", request.command);
        println!();
        println!("  1) allow for this session");
        println!("  2) allow always");
        println!("  3) allow once");
        println!("  4) deny for this session");
        println!("  5) deny always");
        print!("Decision is recorded for '{}'. Choice: ", request.executable);
        use std::io::Write as _;
        let _ = std::io::stdout().flush();

        let line = tokio::task::spawn_blocking(|| {
            let mut input = String::new();
            let _ = std::io::stdin().read_line(&mut input);
            input
        })
        .await
        .unwrap_or_default();

        // Anything unrecognized denies without recording.
        parse_choice(&line).unwrap_or(PromptChoice::DENY_ONCE)
    }
}

/// Map a response line to one of the five choices. `None` for anything else.
pub fn parse_choice(input: &str) -> Option<PromptChoice> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "allow" | "allow-session" => Some(PromptChoice::ALLOW_SESSION),
        "2" | "always" | "allow-always" => Some(PromptChoice::ALLOW_ALWAYS),
        "3" | "once" | "allow-once" => Some(PromptChoice::ALLOW_ONCE),
        "4" | "deny" | "deny-session" => Some(PromptChoice::DENY_SESSION),
        "5" | "never" | "deny-always" => Some(PromptChoice::DENY_ALWAYS),
        _ => None,
    }
}
