// ABOUTME: Tiered permission system for agent-issued shell commands.
// ABOUTME: Destructive-command classifier, persisted rule lists, and the prompting gate.

pub mod classifier;
pub mod gate;
pub mod rules;
pub mod types;

pub use classifier::is_dangerous;
pub use gate::PermissionGate;
pub use rules::{PermissionRule, RulesFile, pattern_matches};
pub use types::{
    Allowance, Decision, DenySource, PermissionError, PermissionPrompt, PermissionScope,
    PromptChoice, PromptRequest,
};
