// ABOUTME: Core types for the permission system.
// ABOUTME: Decisions, scopes, prompt request/choice shapes, and the prompt capability trait.

use async_trait::async_trait;

/// Allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Lifetime class of a recorded decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionScope {
    /// In-memory for this process; cleared by explicit reset or restart.
    Session,
    /// Written to the persisted rule lists.
    Persistent,
    /// Applies to the current invocation only, never recorded.
    Once,
}

/// One of the five prompt choices. Deny+Once is the fallback for
/// unrecognized responses and is never recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptChoice {
    pub decision: Decision,
    pub scope: PermissionScope,
}

impl PromptChoice {
    pub const ALLOW_SESSION: Self = Self {
        decision: Decision::Allow,
        scope: PermissionScope::Session,
    };
    pub const ALLOW_ALWAYS: Self = Self {
        decision: Decision::Allow,
        scope: PermissionScope::Persistent,
    };
    pub const ALLOW_ONCE: Self = Self {
        decision: Decision::Allow,
        scope: PermissionScope::Once,
    };
    pub const DENY_SESSION: Self = Self {
        decision: Decision::Deny,
        scope: PermissionScope::Session,
    };
    pub const DENY_ALWAYS: Self = Self {
        decision: Decision::Deny,
        scope: PermissionScope::Persistent,
    };
    /// Default for unrecognized responses: deny, nothing recorded.
    pub const DENY_ONCE: Self = Self {
        decision: Decision::Deny,
        scope: PermissionScope::Once,
    };
}

/// What the gate shows the user when it has to ask.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    /// The full command string as issued by the agent.
    pub command: String,
    /// The leading token the decision will be recorded against.
    pub executable: String,
}

/// Interactive confirmation capability injected into the gate.
///
/// Keeps the gate testable without a terminal; the binary wires in a
/// stdin-backed implementation.
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    async fn ask(&self, request: &PromptRequest) -> PromptChoice;
}

/// Where an allow decision came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allowance {
    /// Matched the in-memory session allow set.
    Session,
    /// Matched a persisted always-allow rule.
    Rule { pattern: String },
    /// Granted interactively, with the scope the user chose.
    Prompt { scope: PermissionScope },
}

/// What denied the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenySource {
    SessionRule,
    PersistentRule { pattern: String },
    Prompt,
}

impl std::fmt::Display for DenySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionRule => write!(f, "a session deny rule"),
            Self::PersistentRule { pattern } => {
                write!(f, "the persistent deny rule '{}'", pattern)
            }
            Self::Prompt => write!(f, "the user"),
        }
    }
}

impl std::error::Error for DenySource {}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    /// The command matches a destructive pattern. Unconditional: no rule,
    /// session grant, or prompt can override this.
    #[error("command blocked: matches an irreversibly destructive pattern")]
    ClassifierBlocked,
    #[error("command denied by {source}")]
    Denied { source: DenySource },
    #[error("empty command")]
    EmptyCommand,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_once_is_the_unrecorded_default() {
        assert_eq!(PromptChoice::DENY_ONCE.decision, Decision::Deny);
        assert_eq!(PromptChoice::DENY_ONCE.scope, PermissionScope::Once);
    }

    #[test]
    fn denied_error_carries_its_source() {
        let err = PermissionError::Denied {
            source: DenySource::SessionRule,
        };
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "a session deny rule");
    }

    #[test]
    fn deny_source_display_names_the_tier() {
        let s = PermissionError::Denied {
            source: DenySource::PersistentRule {
                pattern: "curl*".to_string(),
            },
        }
        .to_string();
        assert!(s.contains("curl*"));
        assert!(s.contains("persistent"));
    }
}
