// ABOUTME: PermissionGate — tiered allow/deny decisions for agent-issued shell commands.
// ABOUTME: Classifier first, then session sets, persisted rules, and finally one prompt at a time.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::classifier;
use super::rules::RulesFile;
use super::types::{
    Allowance, Decision, DenySource, PermissionError, PermissionPrompt, PermissionScope,
    PromptChoice, PromptRequest,
};

/// In-memory decisions for this process lifetime.
#[derive(Default)]
struct SessionState {
    allow: HashSet<String>,
    deny: HashSet<String>,
}

/// Decides whether an agent-issued shell command may execute.
///
/// Decision order: destructive-command classifier (unconditional block),
/// session allow/deny sets, persisted allow/deny rules, then an interactive
/// prompt. Only one prompt is presented at a time; concurrent checks queue
/// behind it and re-consult recorded state before asking again.
pub struct PermissionGate {
    rules: Mutex<RulesFile>,
    rules_path: PathBuf,
    session: Mutex<SessionState>,
    prompt: Arc<dyn PermissionPrompt>,
    prompt_lock: tokio::sync::Mutex<()>,
}

impl PermissionGate {
    /// Create a gate by loading the persisted rule file from disk.
    pub fn new(rules_path: PathBuf, prompt: Arc<dyn PermissionPrompt>) -> anyhow::Result<Self> {
        let rules = RulesFile::load(&rules_path)?;
        Ok(Self::with_rules(rules, rules_path, prompt))
    }

    /// Create a gate from an existing rule file, useful for testing.
    pub fn with_rules(
        rules: RulesFile,
        rules_path: PathBuf,
        prompt: Arc<dyn PermissionPrompt>,
    ) -> Self {
        Self {
            rules: Mutex::new(rules),
            rules_path,
            session: Mutex::new(SessionState::default()),
            prompt,
            prompt_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Check whether a command may execute.
    ///
    /// Returns the allowance tier on success and a tagged error on any
    /// block or denial. The classifier verdict is checked before any rule
    /// lookup and cannot be overridden by one.
    pub async fn check(&self, command: &str) -> Result<Allowance, PermissionError> {
        if classifier::is_dangerous(command) {
            debug!(command, "command blocked by destructive-pattern classifier");
            return Err(PermissionError::ClassifierBlocked);
        }

        let Some(executable) = leading_token(command) else {
            return Err(PermissionError::EmptyCommand);
        };

        if let Some(decided) = self.lookup(&executable) {
            return decided;
        }

        // Queue behind any active prompt, then re-consult recorded state:
        // the previous prompt may have just decided this executable.
        let _prompting = self.prompt_lock.lock().await;
        if let Some(decided) = self.lookup(&executable) {
            return decided;
        }

        let request = PromptRequest {
            command: command.to_string(),
            executable: executable.clone(),
        };
        let choice = self.prompt.ask(&request).await;
        self.record(&executable, choice);

        match choice.decision {
            Decision::Allow => Ok(Allowance::Prompt {
                scope: choice.scope,
            }),
            Decision::Deny => Err(PermissionError::Denied {
                source: DenySource::Prompt,
            }),
        }
    }

    /// Consult session sets then persisted rules, in tier order.
    fn lookup(&self, executable: &str) -> Option<Result<Allowance, PermissionError>> {
        {
            let session = self.session.lock().expect("session lock poisoned");
            if session.allow.contains(executable) {
                return Some(Ok(Allowance::Session));
            }
            if session.deny.contains(executable) {
                return Some(Err(PermissionError::Denied {
                    source: DenySource::SessionRule,
                }));
            }
        }

        let rules = self.rules.lock().expect("rules lock poisoned");
        if let Some(pattern) = rules.allows(executable) {
            return Some(Ok(Allowance::Rule {
                pattern: pattern.to_string(),
            }));
        }
        if let Some(pattern) = rules.denies(executable) {
            return Some(Err(PermissionError::Denied {
                source: DenySource::PersistentRule {
                    pattern: pattern.to_string(),
                },
            }));
        }
        None
    }

    /// Record a prompt decision per its chosen scope.
    fn record(&self, executable: &str, choice: PromptChoice) {
        match choice.scope {
            PermissionScope::Once => {}
            PermissionScope::Session => {
                let mut session = self.session.lock().expect("session lock poisoned");
                match choice.decision {
                    Decision::Allow => session.allow.insert(executable.to_string()),
                    Decision::Deny => session.deny.insert(executable.to_string()),
                };
            }
            PermissionScope::Persistent => {
                let mut rules = self.rules.lock().expect("rules lock poisoned");
                match choice.decision {
                    Decision::Allow => rules.add_allow(executable),
                    Decision::Deny => rules.add_deny(executable),
                }
                if let Err(e) = rules.save(&self.rules_path) {
                    warn!(error = %e, "failed to persist permission rule");
                }
            }
        }
    }

    /// Add a persistent always-allow rule (CLI entry point for wildcards).
    pub fn add_allow_rule(&self, pattern: &str) -> anyhow::Result<()> {
        let mut rules = self.rules.lock().expect("rules lock poisoned");
        rules.add_allow(pattern);
        rules.save(&self.rules_path)
    }

    /// Add a persistent always-deny rule.
    pub fn add_deny_rule(&self, pattern: &str) -> anyhow::Result<()> {
        let mut rules = self.rules.lock().expect("rules lock poisoned");
        rules.add_deny(pattern);
        rules.save(&self.rules_path)
    }

    /// Remove a pattern from both persisted lists.
    pub fn remove_rule(&self, pattern: &str) -> anyhow::Result<bool> {
        let mut rules = self.rules.lock().expect("rules lock poisoned");
        let removed = rules.remove(pattern);
        if removed {
            rules.save(&self.rules_path)?;
        }
        Ok(removed)
    }

    /// Snapshot of the persisted rule lists for display.
    pub fn rules_snapshot(&self) -> RulesFile {
        self.rules.lock().expect("rules lock poisoned").clone()
    }

    /// Clear all session decisions. Persisted rules are untouched.
    pub fn reset_session(&self) {
        let mut session = self.session.lock().expect("session lock poisoned");
        session.allow.clear();
        session.deny.clear();
    }
}

/// The executable name: the command's leading whitespace-delimited token.
fn leading_token(command: &str) -> Option<String> {
    command.split_whitespace().next().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Prompt stub that always returns a fixed choice and counts calls.
    struct FixedPrompt {
        choice: PromptChoice,
        calls: AtomicUsize,
    }

    impl FixedPrompt {
        fn new(choice: PromptChoice) -> Arc<Self> {
            Arc::new(Self {
                choice,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PermissionPrompt for FixedPrompt {
        async fn ask(&self, _request: &PromptRequest) -> PromptChoice {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.choice
        }
    }

    fn gate_with(prompt: Arc<FixedPrompt>, rules: RulesFile) -> (PermissionGate, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("permissions.json");
        // Leak the tempdir so the path stays valid for the test's lifetime.
        std::mem::forget(dir);
        (PermissionGate::with_rules(rules, path.clone(), prompt), path)
    }

    #[tokio::test]
    async fn classifier_blocks_before_any_rule() {
        let mut rules = RulesFile::default();
        rules.add_allow("sudo*");
        rules.add_allow("rm");
        let prompt = FixedPrompt::new(PromptChoice::ALLOW_ALWAYS);
        let (gate, _) = gate_with(prompt.clone(), rules);

        assert_eq!(
            gate.check("sudo rm -rf /").await,
            Err(PermissionError::ClassifierBlocked),
        );
        // The prompt was never consulted either.
        assert_eq!(prompt.calls(), 0);
    }

    #[tokio::test]
    async fn persistent_allow_rule_matches_leading_token() {
        let mut rules = RulesFile::default();
        rules.add_allow("git*");
        let prompt = FixedPrompt::new(PromptChoice::DENY_ONCE);
        let (gate, _) = gate_with(prompt.clone(), rules);

        assert_eq!(
            gate.check("git-lfs pull").await,
            Ok(Allowance::Rule {
                pattern: "git*".to_string()
            }),
        );
        assert_eq!(prompt.calls(), 0);

        // "mygit" does not match the wildcard, so the prompt runs.
        assert!(gate.check("mygit status").await.is_err());
        assert_eq!(prompt.calls(), 1);
    }

    #[tokio::test]
    async fn persistent_deny_rule_denies_without_prompting() {
        let mut rules = RulesFile::default();
        rules.add_deny("curl");
        let prompt = FixedPrompt::new(PromptChoice::ALLOW_ONCE);
        let (gate, _) = gate_with(prompt.clone(), rules);

        assert_eq!(
            gate.check("curl https://example.com").await,
            Err(PermissionError::Denied {
                source: DenySource::PersistentRule {
                    pattern: "curl".to_string()
                }
            }),
        );
        assert_eq!(prompt.calls(), 0);
    }

    #[tokio::test]
    async fn session_allow_takes_precedence_over_persistent_deny() {
        let mut rules = RulesFile::default();
        rules.add_deny("cargo");
        let prompt = FixedPrompt::new(PromptChoice::DENY_ALWAYS);
        let (gate, _) = gate_with(prompt.clone(), rules);

        // No public path seeds the session set without a prompt, so
        // exercise the precedence directly.
        gate.record("cargo", PromptChoice::ALLOW_SESSION);
        assert_eq!(gate.check("cargo build").await, Ok(Allowance::Session));
    }

    #[tokio::test]
    async fn allow_session_is_remembered_within_the_process() {
        let prompt = FixedPrompt::new(PromptChoice::ALLOW_SESSION);
        let (gate, path) = gate_with(prompt.clone(), RulesFile::default());

        assert!(gate.check("cargo build").await.is_ok());
        assert!(gate.check("cargo test").await.is_ok());
        assert_eq!(prompt.calls(), 1);

        // Session decisions are never persisted.
        let reloaded = RulesFile::load(&path).unwrap();
        assert!(reloaded.allows("cargo").is_none());
    }

    #[tokio::test]
    async fn allow_always_persists_to_disk() {
        let prompt = FixedPrompt::new(PromptChoice::ALLOW_ALWAYS);
        let (gate, path) = gate_with(prompt.clone(), RulesFile::default());

        assert_eq!(
            gate.check("cargo build").await,
            Ok(Allowance::Prompt {
                scope: PermissionScope::Persistent
            }),
        );

        let reloaded = RulesFile::load(&path).unwrap();
        assert_eq!(reloaded.allows("cargo"), Some("cargo"));
    }

    #[tokio::test]
    async fn allow_once_is_never_recorded() {
        let prompt = FixedPrompt::new(PromptChoice::ALLOW_ONCE);
        let (gate, path) = gate_with(prompt.clone(), RulesFile::default());

        assert!(gate.check("cargo build").await.is_ok());
        assert!(gate.check("cargo build").await.is_ok());
        // Each invocation prompts again.
        assert_eq!(prompt.calls(), 2);
        assert!(RulesFile::load(&path).unwrap().allows("cargo").is_none());
    }

    #[tokio::test]
    async fn deny_always_persists_and_short_circuits() {
        let prompt = FixedPrompt::new(PromptChoice::DENY_ALWAYS);
        let (gate, path) = gate_with(prompt.clone(), RulesFile::default());

        assert!(gate.check("curl https://x").await.is_err());
        assert!(gate.check("curl https://y").await.is_err());
        // Second check hits the persisted deny rule, not the prompt.
        assert_eq!(prompt.calls(), 1);
        assert_eq!(RulesFile::load(&path).unwrap().denies("curl"), Some("curl"));
    }

    #[tokio::test]
    async fn queued_check_honors_decision_from_active_prompt() {
        let prompt = FixedPrompt::new(PromptChoice::ALLOW_SESSION);
        let (gate, _) = gate_with(prompt.clone(), RulesFile::default());
        let gate = Arc::new(gate);

        let a = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.check("cargo build").await })
        };
        let b = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.check("cargo test").await })
        };

        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());
        // The second check re-consulted session state after queueing and
        // never issued an overlapping prompt.
        assert_eq!(prompt.calls(), 1);
    }

    #[tokio::test]
    async fn reset_session_clears_in_memory_decisions() {
        let prompt = FixedPrompt::new(PromptChoice::ALLOW_SESSION);
        let (gate, _) = gate_with(prompt.clone(), RulesFile::default());

        assert!(gate.check("cargo build").await.is_ok());
        gate.reset_session();
        assert!(gate.check("cargo build").await.is_ok());
        assert_eq!(prompt.calls(), 2);
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let prompt = FixedPrompt::new(PromptChoice::ALLOW_ALWAYS);
        let (gate, _) = gate_with(prompt.clone(), RulesFile::default());
        assert_eq!(
            gate.check("   ").await,
            Err(PermissionError::EmptyCommand),
        );
        assert_eq!(prompt.calls(), 0);
    }
}
