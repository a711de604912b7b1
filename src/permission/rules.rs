// ABOUTME: Persisted permission rules — independent always-allow and always-deny lists.
// ABOUTME: JSON-backed, timestamped entries; exact or trailing-wildcard prefix matching.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vault::backend::set_owner_only;

/// A single persisted rule: a pattern and when it was added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRule {
    /// Exact command name, or a prefix ending in `*`.
    pub pattern: String,
    /// When this rule was recorded.
    pub added_at: DateTime<Utc>,
}

/// Top-level rule file that persists to JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesFile {
    /// Schema version for forward compatibility.
    pub version: u32,
    /// Always-allow rules.
    #[serde(default)]
    pub allow: Vec<PermissionRule>,
    /// Always-deny rules.
    #[serde(default)]
    pub deny: Vec<PermissionRule>,
}

impl Default for RulesFile {
    fn default() -> Self {
        Self {
            version: 1,
            allow: Vec::new(),
            deny: Vec::new(),
        }
    }
}

/// Match a rule pattern against a command's leading token.
///
/// Case-sensitive. A trailing `*` makes the rule a prefix match: `git*`
/// matches `git` and `git-lfs` but not `mygit`. Without the wildcard the
/// pattern must equal the token exactly.
pub fn pattern_matches(pattern: &str, executable: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => executable.starts_with(prefix),
        None => pattern == executable,
    }
}

impl RulesFile {
    /// Load the rule file from disk. Returns defaults if the file doesn't exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let file: Self = serde_json::from_str(&content)?;
        Ok(file)
    }

    /// Save the rule file to disk, creating parent directories as needed.
    /// Written atomically so a crash mid-write cannot corrupt the rules.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        std::fs::write(&tmp, content)?;
        set_owner_only(&tmp)?;
        std::fs::rename(&tmp, path)?;
        set_owner_only(path)?;
        Ok(())
    }

    /// First always-allow pattern matching the executable, if any.
    pub fn allows(&self, executable: &str) -> Option<&str> {
        self.allow
            .iter()
            .find(|r| pattern_matches(&r.pattern, executable))
            .map(|r| r.pattern.as_str())
    }

    /// First always-deny pattern matching the executable, if any.
    pub fn denies(&self, executable: &str) -> Option<&str> {
        self.deny
            .iter()
            .find(|r| pattern_matches(&r.pattern, executable))
            .map(|r| r.pattern.as_str())
    }

    /// Add an always-allow rule, skipping exact duplicates.
    pub fn add_allow(&mut self, pattern: &str) {
        push_unique(&mut self.allow, pattern);
    }

    /// Add an always-deny rule, skipping exact duplicates.
    pub fn add_deny(&mut self, pattern: &str) {
        push_unique(&mut self.deny, pattern);
    }

    /// Remove a pattern from both lists. Returns whether anything was removed.
    pub fn remove(&mut self, pattern: &str) -> bool {
        let before = self.allow.len() + self.deny.len();
        self.allow.retain(|r| r.pattern != pattern);
        self.deny.retain(|r| r.pattern != pattern);
        before != self.allow.len() + self.deny.len()
    }
}

fn push_unique(rules: &mut Vec<PermissionRule>, pattern: &str) {
    if rules.iter().any(|r| r.pattern == pattern) {
        return;
    }
    rules.push(PermissionRule {
        pattern: pattern.to_string(),
        added_at: Utc::now(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_matches_only_itself() {
        assert!(pattern_matches("git", "git"));
        assert!(!pattern_matches("git", "git-lfs"));
        assert!(!pattern_matches("git", "mygit"));
    }

    #[test]
    fn wildcard_pattern_is_a_prefix_match() {
        assert!(pattern_matches("git*", "git"));
        assert!(pattern_matches("git*", "git-lfs"));
        assert!(!pattern_matches("git*", "mygit"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(!pattern_matches("git", "Git"));
        assert!(!pattern_matches("Git*", "git-lfs"));
    }

    #[test]
    fn bare_wildcard_matches_everything() {
        assert!(pattern_matches("*", "anything"));
        assert!(pattern_matches("*", ""));
    }

    #[test]
    fn allow_and_deny_lists_are_independent() {
        let mut file = RulesFile::default();
        file.add_allow("git*");
        file.add_deny("curl");

        assert_eq!(file.allows("git-lfs"), Some("git*"));
        assert!(file.allows("curl").is_none());
        assert_eq!(file.denies("curl"), Some("curl"));
        assert!(file.denies("git").is_none());
    }

    #[test]
    fn duplicates_are_skipped() {
        let mut file = RulesFile::default();
        file.add_allow("cargo");
        file.add_allow("cargo");
        assert_eq!(file.allow.len(), 1);
    }

    #[test]
    fn remove_clears_both_lists() {
        let mut file = RulesFile::default();
        file.add_allow("npm");
        file.add_deny("npm");
        assert!(file.remove("npm"));
        assert!(!file.remove("npm"));
        assert!(file.allows("npm").is_none());
        assert!(file.denies("npm").is_none());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("permissions.json");

        let mut original = RulesFile::default();
        original.add_allow("git*");
        original.add_deny("rm");
        original.save(&path).unwrap();

        let loaded = RulesFile::load(&path).unwrap();
        assert_eq!(loaded.version, original.version);
        assert_eq!(loaded.allows("git-lfs"), Some("git*"));
        assert_eq!(loaded.denies("rm"), Some("rm"));
    }

    #[cfg(unix)]
    #[test]
    fn saved_rule_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("permissions.json");

        let mut file = RulesFile::default();
        file.add_deny("curl");
        file.save(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn save_leaves_no_temporary_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("permissions.json");
        RulesFile::default().save(&path).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec!["permissions.json"]);
    }

    #[test]
    fn load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let file = RulesFile::load(&dir.path().join("missing.json")).unwrap();
        assert_eq!(file.version, 1);
        assert!(file.allow.is_empty());
        assert!(file.deny.is_empty());
    }
}
