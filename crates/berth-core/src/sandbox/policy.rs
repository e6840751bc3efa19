//! Tool policy — which tool invocations get routed into the sandbox

use glob::Pattern;
use serde::{Deserialize, Serialize};

use super::config::{SandboxConfig, SandboxMode};

/// Allow/deny lists over tool names. Entries may use `*` wildcards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxToolPolicy {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

fn matches_any(patterns: &[String], tool: &str) -> bool {
    patterns.iter().any(|p| match Pattern::new(p) {
        Ok(pattern) => pattern.matches(tool),
        Err(_) => p.eq_ignore_ascii_case(tool),
    })
}

impl SandboxToolPolicy {
    pub fn is_allowed(&self, tool: &str) -> bool {
        matches_any(&self.allow, tool)
    }

    pub fn is_denied(&self, tool: &str) -> bool {
        matches_any(&self.deny, tool)
    }
}

impl SandboxConfig {
    /// Whether a call to `tool` should run inside the sandbox container
    pub fn sandboxes_tool(&self, tool: &str) -> bool {
        match self.mode {
            SandboxMode::None => false,
            SandboxMode::All => !self.tools.is_denied(tool),
            SandboxMode::Selected => self.tools.is_allowed(tool) && !self.tools.is_denied(tool),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: SandboxMode, allow: &[&str], deny: &[&str]) -> SandboxConfig {
        SandboxConfig {
            mode,
            tools: SandboxToolPolicy {
                allow: allow.iter().map(|s| s.to_string()).collect(),
                deny: deny.iter().map(|s| s.to_string()).collect(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_mode_none_never_sandboxes() {
        let cfg = config(SandboxMode::None, &["*"], &[]);
        assert!(!cfg.sandboxes_tool("bash"));
    }

    #[test]
    fn test_mode_all_respects_deny() {
        let cfg = config(SandboxMode::All, &[], &["browser_*"]);
        assert!(cfg.sandboxes_tool("bash"));
        assert!(!cfg.sandboxes_tool("browser_open"));
    }

    #[test]
    fn test_mode_selected_requires_allow() {
        let cfg = config(SandboxMode::Selected, &["bash", "fs_*"], &["fs_delete"]);
        assert!(cfg.sandboxes_tool("bash"));
        assert!(cfg.sandboxes_tool("fs_write"));
        assert!(!cfg.sandboxes_tool("fs_delete"));
        assert!(!cfg.sandboxes_tool("web_search"));
    }

    #[test]
    fn test_invalid_pattern_falls_back_to_name() {
        let policy = SandboxToolPolicy {
            allow: vec!["[bad".to_string()],
            deny: Vec::new(),
        };
        assert!(policy.is_allowed("[BAD"));
        assert!(!policy.is_allowed("bad"));
    }
}
