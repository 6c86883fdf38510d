//! Host policy engine: admin-managed plugin allowlists and host-wide
//! permission denials, read from the `[policy]` section of the host config.

use crate::permissions::Permission;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Policy mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// Only explicitly listed plugins can be installed.
    Allowlist,
    /// All plugins except explicitly listed ones can be installed.
    Denylist,
    #[default]
    /// No restrictions on plugin installation.
    Unrestricted,
}

/// Policy configuration as written in the host config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PolicyConfig {
    #[serde(default)]
    pub mode: PolicyMode,
    /// Allowed ids in allowlist mode, blocked ids in denylist mode.
    #[serde(default)]
    pub plugin_ids: Vec<String>,
    /// Permission interface names no plugin may hold.
    #[serde(default)]
    pub denied_permissions: HashSet<String>,
}

/// Enforces policy decisions.
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    config: PolicyConfig,
}

impl PolicyEngine {
    pub fn with_config(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// Check if a plugin is allowed to be installed.
    pub fn is_plugin_allowed(&self, plugin_id: &str) -> bool {
        let listed = self.config.plugin_ids.iter().any(|id| id == plugin_id);
        match self.config.mode {
            PolicyMode::Unrestricted => true,
            PolicyMode::Allowlist => listed,
            PolicyMode::Denylist => !listed,
        }
    }

    /// Check if a permission is denied host-wide.
    pub fn is_permission_denied_by_policy(&self, permission: Permission) -> bool {
        self.config
            .denied_permissions
            .contains(permission.interface_name())
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrestricted_allows_all() {
        let engine = PolicyEngine::with_config(PolicyConfig::default());
        assert!(engine.is_plugin_allowed("anything"));
        assert!(!engine.is_permission_denied_by_policy(Permission::Network));
    }

    #[test]
    fn allowlist_mode() {
        let config = PolicyConfig {
            mode: PolicyMode::Allowlist,
            plugin_ids: vec!["acme.quiz".to_string()],
            ..Default::default()
        };
        let engine = PolicyEngine::with_config(config);

        assert!(engine.is_plugin_allowed("acme.quiz"));
        assert!(!engine.is_plugin_allowed("evil.plugin"));
    }

    #[test]
    fn denylist_mode_blocks_listed_allows_others() {
        let config = PolicyConfig {
            mode: PolicyMode::Denylist,
            plugin_ids: vec!["evil.plugin".to_string()],
            ..Default::default()
        };
        let engine = PolicyEngine::with_config(config);

        assert!(!engine.is_plugin_allowed("evil.plugin"));
        assert!(engine.is_plugin_allowed("good.plugin"));
    }

    #[test]
    fn denied_permissions() {
        let config = PolicyConfig {
            denied_permissions: ["network".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let engine = PolicyEngine::with_config(config);

        assert!(engine.is_permission_denied_by_policy(Permission::Network));
        assert!(!engine.is_permission_denied_by_policy(Permission::Remote));
    }

    #[test]
    fn parse_policy_section() {
        let toml_str = r#"
mode = "allowlist"
plugin-ids = ["acme.quiz", "acme.clock"]
denied-permissions = ["remote"]
"#;
        let config: PolicyConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.mode, PolicyMode::Allowlist);
        assert_eq!(config.plugin_ids.len(), 2);
        assert!(config.denied_permissions.contains("remote"));
    }

    #[test]
    fn empty_allowlist_blocks_everything() {
        let config = PolicyConfig {
            mode: PolicyMode::Allowlist,
            ..Default::default()
        };
        let engine = PolicyEngine::with_config(config);
        assert!(!engine.is_plugin_allowed("acme.quiz"));
    }
}
