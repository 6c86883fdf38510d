//! Capability-based permission model for plugin sandboxes.
//!
//! Two tiers:
//! - Always granted: core properties, logging, events, cache, own blocks,
//!   panels, custom block registration
//! - Install-time: network fetch and realtime remote messaging, granted only
//!   when the manifest requests them and policy does not deny them

use crate::policy::PolicyEngine;
use plugbridge_types::PluginManifest;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// Capability class gating a group of features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    // Always granted
    Core,
    Logger,
    Events,
    Cache,
    Block,
    Panel,
    CustomBlocks,

    // Install-time
    Network,
    Remote,
}

impl Permission {
    pub const ALL: [Permission; 9] = [
        Permission::Core,
        Permission::Logger,
        Permission::Events,
        Permission::Cache,
        Permission::Block,
        Permission::Panel,
        Permission::CustomBlocks,
        Permission::Network,
        Permission::Remote,
    ];

    pub fn tier(&self) -> PermissionTier {
        match self {
            Self::Core
            | Self::Logger
            | Self::Events
            | Self::Cache
            | Self::Block
            | Self::Panel
            | Self::CustomBlocks => PermissionTier::AlwaysGranted,
            Self::Network | Self::Remote => PermissionTier::InstallTime,
        }
    }

    /// Name used in manifests and policy files.
    pub fn interface_name(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Logger => "logger",
            Self::Events => "events",
            Self::Cache => "cache",
            Self::Block => "block",
            Self::Panel => "panel",
            Self::CustomBlocks => "custom-blocks",
            Self::Network => "network",
            Self::Remote => "remote",
        }
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.interface_name() == s)
            .ok_or_else(|| format!("unknown permission '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionTier {
    AlwaysGranted,
    InstallTime,
}

/// Set of permissions granted to one installed plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionSet {
    granted: HashSet<Permission>,
    /// Requested but refused by policy.
    denied: HashSet<Permission>,
}

impl PermissionSet {
    /// Always-granted tier only.
    pub fn default_sandboxed() -> Self {
        let granted = Permission::ALL
            .into_iter()
            .filter(|p| p.tier() == PermissionTier::AlwaysGranted)
            .collect();
        Self {
            granted,
            denied: HashSet::new(),
        }
    }

    /// Every permission granted (for testing).
    pub fn all_granted() -> Self {
        Self {
            granted: Permission::ALL.into_iter().collect(),
            denied: HashSet::new(),
        }
    }

    /// Resolves what a manifest asked for against host policy.
    ///
    /// Returns the set plus the names the manifest listed that are not
    /// permissions at all, so the caller can report them.
    pub fn for_manifest(manifest: &PluginManifest, policy: &PolicyEngine) -> (Self, Vec<String>) {
        let mut set = Self::default_sandboxed();
        let mut unknown = Vec::new();
        for name in &manifest.permissions {
            match name.parse::<Permission>() {
                Ok(permission) if policy.is_permission_denied_by_policy(permission) => {
                    set.deny(permission)
                }
                Ok(permission) => set.grant(permission),
                Err(_) => unknown.push(name.clone()),
            }
        }
        for permission in Permission::ALL {
            if permission.tier() == PermissionTier::AlwaysGranted
                && policy.is_permission_denied_by_policy(permission)
            {
                set.deny(permission);
            }
        }
        (set, unknown)
    }

    pub fn is_granted(&self, permission: Permission) -> bool {
        self.granted.contains(&permission)
    }

    pub fn is_denied(&self, permission: Permission) -> bool {
        self.denied.contains(&permission)
    }

    pub fn grant(&mut self, permission: Permission) {
        self.denied.remove(&permission);
        self.granted.insert(permission);
    }

    pub fn deny(&mut self, permission: Permission) {
        self.granted.remove(&permission);
        self.denied.insert(permission);
    }

    pub fn granted_permissions(&self) -> &HashSet<Permission> {
        &self.granted
    }
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self::default_sandboxed()
    }
}
