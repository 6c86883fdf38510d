//! Host configuration, read from a TOML file.
//!
//! ```toml
//! [sandbox]
//! step_budget = 10000000
//! call_timeout_ms = 2000
//! max_pattern_subject_bytes = 65536
//!
//! [cache]
//! max_entries_per_plugin = 500
//!
//! [policy]
//! mode = "denylist"
//! plugin-ids = ["evil.plugin"]
//! ```

use crate::cache::CacheConfig;
use crate::error::BridgeError;
use crate::policy::PolicyConfig;
use crate::sandbox::SandboxLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub sandbox: SandboxLimits,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl HostConfig {
    /// Parses and validates a config document.
    pub fn from_toml_str(contents: &str) -> Result<Self, BridgeError> {
        let config: HostConfig =
            toml::from_str(contents).map_err(|e| BridgeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from an explicit path.
    ///
    /// A missing, unreadable or malformed file yields the defaults; the host
    /// keeps running either way.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No host config found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    info!("Loaded host config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!(
                        "Failed to parse host config {:?}: {}. Falling back to defaults.",
                        path, e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read host config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.sandbox.hook_interval == 0 {
            return Err(BridgeError::Config("sandbox.hook_interval must be positive".into()));
        }
        if self.sandbox.step_budget == 0 {
            return Err(BridgeError::Config("sandbox.step_budget must be positive".into()));
        }
        if self.sandbox.call_timeout_ms == 0 {
            return Err(BridgeError::Config("sandbox.call_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}
