//! Plugin manifest: the immutable descriptor loaded at install time.

use crate::{Error, Surface};
use serde::{Deserialize, Serialize};

/// Descriptor for one published plugin.
///
/// Created when the plugin is published and loaded read-only at install
/// time. The host never mutates a manifest at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Stable, globally unique identifier (e.g., "acme.quiz").
    pub id: String,
    /// Human-readable plugin name.
    pub name: String,
    /// Semver version string.
    pub version: String,
    /// Icon shown in the block-creation UI.
    #[serde(default)]
    pub icon: Option<String>,
    /// Origins the plugin may embed or fetch from (`scheme://host[:port]`).
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Block kinds this plugin contributes to the editor.
    #[serde(default)]
    pub custom_blocks: Vec<CustomBlockDeclaration>,
    /// Install-time permissions requested (e.g., "network", "remote").
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Script evaluated in the editor sandbox.
    #[serde(default)]
    pub editor_source: Option<String>,
    /// Script evaluated in the player sandbox.
    #[serde(default)]
    pub player_source: Option<String>,
}

/// A block kind as declared by a plugin (manifest or `api.register_block`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomBlockDeclaration {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

/// A block kind listed by the block-creation UI, tagged with its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomBlockDescriptor {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub plugin_id: String,
}

impl CustomBlockDeclaration {
    pub fn into_descriptor(self, plugin_id: &str) -> CustomBlockDescriptor {
        CustomBlockDescriptor {
            id: self.id,
            name: self.name,
            icon: self.icon,
            plugin_id: plugin_id.to_string(),
        }
    }
}

impl PluginManifest {
    /// Builds a manifest with only the required fields set.
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            icon: None,
            allowed_origins: Vec::new(),
            custom_blocks: Vec::new(),
            permissions: Vec::new(),
            editor_source: None,
            player_source: None,
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, Error> {
        let manifest: Self = toml::from_str(contents)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, Error> {
        let manifest: Self = serde_json::from_str(contents)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validates the manifest for required fields and constraints.
    pub fn validate(&self) -> Result<(), Error> {
        if self.id.is_empty() {
            return Err(Error::InvalidManifest("id is required".into()));
        }
        if self.name.is_empty() {
            return Err(Error::InvalidManifest("name is required".into()));
        }
        if self.version.is_empty() {
            return Err(Error::InvalidManifest("version is required".into()));
        }
        // Plugin IDs follow reverse-domain convention
        if !self.id.contains('.') || self.id.starts_with('.') || self.id.ends_with('.') {
            return Err(Error::InvalidManifest(
                "id must use reverse-domain format (e.g., 'acme.quiz')".into(),
            ));
        }
        for origin in &self.allowed_origins {
            if !is_origin(origin) {
                return Err(Error::InvalidManifest(format!(
                    "allowed origin '{origin}' must look like scheme://host[:port]"
                )));
            }
        }
        for block in &self.custom_blocks {
            if block.id.is_empty() || block.name.is_empty() {
                return Err(Error::InvalidManifest(
                    "custom blocks need both an id and a name".into(),
                ));
            }
        }
        Ok(())
    }

    /// Source for one surface; an empty script counts as absent.
    pub fn source(&self, surface: Surface) -> Option<&str> {
        let source = match surface {
            Surface::Editor => self.editor_source.as_deref(),
            Surface::Player => self.player_source.as_deref(),
        };
        source.filter(|s| !s.trim().is_empty())
    }

    pub fn allows_origin(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/');
        self.allowed_origins
            .iter()
            .any(|allowed| allowed.trim_end_matches('/').eq_ignore_ascii_case(origin))
    }

    /// Manifest-declared custom blocks, tagged with this plugin's id.
    pub fn custom_block_descriptors(&self) -> Vec<CustomBlockDescriptor> {
        self.custom_blocks
            .iter()
            .cloned()
            .map(|decl| decl.into_descriptor(&self.id))
            .collect()
    }
}

fn is_origin(candidate: &str) -> bool {
    let Some((scheme, rest)) = candidate.split_once("://") else {
        return false;
    };
    let rest = rest.trim_end_matches('/');
    !scheme.is_empty()
        && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-')
        && !rest.is_empty()
        && !rest.contains('/')
}
