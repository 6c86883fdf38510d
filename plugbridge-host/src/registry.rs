//! Capability registries: the ordered feature list each surface exposes as
//! its `api` object.

use crate::features::{
    CapabilityFeature, Feature, FeatureContext, block, cache, editor, events, fetch, identity, log,
    player,
};
use crate::permissions::{Permission, PermissionSet};
use mlua::{Lua, Table};
use plugbridge_types::Surface;

/// Features shared by both surfaces, in installation order.
const COMMON_FEATURES: &[Feature] = &[
    identity::PLUGIN_ID,
    identity::SURFACE,
    identity::NULL,
    log::LOG,
    log::WARN,
    log::ERROR,
    events::ON,
    cache::GET,
    cache::SET,
    cache::REMOVE,
    fetch::FETCH,
    block::GET_DATA,
    block::SET_DATA,
    block::GET_PROPERTY,
    block::GET_VIEW,
    block::SET_OPACITY,
    block::POST_MESSAGE,
    block::REQUEST_RENDER,
];

const EDITOR_FEATURES: &[Feature] = &[
    editor::DECLARE_PROPERTIES,
    editor::PANEL_OPEN,
    editor::PANEL_POST_MESSAGE,
    editor::REGISTER_BLOCK,
];

const PLAYER_FEATURES: &[Feature] = &[player::CLIENT_ID, player::SEND_REMOTE];

/// What an install actually put into a sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Qualified names, in installation order.
    pub installed: Vec<String>,
    /// Features left out because their permission was not granted.
    pub skipped: Vec<(String, Permission)>,
}

pub struct CapabilityRegistry {
    surface: Surface,
    features: Vec<Box<dyn CapabilityFeature>>,
}

impl CapabilityRegistry {
    pub fn for_surface(surface: Surface) -> Self {
        let specific = match surface {
            Surface::Editor => EDITOR_FEATURES,
            Surface::Player => PLAYER_FEATURES,
        };
        let features = COMMON_FEATURES
            .iter()
            .chain(specific)
            .map(|feature| Box::new(*feature) as Box<dyn CapabilityFeature>)
            .collect();
        Self { surface, features }
    }

    pub fn editor() -> Self {
        Self::for_surface(Surface::Editor)
    }

    pub fn player() -> Self {
        Self::for_surface(Surface::Player)
    }

    /// Appends a host-defined feature after the built-in ones.
    pub fn with_feature(mut self, feature: Box<dyn CapabilityFeature>) -> Self {
        self.features.push(feature);
        self
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.qualified_name()).collect()
    }

    /// Installs every permitted feature onto `api`, creating sub-tables on
    /// first use.
    pub fn install(
        &self,
        lua: &Lua,
        api: &Table,
        ctx: &FeatureContext,
        permissions: &PermissionSet,
    ) -> mlua::Result<InstallReport> {
        let mut report = InstallReport::default();
        for feature in &self.features {
            let name = feature.qualified_name();
            if !permissions.is_granted(feature.permission()) {
                report.skipped.push((name, feature.permission()));
                continue;
            }
            match feature.namespace() {
                Some(ns) => {
                    let existing: Option<Table> = api.raw_get(ns)?;
                    let table = match existing {
                        Some(table) => table,
                        None => {
                            let table = lua.create_table()?;
                            api.raw_set(ns, table.clone())?;
                            table
                        }
                    };
                    feature.register(lua, &table, ctx)?;
                }
                None => feature.register(lua, api, ctx)?,
            }
            report.installed.push(name);
        }

        if !report.skipped.is_empty() {
            let skipped: Vec<String> = report
                .skipped
                .iter()
                .map(|(name, permission)| format!("api.{name} ({})", permission.interface_name()))
                .collect();
            ctx.logger.lifecycle(format!(
                "{} capabilities not installed, permission not granted: {}",
                skipped.len(),
                skipped.join(", ")
            ));
        }
        Ok(report)
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("surface", &self.surface)
            .field("features", &self.feature_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surfaces_share_common_features() {
        let editor = CapabilityRegistry::editor().feature_names();
        let player = CapabilityRegistry::player().feature_names();

        for name in ["plugin_id", "on", "cache.get", "block.set_opacity", "fetch"] {
            assert!(editor.contains(&name.to_string()), "editor lacks {name}");
            assert!(player.contains(&name.to_string()), "player lacks {name}");
        }
    }

    #[test]
    fn surface_specific_features_stay_on_their_surface() {
        let editor = CapabilityRegistry::editor().feature_names();
        let player = CapabilityRegistry::player().feature_names();

        assert!(editor.contains(&"panel.open".to_string()));
        assert!(editor.contains(&"block.declare_properties".to_string()));
        assert!(!player.contains(&"panel.open".to_string()));
        assert!(player.contains(&"player.send_remote".to_string()));
        assert!(!editor.contains(&"player.send_remote".to_string()));
    }

    #[test]
    fn feature_order_is_stable() {
        let names = CapabilityRegistry::player().feature_names();
        assert_eq!(names.first().map(String::as_str), Some("plugin_id"));
        assert_eq!(names.last().map(String::as_str), Some("player.send_remote"));
    }
}
