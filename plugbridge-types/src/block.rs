//! Plugin blocks and the whitelisted view handed to plugin code.

use crate::{BlockProperty, Error};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;

/// Canvas position of a block, in document units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A block whose rendering and behavior are delegated to a plugin.
///
/// The data bag is owned by the plugin and restricted to JSON values so that
/// it round-trips through document persistence unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginBlock {
    pub id: String,
    pub plugin_id: String,
    #[serde(default)]
    pub data: Map<String, JsonValue>,
    #[serde(default)]
    pub properties: Vec<BlockProperty>,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub position: Position,
    /// Last markup produced by the plugin for this block.
    #[serde(skip)]
    pub rendered: Option<String>,
}

fn default_opacity() -> f64 {
    1.0
}

impl PluginBlock {
    pub fn new(id: impl Into<String>, plugin_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            plugin_id: plugin_id.into(),
            data: Map::new(),
            properties: Vec::new(),
            opacity: default_opacity(),
            position: Position::default(),
            rendered: None,
        }
    }

    pub fn property(&self, key: &str) -> Option<&BlockProperty> {
        self.properties.iter().find(|p| p.key == key)
    }

    /// Assigns a new value to a declared property (as edited in the panel).
    pub fn set_property_value(&mut self, key: &str, value: &JsonValue) -> Result<(), Error> {
        let property = self
            .properties
            .iter_mut()
            .find(|p| p.key == key)
            .ok_or_else(|| Error::UnknownProperty(key.to_string()))?;
        property.assign(value)
    }

    /// Replaces the declared property list.
    ///
    /// A redeclared property of the same key and type keeps its current value.
    /// A list naming one key twice is rejected and leaves the block untouched.
    pub fn declare_properties(&mut self, declared: Vec<BlockProperty>) -> Result<(), Error> {
        let duplicate = {
            let mut seen = HashSet::new();
            declared
                .iter()
                .find(|p| !seen.insert(p.key.as_str()))
                .map(|p| p.key.clone())
        };
        if let Some(key) = duplicate {
            return Err(Error::InvalidProperty {
                key,
                reason: "declared more than once".into(),
            });
        }

        let previous = std::mem::take(&mut self.properties);
        self.properties = declared
            .into_iter()
            .map(|mut property| {
                let carried = previous.iter().find(|old| {
                    old.key == property.key && old.kind.type_name() == property.kind.type_name()
                });
                if let Some(old) = carried {
                    // Out-of-range carry-overs keep the new default.
                    let _ = property.assign(&old.value());
                }
                property
            })
            .collect();
        Ok(())
    }
}

/// Serialized field table for plugin blocks: view key → accessor.
///
/// This is the complete whitelist of block state plugin code can observe.
pub const BLOCK_VIEW_FIELDS: &[(&str, fn(&PluginBlock) -> JsonValue)] = &[
    ("id", view_id),
    ("plugin_id", view_plugin_id),
    ("data", view_data),
    ("properties", view_properties),
    ("opacity", view_opacity),
    ("position", view_position),
];

fn view_id(block: &PluginBlock) -> JsonValue {
    JsonValue::String(block.id.clone())
}

fn view_plugin_id(block: &PluginBlock) -> JsonValue {
    JsonValue::String(block.plugin_id.clone())
}

fn view_data(block: &PluginBlock) -> JsonValue {
    JsonValue::Object(block.data.clone())
}

fn view_properties(block: &PluginBlock) -> JsonValue {
    JsonValue::Array(block.properties.iter().map(BlockProperty::to_view).collect())
}

fn view_opacity(block: &PluginBlock) -> JsonValue {
    number(block.opacity)
}

fn view_position(block: &PluginBlock) -> JsonValue {
    let mut position = Map::new();
    position.insert("x".into(), number(block.position.x));
    position.insert("y".into(), number(block.position.y));
    JsonValue::Object(position)
}

fn number(value: f64) -> JsonValue {
    serde_json::Number::from_f64(value)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// Builds the plain-data view of a block from [`BLOCK_VIEW_FIELDS`].
pub fn serialize_block(block: &PluginBlock) -> JsonValue {
    let view: Map<String, JsonValue> = BLOCK_VIEW_FIELDS
        .iter()
        .map(|(key, accessor)| ((*key).to_string(), accessor(block)))
        .collect();
    JsonValue::Object(view)
}
