//! Capability features: the individual functions and properties installed
//! into a sandbox's `api` table.
//!
//! A feature is self-contained. It validates its own arguments, performs at
//! most one host read or mutation, and reports misuse to the plugin log
//! while returning nil. Only `api.on` with an unknown event kind raises.

pub mod block;
pub mod cache;
pub mod editor;
pub mod events;
pub mod fetch;
pub mod identity;
pub mod log;
pub mod player;

use crate::cache::CacheView;
use crate::custom_blocks::CustomBlockRegistry;
use crate::host::HostServices;
use crate::logging::PluginLogger;
use crate::marshal;
use crate::permissions::Permission;
use crate::sandbox::{SharedEvents, SharedPending};
use crate::scheduler::{CompletionTarget, Scheduler};
use mlua::{Lua, Table, Value, Variadic};
use plugbridge_types::{PluginManifest, Surface};
use serde_json::Value as JsonValue;
use std::rc::Rc;
use uuid::Uuid;

/// One named function or property exposed to plugin code.
pub trait CapabilityFeature {
    /// Key under which the feature is installed.
    fn name(&self) -> &'static str;

    /// Sub-table of `api` the feature lives in (`api.cache`, ...), if any.
    fn namespace(&self) -> Option<&'static str> {
        None
    }

    /// Permission class gating the feature.
    fn permission(&self) -> Permission;

    /// Installs exactly one entry on `namespace`.
    fn register(&self, lua: &Lua, namespace: &Table, ctx: &FeatureContext) -> mlua::Result<()>;

    /// Dotted path as seen from plugin code, without the `api.` prefix.
    fn qualified_name(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{ns}.{}", self.name()),
            None => self.name().to_string(),
        }
    }
}

pub type InstallFn = fn(&Lua, &Table, &FeatureContext) -> mlua::Result<()>;

/// Table-driven feature used by the built-in registries.
#[derive(Clone, Copy)]
pub struct Feature {
    pub name: &'static str,
    pub namespace: Option<&'static str>,
    pub permission: Permission,
    pub install: InstallFn,
}

impl CapabilityFeature for Feature {
    fn name(&self) -> &'static str {
        self.name
    }

    fn namespace(&self) -> Option<&'static str> {
        self.namespace
    }

    fn permission(&self) -> Permission {
        self.permission
    }

    fn register(&self, lua: &Lua, namespace: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
        (self.install)(lua, namespace, ctx)
    }
}

impl std::fmt::Debug for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feature")
            .field("name", &self.qualified_name())
            .field("permission", &self.permission)
            .finish()
    }
}

/// Everything a feature may touch, scoped to one (plugin, surface).
#[derive(Clone)]
pub struct FeatureContext {
    pub plugin_id: Rc<str>,
    pub manifest: Rc<PluginManifest>,
    /// Instance id of the owning plugin context.
    pub instance: Uuid,
    pub surface: Surface,
    pub logger: PluginLogger,
    pub services: HostServices,
    pub cache: CacheView,
    pub custom_blocks: CustomBlockRegistry,
    pub scheduler: Scheduler,
    pub(crate) events: SharedEvents,
    pub(crate) pending: SharedPending,
}

impl FeatureContext {
    /// Logs a capability misuse and yields nil to the plugin.
    pub(crate) fn misuse(&self, feature: &str, message: impl std::fmt::Display) -> mlua::Result<Value> {
        self.logger.capability(format!("api.{feature}: {message}"));
        Ok(Value::Nil)
    }

    /// Checks that a block exists and belongs to this plugin, logging a
    /// resolution failure otherwise.
    pub(crate) fn owns_block(&self, feature: &str, block_id: &str) -> bool {
        match self.services.blocks.owner(block_id) {
            Some(owner) if owner == *self.plugin_id => true,
            Some(_) => {
                self.logger
                    .resolution(format!("api.{feature}: block '{block_id}' belongs to another plugin"));
                false
            }
            None => {
                self.logger
                    .resolution(format!("api.{feature}: no block '{block_id}'"));
                false
            }
        }
    }

    pub(crate) fn completion_target(&self) -> CompletionTarget {
        CompletionTarget {
            plugin_id: self.plugin_id.to_string(),
            instance: self.instance,
            surface: self.surface,
        }
    }
}

/// Installs a function whose arguments arrive as a raw slice, so every
/// feature does its own validation instead of raising on a bad type.
pub(crate) fn define<F>(lua: &Lua, namespace: &Table, name: &str, ctx: &FeatureContext, f: F) -> mlua::Result<()>
where
    F: Fn(&Lua, &FeatureContext, &[Value]) -> mlua::Result<Value> + 'static,
{
    let ctx = ctx.clone();
    let function = lua.create_function(move |lua, args: Variadic<Value>| f(lua, &ctx, &args))?;
    namespace.raw_set(name, function)
}

pub(crate) fn string_arg(args: &[Value], index: usize) -> Option<String> {
    match args.get(index) {
        Some(Value::String(s)) => s.to_str().ok().map(|s| s.to_string()),
        _ => None,
    }
}

pub(crate) fn number_arg(args: &[Value], index: usize) -> Option<f64> {
    match args.get(index) {
        Some(Value::Integer(i)) => Some(*i as f64),
        Some(Value::Number(n)) => Some(*n),
        _ => None,
    }
}

/// Marshals one argument; a missing argument is JSON null.
pub(crate) fn json_arg(args: &[Value], index: usize) -> Result<JsonValue, crate::error::MarshalError> {
    match args.get(index) {
        Some(value) => marshal::from_sandbox(value),
        None => Ok(JsonValue::Null),
    }
}

pub(crate) fn to_lua(lua: &Lua, value: &JsonValue) -> mlua::Result<Value> {
    marshal::to_sandbox(lua, value).map_err(mlua::Error::external)
}
