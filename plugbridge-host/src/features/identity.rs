//! `api.plugin_id`, `api.surface`, `api.null`.

use super::{Feature, FeatureContext};
use crate::permissions::Permission;
use mlua::{Lua, Table, Value};

pub const PLUGIN_ID: Feature = Feature {
    name: "plugin_id",
    namespace: None,
    permission: Permission::Core,
    install: install_plugin_id,
};

pub const SURFACE: Feature = Feature {
    name: "surface",
    namespace: None,
    permission: Permission::Core,
    install: install_surface,
};

/// Sentinel plugins use to write JSON null into data bags.
pub const NULL: Feature = Feature {
    name: "null",
    namespace: None,
    permission: Permission::Core,
    install: install_null,
};

fn install_plugin_id(_lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    ns.raw_set("plugin_id", &*ctx.plugin_id)
}

fn install_surface(_lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    ns.raw_set("surface", ctx.surface.as_str())
}

fn install_null(_lua: &Lua, ns: &Table, _ctx: &FeatureContext) -> mlua::Result<()> {
    ns.raw_set("null", Value::NULL)
}
