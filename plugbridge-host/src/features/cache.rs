//! `api.cache.get/set/remove`, shared by both surfaces of a plugin.

use super::{Feature, FeatureContext, define, string_arg};
use crate::permissions::Permission;
use mlua::{Lua, Table, Value};

pub const GET: Feature = Feature {
    name: "get",
    namespace: Some("cache"),
    permission: Permission::Cache,
    install: install_get,
};

pub const SET: Feature = Feature {
    name: "set",
    namespace: Some("cache"),
    permission: Permission::Cache,
    install: install_set,
};

pub const REMOVE: Feature = Feature {
    name: "remove",
    namespace: Some("cache"),
    permission: Permission::Cache,
    install: install_remove,
};

fn install_get(lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    define(lua, ns, "get", ctx, |lua, ctx, args| {
        let Some(key) = string_arg(args, 0) else {
            return ctx.misuse("cache.get", "key must be a string");
        };
        match ctx.cache.get(&key) {
            Some(value) => Ok(Value::String(lua.create_string(&value)?)),
            None => Ok(Value::Nil),
        }
    })
}

fn install_set(lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    define(lua, ns, "set", ctx, |_lua, ctx, args| {
        let (Some(key), Some(value)) = (string_arg(args, 0), string_arg(args, 1)) else {
            return ctx.misuse("cache.set", "key and value must be strings");
        };
        match ctx.cache.set(&key, &value) {
            Ok(()) => Ok(Value::Boolean(true)),
            Err(e) => ctx.misuse("cache.set", format!("'{key}' not stored: {e}")),
        }
    })
}

fn install_remove(lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    define(lua, ns, "remove", ctx, |_lua, ctx, args| {
        let Some(key) = string_arg(args, 0) else {
            return ctx.misuse("cache.remove", "key must be a string");
        };
        Ok(Value::Boolean(ctx.cache.remove(&key)))
    })
}
