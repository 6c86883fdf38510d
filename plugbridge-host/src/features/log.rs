//! `api.log`, `api.warn`, `api.error`: plugin-authored log lines.

use super::{Feature, FeatureContext, define};
use crate::logging::{LogCategory, LogLevel};
use crate::marshal;
use crate::permissions::Permission;
use mlua::{Lua, Table, Value};

pub const LOG: Feature = Feature {
    name: "log",
    namespace: None,
    permission: Permission::Logger,
    install: |lua, ns, ctx| install_at(lua, ns, ctx, "log", LogLevel::Info),
};

pub const WARN: Feature = Feature {
    name: "warn",
    namespace: None,
    permission: Permission::Logger,
    install: |lua, ns, ctx| install_at(lua, ns, ctx, "warn", LogLevel::Warn),
};

pub const ERROR: Feature = Feature {
    name: "error",
    namespace: None,
    permission: Permission::Logger,
    install: |lua, ns, ctx| install_at(lua, ns, ctx, "error", LogLevel::Error),
};

fn install_at(lua: &Lua, ns: &Table, ctx: &FeatureContext, name: &str, level: LogLevel) -> mlua::Result<()> {
    define(lua, ns, name, ctx, move |_lua, ctx, args| {
        ctx.logger.log(level, LogCategory::Plugin, format_message(args));
        Ok(Value::Nil)
    })
}

/// Joins arguments with spaces; structured values are written as JSON.
fn format_message(args: &[Value]) -> String {
    args.iter()
        .map(|value| match value {
            Value::String(s) => s.to_string_lossy().to_string(),
            other => match marshal::from_sandbox(other) {
                Ok(json) => json.to_string(),
                Err(_) => format!("<{}>", other.type_name()),
            },
        })
        .collect::<Vec<_>>()
        .join(" ")
}
