//! `api.on(kind, handler)`.

use super::{Feature, FeatureContext, define, string_arg};
use crate::permissions::Permission;
use mlua::{Lua, Table, Value};

pub const ON: Feature = Feature {
    name: "on",
    namespace: None,
    permission: Permission::Events,
    install: install_on,
};

fn install_on(lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    define(lua, ns, "on", ctx, |_lua, ctx, args| {
        let Some(kind) = string_arg(args, 0) else {
            return ctx.misuse("on", "event kind must be a string");
        };
        let Some(Value::Function(handler)) = args.get(1) else {
            return ctx.misuse("on", format!("handler for '{kind}' must be a function"));
        };
        let registered = ctx.events.borrow_mut().register(&kind, handler.clone());
        match registered {
            Ok(_) => Ok(Value::Nil),
            Err(e) => {
                // The one misuse that raises inside the sandbox.
                ctx.logger.protocol(format!("api.on: {e}"));
                Err(mlua::Error::runtime(format!("api.on: {e}")))
            }
        }
    })
}
