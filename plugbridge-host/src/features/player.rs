//! Player-only capabilities: `api.player.client_id` and
//! `api.player.send_remote`.

use super::block::target_block;
use super::{Feature, FeatureContext, define, string_arg};
use crate::permissions::Permission;
use mlua::{Lua, Table, Value};
use plugbridge_types::RemoteMessage;

pub const CLIENT_ID: Feature = Feature {
    name: "client_id",
    namespace: Some("player"),
    permission: Permission::Remote,
    install: install_client_id,
};

pub const SEND_REMOTE: Feature = Feature {
    name: "send_remote",
    namespace: Some("player"),
    permission: Permission::Remote,
    install: install_send_remote,
};

fn install_client_id(_lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    ns.raw_set("client_id", ctx.services.transport.client_id())
}

fn install_send_remote(lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    define(lua, ns, "send_remote", ctx, |_lua, ctx, args| {
        let Some(block_id) = target_block(ctx, "player.send_remote", args) else {
            return Ok(Value::Nil);
        };
        let Some(payload) = string_arg(args, 1) else {
            return ctx.misuse("player.send_remote", "payload must be a string");
        };
        ctx.services.transport.send(RemoteMessage {
            plugin_id: ctx.plugin_id.to_string(),
            block_id,
            sender_id: ctx.services.transport.client_id(),
            payload,
        });
        Ok(Value::Boolean(true))
    })
}
