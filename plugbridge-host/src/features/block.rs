//! `api.block.*`: block-scoped capabilities available on both surfaces.
//!
//! Every function takes the block id first and only acts on blocks that
//! exist and belong to the calling plugin.

use super::{Feature, FeatureContext, define, json_arg, number_arg, string_arg, to_lua};
use crate::permissions::Permission;
use mlua::{Lua, Table, Value};
use serde_json::Value as JsonValue;

pub const GET_DATA: Feature = Feature {
    name: "get_data",
    namespace: Some("block"),
    permission: Permission::Block,
    install: install_get_data,
};

pub const SET_DATA: Feature = Feature {
    name: "set_data",
    namespace: Some("block"),
    permission: Permission::Block,
    install: install_set_data,
};

pub const GET_PROPERTY: Feature = Feature {
    name: "get_property",
    namespace: Some("block"),
    permission: Permission::Block,
    install: install_get_property,
};

pub const GET_VIEW: Feature = Feature {
    name: "get_view",
    namespace: Some("block"),
    permission: Permission::Block,
    install: install_get_view,
};

pub const SET_OPACITY: Feature = Feature {
    name: "set_opacity",
    namespace: Some("block"),
    permission: Permission::Block,
    install: install_set_opacity,
};

pub const POST_MESSAGE: Feature = Feature {
    name: "post_message",
    namespace: Some("block"),
    permission: Permission::Block,
    install: install_post_message,
};

pub const REQUEST_RENDER: Feature = Feature {
    name: "request_render",
    namespace: Some("block"),
    permission: Permission::Block,
    install: install_request_render,
};

/// Resolves the leading block id argument, logging on failure.
pub(crate) fn target_block(ctx: &FeatureContext, feature: &str, args: &[Value]) -> Option<String> {
    let Some(block_id) = string_arg(args, 0) else {
        ctx.logger
            .capability(format!("api.{feature}: block id must be a string"));
        return None;
    };
    ctx.owns_block(feature, &block_id).then_some(block_id)
}

fn install_get_data(lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    define(lua, ns, "get_data", ctx, |lua, ctx, args| {
        let Some(block_id) = target_block(ctx, "block.get_data", args) else {
            return Ok(Value::Nil);
        };
        let Some(key) = string_arg(args, 1) else {
            return ctx.misuse("block.get_data", "key must be a string");
        };
        let value = ctx
            .services
            .blocks
            .get(&block_id)
            .and_then(|block| block.data.get(&key).cloned());
        match value {
            Some(value) => to_lua(lua, &value),
            None => Ok(Value::Nil),
        }
    })
}

fn install_set_data(lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    define(lua, ns, "set_data", ctx, |_lua, ctx, args| {
        let Some(block_id) = target_block(ctx, "block.set_data", args) else {
            return Ok(Value::Nil);
        };
        let Some(key) = string_arg(args, 1) else {
            return ctx.misuse("block.set_data", "key must be a string");
        };
        // nil clears the key; api.null stores an explicit null.
        let value = match args.get(2) {
            None | Some(Value::Nil) => None,
            Some(_) => match json_arg(args, 2) {
                Ok(value) => Some(value),
                Err(e) => return ctx.misuse("block.set_data", format!("value for '{key}': {e}")),
            },
        };
        ctx.services.blocks.update(&block_id, |block| match value {
            Some(value) => {
                block.data.insert(key, value);
            }
            None => {
                block.data.remove(&key);
            }
        });
        Ok(Value::Boolean(true))
    })
}

fn install_get_property(lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    define(lua, ns, "get_property", ctx, |lua, ctx, args| {
        let Some(block_id) = target_block(ctx, "block.get_property", args) else {
            return Ok(Value::Nil);
        };
        let Some(key) = string_arg(args, 1) else {
            return ctx.misuse("block.get_property", "key must be a string");
        };
        let value = ctx
            .services
            .blocks
            .get(&block_id)
            .and_then(|block| block.property(&key).map(|p| p.value()));
        match value {
            Some(value) => to_lua(lua, &value),
            None => ctx.misuse("block.get_property", format!("no property '{key}' declared")),
        }
    })
}

fn install_get_view(lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    define(lua, ns, "get_view", ctx, |lua, ctx, args| {
        let Some(block_id) = target_block(ctx, "block.get_view", args) else {
            return Ok(Value::Nil);
        };
        match ctx.services.blocks.view(&block_id) {
            Some(view) => to_lua(lua, &view),
            None => Ok(Value::Nil),
        }
    })
}

fn install_set_opacity(lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    define(lua, ns, "set_opacity", ctx, |_lua, ctx, args| {
        let Some(block_id) = target_block(ctx, "block.set_opacity", args) else {
            return Ok(Value::Nil);
        };
        let opacity = match number_arg(args, 1) {
            Some(x) if (0.0..=1.0).contains(&x) => x,
            Some(x) => return ctx.misuse("block.set_opacity", format!("{x} is outside 0..=1")),
            None => return ctx.misuse("block.set_opacity", "opacity must be a number"),
        };
        ctx.services.blocks.update(&block_id, |block| block.opacity = opacity);
        Ok(Value::Boolean(true))
    })
}

fn install_post_message(lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    define(lua, ns, "post_message", ctx, |_lua, ctx, args| {
        let Some(block_id) = target_block(ctx, "block.post_message", args) else {
            return Ok(Value::Nil);
        };
        let message = match json_arg(args, 1) {
            Ok(JsonValue::Null) => return ctx.misuse("block.post_message", "message is required"),
            Ok(message) => message,
            Err(e) => return ctx.misuse("block.post_message", e),
        };
        ctx.services
            .content
            .post_to_block(&ctx.plugin_id, &block_id, &message);
        Ok(Value::Boolean(true))
    })
}

fn install_request_render(lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    define(lua, ns, "request_render", ctx, |_lua, ctx, args| {
        let Some(block_id) = target_block(ctx, "block.request_render", args) else {
            return Ok(Value::Nil);
        };
        ctx.services.content.request_render(&ctx.plugin_id, &block_id);
        Ok(Value::Boolean(true))
    })
}
