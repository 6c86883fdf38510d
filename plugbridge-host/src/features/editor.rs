//! Editor-only capabilities: typed block properties, the plugin panel and
//! custom block registration.

use super::block::target_block;
use super::{Feature, FeatureContext, define, json_arg};
use crate::host::PanelDescriptor;
use crate::permissions::Permission;
use mlua::{Lua, Table, Value};
use plugbridge_types::{BlockProperty, CustomBlockDeclaration};
use serde_json::Value as JsonValue;

pub const DECLARE_PROPERTIES: Feature = Feature {
    name: "declare_properties",
    namespace: Some("block"),
    permission: Permission::Block,
    install: install_declare_properties,
};

pub const PANEL_OPEN: Feature = Feature {
    name: "open",
    namespace: Some("panel"),
    permission: Permission::Panel,
    install: install_panel_open,
};

pub const PANEL_POST_MESSAGE: Feature = Feature {
    name: "post_message",
    namespace: Some("panel"),
    permission: Permission::Panel,
    install: install_panel_post_message,
};

pub const REGISTER_BLOCK: Feature = Feature {
    name: "register_block",
    namespace: None,
    permission: Permission::CustomBlocks,
    install: install_register_block,
};

fn install_declare_properties(lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    define(lua, ns, "declare_properties", ctx, |_lua, ctx, args| {
        let Some(block_id) = target_block(ctx, "block.declare_properties", args) else {
            return Ok(Value::Nil);
        };
        let declarations = match json_arg(args, 1) {
            Ok(JsonValue::Array(items)) => items,
            Ok(_) => return ctx.misuse("block.declare_properties", "expected a list of properties"),
            Err(e) => return ctx.misuse("block.declare_properties", e),
        };
        // All or nothing: one bad declaration leaves the block untouched.
        let properties = match declarations
            .into_iter()
            .map(BlockProperty::from_declaration)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(properties) => properties,
            Err(e) => return ctx.misuse("block.declare_properties", e),
        };
        let declared = ctx
            .services
            .blocks
            .update(&block_id, |block| block.declare_properties(properties));
        match declared {
            Some(Err(e)) => ctx.misuse("block.declare_properties", e),
            _ => Ok(Value::Boolean(true)),
        }
    })
}

fn install_panel_open(lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    define(lua, ns, "open", ctx, |_lua, ctx, args| {
        let descriptor = match json_arg(args, 0) {
            Ok(value) => serde_json::from_value::<PanelDescriptor>(value),
            Err(e) => return ctx.misuse("panel.open", e),
        };
        match descriptor {
            Ok(panel) => {
                ctx.services.content.open_panel(&ctx.plugin_id, &panel);
                Ok(Value::Boolean(true))
            }
            Err(e) => ctx.misuse("panel.open", format!("expected {{ title, content }}: {e}")),
        }
    })
}

fn install_panel_post_message(lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    define(lua, ns, "post_message", ctx, |_lua, ctx, args| {
        match json_arg(args, 0) {
            Ok(JsonValue::Null) => ctx.misuse("panel.post_message", "message is required"),
            Ok(message) => {
                ctx.services.content.post_to_panel(&ctx.plugin_id, &message);
                Ok(Value::Boolean(true))
            }
            Err(e) => ctx.misuse("panel.post_message", e),
        }
    })
}

fn install_register_block(lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    define(lua, ns, "register_block", ctx, |_lua, ctx, args| {
        let declaration = match json_arg(args, 0).map(serde_json::from_value::<CustomBlockDeclaration>) {
            Ok(Ok(declaration)) if !declaration.id.is_empty() && !declaration.name.is_empty() => declaration,
            Ok(Ok(_)) => return ctx.misuse("register_block", "id and name must not be empty"),
            Ok(Err(e)) => return ctx.misuse("register_block", format!("expected {{ id, name, icon }}: {e}")),
            Err(e) => return ctx.misuse("register_block", e),
        };
        match ctx.custom_blocks.register(declaration.into_descriptor(&ctx.plugin_id)) {
            Ok(()) => Ok(Value::Boolean(true)),
            Err(e) => ctx.misuse("register_block", e),
        }
    })
}
