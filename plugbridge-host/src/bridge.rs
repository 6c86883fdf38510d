//! Block-plugin bridge: binds one plugin-authored block to its plugin's
//! sandbox on the editor or the player surface.
//!
//! Bindings hold ids only. Plugin context, runtime and block are resolved
//! again on every call, so a reinstalled plugin or a replaced block is
//! picked up without rebinding.

use crate::error::BridgeError;
use crate::manager::PluginManager;
use crate::sandbox::SandboxRuntime;
use plugbridge_types::{EventKind, PluginBlock, Surface, serialize_block};
use serde_json::Value as JsonValue;
use std::rc::Rc;

/// Ids linking a block to the plugin that renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBinding {
    pub block_id: String,
    pub plugin_id: String,
}

struct Resolved {
    runtime: Rc<SandboxRuntime>,
    view: JsonValue,
}

impl BlockBinding {
    pub fn new(block_id: impl Into<String>, plugin_id: impl Into<String>) -> Self {
        Self {
            block_id: block_id.into(),
            plugin_id: plugin_id.into(),
        }
    }

    /// plugin id → context → runtime → block view. Every miss is logged as
    /// a resolution failure.
    fn resolve(&self, manager: &PluginManager, surface: Surface, kind: EventKind) -> Option<Resolved> {
        let Some(context) = manager.get_plugin(&self.plugin_id) else {
            manager
                .host_logger(&self.plugin_id, surface)
                .resolution(format!("{kind} for block '{}': plugin is not installed", self.block_id));
            return None;
        };
        let logger = context.logger().for_surface(surface);
        let runtime = match context.runtime(surface) {
            Ok(runtime) => runtime,
            Err(reason) => {
                logger.resolution(format!("{kind} for block '{}': {reason}", self.block_id));
                return None;
            }
        };
        let block = match manager.blocks().get(&self.block_id) {
            Some(block) if block.plugin_id == self.plugin_id => block,
            Some(block) => {
                logger.resolution(format!(
                    "{kind}: block '{}' belongs to plugin '{}'",
                    self.block_id, block.plugin_id
                ));
                return None;
            }
            None => {
                logger.resolution(format!("{kind}: no block '{}'", self.block_id));
                return None;
            }
        };
        Some(Resolved {
            runtime,
            view: serialize_block(&block),
        })
    }

    fn render(&self, manager: &PluginManager, surface: Surface) -> String {
        let kind = EventKind::BlockRender;
        let Some(resolved) = self.resolve(manager, surface, kind) else {
            return String::new();
        };
        if resolved.runtime.handler_count(kind) == 0 {
            resolved
                .runtime
                .logger()
                .resolution(format!("{kind}: no handler registered"));
            return String::new();
        }

        let dispatch = resolved.runtime.dispatch(kind, &[resolved.view]);
        let markup = dispatch.first_markup().unwrap_or_default().to_string();
        if markup.is_empty() && dispatch.faults == 0 {
            resolved
                .runtime
                .logger()
                .resolution(format!("{kind}: handlers returned no markup for '{}'", self.block_id));
        }
        manager
            .blocks()
            .update(&self.block_id, |block| block.rendered = Some(markup.clone()));
        markup
    }

    /// Dispatches `kind` with the block view followed by `extra`. Returns
    /// the number of handlers invoked.
    fn notify(&self, manager: &PluginManager, surface: Surface, kind: EventKind, extra: Vec<JsonValue>) -> usize {
        let Some(resolved) = self.resolve(manager, surface, kind) else {
            return 0;
        };
        if resolved.runtime.handler_count(kind) == 0 {
            resolved
                .runtime
                .logger()
                .resolution(format!("{kind}: no handler registered"));
            return 0;
        }
        let mut args = Vec::with_capacity(extra.len() + 1);
        args.push(resolved.view);
        args.extend(extra);
        resolved.runtime.dispatch(kind, &args).invoked
    }
}

/// A plugin block as seen by the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorPluginBlock {
    binding: BlockBinding,
}

impl EditorPluginBlock {
    pub fn new(block_id: impl Into<String>, plugin_id: impl Into<String>) -> Self {
        Self {
            binding: BlockBinding::new(block_id, plugin_id),
        }
    }

    pub fn from_block(block: &PluginBlock) -> Self {
        Self::new(&block.id, &block.plugin_id)
    }

    pub fn binding(&self) -> &BlockBinding {
        &self.binding
    }

    /// Markup from the plugin's `block-render` handlers, or `""`.
    pub fn render(&self, manager: &PluginManager) -> String {
        self.binding.render(manager, Surface::Editor)
    }

    /// A message posted from the block's rendered content.
    pub fn process_message(&self, manager: &PluginManager, message: &JsonValue) -> usize {
        self.binding
            .notify(manager, Surface::Editor, EventKind::BlockMessage, vec![message.clone()])
    }

    pub fn process_property_change(&self, manager: &PluginManager, key: &str) -> usize {
        self.binding.notify(
            manager,
            Surface::Editor,
            EventKind::BlockPropertyChange,
            vec![JsonValue::String(key.to_string())],
        )
    }

    /// Applies a value edited in the property panel, then notifies the
    /// plugin. A rejected value leaves the block unchanged.
    pub fn edit_property(
        &self,
        manager: &PluginManager,
        key: &str,
        value: &JsonValue,
    ) -> Result<usize, BridgeError> {
        manager
            .blocks()
            .update(&self.binding.block_id, |block| block.set_property_value(key, value))
            .ok_or_else(|| BridgeError::BlockNotFound(self.binding.block_id.clone()))?
            .map_err(|e| BridgeError::PropertyRejected(e.to_string()))?;
        Ok(self.process_property_change(manager, key))
    }
}

/// A plugin block as seen by the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerPluginBlock {
    binding: BlockBinding,
}

impl PlayerPluginBlock {
    pub fn new(block_id: impl Into<String>, plugin_id: impl Into<String>) -> Self {
        Self {
            binding: BlockBinding::new(block_id, plugin_id),
        }
    }

    pub fn from_block(block: &PluginBlock) -> Self {
        Self::new(&block.id, &block.plugin_id)
    }

    pub fn binding(&self) -> &BlockBinding {
        &self.binding
    }

    pub fn render(&self, manager: &PluginManager) -> String {
        self.binding.render(manager, Surface::Player)
    }

    pub fn process_message(&self, manager: &PluginManager, message: &JsonValue) -> usize {
        self.binding
            .notify(manager, Surface::Player, EventKind::BlockMessage, vec![message.clone()])
    }

    /// A message another participant's instance of this block sent.
    pub fn process_remote_message(&self, manager: &PluginManager, message: &str, sender_id: &str) -> usize {
        self.binding.notify(
            manager,
            Surface::Player,
            EventKind::RemoteMessage,
            vec![
                JsonValue::String(message.to_string()),
                JsonValue::String(sender_id.to_string()),
            ],
        )
    }
}
