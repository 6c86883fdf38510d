//! Central plugin lifecycle manager.
//!
//! Owns every installed `PluginContext`, enforces policy, and routes host
//! occurrences that are not tied to one block (panel events, realtime
//! messages, async completions) into the right sandbox.

use crate::blocks::BlockStore;
use crate::bridge::PlayerPluginBlock;
use crate::cache::{CacheView, PluginCache};
use crate::config::HostConfig;
use crate::context::{HostEnv, PluginContext};
use crate::custom_blocks::CustomBlockRegistry;
use crate::error::BridgeError;
use crate::host::HostServices;
use crate::logging::{LogCategory, LogLevel, PluginLogger};
use crate::permissions::PermissionSet;
use crate::policy::PolicyEngine;
use crate::sandbox::RuntimeMetrics;
use crate::scheduler::{Completion, Scheduler};
use plugbridge_types::{CustomBlockDescriptor, EventKind, PluginManifest, RemoteMessage, Surface};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Outcome of redelivering one async completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The parked callback was invoked.
    Delivered { plugin_id: String, ticket: u64 },
    /// The plugin, its runtime or the callback was gone.
    Dropped { plugin_id: String, ticket: u64 },
}

pub struct PluginManager {
    plugins: HashMap<String, Rc<PluginContext>>,
    policy: PolicyEngine,
    env: Rc<HostEnv>,
    completions: mpsc::UnboundedReceiver<Completion>,
}

impl PluginManager {
    pub fn new(services: HostServices) -> Self {
        Self::with_config(services, HostConfig::default())
    }

    pub fn with_config(services: HostServices, config: HostConfig) -> Self {
        let (scheduler, completions) = Scheduler::channel();
        let env = HostEnv {
            services,
            cache: PluginCache::new(config.cache),
            custom_blocks: CustomBlockRegistry::new(),
            scheduler,
            limits: config.sandbox,
        };
        Self {
            plugins: HashMap::new(),
            policy: PolicyEngine::with_config(config.policy),
            env: Rc::new(env),
            completions,
        }
    }

    // ================================================================
    // Lifecycle
    // ================================================================

    /// Installs a plugin. Runtimes are created lazily on first use.
    pub fn install(&mut self, manifest: PluginManifest) -> Result<Rc<PluginContext>, BridgeError> {
        manifest.validate()?;
        let plugin_id = manifest.id.clone();

        if !self.policy.is_plugin_allowed(&plugin_id) {
            warn!(plugin_id = %plugin_id, "Plugin blocked by policy");
            return Err(BridgeError::PolicyDenied(format!(
                "plugin '{plugin_id}' is not allowed by host policy"
            )));
        }
        if self.plugins.contains_key(&plugin_id) {
            return Err(BridgeError::PluginAlreadyInstalled(plugin_id));
        }

        let (permissions, unknown) = PermissionSet::for_manifest(&manifest, &self.policy);
        let declared_blocks = manifest.custom_block_descriptors();
        let context = Rc::new(PluginContext::new(manifest, permissions, Rc::clone(&self.env)));

        for descriptor in declared_blocks {
            if let Err(e) = self.env.custom_blocks.register(descriptor) {
                self.env.custom_blocks.remove_plugin(&plugin_id);
                warn!(plugin_id = %plugin_id, "Install aborted: {}", e);
                return Err(e);
            }
        }

        let logger = context.logger();
        if !unknown.is_empty() {
            logger.log(
                LogLevel::Warn,
                LogCategory::Lifecycle,
                format!("ignoring unknown permissions: {}", unknown.join(", ")),
            );
        }
        let mut denied: Vec<&str> = crate::permissions::Permission::ALL
            .iter()
            .filter(|p| context.permissions().is_denied(**p))
            .map(|p| p.interface_name())
            .collect();
        denied.sort_unstable();
        if !denied.is_empty() {
            logger.log(
                LogLevel::Warn,
                LogCategory::Lifecycle,
                format!("permissions denied by policy: {}", denied.join(", ")),
            );
        }

        info!(
            plugin_id = %plugin_id,
            version = %context.manifest().version,
            "Plugin installed"
        );
        self.plugins.insert(plugin_id, Rc::clone(&context));
        Ok(context)
    }

    /// Tears down both runtimes and forgets the plugin.
    ///
    /// Async work already in flight is dropped when it completes. Cache
    /// entries are kept for the rest of the session.
    pub fn uninstall(&mut self, plugin_id: &str) -> Result<(), BridgeError> {
        let context = self
            .plugins
            .remove(plugin_id)
            .ok_or_else(|| BridgeError::PluginNotFound(plugin_id.to_string()))?;
        context.teardown();
        let removed = self.env.custom_blocks.remove_plugin(plugin_id);
        info!(plugin_id = %plugin_id, custom_blocks = removed, "Plugin uninstalled");
        Ok(())
    }

    /// Tears down every plugin (session end).
    pub fn shutdown(&mut self) {
        for (plugin_id, context) in self.plugins.drain() {
            context.teardown();
            debug!(plugin_id = %plugin_id, "Plugin torn down at shutdown");
        }
    }

    // ================================================================
    // Lookup
    // ================================================================

    pub fn get_plugin(&self, plugin_id: &str) -> Option<Rc<PluginContext>> {
        self.plugins.get(plugin_id).cloned()
    }

    pub fn is_installed(&self, plugin_id: &str) -> bool {
        self.plugins.contains_key(plugin_id)
    }

    pub fn plugin_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.plugins.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Records a block kind contributed by an installed plugin.
    pub fn register_custom_block(&self, descriptor: CustomBlockDescriptor) -> Result<(), BridgeError> {
        if !self.plugins.contains_key(&descriptor.plugin_id) {
            return Err(BridgeError::PluginNotFound(descriptor.plugin_id));
        }
        self.env.custom_blocks.register(descriptor)
    }

    pub fn custom_blocks(&self) -> Vec<CustomBlockDescriptor> {
        self.env.custom_blocks.list()
    }

    pub fn cache(&self) -> &PluginCache {
        &self.env.cache
    }

    pub fn cache_view(&self, plugin_id: &str) -> CacheView {
        self.env.cache.view(plugin_id)
    }

    pub fn services(&self) -> &HostServices {
        &self.env.services
    }

    pub fn blocks(&self) -> &BlockStore {
        &self.env.services.blocks
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    pub fn metrics(&self, plugin_id: &str, surface: Surface) -> Option<RuntimeMetrics> {
        self.plugins.get(plugin_id)?.metrics(surface)
    }

    /// Logger for a plugin id that may not be installed, so lookups of
    /// unknown plugins still reach the sink.
    pub fn host_logger(&self, plugin_id: &str, surface: Surface) -> PluginLogger {
        match self.plugins.get(plugin_id) {
            Some(context) => context.logger().for_surface(surface),
            None => PluginLogger::new(plugin_id, plugin_id, Rc::clone(&self.env.services.log_sink))
                .for_surface(surface),
        }
    }

    // ================================================================
    // Routing
    // ================================================================

    /// Delivers an inbound realtime message to its block's player runtime.
    pub fn route_remote_message(&self, message: &RemoteMessage) -> usize {
        PlayerPluginBlock::new(&message.block_id, &message.plugin_id).process_remote_message(
            self,
            &message.payload,
            &message.sender_id,
        )
    }

    /// Tells a plugin its editor panel is mounted.
    pub fn process_panel_registered(&self, plugin_id: &str) -> usize {
        self.dispatch_panel(plugin_id, EventKind::PanelRegistered, &[])
    }

    /// Delivers a message posted from the plugin's panel content.
    pub fn process_panel_message(&self, plugin_id: &str, message: &JsonValue) -> usize {
        self.dispatch_panel(plugin_id, EventKind::PanelMessage, std::slice::from_ref(message))
    }

    fn dispatch_panel(&self, plugin_id: &str, kind: EventKind, args: &[JsonValue]) -> usize {
        let Some(context) = self.plugins.get(plugin_id) else {
            self.host_logger(plugin_id, Surface::Editor)
                .resolution(format!("{kind}: plugin '{plugin_id}' is not installed"));
            return 0;
        };
        match context.runtime(Surface::Editor) {
            Ok(runtime) => runtime.dispatch(kind, args).invoked,
            Err(reason) => {
                context
                    .logger()
                    .for_surface(Surface::Editor)
                    .resolution(format!("{kind}: {reason}"));
                0
            }
        }
    }

    // ================================================================
    // Async completions
    // ================================================================

    /// Redelivers every completion already queued, without waiting.
    pub fn deliver_ready(&mut self) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        while let Ok(completion) = self.completions.try_recv() {
            deliveries.push(self.deliver(completion));
        }
        deliveries
    }

    /// Waits for the next completion and redelivers it.
    pub async fn deliver_next(&mut self) -> Option<Delivery> {
        let completion = self.completions.recv().await?;
        Some(self.deliver(completion))
    }

    fn deliver(&self, completion: Completion) -> Delivery {
        let Completion {
            target,
            ticket,
            result,
            cache_key,
        } = completion;
        let plugin_id = target.plugin_id;

        let context = self
            .plugins
            .get(&plugin_id)
            .filter(|c| c.instance() == target.instance && c.is_alive());
        let runtime = context.and_then(|c| c.existing_runtime(target.surface));
        let callback = runtime.as_ref().and_then(|r| r.take_pending(ticket));
        let (Some(context), Some(runtime), Some(callback)) = (context, runtime, callback) else {
            debug!(plugin_id = %plugin_id, ticket, "Dropping completion for a plugin that is gone");
            return Delivery::Dropped { plugin_id, ticket };
        };

        if let (Ok(body), Some(key)) = (&result, &cache_key) {
            if let Err(e) = self.env.cache.view(&plugin_id).set(key, body) {
                context
                    .logger()
                    .for_surface(target.surface)
                    .capability(format!("api.fetch: result not cached: {e}"));
            }
        }

        let args = match result {
            Ok(body) => [JsonValue::Bool(true), JsonValue::String(body)],
            Err(reason) => [JsonValue::Bool(false), JsonValue::String(reason)],
        };
        // Failures are logged by the runtime.
        let _ = runtime.invoke(&callback, &args);
        Delivery::Delivered { plugin_id, ticket }
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.plugin_ids())
            .finish()
    }
}
