//! Host-side record for one installed plugin.

use crate::cache::PluginCache;
use crate::custom_blocks::CustomBlockRegistry;
use crate::error::LoadError;
use crate::features::FeatureContext;
use crate::host::HostServices;
use crate::logging::{LogCategory, LogLevel, PluginLogger};
use crate::permissions::PermissionSet;
use crate::registry::CapabilityRegistry;
use crate::sandbox::{RuntimeMetrics, SandboxLimits, SandboxRuntime};
use crate::scheduler::Scheduler;
use plugbridge_types::{PluginManifest, Surface};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::info;
use uuid::Uuid;

/// Session-wide state every plugin context draws on.
pub struct HostEnv {
    pub services: HostServices,
    pub cache: PluginCache,
    pub custom_blocks: CustomBlockRegistry,
    pub scheduler: Scheduler,
    pub limits: SandboxLimits,
}

enum Slot {
    /// Source is being evaluated; re-entrant lookups must not start another.
    Loading,
    Live(Rc<SandboxRuntime>),
    Failed(String),
}

/// One installed plugin: identity, manifest, granted permissions and at
/// most one sandbox runtime per surface, created on first use.
pub struct PluginContext {
    id: String,
    instance: Uuid,
    manifest: Rc<PluginManifest>,
    logger: PluginLogger,
    permissions: PermissionSet,
    env: Rc<HostEnv>,
    alive: Cell<bool>,
    runtimes: RefCell<HashMap<Surface, Slot>>,
}

impl PluginContext {
    pub(crate) fn new(manifest: PluginManifest, permissions: PermissionSet, env: Rc<HostEnv>) -> Self {
        let logger = PluginLogger::new(&manifest.id, &manifest.name, Rc::clone(&env.services.log_sink));
        Self {
            id: manifest.id.clone(),
            instance: Uuid::new_v4(),
            manifest: Rc::new(manifest),
            logger,
            permissions,
            env,
            alive: Cell::new(true),
            runtimes: RefCell::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Distinguishes this installation from earlier ones of the same id.
    pub fn instance(&self) -> Uuid {
        self.instance
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    pub fn logger(&self) -> &PluginLogger {
        &self.logger
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    /// The runtime for `surface`, created and loaded on first call.
    ///
    /// A runtime whose load failed is never retried; the error explains why
    /// the surface is unavailable.
    pub fn runtime(&self, surface: Surface) -> Result<Rc<SandboxRuntime>, String> {
        if !self.is_alive() {
            return Err("plugin has been uninstalled".to_string());
        }
        match self.runtimes.borrow().get(&surface) {
            Some(Slot::Live(runtime)) => return Ok(Rc::clone(runtime)),
            Some(Slot::Failed(reason)) => return Err(reason.clone()),
            Some(Slot::Loading) => return Err(format!("{surface} runtime is still loading")),
            None => {}
        }
        let Some(source) = self.manifest.source(surface) else {
            return Err(format!("plugin has no {surface} source"));
        };

        self.runtimes.borrow_mut().insert(surface, Slot::Loading);
        let created = self.create_runtime(surface, source);
        let result = match created {
            Ok(runtime) => {
                info!(
                    plugin_id = %self.id,
                    surface = %surface,
                    "Plugin runtime ready"
                );
                Ok(runtime)
            }
            Err(e) => Err(format!("{surface} runtime failed to load: {e}")),
        };

        // Uninstalled while the source was running.
        if !self.is_alive() {
            if let Ok(runtime) = &result {
                runtime.teardown();
            }
            self.runtimes.borrow_mut().remove(&surface);
            return Err("plugin has been uninstalled".to_string());
        }

        let slot = match &result {
            Ok(runtime) => Slot::Live(Rc::clone(runtime)),
            Err(reason) => Slot::Failed(reason.clone()),
        };
        self.runtimes.borrow_mut().insert(surface, slot);
        result
    }

    /// The runtime for `surface` if one is already live; never creates one.
    pub fn existing_runtime(&self, surface: Surface) -> Option<Rc<SandboxRuntime>> {
        match self.runtimes.borrow().get(&surface) {
            Some(Slot::Live(runtime)) => Some(Rc::clone(runtime)),
            _ => None,
        }
    }

    pub fn metrics(&self, surface: Surface) -> Option<RuntimeMetrics> {
        self.existing_runtime(surface).map(|runtime| runtime.metrics())
    }

    /// Marks the plugin dead and tears down both runtimes.
    pub(crate) fn teardown(&self) {
        self.alive.set(false);
        let slots: Vec<Slot> = self.runtimes.borrow_mut().drain().map(|(_, slot)| slot).collect();
        for slot in slots {
            if let Slot::Live(runtime) = slot {
                runtime.teardown();
            }
        }
    }

    fn create_runtime(&self, surface: Surface, source: &str) -> Result<Rc<SandboxRuntime>, LoadError> {
        let logger = self.logger.for_surface(surface);
        let runtime = SandboxRuntime::new(surface, logger.clone(), self.env.limits.clone())
            .map(Rc::new)
            .inspect_err(|e| logger.load(e.to_string()))?;

        let ctx = FeatureContext {
            plugin_id: Rc::from(self.id.as_str()),
            manifest: Rc::clone(&self.manifest),
            instance: self.instance,
            surface,
            logger: logger.clone(),
            services: self.env.services.clone(),
            cache: self.env.cache.view(&self.id),
            custom_blocks: self.env.custom_blocks.clone(),
            scheduler: self.env.scheduler.clone(),
            events: runtime.events(),
            pending: runtime.pending(),
        };
        let registry = CapabilityRegistry::for_surface(surface);
        let report = runtime
            .install_api(&registry, &ctx, &self.permissions)
            .inspect_err(|e| logger.load(e.to_string()))?;
        logger.log(
            LogLevel::Debug,
            LogCategory::Lifecycle,
            format!("{} capabilities installed", report.installed.len()),
        );

        // load() reports its own failures.
        runtime.load(source)?;
        Ok(runtime)
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("id", &self.id)
            .field("instance", &self.instance)
            .field("alive", &self.alive.get())
            .finish()
    }
}
