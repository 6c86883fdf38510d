//! Plugin host for plugbridge.
//!
//! Runs untrusted plugin scripts in isolated Lua sandboxes, one per plugin
//! per surface, and bridges them to host blocks, panels, the realtime
//! transport and the network through a vetted capability API.
//!
//! Architecture:
//! - `PluginManager` owns installed `PluginContext`s and routes host events
//! - Each `PluginContext` lazily creates a `SandboxRuntime` per surface
//! - `CapabilityRegistry` installs the surface's features as the `api` global
//! - `EditorPluginBlock` / `PlayerPluginBlock` forward block events into the
//!   plugin's event handlers
//! - Async host work is scheduled off the sandbox and redelivered through
//!   `PluginManager::deliver_ready` / `deliver_next`

pub mod blocks;
pub mod bridge;
pub mod cache;
pub mod config;
pub mod context;
pub mod custom_blocks;
pub mod error;
pub mod events;
pub mod features;
pub mod host;
pub mod logging;
pub mod manager;
pub mod marshal;
pub mod permissions;
pub mod policy;
pub mod registry;
pub mod sandbox;
pub mod scheduler;

pub use blocks::BlockStore;
pub use bridge::{BlockBinding, EditorPluginBlock, PlayerPluginBlock};
pub use cache::{CacheConfig, CacheError, CacheView, PluginCache};
pub use config::HostConfig;
pub use context::PluginContext;
pub use error::{BridgeError, LoadError, MarshalError, RuntimeError};
pub use host::{
    ContentChannel, FetchFuture, Fetcher, HostServices, NoopContent, OfflineTransport,
    PanelDescriptor, RealtimeTransport, ReqwestFetcher,
};
pub use logging::{LogCategory, LogLevel, LogRecord, LogSink, MemorySink, NullSink, PluginLogger};
pub use manager::{Delivery, PluginManager};
pub use permissions::{Permission, PermissionSet, PermissionTier};
pub use policy::{PolicyConfig, PolicyEngine, PolicyMode};
pub use registry::{CapabilityRegistry, InstallReport};
pub use sandbox::{Dispatch, RuntimeMetrics, RuntimeState, SandboxLimits, SandboxRuntime};
