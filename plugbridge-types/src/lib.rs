//! Core type definitions for plugbridge.
//!
//! This crate defines the host-agnostic data model shared by the sandbox
//! host and anything that persists or displays plugin-backed content:
//! - Plugin manifests and custom block declarations
//! - Surfaces (editor / player) and their closed event vocabularies
//! - Plugin blocks, their opaque data bag and typed UI properties
//! - Realtime messages exchanged between participants' plugin blocks
//!
//! Nothing in here touches a script engine; the host crate owns that.

mod block;
mod manifest;
mod property;
mod remote;
mod surface;

pub use block::{BLOCK_VIEW_FIELDS, PluginBlock, Position, serialize_block};
pub use manifest::{CustomBlockDeclaration, CustomBlockDescriptor, PluginManifest};
pub use property::{BlockProperty, PropertyKind, SelectOption};
pub use remote::RemoteMessage;
pub use surface::{EventKind, Surface};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or validating plugbridge types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("manifest TOML error: {0}")]
    ManifestToml(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown event kind '{0}'")]
    UnknownEventKind(String),

    #[error("event kind '{kind}' is not available on the {surface} surface")]
    EventKindNotOnSurface { kind: String, surface: Surface },

    #[error("unknown surface '{0}'")]
    UnknownSurface(String),

    #[error("invalid property '{key}': {reason}")]
    InvalidProperty { key: String, reason: String },

    #[error("block has no property '{0}'")]
    UnknownProperty(String),
}
