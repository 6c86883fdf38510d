//! Error types for the plugin host.
//!
//! Only [`BridgeError`] ever reaches host callers. The other enums describe
//! failures that are contained at the sandbox boundary: they are logged to
//! the plugin's sink and surfaced to the host as neutral results.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    #[error("plugin already installed: {0}")]
    PluginAlreadyInstalled(String),

    #[error("policy denied: {0}")]
    PolicyDenied(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(#[from] plugbridge_types::Error),

    #[error("custom block '{block_id}' is already registered by plugin '{owner}'")]
    CustomBlockConflict { block_id: String, owner: String },

    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("property rejected: {0}")]
    PropertyRejected(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Plugin source could not be brought up on a surface.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("sandbox setup failed: {0}")]
    Engine(String),

    #[error("runtime already failed: {0}")]
    AlreadyFailed(String),

    #[error("runtime has been torn down")]
    TornDown,
}

/// An `invoke` into plugin code did not complete normally.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("plugin error: {0}")]
    Thrown(String),

    #[error("step budget of {budget} instructions exhausted")]
    StepBudgetExceeded { budget: u64 },

    #[error("call exceeded {timeout_ms}ms deadline")]
    DeadlineExceeded { timeout_ms: u64 },

    #[error("marshaling failed: {0}")]
    Marshal(#[from] MarshalError),

    #[error("runtime unavailable: {0}")]
    Unavailable(String),
}

/// A value could not cross the sandbox boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarshalError {
    #[error("{0} values cannot cross the sandbox boundary")]
    UnsupportedType(&'static str),

    #[error("non-finite numbers cannot be represented")]
    NonFiniteNumber,

    #[error("integer {0} is outside the sandbox's 64-bit signed range")]
    NumberOutOfRange(String),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("unsupported table key: {0}")]
    UnsupportedKey(String),

    #[error("value nests deeper than {0} levels")]
    TooDeep(usize),

    #[error("engine error: {0}")]
    Engine(String),
}

impl From<mlua::Error> for MarshalError {
    fn from(err: mlua::Error) -> Self {
        MarshalError::Engine(err.to_string())
    }
}

/// Innermost human-readable message of an engine error.
pub(crate) fn describe_lua_error(err: &mlua::Error) -> String {
    match err {
        mlua::Error::CallbackError { cause, .. } => describe_lua_error(cause),
        mlua::Error::RuntimeError(message) => message.clone(),
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::MemoryError(message) => format!("out of memory: {message}"),
        other => other.to_string(),
    }
}
