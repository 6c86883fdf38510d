//! Plugin-scoped diagnostics.
//!
//! Every capability and dispatch failure is written through a
//! [`PluginLogger`], which emits a `tracing` event tagged with the plugin's
//! id and name and forwards a structured [`LogRecord`] to the host's
//! [`LogSink`]. The sink is the only diagnostics side channel plugins have.

use chrono::{DateTime, Utc};
use plugbridge_types::Surface;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Which part of the error taxonomy a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    /// Written by plugin code through `api.log` and friends.
    Plugin,
    /// Source failed to parse or evaluate on a surface.
    Load,
    /// Plugin passed bad arguments to a host capability.
    Capability,
    /// Plugin broke the registration contract (unknown event kind).
    Protocol,
    /// Plugin code threw or exhausted its budget during an invoke.
    Runtime,
    /// Plugin, runtime, block or callback lookup failed.
    Resolution,
    /// Host-side lifecycle notes (install, permissions, teardown).
    Lifecycle,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plugin => "plugin",
            Self::Load => "load",
            Self::Capability => "capability",
            Self::Protocol => "protocol",
            Self::Runtime => "runtime",
            Self::Resolution => "resolution",
            Self::Lifecycle => "lifecycle",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub at: DateTime<Utc>,
    pub plugin_id: String,
    pub plugin_name: String,
    pub surface: Option<Surface>,
    pub level: LogLevel,
    pub category: LogCategory,
    pub message: String,
}

/// Receives plugin log records (host console, audit trail, test capture).
pub trait LogSink {
    fn record(&self, record: LogRecord);
}

/// Discards records; `tracing` output is still emitted by the logger.
#[derive(Debug, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn record(&self, _record: LogRecord) {}
}

/// Keeps the most recent records in memory, oldest dropped first.
#[derive(Debug)]
pub struct MemorySink {
    capacity: usize,
    records: RefCell<VecDeque<LogRecord>>,
}

impl MemorySink {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: RefCell::new(VecDeque::new()),
        }
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.borrow().iter().cloned().collect()
    }

    pub fn records_for(&self, plugin_id: &str) -> Vec<LogRecord> {
        self.records
            .borrow()
            .iter()
            .filter(|r| r.plugin_id == plugin_id)
            .cloned()
            .collect()
    }

    pub fn count(&self, category: LogCategory) -> usize {
        self.records
            .borrow()
            .iter()
            .filter(|r| r.category == category)
            .count()
    }

    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for MemorySink {
    fn record(&self, record: LogRecord) {
        let mut records = self.records.borrow_mut();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }
}

/// Logging handle bound to one plugin (and optionally one surface).
#[derive(Clone)]
pub struct PluginLogger {
    plugin_id: Rc<str>,
    plugin_name: Rc<str>,
    surface: Option<Surface>,
    sink: Rc<dyn LogSink>,
}

impl PluginLogger {
    pub fn new(plugin_id: &str, plugin_name: &str, sink: Rc<dyn LogSink>) -> Self {
        Self {
            plugin_id: Rc::from(plugin_id),
            plugin_name: Rc::from(plugin_name),
            surface: None,
            sink,
        }
    }

    pub fn for_surface(&self, surface: Surface) -> Self {
        Self {
            surface: Some(surface),
            ..self.clone()
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn surface(&self) -> Option<Surface> {
        self.surface
    }

    pub fn log(&self, level: LogLevel, category: LogCategory, message: impl Into<String>) {
        let message = message.into();
        let surface = self.surface.map(|s| s.as_str()).unwrap_or("-");
        match level {
            LogLevel::Debug => debug!(
                plugin_id = %self.plugin_id, plugin_name = %self.plugin_name,
                surface, category = %category, "{}", message
            ),
            LogLevel::Info => info!(
                plugin_id = %self.plugin_id, plugin_name = %self.plugin_name,
                surface, category = %category, "{}", message
            ),
            LogLevel::Warn => warn!(
                plugin_id = %self.plugin_id, plugin_name = %self.plugin_name,
                surface, category = %category, "{}", message
            ),
            LogLevel::Error => error!(
                plugin_id = %self.plugin_id, plugin_name = %self.plugin_name,
                surface, category = %category, "{}", message
            ),
        }
        self.sink.record(LogRecord {
            at: Utc::now(),
            plugin_id: self.plugin_id.to_string(),
            plugin_name: self.plugin_name.to_string(),
            surface: self.surface,
            level,
            category,
            message,
        });
    }

    pub fn load(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, LogCategory::Load, message);
    }

    pub fn capability(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, LogCategory::Capability, message);
    }

    pub fn protocol(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, LogCategory::Protocol, message);
    }

    pub fn runtime(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, LogCategory::Runtime, message);
    }

    pub fn resolution(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, LogCategory::Resolution, message);
    }

    pub fn lifecycle(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, LogCategory::Lifecycle, message);
    }
}

impl fmt::Debug for PluginLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginLogger")
            .field("plugin_id", &self.plugin_id)
            .field("surface", &self.surface)
            .finish()
    }
}
