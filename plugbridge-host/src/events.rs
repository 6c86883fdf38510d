//! Per-runtime table of event kinds to plugin-registered handlers.

use plugbridge_types::{EventKind, Surface};
use std::collections::HashMap;

/// Registrations accumulate; there is no unregister.
///
/// Generic over the handle type so the registry itself never touches the
/// engine. The runtime stores `mlua::Function` handles in it.
#[derive(Debug)]
pub struct EventRegistry<H> {
    surface: Surface,
    handlers: HashMap<EventKind, Vec<H>>,
}

impl<H: Clone> EventRegistry<H> {
    pub fn new(surface: Surface) -> Self {
        Self {
            surface,
            handlers: HashMap::new(),
        }
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    /// Adds a handler for a plugin-supplied kind name.
    ///
    /// Names outside this surface's vocabulary are rejected and nothing is
    /// stored.
    pub fn register(&mut self, name: &str, handler: H) -> Result<EventKind, plugbridge_types::Error> {
        let kind = EventKind::resolve(self.surface, name)?;
        self.handlers.entry(kind).or_default().push(handler);
        Ok(kind)
    }

    /// Snapshot of the handlers for `kind`, in registration order.
    pub fn handlers(&self, kind: EventKind) -> Vec<H> {
        self.handlers.get(&kind).cloned().unwrap_or_default()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    pub fn total(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}
