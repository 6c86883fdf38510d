//! Block kinds contributed by plugins, listed by the block-creation UI.

use crate::error::BridgeError;
use plugbridge_types::CustomBlockDescriptor;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Default)]
pub struct CustomBlockRegistry {
    entries: Rc<RefCell<Vec<CustomBlockDescriptor>>>,
}

impl CustomBlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a block kind.
    ///
    /// Re-registering an id the same plugin already owns replaces the entry.
    /// An id owned by another plugin is refused.
    pub fn register(&self, descriptor: CustomBlockDescriptor) -> Result<(), BridgeError> {
        let mut entries = self.entries.borrow_mut();
        match entries.iter_mut().find(|e| e.id == descriptor.id) {
            Some(existing) if existing.plugin_id != descriptor.plugin_id => {
                Err(BridgeError::CustomBlockConflict {
                    block_id: descriptor.id,
                    owner: existing.plugin_id.clone(),
                })
            }
            Some(existing) => {
                *existing = descriptor;
                Ok(())
            }
            None => {
                entries.push(descriptor);
                Ok(())
            }
        }
    }

    pub fn get(&self, block_id: &str) -> Option<CustomBlockDescriptor> {
        self.entries.borrow().iter().find(|e| e.id == block_id).cloned()
    }

    /// All kinds, in registration order.
    pub fn list(&self) -> Vec<CustomBlockDescriptor> {
        self.entries.borrow().clone()
    }

    pub fn remove_plugin(&self, plugin_id: &str) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|e| e.plugin_id != plugin_id);
        before - entries.len()
    }
}
