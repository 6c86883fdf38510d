//! Session store of plugin blocks, keyed by block id.
//!
//! The host editor or player owns block lifetimes and inserts blocks here;
//! the bridge and block-scoped capabilities only ever reach blocks through
//! this store, never through a handle captured by plugin code.

use plugbridge_types::PluginBlock;
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Default)]
pub struct BlockStore {
    blocks: Rc<RefCell<HashMap<String, PluginBlock>>>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a block.
    pub fn insert(&self, block: PluginBlock) {
        self.blocks.borrow_mut().insert(block.id.clone(), block);
    }

    pub fn remove(&self, block_id: &str) -> Option<PluginBlock> {
        self.blocks.borrow_mut().remove(block_id)
    }

    /// Snapshot of a block.
    pub fn get(&self, block_id: &str) -> Option<PluginBlock> {
        self.blocks.borrow().get(block_id).cloned()
    }

    pub fn contains(&self, block_id: &str) -> bool {
        self.blocks.borrow().contains_key(block_id)
    }

    /// Serialized plugin-facing view of a block.
    pub fn view(&self, block_id: &str) -> Option<JsonValue> {
        self.blocks
            .borrow()
            .get(block_id)
            .map(plugbridge_types::serialize_block)
    }

    pub fn owner(&self, block_id: &str) -> Option<String> {
        self.blocks.borrow().get(block_id).map(|b| b.plugin_id.clone())
    }

    /// Mutates one block in place. The closure must not call back into the
    /// store.
    pub fn update<R>(&self, block_id: &str, f: impl FnOnce(&mut PluginBlock) -> R) -> Option<R> {
        self.blocks.borrow_mut().get_mut(block_id).map(f)
    }

    pub fn ids_for_plugin(&self, plugin_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .blocks
            .borrow()
            .values()
            .filter(|b| b.plugin_id == plugin_id)
            .map(|b| b.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.blocks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_mutates_in_place() {
        let store = BlockStore::new();
        store.insert(PluginBlock::new("b1", "acme.quiz"));
        let old = store.update("b1", |b| std::mem::replace(&mut b.opacity, 0.5));
        assert_eq!(old, Some(1.0));
        assert_eq!(store.get("b1").map(|b| b.opacity), Some(0.5));
        assert_eq!(store.update("missing", |b| b.opacity), None);
    }

    #[test]
    fn ids_for_plugin_filters_and_sorts() {
        let store = BlockStore::new();
        store.insert(PluginBlock::new("b2", "acme.quiz"));
        store.insert(PluginBlock::new("b1", "acme.quiz"));
        store.insert(PluginBlock::new("c1", "acme.clock"));
        assert_eq!(store.ids_for_plugin("acme.quiz"), vec!["b1", "b2"]);
        assert_eq!(store.owner("c1").as_deref(), Some("acme.clock"));
    }
}
