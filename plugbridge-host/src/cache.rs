//! Plugin-scoped key/value cache shared by both surfaces of a plugin.
//!
//! Entries live for the whole session. There is no TTL and no eviction;
//! the optional per-plugin bound refuses new keys instead.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum distinct keys per plugin. `None` means unbounded.
    #[serde(default)]
    pub max_entries_per_plugin: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("cache is full ({limit} entries)")]
    Full { limit: usize },
}

/// Session-wide cache, keyed by plugin id then entry key.
#[derive(Debug, Clone, Default)]
pub struct PluginCache {
    entries: Rc<RefCell<HashMap<String, HashMap<String, String>>>>,
    config: CacheConfig,
}

impl PluginCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Rc::default(),
            config,
        }
    }

    /// A handle restricted to one plugin's entries.
    pub fn view(&self, plugin_id: &str) -> CacheView {
        CacheView {
            plugin_id: Rc::from(plugin_id),
            cache: self.clone(),
        }
    }

    pub fn entry_count(&self, plugin_id: &str) -> usize {
        self.entries.borrow().get(plugin_id).map_or(0, HashMap::len)
    }

    /// Drops every entry of one plugin.
    pub fn clear(&self, plugin_id: &str) {
        self.entries.borrow_mut().remove(plugin_id);
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

/// Plugin-scoped access to the [`PluginCache`].
///
/// Every operation finishes inside a single borrow, so a re-entrant call
/// from another surface's runtime never observes a partial update.
#[derive(Debug, Clone)]
pub struct CacheView {
    plugin_id: Rc<str>,
    cache: PluginCache,
}

impl CacheView {
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.cache
            .entries
            .borrow()
            .get(&*self.plugin_id)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    /// Stores a value. Overwriting an existing key always succeeds.
    pub fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut all = self.cache.entries.borrow_mut();
        let entries = all.entry(self.plugin_id.to_string()).or_default();
        if let Some(limit) = self.cache.config.max_entries_per_plugin {
            if !entries.contains_key(key) && entries.len() >= limit {
                return Err(CacheError::Full { limit });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Returns whether the key was present.
    pub fn remove(&self, key: &str) -> bool {
        self.cache
            .entries
            .borrow_mut()
            .get_mut(&*self.plugin_id)
            .is_some_and(|entries| entries.remove(key).is_some())
    }

    pub fn len(&self) -> usize {
        self.cache.entry_count(&self.plugin_id)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let cache = PluginCache::default();
        let view = cache.view("acme.quiz");
        view.set("k", "v").unwrap();
        assert_eq!(view.get("k").as_deref(), Some("v"));
        assert!(view.remove("k"));
        assert_eq!(view.get("k"), None);
        assert!(!view.remove("k"));
    }

    #[test]
    fn views_are_scoped_by_plugin() {
        let cache = PluginCache::default();
        cache.view("acme.quiz").set("k", "quiz").unwrap();
        cache.view("acme.clock").set("k", "clock").unwrap();

        assert_eq!(cache.view("acme.quiz").get("k").as_deref(), Some("quiz"));
        assert_eq!(cache.view("acme.clock").get("k").as_deref(), Some("clock"));
    }

    #[test]
    fn two_views_of_one_plugin_share_entries() {
        let cache = PluginCache::default();
        let editor = cache.view("acme.quiz");
        let player = cache.view("acme.quiz");
        editor.set("score", "10").unwrap();
        assert_eq!(player.get("score").as_deref(), Some("10"));
    }

    #[test]
    fn bound_refuses_new_keys_but_allows_overwrite() {
        let cache = PluginCache::new(CacheConfig {
            max_entries_per_plugin: Some(2),
        });
        let view = cache.view("acme.quiz");
        view.set("a", "1").unwrap();
        view.set("b", "2").unwrap();

        assert_eq!(view.set("c", "3"), Err(CacheError::Full { limit: 2 }));
        view.set("a", "updated").unwrap();

        assert_eq!(view.len(), 2);
        assert_eq!(view.get("a").as_deref(), Some("updated"));
        assert_eq!(view.get("c"), None);
    }

    #[test]
    fn clear_drops_one_plugin_only() {
        let cache = PluginCache::default();
        cache.view("acme.quiz").set("k", "v").unwrap();
        cache.view("acme.clock").set("k", "v").unwrap();
        cache.clear("acme.quiz");
        assert_eq!(cache.entry_count("acme.quiz"), 0);
        assert_eq!(cache.entry_count("acme.clock"), 1);
    }
}
