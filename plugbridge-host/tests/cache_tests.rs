//! Per-plugin key/value cache as seen from plugin code.

mod common;

use common::{Harness, PLUGIN_ID, StaticFetcher, manifest};
use plugbridge_host::*;
use plugbridge_types::Surface;
use pretty_assertions::assert_eq;
use serde_json::json;

const CACHE_PLUGIN: &str = r#"
api.on("block-message", function(view, msg)
    if msg.op == "set" then
        api.log("set=" .. tostring(api.cache.set(msg.key, msg.value)))
    elseif msg.op == "get" then
        api.log("get=" .. tostring(api.cache.get(msg.key)))
    elseif msg.op == "remove" then
        api.log("remove=" .. tostring(api.cache.remove(msg.key)))
    end
end)
"#;

fn op(h: &Harness, surface: Surface, payload: serde_json::Value) -> usize {
    match surface {
        Surface::Editor => EditorPluginBlock::new("b1", PLUGIN_ID).process_message(&h.manager, &payload),
        Surface::Player => PlayerPluginBlock::new("b1", PLUGIN_ID).process_message(&h.manager, &payload),
    }
}

#[test]
fn values_survive_across_invocations() {
    let mut h = Harness::new();
    h.install(Some(CACHE_PLUGIN), None);
    let editor = Surface::Editor;

    op(&h, editor, json!({"op": "get", "key": "score"}));
    op(&h, editor, json!({"op": "set", "key": "score", "value": "42"}));
    op(&h, editor, json!({"op": "get", "key": "score"}));

    assert_eq!(h.plugin_lines(), vec!["get=nil", "set=true", "get=42"]);
    assert_eq!(h.manager.cache_view(PLUGIN_ID).get("score"), Some("42".to_string()));
}

#[test]
fn remove_reports_whether_key_existed() {
    let mut h = Harness::new();
    h.install(Some(CACHE_PLUGIN), None);
    let editor = Surface::Editor;

    op(&h, editor, json!({"op": "set", "key": "k", "value": "v"}));
    op(&h, editor, json!({"op": "remove", "key": "k"}));
    op(&h, editor, json!({"op": "remove", "key": "k"}));
    op(&h, editor, json!({"op": "get", "key": "k"}));

    assert_eq!(
        h.plugin_lines(),
        vec!["set=true", "remove=true", "remove=false", "get=nil"]
    );
}

#[test]
fn surfaces_of_one_plugin_share_a_cache() {
    let mut h = Harness::new();
    h.install(Some(CACHE_PLUGIN), Some(CACHE_PLUGIN));

    op(&h, Surface::Editor, json!({"op": "set", "key": "theme", "value": "dark"}));
    op(&h, Surface::Player, json!({"op": "get", "key": "theme"}));

    assert_eq!(h.plugin_lines(), vec!["set=true", "get=dark"]);
}

#[test]
fn plugins_cannot_read_each_others_entries() {
    let mut h = Harness::new();
    h.install(Some(CACHE_PLUGIN), None);
    h.manager.cache_view("acme.clock").set("secret", "tick").unwrap();

    op(&h, Surface::Editor, json!({"op": "get", "key": "secret"}));
    assert_eq!(h.plugin_lines(), vec!["get=nil"]);
}

#[test]
fn non_string_values_are_misuse() {
    let mut h = Harness::new();
    h.install(Some(CACHE_PLUGIN), None);

    op(&h, Surface::Editor, json!({"op": "set", "key": "n", "value": 7}));

    assert_eq!(h.plugin_lines(), vec!["set=nil"]);
    assert_eq!(h.count(LogCategory::Capability), 1);
    assert_eq!(h.manager.cache().entry_count(PLUGIN_ID), 0);
}

#[test]
fn bounded_cache_refuses_new_keys_but_allows_overwrites() {
    let config = HostConfig {
        cache: CacheConfig {
            max_entries_per_plugin: Some(1),
        },
        ..HostConfig::default()
    };
    let mut h = Harness::with_config(config, StaticFetcher::default());
    h.install(Some(CACHE_PLUGIN), None);
    let editor = Surface::Editor;

    op(&h, editor, json!({"op": "set", "key": "a", "value": "1"}));
    op(&h, editor, json!({"op": "set", "key": "b", "value": "2"}));
    op(&h, editor, json!({"op": "set", "key": "a", "value": "3"}));
    op(&h, editor, json!({"op": "get", "key": "a"}));

    assert_eq!(h.plugin_lines(), vec!["set=true", "set=nil", "set=true", "get=3"]);
    assert_eq!(h.count(LogCategory::Capability), 1);
}

#[test]
fn entries_outlive_uninstall_for_the_session() {
    let mut h = Harness::new();
    h.install(Some(CACHE_PLUGIN), None);
    op(&h, Surface::Editor, json!({"op": "set", "key": "k", "value": "kept"}));

    h.manager.uninstall(PLUGIN_ID).unwrap();
    h.manager.install(manifest(Some(CACHE_PLUGIN), None)).unwrap();
    op(&h, Surface::Editor, json!({"op": "get", "key": "k"}));

    assert_eq!(h.plugin_lines(), vec!["set=true", "get=kept"]);
}
