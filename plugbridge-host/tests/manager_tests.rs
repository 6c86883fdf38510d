//! Install, uninstall, policy and custom block registration.

mod common;

use common::{Harness, PLUGIN_ID, StaticFetcher, manifest};
use plugbridge_host::*;
use plugbridge_types::{CustomBlockDeclaration, CustomBlockDescriptor, Surface};
use pretty_assertions::assert_eq;
use serde_json::json;

fn quiz_block() -> CustomBlockDeclaration {
    CustomBlockDeclaration {
        id: "quiz-question".into(),
        name: "Quiz question".into(),
        icon: None,
    }
}

// ================================================================
// Install / uninstall
// ================================================================

#[test]
fn install_is_lazy_about_runtimes() {
    let mut h = Harness::new();
    let context = h.install(Some("api.log('loaded')"), Some("api.log('loaded')"));

    assert!(h.manager.is_installed(PLUGIN_ID));
    assert!(context.existing_runtime(Surface::Editor).is_none());
    assert!(h.plugin_lines().is_empty());

    EditorPluginBlock::new("b1", PLUGIN_ID).render(&h.manager);
    assert_eq!(h.plugin_lines(), vec!["loaded"]);
    assert!(context.existing_runtime(Surface::Player).is_none());
}

#[test]
fn duplicate_install_is_rejected() {
    let mut h = Harness::new();
    h.install(Some(""), None);

    let err = h.manager.install(manifest(None, None)).unwrap_err();
    assert!(matches!(err, BridgeError::PluginAlreadyInstalled(id) if id == PLUGIN_ID));
    assert_eq!(h.manager.plugin_count(), 1);
}

#[test]
fn invalid_manifest_is_rejected() {
    let mut h = Harness::new();
    let mut m = manifest(None, None);
    m.id = "noreversedomain".into();

    assert!(matches!(
        h.manager.install(m),
        Err(BridgeError::InvalidManifest(_))
    ));
    assert_eq!(h.manager.plugin_count(), 0);
}

#[test]
fn uninstall_of_unknown_plugin_fails() {
    let mut h = Harness::new();
    assert!(matches!(
        h.manager.uninstall("ghost.plugin"),
        Err(BridgeError::PluginNotFound(_))
    ));
}

#[test]
fn uninstall_tears_down_live_runtimes() {
    let mut h = Harness::new();
    let context = h.install(Some(r#"api.on("block-render", function() return "x" end)"#), None);
    let runtime = context.runtime(Surface::Editor).unwrap();

    h.manager.uninstall(PLUGIN_ID).unwrap();

    assert_eq!(runtime.state(), RuntimeState::TornDown);
    assert!(!context.is_alive());
    assert!(context.runtime(Surface::Editor).is_err());
    assert_eq!(EditorPluginBlock::new("b1", PLUGIN_ID).render(&h.manager), "");
}

#[test]
fn unknown_permissions_are_ignored_with_a_warning() {
    let mut h = Harness::new();
    let mut m = manifest(None, None);
    m.permissions = vec!["teleport".into(), "network".into()];
    let context = h.install_manifest(m);

    assert!(context.permissions().is_granted(Permission::Network));
    assert!(
        h.messages(LogCategory::Lifecycle)
            .iter()
            .any(|m| m.contains("teleport"))
    );
}

// ================================================================
// Policy
// ================================================================

#[test]
fn allowlist_policy_blocks_unlisted_plugins() {
    let config = HostConfig::from_toml_str(
        r#"
        [policy]
        mode = "allowlist"
        plugin-ids = ["acme.clock"]
        "#,
    )
    .unwrap();
    let mut h = Harness::with_config(config, StaticFetcher::default());

    let err = h.manager.install(manifest(None, None)).unwrap_err();
    assert!(matches!(err, BridgeError::PolicyDenied(_)));

    let mut clock = manifest(None, None);
    clock.id = "acme.clock".into();
    assert!(h.manager.install(clock).is_ok());
}

#[test]
fn denylist_policy_blocks_listed_plugins() {
    let config = HostConfig::from_toml_str(
        r#"
        [policy]
        mode = "denylist"
        plugin-ids = ["acme.quiz"]
        "#,
    )
    .unwrap();
    let mut h = Harness::with_config(config, StaticFetcher::default());

    assert!(matches!(
        h.manager.install(manifest(None, None)),
        Err(BridgeError::PolicyDenied(_))
    ));
}

// ================================================================
// Custom blocks
// ================================================================

#[test]
fn manifest_custom_blocks_are_registered_and_removed() {
    let mut h = Harness::new();
    let mut m = manifest(None, None);
    m.custom_blocks = vec![quiz_block()];
    h.install_manifest(m);

    assert_eq!(
        h.manager.custom_blocks(),
        vec![CustomBlockDescriptor {
            id: "quiz-question".into(),
            name: "Quiz question".into(),
            icon: None,
            plugin_id: PLUGIN_ID.into(),
        }]
    );

    h.manager.uninstall(PLUGIN_ID).unwrap();
    assert!(h.manager.custom_blocks().is_empty());
}

#[test]
fn conflicting_custom_block_aborts_install() {
    let mut h = Harness::new();
    let mut m = manifest(None, None);
    m.custom_blocks = vec![quiz_block()];
    h.install_manifest(m);

    let mut rival = manifest(None, None);
    rival.id = "acme.rival".into();
    rival.custom_blocks = vec![
        CustomBlockDeclaration {
            id: "rival-only".into(),
            name: "Rival".into(),
            icon: None,
        },
        quiz_block(),
    ];

    let err = h.manager.install(rival).unwrap_err();
    assert!(matches!(
        err,
        BridgeError::CustomBlockConflict { ref owner, .. } if owner == PLUGIN_ID
    ));
    assert!(!h.manager.is_installed("acme.rival"));
    let ids: Vec<String> = h.manager.custom_blocks().into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["quiz-question"]);
}

#[test]
fn plugins_can_register_blocks_at_runtime() {
    let mut h = Harness::new();
    let m = manifest(
        Some(
            r#"
            api.on("panel-registered", function()
                api.log(tostring(api.register_block({ id = "timer", name = "Timer" })))
                api.log(tostring(api.register_block({ id = "", name = "Nameless" })))
            end)
            "#,
        ),
        None,
    );
    h.install_manifest(m);

    h.manager.process_panel_registered(PLUGIN_ID);

    assert_eq!(h.plugin_lines(), vec!["true", "nil"]);
    assert_eq!(h.count(LogCategory::Capability), 1);
    let ids: Vec<String> = h.manager.custom_blocks().into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["timer"]);
}

#[test]
fn host_registration_requires_an_installed_plugin() {
    let h = Harness::new();
    let err = h
        .manager
        .register_custom_block(CustomBlockDescriptor {
            id: "timer".into(),
            name: "Timer".into(),
            icon: None,
            plugin_id: "ghost.plugin".into(),
        })
        .unwrap_err();
    assert!(matches!(err, BridgeError::PluginNotFound(_)));
}

// ================================================================
// Identity and metrics
// ================================================================

#[test]
fn identity_properties_describe_the_plugin() {
    let mut h = Harness::new();
    h.install(
        None,
        Some(
            r#"
            api.on("block-message", function()
                api.log(api.plugin_id, api.surface, tostring(api.null ~= nil))
            end)
            "#,
        ),
    );

    PlayerPluginBlock::new("b1", PLUGIN_ID).process_message(&h.manager, &json!(null));
    assert_eq!(h.plugin_lines(), vec!["acme.quiz player true"]);
}

#[test]
fn metrics_are_reported_for_live_runtimes() {
    let mut h = Harness::new();
    h.install(Some(r#"api.on("block-render", function() return "ok" end)"#), None);

    assert_eq!(h.manager.metrics(PLUGIN_ID, Surface::Editor), None);
    EditorPluginBlock::new("b1", PLUGIN_ID).render(&h.manager);

    let metrics = h.manager.metrics(PLUGIN_ID, Surface::Editor).unwrap();
    assert_eq!(metrics.invocations, 1);
    assert_eq!(metrics.faults, 0);
    assert!(metrics.memory_used_bytes > 0);
}
