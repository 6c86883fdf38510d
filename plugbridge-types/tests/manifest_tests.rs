use plugbridge_types::{CustomBlockDescriptor, PluginManifest, Surface};
use pretty_assertions::assert_eq;

const QUIZ_TOML: &str = r#"
id = "acme.quiz"
name = "Quiz"
version = "1.2.0"
icon = "help-circle"
allowed_origins = ["https://quiz.acme.dev"]
permissions = ["network"]
editor_source = "api.on('block-render', function(b) return '<p>edit</p>' end)"
player_source = "api.on('block-render', function(b) return '<p>play</p>' end)"

[[custom_blocks]]
id = "acme.quiz.question"
name = "Question"
icon = "circle-help"
"#;

#[test]
fn parse_toml_manifest() {
    let manifest = PluginManifest::from_toml_str(QUIZ_TOML).unwrap();
    assert_eq!(manifest.id, "acme.quiz");
    assert_eq!(manifest.icon.as_deref(), Some("help-circle"));
    assert_eq!(manifest.permissions, vec!["network".to_string()]);
    assert!(manifest.source(Surface::Editor).unwrap().contains("edit"));
    assert!(manifest.source(Surface::Player).unwrap().contains("play"));
}

#[test]
fn parse_json_manifest_with_defaults() {
    let manifest = PluginManifest::from_json_str(
        r#"{"id": "acme.clock", "name": "Clock", "version": "0.1.0"}"#,
    )
    .unwrap();
    assert!(manifest.allowed_origins.is_empty());
    assert!(manifest.custom_blocks.is_empty());
    assert!(manifest.source(Surface::Editor).is_none());
    assert!(manifest.source(Surface::Player).is_none());
}

#[test]
fn invalid_origin_is_rejected() {
    let err = PluginManifest::from_json_str(
        r#"{"id": "acme.clock", "name": "Clock", "version": "0.1.0",
            "allowed_origins": ["https://clock.acme.dev/embed"]}"#,
    );
    assert!(err.is_err());
}

#[test]
fn missing_version_is_rejected() {
    let err = PluginManifest::from_json_str(r#"{"id": "acme.clock", "name": "Clock", "version": ""}"#);
    assert!(err.is_err());
}

#[test]
fn custom_block_descriptors_carry_plugin_id() {
    let manifest = PluginManifest::from_toml_str(QUIZ_TOML).unwrap();
    assert_eq!(
        manifest.custom_block_descriptors(),
        vec![CustomBlockDescriptor {
            id: "acme.quiz.question".into(),
            name: "Question".into(),
            icon: Some("circle-help".into()),
            plugin_id: "acme.quiz".into(),
        }]
    );
}

#[test]
fn allows_origin_ignores_trailing_slash_and_case() {
    let manifest = PluginManifest::from_toml_str(QUIZ_TOML).unwrap();
    assert!(manifest.allows_origin("https://quiz.acme.dev"));
    assert!(manifest.allows_origin("https://QUIZ.acme.dev/"));
    assert!(!manifest.allows_origin("https://evil.dev"));
    assert!(!manifest.allows_origin("http://quiz.acme.dev"));
}
