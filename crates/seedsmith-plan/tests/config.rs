use std::path::Path;

use seedsmith_plan::{ItemCount, SeedConfig, Shape, config_json_schema, validate_config_json};

#[test]
fn loads_toml_fixture() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/seedsmith.toml");
    let config = SeedConfig::load(&path).expect("load config");

    assert_eq!(config.seed, "blog-demo");
    assert_eq!(config.select, vec!["!public._*"]);
    assert_eq!(config.options.max_unique_retries, 25);
    assert!(config.options.connect);
    assert!(!config.options.dry_run);

    let hints = config.hints();
    let full_name = hints.get("public.users", "full_name").expect("hint");
    assert_eq!(full_name.shape, Some(Shape::FullName));
    assert_eq!(
        full_name.description.as_deref(),
        Some("Display name of the account owner")
    );
    let payload = hints.get("public._audit_log", "payload").expect("hint");
    assert_eq!(payload.examples.len(), 2);
    assert_eq!(payload.item_count, Some(ItemCount::Range { min: 1, max: 3 }));
    assert!(hints.get("public.users", "email").is_none());
}

#[test]
fn loaded_config_passes_its_own_schema() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/seedsmith.toml");
    let config = SeedConfig::load(&path).expect("load config");
    let json = serde_json::to_value(&config).expect("serialize config");

    let report = validate_config_json(&json).expect("validate");
    assert!(report.is_ok(), "unexpected errors: {report}");

    let schema = serde_json::to_value(config_json_schema()).expect("schema json");
    assert!(schema.get("properties").is_some());
}

#[test]
fn missing_file_is_an_io_error() {
    let err = SeedConfig::load(Path::new("does-not-exist/seedsmith.yaml")).expect_err("missing file");
    assert!(err.to_string().contains("io error"));
}
