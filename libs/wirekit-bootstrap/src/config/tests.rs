use super::*;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;
use wirekit::{ConfigProvider, ConfigProviderExt};

#[test]
fn test_default_config() {
    let config = AppConfig::default();

    let default_section = &config.logging["default"];
    assert_eq!(default_section.console_level, "info");
    assert!(default_section.file.is_empty());

    assert_eq!(config.container.shutdown, DrainPolicy::default());
}

#[test]
fn test_layered_loading_yaml_only() {
    let tmp = tempdir().expect("Failed to create temp dir");
    let cfg_path = tmp.path().join("app.yaml");
    fs::write(
        &cfg_path,
        r#"
container:
  shutdown:
    interval: 250ms
    max_attempts: 4

services:
  greeter:
    greeting: "hello"
"#,
    )
    .unwrap();

    let loaded = load_layered(&[&cfg_path]).unwrap();

    let shutdown = &loaded.app.container.shutdown;
    assert_eq!(shutdown.interval, Duration::from_millis(250));
    assert_eq!(shutdown.max_attempts, 4);
    assert_eq!(shutdown.warn_after, DrainPolicy::default().warn_after);

    // component sections stay untyped and reachable by path
    let accessor = loaded.accessor();
    assert_eq!(accessor.string_val("services.greeter.greeting").unwrap(), "hello");
    assert_eq!(loaded.sources, vec![cfg_path]);
}

#[test]
fn test_later_files_override_earlier_ones() {
    let tmp = tempdir().unwrap();
    let base = tmp.path().join("base.json");
    let local = tmp.path().join("local.yaml");
    fs::write(
        &base,
        r#"{ "services": { "ticker": { "period": 10, "label": "base" } }, "facilities": { "ApplicationLogging": true } }"#,
    )
    .unwrap();
    fs::write(
        &local,
        r#"
services:
  ticker:
    period: 2
"#,
    )
    .unwrap();

    let loaded = load_layered(&[&base, &local]).unwrap();
    let accessor = loaded.accessor();

    assert_eq!(accessor.int_val("services.ticker.period").unwrap(), 2);
    assert_eq!(accessor.string_val("services.ticker.label").unwrap(), "base");
    assert!(accessor.bool_val("facilities.ApplicationLogging").unwrap());
}

#[test]
fn test_directories_expand_in_name_order() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("conf.d");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("20-override.yml"), "value: second\n").unwrap();
    fs::write(dir.join("10-base.yaml"), "value: first\nonly_base: true\n").unwrap();
    fs::write(dir.join("README.md"), "not config").unwrap();

    let files = expand_config_paths(&[&dir]).unwrap();
    let names = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["10-base.yaml", "20-override.yml"]);

    let loaded = load_layered(&[&dir]).unwrap();
    let accessor = loaded.accessor();
    assert_eq!(accessor.string_val("value").unwrap(), "second");
    assert!(accessor.bool_val("only_base").unwrap());
}

#[test]
fn test_missing_path_is_an_error() {
    let tmp = tempdir().unwrap();
    let err = load_layered(&[tmp.path().join("absent.yaml")]).unwrap_err();
    assert!(err.to_string().contains("absent.yaml"), "{err}");
}

#[test]
fn test_unknown_extension_is_rejected() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("app.toml");
    fs::write(&path, "value = 1").unwrap();

    let err = expand_config_paths(&[&path]).unwrap_err();
    assert!(err.to_string().contains("extensions"), "{err}");
}

#[test]
fn test_invalid_shutdown_section_fails_extraction() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("bad.yaml");
    fs::write(
        &path,
        r#"
container:
  shutdown:
    max_attempt: 3
"#,
    )
    .unwrap();

    assert!(load_layered(&[&path]).is_err());
}

#[test]
fn test_env_overrides_files() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("app.yaml");
    fs::write(&path, "bootstraptestenv:\n  label: from-file\n").unwrap();

    std::env::set_var("APP__BOOTSTRAPTESTENV__LABEL", "from-env");
    let loaded = load_layered(&[&path]);
    std::env::remove_var("APP__BOOTSTRAPTESTENV__LABEL");

    let accessor = loaded.unwrap().accessor();
    assert_eq!(accessor.string_val("bootstraptestenv.label").unwrap(), "from-env");
}

#[test]
fn test_cli_overrides() {
    let mut config = AppConfig::default();
    let args = CliArgs {
        log_level: Some("warn".to_owned()),
        ..CliArgs::default()
    };
    config.apply_cli_overrides(&args);
    assert_eq!(config.logging["default"].console_level, "warn");
}

#[test]
fn test_cli_verbose_levels_matrix() {
    for (verbose, expected) in [(0, "info"), (1, "debug"), (2, "trace"), (3, "trace")] {
        let mut config = AppConfig::default();
        let args = CliArgs {
            verbose,
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.logging["default"].console_level, expected);
    }
}

#[test]
fn test_print_config_yaml() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("app.yaml");
    fs::write(&path, "services:\n  greeter:\n    greeting: hi\n").unwrap();

    let loaded = load_layered(&[&path]).unwrap();
    let yaml = loaded.to_yaml().unwrap();
    assert!(yaml.contains("services:"));
    assert!(yaml.contains("logging:"));
    assert!(yaml.contains("container:"));

    let roundtrip: serde_json::Value = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(ConfigAccessor::new(roundtrip).value("services.greeter.greeting"), Some(&serde_json::json!("hi")));
}
