use std::collections::HashMap;
use std::path::PathBuf;

use fdep_mcp::config::*;
use fdep_mcp::errors::FdepError;
use tempfile::TempDir;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_default_config_is_valid() {
    let config = ServerConfig::default();
    assert_eq!(config.db_path, PathBuf::from("fdep.db"));
    assert_eq!(config.max_results, 1000);
    assert_eq!(config.max_depth, 10);
    assert!(config.validate().is_empty());
}

#[test]
fn test_save_and_load_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conf").join(CONFIG_FILENAME);
    let config = ServerConfig {
        db_path: dir.path().join("code.db"),
        max_depth: 4,
        log_level: "debug".to_string(),
        ..Default::default()
    };
    save_config(&path, &config).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());

    let loaded = load_config(Some(&path)).unwrap();
    assert_eq!(loaded.max_depth, 4);
    assert_eq!(loaded.log_level, "debug");
}

#[test]
fn test_partial_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILENAME);
    std::fs::write(&path, "max_results = 50\n").unwrap();
    let loaded = load_config(Some(&path)).unwrap();
    assert_eq!(loaded.max_results, 50);
    assert_eq!(loaded.max_response_chars, 15_000);
}

#[test]
fn test_explicit_missing_file_is_error() {
    let dir = TempDir::new().unwrap();
    let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
    assert!(matches!(err, FdepError::Config { .. }));
}

#[test]
fn test_malformed_file_is_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILENAME);
    std::fs::write(&path, "max_results = \"lots\"\n").unwrap();
    assert!(load_config(Some(&path)).is_err());
}

#[test]
fn test_env_overrides() {
    let mut config = ServerConfig::default();
    apply_env_overrides(
        &mut config,
        env(&[
            ("FDEP_DB_PATH", "/data/fdep.db"),
            ("LOG_LEVEL", "WARN"),
            ("DEV_MODE", "True"),
            ("FDEP_MAX_RESULTS", "250"),
        ]),
    )
    .unwrap();
    assert_eq!(config.db_path, PathBuf::from("/data/fdep.db"));
    assert_eq!(config.log_level, "warn");
    assert!(config.dev_mode);
    assert_eq!(config.max_results, 250);
    assert_eq!(config.max_depth, 10);
}

#[test]
fn test_env_override_rejects_bad_number() {
    let mut config = ServerConfig::default();
    let err = apply_env_overrides(&mut config, env(&[("FDEP_MAX_DEPTH", "deep")])).unwrap_err();
    assert!(err.to_string().contains("FDEP_MAX_DEPTH"));
}

#[test]
fn test_validate_reports_every_problem() {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig {
        fdep_path: Some(dir.path().join("missing")),
        log_level: "loud".to_string(),
        max_results: 0,
        ..Default::default()
    };
    let problems = config.validate();
    assert_eq!(problems.len(), 3);
    assert!(problems.iter().any(|p| p.contains("FDEP_PATH does not exist")));
    assert!(problems.iter().any(|p| p.contains("invalid log level 'loud'")));
}
