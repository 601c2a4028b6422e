use super::ParForConfig;
use figment::{
    Figment,
    providers::{Format, Toml},
};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_embedded_defaults_match_struct_defaults() {
    let config: ParForConfig = Figment::new()
        .merge(Toml::string(include_str!("../../default-config.toml")))
        .extract()
        .unwrap();
    assert_eq!(config, ParForConfig::default());
    config.validate().unwrap();
}

#[test]
fn test_custom_toml_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.toml");
    fs::write(&path, "[run]\ncheck_interval = 3\n\n[pool]\nthreads = 5\n").unwrap();

    let config = ParForConfig::load_with_custom_config(Some(&path)).unwrap();
    assert_eq!(config.run.check_interval, 3);
    assert_eq!(config.pool.threads, 5);
    assert_eq!(config.pool_capacity(), 5);
    // Untouched keys keep their defaults
    assert_eq!(config.run.oversubscription, 1.5);
}

#[test]
fn test_custom_json_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.json");
    fs::write(&path, r#"{ "run": { "max_workers": 2 } }"#).unwrap();

    let config = ParForConfig::load_with_custom_config(Some(&path)).unwrap();
    assert_eq!(config.run.max_workers, 2);
    assert!(config.default_workers() <= 2);
}

#[test]
fn test_missing_custom_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let result = ParForConfig::load_with_custom_config(Some(&dir.path().join("absent.toml")));
    assert!(result.is_err());
}

#[test]
fn test_invalid_values_are_rejected() {
    let mut config = ParForConfig::default();
    config.run.check_interval = 0;
    assert!(config.validate().is_err());

    let mut config = ParForConfig::default();
    config.pool.thread_percentage = 0;
    assert!(config.validate().is_err());

    let mut config = ParForConfig::default();
    config.run.oversubscription = f64::NAN;
    assert!(config.validate().is_err());

    let mut config = ParForConfig::default();
    config.progress.fast_update_ms = 5000;
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_file_fails_validation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[progress]\nfast_update_ms = 9000\n").unwrap();

    let err = ParForConfig::load_with_custom_config(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("fast_update_ms"));
}

#[test]
fn test_serialization_round_trips_through_figment() {
    let config = ParForConfig::default();
    let toml = config.to_toml().unwrap();
    assert!(toml.contains("check_interval = 8"));

    let json = config.to_json().unwrap();
    assert!(json.contains("\"oversubscription\": 1.5"));
}

#[test]
fn test_cadence_from_progress_settings() {
    let cadence = ParForConfig::default().cadence();
    assert_eq!(cadence.fast.as_millis(), 500);
    assert_eq!(cadence.slow.as_millis(), 3000);
}
