use arbiter::{Config, ConfigError, LanguageRegistry};

use super::FIXTURES_PATH;

fn fixture(name: &str) -> String {
    format!("{FIXTURES_PATH}/configs/{name}")
}

#[test]
fn test_load_valid_config() {
    let config = Config::from_file(fixture("valid_full.toml")).expect("Failed to load config");

    assert!(config.languages.contains_key("cpp"));
    assert!(config.languages.contains_key("python"));
    assert_eq!(config.default_limits.cpu_time, Some(1.0));
    assert_eq!(config.pool.first_box_id, 500);
    assert_eq!(config.pool.max_sandboxes, 2);

    let registry = LanguageRegistry::from_config(&config);
    let cpp = registry.resolve("cpp").unwrap();
    assert!(cpp.is_compiled());
    assert_eq!(cpp.limits.memory, Some(131072));
}

#[test]
fn test_load_minimal_config() {
    let config =
        Config::from_file(fixture("valid_minimal.toml")).expect("Failed to load config");

    assert!(config.languages.contains_key("test"));
    assert!(config.default_limits.wall_time.is_some());
}

#[test]
fn test_load_invalid_empty_name() {
    let result = Config::from_file(fixture("invalid_empty_name.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_empty_extension() {
    let result = Config::from_file(fixture("invalid_empty_extension.toml"));
    assert!(result.is_err());
}

#[test]
fn test_load_invalid_empty_run_command() {
    let result = Config::from_file(fixture("invalid_empty_run_command.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_missing_placeholder() {
    let result = Config::from_file(fixture("invalid_no_placeholder.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_missing_file() {
    let result = Config::from_file(fixture("does_not_exist.toml"));
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}
