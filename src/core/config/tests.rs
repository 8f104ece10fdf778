use super::data::{path_display, Config};
use super::io::ConfigError;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn missing_file_loads_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config = Config::load_from_path(&temp_dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.greeting(), "How can I help you today?");
    assert_eq!(config.stream_buffer(), 32);
    assert_eq!(config.request_timeout(), Duration::from_secs(120));
    assert_eq!(config.max_tokens(), 1024);
}

#[test]
fn save_creates_directories_and_reloads() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.set_value("greeting", "Hi!").unwrap();
    config
        .set_value("base-url.Deepseek", "http://localhost:9000/v1")
        .unwrap();
    config.save_to_path(&config_path).expect("save failed");

    let loaded = Config::load_from_path(&config_path).expect("load failed");
    assert_eq!(loaded, config);
    assert_eq!(loaded.greeting(), "Hi!");
}

#[test]
fn saving_leaves_no_temp_files_behind() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    Config::default().save_to_path(&config_path).unwrap();
    Config::default().save_to_path(&config_path).unwrap();

    let entries: Vec<_> = std::fs::read_dir(temp_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, [std::ffi::OsString::from("config.toml")]);
}

#[test]
fn invalid_toml_reports_the_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "stream_buffer = \"lots\"").unwrap();

    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().starts_with("Failed to parse config at "));
}

#[test]
fn numeric_keys_are_validated() {
    let mut config = Config::default();
    assert!(matches!(
        config.set_value("stream-buffer", "0"),
        Err(ConfigError::InvalidValue { .. })
    ));
    assert!(matches!(
        config.set_value("request-timeout", "soon"),
        Err(ConfigError::InvalidValue { .. })
    ));
    config.set_value("request-timeout", " 30 ").unwrap();
    assert_eq!(config.request_timeout(), Duration::from_secs(30));
}

#[test]
fn base_url_keys_replace_case_insensitively() {
    let mut config = Config::default();
    config.set_value("base-url.openai", "http://a").unwrap();
    config.set_value("base-url.OpenAI", "http://b").unwrap();
    assert_eq!(config.base_urls.len(), 1);
    assert_eq!(
        config.client_options().base_urls.get("OpenAI").map(String::as_str),
        Some("http://b")
    );

    config.unset_value("base-url.OPENAI").unwrap();
    assert!(config.base_urls.is_empty());
}

#[test]
fn unknown_keys_list_the_valid_ones() {
    let mut config = Config::default();
    let err = config.set_value("theme", "dark").unwrap_err();
    assert!(err.to_string().contains("greeting"));
    assert!(matches!(
        config.unset_value("base-url."),
        Err(ConfigError::UnknownKey(_))
    ));
}

#[test]
fn zero_stream_buffer_in_file_is_clamped() {
    let config = Config {
        stream_buffer: Some(0),
        ..Default::default()
    };
    assert_eq!(config.stream_buffer(), 1);
}

#[cfg(unix)]
#[test]
fn path_display_abbreviates_home() {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/root".into());
    let path = std::path::Path::new(&home).join(".config/llmschat/config.toml");
    if std::env::var_os("HOME").is_some() {
        assert_eq!(path_display(&path), "~/.config/llmschat/config.toml");
    }
}
