use super::data::{path_display, Config, ImagePolicy, ServerConfig};
use super::defaults::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use super::io::ConfigError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn server(id: &str, command: &str) -> ServerConfig {
    ServerConfig {
        id: id.to_string(),
        command: command.to_string(),
        args: Vec::new(),
        env: None,
        cwd: None,
        enabled: None,
    }
}

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
    assert_eq!(config.model(), DEFAULT_MODEL);
    assert_eq!(config.base_url_with_override(None), DEFAULT_BASE_URL);
    assert_eq!(config.session_timeout(), Duration::from_secs(60));
    assert_eq!(config.image_policy(), ImagePolicy::Describe);
    assert!(config.persist_images());
    assert_eq!(config.output_dir(), PathBuf::from("output"));
}

#[test]
fn test_config_round_trips_through_disk() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let mut config = Config {
        model: Some("llama3".to_string()),
        summary_images: Some(ImagePolicy::Attach),
        persist_images: Some(false),
        default_server: Some("bmi".to_string()),
        ..Default::default()
    };
    let mut bmi = server("bmi", "toolbridge-server");
    bmi.args = vec!["--verbose".to_string()];
    bmi.env = Some(HashMap::from([("RUST_LOG".to_string(), "debug".to_string())]));
    config.add_server(bmi);
    config.save_to_path(&config_path).expect("save failed");

    let loaded = Config::load_from_path(&config_path).expect("load failed");
    assert_eq!(loaded, config);
    assert_eq!(loaded.image_policy(), ImagePolicy::Attach);
    assert!(!loaded.persist_images());
}

#[test]
fn test_parse_errors_name_the_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "model = [unterminated").expect("write failed");

    let err = Config::load_from_path(&config_path).expect_err("parse should fail");
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("Failed to parse config at"));
}

#[test]
fn test_unknown_image_policy_is_rejected() {
    let parsed: Result<Config, _> = toml::from_str("summary_images = \"inline\"");
    assert!(parsed.is_err());
    assert!("inline".parse::<ImagePolicy>().is_err());
    assert_eq!("ATTACH".parse::<ImagePolicy>(), Ok(ImagePolicy::Attach));
}

#[test]
fn test_server_lookup_is_case_insensitive() {
    let mut config = Config::default();
    config.add_server(server("Vision", "vision-server"));
    assert_eq!(
        config.get_server("vision").map(|s| s.command.as_str()),
        Some("vision-server")
    );
    config.add_server(server("VISION", "replacement"));
    assert_eq!(config.servers.len(), 1);
    config.remove_server("vision");
    assert!(config.servers.is_empty());
}

#[test]
fn test_resolve_server_prefers_explicit_then_default_then_single() {
    let mut config = Config::default();
    assert!(config.resolve_server(None).is_err());

    config.add_server(server("alpha", "a"));
    assert_eq!(config.resolve_server(None).map(|s| s.id.as_str()), Ok("alpha"));

    config.add_server(server("beta", "b"));
    assert!(config.resolve_server(None).is_err());
    assert_eq!(config.resolve_server(Some("BETA")).map(|s| s.id.as_str()), Ok("beta"));

    config.default_server = Some("alpha".to_string());
    assert_eq!(config.resolve_server(None).map(|s| s.id.as_str()), Ok("alpha"));

    let mut disabled = server("gamma", "c");
    disabled.enabled = Some(false);
    config.add_server(disabled);
    assert!(config.resolve_server(Some("gamma")).is_err());
    assert!(config.resolve_server(Some("missing")).is_err());
}

#[test]
fn test_base_url_env_override() {
    let config = Config {
        base_url: Some("http://localhost:11434/v1".to_string()),
        ..Default::default()
    };
    assert_eq!(config.base_url_with_override(None), "http://localhost:11434/v1");
    assert_eq!(
        config.base_url_with_override(Some("https://proxy.example/v1".to_string())),
        "https://proxy.example/v1"
    );
    assert_eq!(
        config.base_url_with_override(Some("  ".to_string())),
        "http://localhost:11434/v1"
    );
}

#[test]
fn test_launch_spec_carries_server_settings() {
    let mut entry = server("demo", "toolbridge-server");
    entry.args = vec!["--capture-source".to_string(), "frame.png".to_string()];
    entry.cwd = Some(PathBuf::from("/tmp"));
    let spec = entry.launch_spec();
    assert_eq!(spec.display(), "toolbridge-server --capture-source frame.png");
    assert_eq!(spec.cwd, Some(PathBuf::from("/tmp")));
}

#[cfg(unix)]
#[test]
fn test_path_display_uses_tilde_under_home() {
    if let Some(home) = std::env::var_os("HOME") {
        let path = PathBuf::from(home).join(".config/toolbridge/config.toml");
        assert_eq!(path_display(&path), "~/.config/toolbridge/config.toml");
    }
}
