use llm_switchboard::env::providers as vars;
use llm_switchboard::recovery::ErrorCategory;
use llm_switchboard::{
    ConfigDiscovery, ConfigError, Credential, HealthState, Switchboard, SwitchboardConfig,
};
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

const CONFIG: &str = r#"
[[providers]]
name = "primary"
credential = { env = "SWITCHBOARD_IT_PRIMARY_KEY" }
base_url = "https://primary.example.com/v1"
models = ["chat", "code"]
priority = 1

[providers.rate_limits]
requests_per_minute = 10
requests_per_hour = 100
requests_per_day = 1000

[[providers]]
name = "backup"
credential = { inline = "sk-backup" }
base_url = "https://backup.example.com/v1"
models = ["chat"]
priority = 2
enabled = false

[providers.rate_limits]
requests_per_minute = 5
requests_per_hour = 50
requests_per_day = 500

[health]
interval_ms = 15000
timeout_ms = 2000
degraded_latency_ms = 1500

[health.endpoints]
primary = ["https://status.primary.example.com/ping"]

[recovery]
retention_days = 7
max_records = 100
"#;

#[test]
#[serial]
fn test_load_explicit_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("switchboard.toml");
    fs::write(&config_path, CONFIG).unwrap();

    let config = ConfigDiscovery::load(Some(config_path.as_path())).unwrap();

    assert_eq!(config.providers.len(), 2);
    let primary = &config.providers[0];
    assert_eq!(
        primary.credential,
        Credential::env("SWITCHBOARD_IT_PRIMARY_KEY")
    );
    assert_eq!(primary.rate_limits.requests_per_minute, 10);
    assert!(!config.providers[1].enabled);

    assert_eq!(config.health.interval_ms, 15000);
    assert_eq!(
        config.health.endpoints.get("primary").unwrap(),
        &vec!["https://status.primary.example.com/ping".to_string()]
    );
    assert_eq!(config.recovery.retention_days, 7);
    assert_eq!(config.recovery.max_records, 100);
    assert_eq!(config.recovery.rate_limit_cooldown_secs, 60);
}

#[test]
fn test_config_round_trips_through_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let config = SwitchboardConfig::from_toml_str(CONFIG).unwrap();

    config.to_toml_file(&config_path).unwrap();
    let reloaded = SwitchboardConfig::from_toml_file(&config_path).unwrap();

    assert_eq!(reloaded, config);
}

#[test]
#[serial]
fn test_malformed_file_reports_path() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("broken.toml");
    fs::write(&config_path, "[[providers]\nname = ").unwrap();

    match ConfigDiscovery::load(Some(config_path.as_path())) {
        Err(ConfigError::Parse { path, .. }) => assert_eq!(path, config_path),
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disabled_providers_are_registered_but_not_selected() {
    let config = SwitchboardConfig::from_toml_str(CONFIG).unwrap();
    let switchboard = Switchboard::new(config).unwrap();

    assert_eq!(switchboard.registry().providers().len(), 2);
    assert_eq!(switchboard.registry().enabled_providers().len(), 1);
    assert_eq!(switchboard.select_best(), None);
}

#[test]
#[serial]
fn test_env_overlay_applies_to_loaded_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("switchboard.toml");
    fs::write(&config_path, CONFIG).unwrap();

    // SAFETY: env mutation is serialized across tests
    unsafe {
        std::env::set_var("BACKUP_BASE_URL", "http://127.0.0.1:8787/v1");
    }
    let config = ConfigDiscovery::load(Some(config_path.as_path()));
    unsafe {
        std::env::remove_var("BACKUP_BASE_URL");
    }

    let config = config.unwrap();
    assert_eq!(config.providers[1].base_url, "http://127.0.0.1:8787/v1");
    assert_eq!(config.providers[0].base_url, "https://primary.example.com/v1");
}

#[test]
#[serial]
fn test_default_providers_read_keys_from_environment() {
    // SAFETY: env mutation is serialized across tests
    unsafe {
        std::env::set_var(vars::QWEN_API_KEY, "sk-qwen");
        std::env::remove_var(vars::DEEPSEEK_API_KEY);
    }

    let config = SwitchboardConfig::default();
    let qwen = config.providers.iter().find(|p| p.name == "qwen").unwrap();
    let deepseek = config
        .providers
        .iter()
        .find(|p| p.name == "deepseek")
        .unwrap();
    assert_eq!(qwen.credential.resolve().as_deref(), Some("sk-qwen"));
    assert_eq!(deepseek.credential.resolve(), None);
    // A missing key never blocks registration
    assert!(deepseek.validate().is_ok());

    unsafe {
        std::env::remove_var(vars::QWEN_API_KEY);
    }
}

#[tokio::test]
#[serial]
async fn test_provider_without_credential_is_registered_but_down() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("switchboard.toml");
    fs::write(
        &config_path,
        r#"
[[providers]]
name = "keyless"
base_url = "https://keyless.example.com/v1"
models = ["chat"]
priority = 1
"#,
    )
    .unwrap();
    // SAFETY: env mutation is serialized across tests
    unsafe {
        std::env::remove_var("KEYLESS_API_KEY");
    }

    let config = ConfigDiscovery::load(Some(config_path.as_path())).unwrap();
    let switchboard = Switchboard::new(config).unwrap();
    assert!(switchboard.registry().contains("keyless"));

    let result = switchboard.monitor().force_check("keyless").await.unwrap();
    assert_eq!(result.state, HealthState::Down);
    assert_eq!(result.details.error_category, Some(ErrorCategory::Auth));
    assert_eq!(switchboard.select_best(), None);
}

#[tokio::test]
async fn test_switchboard_fills_empty_credential_handles() {
    let mut config = SwitchboardConfig::from_toml_str(CONFIG).unwrap();
    config.providers[1].credential = Credential::env("");

    let switchboard = Switchboard::new(config).unwrap();

    let backup = switchboard.registry().get_provider("backup").unwrap();
    assert_eq!(backup.credential, Credential::env("BACKUP_API_KEY"));
}
