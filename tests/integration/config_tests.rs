use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;
use thumbcache::config::{Config, ENV_PREFIX};

#[test]
fn test_config_load_defaults() {
    // Figment directly, without Env, so other tests' variables cannot leak in.
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .extract()
        .unwrap();
    assert_eq!(config.max_hash_size, 10 * 1024 * 1024);
    assert_eq!(config.idle_interval_ms, 100);
    assert!(config.extract_jumbo_icons);
    assert_eq!(config.icons.theme, "hicolor");
    assert_eq!(config.cache_dir, None);
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
cache_dir = "/var/cache/thumbs"
max_hash_size = 4096
extract_jumbo_icons = false

[icons]
theme = "Adwaita"
search_paths = ["/opt/icons"]
"#,
    )
    .unwrap();

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract()
        .unwrap();

    assert_eq!(config.cache_dir, Some(PathBuf::from("/var/cache/thumbs")));
    assert_eq!(config.max_hash_size, 4096);
    assert!(!config.extract_jumbo_icons);
    assert_eq!(config.icons.theme, "Adwaita");
    assert_eq!(config.icons.fallback_theme, "hicolor");
    assert_eq!(config.icons.search_paths, vec![PathBuf::from("/opt/icons")]);

    let cache = config.cache_config();
    assert_eq!(cache.max_hash_size, 4096);
    assert!(!cache.jumbo_icons);
    assert_eq!(cache.idle_interval, Duration::from_millis(100));
}

#[test]
fn test_config_load_from_env() {
    std::env::set_var("THUMBCACHE_IDLE_INTERVAL_MS", "25");
    std::env::set_var("THUMBCACHE_ICONS__FALLBACK_THEME", "breeze");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .unwrap();

    assert_eq!(config.idle_interval_ms, 25);
    assert_eq!(config.icons.fallback_theme, "breeze");

    std::env::remove_var("THUMBCACHE_IDLE_INTERVAL_MS");
    std::env::remove_var("THUMBCACHE_ICONS__FALLBACK_THEME");
}

#[test]
fn test_config_load_missing_file_uses_defaults() {
    let temp_dir = tempdir().unwrap();
    let config = Config::load(Some(&temp_dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config.max_hash_size, Config::default().max_hash_size);
}

#[test]
fn test_config_invalid_toml_is_an_error() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "max_hash_size = \"lots\"").unwrap();

    assert!(Config::load(Some(&config_path)).is_err());
}

#[test]
fn test_config_toml_round_trip() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let mut config = Config::default();
    config.max_hash_size = 1234;
    config.icons.theme = "Papirus".to_string();
    fs::write(&config_path, config.to_toml().unwrap()).unwrap();

    let saved = fs::read_to_string(&config_path).unwrap();
    assert!(saved.contains("max_hash_size = 1234"));
    assert!(saved.contains("theme = \"Papirus\""));

    let loaded: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract()
        .unwrap();
    assert_eq!(loaded, config);
}
