use kubeprov::{Error, ProviderKind};
use kubeprov_config::{CONFIG_PATH_ENV, ConfigError};
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

#[test]
#[serial]
fn test_registry_from_settings_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(
        &path,
        "digitalocean:\n  api_base: http://127.0.0.1:8080/v2\n  page_size: 20\n",
    )
    .unwrap();

    unsafe {
        std::env::set_var(CONFIG_PATH_ENV, path.to_str().unwrap());
    }
    let result = kubeprov::registry_from_env();
    unsafe {
        std::env::remove_var(CONFIG_PATH_ENV);
    }

    let (settings, registry) = result.unwrap();
    assert_eq!(settings.digitalocean.api_base, "http://127.0.0.1:8080/v2");
    assert_eq!(settings.digitalocean.page_size, 20);
    assert_eq!(registry.kinds().collect::<Vec<_>>(), ProviderKind::ALL.to_vec());
}

#[test]
#[serial]
fn test_missing_settings_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.yaml");

    unsafe {
        std::env::set_var(CONFIG_PATH_ENV, path.to_str().unwrap());
    }
    let result = kubeprov::registry_from_env();
    unsafe {
        std::env::remove_var(CONFIG_PATH_ENV);
    }

    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::SettingsFileNotFound(_)))
    ));
}
