pub mod error;
pub mod settings;

pub use error::*;
pub use settings::*;

use std::path::{Path, PathBuf};

/// Environment variable holding an explicit settings path
pub const CONFIG_PATH_ENV: &str = "KUBEPROV_CONFIG_PATH";

const CONFIG_FILE: &str = "config.yaml";

/// Directory holding the global settings file (`<config_dir>/kubeprov`)
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("kubeprov"))
}

/// Locate the settings file
///
/// Search order:
/// 1. `KUBEPROV_CONFIG_PATH` (must exist when set)
/// 2. `<config_dir>/kubeprov/config.yaml`
///
/// `Ok(None)` means no file: built-in defaults apply.
pub fn find_settings_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if !path.exists() {
            return Err(ConfigError::SettingsFileNotFound(path));
        }
        return Ok(Some(path));
    }

    Ok(get_config_dir()
        .map(|dir| dir.join(CONFIG_FILE))
        .filter(|path| path.exists()))
}

/// Load settings from the discovered file, or defaults when there is none
pub fn load() -> Result<Settings> {
    match find_settings_file()? {
        Some(path) => load_from(&path),
        None => {
            tracing::debug!("No settings file found, using defaults");
            Ok(Settings::default())
        }
    }
}

/// Load and validate settings from a YAML file
pub fn load_from(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    settings.validate()?;
    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}
