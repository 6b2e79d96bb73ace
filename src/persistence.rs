use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::Value;

use crate::audio::processing::validate_speed;
use crate::state::Settings;

const SETTINGS_FILE: &str = "settings.json";

/// Default location of the settings file
pub fn settings_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Cannot find configuration directory"))?;
    Ok(config_dir.join("ReadAloud").join(SETTINGS_FILE))
}

/// Load settings, writing defaults on first run. Never fails: unreadable or
/// malformed files fall back to defaults with a warning.
pub fn load_settings(path: &Path) -> Settings {
    if !path.exists() {
        tracing::info!("No stored settings found. Writing defaults to {}", path.display());
        let settings = Settings::default();
        if let Err(e) = save_settings(path, &settings) {
            tracing::warn!("Failed to write default settings: {:#}", e);
        }
        return settings;
    }

    let settings = match std::fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str::<Settings>(&data) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Failed to parse stored settings: {}. Using defaults.", e);
                Settings::default()
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read settings file {}: {}. Using defaults.", path.display(), e);
            Settings::default()
        }
    };

    sanitize(settings)
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create settings directory")?;
    }
    let data = serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;
    std::fs::write(path, data)
        .with_context(|| format!("Failed to write settings to {}", path.display()))?;
    tracing::debug!("Saved settings to {}", path.display());
    Ok(())
}

/// Read a setting by dotted key, e.g. `shortcuts.play_pause`.
pub fn get_value(settings: &Settings, key: &str) -> Result<Value> {
    let root = serde_json::to_value(settings)?;
    let mut node = &root;
    for part in key.split('.') {
        node = match node {
            Value::Object(map) => map.get(part),
            _ => None,
        }
        .ok_or_else(|| anyhow::anyhow!("Setting key not found: {}", key))?;
    }
    Ok(node.clone())
}

/// Replace a setting by dotted key. The key must already exist and the value
/// must have the right shape; on any error `settings` is left untouched.
pub fn set_value(settings: &mut Settings, key: &str, value: Value) -> Result<()> {
    let mut root = serde_json::to_value(&*settings)?;

    let mut node = &mut root;
    for part in key.split('.') {
        node = match node {
            Value::Object(map) => map.get_mut(part),
            _ => None,
        }
        .ok_or_else(|| anyhow::anyhow!("Setting key not found: {}", key))?;
    }
    *node = value;

    let updated: Settings = serde_json::from_value(root)
        .with_context(|| format!("Invalid value for setting '{}'", key))?;
    validate(&updated)?;

    *settings = updated;
    Ok(())
}

/// Reject settings no component could run with.
pub fn validate(settings: &Settings) -> Result<()> {
    validate_speed(settings.speed)?;
    if settings.playback.chunk_samples == 0 {
        bail!("playback.chunk_samples must be positive");
    }
    Ok(())
}

fn sanitize(mut settings: Settings) -> Settings {
    let defaults = Settings::default();
    if let Err(e) = validate_speed(settings.speed) {
        tracing::warn!("Stored speed rejected ({}). Resetting to {}x", e, defaults.speed);
        settings.speed = defaults.speed;
    }
    if settings.playback.chunk_samples == 0 {
        tracing::warn!("Stored chunk size of 0 rejected. Resetting to {}", defaults.playback.chunk_samples);
        settings.playback.chunk_samples = defaults.playback.chunk_samples;
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dotted_keys_reach_nested_values() {
        let settings = Settings::default();
        assert_eq!(get_value(&settings, "shortcuts.play_pause").unwrap(), json!("ctrl+shift+p"));
        assert_eq!(get_value(&settings, "speed").unwrap(), json!(1.0));
        assert!(get_value(&settings, "shortcuts.missing").is_err());
        assert!(get_value(&settings, "speed.nested").is_err());
    }

    #[test]
    fn set_value_updates_known_keys() {
        let mut settings = Settings::default();
        set_value(&mut settings, "speed", json!(1.5)).unwrap();
        set_value(&mut settings, "shortcuts.stop", json!("ctrl+q")).unwrap();
        assert_eq!(settings.speed, 1.5);
        assert_eq!(settings.shortcuts.stop, "ctrl+q");
    }

    #[test]
    fn rejected_updates_leave_settings_unchanged() {
        let mut settings = Settings::default();
        let before = settings.clone();

        let err = set_value(&mut settings, "volume", json!(3)).unwrap_err();
        assert!(err.to_string().contains("Setting key not found: volume"));
        assert!(set_value(&mut settings, "speed", json!("fast")).is_err());
        assert!(set_value(&mut settings, "speed", json!(4.0)).is_err());
        assert_eq!(settings, before);
    }
}
