use anyhow::Result;
use serde_json::Value;

use crate::persistence;
use crate::state::{AppState, Settings};

pub fn get_settings(state: &AppState) -> Settings {
    state.settings.lock().clone()
}

/// Validate and apply a full settings object, then persist it.
pub fn update_settings(state: &AppState, settings: Settings) -> Result<()> {
    let mut current = state.settings.lock();
    apply(state, &mut current, settings)
}

pub fn get_setting(state: &AppState, key: &str) -> Result<Value> {
    persistence::get_value(&state.settings.lock(), key)
}

pub fn set_setting(state: &AppState, key: &str, value: Value) -> Result<()> {
    let mut current = state.settings.lock();
    let mut updated = current.clone();
    persistence::set_value(&mut updated, key, value)?;
    apply(state, &mut current, updated)
}

/// The settings lock stays held so the player speed and the stored speed
/// always change together.
fn apply(state: &AppState, current: &mut Settings, settings: Settings) -> Result<()> {
    persistence::validate(&settings)?;
    if settings.speed != current.speed {
        state.player.set_speed(settings.speed)?;
    }

    *current = settings;
    persist(state, current);
    tracing::info!("Settings updated");
    Ok(())
}

/// Write settings to disk if the state has a settings file. Failures are logged.
pub(crate) fn persist(state: &AppState, settings: &Settings) {
    let Some(path) = &state.settings_path else {
        return;
    };
    if let Err(e) = persistence::save_settings(path, settings) {
        tracing::error!("Failed to save settings: {:#}", e);
    }
}
