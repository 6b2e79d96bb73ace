use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::audio::processing::{validate_speed, MAX_SPEED, MIN_SPEED};
use crate::audio::PlaybackState;
use crate::engine::voices::{self, VoiceInfo};
use crate::error::PlaybackError;
use crate::export::WavExporter;
use crate::state::{AppState, AppStatus, Settings};

pub const SPEED_STEP: f32 = 0.25;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: AppStatus,
    pub playback: PlaybackState,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub speed: f32,
    pub voice: Option<String>,
}

/// Extract, synthesize and play `input` (plain text or a URL) from the start.
///
/// Synthesis failures are returned as `PlaybackError::SynthesisFailure` and
/// leave the player untouched.
pub async fn speak_text(state: &AppState, input: &str) -> Result<()> {
    let result = do_speak_text(state, input).await;
    if result.is_err() {
        state.set_status(AppStatus::Idle);
    }
    result
}

async fn do_speak_text(state: &AppState, input: &str) -> Result<()> {
    state.set_status(AppStatus::Extracting);
    let text = state.extractor.extract(input).await?;

    state.set_status(AppStatus::Synthesizing);
    let engine = Arc::clone(&state.engine);
    let to_speak = text.clone();
    let buffer = tokio::task::spawn_blocking(move || engine.lock().synthesize(&to_speak))
        .await
        .context("Synthesis task failed")?
        .map_err(PlaybackError::SynthesisFailure)?;

    let speed = state.settings.lock().speed;
    tracing::info!(
        "Speaking {} characters ({:.1}s of audio) at {}x",
        text.chars().count(),
        buffer.duration_secs(),
        speed
    );

    // Set before play so an immediate completion can move us back to Idle.
    state.set_status(AppStatus::Playing);
    state.player.play(buffer, speed)?;
    *state.last_text.lock() = Some(text);
    Ok(())
}

/// Playing -> paused, paused -> playing, stopped -> replay the last buffer.
pub fn toggle_play_pause(state: &AppState) -> Result<PlaybackState> {
    match state.player.state() {
        PlaybackState::Playing => {
            state.player.pause();
            state.set_status(AppStatus::Paused);
        }
        PlaybackState::Paused => {
            state.set_status(AppStatus::Playing);
            if let Err(e) = state.player.resume() {
                state.set_status(AppStatus::Idle);
                return Err(e.into());
            }
        }
        PlaybackState::Stopped => {
            state.player.last_buffer().context("Nothing to play")?;
            state.set_status(AppStatus::Playing);
            if let Err(e) = state.player.replay() {
                state.set_status(AppStatus::Idle);
                return Err(e.into());
            }
        }
    }
    Ok(state.player.state())
}

pub fn stop_speaking(state: &AppState) {
    state.player.stop();
    state.set_status(AppStatus::Idle);
}

/// Raise the speed by one step. At the upper bound the request is ignored.
pub fn speed_up(state: &AppState) -> Result<f32> {
    step_speed(state, SPEED_STEP)
}

/// Lower the speed by one step. At the lower bound the request is ignored.
pub fn speed_down(state: &AppState) -> Result<f32> {
    step_speed(state, -SPEED_STEP)
}

fn step_speed(state: &AppState, delta: f32) -> Result<f32> {
    let mut settings = state.settings.lock();
    let current = settings.speed;
    let target = current + delta;
    if !(MIN_SPEED..=MAX_SPEED).contains(&target) {
        tracing::info!("Speed already at {}x, ignoring change to {}x", current, target);
        return Ok(current);
    }
    apply_speed(state, &mut settings, target)?;
    Ok(target)
}

/// Apply `speed` to the player and remember it for future sessions.
pub fn set_speed(state: &AppState, speed: f32) -> Result<()> {
    let speed = validate_speed(speed)?;
    apply_speed(state, &mut state.settings.lock(), speed)
}

/// Caller holds the settings lock across the player update and the save.
fn apply_speed(state: &AppState, settings: &mut Settings, speed: f32) -> Result<()> {
    state.player.set_speed(speed)?;
    settings.speed = speed;
    super::settings::persist(state, settings);
    Ok(())
}

/// Save the last synthesized audio to the configured output directory.
pub fn export_last(state: &AppState) -> Result<PathBuf> {
    let buffer = state.player.last_buffer()?;
    let text = state.last_text.lock().clone().unwrap_or_default();
    let output_directory = state.settings.lock().output_directory.clone();

    let exporter = WavExporter::new(&output_directory)?;
    exporter.export(&buffer, &text)
}

pub fn list_voices(state: &AppState) -> Result<Vec<VoiceInfo>> {
    voices::discover_voices(&state.voices_dir)
}

/// Load an installed voice and make it the configured default.
pub fn set_voice(state: &AppState, name: &str) -> Result<()> {
    let voice = voices::find_voice(&state.voices_dir, name)?;
    state.engine.lock().load_voice(&voice)?;

    let settings = {
        let mut settings = state.settings.lock();
        settings.voice = voice.name.clone();
        settings.clone()
    };
    super::settings::persist(state, &settings);
    tracing::info!("Voice set to {}", voice.name);
    Ok(())
}

pub fn get_status(state: &AppState) -> StatusReport {
    // The engine stays locked for the whole of a synthesis run.
    let voice = match state.engine.try_lock() {
        Some(engine) => engine.current_voice().map(str::to_string),
        None => Some(state.settings.lock().voice.clone()),
    };

    StatusReport {
        status: state.status(),
        playback: state.player.state(),
        position_secs: state.player.get_position(),
        duration_secs: state.player.get_duration(),
        speed: state.player.speed(),
        voice,
    }
}
