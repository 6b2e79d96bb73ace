pub mod audio;
pub mod commands;
pub mod engine;
pub mod error;
pub mod export;
pub mod hotkey;
pub mod persistence;
pub mod state;
pub mod text;

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use audio::{CpalOutput, PlaybackController, PlayerConfig};
use commands::AppCommand;
use engine::piper::PiperEngine;
use engine::{voices, TtsEngine};
use hotkey::HotkeyMap;
use state::AppState;

pub async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting Read Aloud v{}", env!("CARGO_PKG_VERSION"));

    let settings_path = persistence::settings_path()?;
    let settings = persistence::load_settings(&settings_path);
    tracing::info!("Settings loaded from {}", settings_path.display());

    let shortcuts = &settings.shortcuts;
    for (name, raw) in [
        ("play/pause", &shortcuts.play_pause),
        ("stop", &shortcuts.stop),
        ("speed up", &shortcuts.speed_up),
        ("speed down", &shortcuts.speed_down),
        ("read text", &shortcuts.open_input),
    ] {
        tracing::info!("Shortcut {}: {}", name, hotkey::shortcut_display_label(raw));
    }
    let hotkeys = HotkeyMap::from_settings(&settings.shortcuts);

    let voices_dir = voices::voices_dir()?;
    let mut engine = PiperEngine::new(&settings.piper_binary);
    let installed = voices::discover_voices(&voices_dir).unwrap_or_else(|e| {
        tracing::warn!("Failed to scan voices in {}: {}", voices_dir.display(), e);
        Vec::new()
    });
    if let Some(voice) = voices::select_voice(&installed, &settings.voice) {
        if let Err(e) = engine.load_voice(&voice) {
            tracing::warn!("Failed to load voice {}: {}", voice.name, e);
        }
    }

    let player = PlaybackController::new(
        Arc::new(CpalOutput::new(None)),
        PlayerConfig {
            chunk_samples: settings.playback.chunk_samples,
        },
    )?;
    let state = Arc::new(AppState::new(
        player,
        Box::new(engine),
        settings,
        Some(settings_path),
        voices_dir,
    )?);

    let initial: Vec<String> = std::env::args().skip(1).collect();
    if !initial.is_empty() {
        spawn_speak(&state, initial.join(" "));
    }

    println!("{}", commands::help_text(&hotkeys));
    let result = command_loop(&state, hotkeys).await;

    commands::tts::stop_speaking(&state);
    tracing::info!("Exiting");
    result
}

/// Synthesis can take a while; run it off the command loop so `stop` and
/// friends stay responsive.
fn spawn_speak(state: &Arc<AppState>, text: String) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        if let Err(e) = commands::tts::speak_text(&state, &text).await {
            tracing::error!("Failed to speak: {:#}", e);
            println!("Error: {:#}", e);
        }
    });
}

async fn command_loop(state: &Arc<AppState>, mut hotkeys: HotkeyMap) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut awaiting_input = false;

    while let Some(line) = lines.next_line().await? {
        if awaiting_input {
            awaiting_input = false;
            if !line.trim().is_empty() {
                spawn_speak(state, line.trim().to_string());
            }
            continue;
        }

        let command = match commands::parse_command(&line, &hotkeys) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{:#}", e);
                continue;
            }
        };

        match command {
            AppCommand::Quit => break,
            AppCommand::OpenInput => {
                println!("Enter text or URL to read:");
                awaiting_input = true;
            }
            AppCommand::Say(text) => spawn_speak(state, text),
            command => {
                let rebinds = matches!(command, AppCommand::Set(..));
                match commands::execute(state, command, &hotkeys).await {
                    Ok(message) => println!("{}", message),
                    Err(e) => println!("Error: {:#}", e),
                }
                if rebinds {
                    hotkeys = HotkeyMap::from_settings(&state.settings.lock().shortcuts);
                }
            }
        }
    }
    Ok(())
}
