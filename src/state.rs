use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::audio::playback::{ErrorReceiver, PlaybackController, DEFAULT_CHUNK_SAMPLES};
use crate::engine::TtsEngine;
use crate::text::TextExtractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStatus {
    Idle,
    Extracting,
    Synthesizing,
    Playing,
    Paused,
}

impl Default for AppStatus {
    fn default() -> Self {
        Self::Idle
    }
}

pub struct AppState {
    pub player: Arc<PlaybackController>,
    pub engine: Arc<Mutex<Box<dyn TtsEngine>>>,
    pub settings: Mutex<Settings>,
    /// Where settings are persisted; `None` keeps them in memory only
    pub settings_path: Option<PathBuf>,
    pub voices_dir: PathBuf,
    pub status: Arc<Mutex<AppStatus>>,
    pub extractor: TextExtractor,
    pub last_text: Mutex<Option<String>>,
}

impl AppState {
    pub fn new(
        player: PlaybackController,
        engine: Box<dyn TtsEngine>,
        settings: Settings,
        settings_path: Option<PathBuf>,
        voices_dir: PathBuf,
    ) -> Result<Self> {
        let status = Arc::new(Mutex::new(AppStatus::Idle));

        let on_finish = Arc::clone(&status);
        player.set_completion_callback(move || {
            *on_finish.lock() = AppStatus::Idle;
            tracing::info!("Finished speaking");
        });

        if let Some(errors) = player.take_error_receiver() {
            watch_playback_errors(errors, Arc::clone(&status))?;
        }

        Ok(Self {
            player: Arc::new(player),
            engine: Arc::new(Mutex::new(engine)),
            settings: Mutex::new(settings),
            settings_path,
            voices_dir,
            status,
            extractor: TextExtractor::new(),
            last_text: Mutex::new(None),
        })
    }

    pub fn status(&self) -> AppStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: AppStatus) {
        let mut current = self.status.lock();
        if *current != status {
            tracing::debug!("Status {:?} -> {:?}", *current, status);
            *current = status;
        }
    }
}

fn watch_playback_errors(mut errors: ErrorReceiver, status: Arc<Mutex<AppStatus>>) -> Result<()> {
    std::thread::Builder::new()
        .name("playback-errors".into())
        .spawn(move || {
            while let Some(err) = errors.blocking_recv() {
                tracing::error!("Playback error: {}", err);
                *status.lock() = AppStatus::Idle;
            }
        })
        .context("Failed to start playback error watcher")?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub voice: String,
    pub speed: f32,
    pub output_directory: String,
    pub shortcuts: ShortcutSettings,
    pub playback: PlaybackSettings,
    pub piper_binary: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            voice: "en_US-lessac-medium".to_string(),
            speed: 1.0,
            output_directory: "~/Downloads".to_string(),
            shortcuts: ShortcutSettings::default(),
            playback: PlaybackSettings::default(),
            piper_binary: "piper".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortcutSettings {
    pub play_pause: String,
    pub stop: String,
    pub speed_up: String,
    pub speed_down: String,
    pub open_input: String,
}

impl Default for ShortcutSettings {
    fn default() -> Self {
        Self {
            play_pause: "ctrl+shift+p".to_string(),
            stop: "ctrl+shift+s".to_string(),
            speed_up: "ctrl+shift+]".to_string(),
            speed_down: "ctrl+shift+[".to_string(),
            open_input: "ctrl+shift+r".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub chunk_samples: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            chunk_samples: DEFAULT_CHUNK_SAMPLES,
        }
    }
}
