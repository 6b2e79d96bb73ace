use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::DEFAULT_SAMPLE_RATE;
use crate::error::SynthesisError;

const VOICES_ENV: &str = "READ_ALOUD_VOICES";

/// A voice model installed on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub name: String,
    pub model_path: PathBuf,
    pub config_path: Option<PathBuf>,
    pub sample_rate: u32,
}

#[derive(Deserialize)]
struct VoiceConfig {
    #[serde(default)]
    audio: Option<VoiceAudioConfig>,
    #[serde(default)]
    sample_rate: Option<u32>,
}

#[derive(Deserialize)]
struct VoiceAudioConfig {
    sample_rate: Option<u32>,
}

/// Get the voices directory path
pub fn voices_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(VOICES_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let data_dir = dirs::data_dir()
        .ok_or_else(|| anyhow::anyhow!("Cannot find application data directory"))?;
    Ok(data_dir.join("ReadAloud").join("voices"))
}

/// Scan a directory for `*.onnx` voice models, sorted by name.
pub fn discover_voices(dir: &Path) -> Result<Vec<VoiceInfo>> {
    if !dir.exists() {
        tracing::warn!("Voices directory does not exist: {}", dir.display());
        return Ok(Vec::new());
    }

    let mut voices = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("onnx") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let config_path = path.with_extension("onnx.json");
        let (config_path, sample_rate) = if config_path.exists() {
            let rate = read_sample_rate(&config_path).unwrap_or_else(|e| {
                tracing::warn!("Unreadable voice config {}: {}", config_path.display(), e);
                DEFAULT_SAMPLE_RATE
            });
            (Some(config_path), rate)
        } else {
            (None, DEFAULT_SAMPLE_RATE)
        };

        voices.push(VoiceInfo {
            name: name.to_string(),
            model_path: path.clone(),
            config_path,
            sample_rate,
        });
    }

    voices.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::info!("Discovered {} voices in {}", voices.len(), dir.display());
    Ok(voices)
}

/// Look up an installed voice by name
pub fn find_voice(dir: &Path, name: &str) -> std::result::Result<VoiceInfo, SynthesisError> {
    let voices = discover_voices(dir).map_err(|e| SynthesisError::VoiceLoad(e.to_string()))?;
    let available: Vec<String> = voices.iter().map(|v| v.name.clone()).collect();
    voices
        .into_iter()
        .find(|v| v.name == name)
        .ok_or_else(|| SynthesisError::VoiceNotFound {
            name: name.to_string(),
            available,
        })
}

/// Pick the configured voice if installed, otherwise the first one found.
pub fn select_voice(voices: &[VoiceInfo], preferred: &str) -> Option<VoiceInfo> {
    if let Some(voice) = voices.iter().find(|v| v.name == preferred) {
        return Some(voice.clone());
    }
    let fallback = voices.first().cloned();
    match &fallback {
        Some(voice) => tracing::info!(
            "Configured voice '{}' not installed, falling back to '{}'",
            preferred,
            voice.name
        ),
        None => tracing::warn!("No voices available"),
    }
    fallback
}

fn read_sample_rate(config_path: &Path) -> Result<u32> {
    let data = std::fs::read_to_string(config_path)?;
    let config: VoiceConfig = serde_json::from_str(&data)?;
    Ok(config
        .audio
        .and_then(|a| a.sample_rate)
        .or(config.sample_rate)
        .unwrap_or(DEFAULT_SAMPLE_RATE))
}
