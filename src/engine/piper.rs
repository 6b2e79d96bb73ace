use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::{AudioBuffer, TtsEngine, VoiceInfo};
use crate::error::SynthesisError;

/// Piper TTS engine driving the `piper` executable.
///
/// Text goes in on stdin; `--output_raw` makes piper emit little-endian
/// 16-bit mono PCM on stdout at the voice's sample rate.
pub struct PiperEngine {
    binary: PathBuf,
    voice: Option<VoiceInfo>,
}

impl PiperEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            voice: None,
        }
    }

    fn command(&self, voice: &VoiceInfo) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--model").arg(&voice.model_path);
        if let Some(config) = &voice.config_path {
            cmd.arg("--config").arg(config);
        }
        cmd.arg("--output_raw")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl TtsEngine for PiperEngine {
    fn load_voice(&mut self, voice: &VoiceInfo) -> Result<(), SynthesisError> {
        if !voice.model_path.exists() {
            return Err(SynthesisError::VoiceLoad(format!(
                "model file missing: {}",
                voice.model_path.display()
            )));
        }
        if let Some(config) = &voice.config_path {
            let data = std::fs::read_to_string(config)
                .map_err(|e| SynthesisError::VoiceLoad(format!("{}: {}", config.display(), e)))?;
            serde_json::from_str::<serde_json::Value>(&data)
                .map_err(|e| SynthesisError::VoiceLoad(format!("{}: {}", config.display(), e)))?;
        }

        tracing::info!("Loaded voice: {} (sample rate: {})", voice.name, voice.sample_rate);
        self.voice = Some(voice.clone());
        Ok(())
    }

    fn current_voice(&self) -> Option<&str> {
        self.voice.as_ref().map(|v| v.name.as_str())
    }

    fn synthesize(&self, text: &str) -> Result<AudioBuffer, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        let voice = self.voice.as_ref().ok_or(SynthesisError::NoVoiceLoaded {
            available: Vec::new(),
        })?;

        let mut child = self
            .command(voice)
            .spawn()
            .map_err(|e| SynthesisError::Process(format!("{}: {}", self.binary.display(), e)))?;

        // Feed stdin from a separate thread so a full stdout pipe cannot stall us.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SynthesisError::Process("stdin unavailable".into()))?;
        let input = text.to_string();
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child
            .wait_with_output()
            .map_err(|e| SynthesisError::Process(e.to_string()))?;

        let written = writer.join();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SynthesisError::Process(format!(
                "piper exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(SynthesisError::Process(format!("writing text: {}", e))),
            Err(_) => return Err(SynthesisError::Process("stdin writer panicked".into())),
        }

        let samples = decode_pcm16(&output.stdout);
        if samples.is_empty() {
            return Err(SynthesisError::Process("no audio produced".into()));
        }

        tracing::info!(
            "Synthesized {} characters to {} samples",
            text.chars().count(),
            samples.len()
        );
        Ok(AudioBuffer::new(samples, voice.sample_rate))
    }
}

fn decode_pcm16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DEFAULT_SAMPLE_RATE;

    fn voice_at(path: PathBuf) -> VoiceInfo {
        VoiceInfo {
            name: "test".into(),
            model_path: path,
            config_path: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    #[test]
    fn decodes_little_endian_pcm() {
        let bytes = [0x01, 0x00, 0xff, 0x7f, 0x00, 0x80, 0x05];
        assert_eq!(decode_pcm16(&bytes), vec![1, i16::MAX, i16::MIN]);
    }

    #[test]
    fn empty_text_is_rejected_before_voice_check() {
        let engine = PiperEngine::new("piper");
        assert!(matches!(engine.synthesize("   \n"), Err(SynthesisError::EmptyText)));
    }

    #[test]
    fn synthesis_requires_a_voice() {
        let engine = PiperEngine::new("piper");
        assert!(matches!(
            engine.synthesize("hello"),
            Err(SynthesisError::NoVoiceLoaded { .. })
        ));
    }

    #[test]
    fn load_voice_checks_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = PiperEngine::new("piper");

        let missing = voice_at(dir.path().join("missing.onnx"));
        assert!(matches!(engine.load_voice(&missing), Err(SynthesisError::VoiceLoad(_))));
        assert!(!engine.is_loaded());

        let model = dir.path().join("present.onnx");
        std::fs::write(&model, b"").unwrap();
        engine.load_voice(&voice_at(model)).unwrap();
        assert_eq!(engine.current_voice(), Some("test"));
    }

    #[test]
    fn load_voice_rejects_malformed_config() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("v.onnx");
        let config = dir.path().join("v.onnx.json");
        std::fs::write(&model, b"").unwrap();
        std::fs::write(&config, b"{not json").unwrap();

        let mut voice = voice_at(model);
        voice.config_path = Some(config);
        let mut engine = PiperEngine::new("piper");
        assert!(matches!(engine.load_voice(&voice), Err(SynthesisError::VoiceLoad(_))));
    }

    #[test]
    fn missing_binary_is_a_process_error() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("v.onnx");
        std::fs::write(&model, b"").unwrap();

        let mut engine = PiperEngine::new(dir.path().join("no-such-piper"));
        engine.load_voice(&voice_at(model)).unwrap();
        assert!(matches!(engine.synthesize("hello"), Err(SynthesisError::Process(_))));
    }
}
