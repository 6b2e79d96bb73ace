use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::engine::AudioBuffer;

const FILENAME_WORDS: usize = 5;
const MAX_STEM_CHARS: usize = 50;

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Writes synthesized speech to WAV files named after the spoken text.
pub struct WavExporter {
    output_directory: PathBuf,
}

impl WavExporter {
    pub fn new(output_directory: &str) -> Result<Self> {
        let output_directory = expand_home(output_directory);
        std::fs::create_dir_all(&output_directory).with_context(|| {
            format!("Failed to create export directory {}", output_directory.display())
        })?;
        Ok(Self { output_directory })
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn export(&self, buffer: &AudioBuffer, text: &str) -> Result<PathBuf> {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let path = resolve_conflict(&self.output_directory.join(generate_filename(text, &timestamp)));

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: buffer.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        for &sample in &buffer.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize().context("Failed to finalize WAV file")?;

        tracing::info!("Exported {} samples to {}", buffer.len(), path.display());
        Ok(path)
    }
}

/// `<first five words>_<timestamp>.wav`, keeping only word characters.
pub fn generate_filename(text: &str, timestamp: &str) -> String {
    let words = text.split_whitespace().take(FILENAME_WORDS).collect::<Vec<_>>().join("_");
    let cleaned = UNSAFE_CHARS.replace_all(&words, "");
    let stem: String = WHITESPACE
        .replace_all(&cleaned, "_")
        .chars()
        .take(MAX_STEM_CHARS)
        .collect();
    format!("{}_{}.wav", stem, timestamp)
}

/// First of `path`, `stem_1.ext`, `stem_2.ext`, ... that does not exist yet.
pub fn resolve_conflict(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("speech");
    let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("wav");
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    let mut counter = 1;
    loop {
        let candidate = parent.join(format!("{}_{}.{}", stem, counter, extension));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches(['/', '\\']));
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_uses_first_five_clean_words() {
        let name = generate_filename("Hello, world! This is a test of export.", "20240101_120000");
        assert_eq!(name, "Hello_world_This_is_a_20240101_120000.wav");
    }

    #[test]
    fn filename_stem_is_truncated() {
        let long = "a".repeat(80);
        let name = generate_filename(&long, "20240101_120000");
        assert_eq!(name, format!("{}_20240101_120000.wav", "a".repeat(50)));
    }

    #[test]
    fn conflicts_get_numeric_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speech.wav");
        assert_eq!(resolve_conflict(&path), path);

        std::fs::write(&path, b"").unwrap();
        assert_eq!(resolve_conflict(&path), dir.path().join("speech_1.wav"));

        std::fs::write(dir.path().join("speech_1.wav"), b"").unwrap();
        assert_eq!(resolve_conflict(&path), dir.path().join("speech_2.wav"));
    }

    #[test]
    fn exports_readable_wav() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("out").join("audio");
        let exporter = WavExporter::new(nested.to_str().unwrap()).unwrap();
        assert!(nested.is_dir());

        let buffer = AudioBuffer::new(vec![0, 1000, -1000, i16::MAX], 22050);
        let first = exporter.export(&buffer, "Read this aloud").unwrap();
        let second = exporter.export(&buffer, "Read this aloud").unwrap();
        assert_ne!(first, second);

        let mut reader = hound::WavReader::open(&first).unwrap();
        assert_eq!(reader.spec().sample_rate, 22050);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, buffer.samples);
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/Downloads"), home.join("Downloads"));
        }
        assert_eq!(expand_home("/tmp/out"), PathBuf::from("/tmp/out"));
    }
}
