pub mod piper;
pub mod voices;

use crate::error::SynthesisError;

pub use voices::VoiceInfo;

/// Sample rate produced by the bundled voices.
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

/// Mono 16-bit audio handed from the synthesizer to the player.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Text-to-speech boundary: text in, finished sample buffer out.
pub trait TtsEngine: Send {
    fn load_voice(&mut self, voice: &VoiceInfo) -> Result<(), SynthesisError>;
    fn current_voice(&self) -> Option<&str>;
    fn is_loaded(&self) -> bool {
        self.current_voice().is_some()
    }
    fn synthesize(&self, text: &str) -> Result<AudioBuffer, SynthesisError>;
}
