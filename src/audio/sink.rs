use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::error::SinkError;

pub type CancelFlag = Arc<AtomicBool>;

/// Factory for per-session output handles.
///
/// `open` is called on the delivery thread at the start of every session and
/// the returned sink never leaves that thread. The cancel flag is raised when
/// the session is stopped or paused; sinks may use it to abandon a blocked
/// write early.
pub trait AudioOutput: Send + Sync {
    fn open(&self, sample_rate: u32, cancel: CancelFlag) -> Result<Box<dyn AudioSink>, SinkError>;
}

/// An open output stream accepting mono 16-bit chunks.
pub trait AudioSink {
    /// Blocks until the whole chunk has been accepted by the device and
    /// returns how many samples were taken. Only a cancelled write may take
    /// fewer than `chunk.len()`.
    fn write(&mut self, chunk: &[i16]) -> Result<usize, SinkError>;

    /// Samples accepted by `write` that the device has not played yet.
    fn backlog(&self) -> usize {
        0
    }

    /// Blocks until everything written so far has been played.
    fn drain(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn close(self: Box<Self>);
}
