#![allow(dead_code)]

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use read_aloud_lib::audio::{AudioOutput, AudioSink, CancelFlag};
use read_aloud_lib::engine::AudioBuffer;
use read_aloud_lib::error::SinkError;

pub const RATE: u32 = 22050;

#[derive(Default)]
struct Record {
    /// Samples the device may play in total; `None` is unlimited
    budget: Option<usize>,
    /// Samples the device queues ahead of what it has played
    depth: usize,
    accepted: usize,
    heard: Vec<i16>,
    opens: usize,
    closes: usize,
    active: usize,
    max_active: usize,
    fail_writes: bool,
}

impl Record {
    fn backlog(&self) -> usize {
        self.budget.map_or(0, |b| self.accepted.saturating_sub(b))
    }
}

struct Shared {
    record: Mutex<Record>,
    changed: Condvar,
}

/// Scripted output device. The budget is how much the device has played;
/// writes block once they get more than `depth` samples ahead of it, so tests
/// decide exactly how far playback gets. Queued samples are lost on close.
#[derive(Clone)]
pub struct MockOutput {
    shared: Arc<Shared>,
}

impl MockOutput {
    pub fn unlimited() -> Self {
        Self::with_budget(None, 0)
    }

    pub fn gated() -> Self {
        Self::with_budget(Some(0), 0)
    }

    /// Gated device that queues up to `depth` samples before playing them.
    pub fn buffering(depth: usize) -> Self {
        Self::with_budget(Some(0), depth)
    }

    fn with_budget(budget: Option<usize>, depth: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                record: Mutex::new(Record {
                    budget,
                    depth,
                    ..Record::default()
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// Let `samples` more samples through.
    pub fn allow(&self, samples: usize) {
        let mut record = self.shared.record.lock();
        record.budget = record.budget.map(|b| b + samples);
        self.shared.changed.notify_all();
    }

    pub fn open_gate(&self) {
        self.shared.record.lock().budget = None;
        self.shared.changed.notify_all();
    }

    pub fn fail_writes(&self) {
        self.shared.record.lock().fail_writes = true;
        self.shared.changed.notify_all();
    }

    pub fn accepted(&self) -> usize {
        self.shared.record.lock().accepted
    }

    /// Everything the device played or still holds queued, in order.
    pub fn samples(&self) -> Vec<i16> {
        self.shared.record.lock().heard.clone()
    }

    pub fn opens(&self) -> usize {
        self.shared.record.lock().opens
    }

    pub fn closes(&self) -> usize {
        self.shared.record.lock().closes
    }

    pub fn max_active(&self) -> usize {
        self.shared.record.lock().max_active
    }
}

impl AudioOutput for MockOutput {
    fn open(&self, _sample_rate: u32, cancel: CancelFlag) -> Result<Box<dyn AudioSink>, SinkError> {
        let mut record = self.shared.record.lock();
        record.opens += 1;
        record.active += 1;
        record.max_active = record.max_active.max(record.active);
        Ok(Box::new(MockSink {
            shared: Arc::clone(&self.shared),
            cancel,
        }))
    }
}

struct MockSink {
    shared: Arc<Shared>,
    cancel: CancelFlag,
}

impl AudioSink for MockSink {
    fn write(&mut self, chunk: &[i16]) -> Result<usize, SinkError> {
        let mut record = self.shared.record.lock();
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(0);
            }
            if record.fail_writes {
                return Err(SinkError::Write("device unplugged".into()));
            }
            let limit = record.budget.map(|b| b + record.depth);
            if limit.map_or(true, |l| record.accepted + chunk.len() <= l) {
                break;
            }
            // The cancel flag cannot signal the condvar; poll it.
            self.shared
                .changed
                .wait_for(&mut record, Duration::from_millis(2));
        }
        record.accepted += chunk.len();
        record.heard.extend_from_slice(chunk);
        self.shared.changed.notify_all();
        Ok(chunk.len())
    }

    fn backlog(&self) -> usize {
        self.shared.record.lock().backlog()
    }

    fn close(self: Box<Self>) {
        let mut record = self.shared.record.lock();
        let dropped = record.backlog();
        record.accepted -= dropped;
        let heard = record.heard.len() - dropped;
        record.heard.truncate(heard);
        record.closes += 1;
        record.active -= 1;
        self.shared.changed.notify_all();
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Non-decreasing samples so delivery order can be checked.
pub fn ramp(len: usize) -> AudioBuffer {
    let samples = (0..len).map(|i| (i / 2) as i16).collect();
    AudioBuffer::new(samples, RATE)
}

pub fn tone(len: usize) -> AudioBuffer {
    let samples = (0..len)
        .map(|i| ((i as f32 * 0.05).sin() * 12000.0) as i16)
        .collect();
    AudioBuffer::new(samples, RATE)
}
