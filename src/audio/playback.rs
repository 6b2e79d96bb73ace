//! Playback controller for synthesized speech.
//!
//! One session at a time: a session owns the buffer being played (possibly
//! resampled for speed), the read position, and the delivery thread that feeds
//! the output device chunk by chunk. Control calls take a short lock and
//! return; only the delivery thread blocks on device I/O.
//!
//! The position counts samples the device has actually played, not samples
//! queued in its buffer, so a pause resumes exactly where the listener left off.
//!
//! Lock order is `control` -> `inner`. Delivery threads only take `inner` and
//! never call into the controller, so a control call may join a delivery
//! thread while holding `control`. A session's sink is closed before the
//! session is released, which keeps at most one sink open at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::processing::{self, validate_speed};
use super::sink::{AudioOutput, AudioSink, CancelFlag};
use crate::engine::AudioBuffer;
use crate::error::PlaybackError;

pub const DEFAULT_CHUNK_SAMPLES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::Stopped
    }
}

pub type CompletionCallback = Box<dyn FnMut() + Send + 'static>;
pub type ErrorReceiver = mpsc::UnboundedReceiver<PlaybackError>;

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Samples handed to the output per write
    pub chunk_samples: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            chunk_samples: DEFAULT_CHUNK_SAMPLES,
        }
    }
}

struct Worker {
    id: u64,
    cancel: CancelFlag,
    /// Yields the played position when the worker was halted
    handle: JoinHandle<Option<usize>>,
}

impl Worker {
    fn halt(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn join(self) -> Option<usize> {
        match self.handle.join() {
            Ok(played) => played,
            Err(_) => {
                tracing::error!("Delivery thread {} panicked", self.id);
                None
            }
        }
    }
}

struct Session {
    original: Arc<AudioBuffer>,
    active: Arc<AudioBuffer>,
    speed: f32,
    /// Index into `active` of the next sample the listener will hear
    position: usize,
    worker: Option<Worker>,
}

impl Session {
    fn is_driven_by(&self, id: u64) -> bool {
        self.worker.as_ref().map(|w| w.id) == Some(id)
    }
}

struct Inner {
    state: PlaybackState,
    speed: f32,
    session: Option<Session>,
    last_buffer: Option<Arc<AudioBuffer>>,
    next_worker_id: u64,
}

/// Natural end of a session, handed to the notifier thread.
struct Finished;

enum Outcome {
    Finished,
    /// Halted with this many samples of the buffer played
    Cancelled(usize),
    Failed(PlaybackError),
}

struct Shared {
    inner: Mutex<Inner>,
    output: Arc<dyn AudioOutput>,
    chunk_samples: usize,
    finished: mpsc::UnboundedSender<Finished>,
    errors: mpsc::UnboundedSender<PlaybackError>,
}

impl Shared {
    fn spawn_worker(self: &Arc<Self>, inner: &mut Inner) -> Result<(), PlaybackError> {
        let id = inner.next_worker_id;
        inner.next_worker_id += 1;

        let session = inner.session.as_mut().ok_or(PlaybackError::NoActiveBuffer)?;
        let cancel: CancelFlag = Arc::new(AtomicBool::new(false));
        let active = Arc::clone(&session.active);
        let start = session.position;

        let shared = Arc::clone(self);
        let worker_cancel = Arc::clone(&cancel);
        let handle = thread::Builder::new()
            .name("playback-delivery".into())
            .spawn(move || shared.deliver(id, worker_cancel, active, start))?;

        session.worker = Some(Worker { id, cancel, handle });
        Ok(())
    }

    fn deliver(&self, id: u64, cancel: CancelFlag, active: Arc<AudioBuffer>, start: usize) -> Option<usize> {
        match self.stream(id, &cancel, &active, start) {
            Outcome::Finished => self.finish(id, &cancel),
            Outcome::Cancelled(played) => {
                tracing::debug!("Delivery {} cancelled at sample {}", id, played);
                return Some(played);
            }
            Outcome::Failed(err) => self.fail(id, &cancel, err),
        }
        None
    }

    fn stream(&self, id: u64, cancel: &CancelFlag, active: &AudioBuffer, start: usize) -> Outcome {
        if cancel.load(Ordering::SeqCst) {
            return Outcome::Cancelled(start);
        }

        let mut sink = match self.output.open(active.sample_rate, Arc::clone(cancel)) {
            Ok(sink) => sink,
            Err(e) => return Outcome::Failed(e.into()),
        };
        let outcome = self.pump(id, cancel, sink.as_mut(), active, start);
        sink.close();
        outcome
    }

    fn pump(
        &self,
        id: u64,
        cancel: &CancelFlag,
        sink: &mut dyn AudioSink,
        active: &AudioBuffer,
        start: usize,
    ) -> Outcome {
        let samples = &active.samples;
        let start = start.min(samples.len());
        // Samples handed to the sink so far; some may still be queued in it.
        let mut written = start;

        loop {
            if cancel.load(Ordering::SeqCst) {
                return Outcome::Cancelled(played(sink, written, start));
            }
            if written >= samples.len() {
                return match sink.drain() {
                    Ok(()) if cancel.load(Ordering::SeqCst) => Outcome::Cancelled(played(sink, written, start)),
                    Ok(()) => Outcome::Finished,
                    Err(e) => Outcome::Failed(e.into()),
                };
            }

            let end = (written + self.chunk_samples).min(samples.len());
            match sink.write(&samples[written..end]) {
                Ok(accepted) => written = (written + accepted).min(end),
                Err(e) => return Outcome::Failed(e.into()),
            }
            let position = played(sink, written, start);

            // Position only moves while this thread still owns the session.
            let mut inner = self.inner.lock();
            if cancel.load(Ordering::SeqCst) {
                return Outcome::Cancelled(position);
            }
            match inner.session.as_mut() {
                Some(session) if session.is_driven_by(id) => session.position = position,
                _ => return Outcome::Cancelled(position),
            }
        }
    }

    /// Tear down the session if this thread still owns it. Returns whether it did.
    fn release(&self, id: u64, cancel: &CancelFlag) -> bool {
        let mut inner = self.inner.lock();
        let owned = !cancel.load(Ordering::SeqCst)
            && inner.session.as_ref().is_some_and(|s| s.is_driven_by(id));
        if owned {
            // Dropping the session detaches our own join handle.
            inner.session = None;
            inner.state = PlaybackState::Stopped;
        }
        owned
    }

    fn finish(&self, id: u64, cancel: &CancelFlag) {
        if self.release(id, cancel) {
            tracing::info!("Playback completed");
            let _ = self.finished.send(Finished);
        }
    }

    fn fail(&self, id: u64, cancel: &CancelFlag, err: PlaybackError) {
        if self.release(id, cancel) {
            tracing::error!("Playback failed: {}", err);
            let _ = self.errors.send(err);
        } else {
            tracing::warn!("Output error after playback was halted: {}", err);
        }
    }
}

/// Thread-safe audio player with play/pause/resume/stop and speed control.
pub struct PlaybackController {
    shared: Arc<Shared>,
    control: Mutex<()>,
    on_complete: Arc<Mutex<Option<CompletionCallback>>>,
    error_rx: Mutex<Option<ErrorReceiver>>,
}

impl PlaybackController {
    pub fn new(output: Arc<dyn AudioOutput>, config: PlayerConfig) -> Result<Self, PlaybackError> {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let on_complete: Arc<Mutex<Option<CompletionCallback>>> = Arc::new(Mutex::new(None));

        spawn_notifier(finished_rx, Arc::clone(&on_complete))?;

        let chunk_samples = config.chunk_samples.max(1);
        tracing::info!("Initialized audio player (chunk size: {} samples)", chunk_samples);

        Ok(Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: PlaybackState::Stopped,
                    speed: 1.0,
                    session: None,
                    last_buffer: None,
                    next_worker_id: 0,
                }),
                output,
                chunk_samples,
                finished: finished_tx,
                errors: error_tx,
            }),
            control: Mutex::new(()),
            on_complete,
            error_rx: Mutex::new(Some(error_rx)),
        })
    }

    /// Replace whatever is playing with `buffer` at `speed`, from the start.
    ///
    /// Fails without touching the current session if `speed` is out of range.
    pub fn play(&self, buffer: AudioBuffer, speed: f32) -> Result<(), PlaybackError> {
        let speed = validate_speed(speed)?;
        self.start(Arc::new(buffer), speed)
    }

    /// Play the last buffer again from the start at the current speed.
    pub fn replay(&self) -> Result<(), PlaybackError> {
        let (buffer, speed) = {
            let inner = self.shared.inner.lock();
            let buffer = inner.last_buffer.clone().ok_or(PlaybackError::NoActiveBuffer)?;
            (buffer, inner.speed)
        };
        self.start(buffer, speed)
    }

    fn start(&self, original: Arc<AudioBuffer>, speed: f32) -> Result<(), PlaybackError> {
        let active = if speed == 1.0 {
            Arc::clone(&original)
        } else {
            Arc::new(processing::change_speed(&original, speed)?)
        };

        let _control = self.control.lock();
        self.teardown();

        let mut inner = self.shared.inner.lock();
        let samples = active.len();
        inner.speed = speed;
        inner.last_buffer = Some(Arc::clone(&original));
        inner.session = Some(Session {
            original,
            active,
            speed,
            position: 0,
            worker: None,
        });

        if let Err(e) = self.shared.spawn_worker(&mut inner) {
            inner.session = None;
            inner.state = PlaybackState::Stopped;
            return Err(e);
        }
        inner.state = PlaybackState::Playing;

        tracing::info!("Started playback of {} samples at {}x", samples, speed);
        Ok(())
    }

    /// Halt delivery, keeping buffer and position. No-op unless playing.
    pub fn pause(&self) {
        let _control = self.control.lock();
        let worker = {
            let mut inner = self.shared.inner.lock();
            if inner.state != PlaybackState::Playing {
                return;
            }
            inner.state = PlaybackState::Paused;
            let worker = inner.session.as_mut().and_then(|s| s.worker.take());
            if let Some(worker) = &worker {
                worker.halt();
            }
            worker
        };

        let played = worker.and_then(Worker::join);
        let mut inner = self.shared.inner.lock();
        if let Some(session) = inner.session.as_mut() {
            if let Some(played) = played {
                session.position = played;
            }
            tracing::info!("Paused playback at position {}", session.position);
        }
    }

    /// Continue delivery from the paused position. No-op unless paused.
    pub fn resume(&self) -> Result<(), PlaybackError> {
        let _control = self.control.lock();
        let mut inner = self.shared.inner.lock();
        if inner.state != PlaybackState::Paused {
            return Ok(());
        }

        if let Err(e) = self.shared.spawn_worker(&mut inner) {
            inner.session = None;
            inner.state = PlaybackState::Stopped;
            return Err(e);
        }
        inner.state = PlaybackState::Playing;

        if let Some(session) = &inner.session {
            tracing::info!("Resumed playback from position {}", session.position);
        }
        Ok(())
    }

    /// End the session from any state. Never fires the completion callback.
    pub fn stop(&self) {
        let _control = self.control.lock();
        self.teardown();
        tracing::info!("Stopped playback");
    }

    /// Set the speed for the next `play`.
    ///
    /// There is no real-time rate change: an active session is re-rendered
    /// from its original buffer and delivery restarts at the equivalent point
    /// of the content. A paused session stays paused.
    pub fn set_speed(&self, speed: f32) -> Result<(), PlaybackError> {
        let speed = validate_speed(speed)?;
        let _control = self.control.lock();

        let (original, old_speed) = {
            let mut inner = self.shared.inner.lock();
            let rerender = inner
                .session
                .as_ref()
                .filter(|s| s.speed != speed)
                .map(|s| (Arc::clone(&s.original), s.speed));
            match rerender {
                Some(found) => found,
                None => {
                    tracing::info!("Speed changed from {}x to {}x", inner.speed, speed);
                    inner.speed = speed;
                    return Ok(());
                }
            }
        };

        let active = if speed == 1.0 {
            Arc::clone(&original)
        } else {
            Arc::new(processing::change_speed(&original, speed)?)
        };

        let worker = {
            let mut inner = self.shared.inner.lock();
            inner.speed = speed;
            let worker = inner.session.as_mut().and_then(|s| s.worker.take());
            if let Some(worker) = &worker {
                worker.halt();
            }
            worker
        };
        let played = worker.and_then(Worker::join);

        let mut inner = self.shared.inner.lock();
        let restart = inner.state == PlaybackState::Playing;
        match inner.session.as_mut() {
            Some(session) => {
                if let Some(played) = played {
                    session.position = played;
                }
                let content = session.position as f64 * session.speed as f64;
                session.position = ((content / speed as f64).round() as usize).min(active.len());
                session.active = active;
                session.speed = speed;
            }
            // Finished on its own while we were resampling.
            None => return Ok(()),
        }

        if restart {
            if let Err(e) = self.shared.spawn_worker(&mut inner) {
                inner.session = None;
                inner.state = PlaybackState::Stopped;
                return Err(e);
            }
        }

        tracing::info!("Speed changed from {}x to {}x", old_speed, speed);
        Ok(())
    }

    /// Register the callback fired once per natural end of playback,
    /// replacing any previous one. It runs on a dedicated notifier thread
    /// after the session has been released.
    pub fn set_completion_callback<F>(&self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        *self.on_complete.lock() = Some(Box::new(callback));
    }

    /// Delivery failures, reported separately from completion. Available once.
    pub fn take_error_receiver(&self) -> Option<ErrorReceiver> {
        self.error_rx.lock().take()
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.inner.lock().state
    }

    /// Speed of the current session, or the one the next `play` will use.
    pub fn speed(&self) -> f32 {
        self.shared.inner.lock().speed
    }

    /// Seconds of audio delivered in the current session (listening time).
    pub fn get_position(&self) -> f64 {
        let inner = self.shared.inner.lock();
        inner.session.as_ref().map_or(0.0, |s| {
            samples_to_secs(s.position, s.active.sample_rate)
        })
    }

    /// Seconds of the original, unsped content consumed so far.
    pub fn content_position(&self) -> f64 {
        let inner = self.shared.inner.lock();
        inner.session.as_ref().map_or(0.0, |s| {
            samples_to_secs(s.position, s.active.sample_rate) * s.speed as f64
        })
    }

    /// Length of the active (speed-adjusted) buffer in seconds.
    pub fn get_duration(&self) -> f64 {
        let inner = self.shared.inner.lock();
        inner.session.as_ref().map_or(0.0, |s| s.active.duration_secs())
    }

    /// The last buffer handed to `play`, kept after the session ends.
    pub fn last_buffer(&self) -> Result<Arc<AudioBuffer>, PlaybackError> {
        self.shared
            .inner
            .lock()
            .last_buffer
            .clone()
            .ok_or(PlaybackError::NoActiveBuffer)
    }

    /// Caller must hold `control`.
    fn teardown(&self) {
        let worker = {
            let mut inner = self.shared.inner.lock();
            inner.state = PlaybackState::Stopped;
            let worker = inner.session.take().and_then(|mut s| s.worker.take());
            if let Some(worker) = &worker {
                worker.halt();
            }
            worker
        };

        if let Some(worker) = worker {
            worker.join();
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        let _control = self.control.lock();
        self.teardown();
    }
}

/// Samples of the buffer the listener has heard, given how many were written.
fn played(sink: &dyn AudioSink, written: usize, start: usize) -> usize {
    written.saturating_sub(sink.backlog()).max(start)
}

fn samples_to_secs(samples: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    samples as f64 / sample_rate as f64
}

fn spawn_notifier(
    mut finished: mpsc::UnboundedReceiver<Finished>,
    slot: Arc<Mutex<Option<CompletionCallback>>>,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name("playback-notify".into())
        .spawn(move || {
            while let Some(Finished) = finished.blocking_recv() {
                // Run outside the slot lock so the callback may re-register.
                let callback = slot.lock().take();
                if let Some(mut callback) = callback {
                    callback();
                    let mut slot = slot.lock();
                    if slot.is_none() {
                        *slot = Some(callback);
                    }
                }
            }
        })?;
    Ok(())
}
