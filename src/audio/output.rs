use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};

use super::sink::{AudioOutput, AudioSink, CancelFlag};
use crate::error::SinkError;

/// Samples buffered between the delivery thread and the device callback
const RING_CAPACITY: usize = 4096;
const POLL_INTERVAL: Duration = Duration::from_millis(5);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// System audio output through cpal.
pub struct CpalOutput {
    device_name: Option<String>,
}

impl CpalOutput {
    /// `None` selects the host's default output device.
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn device(&self) -> Result<Device, SinkError> {
        let host = cpal::default_host();

        if let Some(name) = &self.device_name {
            let mut devices = host
                .output_devices()
                .map_err(|e| SinkError::Open(format!("Failed to enumerate devices: {}", e)))?;
            if let Some(device) = devices.find(|d| d.name().ok().as_ref() == Some(name)) {
                return Ok(device);
            }
            tracing::warn!("Output device '{}' not found, falling back to default", name);
        }

        host.default_output_device().ok_or(SinkError::NoDevice)
    }
}

impl AudioOutput for CpalOutput {
    fn open(&self, sample_rate: u32, cancel: CancelFlag) -> Result<Box<dyn AudioSink>, SinkError> {
        let device = self.device()?;
        let (config, format) = best_config(&device, sample_rate)?;

        let (producer, consumer) = HeapRb::<i16>::new(RING_CAPACITY).split();
        let failed = Arc::new(AtomicBool::new(false));

        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, sample_rate, consumer, &failed)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, sample_rate, consumer, &failed)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, sample_rate, consumer, &failed)?,
            other => return Err(SinkError::UnsupportedFormat(format!("{:?}", other))),
        };
        stream
            .play()
            .map_err(|e| SinkError::Open(format!("Failed to start stream: {}", e)))?;

        tracing::debug!(
            "Opened output stream: {}Hz source, {}Hz device, {} channels, {:?}",
            sample_rate,
            config.sample_rate.0,
            config.channels,
            format
        );

        Ok(Box::new(CpalSink {
            stream,
            producer,
            cancel,
            failed,
        }))
    }
}

struct CpalSink {
    stream: Stream,
    producer: HeapProd<i16>,
    cancel: CancelFlag,
    failed: Arc<AtomicBool>,
}

impl CpalSink {
    fn check_stream(&self) -> Result<(), SinkError> {
        if self.failed.load(Ordering::SeqCst) {
            return Err(SinkError::Write("output stream reported an error".into()));
        }
        Ok(())
    }
}

impl AudioSink for CpalSink {
    fn write(&mut self, chunk: &[i16]) -> Result<usize, SinkError> {
        let mut offset = 0;
        while offset < chunk.len() {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(offset);
            }
            self.check_stream()?;

            offset += self.producer.push_slice(&chunk[offset..]);
            if offset < chunk.len() {
                std::thread::sleep(POLL_INTERVAL);
            }
        }
        Ok(offset)
    }

    fn backlog(&self) -> usize {
        self.producer.occupied_len()
    }

    fn drain(&mut self) -> Result<(), SinkError> {
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while self.producer.occupied_len() > 0 {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(());
            }
            self.check_stream()?;
            if Instant::now() >= deadline {
                tracing::warn!("Output device stalled with {} samples queued", self.producer.occupied_len());
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    fn close(self: Box<Self>) {
        if let Err(e) = self.stream.pause() {
            tracing::debug!("Failed to pause output stream: {}", e);
        }
    }
}

/// Names of the available output devices
pub fn list_output_devices() -> anyhow::Result<Vec<String>> {
    let host = cpal::default_host();
    let devices: Vec<String> = host
        .output_devices()?
        .filter_map(|device| device.name().ok())
        .collect();
    tracing::debug!("Found {} output devices", devices.len());
    Ok(devices)
}

/// Prefer a config running at the source rate so no conversion happens in the
/// callback; otherwise take the device default.
fn best_config(device: &Device, sample_rate: u32) -> Result<(StreamConfig, SampleFormat), SinkError> {
    let supported = device
        .supported_output_configs()
        .map_err(|e| SinkError::Open(format!("Failed to get device configs: {}", e)))?
        .filter(|c| c.min_sample_rate().0 <= sample_rate && c.max_sample_rate().0 >= sample_rate)
        .filter(|c| matches!(c.sample_format(), SampleFormat::F32 | SampleFormat::I16))
        .min_by_key(|c| c.channels());

    if let Some(config) = supported {
        let format = config.sample_format();
        return Ok((config.with_sample_rate(cpal::SampleRate(sample_rate)).config(), format));
    }

    let config = device
        .default_output_config()
        .map_err(|e| SinkError::Open(format!("Failed to get default config: {}", e)))?;
    let format = config.sample_format();
    Ok((config.config(), format))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    source_rate: u32,
    mut consumer: HeapCons<i16>,
    failed: &Arc<AtomicBool>,
) -> Result<Stream, SinkError>
where
    T: SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let mut adapter = RateAdapter::new(source_rate, config.sample_rate.0);
    let error_flag = Arc::clone(failed);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let value = T::from_sample(adapter.next_sample(&mut consumer));
                    frame.fill(value);
                }
            },
            move |err| {
                tracing::error!("Audio output stream error: {}", err);
                error_flag.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| SinkError::Open(format!("Failed to build stream: {}", e)))
}

/// Linear interpolation from the source rate to the device rate.
struct RateAdapter {
    step: f64,
    phase: f64,
    current: f32,
    next: f32,
}

impl RateAdapter {
    fn new(source_rate: u32, device_rate: u32) -> Self {
        Self {
            step: source_rate as f64 / device_rate.max(1) as f64,
            // Two pops prime `current` and `next`.
            phase: 2.0,
            current: 0.0,
            next: 0.0,
        }
    }

    fn next_sample<S: Consumer<Item = i16>>(&mut self, source: &mut S) -> f32 {
        while self.phase >= 1.0 {
            match source.try_pop() {
                Some(sample) => {
                    self.current = self.next;
                    self.next = sample as f32 / 32768.0;
                    self.phase -= 1.0;
                }
                // Underrun: emit silence and hold position.
                None => return 0.0,
            }
        }
        let out = self.current + (self.next - self.current) * self.phase as f32;
        self.phase += self.step;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_adapter(adapter: &mut RateAdapter, cons: &mut HeapCons<i16>, n: usize) -> Vec<f32> {
        (0..n).map(|_| adapter.next_sample(cons)).collect()
    }

    #[test]
    fn matching_rates_pass_samples_through() {
        let (mut prod, mut cons) = HeapRb::<i16>::new(16).split();
        prod.push_slice(&[0, 16384, -16384, 8192]);

        let mut adapter = RateAdapter::new(22050, 22050);
        let out = drain_adapter(&mut adapter, &mut cons, 3);
        assert_eq!(out, vec![0.0, 0.5, -0.5]);
    }

    #[test]
    fn doubled_device_rate_interpolates_midpoints() {
        let (mut prod, mut cons) = HeapRb::<i16>::new(16).split();
        prod.push_slice(&[0, 16384, 0]);

        let mut adapter = RateAdapter::new(22050, 44100);
        let out = drain_adapter(&mut adapter, &mut cons, 4);
        assert_eq!(out, vec![0.0, 0.25, 0.5, 0.25]);
    }

    #[test]
    fn underrun_yields_silence_without_losing_samples() {
        let (mut prod, mut cons) = HeapRb::<i16>::new(16).split();
        let mut adapter = RateAdapter::new(22050, 22050);

        assert_eq!(adapter.next_sample(&mut cons), 0.0);
        prod.push_slice(&[16384, 16384, 16384]);
        assert_eq!(adapter.next_sample(&mut cons), 0.5);
    }
}
