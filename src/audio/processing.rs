use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::engine::AudioBuffer;
use crate::error::PlaybackError;

pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

const SINC_LEN: usize = 128;

/// Reject speeds outside `[MIN_SPEED, MAX_SPEED]`. Never clamps.
pub fn validate_speed(speed: f32) -> Result<f32, PlaybackError> {
    if speed.is_finite() && (MIN_SPEED..=MAX_SPEED).contains(&speed) {
        Ok(speed)
    } else {
        Err(PlaybackError::InvalidSpeed(speed))
    }
}

/// Produce a new buffer that plays `speed` times faster at the same sample rate.
///
/// The result holds `round(len / speed)` samples. Unit speed returns an
/// untouched copy so the original samples survive bit-exact.
pub fn change_speed(buffer: &AudioBuffer, speed: f32) -> Result<AudioBuffer, PlaybackError> {
    let speed = validate_speed(speed)?;
    if speed == 1.0 || buffer.is_empty() {
        return Ok(buffer.clone());
    }

    let target_len = (buffer.len() as f64 / speed as f64).round() as usize;
    let input = to_f32(&buffer.samples);
    let stretched = resample(&input, 1.0 / speed as f64, target_len)?;

    tracing::debug!(
        "Resampled {} samples to {} for {}x playback",
        buffer.len(),
        stretched.len(),
        speed
    );
    Ok(AudioBuffer::new(to_i16(&stretched), buffer.sample_rate))
}

/// Band-limited resampling of a mono signal by `ratio` (output / input),
/// trimmed or zero-padded to exactly `target_len` samples.
pub fn resample(samples: &[f32], ratio: f64, target_len: usize) -> Result<Vec<f32>, PlaybackError> {
    if samples.is_empty() || target_len == 0 {
        return Ok(vec![0.0; target_len]);
    }

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        1.0,
        params,
        samples.len(),
        1, // mono
    )
    .map_err(|e| PlaybackError::Resample(e.to_string()))?;

    let input = vec![samples.to_vec()];
    let mut output = resampler
        .process(&input, None)
        .map_err(|e| PlaybackError::Resample(e.to_string()))?
        .into_iter()
        .next()
        .unwrap_or_default();

    // The sinc filter delays its output by half its length; push silence
    // through to flush the tail, then drop the leading delay.
    let flush = vec![vec![0.0f32; resampler.input_frames_next()]];
    let tail = resampler
        .process(&flush, None)
        .map_err(|e| PlaybackError::Resample(e.to_string()))?
        .into_iter()
        .next()
        .unwrap_or_default();
    output.extend(tail);

    let delay = (SINC_LEN as f64 / 2.0 * ratio).round() as usize;
    let mut trimmed: Vec<f32> = output.into_iter().skip(delay).take(target_len).collect();
    trimmed.resize(target_len, 0.0);
    Ok(trimmed)
}

pub fn to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

pub fn to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}
