//! Amplitude-envelope extraction for waveform visualization.
//!
//! Pure pipeline: decode raw bytes, average non-overlapping blocks across
//! all channels into a fixed number of scalars, then peak-normalize into
//! `[-1, 1]`. Stateless and deterministic.

use std::io::Cursor;

use rodio::{Decoder, Source};
use thiserror::Error;

/// Default number of envelope points.
pub const DEFAULT_OUTPUT_SAMPLES: usize = 1500;

/// Errors from envelope extraction.
#[derive(Error, Debug)]
pub enum SamplingError {
    #[error("Failed to decode audio: {0}")]
    DecodeFailed(String),

    #[error("Audio too short: {frames} frame(s) cannot fill {output_samples} envelope point(s)")]
    TooShort {
        frames: usize,
        output_samples: usize,
    },

    #[error("Requested an empty envelope")]
    NoOutputSamples,
}

/// Result type for envelope extraction.
pub type SamplingResult<T> = Result<T, SamplingError>;

/// Decode `bytes` and produce a normalized amplitude envelope of
/// `output_samples` points.
pub fn decode_envelope(bytes: &[u8], output_samples: usize) -> SamplingResult<Vec<f32>> {
    let decoder = Decoder::new(Cursor::new(bytes.to_vec()))
        .map_err(|e| SamplingError::DecodeFailed(e.to_string()))?;
    let channel_count = decoder.channels().max(1) as usize;

    let mut channels: Vec<Vec<f32>> = vec![Vec::new(); channel_count];
    for (i, sample) in decoder.enumerate() {
        channels[i % channel_count].push(sample);
    }

    let averaged = block_average(&channels, output_samples)?;
    Ok(normalize(averaged))
}

/// Average non-overlapping per-channel blocks, across all channels, into
/// `output_samples` scalars.
pub fn block_average(channels: &[Vec<f32>], output_samples: usize) -> SamplingResult<Vec<f32>> {
    if output_samples == 0 {
        return Err(SamplingError::NoOutputSamples);
    }
    let frames = channels.iter().map(|c| c.len()).min().unwrap_or(0);
    let block = frames / output_samples;
    if block == 0 {
        return Err(SamplingError::TooShort {
            frames,
            output_samples,
        });
    }

    let combined = (block * channels.len()) as f32;
    let mut envelope = Vec::with_capacity(output_samples);
    for i in 0..output_samples {
        let anchor = block * i;
        let mut total = 0.0f32;
        for channel in channels {
            for sample in &channel[anchor..anchor + block] {
                total += sample;
            }
        }
        envelope.push(total / combined);
    }
    Ok(envelope)
}

/// Scale values so the largest magnitude becomes 1.
///
/// All-zero input stays all-zero rather than dividing by zero.
pub fn normalize(mut values: Vec<f32>) -> Vec<f32> {
    let peak = values.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
    if peak == 0.0 {
        return values;
    }
    for value in &mut values {
        *value /= peak;
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_leaves_silence_as_zeros() {
        assert_eq!(normalize(vec![0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn normalize_divides_by_peak_magnitude() {
        assert_eq!(normalize(vec![1.0, -2.0, 4.0]), vec![0.25, -0.5, 1.0]);
    }

    #[test]
    fn normalize_handles_negative_peak() {
        assert_eq!(normalize(vec![-4.0, 2.0]), vec![-1.0, 0.5]);
    }

    #[test]
    fn block_average_combines_channels() {
        let channels = vec![vec![1.0, 1.0, 2.0, 2.0], vec![3.0, 3.0, 4.0, 4.0]];
        let envelope = block_average(&channels, 2).unwrap();
        assert_eq!(envelope, vec![2.0, 3.0]);
    }

    #[test]
    fn block_average_drops_trailing_remainder() {
        let channels = vec![vec![1.0, 1.0, 1.0, 1.0, 9.0]];
        let envelope = block_average(&channels, 2).unwrap();
        assert_eq!(envelope, vec![1.0, 1.0]);
    }

    #[test]
    fn too_short_input_is_an_error() {
        let channels = vec![vec![1.0, 2.0]];
        assert!(matches!(
            block_average(&channels, 3),
            Err(SamplingError::TooShort {
                frames: 2,
                output_samples: 3
            })
        ));
        assert!(matches!(
            block_average(&[], 3),
            Err(SamplingError::TooShort { frames: 0, .. })
        ));
    }

    #[test]
    fn zero_output_samples_is_an_error() {
        assert!(matches!(
            block_average(&[vec![1.0]], 0),
            Err(SamplingError::NoOutputSamples)
        ));
    }
}
