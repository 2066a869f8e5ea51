use crate::{ReadalongError, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::time::Duration;
use tracing::debug;

/// Streaming mono resampler between a device rate and the wire rate
///
/// Input is buffered until a full chunk is available, so consecutive calls
/// produce continuous audio. Equal rates pass samples straight through.
pub struct AudioResampler {
    resampler: Option<SincFixedIn<f32>>,
    pending: Vec<f32>,
    chunk_size: usize,
    input_rate: u32,
    output_rate: u32,
}

impl AudioResampler {
    /// Create a resampler consuming `chunk_size` input samples per step
    pub fn new(input_rate: u32, output_rate: u32, chunk_size: usize) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(ReadalongError::ConfigError(
                "Sample rates must be greater than 0".into(),
            ));
        }
        if chunk_size == 0 {
            return Err(ReadalongError::ConfigError(
                "Chunk size must be greater than 0".into(),
            ));
        }

        let resampler = if input_rate == output_rate {
            None
        } else {
            let params = SincInterpolationParameters {
                sinc_len: 128,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 128,
                window: WindowFunction::BlackmanHarris2,
            };
            let ratio = output_rate as f64 / input_rate as f64;
            let resampler = SincFixedIn::<f32>::new(ratio, 1.1, params, chunk_size, 1)
                .map_err(|e| {
                    ReadalongError::AudioProcessingError(format!(
                        "Failed to create resampler: {}",
                        e
                    ))
                })?;
            debug!(
                "Created resampler: {} Hz -> {} Hz, chunk {}",
                input_rate, output_rate, chunk_size
            );
            Some(resampler)
        };

        Ok(Self {
            resampler,
            pending: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            input_rate,
            output_rate,
        })
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Feed samples and return whatever full chunks produced
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(input.to_vec());
        };

        self.pending.extend_from_slice(input);
        let mut output = Vec::new();
        let mut offset = 0;
        while self.pending.len() - offset >= self.chunk_size {
            let chunk = &self.pending[offset..offset + self.chunk_size];
            let planar = resampler
                .process(&[chunk], None)
                .map_err(|e| {
                    ReadalongError::AudioProcessingError(format!("Resampling failed: {}", e))
                })?;
            output.extend_from_slice(&planar[0]);
            offset += self.chunk_size;
        }
        self.pending.drain(..offset);
        Ok(output)
    }

    /// Resample the buffered remainder, zero-padded to a full chunk
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(Vec::new());
        };
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }

        let remaining = self.pending.len();
        let mut chunk = std::mem::take(&mut self.pending);
        chunk.resize(self.chunk_size, 0.0);
        let planar = resampler
            .process(&[&chunk[..]], None)
            .map_err(|e| ReadalongError::AudioProcessingError(format!("Resampling failed: {}", e)))?;

        let ratio = self.output_rate as f64 / self.input_rate as f64;
        let keep = ((remaining as f64) * ratio).ceil() as usize;
        Ok(planar[0][..keep.min(planar[0].len())].to_vec())
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }
}

/// Resample a whole buffer in one step
pub fn resample_audio(input: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>> {
    if input_rate == output_rate {
        return Ok(input.to_vec());
    }
    let mut resampler = AudioResampler::new(input_rate, output_rate, 1024)?;
    let mut output = resampler.process(input)?;
    output.extend(resampler.flush()?);
    Ok(output)
}

/// Device frame where a time on the output timeline falls
pub fn frame_at(at: Duration, rate: u32) -> u64 {
    (at.as_secs_f64() * rate as f64).round() as u64
}

/// Resample a chunk scheduled at `at` and fit it to its device frame span
///
/// The span runs from `frame_at(at)` to `frame_at(at + duration)`, where
/// `duration` is the chunk's length at its own rate. A chunk that starts where
/// the previous one ends therefore starts on the frame the previous one ends
/// on, whatever the resampler's own output length.
pub fn resample_to_span(
    input: &[f32],
    input_rate: u32,
    output_rate: u32,
    at: Duration,
) -> Result<(u64, Vec<f32>)> {
    if input_rate == 0 {
        return Err(ReadalongError::AudioProcessingError(
            "Chunk sample rate must be greater than 0".into(),
        ));
    }
    let duration = Duration::from_secs_f64(input.len() as f64 / input_rate as f64);
    let start = frame_at(at, output_rate);
    let end = frame_at(at + duration, output_rate);

    let mut output = resample_audio(input, input_rate, output_rate)?;
    output.resize(end.saturating_sub(start) as usize, 0.0);
    Ok((start, output))
}
