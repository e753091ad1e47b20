//! Capture normalization for the segmenter.
//!
//! Responsibilities:
//! - Downmix interleaved device frames to mono
//! - Resample to the session's segmenter rate (when needed)
//! - Emit mono chunks via a callback as soon as full resampler blocks are available
//!
//! Notes:
//! - Microphones commonly run at 44.1 or 48 kHz while the model segmenter requires 16 kHz.
//! - `finalize()` should be called when capture stops to flush any remaining resampler input.

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::{Error, Result};

/// How many source frames we feed rubato per `process()` call.
///
/// Capture is latency-sensitive, so this is much smaller than a file-decoding block:
/// 512 frames is ~11 ms at 48 kHz.
const RESAMPLER_BLOCK_FRAMES: usize = 512;

/// A small stateful converter from device-rate mono audio to the segmenter rate.
pub struct MonoResampler {
    src_rate: u32,
    target_rate: u32,

    // `None` on the fast path (src_rate == target_rate).
    resampler: Option<SincFixedIn<f32>>,

    // Accumulator for mono source samples before feeding full blocks into rubato.
    pending: Vec<f32>,
}

impl std::fmt::Debug for MonoResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonoResampler")
            .field("src_rate", &self.src_rate)
            .field("target_rate", &self.target_rate)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl MonoResampler {
    pub fn new(src_rate: u32, target_rate: u32) -> Result<Self> {
        if src_rate == 0 || target_rate == 0 {
            return Err(Error::Config(format!(
                "cannot resample {src_rate} Hz -> {target_rate} Hz"
            )));
        }

        let resampler = if src_rate == target_rate {
            None
        } else {
            let rs = SincFixedIn::<f32>::new(
                target_rate as f64 / src_rate as f64,
                2.0,
                SincInterpolationParameters {
                    sinc_len: 128,
                    f_cutoff: 0.95,
                    interpolation: SincInterpolationType::Linear,
                    oversampling_factor: 128,
                    window: WindowFunction::BlackmanHarris2,
                },
                RESAMPLER_BLOCK_FRAMES,
                1, // mono
            )
            .map_err(|e| Error::Config(format!("failed to init resampler: {e}")))?;
            Some(rs)
        };

        Ok(Self {
            src_rate,
            target_rate,
            resampler,
            pending: Vec::new(),
        })
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Push mono samples at the source rate; `emit` receives samples at the target rate.
    pub fn push(&mut self, mono_src: &[f32], mut emit: impl FnMut(&[f32])) -> Result<()> {
        let Some(rs) = self.resampler.as_mut() else {
            // Fast path: already at the target sample rate.
            if !mono_src.is_empty() {
                emit(mono_src);
            }
            return Ok(());
        };

        self.pending.extend_from_slice(mono_src);

        let in_max = rs.input_frames_max();
        while self.pending.len() >= in_max {
            let block: Vec<f32> = self.pending.drain(..in_max).collect();
            let out = process_block(rs, block)?;
            if !out.is_empty() {
                emit(&out);
            }
        }

        Ok(())
    }

    /// Flush buffered input at end of capture.
    ///
    /// If resampling was never needed, this is a no-op.
    pub fn finalize(&mut self, mut emit: impl FnMut(&[f32])) -> Result<()> {
        let Some(rs) = self.resampler.as_mut() else {
            return Ok(());
        };
        if self.pending.is_empty() {
            return Ok(());
        }

        // rubato expects exact block sizes; pad the remainder with zeros.
        let in_max = rs.input_frames_max();
        let mut block = std::mem::take(&mut self.pending);
        block.resize(in_max, 0.0);

        let out = process_block(rs, block)?;
        if !out.is_empty() {
            emit(&out);
        }
        Ok(())
    }

    /// Drop buffered input and resampler history.
    pub fn reset(&mut self) {
        self.pending.clear();
        if let Some(rs) = self.resampler.as_mut() {
            rs.reset();
        }
    }
}

fn process_block(rs: &mut SincFixedIn<f32>, block: Vec<f32>) -> Result<Vec<f32>> {
    let input = vec![block];
    let mut out = rs
        .process(&input, None)
        .map_err(|e| Error::msg(format!("resampler process failed: {e}")))?;

    if out.len() != 1 {
        return Err(Error::msg("expected mono output from resampler"));
    }
    Ok(out.swap_remove(0))
}

/// Downmix interleaved samples into mono by averaging channels.
///
/// Policy: equal-weight average across channels (simple, predictable).
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_is_noop_without_resampler() -> anyhow::Result<()> {
        let mut rs = MonoResampler::new(16_000, 16_000)?;
        let mut called = false;
        rs.finalize(|_| called = true)?;
        assert!(!called);
        Ok(())
    }

    #[test]
    fn matching_rates_pass_samples_through() -> anyhow::Result<()> {
        let mut rs = MonoResampler::new(16_000, 16_000)?;
        let mut seen = Vec::new();
        rs.push(&[0.1, 0.2, 0.3], |chunk| seen.extend_from_slice(chunk))?;
        assert_eq!(seen, vec![0.1, 0.2, 0.3]);
        Ok(())
    }

    #[test]
    fn downmix_to_mono_single_channel_is_identity() {
        let input = vec![0.0, 1.0, -1.0];
        assert_eq!(downmix_to_mono(&input, 1), input);
    }

    #[test]
    fn downmix_to_mono_averages_channels() {
        // Two frames of stereo: (L=1, R=3), (L=-1, R=1) => mono: 2, 0
        let interleaved = vec![1.0, 3.0, -1.0, 1.0];
        assert_eq!(downmix_to_mono(&interleaved, 2), vec![2.0, 0.0]);
    }

    #[test]
    fn zero_rate_is_rejected() {
        let err = MonoResampler::new(0, 16_000).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn downsampling_roughly_preserves_duration() -> anyhow::Result<()> {
        let mut rs = MonoResampler::new(48_000, 16_000)?;
        let src = vec![0.0; 48_000];

        let mut emitted = 0usize;
        rs.push(&src, |chunk| emitted += chunk.len())?;
        rs.finalize(|chunk| emitted += chunk.len())?;

        // One second in, about one second out (rubato adds a little delay padding).
        assert!(emitted > 15_000, "emitted {emitted}");
        assert!(emitted < 17_000, "emitted {emitted}");
        Ok(())
    }
}
