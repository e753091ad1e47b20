//! Capture device contract.
//!
//! The session owns exactly one capture device. The device's own callback thread never
//! touches session state: it turns raw device buffers into mono chunks at the segmenter
//! rate (via [`CaptureFeed`]) and sends them into the session's event queue.

use crate::Result;
use crate::resample::{MonoResampler, downmix_to_mono};

/// A microphone (or anything that behaves like one).
pub trait CaptureDevice {
    /// Acquire the device and begin delivering samples.
    fn start(&mut self) -> Result<()>;

    /// Stop delivering samples and release the device. Must be idempotent.
    fn release(&mut self);

    fn is_active(&self) -> bool;
}

/// Converts interleaved device buffers into mono chunks at the segmenter rate.
#[derive(Debug)]
pub struct CaptureFeed {
    channels: usize,
    resampler: MonoResampler,
}

impl CaptureFeed {
    pub fn new(device_rate: u32, channels: u16, target_rate: u32) -> Result<Self> {
        Ok(Self {
            channels: channels.max(1) as usize,
            resampler: MonoResampler::new(device_rate, target_rate)?,
        })
    }

    /// Feed one interleaved device buffer; returns the mono samples ready so far.
    pub fn feed(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        let mono = downmix_to_mono(interleaved, self.channels);
        let mut ready = Vec::new();
        self.resampler
            .push(&mono, |chunk| ready.extend_from_slice(chunk))?;
        Ok(ready)
    }

    /// Flush whatever the resampler still holds.
    pub fn finish(&mut self) -> Result<Vec<f32>> {
        let mut ready = Vec::new();
        self.resampler
            .finalize(|chunk| ready.extend_from_slice(chunk))?;
        Ok(ready)
    }

    pub fn target_rate(&self) -> u32 {
        self.resampler.target_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_at_target_rate_is_only_downmixed() -> anyhow::Result<()> {
        let mut feed = CaptureFeed::new(16_000, 2, 16_000)?;
        let out = feed.feed(&[0.2, 0.4, -0.2, -0.4])?;
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert!((out[1] + 0.3).abs() < 1e-6);
        assert!(feed.finish()?.is_empty());
        Ok(())
    }

    #[test]
    fn zero_channels_are_treated_as_mono() -> anyhow::Result<()> {
        let mut feed = CaptureFeed::new(16_000, 0, 16_000)?;
        assert_eq!(feed.feed(&[0.5, 0.25])?, vec![0.5, 0.25]);
        Ok(())
    }
}
