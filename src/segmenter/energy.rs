use super::framing::{FrameClassifier, FrameSegmenter, Voicing};
use crate::Result;
use crate::opts::SegmenterOpts;

/// Classifies frames by root-mean-square energy against a fixed threshold.
#[derive(Debug, Clone, Copy)]
pub struct EnergyClassifier {
    threshold: f32,
}

impl EnergyClassifier {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl FrameClassifier for EnergyClassifier {
    fn classify(&mut self, frame: &[f32]) -> Result<Voicing> {
        if rms(frame) > self.threshold {
            Ok(Voicing::Voiced)
        } else {
            Ok(Voicing::Silent)
        }
    }
}

/// Energy-threshold segmenter: works at any sample rate, needs no model.
pub type EnergySegmenter = FrameSegmenter<EnergyClassifier>;

impl FrameSegmenter<EnergyClassifier> {
    pub fn new(opts: &SegmenterOpts, sample_rate: u32) -> Result<Self> {
        Self::with_classifier(
            EnergyClassifier::new(opts.voiced_threshold),
            opts,
            sample_rate,
        )
    }
}

/// Root mean square of a frame. Empty frames have zero energy.
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = frame.iter().map(|s| s * s).sum();
    (sum_sq / frame.len() as f32).sqrt()
}
