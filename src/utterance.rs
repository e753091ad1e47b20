use std::time::Duration;

/// A finalized piece of captured speech.
///
/// Immutable once built: the segmenter hands it off by value and the encoder consumes it
/// by reference, so nobody can append to an utterance after its `End` event.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Utterance {
    /// Wrap mono samples normalized to `[-1.0, 1.0]`.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}
