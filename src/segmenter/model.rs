use super::framing::{FrameClassifier, FrameSegmenter, Voicing};
use crate::opts::SegmenterOpts;
use crate::{Error, Result};

/// Sample rate every speech-probability model in this crate is trained for.
pub const MODEL_SAMPLE_RATE: u32 = 16_000;

/// Source of per-frame speech probabilities in `[0, 1]`.
///
/// The model's internals are opaque to the segmenter; only this contract matters.
/// Any `FnMut(&[f32]) -> Result<f32>` closure is a `SpeechProbability`, which keeps tests
/// and alternative model runtimes cheap to plug in.
pub trait SpeechProbability {
    fn probability(&mut self, frame: &[f32]) -> Result<f32>;

    fn reset(&mut self) {}
}

impl<F> SpeechProbability for F
where
    F: FnMut(&[f32]) -> Result<f32>,
{
    fn probability(&mut self, frame: &[f32]) -> Result<f32> {
        self(frame)
    }
}

/// Hysteresis over a speech-probability model.
///
/// - `p >= positive` → voiced
/// - `p < negative` → silent
/// - anything in between keeps the previous classification
pub struct ModelClassifier<P> {
    model: P,
    positive: f32,
    negative: f32,
}

impl<P: SpeechProbability> ModelClassifier<P> {
    pub fn new(model: P, positive: f32, negative: f32) -> Self {
        Self {
            model,
            positive,
            negative,
        }
    }
}

impl<P: SpeechProbability> FrameClassifier for ModelClassifier<P> {
    fn classify(&mut self, frame: &[f32]) -> Result<Voicing> {
        let p = self.model.probability(frame)?;
        if !p.is_finite() {
            return Err(Error::msg(format!("speech model returned {p}")));
        }

        Ok(if p >= self.positive {
            Voicing::Voiced
        } else if p < self.negative {
            Voicing::Silent
        } else {
            Voicing::Uncertain
        })
    }

    fn reset(&mut self) {
        self.model.reset();
    }
}

/// Speech-probability segmenter. Requires 16 kHz input.
pub type ModelSegmenter<P> = FrameSegmenter<ModelClassifier<P>>;

impl<P: SpeechProbability> FrameSegmenter<ModelClassifier<P>> {
    pub fn new(model: P, opts: &SegmenterOpts, sample_rate: u32) -> Result<Self> {
        if sample_rate != MODEL_SAMPLE_RATE {
            return Err(Error::Config(format!(
                "model segmenter requires {MODEL_SAMPLE_RATE} Hz input, got {sample_rate} Hz"
            )));
        }

        Self::with_classifier(
            ModelClassifier::new(model, opts.positive_threshold, opts.negative_threshold),
            opts,
            sample_rate,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::{SegmentEvent, Segmenter};

    const FRAME: usize = 320;

    fn opts() -> SegmenterOpts {
        SegmenterOpts {
            min_payload_bytes: 0,
            silence_hangover_ms: 100,
            ..SegmenterOpts::default()
        }
    }

    /// A fake model that reads the probability straight out of the first sample.
    fn first_sample(frame: &[f32]) -> Result<f32> {
        Ok(frame.first().copied().unwrap_or(0.0))
    }

    fn frames(probabilities: &[f32]) -> Vec<f32> {
        probabilities
            .iter()
            .flat_map(|&p| std::iter::repeat_n(p, FRAME))
            .collect()
    }

    #[test]
    fn rejects_non_16k_input() {
        let err = ModelSegmenter::new(first_sample, &opts(), 48_000).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn hysteresis_keeps_previous_classification() -> anyhow::Result<()> {
        let mut classifier = ModelClassifier::new(first_sample, 0.65, 0.5);
        assert_eq!(classifier.classify(&[0.9])?, Voicing::Voiced);
        assert_eq!(classifier.classify(&[0.6])?, Voicing::Uncertain);
        assert_eq!(classifier.classify(&[0.65])?, Voicing::Voiced);
        assert_eq!(classifier.classify(&[0.49])?, Voicing::Silent);
        Ok(())
    }

    #[test]
    fn uncertain_frames_extend_speech() -> anyhow::Result<()> {
        let mut seg = ModelSegmenter::new(first_sample, &opts(), MODEL_SAMPLE_RATE)?;
        let mut events = Vec::new();

        // 100 ms hangover = 5 frames. Uncertain frames after speech keep rearming it.
        seg.push(&frames(&[0.1, 0.9, 0.6, 0.6, 0.6, 0.6, 0.6, 0.6]), &mut events)?;
        assert!(matches!(events.as_slice(), [SegmentEvent::Start]));

        seg.push(&frames(&[0.2; 5]), &mut events)?;
        let Some(SegmentEvent::End { utterance }) = events.last() else {
            panic!("expected End, got {events:?}");
        };
        assert_eq!(utterance.len(), (7 + 5) * FRAME);
        Ok(())
    }

    #[test]
    fn uncertain_frames_do_not_start_speech() -> anyhow::Result<()> {
        let mut seg = ModelSegmenter::new(first_sample, &opts(), MODEL_SAMPLE_RATE)?;
        let mut events = Vec::new();
        seg.push(&frames(&[0.6; 20]), &mut events)?;
        assert!(events.is_empty());
        Ok(())
    }

    #[test]
    fn model_errors_propagate() -> anyhow::Result<()> {
        let failing = |_: &[f32]| -> Result<f32> { Err(Error::msg("model crashed")) };
        let mut seg = ModelSegmenter::new(failing, &opts(), MODEL_SAMPLE_RATE)?;
        let mut events = Vec::new();

        let err = seg.push(&frames(&[0.9]), &mut events).unwrap_err();
        assert!(err.to_string().contains("model crashed"));
        Ok(())
    }
}
