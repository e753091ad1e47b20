//! Speech segmentation: continuous samples in, discrete utterance boundaries out.
//!
//! A segmenter consumes the capture stream chunk by chunk and reports:
//! - `Start` when speech begins
//! - `End { utterance }` once silence has lasted the configured hangover
//! - `Discarded { samples }` when the finished utterance is too short to be worth sending
//!
//! Two strategies share one frame-based engine ([`FrameSegmenter`]) and differ only in how
//! a single frame is classified:
//! - [`EnergySegmenter`]: RMS against a fixed threshold
//! - [`ModelSegmenter`]: speech probability from a model, with hysteresis
//!
//! The session picks one at start-up via [`from_opts`] and only ever sees `dyn Segmenter`.

mod energy;
mod framing;
mod model;
mod timer;
#[cfg(feature = "whisper-vad")]
mod whisper;

use std::collections::VecDeque;

pub use energy::{EnergyClassifier, EnergySegmenter, rms};
pub use framing::{FrameClassifier, FrameSegmenter, Voicing};
pub use model::{MODEL_SAMPLE_RATE, ModelClassifier, ModelSegmenter, SpeechProbability};
pub use timer::SilenceTimer;
#[cfg(feature = "whisper-vad")]
pub use whisper::WhisperVadProbability;

use crate::opts::{SegmenterKind, SessionOpts};
use crate::utterance::Utterance;
use crate::{Error, Result};

/// Utterance boundary reported by a segmenter.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentEvent {
    Start,
    End { utterance: Utterance },
    /// Speech ended but the capture was too short to send.
    Discarded { samples: usize },
}

/// The event contract both segmentation strategies satisfy.
///
/// Contract:
/// - `Start` and `End`/`Discarded` strictly alternate, beginning with `Start`
/// - no events are produced for input that never crosses the voicing threshold
/// - after [`Segmenter::mark_device_lost`], `push` fails with `Error::DeviceLost` until
///   [`Segmenter::reset`]
pub trait Segmenter {
    /// Consume a chunk of mono samples, appending any resulting events.
    fn push(&mut self, samples: &[f32], events: &mut Vec<SegmentEvent>) -> Result<()>;

    /// Drop buffered audio, cancel the silence timer and clear a lost-device condition.
    fn reset(&mut self);

    fn mark_device_lost(&mut self, reason: &str);

    fn in_speech(&self) -> bool;

    fn sample_rate(&self) -> u32;
}

impl<S: Segmenter + ?Sized> Segmenter for Box<S> {
    fn push(&mut self, samples: &[f32], events: &mut Vec<SegmentEvent>) -> Result<()> {
        (**self).push(samples, events)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn mark_device_lost(&mut self, reason: &str) {
        (**self).mark_device_lost(reason)
    }

    fn in_speech(&self) -> bool {
        (**self).in_speech()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }
}

/// Build the segmenter selected by `opts`.
///
/// The model strategy needs a speech-probability backend: with the `whisper-vad` feature we
/// load Silero from `segmenter.vad_model_path`. Without it, callers construct
/// [`ModelSegmenter`] themselves around their own [`SpeechProbability`].
pub fn from_opts(opts: &SessionOpts) -> Result<Box<dyn Segmenter>> {
    let seg = &opts.segmenter;
    match seg.kind {
        SegmenterKind::Energy => Ok(Box::new(EnergySegmenter::new(seg, opts.sample_rate)?)),
        SegmenterKind::Model => model_from_opts(opts),
    }
}

#[cfg(feature = "whisper-vad")]
fn model_from_opts(opts: &SessionOpts) -> Result<Box<dyn Segmenter>> {
    let seg = &opts.segmenter;
    let path = seg.vad_model_path.as_deref().ok_or_else(|| {
        Error::Config("model segmenter requires `segmenter.vad_model_path`".to_owned())
    })?;

    let model = WhisperVadProbability::new(path, seg)?;
    Ok(Box::new(ModelSegmenter::new(model, seg, opts.sample_rate)?))
}

#[cfg(not(feature = "whisper-vad"))]
fn model_from_opts(_opts: &SessionOpts) -> Result<Box<dyn Segmenter>> {
    Err(Error::Config(
        "model segmenter requires the `whisper-vad` feature".to_owned(),
    ))
}

/// Lazily segment an iterator of sample chunks.
///
/// Yields events in order as chunks are consumed. After the first error the iterator is
/// exhausted. An utterance still open when the input ends is left open; call
/// [`Segmenter::reset`] to start over.
pub fn segment<S, I>(segmenter: &mut S, chunks: I) -> Segments<'_, S, I::IntoIter>
where
    S: Segmenter + ?Sized,
    I: IntoIterator,
    I::Item: AsRef<[f32]>,
{
    Segments {
        segmenter,
        chunks: chunks.into_iter(),
        ready: VecDeque::new(),
        scratch: Vec::new(),
        failed: false,
    }
}

/// Iterator returned by [`segment`].
pub struct Segments<'a, S: ?Sized, I> {
    segmenter: &'a mut S,
    chunks: I,
    ready: VecDeque<SegmentEvent>,
    scratch: Vec<SegmentEvent>,
    failed: bool,
}

impl<S, I> Iterator for Segments<'_, S, I>
where
    S: Segmenter + ?Sized,
    I: Iterator,
    I::Item: AsRef<[f32]>,
{
    type Item = Result<SegmentEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Some(Ok(event));
            }
            if self.failed {
                return None;
            }

            let chunk = self.chunks.next()?;
            if let Err(err) = self.segmenter.push(chunk.as_ref(), &mut self.scratch) {
                self.failed = true;
                return Some(Err(err));
            }
            self.ready.extend(self.scratch.drain(..));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opts::SegmenterOpts;

    const FRAME: usize = 320;

    fn opts() -> SessionOpts {
        SessionOpts {
            segmenter: SegmenterOpts {
                min_payload_bytes: 0,
                ..SegmenterOpts::default()
            },
            ..SessionOpts::default()
        }
    }

    #[test]
    fn segment_iterates_events_lazily() -> anyhow::Result<()> {
        let mut seg = from_opts(&opts())?;
        let chunks = vec![vec![0.0; FRAME * 3], vec![0.5; FRAME * 4], vec![0.0; FRAME * 40]];

        let events: Vec<SegmentEvent> = segment(&mut seg, chunks).collect::<Result<_>>()?;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SegmentEvent::Start));
        assert!(matches!(events[1], SegmentEvent::End { .. }));
        Ok(())
    }

    #[test]
    fn segment_stops_after_an_error() -> anyhow::Result<()> {
        let mut seg = from_opts(&opts())?;
        seg.mark_device_lost("gone");

        let mut it = segment(&mut seg, [vec![0.5; FRAME], vec![0.5; FRAME]]);
        assert!(matches!(it.next(), Some(Err(Error::DeviceLost(_)))));
        assert!(it.next().is_none());
        Ok(())
    }

    #[test]
    fn segmenting_restarts_after_reset() -> anyhow::Result<()> {
        let mut seg = from_opts(&opts())?;
        let first: Vec<_> = segment(&mut seg, [vec![0.5; FRAME]]).collect::<Result<_>>()?;
        assert_eq!(first, vec![SegmentEvent::Start]);

        seg.reset();
        let second: Vec<_> = segment(&mut seg, [vec![0.5; FRAME]]).collect::<Result<_>>()?;
        assert_eq!(second, vec![SegmentEvent::Start]);
        Ok(())
    }

    #[cfg(not(feature = "whisper-vad"))]
    #[test]
    fn model_kind_needs_a_backend() {
        let mut opts = opts();
        opts.segmenter.kind = SegmenterKind::Model;
        let err = from_opts(&opts).err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("whisper-vad"));
    }
}
