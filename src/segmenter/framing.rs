use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use super::timer::SilenceTimer;
use super::{SegmentEvent, Segmenter};
use crate::encoder::encoded_len;
use crate::opts::SegmenterOpts;
use crate::utterance::Utterance;
use crate::{Error, Result};

/// Classification of one analysis frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Voicing {
    Voiced,
    Silent,
    /// Neither clearly voiced nor clearly silent; the frame keeps the previous classification.
    Uncertain,
}

/// Decides whether a single fixed-size frame contains speech.
///
/// This is the only thing that differs between segmentation strategies. Framing, the
/// silence timer, accumulation and degenerate-capture handling are shared by
/// [`FrameSegmenter`].
pub trait FrameClassifier {
    fn classify(&mut self, frame: &[f32]) -> Result<Voicing>;

    /// Forget any per-stream state (rolling windows, smoothing).
    fn reset(&mut self) {}
}

/// Frame-based segmenter generic over the per-frame classifier.
///
/// Invariants:
/// - at most one utterance is open at a time
/// - an open utterance contains every frame from its `Start` frame through the frame on
///   which the silence timer fired
/// - the timer is armed iff an utterance is open
pub struct FrameSegmenter<C> {
    classifier: C,
    sample_rate: u32,
    frame_len: usize,
    hangover_len: usize,
    pre_speech_len: usize,
    min_payload_bytes: usize,

    // Samples not yet forming a complete frame.
    pending: Vec<f32>,
    // Most recent idle audio, prepended to the next utterance.
    pre_roll: VecDeque<f32>,
    // `Some` while between `Start` and `End`.
    utterance: Option<Vec<f32>>,
    // Last definite classification, used for uncertain frames.
    voiced: bool,
    timer: SilenceTimer,
    lost: Option<String>,
}

impl<C> std::fmt::Debug for FrameSegmenter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSegmenter")
            .field("sample_rate", &self.sample_rate)
            .field("frame_len", &self.frame_len)
            .field("in_speech", &self.utterance.is_some())
            .field("lost", &self.lost)
            .finish()
    }
}

impl<C: FrameClassifier> FrameSegmenter<C> {
    pub fn with_classifier(classifier: C, opts: &SegmenterOpts, sample_rate: u32) -> Result<Self> {
        opts.validate()?;
        if sample_rate == 0 {
            return Err(Error::Config("segmenter sample rate must be non-zero".to_owned()));
        }

        Ok(Self {
            classifier,
            sample_rate,
            frame_len: opts.frame_len(sample_rate),
            hangover_len: opts.hangover_len(sample_rate),
            pre_speech_len: opts.pre_speech_len(sample_rate),
            min_payload_bytes: opts.min_payload_bytes,
            pending: Vec::new(),
            pre_roll: VecDeque::new(),
            utterance: None,
            voiced: false,
            timer: SilenceTimer::new(),
            lost: None,
        })
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    fn process_frame(&mut self, frame: &[f32], events: &mut Vec<SegmentEvent>) -> Result<()> {
        let voiced = match self.classifier.classify(frame)? {
            Voicing::Voiced => true,
            Voicing::Silent => false,
            Voicing::Uncertain => self.voiced,
        };
        self.voiced = voiced;

        match self.utterance.as_mut() {
            None if voiced => {
                let mut samples = Vec::with_capacity(self.pre_roll.len() + self.frame_len * 64);
                samples.extend(self.pre_roll.drain(..));
                samples.extend_from_slice(frame);
                self.utterance = Some(samples);
                self.timer.arm(self.hangover_len);

                debug!(sample_rate = self.sample_rate, "speech started");
                events.push(SegmentEvent::Start);
            }
            None => self.remember_idle(frame),
            Some(samples) => {
                samples.extend_from_slice(frame);
                if voiced {
                    self.timer.arm(self.hangover_len);
                } else if self.timer.advance(frame.len()) {
                    self.finalize(events);
                }
            }
        }

        Ok(())
    }

    fn remember_idle(&mut self, frame: &[f32]) {
        if self.pre_speech_len == 0 {
            return;
        }
        self.pre_roll.extend(frame.iter().copied());
        let excess = self.pre_roll.len().saturating_sub(self.pre_speech_len);
        self.pre_roll.drain(..excess);
    }

    fn finalize(&mut self, events: &mut Vec<SegmentEvent>) {
        let Some(samples) = self.utterance.take() else {
            return;
        };
        self.timer.cancel();
        self.voiced = false;

        let len = samples.len();
        if encoded_len(len) <= self.min_payload_bytes {
            let err = Error::DegenerateCapture { samples: len };
            warn!(error = %err, "No audio data recorded");
            events.push(SegmentEvent::Discarded { samples: len });
            return;
        }

        debug!(samples = len, "speech ended");
        events.push(SegmentEvent::End {
            utterance: Utterance::new(samples, self.sample_rate),
        });
    }
}

impl<C: FrameClassifier> Segmenter for FrameSegmenter<C> {
    fn push(&mut self, samples: &[f32], events: &mut Vec<SegmentEvent>) -> Result<()> {
        if let Some(reason) = &self.lost {
            return Err(Error::DeviceLost(reason.clone()));
        }

        self.pending.extend_from_slice(samples);
        if self.pending.len() < self.frame_len {
            return Ok(());
        }

        let complete = self.pending.len() - self.pending.len() % self.frame_len;
        let frames: Vec<f32> = self.pending.drain(..complete).collect();
        trace!(frames = frames.len() / self.frame_len, "classifying frames");

        for (i, frame) in frames.chunks_exact(self.frame_len).enumerate() {
            if let Err(err) = self.process_frame(frame, events) {
                // The failed frame is lost; frames behind it wait for the next push.
                let mut requeued = frames[(i + 1) * self.frame_len..].to_vec();
                requeued.append(&mut self.pending);
                self.pending = requeued;
                return Err(err);
            }
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.pre_roll.clear();
        self.utterance = None;
        self.voiced = false;
        self.timer.cancel();
        self.lost = None;
        self.classifier.reset();
    }

    fn mark_device_lost(&mut self, reason: &str) {
        self.pending.clear();
        self.pre_roll.clear();
        self.utterance = None;
        self.voiced = false;
        self.timer.cancel();
        self.lost = Some(reason.to_owned());
    }

    fn in_speech(&self) -> bool {
        self.utterance.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
