//! Silero speech probability via whisper.cpp's built-in VAD (`whisper-rs`).
//!
//! whisper.cpp exposes VAD as "give me speech segments for this buffer" rather than a
//! per-frame probability, so we keep a short rolling window of recent audio and ask:
//! does detected speech reach the tail of the window? That answer becomes a coarse
//! probability (`1.0` or `0.0`) for the newest frame.

use std::collections::VecDeque;

use whisper_rs::{WhisperVadContext, WhisperVadContextParams, WhisperVadParams};

use super::model::{MODEL_SAMPLE_RATE, SpeechProbability};
use crate::opts::SegmenterOpts;
use crate::{Error, Result};

/// Rolling analysis window (1 s at 16 kHz).
const WINDOW_SAMPLES: usize = MODEL_SAMPLE_RATE as usize;

/// Silero's native chunk size; shorter windows are reported as silence.
const MIN_WINDOW_SAMPLES: usize = 512;

pub struct WhisperVadProbability {
    ctx: WhisperVadContext,
    threshold: f32,
    window: VecDeque<f32>,
    scratch: Vec<f32>,
}

impl WhisperVadProbability {
    pub fn new(model_path: &str, opts: &SegmenterOpts) -> Result<Self> {
        let mut params = WhisperVadContextParams::default();
        params.set_n_threads(num_cpus::get_physical().clamp(1, 4) as i32);

        let ctx = WhisperVadContext::new(model_path, params).map_err(|e| {
            Error::Config(format!("failed to load VAD model {model_path}: {e}"))
        })?;

        Ok(Self {
            ctx,
            // Hysteresis happens in `ModelClassifier`; here we only need whisper.cpp to report
            // anything that is plausibly speech.
            threshold: opts.negative_threshold,
            window: VecDeque::with_capacity(WINDOW_SAMPLES),
            scratch: Vec::with_capacity(WINDOW_SAMPLES),
        })
    }

    fn speech_reaches_tail(&mut self, tail_samples: usize) -> Result<bool> {
        let mut params = WhisperVadParams::default();
        params.set_threshold(self.threshold);
        params.set_min_speech_duration(0);

        self.scratch.clear();
        self.scratch.extend(self.window.iter().copied());

        let segments = self
            .ctx
            .segments_from_samples(params, &self.scratch)
            .map_err(|e| Error::msg(format!("VAD inference failed: {e}")))?;

        let n = segments.num_segments();
        if n == 0 {
            return Ok(false);
        }

        // Timestamps are in centiseconds (10ms units).
        let end_cs = segments
            .get_segment_end_timestamp(n - 1)
            .ok_or_else(|| Error::msg(format!("missing end timestamp for VAD segment {}", n - 1)))?;
        let end_idx = ((end_cs / 100.0) * MODEL_SAMPLE_RATE as f32).ceil() as usize;

        let tail_start = self.scratch.len().saturating_sub(tail_samples);
        Ok(end_idx >= tail_start)
    }
}

impl SpeechProbability for WhisperVadProbability {
    fn probability(&mut self, frame: &[f32]) -> Result<f32> {
        self.window.extend(frame.iter().copied());
        let excess = self.window.len().saturating_sub(WINDOW_SAMPLES);
        self.window.drain(..excess);

        if self.window.len() < MIN_WINDOW_SAMPLES {
            return Ok(0.0);
        }

        if self.speech_reaches_tail(frame.len())? {
            Ok(1.0)
        } else {
            Ok(0.0)
        }
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}
