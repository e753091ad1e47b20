use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Which speech segmentation strategy a session runs.
///
/// Both strategies satisfy the same event contract; the choice is made once at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum SegmenterKind {
    /// Frame RMS against a fixed threshold.
    #[default]
    Energy,
    /// Per-frame speech probability from a VAD model.
    Model,
}

/// Options that control how a session runs.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// Frontends are responsible for mapping user input into this type so that:
/// - the library remains reusable outside of a CLI context
/// - tests and embedding applications can construct options programmatically
///
/// Every field has a default, so a config file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionOpts {
    /// Rate (Hz) of the mono sample stream fed to the segmenter.
    pub sample_rate: u32,

    pub segmenter: SegmenterOpts,

    pub playback: PlaybackOpts,

    /// Passed through to the peer exactly once, in the auth handshake.
    pub credentials: Credentials,
}

impl Default for SessionOpts {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            segmenter: SegmenterOpts::default(),
            playback: PlaybackOpts::default(),
            credentials: Credentials::default(),
        }
    }
}

impl SessionOpts {
    /// Load options from a JSON file. Missing fields fall back to their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            Error::Config(format!("failed to read config file {}: {err}", path.display()))
        })?;
        let opts: Self = serde_json::from_str(&raw).map_err(|err| {
            Error::Config(format!("failed to parse config file {}: {err}", path.display()))
        })?;
        opts.validate()?;
        Ok(opts)
    }

    /// Write these options as pretty JSON, in the format `from_json_file` reads.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| {
            Error::Config(format!("failed to write config {}: {e}", path.display()))
        })
    }

    /// Reject option combinations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be non-zero".to_owned()));
        }
        self.segmenter.validate()?;
        self.playback.validate()
    }
}

/// Segmenter tuning.
///
/// Durations are expressed in milliseconds and converted to sample counts against the
/// session sample rate, so the same config works at any capture rate.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SegmenterOpts {
    pub kind: SegmenterKind,

    /// Analysis frame length.
    pub frame_size_ms: u32,

    /// Energy strategy: a frame is voiced iff its RMS is strictly above this value.
    pub voiced_threshold: f32,

    /// Continuous silence required to end an utterance.
    pub silence_hangover_ms: u32,

    /// Utterances whose encoded payload would be this size or smaller are discarded.
    pub min_payload_bytes: usize,

    /// Audio kept from before the first voiced frame and prepended to the utterance.
    pub pre_speech_pad_ms: u32,

    /// Model strategy: probability at or above which a frame is voiced.
    pub positive_threshold: f32,

    /// Model strategy: probability below which a frame is silent.
    ///
    /// Frames in between keep the previous classification.
    pub negative_threshold: f32,

    /// Path to a Silero VAD model (ggml format). Only used by the `whisper-vad` backend.
    pub vad_model_path: Option<String>,
}

impl Default for SegmenterOpts {
    fn default() -> Self {
        Self {
            kind: SegmenterKind::Energy,
            frame_size_ms: 20,
            voiced_threshold: 0.1,
            silence_hangover_ms: 700,
            min_payload_bytes: 7_000,
            pre_speech_pad_ms: 0,
            positive_threshold: 0.65,
            negative_threshold: 0.5,
            vad_model_path: None,
        }
    }
}

impl SegmenterOpts {
    pub fn validate(&self) -> Result<()> {
        if self.frame_size_ms == 0 {
            return Err(Error::Config("frame_size_ms must be non-zero".to_owned()));
        }
        if !(0.0..=1.0).contains(&self.voiced_threshold) {
            return Err(Error::Config(format!(
                "voiced_threshold must be within [0, 1], got {}",
                self.voiced_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.positive_threshold)
            || !(0.0..=1.0).contains(&self.negative_threshold)
        {
            return Err(Error::Config(
                "speech probability thresholds must be within [0, 1]".to_owned(),
            ));
        }
        if self.negative_threshold > self.positive_threshold {
            return Err(Error::Config(format!(
                "negative_threshold ({}) must not exceed positive_threshold ({})",
                self.negative_threshold, self.positive_threshold
            )));
        }
        Ok(())
    }

    /// Frame length in samples at `sample_rate` (never zero).
    pub fn frame_len(&self, sample_rate: u32) -> usize {
        ms_to_samples(self.frame_size_ms, sample_rate).max(1)
    }

    pub fn hangover_len(&self, sample_rate: u32) -> usize {
        ms_to_samples(self.silence_hangover_ms, sample_rate)
    }

    pub fn pre_speech_len(&self, sample_rate: u32) -> usize {
        ms_to_samples(self.pre_speech_pad_ms, sample_rate)
    }
}

/// Playback tuning for the response stream.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlaybackOpts {
    /// Rate (Hz) of inbound raw PCM chunks.
    pub stream_sample_rate: u32,

    /// Backlog of streamed audio past which the renderer reports it is running ahead.
    /// Chunks beyond it are still played.
    pub max_lookahead_ms: u32,
}

impl Default for PlaybackOpts {
    fn default() -> Self {
        Self {
            stream_sample_rate: 24_000,
            max_lookahead_ms: 2_000,
        }
    }
}

impl PlaybackOpts {
    pub fn validate(&self) -> Result<()> {
        if self.stream_sample_rate == 0 {
            return Err(Error::Config(
                "stream_sample_rate must be non-zero".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Opaque credentials for the auth handshake. Never inspected locally.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Credentials {
    /// Never written back out by [`SessionOpts::to_json_file`].
    #[serde(skip_serializing)]
    pub api_key: String,
    pub identity: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("identity", &self.identity)
            .finish()
    }
}

/// Convert milliseconds → number of samples at `sample_rate`.
///
/// We round to the nearest sample so durations are stable across rates.
pub(crate) fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    ((ms as f64 / 1000.0) * sample_rate as f64).round() as usize
}
