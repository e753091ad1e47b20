//! `parley`: the real-time turn-taking engine of a voice-chat client.
//!
//! This crate provides:
//! - Speech segmentation (energy threshold or speech-probability model)
//! - Utterance encoding to self-describing WAV payloads
//! - A FIFO playback queue for complete clips and streamed PCM chunks
//! - The session state machine that arbitrates capture, playback and barge-in
//!
//! Network transport and audio devices sit behind small traits so the engine can be
//! driven by real hardware (`devices` feature), a WebSocket client (`parley-client`
//! binary) or test fakes alike.

// High-level API (most consumers should start here).
pub mod opts;
pub mod session;

// Error handling.
mod error;

// Speech detection and the data it produces.
pub mod segmenter;
pub mod utterance;

// Audio conversion.
pub mod encoder;
pub mod resample;

// Endpoints the session drives.
pub mod capture;
pub mod playback;
pub mod protocol;
pub mod transport;

// Real capture/render devices.
#[cfg(feature = "devices")]
pub mod devices;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

pub use error::{Error, Result};
pub use opts::{Credentials, PlaybackOpts, SegmenterKind, SegmenterOpts, SessionOpts};
pub use session::{Devices, EventSender, Flow, Phase, Session, SessionEvent, SessionState};
pub use utterance::Utterance;

#[cfg(feature = "logging")]
pub use logging::init as init_logging;
