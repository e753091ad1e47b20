//! Wire format of the duplex channel.
//!
//! Text messages are JSON control commands; binary messages are audio.
//!
//! Outbound:
//! - `{"command":"AUTH","data":{"api_key":…,"identity":…}}` once, on open
//! - `{"command":"INTERRUPT"}` before every utterance payload
//! - `{"command":"END_OF_TURN"}` when a response has fully played
//! - one WAV payload per utterance (binary)
//!
//! Inbound:
//! - `{"command":"end_of_synthesis"}` (matched case-insensitively)
//! - binary audio: a RIFF/WAVE clip or a raw PCM chunk of a streamed response

use serde::{Deserialize, Serialize};

use crate::encoder::is_wav;
use crate::opts::Credentials;
use crate::playback::PlaybackItem;
use crate::Result;

/// Outbound control command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    Auth(AuthData),
    Interrupt,
    EndOfTurn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthData {
    pub api_key: String,
    pub identity: String,
}

impl ControlMessage {
    pub fn auth(credentials: &Credentials) -> Self {
        Self::Auth(AuthData {
            api_key: credentials.api_key.clone(),
            identity: credentials.identity.clone(),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Inbound control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundCommand {
    EndOfSynthesis,
    Unknown(String),
}

#[derive(Deserialize)]
struct RawInbound {
    command: Option<String>,
}

/// Parse an inbound text frame.
///
/// Returns `Ok(None)` for JSON objects without a `command` field, and an error for text
/// that is not JSON at all.
pub fn parse_inbound(text: &str) -> Result<Option<InboundCommand>> {
    let raw: RawInbound = serde_json::from_str(text)?;
    let Some(command) = raw.command else {
        return Ok(None);
    };

    let normalized = command.to_ascii_lowercase();
    let parsed = match normalized.as_str() {
        // Some peers still send the historical misspelling.
        "end_of_synthesis" | "end_of_sythesis" => InboundCommand::EndOfSynthesis,
        _ => InboundCommand::Unknown(command),
    };
    Ok(Some(parsed))
}

/// Decide whether an inbound binary frame is a complete clip or a stream chunk.
///
/// Framing is the only signal: a RIFF/WAVE header means a clip.
pub fn classify_binary(bytes: Vec<u8>) -> PlaybackItem {
    if is_wav(&bytes) {
        PlaybackItem::Clip(bytes)
    } else {
        PlaybackItem::Chunk(bytes)
    }
}
