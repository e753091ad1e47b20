//! Utterance encoding for transport.
//!
//! Every finalized utterance leaves the client as a single self-describing WAV payload:
//! - RIFF container, PCM format tag
//! - mono, 16-bit signed little-endian samples
//! - the utterance's own sample rate in the header
//!
//! The encoder is pure: no shared state, no device or transport access. Both segmenter
//! strategies feed it the same `Utterance` type.

use std::io::Cursor;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::utterance::Utterance;
use crate::{Error, Result};

/// Size of the canonical PCM WAV header written by [`encode`].
pub const WAV_HEADER_LEN: usize = 44;

const BITS_PER_SAMPLE: u16 = 16;

/// Container metadata carried in the payload header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

/// An encoded utterance, ready to be sent as one binary message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    bytes: Vec<u8>,
    format: PayloadFormat,
}

impl EncodedPayload {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Number of bytes [`encode`] produces for `samples` mono samples.
pub const fn encoded_len(samples: usize) -> usize {
    WAV_HEADER_LEN + samples * (BITS_PER_SAMPLE as usize / 8)
}

/// Encode an utterance as a 16-bit PCM mono WAV payload.
///
/// Samples are clamped to `[-1.0, 1.0]` and scaled asymmetrically so that `-1.0` maps to
/// `i16::MIN` and `1.0` maps to `i16::MAX`.
pub fn encode(utterance: &Utterance) -> Result<EncodedPayload> {
    if utterance.is_empty() {
        return Err(Error::EmptyUtterance);
    }
    if utterance.sample_rate() == 0 {
        return Err(Error::Codec("utterance has a zero sample rate".to_owned()));
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate: utterance.sample_rate(),
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(encoded_len(utterance.len())));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        let mut pcm = writer.get_i16_writer(utterance.len() as u32);
        for &sample in utterance.samples() {
            pcm.write_sample(to_pcm16(sample));
        }
        pcm.flush()?;
        writer.finalize()?;
    }

    Ok(EncodedPayload {
        bytes: cursor.into_inner(),
        format: PayloadFormat {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
        },
    })
}

/// Decode a payload produced by [`encode`] back into an utterance.
///
/// We only accept what we emit: mono, 16-bit integer PCM.
pub fn decode(bytes: &[u8]) -> Result<Utterance> {
    let mut reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    if spec.channels != 1 {
        return Err(Error::Codec(format!(
            "expected mono WAV (1 channel), got {} channels",
            spec.channels
        )));
    }
    if spec.bits_per_sample != BITS_PER_SAMPLE || spec.sample_format != SampleFormat::Int {
        return Err(Error::Codec(format!(
            "expected 16-bit integer PCM, got {}-bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let mut samples = Vec::with_capacity(reader.len() as usize);
    for sample in reader.samples::<i16>() {
        samples.push(from_pcm16(sample?));
    }

    Ok(Utterance::new(samples, spec.sample_rate))
}

/// Whether `bytes` starts with a RIFF/WAVE container header.
///
/// This is the only content inspection the protocol allows when telling a complete
/// response apart from a raw PCM chunk.
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

fn to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32_768.0) as i16
    } else {
        (s * 32_767.0) as i16
    }
}

fn from_pcm16(pcm: i16) -> f32 {
    if pcm < 0 {
        pcm as f32 / 32_768.0
    } else {
        pcm as f32 / 32_767.0
    }
}
