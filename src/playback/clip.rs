//! Clip decoding built on top of Symphonia.
//!
//! Inbound clips are complete, self-describing payloads (WAV in practice, but anything
//! Symphonia can probe is accepted). We decode the whole clip up front into mono `f32`
//! so the render side only ever deals with plain sample buffers.
//!
//! Error handling policy (same as a streaming decode loop):
//! - `DecodeError` → skip the bad packet
//! - `IoError`     → treat as end of stream
//! - other errors  → fail the clip with `Error::Codec`

use std::io::Cursor;
use std::time::Duration;

use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::encoder::is_wav;
use crate::resample::downmix_to_mono;
use crate::{Error, Result};

/// A fully decoded clip, ready to hand to an output device.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedClip {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Decode a complete clip payload into mono samples at its native rate.
pub fn decode_clip(bytes: Vec<u8>) -> Result<DecodedClip> {
    let mut hint = Hint::new();
    if is_wav(&bytes) {
        hint.with_extension("wav");
    }

    let mss = MediaSourceStream::new(
        Box::new(Cursor::new(bytes)),
        MediaSourceStreamOptions::default(),
    );

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Codec(format!("failed to probe clip: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .cloned()
        .ok_or_else(|| Error::Codec("no audio track found in clip".to_owned()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Codec(format!("failed to create decoder for clip: {e}")))?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut samples = Vec::new();
    let mut scratch: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(Error::Codec(format!("failed reading clip packet: {e}"))),
        };
        if packet.track_id() != track.id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(buf) => {
                sample_rate = buf.spec().rate;
                append_mono(&buf, &mut scratch, &mut samples);
            }
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(Error::Codec(format!("clip decoder failure: {e}"))),
        }
    }

    if samples.is_empty() {
        return Err(Error::Codec("clip decoded to no samples".to_owned()));
    }

    Ok(DecodedClip {
        samples,
        sample_rate,
    })
}

fn append_mono(
    decoded: &AudioBufferRef<'_>,
    scratch: &mut Option<SampleBuffer<f32>>,
    out: &mut Vec<f32>,
) {
    let spec = *decoded.spec();
    let needed = decoded.capacity() * spec.channels.count();

    if scratch.as_ref().is_none_or(|buf| buf.capacity() < needed) {
        *scratch = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
    }
    let Some(buf) = scratch.as_mut() else {
        return;
    };

    buf.copy_interleaved_ref(decoded.clone());
    out.extend(downmix_to_mono(buf.samples(), spec.channels.count()));
}
