use std::time::{Duration, Instant};

/// Decodes raw 16-bit little-endian PCM chunks into `f32` samples.
///
/// Chunk boundaries are arbitrary network frames, so an odd trailing byte is carried over
/// and joined with the first byte of the next chunk.
#[derive(Debug, Default, Clone)]
pub struct PcmChunkDecoder {
    carry: Option<u8>,
}

impl PcmChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> Vec<f32> {
        let mut out = Vec::with_capacity(bytes.len() / 2 + 1);
        let mut rest = bytes;

        if let Some(lo) = self.carry.take() {
            match rest.split_first() {
                Some((&hi, tail)) => {
                    out.push(pcm16_to_f32(i16::from_le_bytes([lo, hi])));
                    rest = tail;
                }
                None => {
                    self.carry = Some(lo);
                    return out;
                }
            }
        }

        let mut pairs = rest.chunks_exact(2);
        for pair in &mut pairs {
            out.push(pcm16_to_f32(i16::from_le_bytes([pair[0], pair[1]])));
        }
        if let [odd] = pairs.remainder() {
            self.carry = Some(*odd);
        }

        out
    }

    pub fn reset(&mut self) {
        self.carry = None;
    }
}

fn pcm16_to_f32(s: i16) -> f32 {
    s as f32 / 32_768.0
}

/// Tracks how far the streaming renderer runs ahead of real time.
///
/// Peers usually synthesize faster than playback, so a streamed reply piles up ahead of
/// the play head. Every chunk is kept and scheduled right after the previous one; the
/// budget only tells the renderer when its backlog has grown past `max`.
#[derive(Debug, Clone)]
pub struct Lookahead {
    max: Duration,
    play_head: Option<Instant>,
}

impl Lookahead {
    pub fn new(max: Duration) -> Self {
        Self {
            max,
            play_head: None,
        }
    }

    /// How much audio is scheduled beyond `now`.
    pub fn ahead(&self, now: Instant) -> Duration {
        self.play_head
            .map(|head| head.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Schedule `duration` of audio after whatever is already queued.
    ///
    /// Returns `true` when the backlog now exceeds the budget.
    pub fn admit(&mut self, now: Instant, duration: Duration) -> bool {
        let ahead = self.ahead(now) + duration;
        self.play_head = Some(now + ahead);
        ahead > self.max
    }

    pub fn reset(&mut self) {
        self.play_head = None;
    }
}
