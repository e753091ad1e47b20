//! Playback of the peer's response audio.
//!
//! We receive response audio in two shapes:
//! - complete clips, each played to completion before the next item starts
//! - raw PCM chunks of a streamed response, handed to a continuous low-latency renderer
//!
//! [`PlaybackQueue`] keeps both in one strict FIFO. It never blocks: clip completion is
//! reported back asynchronously (through the session's event queue) and fed into
//! [`PlaybackQueue::on_clip_ended`] / [`PlaybackQueue::on_clip_failed`].

mod clip;
mod stream;

use std::collections::VecDeque;

use tracing::{debug, warn};

pub use clip::{DecodedClip, decode_clip};
pub use stream::{Lookahead, PcmChunkDecoder};

use crate::Result;
use crate::opts::PlaybackOpts;

/// One unit of response audio.
#[derive(Clone, PartialEq, Eq)]
pub enum PlaybackItem {
    /// A complete, decodable payload.
    Clip(Vec<u8>),
    /// Raw 16-bit LE mono PCM belonging to a streamed response.
    Chunk(Vec<u8>),
}

impl std::fmt::Debug for PlaybackItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clip(bytes) => write!(f, "Clip({} bytes)", bytes.len()),
            Self::Chunk(bytes) => write!(f, "Chunk({} bytes)", bytes.len()),
        }
    }
}

/// Identifies one enqueued item. Completion events for anything but the in-flight clip
/// are stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

impl std::fmt::Display for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the player tells its owner after each operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerNotice {
    ClipStarted(Ticket),
    /// The queue drained after at least one clip was attempted in this drain cycle.
    QueueFinished,
}

/// Plays one complete clip at a time.
///
/// `start` must not block until the clip ends: the implementation reports the end (or a
/// playback failure) later, out of band, tagged with the same ticket.
pub trait ClipSink {
    fn start(&mut self, ticket: Ticket, payload: Vec<u8>) -> Result<()>;

    /// Stop the clip immediately and release its output handle.
    fn halt(&mut self, ticket: Ticket);

    /// Release the handle of a clip that finished on its own.
    fn release(&mut self, ticket: Ticket);
}

/// Continuous renderer for streamed PCM. Has no per-chunk completion event.
pub trait PcmRenderer {
    fn feed(&mut self, samples: &[f32], sample_rate: u32) -> Result<()>;

    /// Drop everything buffered but not yet heard.
    fn clear(&mut self);
}

impl<T: ClipSink + ?Sized> ClipSink for Box<T> {
    fn start(&mut self, ticket: Ticket, payload: Vec<u8>) -> Result<()> {
        (**self).start(ticket, payload)
    }

    fn halt(&mut self, ticket: Ticket) {
        (**self).halt(ticket)
    }

    fn release(&mut self, ticket: Ticket) {
        (**self).release(ticket)
    }
}

impl<T: PcmRenderer + ?Sized> PcmRenderer for Box<T> {
    fn feed(&mut self, samples: &[f32], sample_rate: u32) -> Result<()> {
        (**self).feed(samples, sample_rate)
    }

    fn clear(&mut self) {
        (**self).clear()
    }
}

/// Strict FIFO player over clips and streamed chunks.
///
/// Invariants:
/// - at most one clip is in flight
/// - `draining` is true iff a clip is in flight
/// - `QueueFinished` is reported at most once per drain cycle
pub struct PlaybackQueue<C, R> {
    clips: C,
    renderer: R,
    stream_sample_rate: u32,
    decoder: PcmChunkDecoder,

    queue: VecDeque<(Ticket, PlaybackItem)>,
    current: Option<Ticket>,
    draining: bool,
    clip_in_cycle: bool,
    next_ticket: u64,
}

impl<C: ClipSink, R: PcmRenderer> PlaybackQueue<C, R> {
    pub fn new(clips: C, renderer: R, opts: &PlaybackOpts) -> Self {
        Self {
            clips,
            renderer,
            stream_sample_rate: opts.stream_sample_rate,
            decoder: PcmChunkDecoder::new(),
            queue: VecDeque::new(),
            current: None,
            draining: false,
            clip_in_cycle: false,
            next_ticket: 0,
        }
    }

    pub fn enqueue(&mut self, item: PlaybackItem) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        debug!(%ticket, ?item, queued = self.queue.len() + 1, "enqueued playback item");
        self.queue.push_back((ticket, item));
        ticket
    }

    /// Start draining the queue.
    ///
    /// No-op while already draining: queued items are picked up as the current clip ends.
    pub fn play(&mut self) -> Vec<PlayerNotice> {
        let mut notices = Vec::new();
        if self.draining {
            return notices;
        }
        if self.queue.is_empty() {
            warn!("No audio in queue to play.");
            return notices;
        }

        self.clip_in_cycle = false;
        self.advance(&mut notices);
        notices
    }

    pub fn on_clip_ended(&mut self, ticket: Ticket) -> Vec<PlayerNotice> {
        let mut notices = Vec::new();
        if !self.take_current(ticket) {
            return notices;
        }

        debug!(%ticket, "clip ended");
        self.clips.release(ticket);
        self.advance(&mut notices);
        notices
    }

    pub fn on_clip_failed(&mut self, ticket: Ticket, reason: &str) -> Vec<PlayerNotice> {
        let mut notices = Vec::new();
        if !self.take_current(ticket) {
            return notices;
        }

        warn!(%ticket, reason, "clip playback failed; skipping");
        self.clips.release(ticket);
        self.advance(&mut notices);
        notices
    }

    /// Halt everything and discard the queue. No completion notices follow.
    pub fn stop(&mut self) {
        if let Some(ticket) = self.current.take() {
            debug!(%ticket, "halting in-flight clip");
            self.clips.halt(ticket);
        }
        let dropped = self.queue.len();
        self.queue.clear();
        self.renderer.clear();
        self.decoder.reset();
        self.draining = false;
        self.clip_in_cycle = false;

        if dropped > 0 {
            debug!(dropped, "discarded queued playback items");
        }
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Items waiting behind the in-flight clip.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clip_sink(&self) -> &C {
        &self.clips
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    fn take_current(&mut self, ticket: Ticket) -> bool {
        if self.current != Some(ticket) {
            debug!(%ticket, current = ?self.current, "ignoring stale clip completion");
            return false;
        }
        self.current = None;
        true
    }

    /// Play items in order until a clip is in flight or the queue is empty.
    fn advance(&mut self, notices: &mut Vec<PlayerNotice>) {
        self.draining = true;

        while let Some((ticket, item)) = self.queue.pop_front() {
            match item {
                PlaybackItem::Chunk(bytes) => {
                    let samples = self.decoder.decode(&bytes);
                    if let Err(err) = self.renderer.feed(&samples, self.stream_sample_rate) {
                        warn!(%ticket, error = %err, "dropping stream chunk");
                    }
                }
                PlaybackItem::Clip(bytes) => {
                    self.clip_in_cycle = true;
                    match self.clips.start(ticket, bytes) {
                        Ok(()) => {
                            debug!(%ticket, "clip started");
                            self.current = Some(ticket);
                            notices.push(PlayerNotice::ClipStarted(ticket));
                            return;
                        }
                        Err(err) => warn!(%ticket, error = %err, "clip failed to start; skipping"),
                    }
                }
            }
        }

        self.draining = false;
        if std::mem::take(&mut self.clip_in_cycle) {
            debug!("playback queue finished");
            notices.push(PlayerNotice::QueueFinished);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[derive(Default)]
    struct FakeClips {
        started: Vec<Ticket>,
        halted: Vec<Ticket>,
        released: Vec<Ticket>,
        reject: Vec<u8>,
    }

    impl ClipSink for FakeClips {
        fn start(&mut self, ticket: Ticket, payload: Vec<u8>) -> Result<()> {
            if payload == self.reject {
                return Err(Error::PlaybackItem("undecodable".into()));
            }
            self.started.push(ticket);
            Ok(())
        }

        fn halt(&mut self, ticket: Ticket) {
            self.halted.push(ticket);
        }

        fn release(&mut self, ticket: Ticket) {
            self.released.push(ticket);
        }
    }

    #[derive(Default)]
    struct FakeRenderer {
        samples: usize,
        clears: usize,
    }

    impl PcmRenderer for FakeRenderer {
        fn feed(&mut self, samples: &[f32], _sample_rate: u32) -> Result<()> {
            self.samples += samples.len();
            Ok(())
        }

        fn clear(&mut self) {
            self.clears += 1;
        }
    }

    fn player() -> PlaybackQueue<FakeClips, FakeRenderer> {
        let clips = FakeClips {
            reject: b"bad".to_vec(),
            ..FakeClips::default()
        };
        PlaybackQueue::new(clips, FakeRenderer::default(), &PlaybackOpts::default())
    }

    #[test]
    fn clips_play_one_at_a_time_in_order() {
        let mut p = player();
        let a = p.enqueue(PlaybackItem::Clip(b"a".to_vec()));
        let b = p.enqueue(PlaybackItem::Clip(b"b".to_vec()));

        assert_eq!(p.play(), vec![PlayerNotice::ClipStarted(a)]);
        assert!(p.play().is_empty(), "play is idempotent while draining");
        assert_eq!(p.len(), 1);

        assert_eq!(p.on_clip_ended(a), vec![PlayerNotice::ClipStarted(b)]);
        assert_eq!(p.on_clip_ended(b), vec![PlayerNotice::QueueFinished]);
        assert!(!p.is_draining());
        assert_eq!(p.clip_sink().released, vec![a, b]);
    }

    #[test]
    fn failed_clip_is_skipped_and_finish_is_reported_once() {
        let mut p = player();
        let first = p.enqueue(PlaybackItem::Clip(b"1".to_vec()));
        p.enqueue(PlaybackItem::Clip(b"bad".to_vec()));
        let third = p.enqueue(PlaybackItem::Clip(b"3".to_vec()));

        p.play();
        assert_eq!(p.on_clip_ended(first), vec![PlayerNotice::ClipStarted(third)]);
        assert_eq!(p.on_clip_ended(third), vec![PlayerNotice::QueueFinished]);
        assert_eq!(p.clip_sink().started, vec![first, third]);
    }

    #[test]
    fn playback_failure_reported_later_also_advances() {
        let mut p = player();
        let first = p.enqueue(PlaybackItem::Clip(b"1".to_vec()));
        let second = p.enqueue(PlaybackItem::Clip(b"2".to_vec()));

        p.play();
        assert_eq!(
            p.on_clip_failed(first, "device hiccup"),
            vec![PlayerNotice::ClipStarted(second)]
        );
    }

    #[test]
    fn chunks_are_fed_without_waiting() {
        let mut p = player();
        p.enqueue(PlaybackItem::Chunk(vec![0; 480]));
        p.enqueue(PlaybackItem::Chunk(vec![0; 480]));

        assert!(p.play().is_empty());
        assert_eq!(p.renderer().samples, 480);
        assert!(!p.is_draining());
    }

    #[test]
    fn stop_discards_everything_silently() {
        let mut p = player();
        let first = p.enqueue(PlaybackItem::Clip(b"1".to_vec()));
        p.enqueue(PlaybackItem::Clip(b"2".to_vec()));
        p.play();

        p.stop();
        assert_eq!(p.clip_sink().halted, vec![first]);
        assert!(p.is_empty());
        assert!(!p.is_draining());
        assert_eq!(p.renderer().clears, 1);

        // The halted clip's ended event arrives late and must be ignored.
        assert!(p.on_clip_ended(first).is_empty());
    }

    #[test]
    fn empty_queue_play_is_a_noop() {
        let mut p = player();
        assert!(p.play().is_empty());
        assert!(!p.is_draining());
    }
}
