use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tracing::{debug, info};

use crate::opts::PlaybackOpts;
use crate::playback::{ClipSink, Lookahead, PcmRenderer, Ticket, decode_clip};
use crate::session::{EventSender, SessionEvent};
use crate::{Error, Result};

/// The default output device, shared by the clip sink and the stream renderer.
///
/// The stream must outlive every sink created from its handle.
pub struct OutputDevice {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl OutputDevice {
    pub fn open_default() -> Result<Rc<Self>> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| Error::DeviceUnavailable(format!("no output device: {e}")))?;
        info!("output device opened");
        Ok(Rc::new(Self {
            _stream: stream,
            handle,
        }))
    }

    fn new_sink(&self) -> Result<Sink> {
        Sink::try_new(&self.handle)
            .map_err(|e| Error::DeviceUnavailable(format!("failed to create output sink: {e}")))
    }
}

/// Plays each clip on its own sink and reports the end through the session queue.
pub struct RodioClipSink {
    output: Rc<OutputDevice>,
    events: EventSender,
    playing: HashMap<Ticket, Arc<Sink>>,
}

impl RodioClipSink {
    pub fn new(output: Rc<OutputDevice>, events: EventSender) -> Self {
        Self {
            output,
            events,
            playing: HashMap::new(),
        }
    }
}

impl ClipSink for RodioClipSink {
    fn start(&mut self, ticket: Ticket, payload: Vec<u8>) -> Result<()> {
        let clip = decode_clip(payload).map_err(|e| Error::PlaybackItem(e.to_string()))?;
        debug!(%ticket, duration_ms = clip.duration().as_millis() as u64, "playing clip");

        let sink = Arc::new(self.output.new_sink()?);
        sink.append(SamplesBuffer::new(1, clip.sample_rate, clip.samples));

        let watcher = Arc::clone(&sink);
        let events = self.events.clone();
        std::thread::Builder::new()
            .name(format!("parley-clip-{}", ticket.0))
            .spawn(move || {
                watcher.sleep_until_end();
                events.send(SessionEvent::ClipEnded(ticket));
            })
            .map_err(|e| Error::PlaybackItem(format!("failed to watch clip: {e}")))?;

        self.playing.insert(ticket, sink);
        Ok(())
    }

    fn halt(&mut self, ticket: Ticket) {
        if let Some(sink) = self.playing.remove(&ticket) {
            sink.stop();
        }
    }

    fn release(&mut self, ticket: Ticket) {
        self.playing.remove(&ticket);
    }
}

/// Continuous renderer for streamed PCM.
///
/// Every chunk is appended to one long-lived sink, so nothing the peer sends is lost even
/// when it streams far ahead of playback.
pub struct RodioRenderer {
    output: Rc<OutputDevice>,
    sink: Option<Sink>,
    lookahead: Lookahead,
    backlogged: bool,
}

impl RodioRenderer {
    pub fn new(output: Rc<OutputDevice>, opts: &PlaybackOpts) -> Self {
        Self {
            output,
            sink: None,
            lookahead: Lookahead::new(Duration::from_millis(opts.max_lookahead_ms as u64)),
            backlogged: false,
        }
    }
}

impl PcmRenderer for RodioRenderer {
    fn feed(&mut self, samples: &[f32], sample_rate: u32) -> Result<()> {
        if samples.is_empty() || sample_rate == 0 {
            return Ok(());
        }

        let duration = Duration::from_secs_f64(samples.len() as f64 / sample_rate as f64);
        let now = Instant::now();
        let backlogged = self.lookahead.admit(now, duration);
        if backlogged != self.backlogged {
            let ahead_ms = self.lookahead.ahead(now).as_millis() as u64;
            if backlogged {
                debug!(ahead_ms, "stream is running ahead of playback");
            } else {
                debug!(ahead_ms, "stream backlog back within budget");
            }
            self.backlogged = backlogged;
        }

        let sink = match self.sink.take() {
            Some(sink) => sink,
            None => self.output.new_sink()?,
        };
        sink.append(SamplesBuffer::new(1, sample_rate, samples.to_vec()));
        self.sink = Some(sink);
        Ok(())
    }

    fn clear(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.lookahead.reset();
        self.backlogged = false;
    }
}
