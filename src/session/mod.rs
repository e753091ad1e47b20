//! Session state machine: the single authority over who is talking.
//!
//! A session wires together one segmenter, one capture device, one player and one
//! transport. All inputs arrive as [`SessionEvent`]s on a single queue and are handled
//! synchronously, one at a time, in arrival order. That gives us the ordering guarantees
//! the turn-taking protocol needs without any locking:
//! - `INTERRUPT` is always sent before the utterance payload it precedes
//! - flags are updated before the player's drain state is evaluated
//! - `speaking && responding` never survives the handling of one event
//!
//! Errors are split in two: fatal ones ([`Error::is_fatal`]) tear the session down and are
//! returned to the caller; everything else is logged and the session keeps going.

mod event;
mod state;

use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

pub use event::{EventReceiver, EventSender, SessionEvent, channel};
pub use state::{Phase, SessionState};

use crate::capture::CaptureDevice;
use crate::encoder::encode;
use crate::opts::SessionOpts;
use crate::playback::{ClipSink, PcmRenderer, PlaybackItem, PlaybackQueue, PlayerNotice};
use crate::protocol::{ControlMessage, InboundCommand, classify_binary, parse_inbound};
use crate::segmenter::{self, SegmentEvent, Segmenter};
use crate::transport::{Outbound, Transport};
use crate::utterance::Utterance;
use crate::{Error, Result};

/// Whether the event loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// The audio endpoints a session drives.
pub struct Devices {
    pub capture: Box<dyn CaptureDevice>,
    pub clips: Box<dyn ClipSink>,
    pub renderer: Box<dyn PcmRenderer>,
}

type Player = PlaybackQueue<Box<dyn ClipSink>, Box<dyn PcmRenderer>>;

pub struct Session<T> {
    id: Uuid,
    opts: SessionOpts,
    state: SessionState,
    segmenter: Box<dyn Segmenter>,
    capture: Box<dyn CaptureDevice>,
    player: Player,
    transport: T,

    // A streamed response has started and `end_of_synthesis` has not arrived yet.
    stream_open: bool,
    initialized: bool,
    segment_events: Vec<SegmentEvent>,
}

impl<T: Transport> Session<T> {
    /// Build a session with the segmenter selected by `opts`.
    pub fn new(opts: SessionOpts, devices: Devices, transport: T) -> Result<Self> {
        opts.validate()?;
        let segmenter = segmenter::from_opts(&opts)?;
        Self::with_segmenter(opts, segmenter, devices, transport)
    }

    /// Build a session around a caller-provided segmenter.
    pub fn with_segmenter(
        opts: SessionOpts,
        segmenter: Box<dyn Segmenter>,
        devices: Devices,
        transport: T,
    ) -> Result<Self> {
        opts.validate()?;
        if segmenter.sample_rate() != opts.sample_rate {
            return Err(Error::Config(format!(
                "segmenter runs at {} Hz but the session is configured for {} Hz",
                segmenter.sample_rate(),
                opts.sample_rate
            )));
        }

        let player = PlaybackQueue::new(devices.clips, devices.renderer, &opts.playback);
        Ok(Self {
            id: Uuid::new_v4(),
            opts,
            state: SessionState::default(),
            segmenter,
            capture: devices.capture,
            player,
            transport,
            stream_open: false,
            initialized: false,
            segment_events: Vec::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn opts(&self) -> &SessionOpts {
        &self.opts
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Acquire the capture device. On failure everything is released again.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        if let Err(err) = self.capture.start() {
            error!(session = %self.id, error = %err, "failed to acquire capture device");
            self.stop_all();
            return Err(match err {
                Error::DeviceUnavailable(_) => err,
                other => Error::DeviceUnavailable(other.to_string()),
            });
        }

        self.initialized = true;
        self.state.phase = Phase::Connecting;
        info!(session = %self.id, "capture acquired");
        Ok(())
    }

    /// Begin feeding captured audio to the segmenter.
    pub fn start_listening(&mut self) {
        if self.state.listening || !self.initialized {
            return;
        }
        self.segmenter.reset();
        self.state.listening = true;
        self.state.phase = Phase::Listening;
        debug!(session = %self.id, "listening");
    }

    /// Handle one event. Fatal errors tear the session down before being returned.
    pub fn handle(&mut self, event: SessionEvent) -> Result<Flow> {
        let flow = match self.dispatch(event) {
            Ok(flow) => flow,
            Err(err) if err.is_fatal() => {
                error!(session = %self.id, error = %err, "fatal session error");
                self.stop_all();
                return Err(err);
            }
            Err(err) => {
                warn!(session = %self.id, error = %err, "recovered from session error");
                Flow::Continue
            }
        };

        self.resolve_overlap();
        Ok(flow)
    }

    /// Process events until hang-up, a fatal error, or every sender is gone.
    pub fn run(&mut self, events: &EventReceiver) -> Result<()> {
        let span = info_span!("session", id = %self.id);
        let _guard = span.enter();
        info!("session loop started");

        for event in events.iter() {
            if self.handle(event)? == Flow::Stop {
                info!("session loop finished");
                return Ok(());
            }
        }

        debug!("event queue disconnected");
        self.stop_all();
        Ok(())
    }

    /// Release everything and reset all flags. Safe to call any number of times.
    pub fn stop_all(&mut self) {
        let was_active = self.initialized || !self.state.is_idle();

        self.segmenter.reset();
        self.player.stop();
        self.capture.release();
        self.transport.close();

        self.state = SessionState::default();
        self.stream_open = false;
        self.initialized = false;
        self.segment_events.clear();

        if was_active {
            info!(session = %self.id, "session stopped");
        }
    }

    fn dispatch(&mut self, event: SessionEvent) -> Result<Flow> {
        if !self.initialized {
            if event == SessionEvent::HangUp {
                self.stop_all();
                return Ok(Flow::Stop);
            }
            debug!(session = %self.id, ?event, "ignoring event on inactive session");
            return Ok(Flow::Continue);
        }

        match event {
            SessionEvent::TransportOpened => self.on_transport_opened()?,
            SessionEvent::Samples(samples) => self.on_samples(&samples)?,
            SessionEvent::CaptureLost(reason) => {
                self.segmenter.mark_device_lost(&reason);
                return Err(Error::DeviceLost(reason));
            }
            SessionEvent::Text(text) => self.on_text(&text)?,
            SessionEvent::Binary(bytes) => self.on_inbound_audio(bytes)?,
            SessionEvent::ClipEnded(ticket) => {
                let notices = self.player.on_clip_ended(ticket);
                self.on_clip_done(notices)?;
            }
            SessionEvent::ClipFailed(ticket, reason) => {
                let notices = self.player.on_clip_failed(ticket, &reason);
                self.on_clip_done(notices)?;
            }
            SessionEvent::TransportClosed => {
                info!(session = %self.id, "transport closed by peer");
                self.stop_all();
                return Ok(Flow::Stop);
            }
            SessionEvent::TransportFailed(reason) => return Err(Error::Transport(reason)),
            SessionEvent::HangUp => {
                info!(session = %self.id, "hang-up requested");
                self.stop_all();
                return Ok(Flow::Stop);
            }
        }

        Ok(Flow::Continue)
    }

    fn on_transport_opened(&mut self) -> Result<()> {
        if self.state.connected {
            return Ok(());
        }
        self.send_control(&ControlMessage::auth(&self.opts.credentials))?;
        self.state.connected = true;
        info!(session = %self.id, "transport connected");
        self.start_listening();
        Ok(())
    }

    fn on_samples(&mut self, samples: &[f32]) -> Result<()> {
        if !self.state.listening {
            return Ok(());
        }

        let mut events = std::mem::take(&mut self.segment_events);
        let mut outcome = match self.segmenter.push(samples, &mut events) {
            Err(err) if !err.is_fatal() => {
                warn!(session = %self.id, error = %err, "speech detection failed on captured audio");
                Ok(())
            }
            pushed => pushed,
        };

        // Events produced before a failure still happened.
        for event in events.drain(..) {
            if let Err(err) = self.on_segment(event) {
                if err.is_fatal() {
                    outcome = Err(err);
                    break;
                }
                match err {
                    Error::EmptyUtterance | Error::Codec(_) => {
                        warn!(session = %self.id, error = %err, "dropping utterance")
                    }
                    _ => warn!(session = %self.id, error = %err, "segment event failed"),
                }
            }
        }

        events.clear();
        self.segment_events = events;
        outcome
    }

    fn on_segment(&mut self, event: SegmentEvent) -> Result<()> {
        match event {
            SegmentEvent::Start => {
                self.state.speaking = true;
                if self.state.responding {
                    self.barge_in();
                }
                Ok(())
            }
            SegmentEvent::End { utterance } => self.on_utterance(utterance),
            SegmentEvent::Discarded { samples } => {
                debug!(session = %self.id, samples, "utterance discarded");
                self.state.speaking = false;
                self.state.phase = Phase::Listening;
                Ok(())
            }
        }
    }

    fn on_utterance(&mut self, utterance: Utterance) -> Result<()> {
        self.state.speaking = false;
        if self.state.responding {
            self.barge_in();
        }
        self.state.phase = Phase::Listening;

        let payload = encode(&utterance)?;
        info!(
            session = %self.id,
            samples = utterance.len(),
            bytes = payload.len(),
            "sending utterance"
        );

        self.send_control(&ControlMessage::Interrupt)?;
        self.send(Outbound::Binary(payload.into_bytes()))
    }

    fn on_text(&mut self, text: &str) -> Result<()> {
        match parse_inbound(text)? {
            Some(InboundCommand::EndOfSynthesis) => self.on_end_of_synthesis(),
            Some(InboundCommand::Unknown(command)) => {
                warn!(session = %self.id, command, "Unknown command");
                Ok(())
            }
            None => {
                debug!(session = %self.id, "ignoring text frame without a command");
                Ok(())
            }
        }
    }

    fn on_inbound_audio(&mut self, bytes: Vec<u8>) -> Result<()> {
        if !self.state.connected {
            debug!(session = %self.id, "ignoring audio before the handshake");
            return Ok(());
        }
        if self.state.speaking {
            debug!(session = %self.id, bytes = bytes.len(), "discarding response audio while user speaks");
            return Ok(());
        }

        let item = classify_binary(bytes);
        if let PlaybackItem::Chunk(_) = item {
            if !self.stream_open {
                debug!(session = %self.id, "response stream opened");
            }
            self.stream_open = true;
            self.state.responding = true;
            self.state.phase = Phase::Responding;
        }

        self.player.enqueue(item);
        let notices = self.player.play();
        self.apply_notices(notices)
    }

    fn on_clip_done(&mut self, notices: Vec<PlayerNotice>) -> Result<()> {
        self.state.responding = self.stream_open;
        if !self.state.responding && self.state.phase == Phase::Responding {
            self.state.phase = Phase::Listening;
        }
        self.apply_notices(notices)
    }

    fn on_end_of_synthesis(&mut self) -> Result<()> {
        if !self.stream_open {
            debug!(session = %self.id, "end_of_synthesis without an open stream; ignoring");
            return Ok(());
        }

        self.stream_open = false;
        debug!(session = %self.id, "response stream closed");

        if self.player.is_draining() {
            // The queue reports QueueFinished once the remaining clips are done.
            return Ok(());
        }

        self.state.responding = false;
        if self.state.phase == Phase::Responding {
            self.state.phase = Phase::Listening;
        }
        if !self.state.speaking {
            self.send_control(&ControlMessage::EndOfTurn)?;
        }
        Ok(())
    }

    fn apply_notices(&mut self, notices: Vec<PlayerNotice>) -> Result<()> {
        for notice in notices {
            match notice {
                PlayerNotice::ClipStarted(ticket) => {
                    debug!(session = %self.id, %ticket, "response clip playing");
                    self.state.responding = true;
                    self.state.phase = Phase::Responding;
                }
                PlayerNotice::QueueFinished => {
                    self.state.responding = self.stream_open;
                    if self.state.speaking || self.stream_open {
                        continue;
                    }
                    if self.state.phase == Phase::Responding {
                        self.state.phase = Phase::Listening;
                    }
                    self.send_control(&ControlMessage::EndOfTurn)?;
                }
            }
        }
        Ok(())
    }

    fn barge_in(&mut self) {
        info!(session = %self.id, "user barged in; stopping response playback");
        self.player.stop();
        self.state.responding = false;
        self.stream_open = false;
        self.state.phase = Phase::Interrupted;
    }

    fn resolve_overlap(&mut self) {
        if self.state.speaking && self.state.responding {
            self.barge_in();
        }
    }

    fn send_control(&mut self, message: &ControlMessage) -> Result<()> {
        let text = message.to_json()?;
        self.send(Outbound::Text(text))
    }

    fn send(&mut self, frame: Outbound) -> Result<()> {
        self.transport.send(frame).map_err(|err| match err {
            Error::Transport(_) => err,
            other => Error::Transport(other.to_string()),
        })
    }
}

impl<T> Drop for Session<T> {
    fn drop(&mut self) {
        self.capture.release();
    }
}
