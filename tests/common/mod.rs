#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use parley::capture::CaptureDevice;
use parley::encoder::{encode, encoded_len};
use parley::playback::{ClipSink, PcmRenderer, Ticket};
use parley::transport::{Outbound, Transport};
use parley::segmenter::Segmenter;
use parley::{Credentials, Devices, Error, Result, Session, SessionEvent, SessionOpts, Utterance};

pub const RATE: u32 = 16_000;
pub const FRAME: usize = 320;

#[derive(Default)]
pub struct Wire {
    pub frames: Vec<Outbound>,
    pub closed: bool,
    pub fail_sends: bool,
}

pub struct RecordingTransport {
    wire: Rc<RefCell<Wire>>,
}

impl Transport for RecordingTransport {
    fn send(&mut self, frame: Outbound) -> Result<()> {
        let mut wire = self.wire.borrow_mut();
        if wire.fail_sends || wire.closed {
            return Err(Error::Transport("socket gone".into()));
        }
        wire.frames.push(frame);
        Ok(())
    }

    fn close(&mut self) {
        self.wire.borrow_mut().closed = true;
    }
}

pub struct FakeCapture {
    active: Rc<Cell<bool>>,
    fail: bool,
}

impl CaptureDevice for FakeCapture {
    fn start(&mut self) -> Result<()> {
        if self.fail {
            return Err(Error::DeviceUnavailable("permission denied".into()));
        }
        self.active.set(true);
        Ok(())
    }

    fn release(&mut self) {
        self.active.set(false);
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }
}

#[derive(Default)]
pub struct ClipLog {
    pub started: Vec<Ticket>,
    pub halted: Vec<Ticket>,
    pub released: Vec<Ticket>,
    /// Payload sizes the fake refuses to play.
    pub reject_len: Option<usize>,
}

pub struct FakeClips {
    log: Rc<RefCell<ClipLog>>,
}

impl ClipSink for FakeClips {
    fn start(&mut self, ticket: Ticket, payload: Vec<u8>) -> Result<()> {
        let mut log = self.log.borrow_mut();
        if log.reject_len == Some(payload.len()) {
            return Err(Error::PlaybackItem("undecodable clip".into()));
        }
        log.started.push(ticket);
        Ok(())
    }

    fn halt(&mut self, ticket: Ticket) {
        self.log.borrow_mut().halted.push(ticket);
    }

    fn release(&mut self, ticket: Ticket) {
        self.log.borrow_mut().released.push(ticket);
    }
}

#[derive(Default)]
pub struct RenderLog {
    pub samples: usize,
    pub clears: usize,
}

pub struct FakeRenderer {
    log: Rc<RefCell<RenderLog>>,
}

impl PcmRenderer for FakeRenderer {
    fn feed(&mut self, samples: &[f32], _sample_rate: u32) -> Result<()> {
        self.log.borrow_mut().samples += samples.len();
        Ok(())
    }

    fn clear(&mut self) {
        self.log.borrow_mut().clears += 1;
    }
}

/// A session wired to recording fakes, plus handles to inspect them.
pub struct Harness {
    pub session: Session<RecordingTransport>,
    pub wire: Rc<RefCell<Wire>>,
    pub clips: Rc<RefCell<ClipLog>>,
    pub renderer: Rc<RefCell<RenderLog>>,
    pub capture_active: Rc<Cell<bool>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(false, SessionOpts::default(), None)
    }

    pub fn with_broken_capture() -> Self {
        Self::build(true, SessionOpts::default(), None)
    }

    /// Connected, with custom options (credentials are filled in).
    pub fn connected_with(opts: SessionOpts) -> Self {
        Self::connect(Self::build(false, opts, None))
    }

    /// Connected, with a caller-built segmenter.
    pub fn connected_with_segmenter(segmenter: Box<dyn Segmenter>) -> Self {
        Self::connect(Self::build(false, SessionOpts::default(), Some(segmenter)))
    }

    /// Initialized and past the auth handshake.
    pub fn connected() -> Self {
        Self::connect(Self::new())
    }

    fn connect(mut h: Self) -> Self {
        h.session.initialize().expect("initialize");
        h.handle(SessionEvent::TransportOpened);
        h
    }

    fn build(
        broken_capture: bool,
        opts: SessionOpts,
        segmenter: Option<Box<dyn Segmenter>>,
    ) -> Self {
        let wire = Rc::new(RefCell::new(Wire::default()));
        let clips = Rc::new(RefCell::new(ClipLog::default()));
        let renderer = Rc::new(RefCell::new(RenderLog::default()));
        let capture_active = Rc::new(Cell::new(false));

        let devices = Devices {
            capture: Box::new(FakeCapture {
                active: capture_active.clone(),
                fail: broken_capture,
            }),
            clips: Box::new(FakeClips { log: clips.clone() }),
            renderer: Box::new(FakeRenderer {
                log: renderer.clone(),
            }),
        };

        let opts = SessionOpts {
            credentials: Credentials {
                api_key: "test-key".into(),
                identity: "tester".into(),
            },
            ..opts
        };

        let transport = RecordingTransport { wire: wire.clone() };
        let session = match segmenter {
            Some(segmenter) => Session::with_segmenter(opts, segmenter, devices, transport),
            None => Session::new(opts, devices, transport),
        }
        .expect("session");

        Self {
            session,
            wire,
            clips,
            renderer,
            capture_active,
        }
    }

    /// Handle an event that must not fail.
    pub fn handle(&mut self, event: SessionEvent) {
        self.session.handle(event).expect("event handled");
    }

    /// Feed `voiced` loud frames followed by `silent` quiet frames in one event.
    pub fn speak(&mut self, voiced: usize, silent: usize) {
        let mut samples = voice(voiced);
        samples.extend(silence(silent));
        self.handle(SessionEvent::Samples(samples));
    }

    /// Wire log as command names, with binary frames shown as `<audio>`.
    pub fn commands(&self) -> Vec<String> {
        self.wire
            .borrow()
            .frames
            .iter()
            .map(|frame| match frame {
                Outbound::Text(text) => {
                    let json: serde_json::Value = serde_json::from_str(text).expect("json");
                    json["command"].as_str().unwrap_or_default().to_owned()
                }
                Outbound::Binary(_) => "<audio>".to_owned(),
            })
            .collect()
    }

    pub fn last_binary(&self) -> Option<Vec<u8>> {
        self.wire
            .borrow()
            .frames
            .iter()
            .rev()
            .find_map(|frame| match frame {
                Outbound::Binary(bytes) => Some(bytes.clone()),
                Outbound::Text(_) => None,
            })
    }
}

pub fn voice(frames: usize) -> Vec<f32> {
    (0..frames * FRAME)
        .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
        .collect()
}

pub fn silence(frames: usize) -> Vec<f32> {
    vec![0.0; frames * FRAME]
}

/// A real WAV clip with `samples` samples, as the peer would send it.
pub fn clip(samples: usize) -> Vec<u8> {
    let bytes = encode(&Utterance::new(vec![0.1; samples], 24_000))
        .expect("encode clip")
        .into_bytes();
    assert_eq!(bytes.len(), encoded_len(samples));
    bytes
}

/// A raw 16-bit PCM chunk of a streamed response.
pub fn chunk(samples: usize) -> Vec<u8> {
    vec![0x10; samples * 2]
}
