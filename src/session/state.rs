/// Coarse session phase, mostly useful for logging and UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Capture acquired, waiting for the transport to open.
    Connecting,
    Listening,
    Responding,
    /// The user barged in over a response; cleared by the next utterance boundary.
    Interrupted,
}

/// Snapshot of the flags the session arbitrates.
///
/// Only [`crate::Session`] mutates this. `speaking && responding` never survives the
/// handling of a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionState {
    pub connected: bool,
    pub listening: bool,
    pub speaking: bool,
    pub responding: bool,
    pub phase: Phase,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}
