//! Real audio endpoints: cpal for capture, rodio for playback.
//!
//! Device callbacks and clip watcher threads only ever send [`crate::SessionEvent`]s;
//! they never touch session state.

mod input;
mod output;

pub use input::CpalCapture;
pub use output::{OutputDevice, RodioClipSink, RodioRenderer};

use crate::Result;
use crate::opts::SessionOpts;
use crate::session::{Devices, EventSender};

/// Default microphone and speaker, wired to report into `events`.
///
/// The output device is opened here; the microphone is only acquired by
/// [`crate::Session::initialize`].
pub fn default_devices(opts: &SessionOpts, events: &EventSender) -> Result<Devices> {
    let output = OutputDevice::open_default()?;

    Ok(Devices {
        capture: Box::new(CpalCapture::new(opts.sample_rate, events.clone())),
        clips: Box::new(RodioClipSink::new(output.clone(), events.clone())),
        renderer: Box::new(RodioRenderer::new(output, &opts.playback)),
    })
}
