use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use tracing::{info, warn};

use crate::capture::{CaptureDevice, CaptureFeed};
use crate::session::{EventSender, SessionEvent};
use crate::{Error, Result};

/// Default system microphone via cpal.
///
/// The device runs at whatever rate and channel count it prefers; the callback downmixes
/// and resamples to the session rate before anything reaches the session queue.
pub struct CpalCapture {
    target_rate: u32,
    events: EventSender,
    stream: Option<Stream>,
}

impl CpalCapture {
    pub fn new(target_rate: u32, events: EventSender) -> Self {
        Self {
            target_rate,
            events,
            stream: None,
        }
    }

    /// List available input devices.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        Ok(host
            .input_devices()?
            .filter_map(|device| device.name().ok())
            .collect())
    }
}

impl CaptureDevice for CpalCapture {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no input device available".to_owned()))?;
        let supported = device.default_input_config()?;
        let config: StreamConfig = supported.config();

        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_owned()),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            format = ?supported.sample_format(),
            "opening input device"
        );

        let feed = CaptureFeed::new(config.sample_rate.0, config.channels, self.target_rate)?;
        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, feed, self.events.clone())?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, feed, self.events.clone())?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, feed, self.events.clone())?,
            other => {
                return Err(Error::DeviceUnavailable(format!(
                    "unsupported input sample format {other:?}"
                )));
            }
        };

        stream.play()?;
        self.stream = Some(stream);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                warn!(error = %err, "failed to pause input stream");
            }
            info!("input device released");
        }
    }

    fn is_active(&self) -> bool {
        self.stream.is_some()
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut feed: CaptureFeed,
    events: EventSender,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let lost = events.clone();
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            scratch.clear();
            scratch.extend(data.iter().map(|&s| f32::from_sample(s)));

            match feed.feed(&scratch) {
                Ok(samples) if samples.is_empty() => {}
                Ok(samples) => {
                    events.send(SessionEvent::Samples(samples));
                }
                Err(err) => warn!(error = %err, "dropping capture buffer"),
            }
        },
        move |err| {
            lost.send(SessionEvent::CaptureLost(err.to_string()));
        },
        None,
    )?;

    Ok(stream)
}
