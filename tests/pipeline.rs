use parley::capture::CaptureFeed;
use parley::encoder::{decode, encode};
use parley::segmenter::{EnergySegmenter, SegmentEvent, segment};
use parley::{SegmenterOpts, Utterance};

const DEVICE_RATE: u32 = 48_000;
const TARGET_RATE: u32 = 16_000;

/// Stereo device buffers: one second of a 440 Hz tone, then one second of silence.
fn device_buffers() -> Vec<Vec<f32>> {
    let tone = (0..DEVICE_RATE as usize).flat_map(|i| {
        let t = i as f32 / DEVICE_RATE as f32;
        let s = 0.5 * (2.0 * std::f32::consts::PI * 440.0 * t).sin();
        [s, s]
    });
    let quiet = std::iter::repeat_n(0.0f32, DEVICE_RATE as usize * 2);

    tone.chain(quiet)
        .collect::<Vec<_>>()
        .chunks(960 * 2)
        .map(<[f32]>::to_vec)
        .collect()
}

#[test]
fn device_audio_becomes_one_wav_utterance() -> anyhow::Result<()> {
    let mut feed = CaptureFeed::new(DEVICE_RATE, 2, TARGET_RATE)?;
    let mut chunks = Vec::new();
    for buffer in device_buffers() {
        chunks.push(feed.feed(&buffer)?);
    }
    chunks.push(feed.finish()?);

    let total: usize = chunks.iter().map(Vec::len).sum();
    assert!(
        (31_000..=33_000).contains(&total),
        "expected about two seconds at 16 kHz, got {total}"
    );

    let mut segmenter = EnergySegmenter::new(&SegmenterOpts::default(), TARGET_RATE)?;
    let events = segment(&mut segmenter, &chunks).collect::<parley::Result<Vec<_>>>()?;

    let utterances: Vec<&Utterance> = events
        .iter()
        .filter_map(|event| match event {
            SegmentEvent::End { utterance } => Some(utterance),
            _ => None,
        })
        .collect();
    assert_eq!(
        events.iter().filter(|e| matches!(e, SegmentEvent::Start)).count(),
        1
    );
    assert_eq!(utterances.len(), 1);

    // About one second of tone plus the 700 ms hangover.
    let utterance = utterances[0];
    let millis = utterance.duration().as_millis();
    assert!((1_500..=1_900).contains(&millis), "utterance lasted {millis} ms");

    let payload = encode(utterance)?;
    let decoded = decode(payload.bytes())?;
    assert_eq!(decoded.sample_rate(), TARGET_RATE);
    assert_eq!(decoded.len(), utterance.len());
    Ok(())
}
