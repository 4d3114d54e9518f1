//! Device check: opens the microphone, the screen recorder and the playback
//! device the way the assistant does, measures microphone energy for a few
//! blocks and plays a short tone through the playback scheduler.

use anyhow::{Context, Result};
use ayin::audio_out::PulseOutput;
use ayin::capture::CAPTURE_BLOCK_FRAMES;
use ayin::codec::{pcm16_to_bytes, rms, to_pcm16, DOWNLINK_SAMPLE_RATE};
use ayin::config::DEFAULT_CAPTURE_RATE;
use ayin::frame::{FrameSampler, ReadyState, VideoSource};
use ayin::media_in::{video, Microphone};
use ayin::playback::PlaybackScheduler;
use std::sync::mpsc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const BLOCKS: usize = 10;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Testing microphone...");
    let mut microphone = Microphone::open("ayin-check", DEFAULT_CAPTURE_RATE)
        .context("Failed to open microphone")?;
    let (block_tx, block_rx) = mpsc::channel::<f32>();
    microphone.start(Box::new(move |block: &[f32]| {
        let _ = block_tx.send(rms(block));
    }))?;
    for i in 0..BLOCKS {
        match block_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(energy) => println!(
                "  block {:2}: {} frames, RMS {:.4}{}",
                i + 1,
                CAPTURE_BLOCK_FRAMES,
                energy,
                if energy > 0.02 { "  (loud enough to barge in)" } else { "" }
            ),
            Err(_) => {
                println!("  ❌ No audio from microphone");
                break;
            }
        }
    }
    microphone.release();

    println!("\nTesting screen video...");
    let (frame_tx, frame_rx) = mpsc::channel::<Option<usize>>();
    match video::sample_once(Duration::from_secs(3), move |source| {
        let ready = source.ready_state() >= ReadyState::HaveCurrentData;
        let jpeg = FrameSampler::default().sample(source).map(|p| p.data.len());
        if ready {
            let _ = frame_tx.send(jpeg);
        }
        ready
    }) {
        Ok(()) => match frame_rx.try_recv() {
            Ok(Some(len)) => println!("  ✅ Sampled one frame ({} base64 bytes)", len),
            Ok(None) => println!("  ❌ Frame ready but JPEG encoding failed"),
            Err(_) => println!("  ❌ No frame within 3s"),
        },
        Err(e) => println!("  ❌ Failed: {}", e),
    }

    println!("\nTesting playback...");
    let output = PulseOutput::open("ayin-check").context("Failed to open playback device")?;
    let mut player = PlaybackScheduler::new(Box::new(output));
    for k in 0..5 {
        let tone: Vec<f32> = (0..DOWNLINK_SAMPLE_RATE as usize / 5)
            .map(|i| {
                let t = i as f32 / DOWNLINK_SAMPLE_RATE as f32;
                0.2 * (2.0 * std::f32::consts::PI * (440.0 + 110.0 * k as f32) * t).sin()
            })
            .collect();
        if let Some(slot) = player.enqueue(&pcm16_to_bytes(&to_pcm16(&tone))) {
            println!("  chunk {}: start {:.3}s, {:.3}s long", k + 1, slot.start, slot.duration);
        }
    }
    std::thread::sleep(Duration::from_millis(1200));
    player.close();

    println!("\nMedia check complete!");
    Ok(())
}
