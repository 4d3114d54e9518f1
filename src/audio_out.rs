//! PulseAudio playback device
//!
//! A dedicated thread owns the PulseAudio playback stream and renders a
//! timeline of booked buffers in fixed periods. The number of frames rendered
//! so far is the device clock; it stands still while the device is suspended.

use crate::codec::DOWNLINK_SAMPLE_RATE;
use crate::error::MediaError;
use crate::playback::AudioSink;
use libpulse_binding as pulse;
use libpulse_simple_binding as psimple;
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// 20 ms at 24 kHz
const PERIOD_FRAMES: usize = 480;

#[derive(Debug)]
struct Booking {
    start_frame: u64,
    samples: Vec<f32>,
}

/// Booked buffers plus the render clock
#[derive(Debug, Default)]
struct Timeline {
    rendered_frames: u64,
    running: bool,
    closed: bool,
    bookings: Vec<Booking>,
}

impl Timeline {
    /// Book `samples` at `start_frame`, moved up to the render clock if that
    /// frame was already rendered so the whole buffer is still heard.
    fn book(&mut self, start_frame: u64, samples: Vec<f32>) {
        let start_frame = if start_frame < self.rendered_frames {
            warn!(
                "Booking {} frames late, starting at the render clock",
                self.rendered_frames - start_frame
            );
            self.rendered_frames
        } else {
            start_frame
        };
        self.bookings.push(Booking {
            start_frame,
            samples,
        });
    }

    /// Mix the next period into `out` and advance the clock by its length.
    fn render_period(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let t0 = self.rendered_frames;
        let t1 = t0 + out.len() as u64;

        for booking in &self.bookings {
            let end = booking.start_frame + booking.samples.len() as u64;
            if end <= t0 || booking.start_frame >= t1 {
                continue;
            }
            for t in booking.start_frame.max(t0)..end.min(t1) {
                out[(t - t0) as usize] += booking.samples[(t - booking.start_frame) as usize];
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        self.bookings
            .retain(|b| b.start_frame + b.samples.len() as u64 > t1);
        self.rendered_frames = t1;
    }
}

struct Shared {
    timeline: Mutex<Timeline>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Mono PulseAudio output at the downlink rate. Starts suspended.
pub struct PulseOutput {
    shared: Arc<Shared>,
    sample_rate: u32,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PulseOutput {
    /// Open the default playback device.
    pub fn open(app_name: &str) -> Result<Self, MediaError> {
        let shared = Arc::new(Shared {
            timeline: Mutex::new(Timeline::default()),
            wake: Condvar::new(),
        });
        let sample_rate = DOWNLINK_SAMPLE_RATE;

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), MediaError>>();
        let thread_shared = shared.clone();
        let app_name = app_name.to_string();

        let handle = std::thread::Builder::new()
            .name("ayin-playback".into())
            .spawn(move || {
                let spec = pulse::sample::Spec {
                    format: pulse::sample::Format::F32le,
                    channels: 1,
                    rate: sample_rate,
                };
                let bytes_per_period = (PERIOD_FRAMES * 4) as u32;
                let buffer_attr = pulse::def::BufferAttr {
                    maxlength: u32::MAX,
                    tlength: bytes_per_period * 3,
                    prebuf: u32::MAX,
                    minreq: bytes_per_period,
                    fragsize: u32::MAX,
                };

                let simple = match psimple::Simple::new(
                    None,
                    &app_name,
                    pulse::stream::Direction::Playback,
                    None,
                    "assistant speech",
                    &spec,
                    None,
                    Some(&buffer_attr),
                ) {
                    Ok(simple) => {
                        let _ = ready_tx.send(Ok(()));
                        simple
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(MediaError::Playback(ToString::to_string(&e))));
                        return;
                    }
                };

                render_loop(&simple, &thread_shared);

                if let Err(e) = simple.drain() {
                    debug!("Playback drain failed: {}", e);
                }
                info!("Playback thread stopped");
            })
            .map_err(|e| MediaError::Playback(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("Playback device opened at {}Hz", sample_rate);
                Ok(Self {
                    shared,
                    sample_rate,
                    handle: Mutex::new(Some(handle)),
                })
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(MediaError::DeviceThread),
        }
    }
}

fn render_loop(simple: &psimple::Simple, shared: &Shared) {
    let mut period = vec![0f32; PERIOD_FRAMES];
    let mut bytes = Vec::with_capacity(PERIOD_FRAMES * 4);

    loop {
        {
            let mut timeline = shared.lock();
            while !timeline.running && !timeline.closed {
                timeline = shared
                    .wake
                    .wait(timeline)
                    .unwrap_or_else(|e| e.into_inner());
            }
            if timeline.closed {
                return;
            }
            timeline.render_period(&mut period);
        }

        bytes.clear();
        bytes.extend(period.iter().flat_map(|s| s.to_le_bytes()));

        // blocks until the server has room, which paces the clock
        if let Err(e) = simple.write(&bytes) {
            error!("Playback write failed: {}", e);
            return;
        }
    }
}

impl AudioSink for PulseOutput {
    fn current_time(&self) -> f64 {
        self.shared.lock().rendered_frames as f64 / self.sample_rate as f64
    }

    fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    fn resume(&self) -> Result<(), MediaError> {
        let mut timeline = self.shared.lock();
        if timeline.closed {
            return Err(MediaError::Playback("device closed".into()));
        }
        timeline.running = true;
        self.shared.wake.notify_all();
        Ok(())
    }

    fn suspend(&self) {
        self.shared.lock().running = false;
    }

    fn schedule(&self, start_time: f64, samples: Vec<f32>) {
        let start_frame = (start_time * self.sample_rate as f64).round() as u64;
        self.shared.lock().book(start_frame, samples);
    }

    fn flush(&self) {
        self.shared.lock().bookings.clear();
    }

    fn close(&self) {
        {
            let mut timeline = self.shared.lock();
            timeline.closed = true;
            timeline.running = false;
            timeline.bookings.clear();
        }
        self.shared.wake.notify_all();

        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Playback thread panicked");
            }
        }
    }
}

impl Drop for PulseOutput {
    fn drop(&mut self) {
        self.close();
    }
}
