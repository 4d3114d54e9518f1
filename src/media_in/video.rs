//! Screen video source using xcap

use crate::error::MediaError;
use crate::frame::{FrameLoop, ReadyState, VideoSource};
use image::RgbaImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use xcap::{Frame, Monitor, VideoRecorder};

/// Latest frame of a recorder's stream
pub struct ScreenSource {
    frames: Receiver<Frame>,
    latest: Option<RgbaImage>,
    disconnected: bool,
}

impl ScreenSource {
    fn new(frames: Receiver<Frame>) -> Self {
        Self {
            frames,
            latest: None,
            disconnected: false,
        }
    }

    /// Keep only the newest frame the recorder produced since the last call.
    fn pump(&mut self) {
        loop {
            match self.frames.try_recv() {
                Ok(frame) => {
                    if let Some(image) = RgbaImage::from_raw(frame.width, frame.height, frame.raw) {
                        self.latest = Some(image);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.disconnected {
                        warn!("Screen recorder stopped producing frames");
                        self.disconnected = true;
                    }
                    break;
                }
            }
        }
    }
}

impl VideoSource for ScreenSource {
    fn width(&self) -> u32 {
        self.latest.as_ref().map_or(0, |f| f.width())
    }

    fn height(&self) -> u32 {
        self.latest.as_ref().map_or(0, |f| f.height())
    }

    fn ready_state(&self) -> ReadyState {
        if self.latest.is_some() {
            ReadyState::HaveEnoughData
        } else {
            ReadyState::HaveNothing
        }
    }

    fn current_frame(&self) -> Option<&RgbaImage> {
        self.latest.as_ref()
    }
}

/// Records the primary monitor. Ticks a [`FrameLoop`] once started.
pub struct ScreenVideo {
    loop_tx: Option<mpsc::Sender<FrameLoop>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ScreenVideo {
    pub fn open(frame_interval: Duration) -> Result<Self, MediaError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), MediaError>>();
        let (loop_tx, loop_rx) = mpsc::channel::<FrameLoop>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_shutdown = shutdown.clone();
        let handle = std::thread::Builder::new()
            .name("ayin-video".into())
            .spawn(move || {
                let (recorder, frames) = match open_primary_monitor() {
                    Ok(opened) => {
                        let _ = ready_tx.send(Ok(()));
                        opened
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run_video(&recorder, frames, &loop_rx, frame_interval, &thread_shutdown);
            })
            .map_err(|e| MediaError::Video(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                loop_tx: Some(loop_tx),
                shutdown,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(MediaError::DeviceThread),
        }
    }

    /// Start ticking `frame_loop`. Only the first call has an effect.
    pub fn start(&mut self, frame_loop: FrameLoop) -> Result<(), MediaError> {
        let Some(tx) = self.loop_tx.take() else {
            warn!("Frame loop already started");
            return Ok(());
        };
        tx.send(frame_loop).map_err(|_| MediaError::DeviceThread)
    }

    /// Cancel the frame loop and stop recording. Idempotent.
    pub fn release(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.loop_tx = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Video thread panicked");
            }
        }
    }
}

impl Drop for ScreenVideo {
    fn drop(&mut self) {
        self.release();
    }
}

/// Start/stop control over a screen recorder
trait Recorder {
    fn start(&self) -> Result<(), MediaError>;
    fn stop(&self) -> Result<(), MediaError>;
}

impl Recorder for VideoRecorder {
    fn start(&self) -> Result<(), MediaError> {
        VideoRecorder::start(self).map_err(|e| MediaError::Video(e.to_string()))
    }

    fn stop(&self) -> Result<(), MediaError> {
        VideoRecorder::stop(self).map_err(|e| MediaError::Video(e.to_string()))
    }
}

/// Body of the video thread. The recorder only runs while a frame loop is
/// draining it; its frame channel is unbounded.
fn run_video<R: Recorder>(
    recorder: &R,
    frames: Receiver<Frame>,
    loop_rx: &Receiver<FrameLoop>,
    interval: Duration,
    shutdown: &AtomicBool,
) {
    let Ok(frame_loop) = loop_rx.recv() else {
        debug!("Video released before the frame loop started");
        return;
    };

    if let Err(e) = recorder.start() {
        error!("Failed to start screen recorder: {}", e);
        return;
    }

    let mut source = ScreenSource::new(frames);
    tick_loop(frame_loop, &mut source, interval, shutdown);

    if let Err(e) = recorder.stop() {
        warn!("Failed to stop screen recorder: {}", e);
    }
    info!("Video capture stopped");
}

/// Record the primary monitor on the calling thread until `check` accepts
/// the source or `timeout` passes. Used by the device check.
pub fn sample_once<F>(timeout: Duration, mut check: F) -> Result<(), MediaError>
where
    F: FnMut(&dyn VideoSource) -> bool,
{
    let (recorder, frames) = open_primary_monitor()?;
    Recorder::start(&recorder)?;
    let mut source = ScreenSource::new(frames);
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        source.pump();
        if check(&source) {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    Recorder::stop(&recorder)
}

/// Find the primary monitor and create its recorder, not yet started.
fn open_primary_monitor() -> Result<(VideoRecorder, Receiver<Frame>), MediaError> {
    let monitors = Monitor::all().map_err(|e| MediaError::Video(e.to_string()))?;
    let monitor = monitors
        .iter()
        .find(|m| m.is_primary().unwrap_or(false))
        .or_else(|| monitors.first())
        .ok_or_else(|| MediaError::Video("no monitors found".into()))?;

    info!(
        "Using monitor: {} ({}x{})",
        monitor.name().unwrap_or_else(|_| "Unknown".to_string()),
        monitor.width().unwrap_or(0),
        monitor.height().unwrap_or(0)
    );

    let (recorder, frames) = monitor
        .video_recorder()
        .map_err(|e| MediaError::Video(e.to_string()))?;
    Ok((recorder, frames))
}

fn tick_loop(
    mut frame_loop: FrameLoop,
    source: &mut ScreenSource,
    interval: Duration,
    shutdown: &AtomicBool,
) {
    info!("Frame loop started, one tick every {:?}", interval);
    let mut next_tick = Instant::now();

    while !shutdown.load(Ordering::SeqCst) {
        source.pump();
        frame_loop.tick(source);

        next_tick += interval;
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        } else {
            // fell behind; don't try to catch up
            next_tick = now;
        }
    }
    debug!("Frame loop done after {} frames", frame_loop.frames_sent());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::TurnController;
    use crate::frame::FrameSampler;
    use crate::gateway::tests::FakeGateway;
    use crate::gateway::RealtimeSender;
    use crate::playback::tests::FakeSink;
    use crate::playback::PlaybackScheduler;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRecorder {
        calls: Mutex<Vec<&'static str>>,
        fail_start: bool,
    }

    impl FakeRecorder {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Recorder for FakeRecorder {
        fn start(&self) -> Result<(), MediaError> {
            self.calls.lock().unwrap().push("start");
            if self.fail_start {
                return Err(MediaError::Video("busy".into()));
            }
            Ok(())
        }

        fn stop(&self) -> Result<(), MediaError> {
            self.calls.lock().unwrap().push("stop");
            Ok(())
        }
    }

    fn frame_loop() -> FrameLoop {
        let turn = Arc::new(TurnController::new(PlaybackScheduler::new(Box::new(
            FakeSink::default(),
        ))));
        let sender: Arc<dyn RealtimeSender> = Arc::new(FakeGateway::connected());
        FrameLoop::new(FrameSampler::default(), turn, sender)
    }

    fn frame(width: u32, height: u32, value: u8) -> Frame {
        Frame {
            width,
            height,
            raw: vec![value; (width * height * 4) as usize],
        }
    }

    #[test]
    fn test_source_starts_unready() {
        let (_tx, rx) = mpsc::channel();
        let source = ScreenSource::new(rx);
        assert_eq!(source.ready_state(), ReadyState::HaveNothing);
        assert_eq!(source.width(), 0);
        assert!(source.current_frame().is_none());
    }

    #[test]
    fn test_pump_keeps_newest_frame() {
        let (tx, rx) = mpsc::channel();
        let mut source = ScreenSource::new(rx);
        tx.send(frame(4, 2, 10)).unwrap();
        tx.send(frame(8, 6, 20)).unwrap();
        source.pump();

        assert_eq!(source.ready_state(), ReadyState::HaveEnoughData);
        assert_eq!((source.width(), source.height()), (8, 6));
        assert_eq!(source.current_frame().unwrap().get_pixel(0, 0).0, [20; 4]);
    }

    #[test]
    fn test_malformed_frame_is_skipped() {
        let (tx, rx) = mpsc::channel();
        let mut source = ScreenSource::new(rx);
        tx.send(Frame {
            width: 10,
            height: 10,
            raw: vec![0; 7],
        })
        .unwrap();
        source.pump();
        assert!(source.current_frame().is_none());
    }

    #[test]
    fn test_last_frame_survives_recorder_exit() {
        let (tx, rx) = mpsc::channel();
        let mut source = ScreenSource::new(rx);
        tx.send(frame(2, 2, 1)).unwrap();
        drop(tx);
        source.pump();
        source.pump();
        assert!(source.disconnected);
        assert_eq!(source.width(), 2);
    }

    #[test]
    fn test_recorder_idle_until_frame_loop_arrives() {
        let recorder = FakeRecorder::default();
        let (_frames_tx, frames) = mpsc::channel();
        let (loop_tx, loop_rx) = mpsc::channel::<FrameLoop>();
        drop(loop_tx);

        run_video(&recorder, frames, &loop_rx, Duration::from_millis(1), &AtomicBool::new(false));
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn test_recorder_runs_only_with_frame_loop() {
        let recorder = FakeRecorder::default();
        let (_frames_tx, frames) = mpsc::channel();
        let (loop_tx, loop_rx) = mpsc::channel();
        loop_tx.send(frame_loop()).unwrap();

        // already shut down: start, no ticks, stop
        run_video(&recorder, frames, &loop_rx, Duration::from_millis(1), &AtomicBool::new(true));
        assert_eq!(recorder.calls(), vec!["start", "stop"]);
    }

    #[test]
    fn test_failed_start_skips_loop() {
        let recorder = FakeRecorder {
            fail_start: true,
            ..Default::default()
        };
        let (_frames_tx, frames) = mpsc::channel();
        let (loop_tx, loop_rx) = mpsc::channel();
        loop_tx.send(frame_loop()).unwrap();

        run_video(&recorder, frames, &loop_rx, Duration::from_millis(1), &AtomicBool::new(false));
        assert_eq!(recorder.calls(), vec!["start"]);
    }

    #[test]
    fn test_pump_holds_at_most_one_frame() {
        let (tx, rx) = mpsc::channel();
        let mut source = ScreenSource::new(rx);
        for value in 0..50 {
            tx.send(frame(4, 4, value)).unwrap();
        }
        source.pump();
        assert!(source.frames.try_recv().is_err());
        assert_eq!(source.current_frame().unwrap().get_pixel(0, 0).0, [49; 4]);
    }
}
