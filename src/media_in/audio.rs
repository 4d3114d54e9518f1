//! Microphone capture using PulseAudio

use crate::capture::{BlockHandler, CAPTURE_BLOCK_FRAMES};
use crate::error::MediaError;
use libpulse_binding as pulse;
use libpulse_simple_binding as psimple;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

const CHANNELS: u8 = 1;
const BYTES_PER_BLOCK: usize = CAPTURE_BLOCK_FRAMES * 4;

/// An open microphone. Blocks flow to the handler passed to [`Microphone::start`].
pub struct Microphone {
    handler_tx: Option<mpsc::Sender<BlockHandler>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Microphone {
    /// Open the default record device, mono float at `sample_rate`.
    pub fn open(app_name: &str, sample_rate: u32) -> Result<Self, MediaError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), MediaError>>();
        let (handler_tx, handler_rx) = mpsc::channel::<BlockHandler>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_shutdown = shutdown.clone();
        let app_name = app_name.to_string();
        let handle = std::thread::Builder::new()
            .name("ayin-microphone".into())
            .spawn(move || {
                let spec = pulse::sample::Spec {
                    format: pulse::sample::Format::F32le,
                    channels: CHANNELS,
                    rate: sample_rate,
                };
                let buffer_attr = pulse::def::BufferAttr {
                    maxlength: u32::MAX,
                    tlength: u32::MAX,
                    prebuf: u32::MAX,
                    minreq: u32::MAX,
                    fragsize: BYTES_PER_BLOCK as u32,
                };

                let capture = match psimple::Simple::new(
                    None,
                    &app_name,
                    pulse::stream::Direction::Record,
                    None,
                    "microphone",
                    &spec,
                    None,
                    Some(&buffer_attr),
                ) {
                    Ok(capture) => {
                        let _ = ready_tx.send(Ok(()));
                        capture
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(MediaError::Microphone(ToString::to_string(&e))));
                        return;
                    }
                };

                // released before anyone asked for blocks
                let Ok(handler) = handler_rx.recv() else {
                    debug!("Microphone released before capture started");
                    return;
                };
                read_loop(&capture, handler, &thread_shutdown);
                info!("Microphone capture stopped");
            })
            .map_err(|e| MediaError::Microphone(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("Microphone opened at {}Hz", sample_rate);
                Ok(Self {
                    handler_tx: Some(handler_tx),
                    shutdown,
                    handle: Some(handle),
                })
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(MediaError::DeviceThread),
        }
    }

    /// Start delivering 4096-frame blocks to `handler`. Only the first call
    /// has an effect.
    pub fn start(&mut self, handler: BlockHandler) -> Result<(), MediaError> {
        let Some(tx) = self.handler_tx.take() else {
            warn!("Microphone capture already started");
            return Ok(());
        };
        tx.send(handler).map_err(|_| MediaError::DeviceThread)
    }

    /// Stop capture and close the device. Idempotent.
    pub fn release(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.handler_tx = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Microphone thread panicked");
            }
        }
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        self.release();
    }
}

fn read_loop(capture: &psimple::Simple, mut handler: BlockHandler, shutdown: &AtomicBool) {
    let mut bytes = vec![0u8; BYTES_PER_BLOCK];
    let mut block = Vec::with_capacity(CAPTURE_BLOCK_FRAMES);

    while !shutdown.load(Ordering::SeqCst) {
        if let Err(e) = capture.read(&mut bytes) {
            error!("Microphone read failed: {}", e);
            return;
        }

        block.clear();
        block.extend(
            bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
        handler(&block);
    }
}
