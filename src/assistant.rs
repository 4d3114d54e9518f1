//! Session driver
//!
//! Runs one assistant session from the permission outcome to teardown:
//! connects the gateway, feeds session events to the turn controller, starts
//! capture once the session opens and releases everything at the end. A
//! session error is terminal; nothing is retried.

use crate::capture::CapturePipeline;
use crate::config::AssistantConfig;
use crate::controller::{Lifecycle, TurnController};
use crate::error::MediaError;
use crate::events::SessionEvent;
use crate::frame::{FrameLoop, FrameSampler};
use crate::gateway::{RealtimeSender, SessionGateway};
use crate::media_in::MediaInput;
use crate::playback::{AudioSink, PlaybackScheduler};
use crate::turn_fsm::{AssistantState, AssistantStatus, Event};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

impl From<SessionEvent> for Event {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Open => Event::SessionOpened,
            SessionEvent::Error(reason) => Event::SessionError(reason),
            SessionEvent::AudioChunk(chunk) => Event::AudioChunk(chunk),
            SessionEvent::TurnComplete => Event::TurnComplete,
        }
    }
}

pub struct Assistant<G: SessionGateway> {
    config: AssistantConfig,
    gateway: Arc<G>,
    turn: Arc<TurnController>,
}

impl<G: SessionGateway> Assistant<G> {
    /// `sink` is the playback device; it stays suspended until speech arrives.
    pub fn new(config: AssistantConfig, gateway: Arc<G>, sink: Box<dyn AudioSink>) -> Self {
        let turn = Arc::new(TurnController::new(PlaybackScheduler::new(sink)));
        Self {
            config,
            gateway,
            turn,
        }
    }

    /// Read-only view for the presentation layer
    pub fn status(&self) -> watch::Receiver<AssistantStatus> {
        self.turn.subscribe()
    }

    pub fn state(&self) -> AssistantState {
        self.turn.state()
    }

    /// Drive one session until it fails, the remote side closes it, or
    /// `shutdown` resolves. Returns the final state.
    pub async fn run<M, F>(&self, media: Result<M, MediaError>, shutdown: F) -> AssistantState
    where
        M: MediaInput + 'static,
        F: Future<Output = ()>,
    {
        let mut media = match media {
            Ok(media) => media,
            Err(e) => {
                warn!("Media acquisition failed: {}", e);
                self.turn.dispatch(Event::PermissionDenied);
                let turn = self.turn.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || turn.close_playback()).await {
                    error!("Closing playback failed: {}", e);
                }
                return self.turn.state();
            }
        };

        tokio::pin!(shutdown);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<SessionEvent>();

        tokio::select! {
            _ = self.gateway.connect(events_tx) => {}
            _ = &mut shutdown => {
                info!("Shutdown requested while connecting");
                self.teardown(media).await;
                return self.turn.state();
            }
        }

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else {
                        info!("Session closed by remote");
                        break;
                    };
                    if self.handle(event, &mut media) {
                        break;
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.teardown(media).await;
        self.turn.state()
    }

    /// Returns true once the session is over.
    fn handle<M: MediaInput>(&self, event: SessionEvent, media: &mut M) -> bool {
        let mut done = false;
        for lifecycle in self.turn.dispatch(event.into()) {
            match lifecycle {
                Lifecycle::StartCapture => {
                    if let Err(e) = self.start_capture(media) {
                        error!("Failed to start capture: {}", e);
                        for lifecycle in self.turn.dispatch(Event::SessionError(e.to_string())) {
                            done |= lifecycle == Lifecycle::Teardown;
                        }
                    }
                }
                Lifecycle::Teardown => done = true,
            }
        }
        done
    }

    fn start_capture<M: MediaInput>(&self, media: &mut M) -> Result<(), MediaError> {
        let sender: Arc<dyn RealtimeSender> = self.gateway.clone();
        let capture = CapturePipeline::new(
            self.turn.clone(),
            sender.clone(),
            self.config.capture_rate,
            self.config.barge_in_threshold,
        );
        let frames = FrameLoop::new(
            FrameSampler::new(self.config.jpeg_quality),
            self.turn.clone(),
            sender,
        );
        media.start(capture, frames)?;
        info!("Streaming microphone and video");
        Ok(())
    }

    /// Best effort: each step runs regardless of the others. Releasing the
    /// devices joins their threads, so it runs on the blocking pool.
    async fn teardown<M: MediaInput + 'static>(&self, mut media: M) {
        debug!("Tearing down session");
        let gateway = self.gateway.clone();
        let turn = self.turn.clone();
        let released = tokio::task::spawn_blocking(move || {
            gateway.disconnect();
            media.release();
            turn.close_playback();
        })
        .await;
        if let Err(e) = released {
            error!("Teardown failed: {}", e);
        }
        info!("Session ended in state {}", self.turn.state());
    }
}
