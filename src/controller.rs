//! Single-writer owner of the turn state
//!
//! Capture, video and session events all come through [`TurnController::dispatch`].
//! The state machine and the playback scheduler sit behind one lock, so a
//! transition and the playback effect it requests are applied together.

use crate::playback::PlaybackScheduler;
use crate::turn_fsm::{Action, AssistantState, AssistantStatus, Event, TurnMachine};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

/// Effects the session driver has to carry out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    StartCapture,
    Teardown,
}

struct Inner {
    fsm: TurnMachine,
    playback: PlaybackScheduler,
}

pub struct TurnController {
    inner: Mutex<Inner>,
    status_tx: watch::Sender<AssistantStatus>,
}

impl TurnController {
    pub fn new(playback: PlaybackScheduler) -> Self {
        let fsm = TurnMachine::new();
        let (status_tx, _) = watch::channel(fsm.status());
        Self {
            inner: Mutex::new(Inner { fsm, playback }),
            status_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply one event and its playback effects; returns what is left for the
    /// session driver.
    pub fn dispatch(&self, event: Event) -> Vec<Lifecycle> {
        let mut lifecycle = Vec::new();

        let status = {
            let mut inner = self.lock();
            inner.fsm.on_event(event);

            for action in inner.fsm.drain_actions() {
                match action {
                    Action::Render(chunk) => {
                        if inner.fsm.state() == AssistantState::Speaking {
                            inner.playback.enqueue(&chunk);
                        } else {
                            debug!("Dropping {} bytes of trailing audio", chunk.len());
                        }
                    }
                    Action::StopPlayback => inner.playback.stop(),
                    Action::StartCapture => lifecycle.push(Lifecycle::StartCapture),
                    Action::Teardown => {
                        inner.playback.stop();
                        lifecycle.push(Lifecycle::Teardown);
                    }
                }
            }

            inner.fsm.status()
        };

        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });

        lifecycle
    }

    pub fn state(&self) -> AssistantState {
        self.lock().fsm.state()
    }

    pub fn is_barged_in(&self) -> bool {
        self.lock().fsm.is_barged_in()
    }

    pub fn status(&self) -> AssistantStatus {
        self.status_tx.borrow().clone()
    }

    /// Observe every status change.
    pub fn subscribe(&self) -> watch::Receiver<AssistantStatus> {
        self.status_tx.subscribe()
    }

    /// Stop playback and release the output device.
    pub fn close_playback(&self) {
        self.lock().playback.close();
    }
}
