//! Turn state machine
//!
//! Owns "whose turn it is". Every input (permission outcome, session events,
//! energy-based interruption) arrives as an [`Event`]; side effects are queued
//! as [`Action`]s and drained by the owner after each event, so the machine
//! itself never touches a device.

use std::fmt;
use tracing::{debug, info, warn};

/// Shown when media acquisition fails
pub const PERMISSION_DENIED_MESSAGE: &str = "Microphone and camera access denied.";
/// Shown when the session fails
pub const CONNECTION_ERROR_MESSAGE: &str = "Connection error. Please refresh.";

/// Assistant-wide state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssistantState {
    #[default]
    Idle,
    PermissionsError,
    Listening,
    /// Reserved for an explicit "awaiting first response chunk" phase.
    /// Nothing transitions here yet.
    Processing,
    Speaking,
    Error,
}

impl AssistantState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::PermissionsError => "PERMISSIONS_ERROR",
            Self::Listening => "LISTENING",
            Self::Processing => "PROCESSING",
            Self::Speaking => "SPEAKING",
            Self::Error => "ERROR",
        }
    }

    /// Error states absorb every further event for the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PermissionsError | Self::Error)
    }
}

impl fmt::Display for AssistantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable output for the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssistantStatus {
    pub state: AssistantState,
    pub error: String,
}

/// Inputs to the machine
#[derive(Debug)]
pub enum Event {
    /// Microphone/camera could not be acquired
    PermissionDenied,
    /// Remote session is ready for realtime input
    SessionOpened,
    /// Remote session failed
    SessionError(String),
    /// One slice of synthesized speech
    AudioChunk(Vec<u8>),
    /// Capture measured user energy above the threshold while speaking
    BargeIn,
    /// Remote side finished its turn
    TurnComplete,
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Attach the capture pipeline and the frame loop
    StartCapture,
    /// Hard-stop playback, dropping anything booked
    StopPlayback,
    /// Book this chunk on the playback scheduler
    Render(Vec<u8>),
    /// Release every media resource and the session
    Teardown,
}

/// Single-owner turn state machine
#[derive(Debug, Default)]
pub struct TurnMachine {
    state: AssistantState,
    /// Set on interruption, cleared by the next chunk or turn-complete
    barged_in: bool,
    error: String,
    /// Drained after each event
    actions: Vec<Action>,
}

impl TurnMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AssistantState {
        self.state
    }

    pub fn is_barged_in(&self) -> bool {
        self.barged_in
    }

    pub fn status(&self) -> AssistantStatus {
        AssistantStatus {
            state: self.state,
            error: self.error.clone(),
        }
    }

    /// Apply one event.
    pub fn on_event(&mut self, event: Event) {
        if self.state.is_terminal() {
            debug!("Ignoring {:?} in terminal state {}", event, self.state);
            return;
        }

        match (self.state, event) {
            (AssistantState::Idle, Event::PermissionDenied) => {
                warn!("Media permission denied");
                self.error = PERMISSION_DENIED_MESSAGE.to_string();
                self.transition(AssistantState::PermissionsError);
            }

            (AssistantState::Idle, Event::SessionOpened) => {
                self.transition(AssistantState::Listening);
                self.actions.push(Action::StartCapture);
            }

            (_, Event::SessionError(reason)) => {
                warn!("Session error: {}", reason);
                self.error = CONNECTION_ERROR_MESSAGE.to_string();
                self.barged_in = false;
                self.transition(AssistantState::Error);
                self.actions.push(Action::Teardown);
            }

            // First chunk after an interruption opens the new reply.
            (_, Event::AudioChunk(chunk)) if self.barged_in => {
                debug!("First chunk after barge-in ({} bytes)", chunk.len());
                self.barged_in = false;
                self.transition(AssistantState::Speaking);
                self.actions.push(Action::Render(chunk));
            }

            (_, Event::AudioChunk(chunk)) => {
                if self.state != AssistantState::Speaking {
                    self.transition(AssistantState::Speaking);
                }
                self.actions.push(Action::Render(chunk));
            }

            (AssistantState::Speaking, Event::BargeIn) if !self.barged_in => {
                info!("Barge-in detected");
                self.barged_in = true;
                self.actions.push(Action::StopPlayback);
                self.transition(AssistantState::Listening);
            }

            (_, Event::TurnComplete) => {
                self.barged_in = false;
                if self.state != AssistantState::Listening {
                    self.transition(AssistantState::Listening);
                }
            }

            (state, event) => {
                debug!("No transition for {:?} in {}", event, state);
            }
        }
    }

    /// Take every queued action.
    pub fn drain_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.actions)
    }

    fn transition(&mut self, next: AssistantState) {
        info!("State {} -> {}", self.state, next);
        self.state = next;
    }
}
