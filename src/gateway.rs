//! Session gateway contract
//!
//! The core only needs to push realtime input and to hear about session
//! events. Capture threads hold an `Arc<dyn RealtimeSender>`; the session
//! driver holds the full [`SessionGateway`].

use crate::events::{RealtimeInput, SessionEvent};
use std::future::Future;
use tokio::sync::mpsc::UnboundedSender;

/// Channel the gateway reports inbound session events on
pub type SessionEventSender = UnboundedSender<SessionEvent>;

/// Fire-and-forget uplink
pub trait RealtimeSender: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Never waits. Implementations warn and drop the input when not
    /// connected, and send nothing for an empty input.
    fn send_realtime_input(&self, input: RealtimeInput);
}

/// A connection to the remote conversational backend
pub trait SessionGateway: RealtimeSender + 'static {
    /// Open a session. Events (including `Open` and `Error`) are delivered on
    /// `events`. At most one session is active per gateway.
    fn connect(&self, events: SessionEventSender) -> impl Future<Output = ()> + Send;

    /// Close the live session, if any. Idempotent.
    fn disconnect(&self);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Records everything sent; connect emits `Open` unless told to fail.
    #[derive(Default)]
    pub struct FakeGateway {
        pub connected: AtomicBool,
        pub fail_connect: bool,
        pub sent: Mutex<Vec<RealtimeInput>>,
        pub disconnects: Mutex<usize>,
        pub events: Mutex<Option<SessionEventSender>>,
    }

    impl FakeGateway {
        pub fn connected() -> Self {
            let gateway = Self::default();
            gateway.connected.store(true, Ordering::SeqCst);
            gateway
        }

        pub fn sent(&self) -> Vec<RealtimeInput> {
            self.sent.lock().unwrap().clone()
        }

        /// Push an event as if it came from the remote side.
        pub fn emit(&self, event: SessionEvent) {
            if let Some(tx) = self.events.lock().unwrap().as_ref() {
                let _ = tx.send(event);
            }
        }
    }

    impl RealtimeSender for FakeGateway {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn send_realtime_input(&self, input: RealtimeInput) {
            if !self.is_connected() || input.is_empty() {
                return;
            }
            self.sent.lock().unwrap().push(input);
        }
    }

    impl SessionGateway for FakeGateway {
        fn connect(&self, events: SessionEventSender) -> impl Future<Output = ()> + Send {
            if self.fail_connect {
                let _ = events.send(SessionEvent::Error("refused".into()));
            } else {
                self.connected.store(true, Ordering::SeqCst);
                let _ = events.send(SessionEvent::Open);
            }
            *self.events.lock().unwrap() = Some(events);
            async {}
        }

        fn disconnect(&self) {
            self.connected.store(false, Ordering::SeqCst);
            *self.disconnects.lock().unwrap() += 1;
        }
    }
}
