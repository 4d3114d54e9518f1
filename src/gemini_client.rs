//! Gemini Live session gateway
//!
//! The socket is split into a write half, owned by the writer task in
//! [`crate::ws_writer`], and a read half, owned by the reader task spawned
//! here. Producers on the capture and video threads push [`ClientMessage`]s
//! into an unbounded channel and never wait.

use crate::events::{RealtimeInput, SessionEvent};
use crate::gateway::{RealtimeSender, SessionEventSender, SessionGateway};
use crate::gemini::{
    parse_server_message, redact_url, server_content_events, ClientMessage, GeminiClientConfig,
    GeminiError, Result, ServerMessage,
};
use crate::ws_writer::run_writer;

use futures_util::{Stream, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, warn};

/// Live session state shared with the background tasks
#[derive(Default)]
struct Session {
    outgoing: Option<UnboundedSender<ClientMessage>>,
    tasks: Vec<JoinHandle<()>>,
}

/// [`SessionGateway`] over the Gemini Live WebSocket
pub struct GeminiGateway {
    config: GeminiClientConfig,
    connected: Arc<AtomicBool>,
    session: Mutex<Session>,
    dropped_inputs: AtomicU64,
}

impl GeminiGateway {
    pub fn new(config: GeminiClientConfig) -> Self {
        Self {
            config,
            connected: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(Session::default()),
            dropped_inputs: AtomicU64::new(0),
        }
    }

    pub fn from_api_key(api_key: &str) -> Self {
        Self::new(GeminiClientConfig::from_api_key(api_key))
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open the socket, send setup and wait for the acknowledgment. On
    /// success the reader task owns the rest of the stream.
    async fn open(&self, events: &SessionEventSender) -> Result<()> {
        info!("Connecting to Gemini API at {}", redact_url(&self.config.url));

        let (ws_stream, resp) = connect_async(self.config.url.as_str()).await?;
        debug!("WebSocket connection response: {:?}", resp.status());

        let (sink, mut stream) = ws_stream.split();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let writer = tokio::spawn(run_writer(outgoing_rx, sink));

        info!("Sending setup message with model: {}", self.config.model);
        if outgoing_tx
            .send(ClientMessage::Setup(self.config.setup()))
            .is_err()
        {
            writer.abort();
            return Err(GeminiError::ChannelClosed);
        }

        let setup = tokio::time::timeout(self.config.setup_timeout, wait_for_setup_complete(&mut stream)).await;
        match setup {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                writer.abort();
                return Err(e);
            }
            Err(_) => {
                error!("Timeout waiting for setup complete message");
                writer.abort();
                return Err(GeminiError::Timeout);
            }
        }

        self.connected.store(true, Ordering::SeqCst);
        info!("Gemini session setup complete");
        if events.send(SessionEvent::Open).is_err() {
            debug!("Session event receiver dropped before open");
        }

        let reader = tokio::spawn(read_loop(stream, events.clone(), self.connected.clone()));

        let mut session = self.session();
        session.outgoing = Some(outgoing_tx);
        session.tasks = vec![writer, reader];
        Ok(())
    }
}

impl RealtimeSender for GeminiGateway {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send_realtime_input(&self, input: RealtimeInput) {
        if input.is_empty() {
            return;
        }
        if !self.is_connected() {
            // one warning per burst; capture keeps calling every block
            if self.dropped_inputs.fetch_add(1, Ordering::Relaxed) % 100 == 0 {
                warn!("Not connected, cannot send realtime input");
            }
            return;
        }

        let session = self.session();
        let Some(tx) = session.outgoing.as_ref() else {
            warn!("Not connected, cannot send realtime input");
            return;
        };
        if tx.send(ClientMessage::RealtimeInput(input)).is_err() {
            warn!("WebSocket writer is gone, dropping realtime input");
        }
    }
}

impl SessionGateway for GeminiGateway {
    fn connect(&self, events: SessionEventSender) -> impl Future<Output = ()> + Send {
        async move {
            {
                let session = self.session();
                if session.outgoing.is_some() || self.is_connected() {
                    info!("Already connected");
                    return;
                }
            }

            if let Err(e) = self.open(&events).await {
                error!("Failed to connect to Gemini Live: {}", e);
                self.connected.store(false, Ordering::SeqCst);
                let _ = events.send(SessionEvent::Error(e.to_string()));
            }
        }
    }

    fn disconnect(&self) {
        let session = std::mem::take(&mut *self.session());
        self.connected.store(false, Ordering::SeqCst);

        if session.outgoing.is_none() && session.tasks.is_empty() {
            return;
        }

        // dropping the sender lets the writer close the socket
        drop(session.outgoing);
        for task in session.tasks {
            if !task.is_finished() {
                task.abort();
            }
        }
        info!("Gemini Live: disconnected");
    }
}

impl Drop for GeminiGateway {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Text of a data frame. The server sometimes sends JSON as binary frames.
fn frame_text(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text.as_str().to_string()),
        Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(text),
            Err(_) => {
                debug!("Received binary message ({} bytes)", bytes.len());
                None
            }
        },
        _ => None,
    }
}

async fn wait_for_setup_complete<S>(stream: &mut S) -> Result<()>
where
    S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    while let Some(message) = stream.next().await {
        let message = message?;
        if let Message::Close(frame) = &message {
            info!("WebSocket closed during setup: {:?}", frame);
            return Err(GeminiError::ConnectionClosed);
        }
        let Some(text) = frame_text(message) else {
            continue;
        };
        match parse_server_message(&text)? {
            ServerMessage::SetupComplete { .. } => return Ok(()),
            other => debug!("Ignoring message before setup complete: {:?}", other),
        }
    }
    Err(GeminiError::ConnectionClosed)
}

/// Forward inbound frames as session events until the socket ends.
async fn read_loop<S>(mut stream: S, events: SessionEventSender, connected: Arc<AtomicBool>)
where
    S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    info!("Inbound message task started");

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(Message::Close(frame)) => {
                info!("WebSocket closed: {:?}", frame);
                break;
            }
            Ok(message) => message,
            Err(e) => {
                error!("WebSocket error: {}", e);
                connected.store(false, Ordering::SeqCst);
                let _ = events.send(SessionEvent::Error(GeminiError::WebSocket(e).to_string()));
                return;
            }
        };

        let Some(text) = frame_text(message) else {
            continue;
        };

        match parse_server_message(&text) {
            Ok(ServerMessage::ServerContent { server_content }) => {
                for event in server_content_events(&server_content) {
                    if events.send(event).is_err() {
                        debug!("Session event receiver dropped");
                        connected.store(false, Ordering::SeqCst);
                        return;
                    }
                }
            }
            Ok(ServerMessage::GoAway { go_away }) => {
                info!("Server requested disconnection: {}", go_away);
            }
            Ok(ServerMessage::SetupComplete { .. }) => {
                debug!("Duplicate setup complete");
            }
            Ok(ServerMessage::ToolCall { .. }) => {
                debug!("Ignoring tool call");
            }
            Err(e) => {
                warn!("Failed to parse server message: {}", e);
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    info!("Inbound message task terminated");
}
