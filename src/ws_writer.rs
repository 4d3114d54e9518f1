//! WebSocket writer task that serializes and sends all outgoing messages
//! This is the single point where producers' messages are serialized to JSON

use crate::gemini::ClientMessage;
use futures_util::{Sink, SinkExt};
use std::fmt::Display;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace};

/// Drain `outgoing_rx` into the socket until every producer is gone or the
/// socket fails, then close the socket.
pub async fn run_writer<S>(mut outgoing_rx: UnboundedReceiver<ClientMessage>, mut sink: S)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    info!("WebSocket writer task started");
    let mut sent = 0u64;

    while let Some(msg) = outgoing_rx.recv().await {
        let json = match msg.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize outgoing message: {}", e);
                continue;
            }
        };

        if let ClientMessage::Setup(_) = msg {
            debug!("Sending setup message");
        } else {
            trace!("Sending realtime input ({} bytes)", json.len());
        }

        if let Err(e) = sink.send(Message::Text(json.into())).await {
            error!("Failed to send to websocket: {}", e);
            break;
        }
        sent += 1;
    }

    if let Err(e) = sink.close().await {
        debug!("WebSocket close failed: {}", e);
    }
    info!("WebSocket writer task shutting down after {} messages", sent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EncodedAudioPayload;
    use crate::gemini::GeminiClientConfig;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    fn recording_sink(
        log: Arc<Mutex<Vec<String>>>,
    ) -> impl Sink<Message, Error = Infallible> + Unpin {
        Box::pin(futures_util::sink::unfold(log, |log, msg: Message| async move {
            if let Message::Text(text) = msg {
                log.lock().unwrap().push(text.to_string());
            }
            Ok::<_, Infallible>(log)
        }))
    }

    #[tokio::test]
    async fn test_messages_are_written_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(ClientMessage::Setup(GeminiClientConfig::default().setup()))
            .unwrap();
        tx.send(ClientMessage::RealtimeInput(
            EncodedAudioPayload {
                data: "AAAA".to_string(),
            }
            .into(),
        ))
        .unwrap();
        drop(tx);

        run_writer(rx, recording_sink(log.clone())).await;

        let written = log.lock().unwrap().clone();
        assert_eq!(written.len(), 2);
        assert!(written[0].starts_with(r#"{"setup":"#));
        assert_eq!(
            written[1],
            r#"{"realtimeInput":{"audio":{"data":"AAAA","mimeType":"audio/pcm;rate=16000"}}}"#
        );
    }

    #[tokio::test]
    async fn test_writer_stops_when_producers_are_gone() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel::<ClientMessage>();
        drop(tx);
        run_writer(rx, recording_sink(log.clone())).await;
        assert!(log.lock().unwrap().is_empty());
    }
}
