//! WebSocket signaling client with auto-reconnect.
//!
//! One background task owns the socket: it forwards outbound messages from
//! the session, decodes inbound frames onto the session's channel, and on
//! any socket error tears the connection down and retries with a fixed
//! backoff. While disconnected, [`SignalingClient::send`] fails fast with
//! `Unavailable`; already-connected peer sessions are unaffected.

use super::{SignalingClient, SignalingError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use signal_protocol::SignalMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Buffer for messages queued toward the socket writer.
const OUTBOUND_BUFFER: usize = 64;

/// Buffer for decoded inbound messages toward the session.
const INBOUND_BUFFER: usize = 256;

/// Signaling over a WebSocket carrying one JSON message per text frame.
pub struct WsSignalingClient {
    outbound: mpsc::Sender<SignalMessage>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl WsSignalingClient {
    /// Connect to `url` in the background and return the client plus the
    /// inbound message stream for the session manager.
    ///
    /// The connection is retried with a fixed `retry_interval` backoff until
    /// [`WsSignalingClient::shutdown`] is called or every receiver is gone.
    #[must_use]
    pub fn connect(
        url: impl Into<String>,
        retry_interval: Duration,
    ) -> (Arc<Self>, mpsc::Receiver<SignalMessage>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let connected = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        tokio::spawn(connection_loop(
            url.into(),
            retry_interval,
            Arc::clone(&connected),
            inbound_tx,
            outbound_rx,
            cancel.clone(),
        ));

        (
            Arc::new(Self {
                outbound: outbound_tx,
                connected,
                cancel,
            }),
            inbound_rx,
        )
    }

    /// Whether the socket is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Stop the background connection task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WsSignalingClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl SignalingClient for WsSignalingClient {
    async fn send(&self, message: SignalMessage) -> Result<(), SignalingError> {
        if !self.is_connected() {
            return Err(SignalingError::Unavailable(
                "websocket disconnected".to_string(),
            ));
        }
        self.outbound
            .send(message)
            .await
            .map_err(|_| SignalingError::Unavailable("connection task stopped".to_string()))
    }
}

/// Background task managing the socket with auto-reconnect.
async fn connection_loop(
    url: String,
    retry_interval: Duration,
    connected: Arc<AtomicBool>,
    inbound_tx: mpsc::Sender<SignalMessage>,
    mut outbound_rx: mpsc::Receiver<SignalMessage>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!(target: "meet.signal", "Signaling socket connected");
                connected.store(true, Ordering::Release);

                let (mut write, mut read) = stream.split();
                let mut session_gone = false;

                loop {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            let _ = write.send(WsMessage::Close(None)).await;
                            session_gone = true;
                            break;
                        }

                        outbound = outbound_rx.recv() => {
                            match outbound {
                                Some(message) => {
                                    let text = match signal_protocol::encode(&message) {
                                        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                                        Err(e) => {
                                            warn!(target: "meet.signal", error = %e, "Dropping unencodable message");
                                            continue;
                                        }
                                    };
                                    if write.send(WsMessage::Text(text)).await.is_err() {
                                        warn!(target: "meet.signal", "Socket write failed");
                                        break;
                                    }
                                }
                                None => {
                                    // Client dropped; nothing left to do.
                                    session_gone = true;
                                    break;
                                }
                            }
                        }

                        frame = read.next() => {
                            match frame {
                                Some(Ok(WsMessage::Text(text))) => {
                                    match signal_protocol::decode_str(text.trim_end()) {
                                        Ok(message) => {
                                            if inbound_tx.send(message).await.is_err() {
                                                session_gone = true;
                                                break;
                                            }
                                        }
                                        Err(e) => {
                                            warn!(target: "meet.signal", error = %e, "Dropping malformed frame");
                                        }
                                    }
                                }
                                Some(Ok(WsMessage::Close(_))) | None => {
                                    info!(target: "meet.signal", "Signaling socket closed by server");
                                    break;
                                }
                                Some(Ok(_)) => {
                                    // Ping/pong handled by tungstenite; binary ignored.
                                }
                                Some(Err(e)) => {
                                    warn!(target: "meet.signal", error = %e, "Socket read error");
                                    break;
                                }
                            }
                        }
                    }
                }

                connected.store(false, Ordering::Release);
                if session_gone {
                    break;
                }
            }
            Err(e) => {
                debug!(target: "meet.signal", error = %e, "Signaling connect failed");
            }
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(retry_interval) => {}
        }
    }

    connected.store(false, Ordering::Release);
    debug!(target: "meet.signal", "Signaling connection task stopped");
}
