//! Duplex channel to the remote peer
//!
//! [`ChannelClient`] owns one WebSocket connection. Inbound envelopes and
//! lifecycle transitions are pushed onto the session's event queue as
//! [`TurnEvent`]s, in the order they happen. Outbound sends are
//! fire-and-forget: an envelope sent while not connected is logged and dropped.

mod envelope;

use std::fmt;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

pub use envelope::Envelope;

use crate::audio::AudioContainer;
use crate::turn::TurnEvent;
use crate::{Error, Result};

/// Lifecycle of the duplex connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Outbound side of a channel, as seen by the turn state machine
pub trait EnvelopeSink {
    /// Queue an envelope for delivery
    ///
    /// Returns `false` if the envelope was dropped (not connected).
    fn send(&self, envelope: Envelope) -> bool;

    /// Current connection state
    fn connection_state(&self) -> ConnectionState;
}

enum Outbound {
    Envelope(Envelope),
    Close,
}

/// WebSocket client for one session
pub struct ChannelClient {
    events: mpsc::UnboundedSender<TurnEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    task: Option<JoinHandle<()>>,
}

impl ChannelClient {
    /// Create a disconnected client that reports to `events`
    #[must_use]
    pub fn new(events: mpsc::UnboundedSender<TurnEvent>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            events,
            state: Arc::new(state),
            outbound: None,
            task: None,
        }
    }

    /// Open the connection
    ///
    /// No-op if already connecting or connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Channel`] if the WebSocket handshake fails. The
    /// failure is also reported as [`TurnEvent::ConnectionClosed`].
    pub async fn connect(&mut self, url: &str) -> Result<()> {
        let current = self.state();
        if current != ConnectionState::Disconnected {
            tracing::debug!(state = %current, "connect ignored, channel already active");
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        tracing::info!(url, "connecting");

        let ws = match tokio_tungstenite::connect_async(url).await {
            Ok((ws, _response)) => ws,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                let _ = self.events.send(TurnEvent::ConnectionClosed);
                return Err(Error::Channel(format!("connect to {url} failed: {e}")));
            }
        };

        let (mut sink, mut stream) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
        self.outbound = Some(tx);

        self.set_state(ConnectionState::Connected);
        let _ = self.events.send(TurnEvent::ConnectionOpened);
        tracing::info!(url, "channel connected");

        let events = self.events.clone();
        let state = Arc::clone(&self.state);

        self.task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = rx.recv() => match outbound {
                        Some(Outbound::Envelope(envelope)) => {
                            let text = match envelope.to_json() {
                                Ok(text) => text,
                                Err(e) => {
                                    tracing::error!(error = %e, "failed to serialize envelope");
                                    continue;
                                }
                            };
                            if let Err(e) = sink.send(Message::Text(text.into())).await {
                                tracing::warn!(error = %e, "send failed, closing channel");
                                break;
                            }
                        }
                        Some(Outbound::Close) | None => {
                            let _ = sink.send(Message::Close(None)).await;
                            tracing::debug!("channel closed locally");
                            break;
                        }
                    },
                    inbound = stream.next() => match inbound {
                        Some(Ok(Message::Text(text))) => match Envelope::parse(text.as_str()) {
                            Ok(envelope) => {
                                let _ = events.send(TurnEvent::MessageReceived(envelope));
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "dropping malformed message");
                            }
                        },
                        Some(Ok(Message::Binary(data))) => {
                            let container = AudioContainer::from_bytes(data);
                            let _ = events.send(TurnEvent::MessageReceived(
                                Envelope::with_container(&container),
                            ));
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = sink.send(Message::Pong(data)).await {
                                tracing::warn!(error = %e, "failed to send pong");
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("channel closed by peer");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "channel error");
                            break;
                        }
                        None => break,
                    },
                }
            }

            state.send_replace(ConnectionState::Disconnected);
            let _ = events.send(TurnEvent::ConnectionClosed);
        }));

        Ok(())
    }

    /// Close the connection and wait for the connection task to finish
    pub async fn close(&mut self) {
        if let Some(tx) = self.outbound.take() {
            let _ = tx.send(Outbound::Close);
        }

        match self.task.take() {
            Some(task) => {
                if let Err(e) = task.await {
                    tracing::warn!(error = %e, "channel task ended abnormally");
                }
            }
            None => self.set_state(ConnectionState::Disconnected),
        }
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state transitions
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "connection state");
        }
    }
}

impl EnvelopeSink for ChannelClient {
    fn send(&self, envelope: Envelope) -> bool {
        let state = self.state();
        if state != ConnectionState::Connected {
            tracing::warn!(state = %state, "not connected, dropping outbound envelope");
            return false;
        }

        match &self.outbound {
            Some(tx) if tx.send(Outbound::Envelope(envelope)).is_ok() => true,
            _ => {
                tracing::warn!("channel task gone, dropping outbound envelope");
                false
            }
        }
    }

    fn connection_state(&self) -> ConnectionState {
        self.state()
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
