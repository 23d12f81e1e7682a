//! WebSocket event types and broadcasting for live session updates.
//!
//! Front ends subscribe at `/ws` instead of polling the session endpoint.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, includes the current session
//! - `phase_changed` - Sent on every phase transition
//!
//! # Example
//!
//! ```no_run
//! use snapsolve_tutor::websocket::{EventBroadcaster, SessionEvent};
//! use snapsolve_tutor::Session;
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::connected(Session::new()));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::session::{PhaseKind, Session};

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// The session as of connection time.
    pub session: Session,
}

/// Payload for the `phase_changed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseChangedPayload {
    /// Phase before the transition.
    pub from: PhaseKind,
    /// Phase after the transition.
    pub to: PhaseKind,
    /// The session after the transition.
    pub session: Session,
    /// When the transition happened.
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Session events pushed to WebSocket clients.
///
/// All events are serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// Sent on every phase transition.
    PhaseChanged(PhaseChangedPayload),
}

impl SessionEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(session: Session) -> Self {
        Self::Connected(ConnectedPayload { session })
    }

    /// Creates a `PhaseChanged` event from the session after a transition.
    #[must_use]
    pub fn phase_changed(from: PhaseKind, session: Session) -> Self {
        Self::PhaseChanged(PhaseChangedPayload {
            from,
            to: session.kind(),
            session,
            timestamp: Utc::now(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::PhaseChanged(_) => "phase_changed",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts session events to all connected WebSocket clients.
///
/// Events are not kept for clients that connect later.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a new `EventBroadcaster` with the specified per-subscriber
    /// buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber for receiving events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event, returning how many subscribers will receive it.
    pub fn send(&self, event: SessionEvent) -> usize {
        // Err only means nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// WebSocket upgrade handler for `/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drives one WebSocket connection.
///
/// Sends `connected` first, then forwards broadcast events, pinging every
/// 30 seconds and closing after 3 unanswered pings.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so no transition falls in between
    let mut event_receiver = state.controller.subscribe();
    let session = state.controller.snapshot().await;

    let connected_json = match serde_json::to_string(&SessionEvent::connected(session)) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize connected event");
            return;
        }
    };

    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!(subscribers = state.controller.subscriber_count(), "WebSocket client connected");

    let mut heartbeat_interval = interval(HEARTBEAT_INTERVAL);
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        debug!("Ignoring data message from client");
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket receive failed");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            event = event_receiver.recv() => {
                match event {
                    Ok(session_event) => {
                        let json = match serde_json::to_string(&session_event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!(event = session_event.event_name(), error = %e, "Failed to serialize event");
                                continue;
                            }
                        };

                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "Client lagged behind session events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Broadcaster closed");
                        break;
                    }
                }
            }

            _ = heartbeat_interval.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!(missed_pongs, "Client stopped answering pings, closing connection");
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

// ============================================================================
// Tests
// ============================================================================
