//! WebSocket handler — live presence feed.
//!
//! DESIGN
//! ======
//! Each connection subscribes to the snapshot publisher's watch channel and
//! enters a `select!` loop:
//! - Inbound frames → reset the read deadline (content is ignored)
//! - Snapshot published → send the full serialized snapshot
//! - Ping tick → send a ping so idle peers answer with a pong
//! - Read deadline elapsed → drop the connection
//!
//! Clients always receive the full state, never a delta. A client that
//! lags behind several publishes only gets the newest one.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send the current snapshot if one has been published
//! 2. Loop until close, read error, send error or deadline
//! 3. Drop: the watch receiver unsubscribes on its own

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::state::AppState;

/// Inbound messages larger than this close the connection.
pub const MAX_MESSAGE_SIZE: usize = 512;

/// Per-connection deadlines.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// Time allowed between inbound frames (pongs included).
    pub read_wait: Duration,
    /// Time allowed for one outbound send.
    pub write_wait: Duration,
    /// Ping period. Must be shorter than `read_wait`.
    pub ping_period: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        let read_wait = Duration::from_secs(60);
        Self { read_wait, write_wait: Duration::from_secs(10), ping_period: read_wait * 9 / 10 }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| run_ws(socket, state, Timings::default()))
}

// =============================================================================
// CONNECTION
// =============================================================================

#[derive(Debug)]
struct SendFailed;

async fn send(socket: &mut WebSocket, msg: Message, timings: Timings) -> Result<(), SendFailed> {
    match tokio::time::timeout(timings.write_wait, socket.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            debug!(error = %e, "ws: send failed");
            Err(SendFailed)
        }
        Err(_) => {
            debug!(write_wait = ?timings.write_wait, "ws: write deadline exceeded");
            Err(SendFailed)
        }
    }
}

async fn run_ws(mut socket: WebSocket, state: AppState, timings: Timings) {
    let client_id = Uuid::new_v4();
    let mut updates = state.snapshot.subscribe();

    let initial = updates.borrow_and_update().clone();
    if initial.is_published()
        && send(&mut socket, Message::Text(initial.data.to_string().into()), timings)
            .await
            .is_err()
    {
        return;
    }

    info!(%client_id, "ws: client connected");

    let mut ping = tokio::time::interval_at(Instant::now() + timings.ping_period, timings.ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let read_deadline = tokio::time::sleep(timings.read_wait);
    tokio::pin!(read_deadline);

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    None | Some(Ok(Message::Close(_))) => break,
                    Some(Err(e)) => {
                        debug!(%client_id, error = %e, "ws: read failed");
                        break;
                    }
                    Some(Ok(_)) => read_deadline.as_mut().reset(Instant::now() + timings.read_wait),
                }
            }
            () = &mut read_deadline => {
                info!(%client_id, "ws: read deadline exceeded");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if send(&mut socket, Message::Text(snapshot.data.to_string().into()), timings).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if send(&mut socket, Message::Ping(Bytes::new()), timings).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(%client_id, "ws: client disconnected");
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
