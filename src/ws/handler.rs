//! WebSocket upgrade handler and per-connection gateway

use std::fmt::Display;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::error::GatewayError;
use crate::ws::protocol::{ClientMsg, JoinAck, ProtocolError, ServerMsg};

/// Frames a session may queue for one connection before it starts dropping
pub const OUTBOUND_BUFFER: usize = 64;

/// Query parameters for `GET /match`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchQuery {
    #[serde(default)]
    pub player_name: Option<String>,
    /// Present without a value counts as true
    #[serde(default)]
    pub is_single_player: Option<String>,
}

impl MatchQuery {
    /// Trimmed player name, `None` when missing or blank
    pub fn player_name(&self) -> Option<&str> {
        self.player_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn is_single_player(&self) -> bool {
        match self.is_single_player.as_deref().map(str::trim) {
            None => false,
            Some("") => true,
            Some(flag) => ["true", "1", "yes", "on"]
                .iter()
                .any(|truthy| flag.eq_ignore_ascii_case(truthy)),
        }
    }
}

/// WebSocket upgrade handler. Handshake validation happens after the
/// upgrade so failures can be reported with a close code.
pub async fn match_ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<MatchQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        serve_connection(state, query, sink, stream).await;
    })
}

/// Drive one client connection from handshake to cleanup
pub async fn serve_connection<K, S, E>(state: AppState, query: MatchQuery, mut sink: K, mut stream: S)
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let Some(player_name) = query.player_name().map(str::to_string) else {
        reject(&mut sink, GatewayError::MissingName, None).await;
        return;
    };

    let Some(claim) = state.connections.claim(&player_name) else {
        reject(&mut sink, GatewayError::DuplicateName, Some(player_name.as_str())).await;
        return;
    };

    let is_single_player = query.is_single_player();
    let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);

    let match_id = match state.registry.join(&player_name, is_single_player, outbound_tx) {
        Ok(id) => id,
        Err(e) => {
            warn!(player = %player_name, error = %e, "Failed to place player in a match");
            reject(&mut sink, GatewayError::JoinFailed(e), Some(player_name.as_str())).await;
            return;
        }
    };
    info!(
        match_id = %match_id,
        player = %player_name,
        single_player = is_single_player,
        "New match connection"
    );

    let ack = JoinAck {
        match_id,
        player_name: player_name.clone(),
    };

    // Session frames wait in the outbound buffer until the ack is out
    let result = match send_json(&mut sink, &ack).await {
        Ok(()) => {
            run_connection(
                &state,
                &player_name,
                match_id,
                &mut sink,
                &mut stream,
                &mut outbound_rx,
            )
            .await
        }
        Err(e) => Err(GatewayError::Socket(e)),
    };

    match result {
        Ok(()) => info!(match_id = %match_id, player = %player_name, "Client closed connection"),
        Err(err) => {
            if let GatewayError::Socket(cause) = &err {
                warn!(match_id = %match_id, player = %player_name, error = %cause, "WebSocket error");
            }
            close(&mut sink, &err).await;
        }
    }

    match state.registry.leave(match_id, &player_name).await {
        Ok(outcome) => debug!(match_id = %match_id, player = %player_name, ?outcome, "Left match"),
        Err(e) => debug!(match_id = %match_id, player = %player_name, error = %e, "Leave skipped"),
    }

    drop(claim);
    info!(match_id = %match_id, player = %player_name, "Match connection closed");
}

/// Pump client frames into the session and session frames out to the client.
/// `Ok` when the client went away cleanly.
async fn run_connection<K, S, E>(
    state: &AppState,
    player_name: &str,
    match_id: Uuid,
    sink: &mut K,
    stream: &mut S,
    outbound: &mut mpsc::Receiver<ServerMsg>,
) -> Result<(), GatewayError>
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let rate_limiter = PlayerRateLimiter::new();
    let mut session_open = true;

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    handle_text(state, player_name, match_id, &text, &rate_limiter)?;
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!(player = %player_name, "Received binary message, ignoring");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Err(e)) => return Err(GatewayError::Socket(e.to_string())),
            },

            msg = outbound.recv(), if session_open => match msg {
                Some(msg) => send_json(sink, &msg).await.map_err(GatewayError::Socket)?,
                None => {
                    debug!(match_id = %match_id, player = %player_name, "Session stopped sending");
                    session_open = false;
                }
            },
        }
    }
}

fn handle_text(
    state: &AppState,
    player_name: &str,
    match_id: Uuid,
    text: &str,
    rate_limiter: &PlayerRateLimiter,
) -> Result<(), GatewayError> {
    let direction = match ClientMsg::decode(text) {
        Ok(ClientMsg::MovePlayer { direction }) => direction,
        Err(ProtocolError::InvalidMove(token)) => {
            warn!(player = %player_name, token = %token, "Invalid move");
            return Err(GatewayError::InvalidMove);
        }
        Err(e) => {
            warn!(player = %player_name, error = %e, "Failed to parse client message");
            return Ok(());
        }
    };

    if !rate_limiter.check_input() {
        warn!(player = %player_name, "Rate limited input message");
        return Ok(());
    }

    let handle = state
        .registry
        .lookup(match_id)
        .ok_or(GatewayError::MatchNotFound)?;
    handle
        .apply_input(player_name, direction)
        .map_err(|_| GatewayError::MatchNotFound)
}

async fn reject<K>(sink: &mut K, err: GatewayError, player_name: Option<&str>)
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    warn!(player = ?player_name, reason = %err, "Rejected match connection");
    close(sink, &err).await;
}

/// Best-effort close frame
async fn close<K>(sink: &mut K, err: &GatewayError)
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    let frame = CloseFrame {
        code: err.close_code(),
        reason: err.reason().into(),
    };
    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Failed to send close frame");
    }
}

/// Send a message over WebSocket
async fn send_json<K, T>(sink: &mut K, msg: &T) -> Result<(), String>
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
    T: Serialize,
{
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
