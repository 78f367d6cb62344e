//! WebSocket handler — per-connection room event dispatch.
//!
//! DESIGN
//! ======
//! On upgrade, generates a connection ID and enters a `select!` loop:
//! - Incoming client frames → parse + dispatch by event name
//! - Broadcast frames from room peers → forward to client
//!
//! Handlers validate the payload and call into the room service, which
//! applies the change and fans it out to peers under the store's write lock.
//! Handlers return an `Outcome` describing what, if anything, goes back to
//! the sender; the dispatch layer owns the reply.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `connected` with the connection id
//! 2. Client sends frames → dispatch → handler returns Outcome
//! 3. `join-room` moves the connection between rooms; at most one at a time
//! 4. Close → leave the current room → `user-left` to remaining members

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::{Data, ErrorCode, Frame, Status};
use crate::item::CanvasItem;
use crate::services::{history, room};
use crate::services::room::BackgroundPatch;
use crate::state::AppState;

const DEFAULT_USERNAME: &str = "anonymous";

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. Peer broadcasts already happened
/// inside the room service; this only covers the sender.
enum Outcome {
    /// Send an event with this payload to the sender only.
    Reply(&'static str, Data),
    /// Nothing goes back to the sender.
    Silent,
}

/// Request-level failures, reported to the sender as an `error` frame.
#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error("roomId required")]
    MissingRoom,
    #[error("{0} required")]
    MissingField(&'static str),
    #[error("invalid background settings: {0}")]
    InvalidBackground(serde_json::Error),
    #[error("unknown event: {0}")]
    UnknownEvent(String),
}

impl ErrorCode for RequestError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingRoom | Self::MissingField(_) | Self::InvalidBackground(_) => "E_INVALID_PAYLOAD",
            Self::UnknownEvent(_) => "E_UNKNOWN_EVENT",
        }
    }
}

/// Per-connection state the dispatcher carries between frames.
pub(crate) struct Session {
    pub(crate) client_id: Uuid,
    /// Room this connection is currently joined to.
    pub(crate) current_room: Option<String>,
}

impl Session {
    pub(crate) fn new(client_id: Uuid) -> Self {
        Self { client_id, current_room: None }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let mut session = Session::new(Uuid::new_v4());
    let client_id = session.client_id;

    // Per-connection channel for receiving broadcast frames from peers.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(state.config.client_channel_capacity);

    let welcome = Frame::event("connected", Data::new()).with_data("connectionId", client_id.to_string());
    if send_frame(&mut socket, &welcome).await.is_err() {
        return;
    }

    info!(%client_id, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&state, &mut session, &client_tx, text.as_str()).await;
                        for frame in replies {
                            let _ = send_frame(&mut socket, &frame).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    disconnect(&state, &mut session).await;
    info!(%client_id, "ws: client disconnected");
}

/// Leave whatever room the session occupies.
pub(crate) async fn disconnect(state: &AppState, session: &mut Session) {
    if let Some(room_id) = session.current_room.take() {
        room::leave_room(&state.rooms, &room_id, session.client_id).await;
    }
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
///
/// Kept apart from the socket so tests can drive dispatch with plain
/// channels.
pub(crate) async fn process_inbound_text(
    state: &AppState,
    session: &mut Session,
    client_tx: &mpsc::Sender<Frame>,
    text: &str,
) -> Vec<Frame> {
    let client_id = session.client_id;
    let req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            return vec![Frame::protocol_error("E_INVALID_JSON", format!("invalid json: {e}"))];
        }
    };

    info!(%client_id, id = %req.id, event = %req.event, room_id = ?req.target_room(), "ws: recv frame");

    let result = match req.event.as_str() {
        "join-room" => handle_join(state, session, client_tx, &req).await,
        "leave-room" => {
            disconnect(state, session).await;
            Ok(Outcome::Silent)
        }
        "update-item" | "add-item" => handle_item(state, session, &req).await,
        "delete-item" => handle_delete(state, session, &req).await,
        "update-background" => handle_background(state, session, &req).await,
        "sync-canvas" => handle_sync(state, session, &req).await,
        "get-moodboard-history" => handle_history(state, session, &req).await,
        "get-history-dates" => handle_history_dates(state, session, &req).await,
        other => Err(req.error_from(&RequestError::UnknownEvent(other.to_owned()))),
    };

    match result {
        Ok(Outcome::Reply(event, data)) => {
            let mut reply = req.reply(event, data);
            if let Some(room_id) = request_room(session, &req) {
                reply.room_id = Some(room_id);
            }
            vec![reply]
        }
        Ok(Outcome::Silent) => vec![],
        Err(err_frame) => {
            warn!(
                %client_id,
                event = %req.event,
                code = err_frame.str_field(crate::frame::FRAME_CODE).unwrap_or("-"),
                message = err_frame.str_field(crate::frame::FRAME_MESSAGE).unwrap_or("-"),
                "ws: request rejected"
            );
            vec![err_frame]
        }
    }
}

/// Room addressed by a request: the frame's own room, else the joined room.
fn request_room(session: &Session, req: &Frame) -> Option<String> {
    req.target_room()
        .map(str::to_owned)
        .or_else(|| session.current_room.clone())
}

fn require_room(session: &Session, req: &Frame) -> Result<String, Frame> {
    request_room(session, req).ok_or_else(|| req.error_from(&RequestError::MissingRoom))
}

// =============================================================================
// MEMBERSHIP HANDLERS
// =============================================================================

async fn handle_join(
    state: &AppState,
    session: &mut Session,
    client_tx: &mpsc::Sender<Frame>,
    req: &Frame,
) -> Result<Outcome, Frame> {
    // Only the frame's own room counts here; the joined room is what we leave.
    let Some(room_id) = req.target_room().map(str::to_owned) else {
        return Err(req.error_from(&RequestError::MissingRoom));
    };
    let username = req
        .str_field("username")
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_USERNAME);

    if let Some(previous) = session.current_room.take() {
        // Re-joining the same room keeps one membership entry; skip the
        // user-left a peer would otherwise see.
        if previous != room_id {
            room::leave_room(&state.rooms, &previous, session.client_id).await;
        }
    }

    let data = room::join_room(&state.rooms, &room_id, session.client_id, username, client_tx.clone()).await;
    session.current_room = Some(room_id);
    Ok(Outcome::Reply("room-state", data))
}

// =============================================================================
// MUTATION HANDLERS
// =============================================================================

async fn handle_item(state: &AppState, session: &Session, req: &Frame) -> Result<Outcome, Frame> {
    let room_id = require_room(session, req)?;
    let item = CanvasItem::from_payload(req.data.get("item")).map_err(|e| req.error_from(&e))?;

    if req.event == "add-item" {
        room::add_item(&state.rooms, &room_id, session.client_id, item).await;
    } else {
        room::update_item(&state.rooms, &room_id, session.client_id, item).await;
    }
    Ok(Outcome::Silent)
}

async fn handle_delete(state: &AppState, session: &Session, req: &Frame) -> Result<Outcome, Frame> {
    let room_id = require_room(session, req)?;
    let Some(item_id) = req.str_field("itemId") else {
        return Err(req.error_from(&RequestError::MissingField("itemId")));
    };
    room::delete_item(&state.rooms, &room_id, session.client_id, item_id).await;
    Ok(Outcome::Silent)
}

async fn handle_background(state: &AppState, session: &Session, req: &Frame) -> Result<Outcome, Frame> {
    let room_id = require_room(session, req)?;
    let patch = BackgroundPatch::from_data(&req.data)
        .map_err(|e| req.error_from(&RequestError::InvalidBackground(e)))?;
    room::update_background(&state.rooms, &room_id, session.client_id, &patch).await;
    Ok(Outcome::Silent)
}

async fn handle_sync(state: &AppState, session: &Session, req: &Frame) -> Result<Outcome, Frame> {
    let room_id = require_room(session, req)?;
    let items = CanvasItem::list_from_payload(req.data.get("items")).map_err(|e| req.error_from(&e))?;
    let background = match req.data.get("background") {
        Some(value) if !value.is_null() => Some(
            BackgroundPatch::from_value(value.clone())
                .map_err(|e| req.error_from(&RequestError::InvalidBackground(e)))?,
        ),
        _ => None,
    };

    room::sync_canvas(&state.rooms, &room_id, session.client_id, items, background.as_ref()).await;
    Ok(Outcome::Silent)
}

// =============================================================================
// HISTORY HANDLERS
// =============================================================================

async fn handle_history(state: &AppState, session: &Session, req: &Frame) -> Result<Outcome, Frame> {
    let room_id = require_room(session, req)?;
    let date = req.str_field("date").unwrap_or_default();
    let data = history::moodboard_history(state.archive.as_ref(), &room_id, date).await;
    Ok(Outcome::Reply("moodboard-history-data", data))
}

async fn handle_history_dates(state: &AppState, session: &Session, req: &Frame) -> Result<Outcome, Frame> {
    let room_id = require_room(session, req)?;
    let data = history::history_dates(state.archive.as_ref(), &room_id).await;
    Ok(Outcome::Reply("history-dates", data))
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error {
        let code = frame.str_field(crate::frame::FRAME_CODE).unwrap_or("-");
        let message = frame.str_field(crate::frame::FRAME_MESSAGE).unwrap_or("-");
        warn!(id = %frame.id, event = %frame.event, code, message, "ws: send frame status=Error");
    } else {
        info!(id = %frame.id, event = %frame.event, "ws: send frame");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
