//! WebSocket message dispatch
//!
//! Each connection carries its session id and the room it is attached to.
//! Handlers call into `AppState` and turn the result into the direct reply
//! for the sender; everyone else in the room is updated by the room broadcast.

use crate::error::GameError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{AppState, RoomHandle};
use crate::state::RoomSnapshot;
use crate::types::{RoomCode, SessionId};
use std::sync::Arc;

/// Per-connection state
pub struct Connection {
    pub session: SessionId,
    pub room: Option<Arc<RoomHandle>>,
    /// Room and version of the last snapshot written to the socket
    last_sent: Option<(RoomCode, u64)>,
}

impl Connection {
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            room: None,
            last_sent: None,
        }
    }

    pub fn room_code(&self) -> Option<&str> {
        self.room.as_ref().map(|h| h.code.as_str())
    }

    /// Whether the client already holds this version of the room or a newer
    /// one. A submitter's direct reply overtakes the broadcasts that were
    /// queued while its round ran; those must not be replayed.
    pub fn has_seen(&self, snapshot: &RoomSnapshot) -> bool {
        matches!(&self.last_sent, Some((code, version))
            if *code == snapshot.code && *version >= snapshot.version)
    }

    /// Note a message that is about to be written to the socket
    pub fn record_sent(&mut self, msg: &ServerMessage) {
        match msg {
            ServerMessage::Room { snapshot } => {
                self.last_sent = Some((snapshot.code.clone(), snapshot.version));
            }
            ServerMessage::Left { .. } => self.last_sent = None,
            _ => {}
        }
    }
}

/// Return early with a `NOT_IN_ROOM` error when the connection has no room
macro_rules! require_room {
    ($conn:expr) => {
        match $conn.room_code() {
            Some(code) => code.to_string(),
            None => return Some(GameError::NotInRoom.into()),
        }
    };
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    conn: &mut Connection,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    let result = match msg {
        ClientMessage::CreateRoom { as_operator } => {
            handle_create_room(state, conn, as_operator).await
        }

        ClientMessage::JoinRoom { code } => handle_join_room(state, conn, &code).await,

        ClientMessage::SubmitMessage { text } => {
            let code = require_room!(conn);
            state
                .submit_message(&code, &conn.session, &text)
                .await
                .map(ServerMessage::room)
        }

        ClientMessage::OperatorMessage { text } => {
            let code = require_room!(conn);
            state
                .operator_message(&code, &conn.session, &text)
                .await
                .map(ServerMessage::room)
        }

        ClientMessage::RevealCounterpart => {
            let code = require_room!(conn);
            state
                .reveal_counterpart(&code, &conn.session)
                .await
                .map(ServerMessage::room)
        }

        ClientMessage::CastVote { seat_id } => {
            let code = require_room!(conn);
            state
                .cast_vote(&code, &conn.session, &seat_id)
                .await
                .map(ServerMessage::from)
        }

        ClientMessage::ResetRoom => {
            let code = require_room!(conn);
            state
                .reset_room(&code, &conn.session)
                .await
                .map(ServerMessage::room)
        }

        ClientMessage::LeaveRoom => {
            let code = require_room!(conn);
            handle_leave_room(state, conn, code).await
        }

        ClientMessage::Sync => {
            let code = require_room!(conn);
            state
                .snapshot(&code, Some(&conn.session))
                .await
                .map(ServerMessage::room)
        }
    };

    Some(result.unwrap_or_else(|e| {
        tracing::debug!(code = e.code(), "Request failed: {}", e);
        ServerMessage::from(e)
    }))
}

async fn handle_create_room(
    state: &Arc<AppState>,
    conn: &mut Connection,
    as_operator: bool,
) -> Result<ServerMessage, GameError> {
    let snapshot = state.create_room(&conn.session, as_operator).await?;
    let handle = state.get_room(&snapshot.code).await?;
    switch_room(state, conn, handle).await;
    Ok(ServerMessage::room(snapshot))
}

async fn handle_join_room(
    state: &Arc<AppState>,
    conn: &mut Connection,
    code: &str,
) -> Result<ServerMessage, GameError> {
    let snapshot = state.join_room(code, &conn.session).await?;
    let handle = state.get_room(&snapshot.code).await?;
    switch_room(state, conn, handle).await;
    Ok(ServerMessage::room(snapshot))
}

async fn handle_leave_room(
    state: &Arc<AppState>,
    conn: &mut Connection,
    code: String,
) -> Result<ServerMessage, GameError> {
    if let Some(handle) = conn.room.take() {
        state.detach(&handle).await;
    }
    match state.leave_room(&code, &conn.session).await {
        // Already gone is as good as left
        Ok(()) | Err(GameError::RoomNotFound(_)) => Ok(ServerMessage::Left { code }),
        Err(e) => Err(e),
    }
}

/// Attach the connection to `handle`, detaching from any previous room
async fn switch_room(state: &Arc<AppState>, conn: &mut Connection, handle: Arc<RoomHandle>) {
    if let Some(previous) = conn.room.take() {
        if Arc::ptr_eq(&previous, &handle) {
            conn.room = Some(previous);
            return;
        }
        state.detach(&previous).await;
    }
    state.attach(&handle).await;
    conn.room = Some(handle);
}

/// Release the connection's room when the socket goes away
pub async fn disconnect(state: &Arc<AppState>, conn: &mut Connection) {
    if let Some(handle) = conn.room.take() {
        state.detach(&handle).await;
    }
}
