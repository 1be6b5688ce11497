use crate::error::GameError;
use crate::state::RoomSnapshot;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Version string sent in `Welcome`
pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a room and take its human seat. With `as_operator` the human is
    /// the liar.
    CreateRoom {
        #[serde(default)]
        as_operator: bool,
    },
    JoinRoom {
        code: RoomCode,
    },
    SubmitMessage {
        text: String,
    },
    /// Operator interjection: every AI seat reacts, but the turn and phase
    /// stay where they are
    OperatorMessage {
        text: String,
    },
    /// Show the counterpart's staged line in a turn-gated phase
    RevealCounterpart,
    CastVote {
        seat_id: SeatId,
    },
    ResetRoom,
    LeaveRoom,
    /// Ask for a fresh snapshot, e.g. after a reconnect
    Sync,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        /// Session id the client should present on reconnect
        session_id: SessionId,
        server_now: String,
    },
    /// Full snapshot replace
    Room {
        snapshot: Box<RoomSnapshot>,
    },
    VoteResult {
        correct: bool,
        suspected_seat_id: SeatId,
        actual_liar_seat_id: SeatId,
    },
    /// Room-wide system notice
    Notice {
        code: String,
        msg: String,
    },
    Left {
        code: RoomCode,
    },
    Error {
        code: String,
        msg: String,
        /// Whether sending the same request again may succeed
        #[serde(default)]
        retryable: bool,
    },
}

impl ServerMessage {
    pub fn room(snapshot: RoomSnapshot) -> Self {
        ServerMessage::Room {
            snapshot: Box::new(snapshot),
        }
    }
}

impl From<GameError> for ServerMessage {
    fn from(e: GameError) -> Self {
        ServerMessage::Error {
            code: e.code().to_string(),
            msg: e.to_string(),
            retryable: e.is_retryable(),
        }
    }
}

impl From<VoteResult> for ServerMessage {
    fn from(result: VoteResult) -> Self {
        ServerMessage::VoteResult {
            correct: result.correct,
            suspected_seat_id: result.suspected_seat_id,
            actual_liar_seat_id: result.actual_liar_seat_id,
        }
    }
}
