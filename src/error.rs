//! Game error taxonomy
//!
//! Every variant carries a stable wire code so clients can react without
//! parsing messages. No error leaves a room partially updated.

use crate::llm::LlmError;
use crate::types::{Phase, RoomCode, SeatId};

pub type GameResult<T> = Result<T, GameError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("It is not your turn to speak")]
    NotYourTurn,

    #[error("Free text is not accepted during {0:?}")]
    PhaseTerminal(Phase),

    #[error("Message must not be empty")]
    EmptyInput,

    #[error("Message is longer than {0} characters")]
    MessageTooLong(usize),

    #[error("Room is busy waiting for responses, try again shortly")]
    RoomBusy,

    #[error("Response generation failed: {0}")]
    UpstreamGeneration(String),

    #[error("Room {0} not found")]
    RoomNotFound(RoomCode),

    #[error("Voting is not open during {0:?}")]
    VoteNotOpen(Phase),

    #[error("Seat {0} does not exist in this room")]
    UnknownSeat(SeatId),

    #[error("Only the seated player can do this")]
    NotSeated,

    #[error("Game is still running ({0:?})")]
    GameInProgress(Phase),

    #[error("No counterpart reply is waiting to be revealed")]
    NothingToReveal,

    #[error("Only the room operator can interject")]
    OperatorOnly,

    #[error("Create or join a room first")]
    NotInRoom,

    #[error("Too many requests, try again in {0}s")]
    RateLimited(u64),
}

impl GameError {
    /// Wire code sent to clients in `ServerMessage::Error`
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Configuration(_) => "CONFIGURATION_ERROR",
            GameError::NotYourTurn => "NOT_YOUR_TURN",
            GameError::PhaseTerminal(_) => "PHASE_TERMINAL",
            GameError::EmptyInput => "EMPTY_INPUT",
            GameError::MessageTooLong(_) => "MESSAGE_TOO_LONG",
            GameError::RoomBusy => "ROOM_BUSY",
            GameError::UpstreamGeneration(_) => "UPSTREAM_GENERATION",
            GameError::RoomNotFound(_) => "ROOM_NOT_FOUND",
            GameError::VoteNotOpen(_) => "VOTE_NOT_OPEN",
            GameError::UnknownSeat(_) => "UNKNOWN_SEAT",
            GameError::NotSeated => "NOT_SEATED",
            GameError::GameInProgress(_) => "GAME_IN_PROGRESS",
            GameError::NothingToReveal => "NOTHING_TO_REVEAL",
            GameError::OperatorOnly => "OPERATOR_ONLY",
            GameError::NotInRoom => "NOT_IN_ROOM",
            GameError::RateLimited(_) => "RATE_LIMITED",
        }
    }

    /// Transient errors the client may simply retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GameError::RoomBusy | GameError::UpstreamGeneration(_) | GameError::RateLimited(_)
        )
    }
}

impl From<LlmError> for GameError {
    fn from(e: LlmError) -> Self {
        GameError::UpstreamGeneration(e.to_string())
    }
}
