//! Viewer-specific room snapshots.
//!
//! A snapshot is the only thing clients ever see of a room. Which keyword,
//! which capability tags and which liar flags it carries depends on who is
//! looking: citizens must not learn the liar's seat, observers see no keyword.

use super::room::{Room, Stage};
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViewerRole {
    Player,
    Observer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewerInfo {
    pub role: ViewerRole,
    pub seat_id: Option<SeatId>,
    pub capability: Option<Capability>,
    pub is_liar: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeatView {
    pub id: SeatId,
    pub display_name: String,
    pub capability: Capability,
    pub is_self: bool,
    /// Only present when the viewer is allowed to know
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_liar: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub game_no: u32,
    pub version: u64,
    pub category: String,
    /// Keyword as this viewer is allowed to see it
    pub keyword: String,
    pub viewer: ViewerInfo,
    pub seats: Vec<SeatView>,
    pub phase: Phase,
    pub phase_index: usize,
    pub phases: Vec<Phase>,
    pub turn: Option<Turn>,
    /// Seat holding the turn; withheld from citizens while the game runs
    pub turn_seat_id: Option<SeatId>,
    pub awaiting_reveal: bool,
    pub transcript: Vec<Message>,
    pub busy: bool,
    pub outcome: Option<VoteResult>,
}

impl RoomSnapshot {
    pub fn seat(&self, seat_id: &str) -> Option<&SeatView> {
        self.seats.iter().find(|s| s.id == seat_id)
    }

    pub fn own_seat(&self) -> Option<&SeatView> {
        self.seats.iter().find(|s| s.is_self)
    }
}

impl Room {
    /// Render the room for one viewer. `None` or an unseated session renders
    /// the observer view.
    pub fn snapshot_for(&self, session: Option<&str>) -> RoomSnapshot {
        let ended = self.stage == Stage::Ended;
        let own = session.and_then(|s| self.seat_of(s));
        let viewer_is_liar = own.is_some_and(|s| s.is_liar);
        let sees_roles = ended || viewer_is_liar;

        let keyword = if ended {
            self.keyword().to_string()
        } else {
            own.map(|s| s.keyword.clone())
                .unwrap_or_else(|| self.config.masked_keyword.clone())
        };

        let seats = self
            .seats
            .iter()
            .map(|seat| {
                let is_self = own.is_some_and(|o| o.id == seat.id);
                let capability = if is_self || sees_roles {
                    seat.capability
                } else {
                    seat.capability.public()
                };
                SeatView {
                    id: seat.id.clone(),
                    display_name: seat.display_name.clone(),
                    capability,
                    is_self,
                    is_liar: (is_self || sees_roles).then_some(seat.is_liar),
                }
            })
            .collect();

        let turn_seat_id = if sees_roles {
            self.turn.map(|turn| match turn {
                Turn::Human => self.human_seat_id.clone(),
                Turn::Counterpart => self.counterpart_seat_id.clone(),
            })
        } else {
            None
        };

        let viewer = match own {
            Some(seat) => ViewerInfo {
                role: ViewerRole::Player,
                seat_id: Some(seat.id.clone()),
                capability: Some(seat.capability),
                is_liar: Some(seat.is_liar),
            },
            None => ViewerInfo {
                role: ViewerRole::Observer,
                seat_id: None,
                capability: None,
                is_liar: None,
            },
        };

        RoomSnapshot {
            code: self.code.clone(),
            game_no: self.game_no,
            version: self.version,
            category: self.category.clone(),
            keyword,
            viewer,
            seats,
            phase: self.phase(),
            phase_index: self.phase_index,
            phases: self.config.phases.clone(),
            turn: self.turn,
            turn_seat_id,
            awaiting_reveal: self.awaiting_reveal(),
            transcript: self.transcript.clone(),
            busy: self.is_busy(),
            outcome: self.outcome.clone(),
        }
    }
}
