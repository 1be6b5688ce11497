//! The per-room phase/turn state machine.
//!
//! Everything here is synchronous and works on a plain `Room` value. The
//! async orchestration (locking, generator calls, broadcasting) lives in
//! `round.rs`; a round is split into `begin_round` and `commit_round` so the
//! room can be marked busy while the generator runs without holding the lock.

use super::merge::merge_round;
use super::seats::{assign_seats, SeatAssignment};
use super::topics::pick_topic;
use crate::error::{GameError, GameResult};
use crate::llm::{scripted_line, SpeechContext};
use crate::types::*;
use rand::Rng;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Setup,
    Playing,
    Ended,
}

/// Authoritative state of one room
#[derive(Debug, Clone)]
pub struct Room {
    pub(crate) code: RoomCode,
    pub(crate) game_no: u32,
    pub(crate) category: String,
    keyword: String,
    pub(crate) seats: Vec<Seat>,
    pub(crate) human_seat_id: SeatId,
    pub(crate) counterpart_seat_id: SeatId,
    pub(crate) liar_seat_id: SeatId,
    pub(crate) human_is_liar: bool,
    pub(crate) config: GameConfig,
    pub(crate) stage: Stage,
    pub(crate) phase_index: usize,
    pub(crate) turn: Option<Turn>,
    pub(crate) transcript: Vec<Message>,
    /// Counterpart line computed for a gated round, waiting to be revealed
    pub(crate) staged_reveal: Option<Message>,
    /// Ticket of the round whose generator call is outstanding
    pub(crate) in_flight: Option<String>,
    pub(crate) outcome: Option<VoteResult>,
    pub(crate) version: u64,
    pub(crate) touched: Instant,
}

/// What started a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundKind {
    /// The human speaking in their turn; may advance the phase
    Turn,
    /// Operator interjection; every AI seat reacts, turn and phase stay put
    Intervention,
}

/// Everything needed to finish a round after `begin_round` accepted it
#[derive(Debug, Clone)]
pub struct RoundPlan {
    pub ticket: String,
    pub kind: RoundKind,
    pub phase: Phase,
    pub gated: bool,
    pub own: Message,
    /// Scripted line for the counterpart seat. `None` when the counterpart is
    /// one of the generated `speakers`.
    pub counterpart: Option<Message>,
    /// AI seats that must be generated, in the same order as `contexts`
    pub speakers: Vec<SeatId>,
    pub contexts: Vec<SpeechContext>,
}

impl RoundPlan {
    pub fn needs_generation(&self) -> bool {
        !self.contexts.is_empty()
    }
}

impl Room {
    /// Draw a topic, assign seats and enter the first statement phase
    pub fn new<R: Rng + ?Sized>(
        code: RoomCode,
        owner: &SessionId,
        as_operator: bool,
        config: &GameConfig,
        rng: &mut R,
    ) -> GameResult<Self> {
        config.validate()?;
        let topic = pick_topic(rng);
        let SeatAssignment {
            seats,
            human_seat_id,
            counterpart_seat_id,
            liar_seat_id,
        } = assign_seats(
            config.seat_count,
            as_operator,
            owner,
            &topic.keyword,
            &config.masked_keyword,
            rng,
        )?;

        let mut room = Self {
            code,
            game_no: 1,
            category: topic.category,
            keyword: topic.keyword,
            seats,
            human_seat_id,
            counterpart_seat_id,
            liar_seat_id,
            human_is_liar: as_operator,
            config: config.clone(),
            stage: Stage::Setup,
            phase_index: 0,
            turn: None,
            transcript: Vec::new(),
            staged_reveal: None,
            in_flight: None,
            outcome: None,
            version: 0,
            touched: Instant::now(),
        };
        room.start();
        Ok(room)
    }

    /// Setup -> first phase of the plan
    fn start(&mut self) {
        self.stage = Stage::Playing;
        self.phase_index = 0;
        self.transcript.clear();
        self.staged_reveal = None;
        self.outcome = None;
        self.turn = self.initial_turn();
        self.bump();
        tracing::info!(
            room = %self.code,
            game_no = self.game_no,
            category = %self.category,
            "Game started"
        );
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn phase(&self) -> Phase {
        match self.stage {
            Stage::Setup => Phase::Setup,
            Stage::Ended => Phase::Ended,
            Stage::Playing => self.config.phases[self.phase_index],
        }
    }

    pub fn phase_index(&self) -> usize {
        self.phase_index
    }

    pub fn turn(&self) -> Option<Turn> {
        self.turn
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn liar_seat_id(&self) -> &str {
        &self.liar_seat_id
    }

    pub fn human_seat_id(&self) -> &str {
        &self.human_seat_id
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn started(&self) -> bool {
        self.stage != Stage::Setup
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn awaiting_reveal(&self) -> bool {
        self.staged_reveal.is_some()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn seat(&self, seat_id: &str) -> Option<&Seat> {
        self.seats.iter().find(|s| s.id == seat_id)
    }

    /// Seat controlled by this session, if any
    pub fn seat_of(&self, session: &str) -> Option<&Seat> {
        self.seats
            .iter()
            .find(|s| s.owner.as_deref() == Some(session))
    }

    pub fn is_gated(&self) -> bool {
        self.stage == Stage::Playing && self.config.gating.is_gated(self.phase())
    }

    pub(crate) fn touch(&mut self) {
        self.touched = Instant::now();
    }

    pub(crate) fn idle_for(&self) -> std::time::Duration {
        self.touched.elapsed()
    }

    fn bump(&mut self) {
        self.version += 1;
    }

    /// Statement phases and gated discussions open with the human's turn.
    /// Ungated discussions and the vote carry no turn.
    fn initial_turn(&self) -> Option<Turn> {
        let phase = self.phase();
        if phase.is_statement() || (phase.is_discussion() && self.is_gated()) {
            Some(Turn::Human)
        } else {
            None
        }
    }

    fn advance_phase(&mut self) {
        let from = self.phase();
        self.phase_index += 1;
        self.staged_reveal = None;
        self.turn = self.initial_turn();
        tracing::info!(room = %self.code, ?from, to = ?self.phase(), "Phase advanced");
    }

    fn history(&self) -> Vec<String> {
        let skip = self
            .transcript
            .len()
            .saturating_sub(self.config.history_lines);
        self.transcript[skip..]
            .iter()
            .map(|m| format!("{}: {}", m.sender_name, m.text))
            .collect()
    }

    fn speech_context(&self, seat: &Seat, own: &Message, history: &[String]) -> SpeechContext {
        SpeechContext {
            phase: self.phase(),
            category: self.category.clone(),
            keyword: seat.keyword.clone(),
            is_liar: seat.is_liar,
            speaker: seat.display_name.clone(),
            persona: seat.persona.clone(),
            trigger_sender: own.sender_name.clone(),
            trigger_role: own.role,
            trigger_text: own.text.clone(),
            history: history.to_vec(),
        }
    }

    /// Checks shared by every kind of round. Returns the sender's seat and
    /// the trimmed text.
    fn check_submission<'t>(&self, session: &str, text: &'t str) -> GameResult<(Seat, &'t str)> {
        if self.is_busy() {
            return Err(GameError::RoomBusy);
        }
        let phase = self.phase();
        if matches!(phase, Phase::Vote | Phase::Ended) {
            return Err(GameError::PhaseTerminal(phase));
        }
        if !phase.accepts_text() {
            return Err(GameError::NotYourTurn);
        }
        let seat = self.seat_of(session).ok_or(GameError::NotSeated)?.clone();

        let text = text.trim();
        if text.is_empty() {
            return Err(GameError::EmptyInput);
        }
        if text.chars().count() > self.config.max_message_chars {
            return Err(GameError::MessageTooLong(self.config.max_message_chars));
        }
        Ok((seat, text))
    }

    /// Validate a submission and mark the room busy.
    ///
    /// Nothing in the transcript, phase or turn changes here; the caller must
    /// follow up with exactly one of `commit_round` or `abort_round`.
    pub fn begin_round(&mut self, session: &str, text: &str) -> GameResult<RoundPlan> {
        let (human, text) = self.check_submission(session, text)?;
        if self.turn == Some(Turn::Counterpart) {
            return Err(GameError::NotYourTurn);
        }
        let own = Message::new(&human, SenderRole::Human, text);
        self.plan(RoundKind::Turn, own)
    }

    /// Validate an operator interjection and mark the room busy. Only the
    /// operator, the human liar of an operator-created room, may interject,
    /// and it does not matter whose turn it is.
    pub fn begin_intervention(&mut self, session: &str, text: &str) -> GameResult<RoundPlan> {
        let (seat, text) = self.check_submission(session, text)?;
        if seat.capability != Capability::HumanLiar {
            return Err(GameError::OperatorOnly);
        }
        let own = Message::operator(&seat, text);
        self.plan(RoundKind::Intervention, own)
    }

    fn plan(&mut self, kind: RoundKind, own: Message) -> GameResult<RoundPlan> {
        let history = self.history();
        let gated = kind == RoundKind::Turn && self.is_gated();

        let counterpart_seat = self
            .seat(&self.counterpart_seat_id)
            .ok_or_else(|| GameError::UnknownSeat(self.counterpart_seat_id.clone()))?;
        let counterpart = if self.config.generate_counterpart {
            None
        } else {
            Some(Message::new(
                counterpart_seat,
                SenderRole::Ai,
                scripted_line(&self.speech_context(counterpart_seat, &own, &history)),
            ))
        };

        // A gated round only hears from the counterpart; a batch round hears
        // from every AI seat
        let (speakers, contexts): (Vec<SeatId>, Vec<SpeechContext>) = self
            .seats
            .iter()
            .filter(|s| s.id != self.human_seat_id)
            .filter(|s| {
                if s.id == self.counterpart_seat_id {
                    counterpart.is_none()
                } else {
                    !gated
                }
            })
            .map(|s| (s.id.clone(), self.speech_context(s, &own, &history)))
            .unzip();

        let ticket = ulid::Ulid::new().to_string();
        self.in_flight = Some(ticket.clone());
        self.bump();

        Ok(RoundPlan {
            ticket,
            kind,
            phase: self.phase(),
            gated,
            own,
            counterpart,
            speakers,
            contexts,
        })
    }

    /// Apply a round whose generation succeeded. `texts` holds one line per
    /// entry in `plan.speakers`.
    pub fn commit_round<R: Rng + ?Sized>(
        &mut self,
        plan: RoundPlan,
        texts: Vec<String>,
        rng: &mut R,
    ) -> GameResult<()> {
        if self.in_flight.as_deref() != Some(plan.ticket.as_str()) {
            return Err(GameError::UpstreamGeneration(
                "round was superseded".to_string(),
            ));
        }
        if texts.len() != plan.speakers.len() {
            self.abort_round(&plan.ticket);
            return Err(GameError::UpstreamGeneration(format!(
                "expected {} lines, got {}",
                plan.speakers.len(),
                texts.len()
            )));
        }

        let mut generated = Vec::with_capacity(texts.len() + 1);
        for (seat_id, text) in plan.speakers.iter().zip(texts) {
            let seat = self
                .seat(seat_id)
                .ok_or_else(|| GameError::UnknownSeat(seat_id.clone()))?;
            generated.push(Message::new(seat, SenderRole::Ai, text.trim()));
        }
        generated.extend(plan.counterpart);

        if plan.gated {
            self.transcript.push(plan.own);
            self.staged_reveal = generated.pop();
            self.turn = self.turn.map(Turn::flipped);
        } else {
            let merged = merge_round(Some(plan.own), generated, rng);
            self.transcript.extend(merged);
            if plan.kind == RoundKind::Turn {
                self.advance_phase();
            }
        }

        self.in_flight = None;
        self.bump();
        Ok(())
    }

    /// Roll back a round that failed. Only the busy marker is cleared, every
    /// other field is exactly as it was before `begin_round`.
    pub fn abort_round(&mut self, ticket: &str) {
        if self.in_flight.as_deref() == Some(ticket) {
            self.in_flight = None;
            self.bump();
        }
    }

    /// Show the counterpart's staged line and close the gated sub-round
    pub fn reveal_counterpart(&mut self, session: &str) -> GameResult<()> {
        if self.is_busy() {
            return Err(GameError::RoomBusy);
        }
        if self.seat_of(session).is_none() {
            return Err(GameError::NotSeated);
        }
        let staged = self.staged_reveal.take().ok_or(GameError::NothingToReveal)?;

        self.transcript.push(staged);
        // Both parties have spoken once in this sub-round
        self.advance_phase();
        self.bump();
        Ok(())
    }

    pub fn cast_vote(&mut self, session: &str, suspected_seat_id: &str) -> GameResult<VoteResult> {
        if self.is_busy() {
            return Err(GameError::RoomBusy);
        }
        let phase = self.phase();
        if phase == Phase::Ended {
            return Err(GameError::PhaseTerminal(phase));
        }
        if phase != Phase::Vote {
            return Err(GameError::VoteNotOpen(phase));
        }
        if self.seat_of(session).is_none() {
            return Err(GameError::NotSeated);
        }
        if self.seat(suspected_seat_id).is_none() {
            return Err(GameError::UnknownSeat(suspected_seat_id.to_string()));
        }

        let result = VoteResult {
            correct: suspected_seat_id == self.liar_seat_id,
            suspected_seat_id: suspected_seat_id.to_string(),
            actual_liar_seat_id: self.liar_seat_id.clone(),
        };

        self.stage = Stage::Ended;
        self.turn = None;
        self.outcome = Some(result.clone());
        self.bump();

        tracing::info!(
            room = %self.code,
            correct = result.correct,
            "Vote resolved, game ended"
        );
        Ok(result)
    }

    /// Start a new game in the same room with a fresh topic and seating.
    /// Only the seated human may do this, and only once the game has ended.
    pub fn reset<R: Rng + ?Sized>(&mut self, session: &str, rng: &mut R) -> GameResult<()> {
        if self.stage != Stage::Ended {
            return Err(GameError::GameInProgress(self.phase()));
        }
        let owner = self
            .seat_of(session)
            .and_then(|s| s.owner.clone())
            .ok_or(GameError::NotSeated)?;

        let topic = pick_topic(rng);
        let assignment = assign_seats(
            self.config.seat_count,
            self.human_is_liar,
            &owner,
            &topic.keyword,
            &self.config.masked_keyword,
            rng,
        )?;

        self.game_no += 1;
        self.category = topic.category;
        self.keyword = topic.keyword;
        self.seats = assignment.seats;
        self.human_seat_id = assignment.human_seat_id;
        self.counterpart_seat_id = assignment.counterpart_seat_id;
        self.liar_seat_id = assignment.liar_seat_id;
        self.stage = Stage::Setup;
        self.start();
        Ok(())
    }
}
