use crate::error::GameError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Opaque ID types for type safety
pub type RoomCode = String;
pub type SeatId = String;
pub type SessionId = String;
pub type MessageId = String;

/// Game phases in the order they can occur. `Setup` and `Ended` bracket the
/// configurable plan and never appear inside it.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Setup,
    Statement1,
    Discussion1,
    Statement2,
    Discussion2,
    Vote,
    Ended,
}

impl Phase {
    pub fn is_statement(&self) -> bool {
        matches!(self, Phase::Statement1 | Phase::Statement2)
    }

    pub fn is_discussion(&self) -> bool {
        matches!(self, Phase::Discussion1 | Phase::Discussion2)
    }

    /// Whether free text may be submitted in this phase
    pub fn accepts_text(&self) -> bool {
        self.is_statement() || self.is_discussion()
    }

    /// Human-readable label used in prompts and templates
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Statement1 => "first statement",
            Phase::Discussion1 => "first discussion",
            Phase::Statement2 => "second statement",
            Phase::Discussion2 => "second discussion",
            Phase::Vote => "vote",
            Phase::Ended => "game over",
        }
    }
}

impl std::str::FromStr for Phase {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "statement1" => Ok(Phase::Statement1),
            "discussion1" => Ok(Phase::Discussion1),
            "statement2" => Ok(Phase::Statement2),
            "discussion2" => Ok(Phase::Discussion2),
            "vote" => Ok(Phase::Vote),
            other => Err(GameError::Configuration(format!(
                "Unknown phase '{}' in phase plan",
                other
            ))),
        }
    }
}

/// Which party holds the right to speak in a turn-gated phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Turn {
    Human,
    Counterpart,
}

impl Turn {
    pub fn flipped(self) -> Self {
        match self {
            Turn::Human => Turn::Counterpart,
            Turn::Counterpart => Turn::Human,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    HumanLiar,
    HumanCitizen,
    AiCitizen,
    AiLiar,
    Operator,
}

impl Capability {
    /// The tag shown to viewers who are not allowed to know who the liar is.
    /// An AI liar passes as an ordinary AI citizen; the operator-created human
    /// liar is shown as the room operator.
    pub fn public(self) -> Self {
        match self {
            Capability::AiLiar => Capability::AiCitizen,
            Capability::HumanLiar => Capability::Operator,
            other => other,
        }
    }

    pub fn is_human(self) -> bool {
        matches!(
            self,
            Capability::HumanLiar | Capability::HumanCitizen | Capability::Operator
        )
    }
}

/// One game participant. Membership is fixed for the duration of a game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub display_name: String,
    pub capability: Capability,
    pub is_liar: bool,
    /// Keyword exposed to this seat: the real one for citizens, the masked
    /// placeholder for the liar
    pub keyword: String,
    /// Session that controls this seat (human seat only)
    pub owner: Option<SessionId>,
    /// Speaking style for AI seats
    pub persona: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Human,
    Ai,
    /// Interjection by the room operator, outside the turn order
    Operator,
}

/// Name shown on operator interjections
pub const OPERATOR_NAME: &str = "Game operator";

/// A transcript entry. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub seat_id: SeatId,
    pub sender_name: String,
    pub role: SenderRole,
    pub text: String,
    pub ts: String,
}

impl Message {
    pub fn new(seat: &Seat, role: SenderRole, text: impl Into<String>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            seat_id: seat.id.clone(),
            sender_name: seat.display_name.clone(),
            role,
            text: text.into(),
            ts: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Interjection sent by the operator from their seat
    pub fn operator(seat: &Seat, text: impl Into<String>) -> Self {
        Self {
            sender_name: OPERATOR_NAME.to_string(),
            ..Self::new(seat, SenderRole::Operator, text)
        }
    }
}

/// Result of the final vote
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteResult {
    pub correct: bool,
    pub suspected_seat_id: SeatId,
    pub actual_liar_seat_id: SeatId,
}

/// Which phase kinds are strictly two-party turn-gated. Phases that are not
/// gated run as batch rounds where every other seat answers at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatingConfig {
    pub statements: bool,
    pub discussions: bool,
}

impl GatingConfig {
    pub fn is_gated(&self, phase: Phase) -> bool {
        (phase.is_statement() && self.statements) || (phase.is_discussion() && self.discussions)
    }
}

pub const DEFAULT_PHASES: &[Phase] = &[
    Phase::Statement1,
    Phase::Discussion1,
    Phase::Statement2,
    Phase::Discussion2,
    Phase::Vote,
];

#[derive(Debug, Clone)]
pub struct GameConfig {
    pub seat_count: usize,
    pub phases: Vec<Phase>,
    pub gating: GatingConfig,
    pub masked_keyword: String,
    pub generation_timeout: Duration,
    pub max_message_chars: usize,
    pub idle_room_ttl: Duration,
    /// How many recent transcript lines are handed to the generator
    pub history_lines: usize,
    /// Let the generator voice the counterpart seat too, instead of the
    /// scripted lines
    pub generate_counterpart: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            seat_count: 6,
            phases: DEFAULT_PHASES.to_vec(),
            gating: GatingConfig::default(),
            masked_keyword: "???".to_string(),
            generation_timeout: Duration::from_secs(20),
            max_message_chars: 500,
            idle_room_ttl: Duration::from_secs(1800),
            history_lines: 12,
            generate_counterpart: false,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse a comma separated phase plan such as `statement1,discussion1,vote`
pub fn parse_phases(plan: &str) -> Result<Vec<Phase>, GameError> {
    plan.split(',')
        .filter(|p| !p.trim().is_empty())
        .map(str::parse)
        .collect()
}

impl GameConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, GameError> {
        let defaults = Self::default();

        let phases = match std::env::var("LIAR_PHASES") {
            Ok(plan) if !plan.trim().is_empty() => parse_phases(&plan)?,
            _ => defaults.phases,
        };

        let masked_keyword = std::env::var("LIAR_MASKED_KEYWORD")
            .ok()
            .and_then(|v| {
                let trimmed = v.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or(defaults.masked_keyword);

        let config = Self {
            seat_count: env_parse("LIAR_SEAT_COUNT").unwrap_or(defaults.seat_count),
            phases,
            gating: GatingConfig {
                statements: env_flag("LIAR_GATED_STATEMENTS", false),
                discussions: env_flag("LIAR_GATED_DISCUSSIONS", false),
            },
            masked_keyword,
            generation_timeout: env_parse("LIAR_GENERATION_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.generation_timeout),
            max_message_chars: env_parse("LIAR_MAX_MESSAGE_CHARS")
                .unwrap_or(defaults.max_message_chars),
            idle_room_ttl: env_parse("LIAR_IDLE_ROOM_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_room_ttl),
            history_lines: env_parse("LIAR_HISTORY_LINES").unwrap_or(defaults.history_lines),
            generate_counterpart: env_flag(
                "LIAR_GENERATED_COUNTERPART",
                defaults.generate_counterpart,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check seat count and phase plan. The plan must open with the first
    /// statement, end with the vote and move strictly forward.
    pub fn validate(&self) -> Result<(), GameError> {
        crate::state::seats::check_seat_count(self.seat_count)?;

        if self.phases.first() != Some(&Phase::Statement1) {
            return Err(GameError::Configuration(
                "Phase plan must start with STATEMENT1".to_string(),
            ));
        }
        if self.phases.last() != Some(&Phase::Vote) {
            return Err(GameError::Configuration(
                "Phase plan must end with VOTE".to_string(),
            ));
        }
        if self.phases.windows(2).any(|w| w[0] >= w[1]) {
            return Err(GameError::Configuration(format!(
                "Phase plan must be strictly ordered: {:?}",
                self.phases
            )));
        }
        if self.masked_keyword.trim().is_empty() {
            return Err(GameError::Configuration(
                "Masked keyword must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config_is_valid() {
        let config = GameConfig::default();
        assert_eq!(config.seat_count, 6);
        assert_eq!(config.phases.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_phases() {
        let phases = parse_phases("statement1, discussion1,discussion2,vote").unwrap();
        assert_eq!(
            phases,
            vec![
                Phase::Statement1,
                Phase::Discussion1,
                Phase::Discussion2,
                Phase::Vote
            ]
        );

        assert!(parse_phases("statement1,lunch,vote").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_plans() {
        let mut config = GameConfig {
            phases: vec![Phase::Discussion1, Phase::Vote],
            ..GameConfig::default()
        };
        assert!(config.validate().is_err());

        config.phases = vec![Phase::Statement1, Phase::Discussion1];
        assert!(config.validate().is_err());

        config.phases = vec![
            Phase::Statement1,
            Phase::Discussion2,
            Phase::Discussion1,
            Phase::Vote,
        ];
        assert!(config.validate().is_err());

        config.phases = vec![Phase::Statement1, Phase::Vote];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_public_capability_hides_liar() {
        assert_eq!(Capability::AiLiar.public(), Capability::AiCitizen);
        assert_eq!(Capability::HumanLiar.public(), Capability::Operator);
        assert_eq!(Capability::HumanCitizen.public(), Capability::HumanCitizen);
    }

    #[test]
    fn test_gating() {
        let gating = GatingConfig {
            statements: true,
            discussions: false,
        };
        assert!(gating.is_gated(Phase::Statement2));
        assert!(!gating.is_gated(Phase::Discussion1));
        assert!(!gating.is_gated(Phase::Vote));
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("LIAR_SEAT_COUNT", "4");
        std::env::set_var("LIAR_PHASES", "statement1,discussion1,vote");
        std::env::set_var("LIAR_GATED_STATEMENTS", "true");
        std::env::set_var("LIAR_GENERATED_COUNTERPART", "1");

        let config = GameConfig::from_env().unwrap();
        assert_eq!(config.seat_count, 4);
        assert_eq!(config.phases.len(), 3);
        assert!(config.gating.statements);
        assert!(!config.gating.discussions);
        assert!(config.generate_counterpart);

        std::env::remove_var("LIAR_SEAT_COUNT");
        std::env::remove_var("LIAR_PHASES");
        std::env::remove_var("LIAR_GATED_STATEMENTS");
        std::env::remove_var("LIAR_GENERATED_COUNTERPART");
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_oversized_room() {
        std::env::set_var("LIAR_SEAT_COUNT", "99");
        let result = GameConfig::from_env();
        std::env::remove_var("LIAR_SEAT_COUNT");

        assert!(matches!(result, Err(GameError::Configuration(_))));
    }
}
