//! Seat assignment: one liar, shuffled display names, AI personas.

use crate::error::GameError;
use crate::types::*;
use rand::seq::SliceRandom;
use rand::Rng;

/// Display names handed out without replacement
pub const NAME_POOL: &[&str] = &[
    "Tiger", "Lion", "Eagle", "Elephant", "Fox", "Rabbit", "Whale", "Penguin", "Hippo", "Panda",
];

/// Speaking styles for AI seats
pub const PERSONAS: &[&str] = &[
    "prickly and blunt",
    "meticulous, a little petty, witty and good at using hints",
    "sly, smug and petty",
    "a clown who keeps everyone laughing",
];

/// At least one liar and one citizen, and never more seats than names
pub fn check_seat_count(seat_count: usize) -> Result<(), GameError> {
    if seat_count < 2 {
        return Err(GameError::Configuration(format!(
            "A room needs at least 2 seats, got {}",
            seat_count
        )));
    }
    if seat_count > NAME_POOL.len() {
        return Err(GameError::Configuration(format!(
            "A room can have at most {} seats, got {}",
            NAME_POOL.len(),
            seat_count
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SeatAssignment {
    /// Seats in display order (shuffled, so position says nothing about role)
    pub seats: Vec<Seat>,
    pub human_seat_id: SeatId,
    /// The non-user seat that plays the complementary role to the human
    pub counterpart_seat_id: SeatId,
    pub liar_seat_id: SeatId,
}

/// Assign seats for a new game.
///
/// The human seat is the liar when the room was created in operator mode;
/// otherwise the counterpart seat is. Every citizen sees the real keyword, the
/// liar sees `masked`.
pub fn assign_seats<R: Rng + ?Sized>(
    seat_count: usize,
    human_is_liar: bool,
    owner: &SessionId,
    keyword: &str,
    masked: &str,
    rng: &mut R,
) -> Result<SeatAssignment, GameError> {
    check_seat_count(seat_count)?;

    let mut names: Vec<&str> = NAME_POOL.to_vec();
    names.shuffle(rng);

    let mut personas: Vec<&str> = PERSONAS.to_vec();
    personas.shuffle(rng);

    let keyword_for = |is_liar: bool| {
        if is_liar {
            masked.to_string()
        } else {
            keyword.to_string()
        }
    };

    let mut seats = Vec::with_capacity(seat_count);

    seats.push(Seat {
        id: ulid::Ulid::new().to_string(),
        display_name: names[0].to_string(),
        capability: if human_is_liar {
            Capability::HumanLiar
        } else {
            Capability::HumanCitizen
        },
        is_liar: human_is_liar,
        keyword: keyword_for(human_is_liar),
        owner: Some(owner.clone()),
        persona: None,
    });

    let counterpart_is_liar = !human_is_liar;
    seats.push(Seat {
        id: ulid::Ulid::new().to_string(),
        display_name: names[1].to_string(),
        capability: if counterpart_is_liar {
            Capability::AiLiar
        } else {
            Capability::AiCitizen
        },
        is_liar: counterpart_is_liar,
        keyword: keyword_for(counterpart_is_liar),
        owner: None,
        persona: None,
    });

    for (i, name) in names.iter().enumerate().take(seat_count).skip(2) {
        seats.push(Seat {
            id: ulid::Ulid::new().to_string(),
            display_name: name.to_string(),
            capability: Capability::AiCitizen,
            is_liar: false,
            keyword: keyword.to_string(),
            owner: None,
            persona: Some(personas[(i - 2) % personas.len()].to_string()),
        });
    }

    let human_seat_id = seats[0].id.clone();
    let counterpart_seat_id = seats[1].id.clone();
    let liar_seat_id = if human_is_liar {
        human_seat_id.clone()
    } else {
        counterpart_seat_id.clone()
    };

    seats.shuffle(rng);

    Ok(SeatAssignment {
        seats,
        human_seat_id,
        counterpart_seat_id,
        liar_seat_id,
    })
}
