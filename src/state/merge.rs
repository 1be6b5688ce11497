use crate::types::Message;
use rand::seq::SliceRandom;
use rand::Rng;

/// Order one round's messages for the transcript.
///
/// The acting party's own message always comes first and is never part of
/// the shuffle. The batch it triggered is shuffled uniformly so that position
/// says nothing about which seat is the liar.
pub fn merge_round<R: Rng + ?Sized>(
    own: Option<Message>,
    mut batch: Vec<Message>,
    rng: &mut R,
) -> Vec<Message> {
    batch.shuffle(rng);
    own.into_iter().chain(batch).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SenderRole;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn message(seat: &str) -> Message {
        Message {
            id: format!("msg-{}", seat),
            seat_id: seat.to_string(),
            sender_name: seat.to_string(),
            role: SenderRole::Ai,
            text: format!("line from {}", seat),
            ts: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn own() -> Message {
        Message {
            role: SenderRole::Human,
            ..message("me")
        }
    }

    fn order(messages: &[Message]) -> String {
        messages
            .iter()
            .map(|m| m.seat_id.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    #[test]
    fn test_own_message_always_first() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..200 {
            let merged = merge_round(
                Some(own()),
                vec![message("a"), message("b"), message("c")],
                &mut rng,
            );
            assert_eq!(merged.len(), 4);
            assert_eq!(merged[0].seat_id, "me");
            assert!(merged[1..].iter().all(|m| m.seat_id != "me"));
        }
    }

    #[test]
    fn test_batch_orderings_are_roughly_uniform() {
        let mut rng = StdRng::seed_from_u64(2024);
        let trials = 6000;
        let mut counts: HashMap<String, usize> = HashMap::new();

        for _ in 0..trials {
            let merged = merge_round(
                None,
                vec![message("a"), message("b"), message("c")],
                &mut rng,
            );
            *counts.entry(order(&merged)).or_insert(0) += 1;
        }

        // 3! orderings, expected 1000 each
        assert_eq!(counts.len(), 6);
        for (ordering, count) in &counts {
            assert!(
                (800..=1200).contains(count),
                "ordering {} appeared {} times",
                ordering,
                count
            );
        }
    }

    #[test]
    fn test_last_position_is_not_biased() {
        let mut rng = StdRng::seed_from_u64(77);
        let mut liar_last = 0;
        let trials = 5000;
        for _ in 0..trials {
            let batch = vec![
                message("a"),
                message("b"),
                message("c"),
                message("d"),
                message("liar"),
            ];
            let merged = merge_round(Some(own()), batch, &mut rng);
            if merged.last().map(|m| m.seat_id.as_str()) == Some("liar") {
                liar_last += 1;
            }
        }
        // expected 1000 (1 in 5)
        assert!((850..=1150).contains(&liar_last), "liar last {} times", liar_last);
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let batch = || vec![message("a"), message("b"), message("c"), message("d")];
        let first = merge_round(Some(own()), batch(), &mut StdRng::seed_from_u64(5));
        let second = merge_round(Some(own()), batch(), &mut StdRng::seed_from_u64(5));
        assert_eq!(order(&first), order(&second));
    }

    #[test]
    fn test_empty_batch() {
        let mut rng = StdRng::seed_from_u64(1);
        let merged = merge_round(Some(own()), Vec::new(), &mut rng);
        assert_eq!(merged.len(), 1);
    }
}
