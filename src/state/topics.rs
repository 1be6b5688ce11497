use rand::seq::IndexedRandom;
use rand::Rng;

/// Built-in categories and their candidate keywords
pub const CATEGORIES: &[(&str, &[&str])] = &[
    ("Animals", &["lion", "tiger", "elephant", "cheetah", "eagle"]),
    ("Food", &["kimchi", "bibimbap", "tteokbokki", "gimbap", "apple"]),
    ("Transport", &["bus", "taxi", "train", "ship", "airplane"]),
    ("Jobs", &["police officer", "firefighter", "judge", "teacher", "doctor"]),
    ("Weather", &["snow", "rain", "wind", "fog", "sunshine"]),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub category: String,
    pub keyword: String,
}

/// Pick a random category, then a random keyword from it
pub fn pick_topic<R: Rng + ?Sized>(rng: &mut R) -> Topic {
    let (category, keywords) = CATEGORIES
        .choose(rng)
        .copied()
        .unwrap_or(CATEGORIES[0]);
    let keyword = keywords.choose(rng).copied().unwrap_or(keywords[0]);

    Topic {
        category: category.to_string(),
        keyword: keyword.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_keyword_belongs_to_category() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let topic = pick_topic(&mut rng);
            let (_, keywords) = CATEGORIES
                .iter()
                .find(|(c, _)| *c == topic.category)
                .expect("category should exist");
            assert!(keywords.contains(&topic.keyword.as_str()));
        }
    }

    #[test]
    fn test_topics_vary() {
        let mut rng = StdRng::seed_from_u64(5);
        let distinct: std::collections::HashSet<_> =
            (0..50).map(|_| pick_topic(&mut rng).keyword).collect();
        assert!(distinct.len() > 5);
    }
}
