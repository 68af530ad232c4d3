//! Topic-exchange binding key matching.
//!
//! Keys are dot-separated words. In a binding key, `*` stands for exactly
//! one word and `#` for zero or more words.

pub(crate) fn matches(binding_key: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = binding_key.split('.').collect();
    let words: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &words)
}

fn matches_words(pattern: &[&str], words: &[&str]) -> bool {
    match (pattern.split_first(), words.split_first()) {
        (None, None) => true,
        (Some((&"#", rest)), _) => {
            matches_words(rest, words)
                || (!words.is_empty() && matches_words(pattern, &words[1..]))
        }
        (Some((&"*", rest)), Some((_, remaining))) => matches_words(rest, remaining),
        (Some((expected, rest)), Some((word, remaining))) => {
            expected == word && matches_words(rest, remaining)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::matches;

    #[test]
    fn test_star_matches_exactly_one_word() {
        assert!(matches("army_moves.*", "army_moves.alice"));
        assert!(!matches("army_moves.*", "army_moves"));
        assert!(!matches("army_moves.*", "army_moves.alice.extra"));
        assert!(!matches("army_moves.*", "war.alice"));
    }

    #[test]
    fn test_hash_matches_zero_or_more_words() {
        assert!(matches("game_logs.#", "game_logs"));
        assert!(matches("game_logs.#", "game_logs.alice"));
        assert!(matches("game_logs.#", "game_logs.alice.debug"));
        assert!(matches("#", "anything.at.all"));
        assert!(matches("#.alice", "war.alice"));
        assert!(!matches("#.alice", "war.bob"));
    }

    #[test]
    fn test_literal_keys() {
        assert!(matches("war.alice", "war.alice"));
        assert!(!matches("war.alice", "war.bob"));
    }
}
