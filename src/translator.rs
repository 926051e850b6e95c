//! Word-for-word phrase translation

use crate::dictionary::Dictionary;

/// Uppercase the first character of `word` if it is ASCII.
pub fn capitalize_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => {
            let mut out = String::with_capacity(word.len());
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
            out
        }
        None => String::new(),
    }
}

/// Translate `phrase` token by token.
///
/// Tokens are split on spaces (runs of spaces collapse), capitalized, then
/// looked up. A miss keeps the capitalized token. Output tokens are joined by
/// single spaces.
pub fn translate(dictionary: &Dictionary, phrase: &str) -> String {
    let words: Vec<String> = phrase
        .split(' ')
        .filter(|token| !token.is_empty())
        .map(|token| {
            let word = capitalize_first(token);
            match dictionary.lookup(&word) {
                Some(translated) => translated.to_string(),
                None => word,
            }
        })
        .collect();

    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> Dictionary {
        [("Hello", "Ciao"), ("World", "Mondo"), ("Ciao", "Hello")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_known_word() {
        assert_eq!(translate(&dict(), "Hello"), "Ciao");
        assert_eq!(translate(&dict(), "hello"), "Ciao");
    }

    #[test]
    fn test_unknown_word_is_capitalized() {
        assert_eq!(translate(&dict(), "Xyz"), "Xyz");
        assert_eq!(translate(&dict(), "xyz"), "Xyz");
    }

    #[test]
    fn test_phrase_collapses_spaces() {
        assert_eq!(translate(&dict(), "hello   big  world "), "Ciao Big Mondo");
    }

    #[test]
    fn test_empty_phrase() {
        assert_eq!(translate(&dict(), ""), "");
        assert_eq!(translate(&dict(), "   "), "");
    }

    #[test]
    fn test_non_ascii_first_letter_unchanged() {
        assert_eq!(capitalize_first("èlite"), "èlite");
        assert_eq!(capitalize_first("/ciao"), "/ciao");
    }

    #[test]
    fn test_forward_then_reverse_round_trip() {
        let forward: Dictionary = [("Cat", "Gatto")].into_iter().collect();
        let reverse: Dictionary = [("Gatto", "Cat")].into_iter().collect();

        let there = translate(&forward, "cat");
        assert_eq!(there, "Gatto");
        assert_eq!(translate(&reverse, &there), "Cat");
    }
}
