//! Query pre-filter.
//!
//! Rejects text that is unlikely to be a place name before any network call
//! is made. Rules run in a fixed order and the first failing rule wins.

use thiserror::Error;

const MIN_LEN: usize = 2;
const MAX_LEN: usize = 50;
const MAX_VOWEL_RUN: usize = 2;
const MAX_CONSONANT_RUN: usize = 3;
const MAX_REPEAT: usize = 2;

const VOWELS: &str = "aeiou";
const MASH_PREFIXES: [&str; 4] = ["qwe", "asdf", "zxcv", "test"];
const KEYBOARD_ROWS: [&str; 3] = ["qwertyuiop", "asdfghjkl", "zxcvbnm"];

/// Which gibberish heuristic matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GibberishPattern {
    VowelRun,
    ConsonantRun,
    RepeatedChar,
    SingleLetter,
    KeyboardMash,
    Alternating,
    KeyboardRow,
}

/// Why a query was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueryRejection {
    #[error("query is shorter than 2 characters")]
    TooShort,

    #[error("query contains characters other than letters, spaces, hyphens or apostrophes")]
    InvalidCharacters,

    #[error("query looks like gibberish ({0:?})")]
    Gibberish(GibberishPattern),

    #[error("query needs both a vowel and a consonant")]
    MissingVowelOrConsonant,

    #[error("query starts or ends with a space or hyphen")]
    BadEdge,

    #[error("query is longer than 50 characters")]
    TooLong,
}

/// Check `text` against every rule, returning the first one it breaks
pub fn check_query(text: &str) -> Result<(), QueryRejection> {
    let len = text.chars().count();
    if len < MIN_LEN {
        return Err(QueryRejection::TooShort);
    }

    if !text
        .chars()
        .all(|c| c.is_ascii_alphabetic() || c.is_whitespace() || c == '-' || c == '\'')
    {
        return Err(QueryRejection::InvalidCharacters);
    }

    let lower = text.to_ascii_lowercase();
    if let Some(pattern) = gibberish(&lower) {
        return Err(QueryRejection::Gibberish(pattern));
    }

    if len > MIN_LEN {
        let has_vowel = lower.chars().any(is_vowel);
        let has_consonant = lower.chars().any(is_consonant);
        if !has_vowel || !has_consonant {
            return Err(QueryRejection::MissingVowelOrConsonant);
        }
    }

    let bad_edge = |c: char| c.is_whitespace() || c == '-';
    if text.starts_with(bad_edge) || text.ends_with(bad_edge) {
        return Err(QueryRejection::BadEdge);
    }

    if len > MAX_LEN {
        return Err(QueryRejection::TooLong);
    }

    Ok(())
}

/// Boolean form of [`check_query`]
pub fn is_valid_query(text: &str) -> bool {
    check_query(text).is_ok()
}

fn is_vowel(c: char) -> bool {
    VOWELS.contains(c)
}

fn is_consonant(c: char) -> bool {
    c.is_ascii_alphabetic() && !is_vowel(c)
}

/// `lower` is ASCII and lowercased
fn gibberish(lower: &str) -> Option<GibberishPattern> {
    let chars: Vec<char> = lower.chars().collect();

    if longest_run(&chars, is_vowel) > MAX_VOWEL_RUN {
        return Some(GibberishPattern::VowelRun);
    }
    if longest_run(&chars, is_consonant) > MAX_CONSONANT_RUN {
        return Some(GibberishPattern::ConsonantRun);
    }
    if chars
        .windows(MAX_REPEAT + 1)
        .any(|w| w.iter().all(|c| *c == w[0]))
    {
        return Some(GibberishPattern::RepeatedChar);
    }
    if chars.iter().all(|c| *c == chars[0]) {
        return Some(GibberishPattern::SingleLetter);
    }
    if MASH_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return Some(GibberishPattern::KeyboardMash);
    }
    // "abab": a two-letter unit repeated at least twice
    if chars
        .windows(4)
        .any(|w| w[0] != w[1] && w[0] == w[2] && w[1] == w[3])
    {
        return Some(GibberishPattern::Alternating);
    }

    let letters: Vec<char> = chars.iter().copied().filter(char::is_ascii_alphabetic).collect();
    if !letters.is_empty()
        && KEYBOARD_ROWS
            .iter()
            .any(|row| letters.iter().all(|c| row.contains(*c)))
    {
        return Some(GibberishPattern::KeyboardRow);
    }

    None
}

fn longest_run(chars: &[char], pred: fn(char) -> bool) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in chars {
        if pred(*c) {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_places_pass() {
        for place in [
            "Jakarta",
            "Atlantis",
            "Paris",
            "New York",
            "Rio de Janeiro",
            "Cote d'Ivoire",
            "Guinea-Bissau",
            "L'Aquila",
            "Oslo",
            "Lima",
            "Ho",
        ] {
            assert!(is_valid_query(place), "{place} should pass");
        }
    }

    #[test]
    fn test_length_rules() {
        assert_eq!(check_query(""), Err(QueryRejection::TooShort));
        assert_eq!(check_query("a"), Err(QueryRejection::TooShort));
        let long = "Lana ".repeat(11);
        assert_eq!(check_query(long.trim_end()), Err(QueryRejection::TooLong));
    }

    #[test]
    fn test_characters() {
        assert_eq!(check_query("Paris1"), Err(QueryRejection::InvalidCharacters));
        assert_eq!(check_query("São Paulo"), Err(QueryRejection::InvalidCharacters));
        assert_eq!(check_query("Paris!"), Err(QueryRejection::InvalidCharacters));
    }

    #[test]
    fn test_gibberish_patterns() {
        use GibberishPattern::*;

        let cases = [
            ("zzqx", ConsonantRun),
            ("aeiou", VowelRun),
            ("booot", VowelRun),
            ("hallla", RepeatedChar),
            ("bb", SingleLetter),
            ("asdfa", KeyboardMash),
            ("Testville", KeyboardMash),
            ("lalala", Alternating),
            ("typewriter", KeyboardRow),
        ];
        for (query, pattern) in cases {
            assert_eq!(
                check_query(query),
                Err(QueryRejection::Gibberish(pattern)),
                "{query}"
            );
        }
    }

    #[test]
    fn test_known_false_rejections() {
        use GibberishPattern::*;

        let cases = [
            ("Hawaii", VowelRun),
            ("Schwerin", ConsonantRun),
            ("Christchurch", ConsonantRun),
            ("Quito", KeyboardRow),
            ("Peru", KeyboardRow),
            ("Rio", KeyboardRow),
            ("Honolulu", Alternating),
            ("Lala", Alternating),
        ];
        for (query, pattern) in cases {
            assert_eq!(
                check_query(query),
                Err(QueryRejection::Gibberish(pattern)),
                "{query}"
            );
        }
    }

    #[test]
    fn test_alternating_from_two_units() {
        use GibberishPattern::Alternating;

        assert_eq!(check_query("abab"), Err(QueryRejection::Gibberish(Alternating)));
        assert_eq!(check_query("Kokomo"), Err(QueryRejection::Gibberish(Alternating)));
        assert!(is_valid_query("Aba"));
        assert!(is_valid_query("Kokand"));
    }

    #[test]
    fn test_keyboard_row_at_any_length() {
        use GibberishPattern::KeyboardRow;

        assert_eq!(check_query("Pretty"), Err(QueryRejection::Gibberish(KeyboardRow)));
        assert_eq!(check_query("ty"), Err(QueryRejection::Gibberish(KeyboardRow)));
        assert_eq!(check_query("Oslo"), Ok(()));
    }

    #[test]
    fn test_vowel_and_consonant_required() {
        assert_eq!(check_query("brr"), Err(QueryRejection::MissingVowelOrConsonant));
        assert_eq!(check_query("eau"), Err(QueryRejection::Gibberish(GibberishPattern::VowelRun)));
        assert_eq!(check_query("ai"), Ok(()));
    }

    #[test]
    fn test_edges() {
        assert_eq!(check_query("Paris-"), Err(QueryRejection::BadEdge));
        assert_eq!(check_query(" Paris"), Err(QueryRejection::BadEdge));
    }
}
