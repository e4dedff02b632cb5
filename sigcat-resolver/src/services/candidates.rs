//! Search candidate generation for titles
//!
//! Catalog titles and provider titles rarely agree verbatim: dump names carry
//! revision markers and region suffixes, subtitles use different delimiters,
//! articles move around and sequel numbers are spelled three ways. `generate`
//! expands one title into an ordered set of variants to search with.
//!
//! Pipeline (each stage appends to the output of the previous stages):
//! 1. strip trailing version markers and a trailing parenthetical
//! 2. subtitle delimiter variants
//! 3. leading/trailing article variants
//! 4. numeral variants (Arabic, English words, Roman)

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static VERSION_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s+(?:v\s?\d+(?:\.\d+)*[a-z]?|rev(?:ision)?(?:\.\s*|\s+)[a-z0-9]+(?:\.\d+)*)$")
        .expect("valid version regex")
});

static PAREN_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*(?:\([^()]*\)|\[[^\[\]]*\])$")
        .expect("valid parenthetical regex")
});

static LEADING_ARTICLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:the|a|an)\s+").expect("valid article regex")
});

static TRAILING_THE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i),\s*the$").expect("valid article regex")
});

const ONES: [&str; 20] = [
    "Zero", "One", "Two", "Three", "Four", "Five", "Six", "Seven", "Eight", "Nine", "Ten",
    "Eleven", "Twelve", "Thirteen", "Fourteen", "Fifteen", "Sixteen", "Seventeen", "Eighteen",
    "Nineteen",
];

const TENS: [&str; 10] = [
    "", "", "Twenty", "Thirty", "Forty", "Fifty", "Sixty", "Seventy", "Eighty", "Ninety",
];

const ROMAN: [&str; 10] = ["I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X"];

/// Insertion-ordered set of trimmed, non-empty strings
#[derive(Default)]
struct CandidateSet {
    items: Vec<String>,
    seen: HashSet<String>,
}

impl CandidateSet {
    fn push(&mut self, value: &str) {
        let value = value.trim();
        if value.is_empty() || self.seen.contains(value) {
            return;
        }
        self.seen.insert(value.to_string());
        self.items.push(value.to_string());
    }

    fn snapshot(&self) -> Vec<String> {
        self.items.clone()
    }
}

/// Expand a title into ordered, deduplicated search variants.
///
/// The first entry is always the trimmed input. Blank input yields nothing.
pub fn generate(title: &str) -> Vec<String> {
    let mut set = CandidateSet::default();
    let title = title.trim();
    if title.is_empty() {
        return Vec::new();
    }
    set.push(title);

    // Stage 1: version markers and trailing parentheticals
    set.push(&strip_suffixes(title));

    // Stage 2: subtitle delimiters
    for candidate in set.snapshot() {
        if let Some((prefix, _)) = candidate.split_once(" - ") {
            set.push(&candidate.replace(" - ", ": "));
            set.push(prefix);
        }
        if let Some((prefix, _)) = candidate.split_once(": ") {
            set.push(prefix);
        }
    }

    // Stage 3: articles
    for candidate in set.snapshot() {
        if LEADING_ARTICLE.is_match(&candidate) {
            set.push(&LEADING_ARTICLE.replace(&candidate, ""));
        }
        if TRAILING_THE.is_match(&candidate) {
            let stripped = TRAILING_THE.replace(&candidate, "").trim().to_string();
            set.push(&stripped);
            set.push(&format!("The {}", stripped));
        }
    }

    // Stage 4: numerals
    for candidate in set.snapshot() {
        for variant in [
            map_tokens(&candidate, arabic_to_word),
            map_tokens(&candidate, arabic_to_roman),
            map_tokens(&candidate, word_to_arabic),
            roman_variant(&candidate),
        ]
        .into_iter()
        .flatten()
        {
            set.push(&variant);
        }
    }

    set.items
}

/// Repeatedly strip version markers and trailing parentheticals
fn strip_suffixes(title: &str) -> String {
    let mut current = title.trim().to_string();
    loop {
        let next = PAREN_SUFFIX.replace(&current, "");
        let next = VERSION_SUFFIX.replace(next.trim_end(), "").trim().to_string();
        if next.is_empty() || next == current {
            return current;
        }
        current = next;
    }
}

/// Apply `convert` to every whitespace-separated token, keeping surrounding
/// punctuation. Returns `None` when no token changed.
fn map_tokens(text: &str, convert: fn(&str) -> Option<String>) -> Option<String> {
    let mut changed = false;
    let tokens: Vec<String> = text
        .split(' ')
        .map(|token| {
            let start = token
                .find(|c: char| c.is_alphanumeric())
                .unwrap_or(token.len());
            let end = token
                .char_indices()
                .rev()
                .find(|(_, c)| c.is_alphanumeric())
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(start);
            if start >= end {
                return token.to_string();
            }
            match convert(&token[start..end]) {
                Some(replacement) => {
                    changed = true;
                    format!("{}{}{}", &token[..start], replacement, &token[end..])
                }
                None => token.to_string(),
            }
        })
        .collect();

    changed.then(|| tokens.join(" "))
}

/// Parse an Arabic numeral 1-99 with no leading zero
fn parse_arabic(token: &str) -> Option<u32> {
    if token.is_empty() || token.len() > 2 || token.starts_with('0') {
        return None;
    }
    if !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

fn number_to_word(n: u32) -> Option<String> {
    match n {
        1..=19 => Some(ONES[n as usize].to_string()),
        20..=99 => {
            let tens = TENS[(n / 10) as usize];
            match n % 10 {
                0 => Some(tens.to_string()),
                ones => Some(format!("{}-{}", tens, ONES[ones as usize])),
            }
        }
        _ => None,
    }
}

fn word_to_number(word: &str) -> Option<u32> {
    let lower = word.to_ascii_lowercase();
    let ones = |w: &str| {
        ONES.iter()
            .position(|o| o.eq_ignore_ascii_case(w))
            .filter(|&i| i > 0)
            .map(|i| i as u32)
    };
    let tens = |w: &str| {
        TENS.iter()
            .position(|t| !t.is_empty() && t.eq_ignore_ascii_case(w))
            .map(|i| i as u32 * 10)
    };

    match lower.split_once('-') {
        Some((t, o)) => {
            let o = ones(o).filter(|&o| o < 10)?;
            Some(tens(t)? + o)
        }
        None => ones(&lower).or_else(|| tens(&lower)),
    }
}

fn arabic_to_word(token: &str) -> Option<String> {
    parse_arabic(token).and_then(number_to_word)
}

fn arabic_to_roman(token: &str) -> Option<String> {
    parse_arabic(token)
        .filter(|n| (1..=10).contains(n))
        .map(|n| ROMAN[(n - 1) as usize].to_string())
}

fn word_to_arabic(token: &str) -> Option<String> {
    word_to_number(token).map(|n| n.to_string())
}

/// Roman numerals convert only after the first word, so a leading "I" stays a pronoun
fn roman_variant(text: &str) -> Option<String> {
    let (head, rest) = text.split_once(' ')?;
    map_tokens(rest, roman_to_arabic).map(|rest| format!("{} {}", head, rest))
}

fn roman_to_arabic(token: &str) -> Option<String> {
    ROMAN
        .iter()
        .position(|r| *r == token)
        .map(|i| (i + 1).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains_all(candidates: &[String], expected: &[&str]) {
        for e in expected {
            assert!(
                candidates.iter().any(|c| c == e),
                "missing '{}' in {:?}",
                e,
                candidates
            );
        }
    }

    #[test]
    fn test_blank_input_is_empty() {
        assert!(generate("   ").is_empty());
        assert!(generate("").is_empty());
    }

    #[test]
    fn test_first_candidate_is_trimmed_input() {
        assert_eq!(generate("  Contra  ")[0], "Contra");
    }

    #[test]
    fn test_arabic_and_words() {
        contains_all(&generate("Game 1"), &["Game 1", "Game One"]);
        contains_all(&generate("Game One"), &["Game 1"]);
        contains_all(&generate("Final Fantasy 21"), &["Final Fantasy Twenty-One"]);
        contains_all(&generate("Final Fantasy Twenty-One"), &["Final Fantasy 21"]);
    }

    #[test]
    fn test_roman_numerals() {
        contains_all(&generate("Chapter 3"), &["Chapter 3", "Chapter III"]);
        contains_all(&generate("Chapter III"), &["Chapter 3"]);
        // Roman forms stop at ten
        assert!(!generate("Chapter 11").iter().any(|c| c.contains("XI")));
    }

    #[test]
    fn test_leading_pronoun_is_not_a_numeral() {
        let candidates = generate("I Am Setsuna");
        assert_eq!(candidates[0], "I Am Setsuna");
        assert!(!candidates.iter().any(|c| c.starts_with('1')));

        contains_all(&generate("Final Fantasy VI"), &["Final Fantasy 6"]);
        contains_all(&generate("V Rally II"), &["V Rally 2"]);
        assert!(!generate("V Rally II").iter().any(|c| c.starts_with('5')));
    }

    #[test]
    fn test_articles() {
        contains_all(
            &generate("The Legend of Zelda"),
            &["The Legend of Zelda", "Legend of Zelda"],
        );
        contains_all(
            &generate("Legend of Zelda, The"),
            &["Legend of Zelda", "The Legend of Zelda"],
        );
        contains_all(&generate("An American Tail"), &["American Tail"]);
    }

    #[test]
    fn test_delimiters() {
        contains_all(
            &generate("Resident Evil - Code: Veronica"),
            &[
                "Resident Evil - Code: Veronica",
                "Resident Evil: Code: Veronica",
                "Resident Evil",
            ],
        );
    }

    #[test]
    fn test_version_and_parenthetical_suffixes() {
        contains_all(&generate("Contra (USA)"), &["Contra"]);
        contains_all(&generate("Contra (USA) (Rev 1)"), &["Contra"]);
        contains_all(&generate("Contra v1.2"), &["Contra"]);
        contains_all(&generate("Contra Rev A"), &["Contra"]);
        // "Rev" inside a word is not a marker
        assert!(!generate("Sonic Revenge").iter().any(|c| c == "Sonic"));
    }

    #[test]
    fn test_numerals_compose_over_earlier_stages() {
        contains_all(&generate("The Game 2 (Europe)"), &["Game Two", "Game II"]);
    }

    #[test]
    fn test_digits_inside_tokens_untouched() {
        let candidates = generate("Super Mario 3D World");
        assert!(!candidates.iter().any(|c| c.contains("Three")));
        assert!(!generate("Agent 007").iter().any(|c| c.contains("Seven")));
    }

    #[test]
    fn test_deduplicated_and_ordered() {
        let candidates = generate("Tetris");
        assert_eq!(candidates, vec!["Tetris".to_string()]);

        let candidates = generate("Game 1");
        let unique: HashSet<_> = candidates.iter().collect();
        assert_eq!(unique.len(), candidates.len());
        assert_eq!(candidates[0], "Game 1");
    }
}
