//! Deterministic post-processing applied to every LLM-generated reply before
//! it reaches [`crate::chat::ChatTransport::post_as`].

use rand::Rng;
use std::sync::LazyLock;

#[derive(Debug, Clone)]
pub struct HumanizeOpts {
    pub max_sentences: usize,
    pub max_chars: usize,
    pub allow_emoji: bool,
    pub allow_non_facial: bool,
}

impl Default for HumanizeOpts {
    fn default() -> Self {
        Self { max_sentences: 2, max_chars: 440, allow_emoji: true, allow_non_facial: true }
    }
}

impl HumanizeOpts {
    /// Tighter limits used for consensus verdicts.
    pub fn verdict() -> Self {
        Self { max_sentences: 1, max_chars: 440, allow_emoji: false, allow_non_facial: false }
    }
}

const CANNED_PREFIXES: &[&str] = &[
    "great question",
    "of course",
    "certainly",
    "you're absolutely right",
    "i hope this helps",
];

static HEADING: LazyLock<regex::Regex> = LazyLock::new(|| regex::Regex::new(r"^#{1,6}\s+").unwrap());
static BULLET: LazyLock<regex::Regex> = LazyLock::new(|| regex::Regex::new(r"^\s*[-*]\s+").unwrap());
static BOLD: LazyLock<regex::Regex> = LazyLock::new(|| regex::Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static WHITESPACE_RUN: LazyLock<regex::Regex> = LazyLock::new(|| regex::Regex::new(r"\s+").unwrap());
static SENTENCE_SPLIT: LazyLock<regex::Regex> = LazyLock::new(|| regex::Regex::new(r"[.!?]\s+").unwrap());

/// Equivalent to splitting on `(?<=[.!?])\s+` (a zero-width lookbehind the
/// `regex` crate doesn't support): keeps the terminating punctuation
/// attached to the preceding sentence while still consuming the whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut last = 0;
    for m in SENTENCE_SPLIT.find_iter(text) {
        let punct_end = m.start() + 1;
        pieces.push(&text[last..punct_end]);
        last = m.end();
    }
    pieces.push(&text[last..]);
    pieces
}

/// `SKIP` (case-insensitive, whitespace-tolerant) predicate used everywhere
/// the LLM may opt out of replying.
pub fn is_skip_message(s: &str) -> bool {
    s.trim().eq_ignore_ascii_case("skip")
}

/// The full seven-step humanization pipeline.
pub fn humanize(raw: &str, opts: &HumanizeOpts) -> String {
    if is_skip_message(raw) {
        return "SKIP".to_string();
    }

    let mut text = strip_markdown(raw);
    text = strip_canned_prefix(&text);
    text = dedupe_repeated_sentences(&text);
    text = apply_emoji_policy(&text, opts.allow_emoji, opts.allow_non_facial);
    text = trim_to_sentences(&text, opts.max_sentences);

    if text.chars().count() > opts.max_chars {
        let truncated: String = text.chars().take(opts.max_chars.saturating_sub(3)).collect();
        text = format!("{truncated}...");
    }

    text
}

fn strip_markdown(raw: &str) -> String {
    let mut lines: Vec<String> = raw
        .lines()
        .map(|line| {
            let line = HEADING.replace(line, "");
            let line = BULLET.replace(&line, "");
            line.to_string()
        })
        .collect();

    for line in lines.iter_mut() {
        *line = BOLD.replace_all(line, "$1").to_string();
    }

    let joined = lines.join(" ");
    WHITESPACE_RUN.replace_all(joined.trim(), " ").to_string()
}

fn strip_canned_prefix(text: &str) -> String {
    let lower = text.to_lowercase();
    for prefix in CANNED_PREFIXES {
        if lower.starts_with(prefix) {
            let rest = &text[prefix.len()..];
            return rest.trim_start_matches([',', '.', '!', ':', ' ']).trim_start().to_string();
        }
    }
    text.to_string()
}

/// Remove every sentence that appears more than once anywhere in the
/// sequence — global dedup, not just consecutive repeats.
pub fn dedupe_repeated_sentences(text: &str) -> String {
    let sentences: Vec<&str> = split_sentences(text).into_iter().filter(|s| !s.trim().is_empty()).collect();

    let mut counts = std::collections::HashMap::new();
    for sentence in &sentences {
        *counts.entry(sentence.trim()).or_insert(0) += 1;
    }

    let mut seen = std::collections::HashSet::new();
    let kept: Vec<&str> = sentences
        .into_iter()
        .filter(|s| {
            let trimmed = s.trim();
            if counts[trimmed] > 1 {
                false
            } else {
                seen.insert(trimmed)
            }
        })
        .collect();

    kept.join(" ")
}

const FACIAL_RANGES: &[(u32, u32)] = &[(0x1F600, 0x1F64F), (0x1F910, 0x1F92F), (0x1F970, 0x1F97A)];

fn is_facial_emoji(c: char) -> bool {
    let cp = c as u32;
    FACIAL_RANGES.iter().any(|(lo, hi)| cp >= *lo && cp <= *hi)
}

fn is_pictograph(c: char) -> bool {
    emojis::get(&c.to_string()).is_some()
}

fn apply_emoji_policy(text: &str, allow_emoji: bool, allow_non_facial: bool) -> String {
    if !allow_emoji {
        return text.chars().filter(|c| !is_pictograph(*c)).collect();
    }

    let facial = text.chars().find(|c| is_facial_emoji(*c));
    let keep = facial.or_else(|| if allow_non_facial { text.chars().find(|c| is_pictograph(*c)) } else { None });

    let mut kept_one = false;
    text.chars()
        .filter(|c| {
            if !is_pictograph(*c) {
                return true;
            }
            if Some(*c) == keep && !kept_one {
                kept_one = true;
                true
            } else {
                false
            }
        })
        .collect()
}

fn trim_to_sentences(text: &str, max_sentences: usize) -> String {
    let sentences: Vec<&str> = split_sentences(text).into_iter().filter(|s| !s.trim().is_empty()).collect();
    sentences.into_iter().take(max_sentences).collect::<Vec<_>>().join(" ")
}

/// Sample a max-sentence budget per the cadence distribution: 35% → 1,
/// next 25% → 2, remainder → 3.
pub fn sample_max_sentences(rng: &mut impl Rng) -> usize {
    let roll: f64 = rng.random();
    if roll < 0.35 {
        1
    } else if roll < 0.60 {
        2
    } else {
        3
    }
}

/// Sample a max-character budget: `280 + rand(0..160)`.
pub fn sample_max_chars(rng: &mut impl Rng) -> usize {
    280 + rng.random_range(0..160)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_passes_through_unchanged() {
        assert_eq!(humanize("SKIP", &HumanizeOpts::default()), "SKIP");
        assert_eq!(humanize("  skip  ", &HumanizeOpts::default()), "SKIP");
    }

    #[test]
    fn dedupe_is_global_not_just_consecutive() {
        assert_eq!(dedupe_repeated_sentences("Good. Good. Bad. Good."), "Bad.");
    }

    #[test]
    fn humanization_is_idempotent() {
        let opts = HumanizeOpts::default();
        for input in [
            "**Great question!** Here's the plan. Here's the plan. Ship it 🎉🚀",
            "# Heading\n- bullet one\nPlain text.",
            "of course, we can do that. Let's go.",
        ] {
            let once = humanize(input, &opts);
            let twice = humanize(&once, &opts);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn emoji_policy_disallowed_strips_all_pictographs() {
        let result = apply_emoji_policy("Nice work 🎉🚀", false, true);
        assert!(!result.chars().any(is_pictograph));
    }

    #[test]
    fn emoji_policy_keeps_at_most_one_preferring_facial() {
        let result = apply_emoji_policy("Nice 🚀 work 😀 done", true, true);
        let pictographs: Vec<char> = result.chars().filter(|c| is_pictograph(*c)).collect();
        assert_eq!(pictographs.len(), 1);
        assert!(is_facial_emoji(pictographs[0]));
    }

    #[test]
    fn markdown_strip_preserves_inline_backticks() {
        let result = strip_markdown("# Heading\n- **bold** item with `code`");
        assert!(result.contains("`code`"));
        assert!(!result.contains("**"));
        assert!(!result.starts_with('#'));
    }
}
