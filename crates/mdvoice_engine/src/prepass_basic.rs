//! Prepass Basic (component C3): deterministic Unicode normalization and
//! spacing repair over a single text span.
//!
//! Every step here is purely local to the span and idempotent; running
//! the stage twice on the same input must produce bit-for-bit the same
//! output as running it once (`P(P(s)) == P(s)`).

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Per-span counters for the fixes Prepass Basic applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepassBasicStats {
    pub unicode_folded: u64,
    pub zero_width_removed: u64,
    pub space_runs_collapsed: u64,
    pub soft_hyphens_rejoined: u64,
    pub nbsp_normalized: u64,
}

static SPACE_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());
static SOFT_HYPHEN_BREAK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\u{00AD}\r?\n[ \t]*").unwrap());

/// Maps the "fake small caps" code points commonly used by online
/// stylized-text generators (Phonetic Extensions / IPA / Latin Extended-B
/// ranges) to their plain lowercase ASCII letter. These code points have
/// no official Unicode compatibility decomposition, so standard NFKC
/// alone does not fold them; this table is the "NFKC-equivalent"
/// supplement the data model calls for.
fn fold_small_caps(c: char) -> Option<char> {
    Some(match c {
        '\u{1D00}' => 'a',
        '\u{0299}' => 'b',
        '\u{1D04}' => 'c',
        '\u{1D05}' => 'd',
        '\u{1D07}' => 'e',
        '\u{A730}' => 'f',
        '\u{0262}' => 'g',
        '\u{029C}' => 'h',
        '\u{026A}' => 'i',
        '\u{1D0A}' => 'j',
        '\u{1D0B}' => 'k',
        '\u{029F}' => 'l',
        '\u{1D0D}' => 'm',
        '\u{0274}' => 'n',
        '\u{1D0F}' => 'o',
        '\u{1D18}' => 'p',
        '\u{0280}' => 'r',
        '\u{A7AE}' => 's',
        '\u{1D1B}' => 't',
        '\u{1D1C}' => 'u',
        '\u{1D20}' => 'v',
        '\u{1D21}' => 'w',
        '\u{028F}' => 'y',
        '\u{1D22}' => 'z',
        _ => return None,
    })
}

fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}')
}

/// Applies, in order: small-caps/NFKC compatibility folding, zero-width
/// character removal, ASCII-space-run collapsing, soft-hyphen rejoining
/// across line breaks, and non-breaking-space normalization outside
/// numeric contexts.
pub fn apply(span: &str) -> (String, PrepassBasicStats) {
    let mut stats = PrepassBasicStats::default();

    // (a) Unicode canonical composition (NFKC-equivalent compatibility
    // normalization), supplemented with the small-caps fold table.
    let mut folded = String::with_capacity(span.len());
    for c in span.chars() {
        if let Some(mapped) = fold_small_caps(c) {
            folded.push(mapped);
            stats.unicode_folded += 1;
        } else {
            folded.push(c);
        }
    }
    let nfkc: String = folded.nfkc().collect();
    if nfkc != folded {
        stats.unicode_folded += 1;
    }
    let mut text = nfkc;

    // (b) Zero-width character removal.
    if text.chars().any(is_zero_width) {
        let before_len = text.chars().count();
        text = text.chars().filter(|c| !is_zero_width(*c)).collect();
        stats.zero_width_removed += (before_len - text.chars().count()) as u64;
    }

    // (c) Collapse runs of ASCII space to a single space; newlines are
    // untouched since the regex only matches the literal space byte.
    let collapsed_matches = SPACE_RUN_RE.find_iter(&text).count();
    if collapsed_matches > 0 {
        text = SPACE_RUN_RE.replace_all(&text, " ").into_owned();
        stats.space_runs_collapsed += collapsed_matches as u64;
    }

    // (d) Re-join soft-hyphenated words split across a line break.
    let rejoin_matches = SOFT_HYPHEN_BREAK_RE.find_iter(&text).count();
    if rejoin_matches > 0 {
        text = SOFT_HYPHEN_BREAK_RE.replace_all(&text, "").into_owned();
        stats.soft_hyphens_rejoined += rejoin_matches as u64;
    }

    // (e) Normalize non-breaking spaces to ordinary spaces, except
    // between two digits (a numeric grouping context, e.g. `12\u{A0}345`).
    if text.contains('\u{00A0}') {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        for (i, &c) in chars.iter().enumerate() {
            if c == '\u{00A0}' {
                let prev_digit = i > 0 && chars[i - 1].is_ascii_digit();
                let next_digit = i + 1 < chars.len() && chars[i + 1].is_ascii_digit();
                if prev_digit && next_digit {
                    out.push(c);
                } else {
                    out.push(' ');
                    stats.nbsp_normalized += 1;
                }
            } else {
                out.push(c);
            }
        }
        text = out;
    }

    (text, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_caps_and_collapse_letters() {
        let (out, stats) = apply("F \u{029F} \u{1D00} s \u{029C}!");
        assert_eq!(out, "F l a s h!");
        assert!(stats.unicode_folded > 0);
    }

    #[test]
    fn stylized_small_caps_phrase() {
        let (out, _) = apply("B\u{028F} M\u{028F} R\u{1D07}s\u{1D0F}\u{029F}\u{1D20}\u{1D07}!");
        assert_eq!(out, "By My Resolve!");
    }

    #[test]
    fn zero_width_characters_removed() {
        let (out, stats) = apply("hel\u{200B}lo\u{FEFF}");
        assert_eq!(out, "hello");
        assert_eq!(stats.zero_width_removed, 2);
    }

    #[test]
    fn space_runs_collapse_preserves_newlines() {
        let (out, stats) = apply("a   b\nc    d");
        assert_eq!(out, "a b\nc d");
        assert_eq!(stats.space_runs_collapsed, 2);
    }

    #[test]
    fn soft_hyphen_rejoins_across_break() {
        let (out, stats) = apply("auto\u{00AD}\nmated");
        assert_eq!(out, "automated");
        assert_eq!(stats.soft_hyphens_rejoined, 1);
    }

    #[test]
    fn nbsp_normalized_outside_numeric_context() {
        let (out, stats) = apply("Word\u{00A0}with\u{00A0}nbsp");
        assert_eq!(out, "Word with nbsp");
        assert_eq!(stats.nbsp_normalized, 2);
    }

    #[test]
    fn nbsp_preserved_between_digits() {
        let (out, stats) = apply("12\u{00A0}345 people");
        assert_eq!(out, "12\u{00A0}345 people");
        assert_eq!(stats.nbsp_normalized, 0);
    }

    #[test]
    fn idempotent_on_mixed_input() {
        let input = "F \u{029F} \u{1D00} s \u{029C}!  multi   space\u{00A0}text";
        let (once, _) = apply(input);
        let (twice, _) = apply(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_span_is_noop() {
        let (out, stats) = apply("");
        assert_eq!(out, "");
        assert_eq!(stats, PrepassBasicStats::default());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_span() -> impl Strategy<Value = String> {
            prop::string::string_regex(
                "[A-Za-z0-9 .,!?'\u{1D00}\u{0299}\u{1D04}\u{029F}\u{029C}\u{00A0}\u{200B}\u{00AD}-]{0,80}",
            )
            .unwrap()
        }

        proptest! {
            #[test]
            fn apply_is_idempotent(input in arb_span()) {
                let (once, _) = apply(&input);
                let (twice, _) = apply(&once);
                prop_assert_eq!(once, twice);
            }
        }
    }
}
