//! Prepass Advanced (component C4): deterministic casing, punctuation-run,
//! and ellipsis normalization over a text span.
//!
//! Every step is local (no change crosses a mask token, since this
//! operates purely on a single span's text) and idempotent.

use once_cell::sync::Lazy;
use regex::Regex;

use mdvoice_core::{AcronymWhitelist, EllipsisMode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepassAdvancedStats {
    pub letter_runs_joined: u64,
    pub all_caps_title_cased: u64,
    pub punctuation_runs_collapsed: u64,
    pub ellipses_normalized: u64,
    pub mid_word_caps_fixed: u64,
}

static LETTER_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\p{L}(?: \p{L}){2,}\b").unwrap());
static ALL_CAPS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\p{Lu}[\p{Lu}'\-]{5,}\b").unwrap());
static BANG_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!{2,}").unwrap());
static QUESTION_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?{2,}").unwrap());
static COMMA_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r",{2,}").unwrap());
static ELLIPSIS_DOTS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.(?: *\.){2,}").unwrap());
static ELLIPSIS_CHAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\u{2026}").unwrap());
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{L}+").unwrap());

/// Applies, in order: inter-letter-spaced-sequence joining, all-caps
/// title-casing, punctuation-run collapsing, ellipsis canonicalization,
/// and mid-word capitalization repair.
pub fn apply(
    span: &str,
    whitelist: &AcronymWhitelist,
    ellipsis_mode: EllipsisMode,
) -> (String, PrepassAdvancedStats) {
    let mut stats = PrepassAdvancedStats::default();

    // (a) Join inter-letter spaced sequences (>= 3 single-letter tokens
    // separated by single spaces), unless any token is whitelisted.
    let mut text = replace_all_conditionally(span, &LETTER_RUN_RE, |m| {
        if m.split(' ').any(|tok| whitelist.contains(tok)) {
            None
        } else {
            stats.letter_runs_joined += 1;
            Some(m.chars().filter(|c| *c != ' ').collect())
        }
    });

    // (b) Normalize ALL-CAPS runs longer than five characters to Title
    // Case, unless whitelisted.
    text = replace_all_conditionally(&text, &ALL_CAPS_RE, |m| {
        if whitelist.contains(m) {
            None
        } else {
            stats.all_caps_title_cased += 1;
            Some(title_case(m))
        }
    });

    // (c) Collapse runs of identical punctuation.
    for (re, repl) in [(&*BANG_RUN_RE, "!"), (&*QUESTION_RUN_RE, "?"), (&*COMMA_RUN_RE, ",")] {
        let count = re.find_iter(&text).count();
        if count > 0 {
            text = re.replace_all(&text, repl).into_owned();
            stats.punctuation_runs_collapsed += count as u64;
        }
    }

    // (d) Normalize ellipsis variants to the configured canonical form.
    let canonical = match ellipsis_mode {
        EllipsisMode::ThreeDots => "...",
        EllipsisMode::SingleChar => "\u{2026}",
    };
    let dots_count = ELLIPSIS_DOTS_RE.find_iter(&text).count();
    if dots_count > 0 {
        text = ELLIPSIS_DOTS_RE.replace_all(&text, canonical).into_owned();
        stats.ellipses_normalized += dots_count as u64;
    }
    let char_count = ELLIPSIS_CHAR_RE.find_iter(&text).count();
    if char_count > 0 {
        text = ELLIPSIS_CHAR_RE.replace_all(&text, canonical).into_owned();
        stats.ellipses_normalized += char_count as u64;
    }

    // (e) Fix mid-word capitalization inside words longer than three
    // letters, when the word's leading two letters are not whitelisted.
    text = fix_mid_word_caps(&text, whitelist, &mut stats);

    (text, stats)
}

fn replace_all_conditionally(
    text: &str,
    re: &Regex,
    mut f: impl FnMut(&str) -> Option<String>,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in re.find_iter(text) {
        match f(m.as_str()) {
            Some(replacement) => {
                out.push_str(&text[last..m.start()]);
                out.push_str(&replacement);
                last = m.end();
            }
            None => {}
        }
    }
    out.push_str(&text[last..]);
    out
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => {
            let mut out = String::with_capacity(word.len());
            out.extend(first.to_uppercase());
            out.extend(chars.flat_map(|c| c.to_lowercase()));
            out
        }
        None => String::new(),
    }
}

fn fix_mid_word_caps(text: &str, whitelist: &AcronymWhitelist, stats: &mut PrepassAdvancedStats) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in WORD_RE.find_iter(text) {
        let word = m.as_str();
        let chars: Vec<char> = word.chars().collect();
        if chars.len() <= 3 {
            continue;
        }
        let prefix: String = chars.iter().take(2).collect::<String>().to_lowercase();
        if whitelist.contains(&prefix) {
            continue;
        }
        if chars[1..].iter().any(|c| c.is_uppercase()) {
            out.push_str(&text[last..m.start()]);
            let mut fixed = String::with_capacity(word.len());
            fixed.push(chars[0]);
            for c in &chars[1..] {
                fixed.extend(c.to_lowercase());
            }
            out.push_str(&fixed);
            last = m.end();
            stats.mid_word_caps_fixed += 1;
        }
    }
    out.push_str(&text[last..]);
    out
}
