//! Replacement items and plans (components C6/C7's shared vocabulary).

use serde::{Deserialize, Serialize};

/// Markdown metacharacters a replacement's `replace` side must never
/// introduce, so an accepted edit cannot fabricate new Markdown structure.
pub const FORBIDDEN_REPLACE_CHARS: &[char] =
    &['*', '_', '[', ']', '(', ')', '`', '~', '<', '>'];

/// Maximum characters a single `find`/`replace` string may span.
pub const MAX_ITEM_LEN: usize = 80;

/// Upper bound on how much longer `replace` may be than `find`.
pub const MAX_ITEM_GROWTH: i64 = 10;

/// Maximum number of items a single accepted plan may carry.
pub const MAX_PLAN_ITEMS: usize = 16;

/// Allowed justification for a replacement. Any other tag (e.g. the
/// blocked `STYLE`, `REWRITE`, `MEANING_CHANGE`) is rejected by the schema
/// validator before this type is ever constructed from untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonTag {
    TtsSpaced,
    UnicodeStylized,
    CaseGlitch,
    SimplePunct,
}

impl ReasonTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonTag::TtsSpaced => "TTS_SPACED",
            ReasonTag::UnicodeStylized => "UNICODE_STYLIZED",
            ReasonTag::CaseGlitch => "CASE_GLITCH",
            ReasonTag::SimplePunct => "SIMPLE_PUNCT",
        }
    }
}

/// A single candidate edit: replace `find` with `replace`, justified by
/// `reason`. Constructed freely; [`crate::plan` schema validation] (in
/// `mdvoice_engine`) is what enforces the length, character, and
/// provenance invariants before an item is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementItem {
    pub find: String,
    pub replace: String,
    pub reason: ReasonTag,
}

impl ReplacementItem {
    pub fn new(find: impl Into<String>, replace: impl Into<String>, reason: ReasonTag) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
            reason,
        }
    }

    /// `len(replace) - len(find)`, the per-item growth this item would
    /// contribute if applied.
    pub fn growth(&self) -> i64 {
        self.replace.chars().count() as i64 - self.find.chars().count() as i64
    }
}

/// A validated set of replacement items scoped to one text span (after
/// merging across that span's chunks).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub items: Vec<ReplacementItem>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Sum of every item's growth, in characters.
    pub fn total_growth(&self) -> i64 {
        self.items.iter().map(ReplacementItem::growth).sum()
    }
}

/// Why a candidate item or an entire plan was rejected. Each variant
/// corresponds to one of the ordered checks in the plan schema (C6) and
/// doubles as the counter name recorded in the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionReason {
    Schema,
    ForbiddenChars,
    LengthDelta,
    NoMatch,
    Duplicate,
    Budget,
    CumulativeDelta,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::Schema => "schema",
            RejectionReason::ForbiddenChars => "forbidden_chars",
            RejectionReason::LengthDelta => "length_delta",
            RejectionReason::NoMatch => "no_match",
            RejectionReason::Duplicate => "duplicate",
            RejectionReason::Budget => "budget",
            RejectionReason::CumulativeDelta => "cumulative_delta",
        }
    }
}
