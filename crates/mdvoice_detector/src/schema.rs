//! Plan Schema (component C6): validates, deduplicates, and merges
//! candidate replacement items returned by the detector collaborator
//! into an accepted [`Plan`].

use std::collections::HashSet;

use mdvoice_core::{Plan, RejectionReason, ReplacementItem, plan::{FORBIDDEN_REPLACE_CHARS, MAX_ITEM_GROWTH, MAX_ITEM_LEN, MAX_PLAN_ITEMS}};

/// A candidate item as received from the detector, before any of it is
/// trusted. Carries raw strings so a malformed `reason` can be rejected
/// as `schema` instead of failing to deserialize at all.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CandidateItem {
    pub find: String,
    pub replace: String,
    pub reason: String,
}

const ALLOWED_REASONS: [&str; 4] = ["TTS_SPACED", "UNICODE_STYLIZED", "CASE_GLITCH", "SIMPLE_PUNCT"];
const BLOCKED_REASONS: [&str; 3] = ["STYLE", "REWRITE", "MEANING_CHANGE"];

/// Per-reason-kind rejection counters, one entry per [`RejectionReason`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RejectionCounts {
    pub schema: u64,
    pub forbidden_chars: u64,
    pub length_delta: u64,
    pub no_match: u64,
    pub duplicate: u64,
    pub budget: u64,
    pub cumulative_delta: u64,
}

impl RejectionCounts {
    fn increment(&mut self, reason: RejectionReason) {
        match reason {
            RejectionReason::Schema => self.schema += 1,
            RejectionReason::ForbiddenChars => self.forbidden_chars += 1,
            RejectionReason::LengthDelta => self.length_delta += 1,
            RejectionReason::NoMatch => self.no_match += 1,
            RejectionReason::Duplicate => self.duplicate += 1,
            RejectionReason::Budget => self.budget += 1,
            RejectionReason::CumulativeDelta => self.cumulative_delta += 1,
        }
    }
}

fn parse_reason(raw: &str) -> Option<mdvoice_core::ReasonTag> {
    use mdvoice_core::ReasonTag::*;
    match raw {
        "TTS_SPACED" => Some(TtsSpaced),
        "UNICODE_STYLIZED" => Some(UnicodeStylized),
        "CASE_GLITCH" => Some(CaseGlitch),
        "SIMPLE_PUNCT" => Some(SimplePunct),
        _ => None,
    }
}

/// Runs the five per-item checks (in fixed order) and the two plan-level
/// checks against `candidates`, scoped to `scope_text`. `plan_growth_fraction`
/// is the configured upper bound (default 0.05) a plan's cumulative growth
/// may spend against `scope_text`'s length. Returns the accepted plan plus
/// a tally of why anything was rejected.
pub fn validate(candidates: &[CandidateItem], scope_text: &str, plan_growth_fraction: f64) -> (Plan, RejectionCounts) {
    let mut counts = RejectionCounts::default();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut items: Vec<ReplacementItem> = Vec::new();

    for candidate in candidates {
        match validate_one(candidate, scope_text, &seen) {
            Ok(item) => {
                seen.insert((item.find.clone(), item.replace.clone()));
                items.push(item);
            }
            Err(reason) => counts.increment(reason),
        }
    }

    let (plan, plan_rejected) = apply_plan_level_checks(items, scope_text, plan_growth_fraction);
    if let Some(reason) = plan_rejected {
        counts.increment(reason);
        return (Plan::new(), counts);
    }

    (plan, counts)
}

fn validate_one(candidate: &CandidateItem, scope_text: &str, seen: &HashSet<(String, String)>) -> Result<ReplacementItem, RejectionReason> {
    // 1. schema
    if candidate.find.is_empty()
        || candidate.find.chars().count() > MAX_ITEM_LEN
        || candidate.replace.chars().count() > MAX_ITEM_LEN
        || candidate.find.contains('\n')
        || candidate.replace.contains('\n')
        || BLOCKED_REASONS.contains(&candidate.reason.as_str())
        || !ALLOWED_REASONS.contains(&candidate.reason.as_str())
    {
        return Err(RejectionReason::Schema);
    }
    let reason = parse_reason(&candidate.reason).ok_or(RejectionReason::Schema)?;

    // 2. forbidden_chars
    if candidate.replace.chars().any(|c| FORBIDDEN_REPLACE_CHARS.contains(&c)) {
        return Err(RejectionReason::ForbiddenChars);
    }

    let item = ReplacementItem::new(candidate.find.clone(), candidate.replace.clone(), reason);

    // 3. length_delta
    if item.growth() > MAX_ITEM_GROWTH {
        return Err(RejectionReason::LengthDelta);
    }

    // 4. no_match
    if !scope_text.contains(item.find.as_str()) {
        return Err(RejectionReason::NoMatch);
    }

    // 5. duplicate
    if seen.contains(&(item.find.clone(), item.replace.clone())) {
        return Err(RejectionReason::Duplicate);
    }

    Ok(item)
}

fn apply_plan_level_checks(items: Vec<ReplacementItem>, scope_text: &str, plan_growth_fraction: f64) -> (Plan, Option<RejectionReason>) {
    // 6. budget
    if items.len() > MAX_PLAN_ITEMS {
        return (Plan::new(), Some(RejectionReason::Budget));
    }

    let plan = Plan { items };

    // 7. cumulative_delta
    let scope_len = scope_text.chars().count() as f64;
    let budget = plan_growth_fraction * scope_len;
    if plan.total_growth() as f64 > budget {
        return (Plan::new(), Some(RejectionReason::CumulativeDelta));
    }

    (plan, None)
}

/// Merges plans accepted for overlapping chunks of the same span: unions
/// items by `(find, replace)`, then re-checks the merged set against the
/// budget and cumulative-delta limits using the span's full text as
/// scope.
pub fn merge(plans: &[Plan], span_text: &str, plan_growth_fraction: f64) -> (Plan, RejectionCounts) {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut merged = Vec::new();
    for plan in plans {
        for item in &plan.items {
            let key = (item.find.clone(), item.replace.clone());
            if seen.insert(key) {
                merged.push(item.clone());
            }
        }
    }

    let mut counts = RejectionCounts::default();
    let (plan, rejected) = apply_plan_level_checks(merged, span_text, plan_growth_fraction);
    if let Some(reason) = rejected {
        counts.increment(reason);
        return (Plan::new(), counts);
    }
    (plan, counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(find: &str, replace: &str, reason: &str) -> CandidateItem {
        CandidateItem {
            find: find.to_string(),
            replace: replace.to_string(),
            reason: reason.to_string(),
        }
    }

    #[test]
    fn accepts_well_formed_item() {
        let (plan, counts) = validate(&[candidate("U-N-I-T-E-D", "UNITED", "TTS_SPACED")], "U-N-I-T-E-D stands together", 0.05);
        assert_eq!(plan.len(), 1);
        assert_eq!(counts, RejectionCounts::default());
    }

    #[test]
    fn rejects_blocked_reason() {
        let (plan, counts) = validate(&[candidate("a", "b", "REWRITE")], "a", 0.05);
        assert!(plan.is_empty());
        assert_eq!(counts.schema, 1);
    }

    #[test]
    fn rejects_forbidden_chars_in_replace() {
        let (plan, counts) = validate(&[candidate("hi", "hi**", "SIMPLE_PUNCT")], "hi there", 0.05);
        assert!(plan.is_empty());
        assert_eq!(counts.forbidden_chars, 1);
    }

    #[test]
    fn rejects_excess_growth() {
        let (plan, counts) = validate(&[candidate("a", &"a".repeat(20), "CASE_GLITCH")], "a", 0.05);
        assert!(plan.is_empty());
        assert_eq!(counts.length_delta, 1);
    }

    #[test]
    fn rejects_item_with_no_match_in_scope() {
        let (plan, counts) = validate(&[candidate("ghost", "present", "TTS_SPACED")], "no such word here", 0.05);
        assert!(plan.is_empty());
        assert_eq!(counts.no_match, 1);
    }

    #[test]
    fn rejects_duplicate_pair() {
        let items = vec![
            candidate("a", "b", "SIMPLE_PUNCT"),
            candidate("a", "b", "SIMPLE_PUNCT"),
        ];
        let (plan, counts) = validate(&items, "a a", 0.05);
        assert_eq!(plan.len(), 1);
        assert_eq!(counts.duplicate, 1);
    }

    #[test]
    fn rejects_whole_plan_over_budget_item_count() {
        let items: Vec<CandidateItem> = (0..20)
            .map(|i| candidate(&format!("w{i}"), &format!("x{i}"), "SIMPLE_PUNCT"))
            .collect();
        let scope: String = (0..20).map(|i| format!("w{i} ")).collect();
        let (plan, counts) = validate(&items, &scope, 0.05);
        assert!(plan.is_empty());
        assert_eq!(counts.budget, 1);
    }

    #[test]
    fn rejects_cumulative_growth_over_five_percent() {
        let scope = "a".repeat(100);
        let items = vec![candidate("a", "aaaaaa", "CASE_GLITCH")];
        let (plan, counts) = validate(&items, &scope, 0.05);
        assert!(plan.is_empty());
        assert_eq!(counts.cumulative_delta, 1);
    }

    #[test]
    fn ten_chars_of_growth_at_exactly_five_percent_is_accepted_one_char_more_is_rejected() {
        // Two items each growing by 5 chars sum to 10. On a 200-char
        // scope that is precisely the 5% budget; on a 199-char scope the
        // same plan is a hair over and must be rejected wholesale.
        let items = vec![
            candidate("a", "aaaaaa", "CASE_GLITCH"),
            candidate("b", "bbbbbb", "CASE_GLITCH"),
        ];
        let scope_at_limit = format!("{}{}", "a".repeat(99), "b ".repeat(101));
        assert_eq!(scope_at_limit.chars().count(), 200);
        let (plan, counts) = validate(&items, &scope_at_limit, 0.05);
        assert_eq!(plan.len(), 2, "10 chars of growth on a 200-char scope is exactly the 5% budget");
        assert_eq!(counts, RejectionCounts::default());

        let scope_over_limit = format!("{}{}", "a".repeat(98), "b ".repeat(101));
        assert_eq!(scope_over_limit.chars().count(), 199);
        let (plan, counts) = validate(&items, &scope_over_limit, 0.05);
        assert!(plan.is_empty(), "10 chars of growth on a 199-char scope is just over the 5% budget");
        assert_eq!(counts.cumulative_delta, 1);
    }

    #[test]
    fn merge_unions_and_dedups_across_chunks() {
        let plan_a = Plan {
            items: vec![ReplacementItem::new("x", "y", mdvoice_core::ReasonTag::SimplePunct)],
        };
        let plan_b = Plan {
            items: vec![ReplacementItem::new("x", "y", mdvoice_core::ReasonTag::SimplePunct)],
        };
        let (merged, counts) = merge(&[plan_a, plan_b], "x appears here", 0.05);
        assert_eq!(merged.len(), 1);
        assert_eq!(counts, RejectionCounts::default());
    }

    #[test]
    fn a_tighter_configured_fraction_rejects_growth_the_default_would_accept() {
        let scope = "a".repeat(100);
        let items = vec![candidate("a", "aaa", "CASE_GLITCH")];
        let (plan, _) = validate(&items, &scope, 0.05);
        assert_eq!(plan.len(), 1, "2 chars of growth is within the default 5% budget");

        let (plan, counts) = validate(&items, &scope, 0.01);
        assert!(plan.is_empty(), "2 chars of growth exceeds a 1% budget on a 100-char scope");
        assert_eq!(counts.cumulative_delta, 1);
    }
}
