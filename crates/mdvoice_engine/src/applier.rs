//! Applier (component C7): commits a validated plan back into a masked
//! text span using plain substring search — never regex — so that a plan
//! either applies identically every run or is rejected outright.

use mdvoice_core::Plan;

/// Per-application counters recorded in the run report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplierStats {
    pub replacements_applied: u64,
    pub overlap_skipped: u64,
    pub stale_no_match: u64,
}

enum Event {
    /// An accepted replacement: `(start, end)` of the matched `find` in
    /// the current text, paired with its replacement string.
    Edit(usize, usize, String),
    /// A previously claimed range (from an earlier, higher-priority
    /// item) that must be carried through untouched.
    Claimed(usize, usize),
}

impl Event {
    fn start(&self) -> usize {
        match self {
            Event::Edit(s, _, _) => *s,
            Event::Claimed(s, _) => *s,
        }
    }
}

/// Applies every item in `plan` to `text`, processing items in plan order
/// (earlier items have priority) and searching against the *current*
/// state of the text, so an earlier item's replacement is visible to —
/// and can shadow — a later item's match. A later item whose match range
/// overlaps a range already claimed by an earlier item is discarded and
/// counted `overlap_skipped`. An item with no match left in the current
/// text is counted `stale_no_match`.
pub fn apply_plan(text: &str, plan: &Plan) -> (String, ApplierStats) {
    let mut working = text.to_string();
    let mut claimed: Vec<(usize, usize)> = Vec::new();
    let mut stats = ApplierStats::default();

    for item in &plan.items {
        if item.find.is_empty() {
            continue;
        }

        let raw_matches: Vec<(usize, usize)> = working
            .match_indices(item.find.as_str())
            .map(|(start, matched)| (start, start + matched.len()))
            .collect();

        if raw_matches.is_empty() {
            stats.stale_no_match += 1;
            continue;
        }

        let mut accepted: Vec<(usize, usize)> = Vec::new();
        for &(start, end) in &raw_matches {
            let overlaps_claimed = claimed.iter().any(|&(cs, ce)| start < ce && end > cs);
            let overlaps_accepted = accepted.iter().any(|&(as_, ae)| start < ae && end > as_);
            if overlaps_claimed || overlaps_accepted {
                stats.overlap_skipped += 1;
            } else {
                accepted.push((start, end));
            }
        }

        if accepted.is_empty() {
            continue;
        }

        let (new_working, new_claimed) = commit(&working, &accepted, &item.replace, &claimed);
        working = new_working;
        claimed = new_claimed;
        stats.replacements_applied += accepted.len() as u64;
    }

    (working, stats)
}

/// Rebuilds `working` with every accepted `(start, end)` match range
/// replaced by `replacement`, while carrying `claimed` ranges through
/// untouched, and returns the post-edit claimed ranges (both the old
/// ones and the newly-applied edit's own range), remapped to the new
/// string's offsets.
fn commit(working: &str, accepted: &[(usize, usize)], replacement: &str, claimed: &[(usize, usize)]) -> (String, Vec<(usize, usize)>) {
    let mut events: Vec<Event> = Vec::with_capacity(accepted.len() + claimed.len());
    for &(s, e) in accepted {
        events.push(Event::Edit(s, e, replacement.to_string()));
    }
    for &(s, e) in claimed {
        events.push(Event::Claimed(s, e));
    }
    events.sort_by_key(Event::start);

    let mut new_working = String::with_capacity(working.len());
    let mut new_claimed = Vec::with_capacity(events.len());
    let mut cursor = 0usize;

    for ev in events {
        match ev {
            Event::Edit(s, e, repl) => {
                new_working.push_str(&working[cursor..s]);
                let repl_start = new_working.len();
                new_working.push_str(&repl);
                new_claimed.push((repl_start, new_working.len()));
                cursor = e;
            }
            Event::Claimed(s, e) => {
                new_working.push_str(&working[cursor..s]);
                let claimed_start = new_working.len();
                new_working.push_str(&working[s..e]);
                new_claimed.push((claimed_start, new_working.len()));
                cursor = e;
            }
        }
    }
    new_working.push_str(&working[cursor..]);

    (new_working, new_claimed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdvoice_core::{ReasonTag, ReplacementItem};

    fn plan(items: Vec<(&str, &str)>) -> Plan {
        Plan {
            items: items
                .into_iter()
                .map(|(f, r)| ReplacementItem::new(f, r, ReasonTag::SimplePunct))
                .collect(),
        }
    }

    #[test]
    fn applies_single_item() {
        let (out, stats) = apply_plan("hello wrold", &plan(vec![("wrold", "world")]));
        assert_eq!(out, "hello world");
        assert_eq!(stats.replacements_applied, 1);
    }

    #[test]
    fn applies_all_occurrences_of_same_find() {
        let (out, stats) = apply_plan("teh cat ate teh fish", &plan(vec![("teh", "the")]));
        assert_eq!(out, "the cat ate the fish");
        assert_eq!(stats.replacements_applied, 2);
    }

    #[test]
    fn earlier_item_wins_overlap() {
        let text = "abcdef";
        let p = plan(vec![("abc", "XYZ"), ("bcd", "___")]);
        let (out, stats) = apply_plan(text, &p);
        assert_eq!(out, "XYZdef");
        assert_eq!(stats.overlap_skipped, 1);
    }

    #[test]
    fn touching_but_non_overlapping_matches_both_apply() {
        let text = "abcdef";
        let p = plan(vec![("abc", "XYZ"), ("def", "___")]);
        let (out, stats) = apply_plan(text, &p);
        assert_eq!(out, "XYZ___");
        assert_eq!(stats.overlap_skipped, 0);
        assert_eq!(stats.replacements_applied, 2);
    }

    #[test]
    fn stale_item_is_counted_non_fatally() {
        let p = plan(vec![("ghost", "present")]);
        let (out, stats) = apply_plan("no match here", &p);
        assert_eq!(out, "no match here");
        assert_eq!(stats.stale_no_match, 1);
    }

    #[test]
    fn later_item_can_match_text_untouched_by_earlier_item() {
        let p = plan(vec![("cat", "dog"), ("fish", "bird")]);
        let (out, _) = apply_plan("a cat and a fish", &p);
        assert_eq!(out, "a dog and a bird");
    }

    #[test]
    fn empty_plan_is_noop() {
        let (out, stats) = apply_plan("unchanged text", &Plan::new());
        assert_eq!(out, "unchanged text");
        assert_eq!(stats, ApplierStats::default());
    }
}
