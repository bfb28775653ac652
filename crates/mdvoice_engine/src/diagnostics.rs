//! Diagnostic artifacts for a rewrite the structural validator (C8)
//! rejected. The orchestrator keeps the rejected document around (§7:
//! "the rejected output is preserved as an auxiliary artifact for
//! diagnosis") rather than discarding it silently; this module renders a
//! human-readable unified diff between the pre-rewrite document and the
//! rejected one so an operator can see exactly what the applier tried to
//! do without reaching for an external diff tool.

use similar::TextDiff;

/// Renders a unified diff of `before` against `after`, line by line.
/// Returns an empty string when the two are identical.
pub fn unified_diff(before: &str, after: &str) -> String {
    TextDiff::from_lines(before, after)
        .unified_diff()
        .header("before", "rejected")
        .to_string()
}
