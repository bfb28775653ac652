//! Structural Validator (component C8): seven whole-document structural
//! laws gating any masked-to-masked rewrite. Any violation is fatal; the
//! orchestrator discards the rewrite on failure.

use thiserror::Error;

use mdvoice_core::MaskTable;

/// The seven structural laws, in the order they are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralLaw {
    MaskParity,
    BacktickParity,
    BracketBalance,
    LinkSanity,
    FenceParity,
    TokenGuard,
    LengthDelta,
}

impl StructuralLaw {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructuralLaw::MaskParity => "mask_parity",
            StructuralLaw::BacktickParity => "backtick_parity",
            StructuralLaw::BracketBalance => "bracket_balance",
            StructuralLaw::LinkSanity => "link_sanity",
            StructuralLaw::FenceParity => "fence_parity",
            StructuralLaw::TokenGuard => "token_guard",
            StructuralLaw::LengthDelta => "length_delta",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("mask parity violation: token index {index} occurs {before} time(s) before and {after} after")]
    MaskParity {
        index: usize,
        before: usize,
        after: usize,
    },
    #[error("backtick parity violation: {before} before, {after} after")]
    BacktickParity { before: usize, after: usize },
    #[error("bracket balance violation: {bracket:?} was {before} before, {after} after")]
    BracketBalance {
        bracket: char,
        before: usize,
        after: usize,
    },
    #[error("link sanity violation: `](` occurred {before} time(s) before, {after} after")]
    LinkSanity { before: usize, after: usize },
    #[error("fence parity violation: {before} fence marker(s) before, {after} after")]
    FenceParity { before: usize, after: usize },
    #[error("token guard violation: forbidden character {ch:?} introduced outside mask tokens")]
    TokenGuard { ch: char },
    #[error("length delta violation: after ({after} chars) exceeds {limit}x before ({before} chars)")]
    LengthDelta { before: usize, after: usize, limit: f64 },
}

impl ValidationError {
    pub fn law(&self) -> StructuralLaw {
        match self {
            ValidationError::MaskParity { .. } => StructuralLaw::MaskParity,
            ValidationError::BacktickParity { .. } => StructuralLaw::BacktickParity,
            ValidationError::BracketBalance { .. } => StructuralLaw::BracketBalance,
            ValidationError::LinkSanity { .. } => StructuralLaw::LinkSanity,
            ValidationError::FenceParity { .. } => StructuralLaw::FenceParity,
            ValidationError::TokenGuard { .. } => StructuralLaw::TokenGuard,
            ValidationError::LengthDelta { .. } => StructuralLaw::LengthDelta,
        }
    }
}

const TOKEN_GUARD_CHARS: [char; 5] = ['*', '_', '~', '<', '>'];

/// Checks all seven laws in order, short-circuiting on the first
/// violation (matching the fixed check order in the spec).
/// `document_growth_fraction` is the configured V7 growth allowance (the
/// spec's default is 0.01, i.e. `after <= 1.01 * before`).
pub fn validate(
    before_masked: &str,
    after_masked: &str,
    mask_table: &MaskTable,
    document_growth_fraction: f64,
) -> Result<(), ValidationError> {
    check_mask_parity(before_masked, after_masked, mask_table)?;
    check_backtick_parity(before_masked, after_masked)?;
    check_bracket_balance(before_masked, after_masked)?;
    check_link_sanity(before_masked, after_masked)?;
    check_fence_parity(before_masked, after_masked)?;
    check_token_guard(before_masked, after_masked, mask_table)?;
    check_length_delta(before_masked, after_masked, document_growth_fraction)?;
    Ok(())
}

fn check_mask_parity(before: &str, after: &str, mask_table: &MaskTable) -> Result<(), ValidationError> {
    let before_counts = mask_table.token_counts(before);
    let after_counts = mask_table.token_counts(after);
    for (index, (&b, &a)) in before_counts.iter().zip(after_counts.iter()).enumerate() {
        if b != a {
            return Err(ValidationError::MaskParity {
                index,
                before: b,
                after: a,
            });
        }
    }
    Ok(())
}

fn check_backtick_parity(before: &str, after: &str) -> Result<(), ValidationError> {
    let b = before.matches('`').count();
    let a = after.matches('`').count();
    if b != a {
        return Err(ValidationError::BacktickParity { before: b, after: a });
    }
    Ok(())
}

fn check_bracket_balance(before: &str, after: &str) -> Result<(), ValidationError> {
    for bracket in ['[', ']', '(', ')'] {
        let b = before.matches(bracket).count();
        let a = after.matches(bracket).count();
        if b != a {
            return Err(ValidationError::BracketBalance {
                bracket,
                before: b,
                after: a,
            });
        }
    }
    Ok(())
}

fn check_link_sanity(before: &str, after: &str) -> Result<(), ValidationError> {
    let b = before.matches("](").count();
    let a = after.matches("](").count();
    if b != a {
        return Err(ValidationError::LinkSanity { before: b, after: a });
    }
    Ok(())
}

fn count_fence_markers(text: &str) -> usize {
    text.lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            trimmed.starts_with("```") || trimmed.starts_with("~~~")
        })
        .count()
}

fn check_fence_parity(before: &str, after: &str) -> Result<(), ValidationError> {
    let b = count_fence_markers(before);
    let a = count_fence_markers(after);
    if b % 2 != 0 || a % 2 != 0 || b != a {
        return Err(ValidationError::FenceParity { before: b, after: a });
    }
    Ok(())
}

fn strip_mask_tokens(text: &str, mask_table: &MaskTable) -> String {
    let mut out = text.to_string();
    for i in 0..mask_table.len() {
        out = out.replace(mdvoice_core::mask_token(i).as_str(), "");
    }
    out
}

fn check_token_guard(before: &str, after: &str, mask_table: &MaskTable) -> Result<(), ValidationError> {
    let before_stripped = strip_mask_tokens(before, mask_table);
    let after_stripped = strip_mask_tokens(after, mask_table);
    for ch in TOKEN_GUARD_CHARS {
        let before_count = before_stripped.matches(ch).count();
        let after_count = after_stripped.matches(ch).count();
        if after_count > before_count {
            return Err(ValidationError::TokenGuard { ch });
        }
    }
    Ok(())
}

fn check_length_delta(before: &str, after: &str, document_growth_fraction: f64) -> Result<(), ValidationError> {
    let before_len = before.chars().count();
    let after_len = after.chars().count();
    let limit = 1.0 + document_growth_fraction;
    if (after_len as f64) > limit * (before_len as f64) {
        return Err(ValidationError::LengthDelta {
            before: before_len,
            after: after_len,
            limit,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_text_passes_all_laws() {
        let mut table = MaskTable::new();
        let token = table.push("`code`");
        let text = format!("Hello {token} world [text](url)\n```\nfence\n```");
        assert!(validate(&text, &text, &table, 0.01).is_ok());
    }

    #[test]
    fn mask_parity_violation_detected() {
        let mut table = MaskTable::new();
        let token = table.push("x");
        let before = format!("a {token} b");
        let after = "a b".to_string();
        let err = validate(&before, &after, &table, 0.01).unwrap_err();
        assert_eq!(err.law(), StructuralLaw::MaskParity);
    }

    #[test]
    fn backtick_parity_violation_detected() {
        let table = MaskTable::new();
        let err = validate("plain text", "plain `text", &table, 0.01).unwrap_err();
        assert_eq!(err.law(), StructuralLaw::BacktickParity);
    }

    #[test]
    fn bracket_balance_violation_detected() {
        let table = MaskTable::new();
        let err = validate("a [b] c", "a [b c", &table, 0.01).unwrap_err();
        assert_eq!(err.law(), StructuralLaw::BracketBalance);
    }

    #[test]
    fn link_sanity_violation_detected() {
        let table = MaskTable::new();
        let err = validate("[text](url)", "[text] (url)", &table, 0.01).unwrap_err();
        assert_eq!(err.law(), StructuralLaw::LinkSanity);
    }

    #[test]
    fn fence_parity_violation_detected() {
        let table = MaskTable::new();
        let err = validate("```\ncode\n```", "```\ncode", &table, 0.01).unwrap_err();
        assert_eq!(err.law(), StructuralLaw::FenceParity);
    }

    #[test]
    fn token_guard_violation_detected() {
        let table = MaskTable::new();
        let err = validate("plain text", "plain *text*", &table, 0.01).unwrap_err();
        assert_eq!(err.law(), StructuralLaw::TokenGuard);
    }

    #[test]
    fn length_delta_violation_detected() {
        let table = MaskTable::new();
        let before = "a".repeat(100);
        let after = "a".repeat(103);
        let err = validate(&before, &after, &table, 0.01).unwrap_err();
        assert_eq!(err.law(), StructuralLaw::LengthDelta);
    }

    #[test]
    fn length_delta_within_budget_passes() {
        let table = MaskTable::new();
        let before = "a".repeat(100);
        let after = "a".repeat(101);
        assert!(validate(&before, &after, &table, 0.01).is_ok());
    }

    #[test]
    fn a_looser_configured_fraction_accepts_growth_the_default_would_reject() {
        let table = MaskTable::new();
        let before = "a".repeat(100);
        let after = "a".repeat(103);
        assert!(validate(&before, &after, &table, 0.01).is_err());
        assert!(validate(&before, &after, &table, 0.05).is_ok());
    }
}
