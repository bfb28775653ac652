//! The sentinel mask table (component C1).
//!
//! A [`MaskTable`] assigns every protected substring an opaque token of the
//! literal shape `__MASKED_<i>__` and restores the originals verbatim,
//! in order, at the end of the pipeline. Restoration is fail-closed: a
//! token that is missing or duplicated in the text being unmasked is a
//! hard error rather than a best-effort substitution.

use thiserror::Error;

const MASK_PREFIX: &str = "__MASKED_";
const MASK_SUFFIX: &str = "__";

/// Renders the literal mask token for a given table index.
pub fn mask_token(index: usize) -> String {
    format!("{MASK_PREFIX}{index}{MASK_SUFFIX}")
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaskError {
    #[error("mask token {token:?} (index {index}) is missing from the text being unmasked")]
    MissingToken { index: usize, token: String },
    #[error("mask token {token:?} (index {index}) occurs {count} times, expected exactly 1")]
    DuplicateToken {
        index: usize,
        token: String,
        count: usize,
    },
}

/// An ordered table of `(token, original)` pairs produced while masking a
/// document. Tokens are assigned in ascending index order as entries are
/// pushed, and restoration replays that same order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskTable {
    originals: Vec<String>,
}

impl MaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    /// Registers `original` under a fresh token and returns that token.
    pub fn push(&mut self, original: impl Into<String>) -> String {
        let index = self.originals.len();
        self.originals.push(original.into());
        mask_token(index)
    }

    /// Iterates `(token, original)` pairs in ascending index order.
    pub fn entries(&self) -> impl Iterator<Item = (String, &str)> {
        self.originals
            .iter()
            .enumerate()
            .map(|(i, original)| (mask_token(i), original.as_str()))
    }

    pub fn original(&self, index: usize) -> Option<&str> {
        self.originals.get(index).map(String::as_str)
    }

    /// Restores every mask token in `text` to its original substring.
    ///
    /// Fails closed: each token must occur in `text` exactly once. A
    /// missing or duplicated token aborts restoration without touching
    /// `text` further, so callers can surface the failure instead of
    /// emitting a partially-restored document.
    pub fn unmask(&self, text: &str) -> Result<String, MaskError> {
        let mut out = text.to_string();
        for (index, original) in self.originals.iter().enumerate() {
            let token = mask_token(index);
            let count = out.matches(token.as_str()).count();
            match count {
                1 => out = out.replacen(token.as_str(), original, 1),
                0 => {
                    return Err(MaskError::MissingToken { index, token });
                }
                _ => {
                    return Err(MaskError::DuplicateToken {
                        index,
                        token,
                        count,
                    });
                }
            }
        }
        Ok(out)
    }

    /// Counts occurrences of every token currently registered in `text`.
    /// Used by the structural validator's mask-parity law (V1).
    pub fn token_counts(&self, text: &str) -> Vec<usize> {
        (0..self.originals.len())
            .map(|i| text.matches(mask_token(i).as_str()).count())
            .collect()
    }
}
