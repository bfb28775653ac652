//! The acronym whitelist loader (A2).
//!
//! Plain text, one token per line, UTF-8, `#`-prefixed comments and blank
//! lines skipped, tokens lowercased and deduplicated. Consumed read-only
//! by the advanced prepass stage (C4) so it knows which all-caps or
//! letter-spaced runs are intentional acronyms, not stylization glitches.

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WhitelistError {
    #[error("failed to read acronym whitelist {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcronymWhitelist {
    tokens: HashSet<String>,
}

impl AcronymWhitelist {
    pub fn from_str(source: &str) -> Self {
        let tokens = source
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_lowercase)
            .collect();
        Self { tokens }
    }

    pub fn load(path: &Path) -> Result<Self, WhitelistError> {
        let raw = std::fs::read_to_string(path).map_err(|source| WhitelistError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_str(&raw))
    }

    /// Case-insensitive membership check against the token as it appeared
    /// before any transformation.
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(&token.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_blank_lines() {
        let list = AcronymWhitelist::from_str("# comment\n\nNASA\n  \nFBI\n");
        assert_eq!(list.len(), 2);
        assert!(list.contains("nasa"));
        assert!(list.contains("NASA"));
        assert!(list.contains("Fbi"));
    }

    #[test]
    fn unknown_token_is_absent() {
        let list = AcronymWhitelist::from_str("NASA\n");
        assert!(!list.contains("ESA"));
    }

    #[test]
    fn empty_source_yields_empty_set() {
        let list = AcronymWhitelist::from_str("");
        assert!(list.is_empty());
    }
}
