//! The layered pipeline configuration (A1).
//!
//! A [`PipelineConfig`] is built once per run by merging, in increasing
//! precedence, built-in defaults, an optional TOML file, and CLI flag
//! overrides. It is immutable afterward; every stage borrows it by shared
//! reference.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::whitelist::AcronymWhitelist;

/// One stage of the pipeline, as named on the CLI's `--steps` flag. The
/// set is closed: there is no plugin mechanism for adding a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Mask,
    PrepassBasic,
    PrepassAdvanced,
    Detect,
    Apply,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::Mask,
        Step::PrepassBasic,
        Step::PrepassAdvanced,
        Step::Detect,
        Step::Apply,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Mask => "mask",
            Step::PrepassBasic => "prepass-basic",
            Step::PrepassAdvanced => "prepass-advanced",
            Step::Detect => "detect",
            Step::Apply => "apply",
        }
    }

    pub fn parse(s: &str) -> Option<Step> {
        Step::ALL.into_iter().find(|step| step.as_str() == s)
    }
}

/// How ellipsis variants (`. . .`, `…`, `....`) are canonicalized by the
/// advanced prepass stage (C4). The spec leaves this as an explicit,
/// configurable decision rather than picking one form unconditionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EllipsisMode {
    /// Canonicalize to three ASCII dots (`...`). Default: unambiguous for
    /// downstream TTS engines.
    ThreeDots,
    /// Canonicalize to the single Unicode ellipsis character (`…`).
    SingleChar,
}

impl Default for EllipsisMode {
    fn default() -> Self {
        EllipsisMode::ThreeDots
    }
}

fn default_max_chars() -> usize {
    600
}

fn default_overlap() -> usize {
    50
}

fn default_plan_growth_fraction() -> f64 {
    0.05
}

fn default_document_growth_fraction() -> f64 {
    0.01
}

fn default_steps() -> Vec<Step> {
    Step::ALL.to_vec()
}

fn default_detector_timeout_secs() -> u64 {
    8
}

fn default_detector_retries() -> u32 {
    1
}

fn default_ellipsis_mode() -> EllipsisMode {
    EllipsisMode::ThreeDots
}

/// The TOML-deserializable shape of a config file. Unknown keys are a
/// hard error (`deny_unknown_fields`) so a typo never silently falls back
/// to a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConfigFile {
    pub steps: Vec<Step>,
    pub max_chars: usize,
    pub overlap: usize,
    pub ellipsis_mode: EllipsisMode,
    pub plan_growth_fraction: f64,
    pub document_growth_fraction: f64,
    pub detector_endpoint: Option<String>,
    pub detector_model: Option<String>,
    pub detector_timeout_secs: u64,
    pub detector_retries: u32,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            max_chars: default_max_chars(),
            overlap: default_overlap(),
            ellipsis_mode: default_ellipsis_mode(),
            plan_growth_fraction: default_plan_growth_fraction(),
            document_growth_fraction: default_document_growth_fraction(),
            detector_endpoint: None,
            detector_model: None,
            detector_timeout_secs: default_detector_timeout_secs(),
            detector_retries: default_detector_retries(),
        }
    }
}

/// CLI-flag overrides applied on top of a [`ConfigFile`]. `None` means
/// "leave whatever the file/defaults chose".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub steps: Option<Vec<Step>>,
    pub max_chars: Option<usize>,
    pub overlap: Option<usize>,
    pub ellipsis_mode: Option<EllipsisMode>,
    pub detector_endpoint: Option<String>,
    pub detector_model: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("overlap ({overlap}) must be smaller than max_chars ({max_chars})")]
    OverlapNotSmallerThanMaxChars { overlap: usize, max_chars: usize },
    #[error("{field} must be in (0, 1], got {value}")]
    GrowthFractionOutOfRange { field: &'static str, value: f64 },
    #[error("unknown step name {0:?}")]
    UnknownStep(String),
    #[error(transparent)]
    Whitelist(#[from] crate::whitelist::WhitelistError),
}

/// The immutable, constructor-injected configuration snapshot every stage
/// borrows by shared reference.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub steps: Vec<Step>,
    pub max_chars: usize,
    pub overlap: usize,
    pub ellipsis_mode: EllipsisMode,
    pub plan_growth_fraction: f64,
    pub document_growth_fraction: f64,
    pub detector_endpoint: Option<String>,
    pub detector_model: Option<String>,
    pub detector_timeout_secs: u64,
    pub detector_retries: u32,
    pub whitelist: AcronymWhitelist,
}

impl PipelineConfig {
    /// Merges defaults, an optional TOML file, and CLI overrides (in that
    /// precedence order), then validates the result.
    pub fn load(
        toml_path: Option<&Path>,
        overrides: CliOverrides,
        whitelist_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let file = match toml_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                toml::from_str::<ConfigFile>(&raw).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })?
            }
            None => ConfigFile::default(),
        };

        let whitelist = match whitelist_path {
            Some(path) => AcronymWhitelist::load(path)?,
            None => AcronymWhitelist::default(),
        };

        let config = PipelineConfig {
            steps: overrides.steps.unwrap_or(file.steps),
            max_chars: overrides.max_chars.unwrap_or(file.max_chars),
            overlap: overrides.overlap.unwrap_or(file.overlap),
            ellipsis_mode: overrides.ellipsis_mode.unwrap_or(file.ellipsis_mode),
            plan_growth_fraction: file.plan_growth_fraction,
            document_growth_fraction: file.document_growth_fraction,
            detector_endpoint: overrides.detector_endpoint.or(file.detector_endpoint),
            detector_model: overrides.detector_model.or(file.detector_model),
            detector_timeout_secs: file.detector_timeout_secs,
            detector_retries: file.detector_retries,
            whitelist,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.overlap >= self.max_chars {
            return Err(ConfigError::OverlapNotSmallerThanMaxChars {
                overlap: self.overlap,
                max_chars: self.max_chars,
            });
        }
        if !(0.0..=1.0).contains(&self.plan_growth_fraction) || self.plan_growth_fraction <= 0.0 {
            return Err(ConfigError::GrowthFractionOutOfRange {
                field: "plan_growth_fraction",
                value: self.plan_growth_fraction,
            });
        }
        if !(0.0..=1.0).contains(&self.document_growth_fraction)
            || self.document_growth_fraction <= 0.0
        {
            return Err(ConfigError::GrowthFractionOutOfRange {
                field: "document_growth_fraction",
                value: self.document_growth_fraction,
            });
        }
        Ok(())
    }

    pub fn known_step_names() -> HashSet<&'static str> {
        Step::ALL.iter().map(Step::as_str).collect()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let file = ConfigFile::default();
        PipelineConfig {
            steps: file.steps,
            max_chars: file.max_chars,
            overlap: file.overlap,
            ellipsis_mode: file.ellipsis_mode,
            plan_growth_fraction: file.plan_growth_fraction,
            document_growth_fraction: file.document_growth_fraction,
            detector_endpoint: file.detector_endpoint,
            detector_model: file.detector_model,
            detector_timeout_secs: file.detector_timeout_secs,
            detector_retries: file.detector_retries,
            whitelist: AcronymWhitelist::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_chars, 600);
        assert_eq!(config.overlap, 50);
        assert_eq!(config.ellipsis_mode, EllipsisMode::ThreeDots);
        assert!((config.plan_growth_fraction - 0.05).abs() < f64::EPSILON);
        assert!((config.document_growth_fraction - 0.01).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_max_chars() {
        let mut config = PipelineConfig::default();
        config.overlap = 600;
        config.max_chars = 600;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OverlapNotSmallerThanMaxChars { .. })
        ));
    }

    #[test]
    fn rejects_zero_growth_fraction() {
        let mut config = PipelineConfig::default();
        config.plan_growth_fraction = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::GrowthFractionOutOfRange { .. })
        ));
    }

    #[test]
    fn unknown_toml_key_is_rejected() {
        let raw = "max_chars = 400\nbogus_field = true\n";
        let err = toml::from_str::<ConfigFile>(raw).unwrap_err();
        assert!(err.to_string().contains("bogus_field"));
    }

    #[test]
    fn cli_overrides_win_over_file_values() {
        let file = ConfigFile {
            max_chars: 400,
            ..ConfigFile::default()
        };
        let overrides = CliOverrides {
            max_chars: Some(999),
            ..CliOverrides::default()
        };
        let max_chars = overrides.max_chars.unwrap_or(file.max_chars);
        assert_eq!(max_chars, 999);
    }

    #[test]
    fn step_parse_round_trips() {
        for step in Step::ALL {
            assert_eq!(Step::parse(step.as_str()), Some(step));
        }
        assert_eq!(Step::parse("bogus"), None);
    }
}
