//! Shared data model for the mdvoice Markdown-safe rewrite pipeline.
//!
//! This crate holds no pipeline logic; it defines the types every stage
//! agrees on (mask tables, text spans, replacement plans, configuration,
//! the acronym whitelist, and the run report) so that `mdvoice_engine`,
//! `mdvoice_detector`, and `mdvoice_cli` can pass them between each other
//! without duplicating shape.

pub mod config;
pub mod mask;
pub mod plan;
pub mod report;
pub mod span;
pub mod whitelist;

pub use config::{CliOverrides, ConfigError, ConfigFile, EllipsisMode, PipelineConfig, Step};
pub use mask::{MaskError, MaskTable, mask_token};
pub use plan::{Plan, ReasonTag, RejectionReason, ReplacementItem};
pub use report::{RunReport, StageStats};
pub use span::TextSpan;
pub use whitelist::{AcronymWhitelist, WhitelistError};
