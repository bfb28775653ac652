//! The deterministic Markdown-safe rewrite pipeline.
//!
//! Each module implements one component of the pipeline in the order data
//! flows through it: [`adapter`] masks protected Markdown constructs and
//! yields text spans (C2), [`prepass_basic`] and [`prepass_advanced`]
//! rewrite those spans deterministically (C3/C4), [`chunker`] splits spans
//! into detector-sized windows (C5), [`applier`] commits an accepted plan
//! back into the masked document (C7), [`validator`] gates the result
//! against seven structural laws (C8), and [`orchestrator`] sequences all
//! of the above into a single run (C9). [`diagnostics`] renders the
//! auxiliary unified-diff artifact kept when C8 rejects a rewrite.

pub mod adapter;
pub mod applier;
pub mod chunker;
pub mod diagnostics;
pub mod orchestrator;
pub mod prepass_advanced;
pub mod prepass_basic;
pub mod validator;

pub use adapter::{AdapterError, PreparedDocument, prepare};
pub use applier::{ApplierStats, apply_plan};
pub use chunker::{Chunk, SkipReason, chunk_span};
pub use diagnostics::unified_diff;
pub use orchestrator::{Orchestrator, OrchestratorError, PipelineOutcome, RunState};
pub use prepass_advanced::PrepassAdvancedStats;
pub use prepass_basic::PrepassBasicStats;
pub use validator::{StructuralLaw, ValidationError, validate};
