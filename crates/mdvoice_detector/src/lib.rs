//! Plan schema validation (C6) and the `detect` stage's HTTP
//! collaborator (A3).
//!
//! This crate is the only place in the workspace that talks to the
//! network; `mdvoice_engine`'s orchestrator depends on it only through
//! the [`DetectorClient`] trait, so it can be driven by
//! [`FakeDetectorClient`] in tests without spinning up a server.

pub mod client;
pub mod schema;

pub use client::{DetectorClient, DetectorConfig, DetectorError, FakeDetectorClient, ReqwestDetectorClient};
pub use schema::{CandidateItem, RejectionCounts, merge, validate};
