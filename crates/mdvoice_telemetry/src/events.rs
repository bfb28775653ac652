use chrono::{DateTime, Utc};
use serde::Serialize;

/// One notable occurrence during a pipeline run, independent of the
/// counters accumulated in [`mdvoice_core::RunReport`]. Events are for
/// humans watching a log stream or a persisted run history; the report
/// is for machine-readable counts.
#[derive(Debug, Clone, Serialize)]
pub enum TelemetryEvent {
    RunStarted {
        input_path: String,
        steps: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    StageStarted {
        stage: String,
        timestamp: DateTime<Utc>,
    },
    StageCompleted {
        stage: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    DetectorRequestFailed {
        kind: String,
        timestamp: DateTime<Utc>,
    },
    StructuralValidationRejected {
        law: String,
        timestamp: DateTime<Utc>,
    },
    RunCompleted {
        status: String,
        replacements_applied: u64,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },
    RunFailed {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl TelemetryEvent {
    pub fn run_started(input_path: impl Into<String>, steps: Vec<String>) -> Self {
        Self::RunStarted {
            input_path: input_path.into(),
            steps,
            timestamp: Utc::now(),
        }
    }

    pub fn stage_started(stage: impl Into<String>) -> Self {
        Self::StageStarted {
            stage: stage.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn stage_completed(stage: impl Into<String>, duration_ms: u64) -> Self {
        Self::StageCompleted {
            stage: stage.into(),
            duration_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn detector_request_failed(kind: impl Into<String>) -> Self {
        Self::DetectorRequestFailed {
            kind: kind.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn structural_validation_rejected(law: impl Into<String>) -> Self {
        Self::StructuralValidationRejected {
            law: law.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn run_completed(status: impl Into<String>, replacements_applied: u64, elapsed_ms: u64) -> Self {
        Self::RunCompleted {
            status: status.into(),
            replacements_applied,
            elapsed_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn run_failed(message: impl Into<String>) -> Self {
        Self::RunFailed {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_started_serializes_with_steps() {
        let event = TelemetryEvent::run_started("doc.md", vec!["mask".to_string(), "apply".to_string()]);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("doc.md"));
        assert!(json.contains("RunStarted"));
    }

    #[test]
    fn run_completed_carries_status() {
        let event = TelemetryEvent::run_completed("applied", 3, 42);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"applied\""));
        assert!(json.contains("42"));
    }
}
