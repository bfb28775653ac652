//! The run report: stage-indexed counters produced by every pipeline run,
//! independent of whatever logging backend is wired up.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Named counters for a single stage (e.g. `apply` carries
/// `replacements_applied`, `overlap_skipped`, `stale_no_match`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStats {
    #[serde(flatten)]
    counters: BTreeMap<String, u64>,
}

impl StageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, counter: &str) {
        *self.counters.entry(counter.to_string()).or_insert(0) += 1;
    }

    pub fn add(&mut self, counter: &str, amount: u64) {
        *self.counters.entry(counter.to_string()).or_insert(0) += amount;
    }

    pub fn get(&self, counter: &str) -> u64 {
        self.counters.get(counter).copied().unwrap_or(0)
    }
}

/// A mapping of stage name to that stage's counters. Stages are free to
/// name their own counters; the orchestrator only owns the top-level
/// stage keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(flatten)]
    stages: BTreeMap<String, StageStats>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_mut(&mut self, stage: &str) -> &mut StageStats {
        self.stages.entry(stage.to_string()).or_default()
    }

    pub fn stage(&self, stage: &str) -> Option<&StageStats> {
        self.stages.get(stage)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_and_get_round_trip() {
        let mut report = RunReport::new();
        report.stage_mut("apply").increment("replacements_applied");
        report.stage_mut("apply").increment("replacements_applied");
        assert_eq!(report.stage("apply").unwrap().get("replacements_applied"), 2);
    }

    #[test]
    fn missing_counter_defaults_to_zero() {
        let report = RunReport::new();
        assert_eq!(
            report
                .stage("apply")
                .map(|s| s.get("anything"))
                .unwrap_or(0),
            0
        );
    }

    #[test]
    fn serializes_to_json_object() {
        let mut report = RunReport::new();
        report.stage_mut("detect").add("rejections.timeout", 3);
        let json = report.to_json().unwrap();
        assert!(json.contains("\"detect\""));
        assert!(json.contains("\"rejections.timeout\": 3"));
    }
}
