//! Pipeline Orchestrator (component C9): sequences the other eight
//! components into a single document run, threading one `(masked_text,
//! mask_table)` pair through whichever stages were requested, and
//! producing a final Markdown document plus a [`RunReport`].
//!
//! The run is modeled as an explicit [`RunState`] enum with a
//! `transition` method, rather than ad-hoc control flow, so every stage
//! boundary is inspectable and loggable: `INIT -> MASKED ->
//! (PREPASS_BASIC? -> PREPASS_ADVANCED?) -> (DETECTED -> VALIDATED_PLAN
//! -> APPLIED -> VALIDATED_DOC) -> UNMASKED -> DONE`. Any fatal failure
//! (adapter, mask-restore) transitions to `FAILED` instead.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{debug, info, warn};

use mdvoice_core::{MaskError, MaskTable, Plan, PipelineConfig, RunReport, Step, TextSpan};
use mdvoice_detector::{DetectorClient, RejectionCounts, merge as merge_plans, validate as validate_plan};

use crate::adapter::{self, AdapterError};
use crate::applier::apply_plan;
use crate::chunker::{SkipReason, chunk_span, skip_reason};
use crate::diagnostics::unified_diff;
use crate::prepass_advanced;
use crate::prepass_basic;
use crate::validator::{self, ValidationError};

/// One state in the single-run state machine of §4.9. Transitions are
/// strictly linear; `transition` exists purely to give every stage
/// boundary a single logged chokepoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Masked,
    PrepassBasic,
    PrepassAdvanced,
    Detected,
    ValidatedPlan,
    Applied,
    ValidatedDoc,
    Unmasked,
    Done,
    Failed,
}

impl RunState {
    fn transition(self, next: RunState) -> RunState {
        debug!(from = ?self, to = ?next, "orchestrator state transition");
        next
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("failed to restore masked document during unmasking: {0}")]
    Unmask(#[from] MaskError),
    #[error("run cancelled during the detect stage")]
    Cancelled,
}

/// Whether the final document reflects an applied-and-validated rewrite
/// or a reverted one (C8 rejected it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Applied,
    Rejected,
}

/// Everything a caller (the CLI, or a test) needs out of one run: the
/// final Markdown, the stage-indexed report, the plan that was accepted
/// (possibly empty if `detect`/`apply` were not requested), the overall
/// status, and — only when rejected — the corrupted rewrite C8 refused,
/// kept around as a diagnostic artifact and unmasked on a best-effort
/// basis (a rejected rewrite may itself have broken mask parity, so its
/// unmasking is not guaranteed to succeed).
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub markdown: String,
    pub report: RunReport,
    pub plan: Plan,
    pub status: RunStatus,
    pub rejected_markdown: Option<String>,
    /// A unified diff of the original input against `rejected_markdown`,
    /// present only alongside it. Purely a diagnostic convenience; the
    /// authoritative reverted document is `markdown`.
    pub rejected_diff: Option<String>,
}

pub struct Orchestrator<'a> {
    config: &'a PipelineConfig,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Runs the pipeline over `input` using `detector` for the `detect`
    /// stage (pass [`mdvoice_detector::FakeDetectorClient`] in tests).
    /// `cancel` is polled once per chunk during `detect`; setting it
    /// mid-run abandons the in-flight plan and fails the run without
    /// touching `apply` or `validate`, matching the cooperative
    /// cancellation semantics of §5.
    pub async fn run(
        &self,
        input: &str,
        detector: &dyn DetectorClient,
        cancel: &AtomicBool,
    ) -> Result<PipelineOutcome, OrchestratorError> {
        let mut state = RunState::Init;
        let mut report = RunReport::new();
        let steps: HashSet<Step> = self.config.steps.iter().copied().collect();

        if steps.is_empty() {
            let _ = state.transition(RunState::Done);
            return Ok(PipelineOutcome {
                markdown: input.to_string(),
                report,
                plan: Plan::new(),
                status: RunStatus::Applied,
                rejected_markdown: None,
                rejected_diff: None,
            });
        }

        // §4.9: mask (C2) always runs first once any other stage is requested.
        let prepared = adapter::prepare(input)?;
        state = state.transition(RunState::Masked);
        info!(
            spans = prepared.spans.len(),
            tokens = prepared.mask_table.len(),
            "document masked"
        );

        let mask_table = prepared.mask_table;
        let mut masked = prepared.masked;
        let mut spans = prepared.spans;

        if steps.contains(&Step::PrepassBasic) {
            masked = rewrite_spans(&masked, &spans, |_, text| {
                let (out, stats) = prepass_basic::apply(text);
                let s = report.stage_mut("prepass-basic");
                s.add("unicode_folded", stats.unicode_folded);
                s.add("zero_width_removed", stats.zero_width_removed);
                s.add("space_runs_collapsed", stats.space_runs_collapsed);
                s.add("soft_hyphens_rejoined", stats.soft_hyphens_rejoined);
                s.add("nbsp_normalized", stats.nbsp_normalized);
                out
            });
            spans = rederive_spans(&masked, &mask_table);
            state = state.transition(RunState::PrepassBasic);
        }

        if steps.contains(&Step::PrepassAdvanced) {
            masked = rewrite_spans(&masked, &spans, |_, text| {
                let (out, stats) =
                    prepass_advanced::apply(text, &self.config.whitelist, self.config.ellipsis_mode);
                let s = report.stage_mut("prepass-advanced");
                s.add("letter_runs_joined", stats.letter_runs_joined);
                s.add("all_caps_title_cased", stats.all_caps_title_cased);
                s.add("punctuation_runs_collapsed", stats.punctuation_runs_collapsed);
                s.add("ellipses_normalized", stats.ellipses_normalized);
                s.add("mid_word_caps_fixed", stats.mid_word_caps_fixed);
                out
            });
            spans = rederive_spans(&masked, &mask_table);
            state = state.transition(RunState::PrepassAdvanced);
        }

        let mut span_plans: Vec<Plan> = vec![Plan::new(); spans.len()];
        if steps.contains(&Step::Detect) {
            span_plans = self
                .run_detect(&masked, &spans, detector, cancel, &mut report)
                .await?;
            state = state.transition(RunState::Detected);
            state = state.transition(RunState::ValidatedPlan);
        }

        let accepted_plan = concat_plans(&span_plans);
        let mut status = RunStatus::Applied;
        let mut rejected_markdown = None;
        let mut rejected_diff = None;

        if steps.contains(&Step::Apply) && span_plans.iter().any(|p| !p.is_empty()) {
            let before_apply = masked.clone();
            let applied = rewrite_spans(&masked, &spans, |i, text| {
                let (out, stats) = apply_plan(text, &span_plans[i]);
                let s = report.stage_mut("apply");
                s.add("replacements_applied", stats.replacements_applied);
                s.add("overlap_skipped", stats.overlap_skipped);
                s.add("stale_no_match", stats.stale_no_match);
                out
            });
            state = state.transition(RunState::Applied);

            match validator::validate(&before_apply, &applied, &mask_table, self.config.document_growth_fraction) {
                Ok(()) => {
                    masked = applied;
                    state = state.transition(RunState::ValidatedDoc);
                }
                Err(err) => {
                    warn!(law = err.law().as_str(), "structural validation rejected rewrite");
                    record_validation_rejection(&mut report, &err);
                    status = RunStatus::Rejected;
                    let rejected = mask_table.unmask(&applied).unwrap_or(applied);
                    rejected_diff = Some(unified_diff(input, &rejected));
                    rejected_markdown = Some(rejected);
                    // `masked` is left at `before_apply`'s content (unchanged
                    // since we never overwrote it), so C1 below restores the
                    // pre-rewrite document.
                }
            }
        }

        let final_markdown = mask_table.unmask(&masked)?;
        state = state.transition(RunState::Unmasked);
        let _ = state.transition(RunState::Done);

        Ok(PipelineOutcome {
            markdown: final_markdown,
            report,
            plan: accepted_plan,
            status,
            rejected_markdown,
            rejected_diff,
        })
    }

    async fn run_detect(
        &self,
        masked: &str,
        spans: &[TextSpan],
        detector: &dyn DetectorClient,
        cancel: &AtomicBool,
        report: &mut RunReport,
    ) -> Result<Vec<Plan>, OrchestratorError> {
        let mut span_plans = Vec::with_capacity(spans.len());

        for span in spans {
            let span_text = span.text(masked);
            let chunks = chunk_span(span_text, self.config.max_chars, self.config.overlap, &[]);
            let mut chunk_plans = Vec::with_capacity(chunks.len());

            for chunk in &chunks {
                if cancel.load(Ordering::Relaxed) {
                    return Err(OrchestratorError::Cancelled);
                }

                if let Some(reason) = skip_reason(&chunk.text) {
                    report.stage_mut("chunk").increment(skip_reason_name(reason));
                    continue;
                }

                match detector.detect(&chunk.text).await {
                    Ok(candidates) => {
                        let (plan, counts) =
                            validate_plan(&candidates, &chunk.text, self.config.plan_growth_fraction);
                        add_rejection_counts(report, &counts);
                        chunk_plans.push(plan);
                    }
                    Err(err) => {
                        report
                            .stage_mut("detect")
                            .increment(&format!("rejections.{}", err.kind()));
                    }
                }
            }

            let (merged, merge_counts) =
                merge_plans(&chunk_plans, span_text, self.config.plan_growth_fraction);
            add_rejection_counts(report, &merge_counts);
            span_plans.push(merged);
        }

        Ok(span_plans)
    }
}

fn skip_reason_name(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::EmptyOrWhitespace => "skipped.empty_or_whitespace",
        SkipReason::MostlyUppercase => "skipped.mostly_uppercase",
        SkipReason::ContainsUrlLikeSlashes => "skipped.contains_url_like_slashes",
        SkipReason::MostlyNonAlphabetic => "skipped.mostly_non_alphabetic",
    }
}

fn add_rejection_counts(report: &mut RunReport, counts: &RejectionCounts) {
    let s = report.stage_mut("plan_schema");
    s.add("schema", counts.schema);
    s.add("forbidden_chars", counts.forbidden_chars);
    s.add("length_delta", counts.length_delta);
    s.add("no_match", counts.no_match);
    s.add("duplicate", counts.duplicate);
    s.add("budget", counts.budget);
    s.add("cumulative_delta", counts.cumulative_delta);
}

fn record_validation_rejection(report: &mut RunReport, err: &ValidationError) {
    report.stage_mut("validate").increment(err.law().as_str());
}

fn concat_plans(span_plans: &[Plan]) -> Plan {
    let mut items = Vec::new();
    for plan in span_plans {
        items.extend(plan.items.iter().cloned());
    }
    Plan { items }
}

/// Rewrites every span of `masked` through `f` (given the span's index
/// and its current text), copying mask tokens and any other bytes
/// between spans through untouched. This is the single place every
/// span-scoped stage (C3, C4, C7) threads its edits back into the whole
/// masked document.
fn rewrite_spans(masked: &str, spans: &[TextSpan], mut f: impl FnMut(usize, &str) -> String) -> String {
    let mut out = String::with_capacity(masked.len());
    let mut cursor = 0usize;
    for (i, span) in spans.iter().enumerate() {
        out.push_str(&masked[cursor..span.start]);
        out.push_str(&f(i, span.text(masked)));
        cursor = span.end;
    }
    out.push_str(&masked[cursor..]);
    out
}

/// Re-derives text spans after a stage has changed `masked`'s content.
/// Mask tokens are stable, literal markers that never match any
/// protected-region pattern, so the runs between them are exactly the
/// new spans; there is no need to re-run the full adapter scan.
fn rederive_spans(masked: &str, mask_table: &MaskTable) -> Vec<TextSpan> {
    if mask_table.is_empty() {
        return if masked.is_empty() {
            Vec::new()
        } else {
            vec![TextSpan::new(0, masked.len())]
        };
    }

    let mut spans = Vec::new();
    let mut cursor = 0usize;
    for i in 0..mask_table.len() {
        let token = mdvoice_core::mask_token(i);
        if let Some(pos) = masked[cursor..].find(token.as_str()) {
            let abs_pos = cursor + pos;
            if abs_pos > cursor {
                spans.push(TextSpan::new(cursor, abs_pos));
            }
            cursor = abs_pos + token.len();
        }
    }
    if cursor < masked.len() {
        spans.push(TextSpan::new(cursor, masked.len()));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdvoice_core::{CliOverrides, ReasonTag};
    use mdvoice_detector::{CandidateItem, FakeDetectorClient};

    fn config_with_steps(steps: Vec<Step>) -> PipelineConfig {
        PipelineConfig::load(
            None,
            CliOverrides {
                steps: Some(steps),
                ..CliOverrides::default()
            },
            None,
        )
        .unwrap()
    }

    fn no_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[tokio::test]
    async fn prepass_only_fixes_spaced_letters() {
        let config = config_with_steps(vec![Step::Mask, Step::PrepassBasic, Step::PrepassAdvanced]);
        let orchestrator = Orchestrator::new(&config);
        let detector = FakeDetectorClient::new(vec![]);
        let outcome = orchestrator
            .run("F \u{029F} \u{1D00} s \u{029C}!", &detector, &no_cancel())
            .await
            .unwrap();
        assert_eq!(outcome.markdown, "Flash!");
        assert_eq!(outcome.status, RunStatus::Applied);
    }

    #[tokio::test]
    async fn detector_accepted_item_is_applied() {
        let config = config_with_steps(Step::ALL.to_vec());
        let orchestrator = Orchestrator::new(&config);
        let detector = FakeDetectorClient::new(vec![Ok(vec![CandidateItem {
            find: "U-N-I-T-E-D".to_string(),
            replace: "UNITED".to_string(),
            reason: "TTS_SPACED".to_string(),
        }])]);
        let outcome = orchestrator.run("U-N-I-T-E-D", &detector, &no_cancel()).await.unwrap();
        assert_eq!(outcome.markdown, "UNITED");
        assert_eq!(outcome.plan.items[0].reason, ReasonTag::TtsSpaced);
        assert_eq!(outcome.report.stage("apply").unwrap().get("replacements_applied"), 1);
    }

    #[tokio::test]
    async fn protected_link_url_survives_byte_identical() {
        let config = config_with_steps(Step::ALL.to_vec());
        let orchestrator = Orchestrator::new(&config);
        let detector = FakeDetectorClient::new(vec![]);
        let input = "See [the docs](https://x/y) for \u{1D05}\u{1D07}\u{1D1B}\u{1D00}\u{026A}\u{029F}\u{A7AE}.";
        let outcome = orchestrator.run(input, &detector, &no_cancel()).await.unwrap();
        assert!(outcome.markdown.contains("(https://x/y)"));
        assert!(outcome.markdown.contains("details"));
    }

    #[tokio::test]
    async fn fenced_block_passes_through_unchanged() {
        let config = config_with_steps(Step::ALL.to_vec());
        let orchestrator = Orchestrator::new(&config);
        let detector = FakeDetectorClient::new(vec![]);
        let input = "```\n\u{1D00} \u{0299} \u{1D04}\n```\n";
        let outcome = orchestrator.run(input, &detector, &no_cancel()).await.unwrap();
        assert_eq!(outcome.markdown, input);
    }

    #[tokio::test]
    async fn forbidden_chars_in_replacement_are_rejected_before_apply() {
        let config = config_with_steps(vec![Step::Mask, Step::Detect, Step::Apply]);
        let orchestrator = Orchestrator::new(&config);
        let detector = FakeDetectorClient::new(vec![Ok(vec![CandidateItem {
            find: "hi".to_string(),
            replace: "hi**".to_string(),
            reason: "SIMPLE_PUNCT".to_string(),
        }])]);
        let outcome = orchestrator.run("hi there", &detector, &no_cancel()).await.unwrap();
        assert_eq!(outcome.markdown, "hi there");
        assert_eq!(
            outcome.report.stage("plan_schema").unwrap().get("forbidden_chars"),
            1
        );
    }

    #[tokio::test]
    async fn empty_document_round_trips() {
        let config = config_with_steps(Step::ALL.to_vec());
        let orchestrator = Orchestrator::new(&config);
        let detector = FakeDetectorClient::new(vec![]);
        let outcome = orchestrator.run("", &detector, &no_cancel()).await.unwrap();
        assert_eq!(outcome.markdown, "");
        assert_eq!(outcome.status, RunStatus::Applied);
    }

    #[tokio::test]
    async fn empty_steps_is_identity() {
        let config = config_with_steps(vec![]);
        let orchestrator = Orchestrator::new(&config);
        let detector = FakeDetectorClient::new(vec![]);
        let outcome = orchestrator.run("F \u{029F} \u{1D00} s \u{029C}!", &detector, &no_cancel()).await.unwrap();
        assert_eq!(outcome.markdown, "F \u{029F} \u{1D00} s \u{029C}!");
    }

    #[tokio::test]
    async fn validator_rejection_reverts_document_and_reports_law() {
        // A single accepted item can pass C6's per-item and per-plan
        // budgets (growth is counted once, per item, not per occurrence)
        // yet still blow up the whole-document length delta once the
        // applier replaces every matching occurrence in the span. C8
        // catches that and the orchestrator reverts to the pre-apply text.
        let config = config_with_steps(vec![Step::Mask, Step::Detect, Step::Apply]);
        let orchestrator = Orchestrator::new(&config);
        let base = "a".repeat(200);
        let detector = FakeDetectorClient::new(vec![Ok(vec![CandidateItem {
            find: "a".to_string(),
            replace: "aaaaaaaaaa".to_string(),
            reason: "CASE_GLITCH".to_string(),
        }])]);
        let outcome = orchestrator.run(&base, &detector, &no_cancel()).await.unwrap();
        assert_eq!(outcome.markdown, base);
        assert_eq!(outcome.status, RunStatus::Rejected);
        assert_eq!(outcome.report.stage("validate").unwrap().get("length_delta"), 1);
        assert!(outcome.rejected_markdown.is_some());
        let diff = outcome.rejected_diff.expect("diff present alongside rejected_markdown");
        assert!(diff.contains("--- before"));
        assert!(diff.contains("+++ rejected"));
    }

    #[tokio::test]
    async fn cancellation_during_detect_fails_the_run() {
        let config = config_with_steps(vec![Step::Mask, Step::Detect, Step::Apply]);
        let orchestrator = Orchestrator::new(&config);
        let detector = FakeDetectorClient::new(vec![]);
        let cancel = AtomicBool::new(true);
        let err = orchestrator
            .run("some text to chunk and detect over", &detector, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Cancelled));
    }

    #[test]
    fn rederive_spans_splits_around_tokens() {
        let mut table = MaskTable::new();
        let t0 = table.push("x");
        let masked = format!("abc{t0}def");
        let spans = rederive_spans(&masked, &table);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text(&masked), "abc");
        assert_eq!(spans[1].text(&masked), "def");
    }

    #[test]
    fn rederive_spans_handles_no_tokens() {
        let table = MaskTable::new();
        let spans = rederive_spans("plain text", &table);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text("plain text"), "plain text");
    }
}
