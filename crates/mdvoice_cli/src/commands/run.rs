use std::io::Write;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{Context, Result};

use mdvoice_core::{CliOverrides, ConfigError, PipelineConfig, Plan, RunReport, Step};
use mdvoice_detector::{DetectorClient, DetectorConfig, FakeDetectorClient, ReqwestDetectorClient};
use mdvoice_engine::orchestrator::{Orchestrator, RunStatus};

use crate::Cli;

const EXIT_SUCCESS: u8 = 0;
// I/O and configuration failures never reach a code path here directly —
// they propagate as `Err` through `?` and are realized as exit code 1 by
// main.rs's catch-all, matching the CLI contract's exit code 1.
const EXIT_DETECTOR_UNREACHABLE: u8 = 2;
const EXIT_VALIDATION_REJECTED: u8 = 3;
const EXIT_DETECTOR_MALFORMED: u8 = 4;

pub async fn run(cli: Cli) -> Result<ExitCode> {
    let steps = cli
        .steps
        .as_ref()
        .map(|raw| parse_steps(raw))
        .transpose()?;

    let overrides = CliOverrides {
        steps,
        detector_endpoint: cli.endpoint.clone(),
        detector_model: cli.model.clone(),
        ..CliOverrides::default()
    };

    let config = PipelineConfig::load(cli.config.as_deref(), overrides, cli.whitelist.as_deref())
        .context("failed to load pipeline configuration")?;

    let input_text = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read input file {}", cli.input.display()))?;

    let wants_detect = config.steps.contains(&Step::Detect);
    let detector: Box<dyn DetectorClient> = if wants_detect {
        let endpoint = config
            .detector_endpoint
            .clone()
            .context("the detect step requires --endpoint or a config file detector_endpoint")?;
        let model = config
            .detector_model
            .clone()
            .context("the detect step requires --model or a config file detector_model")?;
        Box::new(ReqwestDetectorClient::new(DetectorConfig {
            endpoint,
            model,
            timeout: Duration::from_secs(config.detector_timeout_secs),
            max_retries: config.detector_retries,
        }))
    } else {
        Box::new(FakeDetectorClient::new(Vec::new()))
    };

    let orchestrator = Orchestrator::new(&config);
    let cancel = AtomicBool::new(false);
    let outcome = orchestrator
        .run(&input_text, detector.as_ref(), &cancel)
        .await
        .context("pipeline run failed")?;

    write_output(cli.output.as_deref(), &outcome.markdown)?;

    if let Some(plan_path) = &cli.plan {
        write_json(plan_path, &outcome.plan)?;
    }
    if let Some(report_path) = &cli.report {
        write_json(report_path, &outcome.report)?;
    }

    let code = match outcome.status {
        RunStatus::Rejected => EXIT_VALIDATION_REJECTED,
        RunStatus::Applied if wants_detect => {
            detector_exit_code(&outcome.report, &outcome.plan).unwrap_or(EXIT_SUCCESS)
        }
        RunStatus::Applied => EXIT_SUCCESS,
    };

    Ok(ExitCode::from(code))
}

fn parse_steps(raw: &[String]) -> Result<Vec<Step>> {
    let mut steps = Vec::with_capacity(raw.len());
    for name in raw {
        let step = Step::parse(name.trim()).ok_or_else(|| ConfigError::UnknownStep(name.clone()))?;
        steps.push(step);
    }
    Ok(steps)
}

fn write_output(path: Option<&std::path::Path>, markdown: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, markdown)
                .with_context(|| format!("failed to write output to {}", path.display()))?;
        }
        None => {
            std::io::stdout()
                .write_all(markdown.as_bytes())
                .context("failed to write output to stdout")?;
        }
    }
    Ok(())
}

fn write_json(path: &std::path::Path, value: &impl serde::Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize JSON")?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Decides whether a fully `Applied` run should still report a non-zero
/// exit code because the detector collaborator never produced anything
/// usable: every attempt unreachable (`2`) or every attempt malformed
/// beyond recovery (`4`). A run that accepted at least one item, or that
/// only saw detector errors on some chunks while others succeeded, is a
/// normal success — detector errors are counters, never fatal by
/// themselves.
fn detector_exit_code(report: &RunReport, plan: &Plan) -> Option<u8> {
    if !plan.is_empty() {
        return None;
    }
    let detect = report.stage("detect")?;
    let network = detect.get("rejections.network") + detect.get("rejections.timeout");
    let malformed = detect.get("rejections.malformed_json")
        + detect.get("rejections.oversize_body")
        + detect.get("rejections.not_an_array");
    let attempted = network + malformed;
    if attempted == 0 {
        return None;
    }
    if network > 0 && malformed == 0 {
        Some(EXIT_DETECTOR_UNREACHABLE)
    } else if malformed > 0 {
        Some(EXIT_DETECTOR_MALFORMED)
    } else {
        None
    }
}
