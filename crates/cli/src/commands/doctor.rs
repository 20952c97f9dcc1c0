use flightdesk_agent::AgentRuntime;
use flightdesk_core::config::{AppConfig, LlmProvider, LoadOptions, SearchProviderKind};
use flightdesk_core::dispatch::DispatchState;
use flightdesk_core::domain::session::SessionId;
use serde::Serialize;

use crate::commands::CommandResult;

const SMOKE_SESSION: &str = "doctor-smoke";
const SMOKE_SCRIPT: [&str; 2] = ["Flights from Boston to Paris", "June 10th"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report(AppConfig::load(LoadOptions::default()));
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report<E: std::fmt::Display>(loaded: Result<AppConfig, E>) -> DoctorReport {
    let mut checks = Vec::new();

    match loaded {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            match AgentRuntime::from_config(&config) {
                Ok(agent) => {
                    checks.push(DoctorCheck::pass(
                        "runtime_wiring",
                        format!(
                            "extractor `{}`, search `{}`, booking `{}`",
                            agent.extractor_name(),
                            agent.coordinator().provider_name(),
                            agent.booking_provider_name()
                        ),
                    ));
                    checks.push(check_dialogue_smoke(&config, &agent));
                }
                Err(error) => {
                    checks.push(DoctorCheck::fail("runtime_wiring", format!("{error:#}")));
                    checks.push(DoctorCheck::skipped(
                        "dialogue_smoke",
                        "skipped because the runtime could not be wired",
                    ));
                }
            }
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.push(DoctorCheck::skipped(
                "runtime_wiring",
                "skipped because configuration did not load",
            ));
            checks.push(DoctorCheck::skipped(
                "dialogue_smoke",
                "skipped because configuration did not load",
            ));
        }
    }

    let all_pass = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Runs a two-turn conversation against the offline providers and expects a
/// result list. Networked providers are skipped so the check never leaves the host.
fn check_dialogue_smoke(config: &AppConfig, agent: &AgentRuntime) -> DoctorCheck {
    if config.search.provider != SearchProviderKind::Simulated
        || config.llm.provider != LlmProvider::Rules
    {
        return DoctorCheck::skipped(
            "dialogue_smoke",
            "skipped because a networked search or llm provider is configured",
        );
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::fail(
                "dialogue_smoke",
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let result = runtime.block_on(async {
        let session_id = SessionId::new(SMOKE_SESSION);
        let mut last = None;
        for line in SMOKE_SCRIPT {
            let turn = agent
                .handle_user_message(&session_id, line)
                .await
                .map_err(|error| format!("turn `{line}` failed: {error}"))?;
            last = Some(turn);
        }
        let _ = agent.end_session(&session_id).await;
        last.ok_or_else(|| "smoke script is empty".to_string())
    });

    match result {
        Ok(turn) if turn.snapshot.dispatch_state == DispatchState::ResultsReady => {
            let offers = turn.snapshot.results.as_ref().map_or(0, |results| results.offers.len());
            DoctorCheck::pass("dialogue_smoke", format!("scripted search returned {offers} offer(s)"))
        }
        Ok(turn) => DoctorCheck::fail(
            "dialogue_smoke",
            format!(
                "scripted search ended in {:?} instead of ResultsReady: {}",
                turn.snapshot.dispatch_state, turn.reply
            ),
        ),
        Err(error) => DoctorCheck::fail("dialogue_smoke", error),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
