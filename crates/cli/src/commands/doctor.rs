use rolecall_core::config::{AppConfig, LoadOptions};
use rolecall_db::open_store;
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::CommandResult;

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

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
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

fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => vec![
            DoctorCheck::pass("config_validation", "configuration loaded and validated"),
            check_bot_token(&config),
            check_store(&config),
        ],
        Err(error) => vec![
            DoctorCheck::fail("config_validation", error.to_string()),
            DoctorCheck::skipped("discord_token_readiness"),
            DoctorCheck::skipped("store_readiness"),
        ],
    };

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_bot_token(config: &AppConfig) -> DoctorCheck {
    let token = config.discord.bot_token.expose_secret();
    if token.chars().any(char::is_whitespace) {
        return DoctorCheck::fail(
            "discord_token_readiness",
            "discord.bot_token contains whitespace; paste the token without the `Bot ` prefix",
        );
    }

    let gate = if config.discord.has_admin_gate() {
        format!("{} admin role(s) gate menu commands", config.discord.admin_role_ids.len())
    } else {
        "no admin roles configured; every member may manage menus".to_string()
    };
    DoctorCheck::pass("discord_token_readiness", format!("bot token present; {gate}"))
}

/// Opens the configured backend and reads every menu, which is exactly what
/// server startup does before going live.
fn check_store(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::fail(
                "store_readiness",
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let result = runtime.block_on(async {
        let store = open_store(&config.store).await?;
        store.check().await?;
        let menus = store.load().await?;
        Ok::<_, rolecall_core::StoreError>((store.describe(), menus.len()))
    });

    match result {
        Ok((location, menus)) => DoctorCheck::pass(
            "store_readiness",
            format!("{} store `{location}` holds {menus} menu(s)", config.store.backend.as_str()),
        ),
        Err(error) => DoctorCheck::fail("store_readiness", error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

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
