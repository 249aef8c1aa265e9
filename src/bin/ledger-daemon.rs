#![forbid(unsafe_code)]
//! Scheduler host for HomeLedger routines
//!
//! Device adapters and API clients live outside this crate; the routines
//! registered here use stand-in steps that report what they would have done,
//! so the audit trail and integrity gating can run end to end.

use homeledger::cli::{init_logging, load_audit_log_from_config};
use homeledger::ledger::Payload;
use homeledger::routine::Routine;
use homeledger::scheduler::{parse_trigger_time, Scheduler};
use homeledger::AuditLog;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

fn topic(query: &str) -> Payload {
    let mut payload = Payload::new();
    payload.insert("query".to_string(), json!(query));
    payload
}

fn morning_routine(name: &str) -> Routine {
    Routine::new(name)
        .step("trigger_alarm", topic("morning alarm"), || {
            info!("[alarm] triggered the alarm (placeholder)");
            Ok(json!("Alarm sounded successfully."))
        })
        .step("fetch_news", topic("stock market, politics"), || {
            if std::env::var("NEWSAPI_API_KEY").is_err() {
                return Err("Missing NEWSAPI_API_KEY environment variable.".to_string());
            }
            Ok(json!({ "topics": ["stock market", "politics"], "articles": [] }))
        })
        .step("summarize_text", topic("stock market, politics headlines"), || {
            if std::env::var("OPENAI_API_KEY").is_err() {
                return Err("Missing OPENAI_API_KEY environment variable.".to_string());
            }
            Ok(json!("No headlines to summarize this morning."))
        })
        .step("calendar_tool", topic("get my meetings today"), || Ok(json!([])))
        .step("tasks_tool", topic("get my tasks"), || Ok(json!([])))
        .step("start_music", topic("play morning playlist"), || {
            info!("[music] starting hallway music (placeholder)");
            Ok(json!("Hallway music started with: play morning playlist"))
        })
}

fn build_routine(name: &str) -> Option<Routine> {
    match name {
        "morning_routine" => Some(morning_routine(name)),
        _ => None,
    }
}

async fn run_tick(scheduler: Scheduler, log: Arc<AuditLog>) -> Result<Scheduler, tokio::task::JoinError> {
    tokio::task::spawn_blocking(move || {
        let mut scheduler = scheduler;
        let now = chrono::Local::now().naive_local();
        for run in scheduler.tick(now, &log) {
            match run.result {
                Ok(report) => info!(
                    routine = %run.routine,
                    status = ?report.status,
                    block = report.block.index,
                    "scheduled routine finished"
                ),
                Err(e) => error!(routine = %run.routine, "scheduled routine aborted: {}", e),
            }
        }
        scheduler
    })
    .await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let config_path = std::env::args().nth(1).map(PathBuf::from);

    let (config, log) = load_audit_log_from_config(config_path.as_deref())?;
    let log = Arc::new(log);
    info!(
        location = %log.location(),
        blocks = log.len(),
        difficulty = log.difficulty(),
        "audit log opened"
    );
    if !log.is_intact() {
        warn!("Audit chain failed verification at startup; routines will abort until it is repaired");
    }

    let mut scheduler = Scheduler::new();
    let now = chrono::Local::now().naive_local();
    for routine in &config.scheduler.routines {
        let at = parse_trigger_time(&routine.at)?;
        match build_routine(&routine.name) {
            Some(built) => {
                info!(routine = %routine.name, steps = ?built.step_names(), at = %routine.at, "registering routine");
                scheduler.every_day_at(at, now, built);
            }
            None => warn!("No routine named {:?} is known; skipping", routine.name),
        }
    }
    if scheduler.is_empty() {
        return Err("no known routines configured".into());
    }

    let mut tick = tokio::time::interval(config.scheduler.tick_interval()?);
    let mut health = tokio::time::interval(config.scheduler.health_check_interval()?);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                scheduler = run_tick(scheduler, log.clone()).await?;
            }
            _ = health.tick() => {
                let log = log.clone();
                let intact = tokio::task::spawn_blocking(move || log.is_intact()).await?;
                if intact {
                    info!("Audit chain health check passed");
                } else {
                    error!("Audit chain health check FAILED");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down; flushing audit chain");
                log.flush()?;
                break;
            }
        }
    }

    Ok(())
}
