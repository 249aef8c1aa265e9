//! Integration tests for integrity-gated routines driven by the scheduler

use chrono::{NaiveDate, NaiveDateTime};
use homeledger::config::{LedgerConfig, StorageBackend};
use homeledger::ledger::Payload;
use homeledger::persistence::{JsonFileStore, Persistence};
use homeledger::routine::{Routine, RoutineStatus, ROUTINE_ABORTED, ROUTINE_COMPLETED};
use homeledger::scheduler::{parse_trigger_time, Scheduler};
use homeledger::{AuditLog, LedgerError};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn json_config(path: &Path) -> LedgerConfig {
    LedgerConfig {
        difficulty: 1,
        backend: StorageBackend::Json,
        path: path.display().to_string(),
        max_mining_iterations: None,
    }
}

fn march(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .expect("valid test date")
}

fn morning_routine() -> Routine {
    Routine::new("morning_routine")
        .step("trigger_alarm", Payload::new(), || Ok(json!("Alarm sounded successfully.")))
        .step("calendar_tool", Payload::new(), || Ok(json!([{"summary": "standup"}])))
        .step("start_music", Payload::new(), || Ok(json!("play morning playlist")))
}

#[test]
fn test_scheduled_routine_is_audited_and_flushed() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("audit_chain.json");
    let log = AuditLog::open(&json_config(&path))?;

    let mut scheduler = Scheduler::new();
    scheduler.every_day_at(parse_trigger_time("07:00")?, march(10, 6, 0), morning_routine());

    let runs = scheduler.tick(march(10, 7, 0), &log);
    assert_eq!(runs.len(), 1);
    let report = runs.into_iter().next().map(|r| r.result).ok_or("no run")??;
    assert_eq!(report.status, RoutineStatus::Completed);

    // genesis + 3 steps + completion, all on disk
    let on_disk = JsonFileStore::new(&path).load_chain()?.ok_or("nothing flushed")?;
    assert_eq!(on_disk.len(), 5);
    assert_eq!(on_disk[4].payload["action"], json!(ROUTINE_COMPLETED));
    assert_eq!(on_disk[4].seal, report.block.seal);
    assert!(log.is_intact());

    Ok(())
}

#[test]
fn test_tampered_store_aborts_next_routine() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("audit_chain.json");
    {
        let log = AuditLog::open(&json_config(&path))?;
        log.record_action("trigger_alarm", Payload::new())?;
        log.flush()?;
    }

    let mut records: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
    records[1]["data"]["action"] = json!("trigger_alarm_tampered");
    fs::write(&path, serde_json::to_string_pretty(&records)?)?;

    let log = AuditLog::open(&json_config(&path))?;
    assert!(!log.is_intact());

    let mut routine = morning_routine();
    let result = routine.run(&log);
    assert!(matches!(result, Err(LedgerError::IntegrityViolation(_))));

    // The abort itself is auditable and persisted; no step ran
    let on_disk = JsonFileStore::new(&path).load_chain()?.ok_or("nothing flushed")?;
    assert_eq!(on_disk.len(), 3);
    assert_eq!(on_disk[2].payload["action"], json!(ROUTINE_ABORTED));
    assert_eq!(on_disk[2].payload["routine"], json!("morning_routine"));

    Ok(())
}
