//! Routines: named sequences of audited steps
//!
//! A routine refuses to run on a chain that fails verification. Every step is
//! recorded through [`audited`], the routine's overall outcome is recorded as
//! one more block, and the chain is flushed on every exit path.

use crate::audit::{audited, AuditLog, BlockRef};
use crate::error::LedgerError;
use crate::ledger::Payload;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

pub const ROUTINE_ABORTED: &str = "routine_aborted";
pub const ROUTINE_COMPLETED: &str = "routine_completed";
pub const ROUTINE_ERROR: &str = "routine_error";

/// A collaborator call: device command, API fetch, summarizer, ...
pub type StepFn = Box<dyn FnMut() -> Result<Value, String> + Send>;

struct Step {
    name: String,
    metadata: Payload,
    run: StepFn,
}

pub struct Routine {
    name: String,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: String,
    pub succeeded: bool,
    pub detail: Value,
    pub block: BlockRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutineReport {
    pub routine: String,
    pub status: RoutineStatus,
    pub steps: Vec<StepOutcome>,
    /// Block recording the routine's overall outcome.
    pub block: BlockRef,
}

impl Routine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step<F>(mut self, name: impl Into<String>, metadata: Payload, run: F) -> Self
    where
        F: FnMut() -> Result<Value, String> + Send + 'static,
    {
        self.steps.push(Step {
            name: name.into(),
            metadata,
            run: Box::new(run),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Run every step against `log`. Fails with `IntegrityViolation` without
    /// touching any collaborator when the chain does not verify.
    pub fn run(&mut self, log: &AuditLog) -> Result<RoutineReport, LedgerError> {
        if !log.is_intact() {
            let mut metadata = Payload::new();
            metadata.insert("routine".to_string(), json!(self.name));
            metadata.insert("reason".to_string(), json!("audit chain failed verification"));
            let recorded = log.record_action(ROUTINE_ABORTED, metadata);
            log.flush()?;
            let block = recorded?;
            warn!(routine = %self.name, index = block.index, "routine aborted: audit chain failed verification");
            return Err(LedgerError::IntegrityViolation(format!(
                "routine {} aborted: audit chain failed verification",
                self.name
            )));
        }

        let report = self.run_steps(log);
        let flushed = log.flush();
        let report = report?;
        flushed?;

        info!(routine = %report.routine, status = ?report.status, steps = report.steps.len(), "routine finished");
        Ok(report)
    }

    fn run_steps(&mut self, log: &AuditLog) -> Result<RoutineReport, LedgerError> {
        let mut outcomes = Vec::with_capacity(self.steps.len());
        for step in &mut self.steps {
            let mut metadata = step.metadata.clone();
            metadata.insert("routine".to_string(), json!(self.name));
            let run = &mut step.run;
            let recorded = audited(log, &step.name, metadata, || run())?;
            let (succeeded, detail) = match recorded.outcome {
                Ok(value) => (true, value),
                Err(e) => {
                    warn!(routine = %self.name, step = %step.name, "step failed: {}", e);
                    (false, json!(e))
                }
            };
            outcomes.push(StepOutcome {
                step: step.name.clone(),
                succeeded,
                detail,
                block: recorded.block,
            });
        }

        let failed: Vec<&str> = outcomes
            .iter()
            .filter(|o| !o.succeeded)
            .map(|o| o.step.as_str())
            .collect();
        let status = if failed.is_empty() {
            RoutineStatus::Completed
        } else {
            RoutineStatus::Failed
        };

        let mut metadata = Payload::new();
        metadata.insert("routine".to_string(), json!(self.name));
        metadata.insert("steps".to_string(), json!(outcomes.len()));
        let action = match status {
            RoutineStatus::Completed => ROUTINE_COMPLETED,
            RoutineStatus::Failed => {
                metadata.insert("failed_steps".to_string(), json!(failed));
                ROUTINE_ERROR
            }
        };
        let block = log.record_action(action, metadata)?;

        Ok(RoutineReport {
            routine: self.name.clone(),
            status,
            steps: outcomes,
            block,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::persistence::{FailingPersistence, InMemoryPersistence, Persistence};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn memory_log() -> (AuditLog, InMemoryPersistence) {
        let store = InMemoryPersistence::new();
        let ledger = Ledger::with_genesis(1).unwrap();
        (AuditLog::new(ledger, Box::new(store.clone())), store)
    }

    fn unwritable_log() -> AuditLog {
        AuditLog::new(Ledger::with_genesis(1).unwrap(), Box::new(FailingPersistence))
    }

    fn actions(log: &AuditLog) -> Vec<String> {
        log.snapshot()
            .iter()
            .skip(1)
            .map(|b| b.payload["action"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_successful_routine_records_every_step() {
        let (log, store) = memory_log();
        let mut routine = Routine::new("morning_routine")
            .step("trigger_alarm", Payload::new(), || Ok(json!("Alarm sounded successfully.")))
            .step("start_music", Payload::new(), || Ok(json!("play morning playlist")));

        let report = routine.run(&log).unwrap();
        assert_eq!(report.status, RoutineStatus::Completed);
        assert_eq!(report.steps.len(), 2);
        assert_eq!(actions(&log), vec!["trigger_alarm", "start_music", ROUTINE_COMPLETED]);
        assert_eq!(store.load_chain().unwrap().unwrap().len(), 4);
        assert!(log.is_intact());
    }

    #[test]
    fn test_failed_step_marks_routine_failed_and_still_flushes() {
        let (log, store) = memory_log();
        let mut routine = Routine::new("morning_routine")
            .step("fetch_news", Payload::new(), || Err("Missing NEWSAPI_API_KEY".to_string()))
            .step("tasks_tool", Payload::new(), || Ok(json!([])));

        let report = routine.run(&log).unwrap();
        assert_eq!(report.status, RoutineStatus::Failed);
        assert!(!report.steps[0].succeeded);
        assert!(report.steps[1].succeeded);

        let blocks = log.snapshot();
        let last = blocks.last().unwrap();
        assert_eq!(last.payload["action"], json!(ROUTINE_ERROR));
        assert_eq!(last.payload["failed_steps"], json!(["fetch_news"]));
        assert_eq!(store.load_chain().unwrap().unwrap().len(), blocks.len());
    }

    #[test]
    fn test_broken_chain_aborts_before_any_step() {
        let (log, store) = memory_log();
        log.record_action("trigger_alarm", Payload::new()).unwrap();
        log.tamper(|blocks| {
            blocks[1].payload.insert("action".to_string(), json!("trigger_alarm_tampered"));
        })
        .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut routine = Routine::new("morning_routine").step("trigger_alarm", Payload::new(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        });

        let err = routine.run(&log).unwrap_err();
        assert!(matches!(err, LedgerError::IntegrityViolation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let persisted = store.load_chain().unwrap().unwrap();
        assert_eq!(persisted.last().unwrap().payload["action"], json!(ROUTINE_ABORTED));
    }

    #[test]
    fn test_flush_failure_surfaces_after_completion_is_recorded() {
        let log = unwritable_log();
        let mut routine = Routine::new("morning_routine").step("trigger_alarm", Payload::new(), || Ok(json!("ok")));

        let err = routine.run(&log).unwrap_err();
        assert!(matches!(err, LedgerError::Persistence(_)));
        assert_eq!(actions(&log), vec!["trigger_alarm", ROUTINE_COMPLETED]);
    }

    #[test]
    fn test_flush_failure_surfaces_after_routine_error_is_recorded() {
        let log = unwritable_log();
        let mut routine = Routine::new("morning_routine")
            .step("fetch_news", Payload::new(), || Err("Missing NEWSAPI_API_KEY".to_string()));

        let err = routine.run(&log).unwrap_err();
        assert!(matches!(err, LedgerError::Persistence(_)));
        assert_eq!(actions(&log), vec!["fetch_news", ROUTINE_ERROR]);
    }

    #[test]
    fn test_abort_reports_flush_failure_over_integrity() {
        let log = unwritable_log();
        log.record_action("trigger_alarm", Payload::new()).unwrap();
        log.tamper(|blocks| {
            blocks[1].payload.insert("action".to_string(), json!("trigger_alarm_tampered"));
        })
        .unwrap();

        let mut routine = Routine::new("morning_routine").step("trigger_alarm", Payload::new(), || Ok(Value::Null));
        let err = routine.run(&log).unwrap_err();
        assert!(matches!(err, LedgerError::Persistence(_)));
        assert_eq!(log.snapshot().last().unwrap().payload["action"], json!(ROUTINE_ABORTED));
    }
}
