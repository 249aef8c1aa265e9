//! Collaborator-facing audit log
//!
//! Device adapters, data fetchers and the scheduler never touch the
//! [`Ledger`] directly. They go through [`AuditLog`], which serializes every
//! append, verification and flush behind one lock so that two writers can
//! never mine on top of the same tail.

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::ledger::{Block, Ledger, Payload};
use crate::persistence::{open_store, Persistence};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::fmt::Display;
use tracing::{error, info, warn};

/// Handle to a sealed block, returned to whoever recorded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockRef {
    pub index: u64,
    pub seal: String,
}

impl From<&Block> for BlockRef {
    fn from(block: &Block) -> Self {
        Self {
            index: block.index,
            seal: block.seal.clone(),
        }
    }
}

pub struct AuditLog {
    ledger: Mutex<Ledger>,
    store: Box<dyn Persistence>,
}

impl AuditLog {
    pub fn new(ledger: Ledger, store: Box<dyn Persistence>) -> Self {
        Self {
            ledger: Mutex::new(ledger),
            store,
        }
    }

    /// Open the configured store and restore (or start) the chain from it.
    pub fn open(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let store = open_store(config)?;
        let mut ledger = Ledger::from_config(config)?;
        ledger.load(store.as_ref())?;
        Ok(Self::new(ledger, store))
    }

    /// Seal one action into the chain. `action_name` is stored under the
    /// `"action"` key and overrides any such key in `metadata`.
    pub fn record_action(&self, action_name: &str, mut metadata: Payload) -> Result<BlockRef, LedgerError> {
        metadata.insert("action".to_string(), json!(action_name));
        let block = self.ledger.lock().append(metadata)?;
        info!(action = action_name, index = block.index, "recorded action");
        Ok(BlockRef::from(&block))
    }

    pub fn is_intact(&self) -> bool {
        match self.ledger.lock().validate() {
            Ok(()) => true,
            Err(e) => {
                warn!("Audit chain failed verification: {}", e);
                false
            }
        }
    }

    /// Persist the whole chain. Failures are logged and returned.
    pub fn flush(&self) -> Result<(), LedgerError> {
        let ledger = self.ledger.lock();
        ledger.save(self.store.as_ref()).map_err(|e| {
            error!("Failed to flush audit chain to {}: {}", self.store.location(), e);
            e
        })
    }

    pub fn snapshot(&self) -> Vec<Block> {
        self.ledger.lock().blocks().to_vec()
    }

    pub fn len(&self) -> usize {
        self.ledger.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.lock().is_empty()
    }

    pub fn difficulty(&self) -> usize {
        self.ledger.lock().difficulty()
    }

    pub fn location(&self) -> String {
        self.store.location()
    }

    #[cfg(test)]
    pub(crate) fn tamper<F: FnOnce(&mut Vec<Block>)>(&self, f: F) -> Result<(), LedgerError> {
        let mut ledger = self.ledger.lock();
        let mut blocks = ledger.blocks().to_vec();
        f(&mut blocks);
        let store = crate::persistence::InMemoryPersistence::new();
        store.save_chain(&blocks)?;
        ledger.load(&store)
    }
}

/// Outcome of an audited action together with the block that records it.
#[derive(Debug)]
pub struct Audited<T, E> {
    pub outcome: Result<T, E>,
    pub block: BlockRef,
}

/// Run `action`, then record what happened regardless of success.
///
/// Successful results are stored under `"result"` as JSON, failures under
/// `"error"` as their display text; `"status"` is `"ok"` or `"error"`. A result
/// that cannot be expressed as JSON is recorded as an error, though the
/// returned outcome is still the action's own.
pub fn audited<T, E, F>(
    log: &AuditLog,
    action_name: &str,
    mut metadata: Payload,
    action: F,
) -> Result<Audited<T, E>, LedgerError>
where
    F: FnOnce() -> Result<T, E>,
    T: Serialize,
    E: Display,
{
    let outcome = action();
    match &outcome {
        Ok(value) => match serde_json::to_value(value) {
            Ok(result) => {
                metadata.insert("status".to_string(), json!("ok"));
                metadata.insert("result".to_string(), result);
            }
            Err(e) => {
                warn!(action = action_name, "result could not be recorded: {}", e);
                metadata.insert("status".to_string(), json!("error"));
                metadata.insert("error".to_string(), json!(format!("unserializable result: {}", e)));
            }
        },
        Err(e) => {
            metadata.insert("status".to_string(), json!("error"));
            metadata.insert("error".to_string(), json!(e.to_string()));
        }
    }
    let block = log.record_action(action_name, metadata)?;
    Ok(Audited { outcome, block })
}
