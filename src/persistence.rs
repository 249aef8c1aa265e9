//! Durable storage for the audit ledger
//!
//! Every backend stores the full chain and overwrites it wholesale on save.
//! The JSON backend is the documented interchange format: an ordered array of
//! `{index, timestamp, data, previous_hash, nonce, hash}` records.

use crate::config::{LedgerConfig, StorageBackend};
use crate::error::LedgerError;
use crate::ledger::{Block, Payload};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Abstraction for persistence backends.
pub trait Persistence: Send + Sync {
    /// Replace whatever was stored before with `blocks`.
    fn save_chain(&self, blocks: &[Block]) -> Result<(), LedgerError>;
    /// `Ok(None)` means the store has no history yet.
    fn load_chain(&self) -> Result<Option<Vec<Block>>, LedgerError>;
    /// Human-readable description of where the chain lives.
    fn location(&self) -> String;
}

/// Build the backend selected in the configuration.
pub fn open_store(config: &LedgerConfig) -> Result<Box<dyn Persistence>, LedgerError> {
    match config.backend {
        StorageBackend::Json => Ok(Box::new(JsonFileStore::new(&config.path))),
        StorageBackend::Sqlite => Ok(Box::new(Database::open(&config.path)?)),
        StorageBackend::Memory => Ok(Box::new(InMemoryPersistence::new())),
    }
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for JsonFileStore {
    fn save_chain(&self, blocks: &[Block]) -> Result<(), LedgerError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| {
            LedgerError::Persistence(format!("Failed to create directory {}: {}", dir.display(), e))
        })?;

        // Write beside the target and rename over it so readers never see a
        // half-written chain.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| LedgerError::Persistence(format!("Failed to create temp file: {}", e)))?;
        serde_json::to_writer_pretty(&mut tmp, blocks)?;
        tmp.write_all(b"\n")
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| LedgerError::Persistence(format!("Failed to write chain: {}", e)))?;
        tmp.persist(&self.path).map_err(|e| {
            LedgerError::Persistence(format!("Failed to replace {}: {}", self.path.display(), e.error))
        })?;
        Ok(())
    }

    fn load_chain(&self) -> Result<Option<Vec<Block>>, LedgerError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LedgerError::Persistence(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let blocks: Vec<Block> = serde_json::from_str(&contents).map_err(|e| {
            LedgerError::CorruptStore(format!("{} is not a valid chain: {}", self.path.display(), e))
        })?;
        Ok(Some(blocks))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

const CHAIN_LENGTH_KEY: &str = "chain_length";

/// SQLite-backed store; one row per block, plus the length of the last saved
/// chain in `metadata`.
pub struct Database {
    conn: Mutex<Connection>,
    path: String,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    LedgerError::Persistence(format!("Failed to create directory {}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| LedgerError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                idx INTEGER PRIMARY KEY,
                timestamp REAL NOT NULL,
                data TEXT NOT NULL,
                previous_hash TEXT NOT NULL,
                nonce INTEGER NOT NULL,
                hash TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| LedgerError::Database(format!("Failed to create blocks table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| LedgerError::Database(format!("Failed to create metadata table: {}", e)))?;

        Ok(Database {
            conn: Mutex::new(conn),
            path: path.display().to_string(),
        })
    }

    /// An in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::open(":memory:")
    }
}

impl Persistence for Database {
    fn save_chain(&self, blocks: &[Block]) -> Result<(), LedgerError> {
        let conn = self.conn.lock();
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| LedgerError::Database(format!("Failed to start transaction: {}", e)))?;

        tx.execute("DELETE FROM blocks", [])
            .map_err(|e| LedgerError::Database(format!("Failed to clear blocks: {}", e)))?;

        for block in blocks {
            let data_json = serde_json::to_string(&block.payload)?;
            let index = i64::try_from(block.index).map_err(|_| {
                LedgerError::Persistence(format!("Block index {} does not fit in SQLite", block.index))
            })?;
            let nonce = i64::try_from(block.nonce).map_err(|_| {
                LedgerError::Persistence(format!("Block {} nonce {} does not fit in SQLite", block.index, block.nonce))
            })?;
            tx.execute(
                "INSERT INTO blocks (idx, timestamp, data, previous_hash, nonce, hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![index, block.timestamp, data_json, block.previous_seal, nonce, block.seal],
            )
            .map_err(|e| LedgerError::Database(format!("Failed to save block {}: {}", block.index, e)))?;
        }

        // Once a chain has been saved, an empty or shortened table is tampering,
        // not a fresh store.
        tx.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![CHAIN_LENGTH_KEY, blocks.len().to_string()],
        )
        .map_err(|e| LedgerError::Database(format!("Failed to save chain length: {}", e)))?;

        tx.commit()
            .map_err(|e| LedgerError::Database(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }

    fn load_chain(&self) -> Result<Option<Vec<Block>>, LedgerError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT idx, timestamp, data, previous_hash, nonce, hash FROM blocks ORDER BY idx ASC")
            .map_err(|e| LedgerError::Database(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let index: i64 = row.get(0)?;
                let timestamp: f64 = row.get(1)?;
                let data_json: String = row.get(2)?;
                let previous_seal: String = row.get(3)?;
                let nonce: i64 = row.get(4)?;
                let seal: String = row.get(5)?;
                Ok((index, timestamp, data_json, previous_seal, nonce, seal))
            })
            .map_err(|e| LedgerError::Database(format!("Failed to query blocks: {}", e)))?;

        let mut blocks = Vec::new();
        for row in rows {
            let (index, timestamp, data_json, previous_seal, nonce, seal) =
                row.map_err(|e| LedgerError::CorruptStore(format!("Failed to read block row: {}", e)))?;
            let payload: Payload = serde_json::from_str(&data_json).map_err(|e| {
                LedgerError::CorruptStore(format!("Block {} has unparseable data: {}", index, e))
            })?;
            let nonce = u64::try_from(nonce)
                .map_err(|_| LedgerError::CorruptStore(format!("Block {} has negative nonce {}", index, nonce)))?;
            let index = u64::try_from(index)
                .map_err(|_| LedgerError::CorruptStore(format!("Block row has negative index {}", index)))?;
            blocks.push(Block {
                index,
                timestamp,
                payload,
                previous_seal,
                nonce,
                seal,
            });
        }

        let saved_length: Option<String> = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![CHAIN_LENGTH_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| LedgerError::Database(format!("Failed to read chain length: {}", e)))?;

        match saved_length {
            None if blocks.is_empty() => Ok(None),
            None => Ok(Some(blocks)),
            Some(saved) => {
                let saved: usize = saved.parse().map_err(|_| {
                    LedgerError::CorruptStore(format!("{} has unreadable chain length {:?}", self.location(), saved))
                })?;
                if saved != blocks.len() {
                    return Err(LedgerError::CorruptStore(format!(
                        "{} was saved with {} blocks but holds {}",
                        self.location(),
                        saved,
                        blocks.len()
                    )));
                }
                Ok(Some(blocks))
            }
        }
    }

    fn location(&self) -> String {
        format!("sqlite:{}", self.path)
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    pub blocks: Arc<Mutex<Option<Vec<Block>>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn save_chain(&self, blocks: &[Block]) -> Result<(), LedgerError> {
        *self.blocks.lock() = Some(blocks.to_vec());
        Ok(())
    }

    fn load_chain(&self) -> Result<Option<Vec<Block>>, LedgerError> {
        Ok(self.blocks.lock().clone())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// Store whose writes always fail, for exercising flush error paths.
#[cfg(test)]
pub(crate) struct FailingPersistence;

#[cfg(test)]
impl Persistence for FailingPersistence {
    fn save_chain(&self, _blocks: &[Block]) -> Result<(), LedgerError> {
        Err(LedgerError::Persistence("disk full".to_string()))
    }

    fn load_chain(&self) -> Result<Option<Vec<Block>>, LedgerError> {
        Ok(None)
    }

    fn location(&self) -> String {
        "failing".to_string()
    }
}
