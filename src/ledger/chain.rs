use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::ledger::block::{now_timestamp, Block, Payload, GENESIS_PREVIOUS_SEAL, MAX_DIFFICULTY};
use crate::ledger::validation::validate_chain;
use crate::persistence::Persistence;
use serde_json::json;
use tracing::{debug, info, warn};

pub const DEFAULT_DIFFICULTY: usize = 4;
pub const GENESIS_MESSAGE: &str = "Genesis Block";

/// Append-only chain of sealed audit blocks.
///
/// `append` is the only way blocks enter the chain; `load` replaces it
/// wholesale with a previously saved copy.
#[derive(Debug, Clone)]
pub struct Ledger {
    blocks: Vec<Block>,
    difficulty: usize,
    max_mining_iterations: Option<u64>,
}

impl Ledger {
    /// An uninitialized ledger. Call [`Ledger::initialize`] or [`Ledger::load`]
    /// before use.
    pub fn new(difficulty: usize) -> Result<Self, LedgerError> {
        if difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::InvalidDifficulty(difficulty));
        }
        Ok(Ledger {
            blocks: Vec::new(),
            difficulty,
            max_mining_iterations: None,
        })
    }

    /// A ledger that already holds its genesis block.
    pub fn with_genesis(difficulty: usize) -> Result<Self, LedgerError> {
        let mut ledger = Self::new(difficulty)?;
        ledger.initialize()?;
        Ok(ledger)
    }

    pub fn from_config(config: &LedgerConfig) -> Result<Self, LedgerError> {
        Ok(Self::new(config.difficulty)?.with_mining_limit(config.max_mining_iterations))
    }

    pub fn with_mining_limit(mut self, max_iterations: Option<u64>) -> Self {
        self.max_mining_iterations = max_iterations;
        self
    }

    pub fn initialize(&mut self) -> Result<(), LedgerError> {
        if !self.blocks.is_empty() {
            return Ok(());
        }

        let mut payload = Payload::new();
        payload.insert("message".to_string(), json!(GENESIS_MESSAGE));
        let mut genesis = Block::new(0, now_timestamp(), payload, GENESIS_PREVIOUS_SEAL);
        self.seal(&mut genesis)?;

        info!(seal = %genesis.seal, difficulty = self.difficulty, "created genesis block");
        self.blocks.push(genesis);
        Ok(())
    }

    /// Mine `payload` into a new block linked to the current tail.
    ///
    /// The block is pushed only after mining succeeds, so an interrupted or
    /// exhausted search never leaves a partial block behind.
    pub fn append(&mut self, payload: Payload) -> Result<Block, LedgerError> {
        self.initialize()?;

        let previous_seal = match self.blocks.last() {
            Some(tail) => tail.seal.clone(),
            None => return Err(LedgerError::IntegrityViolation("Chain has no genesis block.".to_string())),
        };
        let mut block = Block::new(self.blocks.len() as u64, now_timestamp(), payload, previous_seal);
        self.seal(&mut block)?;

        debug!(index = block.index, nonce = block.nonce, "appended block");
        self.blocks.push(block.clone());
        Ok(block)
    }

    fn seal(&self, block: &mut Block) -> Result<(), LedgerError> {
        match self.max_mining_iterations {
            Some(limit) => block.mine_bounded(self.difficulty, limit),
            None => {
                block.mine(self.difficulty);
                Ok(())
            }
        }
    }

    pub fn verify(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        validate_chain(&self.blocks, self.difficulty)
    }

    pub fn save(&self, store: &dyn Persistence) -> Result<(), LedgerError> {
        store.save_chain(&self.blocks)?;
        info!(blocks = self.blocks.len(), location = %store.location(), "saved ledger");
        Ok(())
    }

    /// Restore the chain exactly as it was saved. A store with no history
    /// yields a fresh genesis; unreadable or empty history is an error.
    pub fn load(&mut self, store: &dyn Persistence) -> Result<(), LedgerError> {
        match store.load_chain()? {
            Some(blocks) if blocks.is_empty() => Err(LedgerError::CorruptStore(format!(
                "{} holds an empty chain",
                store.location()
            ))),
            Some(blocks) => {
                info!(blocks = blocks.len(), location = %store.location(), "loaded ledger");
                self.blocks = blocks;
                if let Err(e) = self.validate() {
                    warn!("Loaded ledger does not verify: {}", e);
                }
                Ok(())
            }
            None => {
                info!(location = %store.location(), "no ledger history found, starting fresh");
                self.blocks.clear();
                self.initialize()
            }
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn get(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    pub fn tail(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn max_mining_iterations(&self) -> Option<u64> {
        self.max_mining_iterations
    }
}
