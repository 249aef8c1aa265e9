use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::debug;

/// Action metadata carried by a block. `BTreeMap` keeps keys sorted, which the
/// canonical encoding relies on.
pub type Payload = BTreeMap<String, Value>;

/// Predecessor link stored in the genesis block.
pub const GENESIS_PREVIOUS_SEAL: &str = "0";

/// A seal is a hex SHA-256 digest, so no more than 64 leading zeros can exist.
pub const MAX_DIFFICULTY: usize = 64;

/// One record of the audit trail.
///
/// Field names on disk (`data`, `previous_hash`, `hash`) are part of the
/// persisted format and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: f64,
    #[serde(rename = "data")]
    pub payload: Payload,
    #[serde(rename = "previous_hash")]
    pub previous_seal: String,
    pub nonce: u64,
    #[serde(rename = "hash")]
    pub seal: String,
}

/// Canonical pre-image of a seal. Fields are declared in alphabetical order so
/// serde emits them sorted.
#[derive(Serialize)]
struct SealPreimage<'a> {
    data: &'a Payload,
    index: u64,
    nonce: u64,
    previous_hash: &'a str,
    timestamp: f64,
}

impl Block {
    pub fn new(index: u64, timestamp: f64, payload: Payload, previous_seal: impl Into<String>) -> Self {
        let mut block = Block {
            index,
            timestamp,
            payload,
            previous_seal: previous_seal.into(),
            nonce: 0,
            seal: String::new(),
        };
        block.seal = block.calculate_seal();
        block
    }

    /// Compact JSON of the hashed fields with every object key sorted.
    pub fn canonical_encoding(&self) -> String {
        let preimage = SealPreimage {
            data: &self.payload,
            index: self.index,
            nonce: self.nonce,
            previous_hash: &self.previous_seal,
            timestamp: self.timestamp,
        };
        // A map with string keys and finite JSON values cannot fail to encode;
        // non-finite timestamps encode as `null`.
        serde_json::to_string(&preimage).unwrap_or_default()
    }

    /// Recompute the seal from the current fields, nonce included.
    pub fn calculate_seal(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_encoding().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        seal_meets_difficulty(&self.seal, difficulty)
    }

    /// Search nonces until the seal carries `difficulty` leading zeros.
    pub fn mine(&mut self, difficulty: usize) {
        while !self.meets_difficulty(difficulty) {
            self.nonce += 1;
            self.seal = self.calculate_seal();
        }
        debug!(index = self.index, nonce = self.nonce, seal = %self.seal, "block sealed");
    }

    /// Same search as [`Block::mine`], giving up after `max_iterations` nonces.
    pub fn mine_bounded(&mut self, difficulty: usize, max_iterations: u64) -> Result<(), LedgerError> {
        let mut iterations = 0u64;
        while !self.meets_difficulty(difficulty) {
            if iterations >= max_iterations {
                return Err(LedgerError::MiningExhausted { difficulty, iterations });
            }
            self.nonce += 1;
            self.seal = self.calculate_seal();
            iterations += 1;
        }
        debug!(index = self.index, nonce = self.nonce, iterations, "block sealed within limit");
        Ok(())
    }
}

/// Difficulty predicate: `seal` starts with `difficulty` `'0'` characters.
pub fn seal_meets_difficulty(seal: &str, difficulty: usize) -> bool {
    seal.len() >= difficulty && seal.bytes().take(difficulty).all(|b| b == b'0')
}

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(action: &str) -> Payload {
        let mut p = Payload::new();
        p.insert("action".to_string(), json!(action));
        p
    }

    #[test]
    fn test_new_block_is_unmined_but_sealed() {
        let block = Block::new(3, 1_700_000_000.25, payload("trigger_alarm"), "ab");
        assert_eq!(block.nonce, 0);
        assert_eq!(block.seal.len(), 64);
        assert_eq!(block.seal, block.calculate_seal());
    }

    #[test]
    fn test_calculate_seal_is_pure() {
        let block = Block::new(1, 12.5, payload("play_music"), "00ff");
        let first = block.calculate_seal();
        let second = block.calculate_seal();
        assert_eq!(first, second);
        assert_eq!(block.nonce, 0);
    }

    #[test]
    fn test_canonical_encoding_sorts_keys() {
        let mut p = Payload::new();
        p.insert("zeta".to_string(), json!(1));
        p.insert("alpha".to_string(), json!({"y": 2, "b": 1}));
        let block = Block::new(7, 1.5, p, "0");
        assert_eq!(
            block.canonical_encoding(),
            r#"{"data":{"alpha":{"b":1,"y":2},"zeta":1},"index":7,"nonce":0,"previous_hash":"0","timestamp":1.5}"#
        );
    }

    #[test]
    fn test_seal_is_lowercase_hex_sha256() {
        let block = Block::new(0, 0.0, Payload::new(), GENESIS_PREVIOUS_SEAL);
        let preimage = r#"{"data":{},"index":0,"nonce":0,"previous_hash":"0","timestamp":0.0}"#;
        let expected = hex::encode(Sha256::digest(preimage.as_bytes()));
        assert_eq!(block.calculate_seal(), expected);
        assert!(block.seal.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_mine_meets_difficulty_for_small_difficulties() {
        for difficulty in 0..=3 {
            let mut block = Block::new(1, 1_700_000_000.0, payload("fetch_news"), "abc");
            block.mine(difficulty);
            assert!(block.seal.starts_with(&"0".repeat(difficulty)));
            assert_eq!(block.seal, block.calculate_seal());
        }
    }

    #[test]
    fn test_mine_zero_difficulty_keeps_nonce() {
        let mut block = Block::new(1, 2.0, payload("noop"), "abc");
        block.mine(0);
        assert_eq!(block.nonce, 0);
    }

    #[test]
    fn test_mine_bounded_gives_up() {
        let mut block = Block::new(1, 2.0, payload("noop"), "abc");
        let err = block.mine_bounded(MAX_DIFFICULTY, 10).unwrap_err();
        match err {
            LedgerError::MiningExhausted { difficulty, iterations } => {
                assert_eq!(difficulty, MAX_DIFFICULTY);
                assert_eq!(iterations, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(block.nonce, 10);
    }

    #[test]
    fn test_mine_bounded_succeeds_with_room() {
        let mut block = Block::new(1, 2.0, payload("noop"), "abc");
        block.mine_bounded(1, 10_000).unwrap();
        assert!(block.meets_difficulty(1));
    }

    #[test]
    fn test_seal_meets_difficulty() {
        assert!(seal_meets_difficulty("00ab", 2));
        assert!(!seal_meets_difficulty("0ab", 2));
        assert!(seal_meets_difficulty("anything", 0));
        assert!(!seal_meets_difficulty("00", 3));
    }

    #[test]
    fn test_serialized_field_names() {
        let block = Block::new(2, 3.5, payload("trigger_alarm"), "prev");
        let value = serde_json::to_value(&block).unwrap();
        let obj = value.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["data", "hash", "index", "nonce", "previous_hash", "timestamp"]);
    }
}
