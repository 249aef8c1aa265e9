use crate::error::LedgerError;
use crate::ledger::block::{Block, GENESIS_PREVIOUS_SEAL};

/// Walk the chain front to back and report the first broken rule.
///
/// Every block, genesis included, must sit at its own index, carry a seal that
/// matches its recomputed content and meets `difficulty`, and link to the seal
/// before it (`"0"` for genesis).
pub fn validate_chain(blocks: &[Block], difficulty: usize) -> Result<(), LedgerError> {
    if blocks.is_empty() {
        return Err(LedgerError::IntegrityViolation("Chain has no genesis block.".to_string()));
    }

    for (position, block) in blocks.iter().enumerate() {
        validate_block(block, position as u64, difficulty)?;

        let expected_link = match position {
            0 => GENESIS_PREVIOUS_SEAL,
            _ => blocks[position - 1].seal.as_str(),
        };
        if block.previous_seal != expected_link {
            return Err(LedgerError::IntegrityViolation(format!(
                "Broken link at block {}. Expected previous seal {}, but got {}.",
                position, expected_link, block.previous_seal
            )));
        }
    }
    Ok(())
}

/// Checks that only concern the block itself.
pub fn validate_block(block: &Block, expected_index: u64, difficulty: usize) -> Result<(), LedgerError> {
    if block.index != expected_index {
        return Err(LedgerError::IntegrityViolation(format!(
            "Invalid block index. Expected {}, but got {}.",
            expected_index, block.index
        )));
    }

    let recomputed = block.calculate_seal();
    if recomputed != block.seal {
        return Err(LedgerError::IntegrityViolation(format!(
            "Seal mismatch at block {}. Stored {}, but content hashes to {}.",
            block.index, block.seal, recomputed
        )));
    }

    if !block.meets_difficulty(difficulty) {
        return Err(LedgerError::IntegrityViolation(format!(
            "Invalid proof-of-work at block {}: seal {} lacks {} leading zeros.",
            block.index, block.seal, difficulty
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::block::Payload;
    use serde_json::json;

    fn sealed_chain(len: usize, difficulty: usize) -> Vec<Block> {
        let mut blocks: Vec<Block> = Vec::new();
        for i in 0..len {
            let previous = blocks.last().map_or(GENESIS_PREVIOUS_SEAL.to_string(), |b| b.seal.clone());
            let mut payload = Payload::new();
            payload.insert("step".to_string(), json!(i));
            let mut block = Block::new(i as u64, 100.0 + i as f64, payload, previous);
            block.mine(difficulty);
            blocks.push(block);
        }
        blocks
    }

    #[test]
    fn test_valid_chain_passes() {
        assert!(validate_chain(&sealed_chain(4, 1), 1).is_ok());
    }

    #[test]
    fn test_empty_chain_fails() {
        assert!(matches!(validate_chain(&[], 1), Err(LedgerError::IntegrityViolation(_))));
    }

    #[test]
    fn test_index_gap_fails() {
        let mut blocks = sealed_chain(3, 1);
        blocks.remove(1);
        assert!(validate_chain(&blocks, 1).is_err());
    }

    #[test]
    fn test_reordered_blocks_fail() {
        let mut blocks = sealed_chain(3, 1);
        blocks.swap(1, 2);
        assert!(validate_chain(&blocks, 1).is_err());
    }

    #[test]
    fn test_genesis_with_wrong_sentinel_fails() {
        let mut blocks = sealed_chain(1, 0);
        blocks[0] = Block::new(0, 1.0, Payload::new(), "deadbeef");
        assert!(validate_chain(&blocks, 0).is_err());
    }

    #[test]
    fn test_higher_difficulty_than_mined_fails() {
        let blocks = sealed_chain(2, 0);
        // 64 zeros is unreachable, so a difficulty-0 chain cannot satisfy it
        assert!(validate_chain(&blocks, 64).is_err());
    }
}
