use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use std::sync::atomic::{AtomicBool, Ordering};

use super::crypto::{crypto_hash, leading_zero_bits, HASH_SIZE};
use super::transaction::Transaction;
use crate::config::{
    GENESIS_HASH, GENESIS_LAST_HASH, GENESIS_NONCE, GENESIS_TIMESTAMP, INITIAL_DIFFICULTY,
    MINE_RATE_MS,
};

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Milliseconds since the Unix epoch when the block was mined
    pub timestamp: i64,

    /// Hex-encoded SHA-256 digest of the other fields
    pub hash: String,

    /// Hash of the previous block
    pub last_hash: String,

    /// Transactions confirmed by this block
    pub data: Vec<Transaction>,

    /// Proof of work
    pub nonce: u64,

    /// Required number of leading zero bits in `hash`
    pub difficulty: u32,
}

impl Block {
    /// The fixed first block of every chain
    pub fn genesis() -> Self {
        Block {
            timestamp: GENESIS_TIMESTAMP,
            hash: GENESIS_HASH.to_string(),
            last_hash: GENESIS_LAST_HASH.to_string(),
            data: Vec::new(),
            nonce: GENESIS_NONCE,
            difficulty: INITIAL_DIFFICULTY,
        }
    }

    /// Digest over the ordered tuple of block fields
    pub fn calculate_hash(
        timestamp: i64,
        last_hash: &str,
        data: &[Transaction],
        nonce: u64,
        difficulty: u32,
    ) -> [u8; HASH_SIZE] {
        crypto_hash(&(timestamp, last_hash, data, nonce, difficulty))
    }

    /// Recomputes the hash of this block from its own fields
    pub fn recompute_hash(&self) -> String {
        hex::encode(Self::calculate_hash(
            self.timestamp,
            &self.last_hash,
            &self.data,
            self.nonce,
            self.difficulty,
        ))
    }

    /// Whether the stated hash has at least `difficulty` leading zero bits
    pub fn meets_difficulty(&self) -> bool {
        match hex::decode(&self.hash) {
            Ok(bytes) => leading_zero_bits(&bytes) >= self.difficulty,
            Err(_) => false,
        }
    }

    /// Next difficulty given the block being extended and the candidate timestamp
    ///
    /// Moves by one per block: down when mining took longer than the target
    /// rate, up otherwise. Never returns less than 1.
    pub fn adjust_difficulty(original_block: &Block, timestamp: i64) -> u32 {
        let difficulty = original_block.difficulty;

        if difficulty < 1 {
            return 1;
        }

        if timestamp.saturating_sub(original_block.timestamp) > MINE_RATE_MS {
            return (difficulty - 1).max(1);
        }

        difficulty + 1
    }

    /// Mines a block on top of `last_block`, running until a valid hash is found
    pub fn mine(last_block: &Block, data: Vec<Transaction>) -> Block {
        let never = AtomicBool::new(false);
        match Self::mine_cancellable(last_block, data, &never) {
            Some(block) => block,
            None => unreachable!("an uncancelled search only ends with a block"),
        }
    }

    /// Mines a block on top of `last_block`
    ///
    /// `cancel` is checked before every nonce; once it is set the search stops
    /// and `None` is returned.
    pub fn mine_cancellable(
        last_block: &Block,
        data: Vec<Transaction>,
        cancel: &AtomicBool,
    ) -> Option<Block> {
        let last_hash = last_block.hash.as_str();
        let mut nonce: u64 = 0;

        loop {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }

            let timestamp = Utc::now().timestamp_millis();
            let difficulty = Self::adjust_difficulty(last_block, timestamp);
            let hash = Self::calculate_hash(timestamp, last_hash, &data, nonce, difficulty);

            if leading_zero_bits(&hash) >= difficulty {
                return Some(Block {
                    timestamp,
                    hash: hex::encode(hash),
                    last_hash: last_hash.to_string(),
                    data,
                    nonce,
                    difficulty,
                });
            }

            nonce = nonce.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{Address, Transaction};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn recent_block(difficulty: u32) -> Block {
        Block {
            timestamp: Utc::now().timestamp_millis(),
            hash: "a".repeat(64),
            last_hash: "b".repeat(64),
            data: Vec::new(),
            nonce: 0,
            difficulty,
        }
    }

    #[test]
    fn test_genesis_is_fixed() {
        let genesis = Block::genesis();
        assert_eq!(genesis, Block::genesis());
        assert_eq!(genesis.timestamp, GENESIS_TIMESTAMP);
        assert_eq!(genesis.hash, GENESIS_HASH);
        assert_eq!(genesis.last_hash, GENESIS_LAST_HASH);
        assert_eq!(genesis.difficulty, INITIAL_DIFFICULTY);
        assert!(genesis.data.is_empty());
    }

    #[test]
    fn test_mined_block_satisfies_proof_of_work() {
        let last_block = Block::genesis();
        let data = vec![Transaction::reward(&Address::from("miner"))];

        let block = Block::mine(&last_block, data.clone());

        assert_eq!(block.last_hash, last_block.hash);
        assert_eq!(block.data, data);
        assert_eq!(block.hash, block.recompute_hash());
        assert!(block.meets_difficulty());

        let bytes = hex::decode(&block.hash).unwrap();
        assert!(leading_zero_bits(&bytes) >= block.difficulty);
    }

    #[test]
    fn test_mined_difficulty_is_adjusted() {
        let last_block = Block::genesis();
        let block = Block::mine(&last_block, Vec::new());

        let expected = Block::adjust_difficulty(&last_block, block.timestamp);
        assert_eq!(block.difficulty, expected);
    }

    #[test]
    fn test_adjust_difficulty_raises_for_quick_blocks() {
        let block = recent_block(5);
        let difficulty = Block::adjust_difficulty(&block, block.timestamp + MINE_RATE_MS - 100);
        assert_eq!(difficulty, 6);
    }

    #[test]
    fn test_adjust_difficulty_lowers_for_slow_blocks() {
        let block = recent_block(5);
        let difficulty = Block::adjust_difficulty(&block, block.timestamp + MINE_RATE_MS + 100);
        assert_eq!(difficulty, 4);
    }

    #[test]
    fn test_adjust_difficulty_has_a_floor() {
        let zero = recent_block(0);
        assert_eq!(Block::adjust_difficulty(&zero, zero.timestamp), 1);

        let one = recent_block(1);
        let slow = one.timestamp + MINE_RATE_MS * 10;
        assert_eq!(Block::adjust_difficulty(&one, slow), 1);
    }

    #[test]
    fn test_adjust_difficulty_with_extreme_timestamps() {
        let now = Utc::now().timestamp_millis();

        let mut ancient = recent_block(5);
        ancient.timestamp = i64::MIN;
        assert_eq!(Block::adjust_difficulty(&ancient, now), 4);

        let mut future = recent_block(5);
        future.timestamp = i64::MAX;
        assert_eq!(Block::adjust_difficulty(&future, now), 6);
        assert_eq!(Block::adjust_difficulty(&future, i64::MIN), 6);
    }

    #[test]
    fn test_mine_on_top_of_ancient_tip() {
        let mut last_block = recent_block(3);
        last_block.timestamp = i64::MIN;

        let block = Block::mine(&last_block, Vec::new());

        assert_eq!(block.difficulty, 2);
        assert!(block.meets_difficulty());
    }

    #[test]
    fn test_tampering_changes_hash() {
        let mut block = Block::mine(&Block::genesis(), Vec::new());
        let original = block.hash.clone();

        block.nonce += 1;
        assert_ne!(block.recompute_hash(), original);
    }

    #[test]
    fn test_meets_difficulty_rejects_bad_hex() {
        let mut block = recent_block(1);
        block.hash = "zz".to_string();
        assert!(!block.meets_difficulty());
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = AtomicBool::new(true);
        assert!(Block::mine_cancellable(&Block::genesis(), Vec::new(), &cancel).is_none());
    }

    #[test]
    fn test_cancel_interrupts_running_search() {
        // Unreachable difficulty so only cancellation ends the search
        let last_block = recent_block(60);
        let cancel = Arc::new(AtomicBool::new(false));

        let worker = {
            let cancel = cancel.clone();
            thread::spawn(move || Block::mine_cancellable(&last_block, Vec::new(), &cancel))
        };

        thread::sleep(Duration::from_millis(50));
        cancel.store(true, Ordering::Relaxed);

        assert!(worker.join().unwrap().is_none());
    }
}
