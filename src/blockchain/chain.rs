use log::{error, info, warn};
use thiserror::Error;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::block::Block;
use super::crypto::Address;
use super::transaction::{Transaction, TransactionError};
use crate::config::MINING_REWARD;

/// Reasons a block or chain is rejected
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Chain does not start with the genesis block")]
    InvalidGenesis,

    #[error("Block {index}: last hash does not match the previous block")]
    BrokenLink { index: usize },

    #[error("Block {index}: stated hash does not match its contents")]
    HashMismatch { index: usize },

    #[error("Block {index}: difficulty jumped from {from} to {to}")]
    DifficultyJump { index: usize, from: u32, to: u32 },

    #[error("Block {index}: hash does not meet difficulty {difficulty}")]
    InsufficientWork { index: usize, difficulty: u32 },

    #[error("Incoming chain must be longer: {incoming} <= {local}")]
    NotLonger { incoming: usize, local: usize },

    #[error("Block {index}: more than one reward transaction")]
    MultipleRewards { index: usize },

    #[error("Block {index}: reward transaction {id} is malformed")]
    InvalidReward { index: usize, id: String },

    #[error("Block {index}: transaction {id} is invalid: {source}")]
    InvalidTransaction {
        index: usize,
        id: String,
        #[source]
        source: TransactionError,
    },

    #[error("Block {index}: more than one transaction from {address}")]
    DuplicateSender { index: usize, address: Address },

    #[error("Block does not extend the current tip")]
    StaleTip,
}

/// The local chain, shared between admission, mining and synchronisation
///
/// All mutations take the write lock, so readers only ever observe whole
/// chains.
#[derive(Debug)]
pub struct Blockchain {
    chain: RwLock<Vec<Block>>,

    /// Signalled when the tip is replaced so in-flight mining stops
    mining_cancel: Mutex<Arc<AtomicBool>>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// Creates a chain holding only the genesis block
    pub fn new() -> Self {
        Blockchain {
            chain: RwLock::new(vec![Block::genesis()]),
            mining_cancel: Mutex::new(Arc::new(AtomicBool::new(false))),
        }
    }

    /// Snapshot of the entire chain
    pub fn chain(&self) -> Vec<Block> {
        self.chain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The current tip
    pub fn last_block(&self) -> Block {
        let chain = self.chain.read().unwrap_or_else(PoisonError::into_inner);
        match chain.last() {
            Some(block) => block.clone(),
            None => Block::genesis(),
        }
    }

    pub fn len(&self) -> usize {
        self.chain.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancellation signal for mining attempts against the current tip
    pub fn mining_token(&self) -> Arc<AtomicBool> {
        self.mining_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mines `data` on top of the current tip and appends the result
    ///
    /// Returns `None` when the attempt was abandoned because the chain was
    /// replaced in the meantime.
    pub fn add_block(&self, data: Vec<Transaction>) -> Option<Block> {
        let cancel = self.mining_token();
        let last_block = self.last_block();

        let block = Block::mine_cancellable(&last_block, data, &cancel)?;

        match self.append(block.clone()) {
            Ok(()) => Some(block),
            Err(err) => {
                warn!("Discarding mined block: {}", err);
                None
            }
        }
    }

    /// Appends a block mined against the current tip
    pub fn append(&self, block: Block) -> Result<(), ChainError> {
        let mut chain = self.chain.write().unwrap_or_else(PoisonError::into_inner);

        let extends_tip = chain
            .last()
            .map_or(false, |tip| tip.hash == block.last_hash);
        if !extends_tip {
            return Err(ChainError::StaleTip);
        }

        info!(
            "Appended block {} at height {} (difficulty {}, {} transactions)",
            block.hash,
            chain.len(),
            block.difficulty,
            block.data.len()
        );
        chain.push(block);

        Ok(())
    }

    /// Replaces the local chain with `candidate` if it is longer and valid
    ///
    /// On success any mining attempt against the old tip is cancelled. On
    /// failure the local chain is left untouched and the reason is logged and
    /// returned.
    ///
    /// # Arguments
    ///
    /// * `candidate` - The chain offered by a peer, genesis first
    /// * `validate_transactions` - Whether block contents are checked as well
    ///
    /// # Returns
    ///
    /// `Ok(())` once the chain is swapped, or the first rule the candidate broke
    pub fn replace_chain(
        &self,
        candidate: Vec<Block>,
        validate_transactions: bool,
    ) -> Result<(), ChainError> {
        let result = self.try_replace_chain(candidate, validate_transactions);
        if let Err(err) = &result {
            error!("Rejected incoming chain: {}", err);
        }
        result
    }

    fn try_replace_chain(
        &self,
        candidate: Vec<Block>,
        validate_transactions: bool,
    ) -> Result<(), ChainError> {
        let local = self.len();
        if candidate.len() <= local {
            return Err(ChainError::NotLonger {
                incoming: candidate.len(),
                local,
            });
        }

        Self::validate_chain(&candidate)?;

        if validate_transactions {
            Self::validate_transaction_data(&candidate)?;
        }

        let mut chain = self.chain.write().unwrap_or_else(PoisonError::into_inner);

        // The local chain may have grown while the candidate was validated
        if candidate.len() <= chain.len() {
            return Err(ChainError::NotLonger {
                incoming: candidate.len(),
                local: chain.len(),
            });
        }

        info!(
            "Replacing chain of length {} with chain of length {}",
            chain.len(),
            candidate.len()
        );
        *chain = candidate;
        drop(chain);

        let mut cancel = self
            .mining_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cancel.store(true, Ordering::Relaxed);
        *cancel = Arc::new(AtomicBool::new(false));

        Ok(())
    }

    /// Structural and proof-of-work checks over a whole chain
    ///
    /// Stops at the first violation.
    pub fn validate_chain(chain: &[Block]) -> Result<(), ChainError> {
        match chain.first() {
            Some(first) if *first == Block::genesis() => {}
            _ => return Err(ChainError::InvalidGenesis),
        }

        for (index, pair) in chain.windows(2).enumerate() {
            let (previous, block) = (&pair[0], &pair[1]);
            let index = index + 1;

            if block.last_hash != previous.hash {
                return Err(ChainError::BrokenLink { index });
            }

            if block.hash != block.recompute_hash() {
                return Err(ChainError::HashMismatch { index });
            }

            if previous.difficulty.abs_diff(block.difficulty) > 1 {
                return Err(ChainError::DifficultyJump {
                    index,
                    from: previous.difficulty,
                    to: block.difficulty,
                });
            }

            if !block.meets_difficulty() {
                return Err(ChainError::InsufficientWork {
                    index,
                    difficulty: block.difficulty,
                });
            }
        }

        Ok(())
    }

    /// Like [`Blockchain::validate_chain`], logging the reason instead of returning it
    pub fn is_valid_chain(chain: &[Block]) -> bool {
        match Self::validate_chain(chain) {
            Ok(()) => true,
            Err(err) => {
                error!("Invalid chain: {}", err);
                false
            }
        }
    }

    /// Transaction rules for every block of `chain`
    ///
    /// Each block may hold one reward paying exactly the mining reward, its
    /// other transactions must be valid, and no sender may appear twice in a
    /// block. Spends of the same balance across different blocks are not
    /// detected here.
    pub fn validate_transaction_data(chain: &[Block]) -> Result<(), ChainError> {
        for (index, block) in chain.iter().enumerate() {
            let mut reward_count = 0;
            let mut senders = HashSet::new();

            for transaction in &block.data {
                if transaction.is_reward() {
                    reward_count += 1;
                    if reward_count > 1 {
                        return Err(ChainError::MultipleRewards { index });
                    }

                    let pays_reward = transaction.output_map.len() == 1
                        && transaction.output_total() == MINING_REWARD as u128;
                    if !pays_reward {
                        return Err(ChainError::InvalidReward {
                            index,
                            id: transaction.id.clone(),
                        });
                    }
                    continue;
                }

                transaction
                    .validate()
                    .map_err(|source| ChainError::InvalidTransaction {
                        index,
                        id: transaction.id.clone(),
                        source,
                    })?;

                if !senders.insert(&transaction.input.address) {
                    return Err(ChainError::DuplicateSender {
                        index,
                        address: transaction.input.address.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Like [`Blockchain::validate_transaction_data`], logging the reason
    pub fn is_valid_transaction_data(chain: &[Block]) -> bool {
        match Self::validate_transaction_data(chain) {
            Ok(()) => true,
            Err(err) => {
                error!("Invalid transaction data: {}", err);
                false
            }
        }
    }
}
