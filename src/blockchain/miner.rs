use log::{info, warn};
use thiserror::Error;
use tokio::task::{self, JoinError};

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::block::Block;
use super::chain::{Blockchain, ChainError};
use super::crypto::Address;
use super::pool::TransactionPool;
use super::transaction::{Transaction, TransactionError};
use super::wallet::Wallet;

/// Errors that can occur while mining
#[derive(Debug, Error)]
pub enum MinerError {
    #[error("Mining worker failed: {0}")]
    Worker(#[from] JoinError),
}

/// Mines pool transactions into the chain on behalf of the node wallet
///
/// The chain and the pool are shared with the request-serving layer; the
/// hash search itself runs on a blocking worker so they stay responsive.
/// Steps that read or write both of them run under one node lock, so a block
/// and the pruning of its transactions are observed together.
#[derive(Debug, Clone)]
pub struct TransactionMiner {
    blockchain: Arc<Blockchain>,
    pool: Arc<TransactionPool>,
    wallet: Arc<Wallet>,
    state_lock: Arc<Mutex<()>>,
}

impl TransactionMiner {
    pub fn new(blockchain: Arc<Blockchain>, pool: Arc<TransactionPool>, wallet: Arc<Wallet>) -> Self {
        TransactionMiner {
            blockchain,
            pool,
            wallet,
            state_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn blockchain(&self) -> &Arc<Blockchain> {
        &self.blockchain
    }

    pub fn pool(&self) -> &Arc<TransactionPool> {
        &self.pool
    }

    pub fn wallet(&self) -> &Arc<Wallet> {
        &self.wallet
    }

    fn lock_state(&self) -> MutexGuard<'_, ()> {
        self.state_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mines the pool's valid transactions plus a reward for the node wallet
    ///
    /// Only the first pending transaction of each sender is selected. Returns
    /// `Ok(None)` when the chain was replaced during the search or the mined
    /// block no longer extends the tip. Confirmed transactions leave the pool.
    ///
    /// # Returns
    ///
    /// The appended block, `None` if it was abandoned, or the worker failure
    pub async fn mine_transactions(&self) -> Result<Option<Block>, MinerError> {
        let (data, last_block, cancel) = {
            let _state = self.lock_state();

            let mut data = one_per_sender(self.pool.valid_transactions());
            data.push(Wallet::create_reward_transaction(self.wallet.address()));

            let cancel = self.blockchain.mining_token();
            (data, self.blockchain.last_block(), cancel)
        };

        info!(
            "Mining {} transactions on top of {}",
            data.len(),
            last_block.hash
        );

        let mined =
            task::spawn_blocking(move || Block::mine_cancellable(&last_block, data, &cancel))
                .await?;

        let block = match mined {
            Some(block) => block,
            None => {
                warn!("Mining attempt cancelled by a chain replacement");
                return Ok(None);
            }
        };

        {
            let _state = self.lock_state();

            if let Err(err) = self.blockchain.append(block.clone()) {
                warn!("Discarding mined block {}: {}", block.hash, err);
                return Ok(None);
            }
            self.pool.clear_confirmed(std::slice::from_ref(&block));
        }

        info!("Mined block {} with nonce {}", block.hash, block.nonce);
        Ok(Some(block))
    }

    /// Adopts `candidate` if it is a longer valid chain and prunes the pool
    pub fn sync_chain(&self, candidate: Vec<Block>) -> Result<(), ChainError> {
        let _state = self.lock_state();

        self.blockchain.replace_chain(candidate, true)?;
        self.pool.clear_confirmed(&self.blockchain.chain());
        Ok(())
    }

    /// Sends `amount` from the node wallet to `recipient`
    ///
    /// A pending transaction from the node wallet is extended rather than a
    /// second one being queued. Lookup, update and insertion happen under the
    /// node lock so concurrent transfers are never lost.
    pub fn transact(&self, recipient: Address, amount: u64) -> Result<Transaction, TransactionError> {
        let _state = self.lock_state();

        let transaction = match self.pool.existing_transaction(self.wallet.address()) {
            Some(mut existing) => {
                existing.update(&self.wallet, recipient, amount)?;
                existing
            }
            None => {
                let chain = self.blockchain.chain();
                self.wallet
                    .create_transaction(amount, recipient, Some(chain.as_slice()))?
            }
        };

        self.pool.set(transaction.clone());
        Ok(transaction)
    }

    /// Derived balance of the node wallet
    pub fn wallet_balance(&self) -> u64 {
        self.wallet.balance(&self.blockchain.chain())
    }
}

// A block may hold one transaction per sender; later ones wait for the next block
fn one_per_sender(transactions: Vec<Transaction>) -> Vec<Transaction> {
    let mut senders = HashSet::new();

    transactions
        .into_iter()
        .filter(|transaction| {
            let first = senders.insert(transaction.input.address.clone());
            if !first {
                warn!(
                    "Deferring transaction {}: sender {} already has one in this block",
                    transaction.id, transaction.input.address
                );
            }
            first
        })
        .collect()
}
