// Blockchain module
//
// This module contains the ledger core:
// - Block structure and proof of work
// - Blockchain structure, validation and replacement
// - Transaction structure
// - Wallets and balance derivation
// - Transaction pool
// - Mining of pool transactions

pub mod block;
pub mod chain;
pub mod crypto;
pub mod miner;
pub mod pool;
pub mod transaction;
pub mod wallet;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Blockchain, ChainError};
pub use crypto::{Address, DigitalSignature};
pub use miner::{MinerError, TransactionMiner};
pub use pool::{TransactionMap, TransactionPool};
pub use transaction::{OutputMap, Transaction, TransactionError, TransactionInput};
pub use wallet::Wallet;
