use chrono::Utc;
use log::error;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use std::collections::BTreeMap;

use super::crypto::{verify_signature, Address, CryptoError, DigitalSignature};
use super::wallet::Wallet;
use crate::config::{MINING_REWARD, REWARD_ADDRESS};

/// Mapping from recipient address to transferred amount
pub type OutputMap = BTreeMap<Address, u64>;

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Invalid sender address: {0}")]
    InvalidSenderAddress(String),

    #[error("Invalid recipient address: {0}")]
    InvalidRecipientAddress(String),

    #[error("Invalid output total: outputs sum to {output_total}, input amount is {input_amount}")]
    InvalidOutputTotal { output_total: u128, input_amount: u64 },

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// Who is spending, how much they held, and their signature over the outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TransactionInput {
    /// Milliseconds since the Unix epoch when the input was signed
    pub timestamp: i64,

    /// Sender's balance when the transaction was created
    pub amount: u64,

    /// Sender's address
    pub address: Address,

    /// Signature over the output map
    pub signature: DigitalSignature,
}

/// Represents a balance transfer in the blockchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Unique identifier for the transaction
    pub id: String,

    pub input: TransactionInput,

    /// Amount credited to each address, including the sender's change
    #[schema(value_type = Object)]
    pub output_map: OutputMap,
}

impl Transaction {
    /// Creates a signed transfer of `amount` from the wallet to `recipient`
    ///
    /// `balance` is the sender's current balance; what is not sent is
    /// returned to the sender as change.
    ///
    /// # Arguments
    ///
    /// * `sender_wallet` - The wallet that signs the transaction
    /// * `balance` - The sender's balance, used as the input amount
    /// * `recipient` - The address of the recipient
    /// * `amount` - The amount to transfer
    ///
    /// # Returns
    ///
    /// A signed Transaction, or `InsufficientFunds` / `InvalidRecipientAddress`
    pub fn new(
        sender_wallet: &Wallet,
        balance: u64,
        recipient: Address,
        amount: u64,
    ) -> Result<Self, TransactionError> {
        if amount > balance {
            return Err(TransactionError::InsufficientFunds {
                required: amount,
                available: balance,
            });
        }

        if &recipient == sender_wallet.address() {
            return Err(TransactionError::InvalidRecipientAddress(
                "Recipient must differ from the sender".to_string(),
            ));
        }

        let mut output_map = OutputMap::new();
        output_map.insert(recipient, amount);
        output_map.insert(sender_wallet.address().clone(), balance - amount);

        let input = Self::create_input(sender_wallet, balance, &output_map);

        Ok(Transaction {
            id: Uuid::new_v4().to_string(),
            input,
            output_map,
        })
    }

    /// Creates the mining reward for `miner`
    pub fn reward(miner: &Address) -> Self {
        let mut output_map = OutputMap::new();
        output_map.insert(miner.clone(), MINING_REWARD);

        Transaction {
            id: Uuid::new_v4().to_string(),
            input: TransactionInput {
                timestamp: Utc::now().timestamp_millis(),
                amount: MINING_REWARD,
                address: Address::from(REWARD_ADDRESS),
                signature: DigitalSignature::default(),
            },
            output_map,
        }
    }

    fn create_input(sender_wallet: &Wallet, balance: u64, output_map: &OutputMap) -> TransactionInput {
        TransactionInput {
            timestamp: Utc::now().timestamp_millis(),
            amount: balance,
            address: sender_wallet.address().clone(),
            signature: sender_wallet.sign(output_map),
        }
    }

    /// Sends a further `amount` to `recipient` out of the sender's change
    ///
    /// The input amount stays the same; the input is re-signed.
    pub fn update(
        &mut self,
        sender_wallet: &Wallet,
        recipient: Address,
        amount: u64,
    ) -> Result<(), TransactionError> {
        let sender = sender_wallet.address();

        if sender != &self.input.address {
            return Err(TransactionError::InvalidSenderAddress(
                "Wallet address does not match the transaction input".to_string(),
            ));
        }

        if &recipient == sender {
            return Err(TransactionError::InvalidRecipientAddress(
                "Recipient must differ from the sender".to_string(),
            ));
        }

        let remaining = self.output_map.get(sender).copied().unwrap_or(0);
        if amount > remaining {
            return Err(TransactionError::InsufficientFunds {
                required: amount,
                available: remaining,
            });
        }

        *self.output_map.entry(recipient).or_insert(0) += amount;
        self.output_map.insert(sender.clone(), remaining - amount);

        self.input = Self::create_input(sender_wallet, self.input.amount, &self.output_map);

        Ok(())
    }

    /// Whether this transaction pays a mining reward
    pub fn is_reward(&self) -> bool {
        self.input.address.0 == REWARD_ADDRESS
    }

    /// Sum of all outputs
    pub fn output_total(&self) -> u128 {
        self.output_map.values().map(|amount| *amount as u128).sum()
    }

    /// Checks that outputs add up to the input amount and the signature is genuine
    pub fn validate(&self) -> Result<(), TransactionError> {
        let output_total = self.output_total();
        if output_total != self.input.amount as u128 {
            return Err(TransactionError::InvalidOutputTotal {
                output_total,
                input_amount: self.input.amount,
            });
        }

        if !verify_signature(&self.input.address, &self.output_map, &self.input.signature)? {
            return Err(TransactionError::InvalidSignature);
        }

        Ok(())
    }

    /// Like [`Transaction::validate`], logging the failure instead of returning it
    pub fn is_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(err) => {
                error!("Invalid transaction from {}: {}", self.input.address, err);
                false
            }
        }
    }
}
