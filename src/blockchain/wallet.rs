use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::Serialize;

use super::block::Block;
use super::crypto::{canonical_bytes, Address, DigitalSignature};
use super::transaction::{Transaction, TransactionError};
use crate::config::STARTING_BALANCE;

/// Represents a wallet with a keypair
///
/// The wallet stores no balance; it is derived from chain history on demand.
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    address: Address,
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn new() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let verifying_key = VerifyingKey::from(&signing_key);
        let address = Address::from_public_key(&verifying_key);

        Wallet {
            signing_key,
            verifying_key,
            address,
        }
    }

    /// Gets the wallet's address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Gets the wallet's public key
    pub fn public_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Signs the canonical encoding of `payload` with the wallet's private key
    pub fn sign<T: Serialize + ?Sized>(&self, payload: &T) -> DigitalSignature {
        let signature = self.signing_key.sign(&canonical_bytes(payload));
        DigitalSignature::from_signature(&signature)
    }

    /// This wallet's balance according to `chain`
    pub fn balance(&self, chain: &[Block]) -> u64 {
        Self::calculate_balance(chain, &self.address)
    }

    /// Replays `chain` to derive the balance of `address`
    ///
    /// A block holding a transaction sent by `address` resets the balance to
    /// that block's outputs to `address`: the sender's change plus whatever
    /// else the block credits it. Any other block only adds its outputs.
    ///
    /// # Arguments
    ///
    /// * `chain` - The chain to replay, genesis first
    /// * `address` - The address whose balance is wanted
    ///
    /// # Returns
    ///
    /// The balance, starting from `STARTING_BALANCE` for unseen addresses
    pub fn calculate_balance(chain: &[Block], address: &Address) -> u64 {
        let mut balance = STARTING_BALANCE;

        for block in chain {
            let mut has_sent = false;
            let mut block_outputs: u64 = 0;

            for transaction in &block.data {
                if &transaction.input.address == address {
                    has_sent = true;
                }
                if let Some(amount) = transaction.output_map.get(address) {
                    block_outputs = block_outputs.saturating_add(*amount);
                }
            }

            balance = if has_sent {
                block_outputs
            } else {
                balance.saturating_add(block_outputs)
            };
        }

        balance
    }

    /// Creates a transfer of `amount` to `recipient`
    ///
    /// With a chain the balance is replayed from it first; without one the
    /// wallet is assumed to hold the starting balance.
    pub fn create_transaction(
        &self,
        amount: u64,
        recipient: Address,
        chain: Option<&[Block]>,
    ) -> Result<Transaction, TransactionError> {
        let balance = match chain {
            Some(chain) => self.balance(chain),
            None => STARTING_BALANCE,
        };

        Transaction::new(self, balance, recipient, amount)
    }

    /// Creates the reward paid to `miner_address` for mining a block
    pub fn create_reward_transaction(miner_address: &Address) -> Transaction {
        Transaction::reward(miner_address)
    }
}
