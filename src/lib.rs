//! A minimal proof-of-work ledger: blocks mined against an adaptive
//! difficulty, longest-valid-chain replacement, and a pool of signed
//! balance transfers.

pub mod api;
pub mod blockchain;
pub mod config;
