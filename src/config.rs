use log::warn;
use std::env;

/// Target milliseconds between two consecutive blocks
pub const MINE_RATE_MS: i64 = 1000;

/// Difficulty of the genesis block (leading zero bits)
pub const INITIAL_DIFFICULTY: u32 = 3;

/// Balance every address holds before any chain history
pub const STARTING_BALANCE: u64 = 1000;

/// Amount credited to the miner of a block
pub const MINING_REWARD: u64 = 50;

/// Reserved input address of reward transactions
pub const REWARD_ADDRESS: &str = "*authorized-reward*";

/// Fixed genesis block fields
pub const GENESIS_TIMESTAMP: i64 = 1;
pub const GENESIS_LAST_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000001";
pub const GENESIS_NONCE: u64 = 0;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;

/// Address the HTTP server binds to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Reads `HOST` and `PORT` from the environment, falling back to the defaults
    pub fn from_env() -> Self {
        Self::from_vars(env::var("HOST").ok(), env::var("PORT").ok())
    }

    fn from_vars(host: Option<String>, port: Option<String>) -> Self {
        let host = host.unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match port {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Invalid PORT value {:?}, using {}", raw, DEFAULT_PORT);
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        ServerConfig { host, port }
    }
}
