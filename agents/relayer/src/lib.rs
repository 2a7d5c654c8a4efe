//! Server-side relayer for the boss-fight game.
//!
//! Players never pay gas: the game posts boss hits and reward payouts to the
//! relayer, which queues them and submits each one to the game contract from
//! a rotating pool of funded signers, keeping every signer's nonce in step
//! with the chain.

#![forbid(unsafe_code)]

pub mod client;
pub mod error;
pub mod metrics;
pub mod processor;
pub mod relayer;
pub mod server;
pub mod settings;
pub mod signer_pool;
pub mod submission_queue;

#[cfg(test)]
mod test_utils;

pub use client::{ClientError, RelayerClient};
pub use error::RelayerError;
pub use processor::PassOutcome;
pub use relayer::{QueueStatus, RelayerService, StatusReport};
pub use settings::RelayerSettings;
