//! Chain-agnostic building blocks shared by the boss-fight relayer: the
//! submission types the game posts, the on-chain calls they turn into, and the
//! `ChainGateway` seam every RPC interaction goes through.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used, clippy::panic)]

pub use ethers_core::types::{Address, H256, U256};
pub use ethers_signers::LocalWallet;

pub use error::{GatewayError, GatewayResult};
pub use gas::apply_uplift;
pub use gateway::ChainGateway;
pub use types::*;

mod error;
/// Gas price and gas limit safety margins
pub mod gas;
mod gateway;
mod types;
