//! Ethereum implementation of the boss-fight `ChainGateway`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used, clippy::panic)]

pub use config::ConnectionConf;
pub use contract::GameContract;
pub use error::EthereumGatewayConnectionError;
pub use gateway::EthereumGateway;

mod config;
mod contract;
mod error;
mod gateway;
