use ethers::contract::ContractError;
use ethers::providers::{Middleware, ProviderError};
use ethers::signers::WalletError;
use thiserror::Error;

use bossfight_core::GatewayError;

/// An error when connecting to an ethereum provider.
#[derive(Error, Debug)]
pub enum EthereumGatewayConnectionError {
    /// Underlying reqwest lib threw an error
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),
    /// A URL string could not be parsed
    #[error("Failed to parse url {1:?}: {0}")]
    InvalidUrl(url::ParseError, String),
}

pub(crate) fn from_provider_error(err: ProviderError) -> GatewayError {
    GatewayError::from_rpc_message(err.to_string())
}

pub(crate) fn from_contract_error<M: Middleware>(err: ContractError<M>) -> GatewayError {
    match err.as_revert() {
        Some(data) => GatewayError::Reverted(format!("execution reverted: {data}")),
        None => GatewayError::from_rpc_message(err.to_string()),
    }
}

pub(crate) fn from_wallet_error(err: WalletError) -> GatewayError {
    GatewayError::Rpc(format!("Failed to sign transaction: {err}"))
}
