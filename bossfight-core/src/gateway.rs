use std::fmt::Debug;

use async_trait::async_trait;
use ethers_core::types::{Address, H256, U256};
use ethers_signers::LocalWallet;

use crate::{GameCall, GatewayResult, TxParams, TxReceipt};

/// Every interaction the relayer has with the node and the game contract.
///
/// Implementations must keep fault kinds apart (see [`crate::GatewayError`]):
/// the processor decides between resyncing a nonce, retiring a signer and
/// requeueing a request purely on the variant it gets back.
#[async_trait]
pub trait ChainGateway: Send + Sync + Debug {
    /// Chain id of the connected network. Used as the reachability probe.
    async fn get_network(&self) -> GatewayResult<u64>;

    /// Gas price currently quoted by the node
    async fn get_gas_price(&self) -> GatewayResult<U256>;

    /// Native balance of `address`
    async fn get_balance(&self, address: Address) -> GatewayResult<U256>;

    /// Next nonce the chain expects from `address`
    async fn get_transaction_count(&self, address: Address) -> GatewayResult<U256>;

    /// Estimate the gas `call` needs when sent from `from` with `params`
    async fn estimate_gas(
        &self,
        from: Address,
        call: &GameCall,
        params: &TxParams,
    ) -> GatewayResult<U256>;

    /// Sign `call` with `signer` and broadcast it, returning the tx hash
    async fn submit(
        &self,
        signer: &LocalWallet,
        call: &GameCall,
        params: &TxParams,
    ) -> GatewayResult<H256>;

    /// Wait until `tx_hash` has `confirmations` confirmations
    async fn await_confirmation(
        &self,
        tx_hash: H256,
        confirmations: usize,
    ) -> GatewayResult<TxReceipt>;

    /// Receipt of `tx_hash` if it was included, `Reverted` if it was included
    /// and failed
    async fn get_receipt(&self, tx_hash: H256) -> GatewayResult<Option<TxReceipt>>;

    /// Read-only `owner()` call on the game contract, used as a liveness probe
    async fn call_owner(&self) -> GatewayResult<Address>;
}
