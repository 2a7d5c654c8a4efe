use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::prelude::{Http, Middleware, PendingTransaction, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, TransactionReceipt, H256, U256,
};
use reqwest::{Client, Url};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument, warn};

use bossfight_core::{ChainGateway, GameCall, GatewayError, GatewayResult, TxParams, TxReceipt};

use crate::error::{from_contract_error, from_provider_error, from_wallet_error};
use crate::{ConnectionConf, EthereumGatewayConnectionError, GameContract};

const HTTP_CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// `ChainGateway` over a single HTTP JSON-RPC endpoint.
#[derive(Debug)]
pub struct EthereumGateway {
    provider: Arc<Provider<Http>>,
    contract: GameContract<Provider<Http>>,
    chain_id: OnceCell<u64>,
    conf: ConnectionConf,
}

impl EthereumGateway {
    /// Build a gateway from its connection settings. Does not touch the network.
    pub fn new(conf: ConnectionConf) -> Result<Self, EthereumGatewayConnectionError> {
        let http_client = Client::builder().timeout(HTTP_CLIENT_TIMEOUT).build()?;
        let parsed_url = conf
            .url
            .parse::<Url>()
            .map_err(|e| EthereumGatewayConnectionError::InvalidUrl(e, conf.url.clone()))?;
        let provider = Arc::new(
            Provider::new(Http::new_with_client(parsed_url, http_client))
                .interval(conf.polling_interval),
        );
        let contract = GameContract::new(conf.contract_address, provider.clone());
        Ok(Self {
            provider,
            contract,
            chain_id: OnceCell::new(),
            conf,
        })
    }

    async fn chain_id(&self) -> GatewayResult<u64> {
        self.chain_id
            .get_or_try_init(|| async {
                let chain_id = self
                    .provider
                    .get_chainid()
                    .await
                    .map_err(from_provider_error)?;
                Ok::<u64, GatewayError>(chain_id.as_u64())
            })
            .await
            .copied()
    }

    /// Build the unsigned legacy transaction for `call`.
    fn build_tx(
        &self,
        from: Address,
        call: &GameCall,
        params: &TxParams,
    ) -> GatewayResult<TypedTransaction> {
        let account = parse_account(call.account())?;
        let contract_call = match call {
            GameCall::BossHit { .. } => self.contract.boss_hit(account),
            GameCall::RewardToken { amount, .. } => self.contract.reward_token(account, *amount),
        };
        let mut contract_call = contract_call
            .legacy()
            .from(from)
            .nonce(params.nonce)
            .gas_price(params.gas_price);
        if let Some(gas_limit) = params.gas_limit {
            contract_call = contract_call.gas(gas_limit);
        }
        Ok(contract_call.tx)
    }
}

/// Map an inclusion receipt, treating status 0 as a revert
fn included(tx_hash: H256, receipt: TransactionReceipt) -> GatewayResult<TxReceipt> {
    if receipt.status.map(|s| s.as_u64()) == Some(0) {
        warn!(?tx_hash, "transaction reverted on chain");
        return Err(GatewayError::Reverted(format!(
            "transaction {tx_hash:?} mined with status 0"
        )));
    }
    Ok(TxReceipt {
        tx_hash,
        block_number: receipt.block_number.map(|n| n.as_u64()),
        gas_used: receipt.gas_used,
    })
}

fn parse_account(account: &str) -> GatewayResult<Address> {
    account
        .parse::<Address>()
        .map_err(|_| GatewayError::InvalidAccount(account.to_owned()))
}

#[async_trait]
impl ChainGateway for EthereumGateway {
    async fn get_network(&self) -> GatewayResult<u64> {
        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(from_provider_error)?
            .as_u64();
        // the first successful probe also primes the signing chain id
        let _ = self.chain_id.set(chain_id);
        Ok(chain_id)
    }

    async fn get_gas_price(&self) -> GatewayResult<U256> {
        self.provider.get_gas_price().await.map_err(from_provider_error)
    }

    async fn get_balance(&self, address: Address) -> GatewayResult<U256> {
        self.provider
            .get_balance(address, None)
            .await
            .map_err(from_provider_error)
    }

    async fn get_transaction_count(&self, address: Address) -> GatewayResult<U256> {
        self.provider
            .get_transaction_count(address, None)
            .await
            .map_err(from_provider_error)
    }

    #[instrument(skip(self, params), fields(nonce = %params.nonce), level = "debug")]
    async fn estimate_gas(
        &self,
        from: Address,
        call: &GameCall,
        params: &TxParams,
    ) -> GatewayResult<U256> {
        let tx = self.build_tx(from, call, params)?;
        self.provider
            .estimate_gas(&tx, None)
            .await
            .map_err(from_provider_error)
    }

    #[instrument(skip(self, signer, params), fields(from = ?signer.address(), nonce = %params.nonce))]
    async fn submit(
        &self,
        signer: &LocalWallet,
        call: &GameCall,
        params: &TxParams,
    ) -> GatewayResult<H256> {
        let chain_id = self.chain_id().await?;
        let mut tx = self.build_tx(signer.address(), call, params)?;
        tx.set_chain_id(chain_id);
        let signer = signer.clone().with_chain_id(chain_id);
        let signature = signer
            .sign_transaction(&tx)
            .await
            .map_err(from_wallet_error)?;
        let raw = tx.rlp_signed(&signature);

        info!(gas_price = %params.gas_price, gas_limit = ?params.gas_limit, "Dispatching transaction");
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(from_provider_error)?;
        let tx_hash = *pending;
        info!(?tx_hash, "Dispatched tx");
        Ok(tx_hash)
    }

    async fn await_confirmation(
        &self,
        tx_hash: H256,
        confirmations: usize,
    ) -> GatewayResult<TxReceipt> {
        let pending = PendingTransaction::new(tx_hash, self.provider.as_ref())
            .interval(self.conf.polling_interval)
            .confirmations(confirmations);

        match tokio::time::timeout(self.conf.confirmation_timeout, pending).await {
            Ok(Ok(Some(receipt))) => {
                let receipt = included(tx_hash, receipt)?;
                info!(?tx_hash, block_number = ?receipt.block_number, "confirmed transaction");
                Ok(receipt)
            }
            // ethers returns None once it can no longer find the tx in the mempool
            Ok(Ok(None)) => Err(GatewayError::Dropped(tx_hash)),
            Ok(Err(err)) => {
                error!(?tx_hash, error = ?err, "encountered error when waiting for receipt");
                Err(from_provider_error(err))
            }
            Err(_) => {
                error!(?tx_hash, "waiting for receipt timed out");
                Err(GatewayError::Timeout)
            }
        }
    }

    async fn get_receipt(&self, tx_hash: H256) -> GatewayResult<Option<TxReceipt>> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(from_provider_error)?
            .map(|receipt| included(tx_hash, receipt))
            .transpose()
    }

    async fn call_owner(&self) -> GatewayResult<Address> {
        let owner = self
            .contract
            .owner()
            .call()
            .await
            .map_err(from_contract_error)?;
        debug!(?owner, "Game contract owner");
        Ok(owner)
    }
}

#[cfg(test)]
mod tests {
    use ethers::types::transaction::eip2718::TypedTransaction;

    use super::*;

    fn gateway() -> EthereumGateway {
        let conf = ConnectionConf::new(
            "http://127.0.0.1:8545".to_owned(),
            "0x00000000000000000000000000000000000000aa".parse().unwrap(),
        );
        EthereumGateway::new(conf).unwrap()
    }

    #[test]
    fn rejects_unparseable_urls() {
        let conf = ConnectionConf::new("not a url".to_owned(), Address::zero());
        assert!(matches!(
            EthereumGateway::new(conf),
            Err(EthereumGatewayConnectionError::InvalidUrl(_, _))
        ));
    }

    #[test]
    fn builds_legacy_boss_hit_tx() {
        let gateway = gateway();
        let from: Address = "0x00000000000000000000000000000000000000bb".parse().unwrap();
        let call = GameCall::BossHit {
            account: "0x00000000000000000000000000000000000000cc".to_owned(),
        };
        let params = TxParams {
            nonce: U256::from(4),
            gas_price: U256::from(1_200),
            gas_limit: Some(U256::from(60_000)),
        };

        let tx = gateway.build_tx(from, &call, &params).unwrap();

        assert!(matches!(tx, TypedTransaction::Legacy(_)));
        assert_eq!(tx.from(), Some(&from));
        assert_eq!(tx.nonce(), Some(&U256::from(4)));
        assert_eq!(tx.gas_price(), Some(U256::from(1_200)));
        assert_eq!(tx.gas(), Some(&U256::from(60_000)));
        // bossHit(address) selector
        let data = tx.data().unwrap();
        assert_eq!(&data[..4], &ethers::utils::id("bossHit(address)")[..]);
    }

    #[test]
    fn invalid_account_is_its_own_fault() {
        let gateway = gateway();
        let call = GameCall::RewardToken {
            account: "0xABC".to_owned(),
            amount: U256::from(3),
        };
        let err = gateway
            .build_tx(Address::zero(), &call, &TxParams::default())
            .unwrap_err();
        assert_eq!(err, GatewayError::InvalidAccount("0xABC".to_owned()));
    }

    #[test]
    fn failed_receipt_is_a_revert() {
        let tx_hash = H256::repeat_byte(7);
        let receipt = TransactionReceipt {
            status: Some(0u64.into()),
            ..Default::default()
        };
        assert!(matches!(
            included(tx_hash, receipt),
            Err(GatewayError::Reverted(_))
        ));

        let receipt = TransactionReceipt {
            status: Some(1u64.into()),
            block_number: Some(12u64.into()),
            ..Default::default()
        };
        let receipt = included(tx_hash, receipt).unwrap();
        assert_eq!(receipt.tx_hash, tx_hash);
        assert_eq!(receipt.block_number, Some(12));
    }
}
