use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use ethers::signers::Signer;
use parking_lot::Mutex;

use bossfight_core::{
    Address, ChainGateway, GameCall, GatewayError, GatewayResult, LocalWallet, TxParams,
    TxReceipt, H256, U256,
};

use crate::metrics::RelayerMetrics;
use crate::settings::ProcessorConf;

mockall::mock! {
    pub ChainGateway {}

    #[async_trait]
    impl ChainGateway for ChainGateway {
        async fn get_network(&self) -> GatewayResult<u64>;
        async fn get_gas_price(&self) -> GatewayResult<U256>;
        async fn get_balance(&self, address: Address) -> GatewayResult<U256>;
        async fn get_transaction_count(&self, address: Address) -> GatewayResult<U256>;
        async fn estimate_gas(
            &self,
            from: Address,
            call: &GameCall,
            params: &TxParams,
        ) -> GatewayResult<U256>;
        async fn submit(
            &self,
            signer: &LocalWallet,
            call: &GameCall,
            params: &TxParams,
        ) -> GatewayResult<H256>;
        async fn await_confirmation(
            &self,
            tx_hash: H256,
            confirmations: usize,
        ) -> GatewayResult<TxReceipt>;
        async fn get_receipt(&self, tx_hash: H256) -> GatewayResult<Option<TxReceipt>>;
        async fn call_owner(&self) -> GatewayResult<Address>;
    }
}

impl std::fmt::Debug for MockChainGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockChainGateway")
    }
}

/// Deterministic wallets built from the private keys 1..=n
pub fn test_wallets(n: usize) -> Vec<LocalWallet> {
    (1..=n)
        .map(|i| format!("{i:064x}").parse::<LocalWallet>().unwrap())
        .collect()
}

pub fn test_metrics() -> Arc<RelayerMetrics> {
    Arc::new(RelayerMetrics::dummy_instance())
}

/// Processor settings with a short delay so scenario tests stay fast
pub fn fast_processor_conf() -> ProcessorConf {
    ProcessorConf {
        submission_delay_ms: 5,
        confirmations: 1,
        confirmation_timeout_secs: 5,
        max_attempts: None,
    }
}

/// A transaction accepted by the in-memory chain
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmedTx {
    pub from: Address,
    pub call: GameCall,
    pub params: TxParams,
}

#[derive(Debug)]
struct TestChainState {
    nonces: HashMap<Address, U256>,
    balances: HashMap<Address, U256>,
    gas_price: U256,
    gas_estimate: U256,
    network_down: bool,
    owner_fails: bool,
    /// transactions that land from elsewhere right before the next submit
    external_txs: HashMap<Address, u64>,
    submit_faults: VecDeque<GatewayError>,
    estimate_faults: VecDeque<GatewayError>,
    confirmation_faults: VecDeque<GatewayError>,
    /// broadcasts that are accepted but never included
    lost_broadcasts: u32,
    receipts: HashMap<H256, TxReceipt>,
    confirmed: Vec<ConfirmedTx>,
    submitted: Vec<ConfirmedTx>,
    next_hash: u64,
}

/// In-memory chain that enforces nonces and records what was included.
///
/// An accepted broadcast is included right away; waiting for it only fails
/// when a confirmation fault was queued.
#[derive(Debug)]
pub struct TestChain {
    state: Mutex<TestChainState>,
}

impl Default for TestChain {
    fn default() -> Self {
        Self {
            state: Mutex::new(TestChainState {
                nonces: HashMap::new(),
                balances: HashMap::new(),
                gas_price: U256::from(1_000_000_000u64),
                gas_estimate: U256::from(50_000),
                network_down: false,
                owner_fails: false,
                external_txs: HashMap::new(),
                submit_faults: VecDeque::new(),
                estimate_faults: VecDeque::new(),
                confirmation_faults: VecDeque::new(),
                lost_broadcasts: 0,
                receipts: HashMap::new(),
                confirmed: Vec::new(),
                submitted: Vec::new(),
                next_hash: 1,
            }),
        }
    }
}

impl TestChain {
    /// A chain where every wallet holds one ether and starts at `nonce`
    pub fn funded(wallets: &[LocalWallet], nonce: u64) -> Self {
        let chain = Self::default();
        for wallet in wallets {
            chain.fund(wallet.address(), U256::exp10(18));
            chain.set_nonce(wallet.address(), nonce);
        }
        chain
    }

    pub fn fund(&self, address: Address, balance: U256) {
        self.state.lock().balances.insert(address, balance);
    }

    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.state.lock().nonces.insert(address, nonce.into());
    }

    pub fn nonce(&self, address: Address) -> U256 {
        self.state
            .lock()
            .nonces
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_network_down(&self, down: bool) {
        self.state.lock().network_down = down;
    }

    pub fn set_owner_fails(&self, fails: bool) {
        self.state.lock().owner_fails = fails;
    }

    pub fn set_gas(&self, gas_price: u64, gas_estimate: u64) {
        let mut state = self.state.lock();
        state.gas_price = gas_price.into();
        state.gas_estimate = gas_estimate.into();
    }

    /// Make `count` foreign transactions from `address` land right before its next submit
    pub fn land_external_txs(&self, address: Address, count: u64) {
        self.state.lock().external_txs.insert(address, count);
    }

    /// Fail the next submit with `err`, whoever sends it
    pub fn push_submit_fault(&self, err: GatewayError) {
        self.state.lock().submit_faults.push_back(err);
    }

    /// Fail the next gas estimate with `err`
    pub fn push_estimate_fault(&self, err: GatewayError) {
        self.state.lock().estimate_faults.push_back(err);
    }

    /// Fail the next wait for a confirmation with `err`; the transaction
    /// itself is still included
    pub fn push_confirmation_fault(&self, err: GatewayError) {
        self.state.lock().confirmation_faults.push_back(err);
    }

    /// Accept the next broadcast without ever including it
    pub fn lose_next_broadcast(&self) {
        self.state.lock().lost_broadcasts += 1;
    }

    /// Transactions included on chain, in order
    pub fn confirmed(&self) -> Vec<ConfirmedTx> {
        self.state.lock().confirmed.clone()
    }

    /// Every broadcast the chain accepted, included or not
    pub fn submitted(&self) -> Vec<ConfirmedTx> {
        self.state.lock().submitted.clone()
    }
}

#[async_trait]
impl ChainGateway for TestChain {
    async fn get_network(&self) -> GatewayResult<u64> {
        if self.state.lock().network_down {
            return Err(GatewayError::Rpc("connection refused".to_owned()));
        }
        Ok(31337)
    }

    async fn get_gas_price(&self) -> GatewayResult<U256> {
        Ok(self.state.lock().gas_price)
    }

    async fn get_balance(&self, address: Address) -> GatewayResult<U256> {
        Ok(self
            .state
            .lock()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn get_transaction_count(&self, address: Address) -> GatewayResult<U256> {
        Ok(self.nonce(address))
    }

    async fn estimate_gas(
        &self,
        _from: Address,
        _call: &GameCall,
        _params: &TxParams,
    ) -> GatewayResult<U256> {
        let mut state = self.state.lock();
        match state.estimate_faults.pop_front() {
            Some(err) => Err(err),
            None => Ok(state.gas_estimate),
        }
    }

    async fn submit(
        &self,
        signer: &LocalWallet,
        call: &GameCall,
        params: &TxParams,
    ) -> GatewayResult<H256> {
        let from = signer.address();
        let mut state = self.state.lock();
        if let Some(count) = state.external_txs.remove(&from) {
            let nonce = state.nonces.entry(from).or_default();
            *nonce += U256::from(count);
        }
        if let Some(err) = state.submit_faults.pop_front() {
            return Err(err);
        }
        let chain_nonce = state.nonces.get(&from).copied().unwrap_or_default();
        if params.nonce != chain_nonce {
            return Err(GatewayError::from_rpc_message(format!(
                "nonce too low: address {from:?}, tx: {} state: {chain_nonce}",
                params.nonce
            )));
        }

        let tx_hash = H256::from_low_u64_be(state.next_hash);
        state.next_hash += 1;
        let tx = ConfirmedTx {
            from,
            call: call.clone(),
            params: params.clone(),
        };
        state.submitted.push(tx.clone());
        if state.lost_broadcasts > 0 {
            state.lost_broadcasts -= 1;
            return Ok(tx_hash);
        }

        state.nonces.insert(from, chain_nonce + 1);
        state.confirmed.push(tx);
        let receipt = TxReceipt {
            tx_hash,
            block_number: Some(state.confirmed.len() as u64),
            gas_used: Some(U256::from(21_000)),
        };
        state.receipts.insert(tx_hash, receipt);
        Ok(tx_hash)
    }

    async fn await_confirmation(
        &self,
        tx_hash: H256,
        _confirmations: usize,
    ) -> GatewayResult<TxReceipt> {
        let mut state = self.state.lock();
        if let Some(err) = state.confirmation_faults.pop_front() {
            return Err(err);
        }
        state
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or(GatewayError::Dropped(tx_hash))
    }

    async fn get_receipt(&self, tx_hash: H256) -> GatewayResult<Option<TxReceipt>> {
        Ok(self.state.lock().receipts.get(&tx_hash).cloned())
    }

    async fn call_owner(&self) -> GatewayResult<Address> {
        if self.state.lock().owner_fails {
            return Err(GatewayError::Reverted("execution reverted".to_owned()));
        }
        Ok(Address::repeat_byte(0xaa))
    }
}
