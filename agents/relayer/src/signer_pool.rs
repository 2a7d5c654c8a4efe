use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use ethers::signers::Signer;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument, warn};

use bossfight_core::{Address, ChainGateway, LocalWallet, U256};

use crate::error::RelayerError;

/// One funded signing account of the pool
pub struct SignerIdentity {
    /// Address derived from the credential
    pub address: Address,
    credential: LocalWallet,
    /// Next nonce the relayer believes the chain expects
    pub nonce: U256,
    /// Whether a submission using this identity is in flight
    pub busy: bool,
}

impl Debug for SignerIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerIdentity")
            .field("address", &self.address)
            .field("nonce", &self.nonce)
            .field("busy", &self.busy)
            .finish_non_exhaustive()
    }
}

/// Public view of one identity, as served by the status endpoint
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerStatus {
    pub address: Address,
    pub nonce: u64,
    pub is_processing: bool,
}

#[derive(Debug, Default)]
struct PoolState {
    identities: Vec<SignerIdentity>,
    cursor: usize,
    /// Addresses dropped for lack of funds; never brought back
    retired: HashSet<Address>,
}

/// Exclusive use of one identity. Dropping the lease marks it idle again.
pub struct SignerLease {
    state: Arc<Mutex<PoolState>>,
    address: Address,
    wallet: LocalWallet,
}

impl SignerLease {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }
}

impl Debug for SignerLease {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerLease")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Drop for SignerLease {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        // the identity may have been retired while leased
        if let Some(identity) = state
            .identities
            .iter_mut()
            .find(|identity| identity.address == self.address)
        {
            identity.busy = false;
        }
    }
}

/// Round-robin pool of signing identities.
///
/// The pool is empty until [`SignerPool::initialize`] succeeds. Every
/// mutation happens inside one short critical section, so callers never
/// observe a half-updated identity.
pub struct SignerPool {
    credentials: Vec<LocalWallet>,
    state: Arc<Mutex<PoolState>>,
    init_lock: AsyncMutex<()>,
}

impl Debug for SignerPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerPool")
            .field("configured", &self.credentials.len())
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl SignerPool {
    pub fn new(credentials: Vec<LocalWallet>) -> Self {
        Self {
            credentials,
            state: Default::default(),
            init_lock: AsyncMutex::new(()),
        }
    }

    /// Probe the chain and load every funded credential.
    ///
    /// A no-op when the pool already holds identities. Concurrent callers
    /// wait for the first one instead of probing twice.
    #[instrument(skip_all, fields(configured = self.credentials.len()))]
    pub async fn initialize(&self, gateway: &dyn ChainGateway) -> Result<usize, RelayerError> {
        let _init = self.init_lock.lock().await;
        let current = self.len();
        if current > 0 {
            return Ok(current);
        }

        let chain_id = gateway
            .get_network()
            .await
            .map_err(RelayerError::RpcUnreachable)?;
        let owner = gateway
            .call_owner()
            .await
            .map_err(RelayerError::ContractProbeFailed)?;
        debug!(chain_id, ?owner, "Chain and game contract reachable");

        let retired = self.state.lock().retired.clone();
        let mut identities: Vec<SignerIdentity> = Vec::with_capacity(self.credentials.len());
        for wallet in &self.credentials {
            let address = wallet.address();
            if retired.contains(&address) || identities.iter().any(|i| i.address == address) {
                continue;
            }
            let nonce = match gateway.get_transaction_count(address).await {
                Ok(nonce) => nonce,
                Err(err) => {
                    warn!(?address, ?err, "Failed to fetch signer nonce, skipping signer");
                    continue;
                }
            };
            let balance = match gateway.get_balance(address).await {
                Ok(balance) => balance,
                Err(err) => {
                    warn!(?address, ?err, "Failed to fetch signer balance, skipping signer");
                    continue;
                }
            };
            if balance.is_zero() {
                warn!(?address, "Signer has no balance, skipping signer");
                continue;
            }
            debug!(?address, %nonce, %balance, "Loaded signer");
            identities.push(SignerIdentity {
                address,
                credential: wallet.clone(),
                nonce,
                busy: false,
            });
        }

        if identities.is_empty() {
            warn!("No funded signer found");
            return Err(RelayerError::NoFundedSigners);
        }

        let mut state = self.state.lock();
        state.identities = identities;
        state.cursor = 0;
        info!(signers = state.identities.len(), "Initialized signer pool");
        Ok(state.identities.len())
    }

    /// Lease the first idle identity at or after the cursor.
    ///
    /// `None` means every identity is busy or the pool is empty.
    pub fn select_next(&self) -> Option<SignerLease> {
        let mut state = self.state.lock();
        let len = state.identities.len();
        if len == 0 {
            return None;
        }
        let start = state.cursor % len;
        let index = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&index| !state.identities[index].busy)?;
        Some(self.mark_busy(&mut state.identities[index]))
    }

    /// Lease `address` itself, if it is still in the pool and idle
    pub fn lease(&self, address: Address) -> Option<SignerLease> {
        let mut state = self.state.lock();
        let identity = state
            .identities
            .iter_mut()
            .find(|identity| identity.address == address && !identity.busy)?;
        Some(self.mark_busy(identity))
    }

    fn mark_busy(&self, identity: &mut SignerIdentity) -> SignerLease {
        identity.busy = true;
        SignerLease {
            state: self.state.clone(),
            address: identity.address,
            wallet: identity.credential.clone(),
        }
    }

    /// Drop `address` for good and return how many identities remain.
    pub fn remove(&self, address: Address) -> usize {
        let mut state = self.state.lock();
        state.retired.insert(address);
        if let Some(index) = state.identities.iter().position(|i| i.address == address) {
            state.identities.remove(index);
            // keep pointing at the same successor
            if index < state.cursor {
                state.cursor -= 1;
            }
            if state.cursor >= state.identities.len() {
                state.cursor = 0;
            }
            warn!(?address, remaining = state.identities.len(), "Retired signer");
        }
        state.identities.len()
    }

    /// Move the cursor to the slot after `address`.
    ///
    /// If `address` was removed, the cursor already sits on the identity that
    /// took its slot and is left alone.
    pub fn advance_cursor(&self, address: Address) {
        let mut state = self.state.lock();
        let len = state.identities.len();
        if let Some(index) = state.identities.iter().position(|i| i.address == address) {
            state.cursor = (index + 1) % len;
        }
    }

    /// Overwrite the tracked nonce of `address` with the chain's value
    pub fn set_nonce(&self, address: Address, nonce: U256) {
        let mut state = self.state.lock();
        if let Some(identity) = state.identities.iter_mut().find(|i| i.address == address) {
            if identity.nonce != nonce {
                debug!(?address, tracked = %identity.nonce, chain = %nonce, "Resynced signer nonce");
            }
            identity.nonce = nonce;
        }
    }

    /// Bump the tracked nonce of `address` after a confirmed submission
    pub fn increment_nonce(&self, address: Address) -> Option<U256> {
        let mut state = self.state.lock();
        let identity = state.identities.iter_mut().find(|i| i.address == address)?;
        identity.nonce += U256::one();
        Some(identity.nonce)
    }

    pub fn nonce(&self, address: Address) -> Option<U256> {
        self.state
            .lock()
            .identities
            .iter()
            .find(|i| i.address == address)
            .map(|i| i.nonce)
    }

    pub fn snapshot(&self) -> Vec<RelayerStatus> {
        self.state
            .lock()
            .identities
            .iter()
            .map(|identity| RelayerStatus {
                address: identity.address,
                nonce: identity.nonce.low_u64(),
                is_processing: identity.busy,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cursor(&self) -> usize {
        self.state.lock().cursor
    }
}

#[cfg(test)]
mod tests {
    use bossfight_core::GatewayError;

    use super::*;
    use crate::test_utils::{test_wallets, MockChainGateway, TestChain};

    async fn initialized_pool(n: usize) -> (SignerPool, Vec<Address>) {
        let wallets = test_wallets(n);
        let chain = TestChain::funded(&wallets, 0);
        let addresses = wallets.iter().map(|w| w.address()).collect();
        let pool = SignerPool::new(wallets);
        pool.initialize(&chain).await.unwrap();
        (pool, addresses)
    }

    #[tokio::test]
    async fn test_initialize_loads_funded_signers_with_chain_nonces() {
        let wallets = test_wallets(3);
        let chain = TestChain::funded(&wallets, 7);
        chain.fund(wallets[1].address(), U256::zero());
        let pool = SignerPool::new(wallets.clone());

        assert_eq!(pool.initialize(&chain).await.unwrap(), 2);

        let snapshot = pool.snapshot();
        assert_eq!(
            snapshot,
            vec![
                RelayerStatus {
                    address: wallets[0].address(),
                    nonce: 7,
                    is_processing: false
                },
                RelayerStatus {
                    address: wallets[2].address(),
                    nonce: 7,
                    is_processing: false
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let wallets = test_wallets(2);
        let mut gateway = MockChainGateway::new();
        gateway.expect_get_network().times(1).returning(|| Ok(1));
        gateway
            .expect_call_owner()
            .times(1)
            .returning(|| Ok(Address::zero()));
        gateway
            .expect_get_transaction_count()
            .times(2)
            .returning(|_| Ok(U256::from(3)));
        gateway
            .expect_get_balance()
            .times(2)
            .returning(|_| Ok(U256::from(10)));
        let pool = SignerPool::new(wallets);

        assert_eq!(pool.initialize(&gateway).await.unwrap(), 2);
        assert_eq!(pool.initialize(&gateway).await.unwrap(), 2);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn test_initialize_skips_signers_whose_probe_fails() {
        let wallets = test_wallets(2);
        let broken = wallets[0].address();
        let mut gateway = MockChainGateway::new();
        gateway.expect_get_network().returning(|| Ok(1));
        gateway.expect_call_owner().returning(|| Ok(Address::zero()));
        gateway
            .expect_get_transaction_count()
            .returning(move |address| {
                if address == broken {
                    Err(GatewayError::Rpc("header not found".to_owned()))
                } else {
                    Ok(U256::zero())
                }
            });
        gateway
            .expect_get_balance()
            .returning(|_| Ok(U256::from(10)));
        let pool = SignerPool::new(wallets.clone());

        assert_eq!(pool.initialize(&gateway).await.unwrap(), 1);
        assert_eq!(pool.snapshot()[0].address, wallets[1].address());
        assert!(logs_contain("Failed to fetch signer nonce, skipping signer"));
    }

    #[tokio::test]
    async fn test_initialize_reports_unreachable_rpc() {
        let mut gateway = MockChainGateway::new();
        gateway
            .expect_get_network()
            .returning(|| Err(GatewayError::Rpc("connection refused".to_owned())));
        let pool = SignerPool::new(test_wallets(1));

        let err = pool.initialize(&gateway).await.unwrap_err();
        assert!(matches!(err, RelayerError::RpcUnreachable(_)));
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_initialize_reports_failed_contract_probe() {
        let chain = TestChain::funded(&test_wallets(1), 0);
        chain.set_owner_fails(true);
        let pool = SignerPool::new(test_wallets(1));

        let err = pool.initialize(&chain).await.unwrap_err();
        assert!(matches!(err, RelayerError::ContractProbeFailed(_)));
    }

    #[tokio::test]
    async fn test_initialize_fails_without_funded_signers() {
        let wallets = test_wallets(1);
        let chain = TestChain::default();
        let pool = SignerPool::new(wallets.clone());

        let err = pool.initialize(&chain).await.unwrap_err();
        assert!(matches!(err, RelayerError::NoFundedSigners));

        // funding later lets a retry succeed
        chain.fund(wallets[0].address(), U256::one());
        assert_eq!(pool.initialize(&chain).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_select_next_skips_busy_signers_and_lease_drop_releases() {
        let (pool, addresses) = initialized_pool(2).await;

        let first = pool.select_next().unwrap();
        assert_eq!(first.address(), addresses[0]);
        let second = pool.select_next().unwrap();
        assert_eq!(second.address(), addresses[1]);
        assert!(pool.select_next().is_none());
        assert!(pool.snapshot().iter().all(|s| s.is_processing));

        drop(first);
        assert!(!pool.snapshot()[0].is_processing);
        let again = pool.select_next().unwrap();
        assert_eq!(again.address(), addresses[0]);
    }

    #[tokio::test]
    async fn test_lease_takes_a_specific_idle_signer() {
        let (pool, addresses) = initialized_pool(3).await;

        let lease = pool.lease(addresses[2]).unwrap();
        assert_eq!(lease.address(), addresses[2]);
        assert!(pool.lease(addresses[2]).is_none());
        assert!(pool.lease(Address::zero()).is_none());
        assert_eq!(pool.cursor(), 0);

        drop(lease);
        pool.remove(addresses[2]);
        assert!(pool.lease(addresses[2]).is_none());
    }

    #[tokio::test]
    async fn test_select_next_on_empty_pool() {
        let pool = SignerPool::new(test_wallets(2));
        assert!(pool.select_next().is_none());
    }

    #[tokio::test]
    async fn test_cursor_rotates_round_robin() {
        let (pool, addresses) = initialized_pool(3).await;
        let mut used = vec![];
        for _ in 0..4 {
            let lease = pool.select_next().unwrap();
            let address = lease.address();
            drop(lease);
            pool.advance_cursor(address);
            used.push(address);
        }
        assert_eq!(
            used,
            vec![addresses[0], addresses[1], addresses[2], addresses[0]]
        );
    }

    #[tokio::test]
    async fn test_remove_keeps_cursor_on_successor_and_never_resurrects() {
        let wallets = test_wallets(3);
        let chain = TestChain::funded(&wallets, 0);
        let pool = SignerPool::new(wallets.clone());
        pool.initialize(&chain).await.unwrap();
        let addresses: Vec<_> = wallets.iter().map(|w| w.address()).collect();

        // cursor on index 1
        pool.advance_cursor(addresses[0]);
        let lease = pool.select_next().unwrap();
        assert_eq!(lease.address(), addresses[1]);

        assert_eq!(pool.remove(addresses[1]), 2);
        drop(lease);
        pool.advance_cursor(addresses[1]);
        assert_eq!(pool.select_next().unwrap().address(), addresses[2]);

        // removing everything and re-initializing leaves the retired one out
        pool.remove(addresses[0]);
        pool.remove(addresses[2]);
        assert!(pool.is_empty());
        assert!(matches!(
            pool.initialize(&chain).await,
            Err(RelayerError::NoFundedSigners)
        ));
    }

    #[tokio::test]
    async fn test_remove_before_cursor_shifts_cursor() {
        let (pool, addresses) = initialized_pool(3).await;
        pool.advance_cursor(addresses[1]);
        assert_eq!(pool.cursor(), 2);

        pool.remove(addresses[0]);
        assert_eq!(pool.cursor(), 1);
        assert_eq!(pool.select_next().unwrap().address(), addresses[2]);
    }

    #[tokio::test]
    async fn test_nonce_tracking() {
        let (pool, addresses) = initialized_pool(1).await;
        assert_eq!(pool.increment_nonce(addresses[0]), Some(U256::one()));
        pool.set_nonce(addresses[0], U256::from(9));
        assert_eq!(pool.nonce(addresses[0]), Some(U256::from(9)));
        assert_eq!(pool.increment_nonce(Address::zero()), None);
    }

    #[test]
    fn test_debug_output_hides_credentials() {
        let wallet = test_wallets(1).remove(0);
        let identity = SignerIdentity {
            address: wallet.address(),
            credential: wallet,
            nonce: U256::zero(),
            busy: false,
        };
        let rendered = format!("{identity:?}");
        assert!(!rendered.contains("credential"));
        assert!(!rendered.to_lowercase().contains(&format!("{:064x}", 1)));
    }
}
