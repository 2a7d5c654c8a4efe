use std::time::Duration;

use derive_new::new;
use ethers::types::Address;

/// How long to wait for a confirmation unless configured otherwise
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(150);
/// How often a pending transaction is polled for its receipt
pub const PENDING_TRANSACTION_POLLING_INTERVAL: Duration = Duration::from_secs(2);

/// Connection settings for the ethereum gateway
#[derive(Clone, Debug, new)]
pub struct ConnectionConf {
    /// JSON-RPC endpoint
    pub url: String,
    /// Address of the game contract
    pub contract_address: Address,
    /// Upper bound on a single confirmation wait
    #[new(value = "DEFAULT_CONFIRMATION_TIMEOUT")]
    pub confirmation_timeout: Duration,
    /// Receipt polling interval
    #[new(value = "PENDING_TRANSACTION_POLLING_INTERVAL")]
    pub polling_interval: Duration,
}

impl ConnectionConf {
    /// Override the confirmation timeout
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Override the receipt polling interval
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }
}
