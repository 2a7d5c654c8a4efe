use ethers_core::types::H256;

/// Result of a chain gateway operation
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Faults surfaced by a [`crate::ChainGateway`].
///
/// The kinds are kept apart so the queue processor can tell a stale nonce
/// from an underfunded signer from a contract rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The node rejected the nonce (stale, already used, or a replacement
    /// that was underpriced)
    #[error("Nonce rejected: {0}")]
    NonceRejected(String),
    /// The signing account cannot pay for the transaction
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    /// The contract call reverted, either on estimation or once mined
    #[error("Transaction reverted: {0}")]
    Reverted(String),
    /// The target account is not a valid address
    #[error("Invalid account address {0:?}")]
    InvalidAccount(String),
    /// No confirmation was observed in time
    #[error("Timed out waiting for confirmation")]
    Timeout,
    /// The node stopped tracking a broadcast transaction
    #[error("Transaction {0:?} was dropped")]
    Dropped(H256),
    /// Transport, JSON-RPC or decoding fault
    #[error("RPC error: {0}")]
    Rpc(String),
}

/// Node phrasings of a rejected nonce, lower-cased with underscores as spaces
const NONCE_REJECTIONS: &[&str] = &[
    "nonce too low",
    "nonce too high",
    "nonce has already been used",
    "nonce expired",
    "already known",
    "replacement transaction underpriced",
];

impl GatewayError {
    /// Categorize an error message returned by a node.
    ///
    /// Node implementations disagree on wording, so matching is done on
    /// lower-cased text with underscores treated as spaces. Funding and revert
    /// faults take precedence over nonce wording.
    pub fn from_rpc_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let msg = message.to_ascii_lowercase().replace('_', " ");
        if msg.contains("insufficient funds") || msg.contains("insufficient balance") {
            GatewayError::InsufficientFunds(message)
        } else if msg.contains("revert") {
            GatewayError::Reverted(message)
        } else if NONCE_REJECTIONS.iter().any(|phrase| msg.contains(phrase)) {
            GatewayError::NonceRejected(message)
        } else {
            GatewayError::Rpc(message)
        }
    }

    /// Whether the fault means the signer's tracked nonce must be resynced
    pub fn is_nonce_rejection(&self) -> bool {
        matches!(self, GatewayError::NonceRejected(_))
    }

    /// Whether the fault means the signer can no longer pay for gas
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, GatewayError::InsufficientFunds(_))
    }

    /// Short label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            GatewayError::NonceRejected(_) => "nonce_rejected",
            GatewayError::InsufficientFunds(_) => "insufficient_funds",
            GatewayError::Reverted(_) => "reverted",
            GatewayError::InvalidAccount(_) => "invalid_account",
            GatewayError::Timeout => "timeout",
            GatewayError::Dropped(_) => "dropped",
            GatewayError::Rpc(_) => "rpc",
        }
    }
}
