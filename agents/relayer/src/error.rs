use bossfight_core::GatewayError;

/// Process-level faults of the relayer.
///
/// Per-request faults never surface here; the processor absorbs them by
/// resyncing, retiring or requeueing.
#[derive(Debug, thiserror::Error)]
pub enum RelayerError {
    /// The RPC endpoint did not answer the network probe
    #[error("RPC connection failed")]
    RpcUnreachable(#[source] GatewayError),
    /// The game contract did not answer the `owner()` probe
    #[error("Game contract check failed")]
    ContractProbeFailed(#[source] GatewayError),
    /// Initialization found no signer with a positive balance
    #[error("Failed to initialize relayer pool")]
    NoFundedSigners,
}

impl RelayerError {
    /// Underlying gateway message, if there is one, for the `details` field
    pub fn details(&self) -> Option<String> {
        match self {
            RelayerError::RpcUnreachable(err) | RelayerError::ContractProbeFailed(err) => {
                Some(err.to_string())
            }
            RelayerError::NoFundedSigners => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_carry_the_gateway_message() {
        let err = RelayerError::RpcUnreachable(GatewayError::Rpc("connection refused".to_owned()));
        assert_eq!(err.to_string(), "RPC connection failed");
        assert_eq!(err.details().as_deref(), Some("RPC error: connection refused"));
        assert_eq!(RelayerError::NoFundedSigners.details(), None);
    }
}
