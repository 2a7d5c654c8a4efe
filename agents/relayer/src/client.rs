//! Typed client for the relayer endpoint, as used by the game.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::relayer::StatusReport;
use crate::server::relay::{EnqueueResponse, StatusResponse};
use crate::server::utils::ServerErrorBody;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport failure or an undecodable body
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// The relayer answered with a non-success status
    #[error("Relayer returned {status}: {error}")]
    Api {
        status: u16,
        error: String,
        details: Option<String>,
    },
}

/// Client for one relayer endpoint, e.g. `http://localhost:3000/api/relayer`
#[derive(Clone, Debug)]
pub struct RelayerClient {
    client: Client,
    endpoint: String,
}

impl RelayerClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Queue a boss hit credited to `account`
    pub async fn add_boss_hit(&self, account: &str) -> Result<EnqueueResponse, ClientError> {
        self.post(json!({ "type": "bossHit", "account": account }))
            .await
    }

    /// Queue a payout of `coin_count` reward tokens to `account`
    pub async fn add_reward(
        &self,
        account: &str,
        coin_count: u64,
    ) -> Result<EnqueueResponse, ClientError> {
        self.post(json!({ "type": "rewardToken", "account": account, "coinCount": coin_count }))
            .await
    }

    pub async fn status(&self) -> Result<StatusReport, ClientError> {
        let response = self.client.get(&self.endpoint).send().await?;
        let status: StatusResponse = decode(response).await?;
        Ok(status.data)
    }

    async fn post(&self, body: serde_json::Value) -> Result<EnqueueResponse, ClientError> {
        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let body: ServerErrorBody = response.json().await?;
    Err(ClientError::Api {
        status: status.as_u16(),
        error: body.error,
        details: body.details,
    })
}
