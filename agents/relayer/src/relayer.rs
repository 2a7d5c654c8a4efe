use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Instrument};

use bossfight_core::{ChainGateway, LocalWallet, SubmissionRequest};

use crate::error::RelayerError;
use crate::metrics::RelayerMetrics;
use crate::processor::{PassOutcome, QueueProcessor, SubmissionCounters};
use crate::settings::ProcessorConf;
use crate::signer_pool::{RelayerStatus, SignerPool};
use crate::submission_queue::{QueueItemSummary, QueuedRequest, SubmissionQueue};

/// Queue state returned to a client right after it enqueued a request
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub is_processing: bool,
    pub current_relayer_index: usize,
    pub total_relayers: usize,
    pub current_queue_items: Vec<QueueItemSummary>,
}

/// Read-only status of the whole relayer
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub relayer_count: usize,
    pub queue_length: usize,
    pub is_processing: bool,
    pub boss_hit_transactions: u64,
    pub reward_token_transactions: u64,
    pub total_transactions: u64,
    pub current_relayer_index: usize,
    pub relayers: Vec<RelayerStatus>,
    pub current_queue: Vec<QueuedRequest>,
    pub failed_attempts: u64,
    pub dead_letters: Vec<QueuedRequest>,
}

/// The process-wide relayer: one signer pool, one queue, one processor.
pub struct RelayerService {
    gateway: Arc<dyn ChainGateway>,
    pool: Arc<SignerPool>,
    queue: Arc<SubmissionQueue>,
    counters: Arc<SubmissionCounters>,
    processor: Arc<QueueProcessor>,
    metrics: Arc<RelayerMetrics>,
}

impl Debug for RelayerService {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayerService")
            .field("pool", &self.pool)
            .field("processor", &self.processor)
            .finish_non_exhaustive()
    }
}

impl RelayerService {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        credentials: Vec<LocalWallet>,
        conf: ProcessorConf,
        metrics: Arc<RelayerMetrics>,
    ) -> Self {
        let pool = Arc::new(SignerPool::new(credentials));
        let queue = Arc::new(SubmissionQueue::new());
        let counters = Arc::new(SubmissionCounters::default());
        let processor = Arc::new(QueueProcessor::new(
            gateway.clone(),
            pool.clone(),
            queue.clone(),
            counters.clone(),
            metrics.clone(),
            conf,
        ));
        Self {
            gateway,
            pool,
            queue,
            counters,
            processor,
            metrics,
        }
    }

    /// Append `request` to the queue, returning the new length
    pub fn enqueue(&self, request: SubmissionRequest) -> usize {
        debug!(id = %request.id, kind = %request.kind, account = %request.account, "Enqueued request");
        let length = self.queue.enqueue(request);
        self.metrics.update_queue_length_metric(length);
        length
    }

    /// Make sure the pool is initialized, and the node and game contract respond.
    pub async fn ensure_ready(&self) -> Result<usize, RelayerError> {
        if self.pool.is_empty() {
            let size = self.pool.initialize(self.gateway.as_ref()).await?;
            self.metrics.update_signer_pool_size_metric(size);
            return Ok(size);
        }
        self.gateway
            .get_network()
            .await
            .map_err(RelayerError::RpcUnreachable)?;
        self.gateway
            .call_owner()
            .await
            .map_err(RelayerError::ContractProbeFailed)?;
        Ok(self.pool.len())
    }

    /// Start a processing pass in the background and return immediately.
    ///
    /// Redundant while a pass is already running.
    pub fn trigger(&self) {
        let processor = self.processor.clone();
        tokio::spawn(
            async move {
                match processor.process().await {
                    PassOutcome::SignersExhausted => {
                        warn!("Processing stopped, every signer is out of funds")
                    }
                    outcome => debug!(outcome = outcome.as_str(), "Processing finished"),
                }
            }
            .instrument(info_span!("queue_processor")),
        );
    }

    /// Run processing passes in the foreground
    pub async fn process(&self) -> PassOutcome {
        self.processor.process().await
    }

    pub fn queue_length(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_status(&self) -> QueueStatus {
        QueueStatus {
            is_processing: self.processor.is_processing(),
            current_relayer_index: self.pool.cursor(),
            total_relayers: self.pool.len(),
            current_queue_items: self.queue.summaries(),
        }
    }

    pub fn status(&self) -> StatusReport {
        let relayers = self.pool.snapshot();
        StatusReport {
            relayer_count: relayers.len(),
            queue_length: self.queue.len(),
            is_processing: self.processor.is_processing(),
            boss_hit_transactions: self.counters.boss_hit(),
            reward_token_transactions: self.counters.reward_token(),
            total_transactions: self.counters.total(),
            current_relayer_index: self.pool.cursor(),
            relayers,
            current_queue: self.queue.items(),
            failed_attempts: self.counters.failed_attempts(),
            dead_letters: self.queue.dead_letters(),
        }
    }

    pub fn metrics(&self) -> Arc<RelayerMetrics> {
        self.metrics.clone()
    }
}
