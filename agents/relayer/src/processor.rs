use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use bossfight_core::{
    apply_uplift, Address, Broadcast, ChainGateway, GatewayError, SubmissionKind,
    SubmissionRequest, TxParams, TxReceipt, U256,
};

use crate::metrics::RelayerMetrics;
use crate::settings::ProcessorConf;
use crate::signer_pool::{SignerLease, SignerPool};
use crate::submission_queue::SubmissionQueue;

/// How a processing pass ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another pass held the processing flag
    AlreadyRunning,
    /// The signer pool could not be initialized; the queue is untouched
    InitializationFailed,
    /// The queue was emptied
    Drained,
    /// Every signer was busy
    NoSignerAvailable,
    /// The last signer was retired for lack of funds
    SignersExhausted,
}

impl PassOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassOutcome::AlreadyRunning => "already_running",
            PassOutcome::InitializationFailed => "initialization_failed",
            PassOutcome::Drained => "drained",
            PassOutcome::NoSignerAvailable => "no_signer_available",
            PassOutcome::SignersExhausted => "signers_exhausted",
        }
    }
}

/// Confirmed and failed submission totals, served by the status endpoint
#[derive(Debug, Default)]
pub struct SubmissionCounters {
    boss_hit: AtomicU64,
    reward_token: AtomicU64,
    total: AtomicU64,
    failed_attempts: AtomicU64,
}

impl SubmissionCounters {
    fn record_success(&self, kind: SubmissionKind) {
        match kind {
            SubmissionKind::BossHit => self.boss_hit.fetch_add(1, Ordering::Relaxed),
            SubmissionKind::RewardToken => self.reward_token.fetch_add(1, Ordering::Relaxed),
        };
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn boss_hit(&self) -> u64 {
        self.boss_hit.load(Ordering::Relaxed)
    }

    pub fn reward_token(&self) -> u64 {
        self.reward_token.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn failed_attempts(&self) -> u64 {
        self.failed_attempts.load(Ordering::Relaxed)
    }
}

/// Holds the processing flag; clears it when dropped, unwinding included.
struct ProcessingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// A submission known to be included on chain
struct Landed {
    receipt: TxReceipt,
    /// Signer that sent the included transaction
    from: Address,
    /// Chain nonce of `from` when it was read after the inclusion
    next_nonce: Option<U256>,
}

/// What an earlier broadcast leaves for the current attempt to do
enum Resolution {
    Landed(Landed),
    /// Send again at the earlier nonce, outbidding the earlier gas price
    Replace,
    /// None of the earlier transactions can be included any more
    Fresh,
}

/// What the pass should do after settling one attempt
enum Settled {
    Continue,
    Stop(PassOutcome),
}

/// Drains the submission queue, one request at a time, through the signer pool.
pub struct QueueProcessor {
    gateway: Arc<dyn ChainGateway>,
    pool: Arc<SignerPool>,
    queue: Arc<SubmissionQueue>,
    counters: Arc<SubmissionCounters>,
    metrics: Arc<RelayerMetrics>,
    conf: ProcessorConf,
    processing: AtomicBool,
}

impl Debug for QueueProcessor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueProcessor")
            .field("gateway", &self.gateway)
            .field("queue_length", &self.queue.len())
            .field("conf", &self.conf)
            .field("processing", &self.is_processing())
            .finish()
    }
}

impl QueueProcessor {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        pool: Arc<SignerPool>,
        queue: Arc<SubmissionQueue>,
        counters: Arc<SubmissionCounters>,
        metrics: Arc<RelayerMetrics>,
        conf: ProcessorConf,
    ) -> Self {
        Self {
            gateway,
            pool,
            queue,
            counters,
            metrics,
            conf,
            processing: AtomicBool::new(false),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Run processing passes until the queue is drained or a pass cannot
    /// make progress. A no-op returning `AlreadyRunning` while another pass
    /// holds the flag.
    pub async fn process(&self) -> PassOutcome {
        let mut last = None;
        loop {
            let Some(guard) = ProcessingGuard::acquire(&self.processing) else {
                return last.unwrap_or(PassOutcome::AlreadyRunning);
            };
            let outcome = self.run_pass().await;
            drop(guard);

            self.metrics.update_processing_passes_metric(outcome.as_str());
            self.metrics.update_queue_length_metric(self.queue.len());
            debug!(outcome = outcome.as_str(), "Processing pass finished");

            // requests enqueued between the last emptiness check and the
            // flag release would otherwise wait for the next trigger
            if outcome != PassOutcome::Drained || self.queue.is_empty() {
                return outcome;
            }
            last = Some(outcome);
        }
    }

    async fn run_pass(&self) -> PassOutcome {
        match self.pool.initialize(self.gateway.as_ref()).await {
            Ok(size) => self.metrics.update_signer_pool_size_metric(size),
            Err(err) => {
                warn!(?err, "Could not initialize signer pool, leaving queue intact");
                return PassOutcome::InitializationFailed;
            }
        }

        while let Some(request) = self.queue.peek_head() {
            // an earlier broadcast can only be replaced by the signer that sent it
            let lease = request
                .broadcast
                .as_ref()
                .and_then(|broadcast| self.pool.lease(broadcast.from))
                .or_else(|| self.pool.select_next());
            let Some(lease) = lease else {
                debug!("No idle signer available");
                return PassOutcome::NoSignerAvailable;
            };
            let address = lease.address();

            let result = self.attempt(&lease, &request).await;
            let settled = self.settle(address, &request, result).await;
            drop(lease);
            self.pool.advance_cursor(address);

            if let Settled::Stop(outcome) = settled {
                return outcome;
            }
            tokio::time::sleep(self.conf.submission_delay()).await;
        }
        PassOutcome::Drained
    }

    /// Submit `request` with the leased signer and wait for its confirmation
    #[instrument(skip_all, fields(id = %request.id, kind = %request.kind, signer = ?lease.address()))]
    async fn attempt(
        &self,
        lease: &SignerLease,
        request: &SubmissionRequest,
    ) -> Result<Landed, GatewayError> {
        let address = lease.address();
        let call = request.call();

        let mut gas_price = apply_uplift(self.gateway.get_gas_price().await?);
        let mut nonce = self.gateway.get_transaction_count(address).await?;
        if let Some(broadcast) = &request.broadcast {
            match self.resolve_broadcast(address, request, broadcast).await? {
                Resolution::Landed(landed) => return Ok(landed),
                Resolution::Replace => {
                    nonce = broadcast.nonce;
                    gas_price = gas_price.max(apply_uplift(broadcast.gas_price));
                }
                Resolution::Fresh => {}
            }
        }
        if self.pool.nonce(address) != Some(nonce) {
            self.pool.set_nonce(address, nonce);
        }

        let mut params = TxParams {
            nonce,
            gas_price,
            gas_limit: None,
        };
        let estimate = self.gateway.estimate_gas(address, &call, &params).await?;
        params.gas_limit = Some(apply_uplift(estimate));

        debug!(%nonce, %gas_price, gas_limit = ?params.gas_limit, "Submitting request");
        let tx_hash = self.gateway.submit(lease.wallet(), &call, &params).await?;
        self.queue
            .record_broadcast(request.id, address, &params, tx_hash);
        let receipt = self
            .gateway
            .await_confirmation(tx_hash, self.conf.confirmations)
            .await?;
        Ok(Landed {
            receipt,
            from: address,
            next_nonce: None,
        })
    }

    /// Decide what an earlier, unconfirmed broadcast of `request` means for
    /// this attempt.
    async fn resolve_broadcast(
        &self,
        address: Address,
        request: &SubmissionRequest,
        broadcast: &Broadcast,
    ) -> Result<Resolution, GatewayError> {
        // the nonce is read before the receipts so that an inclusion in
        // between is never mistaken for a loss
        let chain_nonce = self.gateway.get_transaction_count(broadcast.from).await?;
        if chain_nonce > broadcast.nonce {
            for tx_hash in &broadcast.tx_hashes {
                match self.gateway.get_receipt(*tx_hash).await {
                    Ok(Some(receipt)) => {
                        info!(?tx_hash, "Earlier broadcast was included");
                        return Ok(Resolution::Landed(Landed {
                            receipt,
                            from: broadcast.from,
                            next_nonce: Some(chain_nonce),
                        }));
                    }
                    Ok(None) | Err(GatewayError::Reverted(_)) => {}
                    Err(err) => return Err(err),
                }
            }
            debug!(
                from = ?broadcast.from,
                nonce = %broadcast.nonce,
                "Earlier broadcast can no longer be included, sending afresh"
            );
            self.queue.clear_broadcast(request.id);
            return Ok(Resolution::Fresh);
        }
        if address == broadcast.from {
            return Ok(Resolution::Replace);
        }
        // the original signer is gone or busy; the old transaction may still land
        Err(GatewayError::Timeout)
    }

    async fn settle(
        &self,
        address: Address,
        request: &SubmissionRequest,
        result: Result<Landed, GatewayError>,
    ) -> Settled {
        let kind = request.kind.as_str();
        let err = match result {
            Ok(Landed {
                receipt,
                from,
                next_nonce,
            }) => {
                let nonce = match next_nonce {
                    Some(nonce) => {
                        self.pool.set_nonce(from, nonce);
                        Some(nonce)
                    }
                    None => self.pool.increment_nonce(from),
                };
                if let Some(nonce) = nonce {
                    self.metrics
                        .update_signer_nonce_metric(&format!("{from:?}"), nonce.low_u64());
                }
                self.queue.pop_head(request.id);
                self.counters.record_success(request.kind);
                self.metrics.update_submissions_metric(kind, "confirmed");
                info!(
                    id = %request.id,
                    kind,
                    account = %request.account,
                    tx_hash = ?receipt.tx_hash,
                    block_number = ?receipt.block_number,
                    "Confirmed submission"
                );
                return Settled::Continue;
            }
            Err(err) => err,
        };

        self.counters.record_failure();
        warn!(id = %request.id, kind, signer = ?address, error = %err, "Submission attempt failed");

        // with a broadcast outstanding, a rejected replacement is retried
        // like any other failure so the head cannot stall on it
        if err.is_nonce_rejection() && !self.queue.has_broadcast(request.id) {
            self.metrics.update_submissions_metric(kind, "nonce_resynced");
            match self.gateway.get_transaction_count(address).await {
                Ok(nonce) => self.pool.set_nonce(address, nonce),
                Err(err) => warn!(signer = ?address, ?err, "Failed to resync signer nonce"),
            }
            return Settled::Continue;
        }

        if err.is_insufficient_funds() {
            self.metrics.update_submissions_metric(kind, "signer_retired");
            let remaining = self.pool.remove(address);
            self.metrics.update_signer_pool_size_metric(remaining);
            if remaining == 0 {
                error!("All relayers exhausted");
                return Settled::Stop(PassOutcome::SignersExhausted);
            }
            return Settled::Continue;
        }

        match self.conf.max_attempts {
            Some(max_attempts) if request.attempts + 1 >= max_attempts => {
                self.metrics.update_submissions_metric(kind, "dead_lettered");
                self.queue.dead_letter_head(request.id);
                warn!(id = %request.id, attempts = request.attempts + 1, "Moved request to dead letters");
            }
            _ => {
                self.metrics
                    .update_submissions_metric(kind, err.label());
                self.queue.requeue_head_to_tail(request.id);
            }
        }
        Settled::Continue
    }
}
