use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use bossfight_core::{Address, SubmissionId, SubmissionKind, SubmissionRequest, TxParams, H256};

/// Queued request as listed in `currentQueueItems`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct QueueItemSummary {
    #[serde(rename = "type")]
    pub kind: SubmissionKind,
    pub account: String,
    pub timestamp: i64,
}

impl From<&SubmissionRequest> for QueueItemSummary {
    fn from(request: &SubmissionRequest) -> Self {
        Self {
            kind: request.kind,
            account: request.account.clone(),
            timestamp: request.timestamp_millis(),
        }
    }
}

/// Full view of a queued or dead-lettered request
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRequest {
    #[serde(rename = "type")]
    pub kind: SubmissionKind,
    pub account: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coin_count: Option<u64>,
    pub timestamp: i64,
    pub attempts: u32,
    /// Broadcast transactions not yet known to be included or lost
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_tx_hashes: Vec<H256>,
}

impl From<&SubmissionRequest> for QueuedRequest {
    fn from(request: &SubmissionRequest) -> Self {
        Self {
            kind: request.kind,
            account: request.account.clone(),
            coin_count: request.amount,
            timestamp: request.timestamp_millis(),
            attempts: request.attempts,
            pending_tx_hashes: request
                .broadcast
                .as_ref()
                .map(|broadcast| broadcast.tx_hashes.clone())
                .unwrap_or_default(),
        }
    }
}

/// FIFO of pending submissions shared by the HTTP handlers and the processor.
///
/// Each operation is a single critical section; none of them awaits.
#[derive(Debug, Default)]
pub struct SubmissionQueue {
    items: Mutex<VecDeque<SubmissionRequest>>,
    dead_letters: Mutex<Vec<SubmissionRequest>>,
}

impl SubmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `request` and return the new length. Duplicates are kept.
    pub fn enqueue(&self, request: SubmissionRequest) -> usize {
        let mut items = self.items.lock();
        items.push_back(request);
        items.len()
    }

    pub fn peek_head(&self) -> Option<SubmissionRequest> {
        self.items.lock().front().cloned()
    }

    /// Remove the head, but only if it is the request `id`
    pub fn pop_head(&self, id: SubmissionId) -> Option<SubmissionRequest> {
        let mut items = self.items.lock();
        match items.front() {
            Some(head) if head.id == id => items.pop_front(),
            _ => None,
        }
    }

    /// Move the head to the tail, counting one more failed attempt.
    ///
    /// Returns `false` and leaves the queue untouched if the head is not `id`.
    pub fn requeue_head_to_tail(&self, id: SubmissionId) -> bool {
        let mut items = self.items.lock();
        match items.front() {
            Some(head) if head.id == id => {}
            _ => return false,
        }
        match items.pop_front() {
            Some(mut request) => {
                request.attempts += 1;
                items.push_back(request);
                true
            }
            None => false,
        }
    }

    /// Move the head, if it is `id`, to the dead-letter list
    pub fn dead_letter_head(&self, id: SubmissionId) -> Option<SubmissionRequest> {
        let mut request = self.pop_head(id)?;
        request.attempts += 1;
        self.dead_letters.lock().push(request.clone());
        Some(request)
    }

    /// Record on request `id` that `tx_hash` was broadcast for it
    pub fn record_broadcast(
        &self,
        id: SubmissionId,
        from: Address,
        params: &TxParams,
        tx_hash: H256,
    ) -> bool {
        self.with_request(id, |request| request.record_broadcast(from, params, tx_hash))
    }

    /// Forget the broadcasts of request `id` once none of them can be included
    pub fn clear_broadcast(&self, id: SubmissionId) -> bool {
        self.with_request(id, |request| request.broadcast = None)
    }

    pub fn has_broadcast(&self, id: SubmissionId) -> bool {
        self.items
            .lock()
            .iter()
            .any(|request| request.id == id && request.broadcast.is_some())
    }

    fn with_request(&self, id: SubmissionId, f: impl FnOnce(&mut SubmissionRequest)) -> bool {
        match self.items.lock().iter_mut().find(|request| request.id == id) {
            Some(request) => {
                f(request);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn summaries(&self) -> Vec<QueueItemSummary> {
        self.items.lock().iter().map(Into::into).collect()
    }

    pub fn items(&self) -> Vec<QueuedRequest> {
        self.items.lock().iter().map(Into::into).collect()
    }

    pub fn dead_letters(&self) -> Vec<QueuedRequest> {
        self.dead_letters.lock().iter().map(Into::into).collect()
    }
}
