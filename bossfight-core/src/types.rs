use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use ethers_core::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two kinds of on-chain event the relayer exists to submit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubmissionKind {
    /// The player landed a hit on the boss
    BossHit,
    /// The player collected coins that are paid out as reward tokens
    RewardToken,
}

impl SubmissionKind {
    /// Name used on the wire and as a metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionKind::BossHit => "bossHit",
            SubmissionKind::RewardToken => "rewardToken",
        }
    }

    /// Parse the wire name, returning `None` for anything unsupported
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "bossHit" => Some(SubmissionKind::BossHit),
            "rewardToken" => Some(SubmissionKind::RewardToken),
            _ => None,
        }
    }
}

impl Display for SubmissionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-local identifier of a queued submission
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    /// Create a fresh random id
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for SubmissionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A pending request to submit one game event on behalf of a player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionRequest {
    /// Identifier used to pop or requeue exactly this request
    pub id: SubmissionId,
    /// What to submit
    pub kind: SubmissionKind,
    /// The player address the call benefits, as supplied by the client
    pub account: String,
    /// Reward units, only present for `RewardToken`
    pub amount: Option<u64>,
    /// Arrival time, for observability only
    pub enqueued_at: DateTime<Utc>,
    /// Number of failed attempts so far
    pub attempts: u32,
    /// Transactions broadcast for this request whose fate is still unknown
    pub broadcast: Option<Broadcast>,
}

impl SubmissionRequest {
    /// A boss-hit event for `account`
    pub fn boss_hit(account: impl Into<String>) -> Self {
        Self::new(SubmissionKind::BossHit, account.into(), None)
    }

    /// A reward-token event paying `amount` units to `account`
    pub fn reward_token(account: impl Into<String>, amount: u64) -> Self {
        Self::new(SubmissionKind::RewardToken, account.into(), Some(amount))
    }

    fn new(kind: SubmissionKind, account: String, amount: Option<u64>) -> Self {
        Self {
            id: SubmissionId::random(),
            kind,
            account,
            amount,
            enqueued_at: Utc::now(),
            attempts: 0,
            broadcast: None,
        }
    }

    /// Remember that `tx_hash` was broadcast from `from` with `params`.
    ///
    /// A broadcast at another signer or nonce starts a new record.
    pub fn record_broadcast(&mut self, from: Address, params: &TxParams, tx_hash: H256) {
        match &mut self.broadcast {
            Some(broadcast) if broadcast.from == from && broadcast.nonce == params.nonce => {
                broadcast.gas_price = broadcast.gas_price.max(params.gas_price);
                broadcast.tx_hashes.push(tx_hash);
            }
            _ => {
                self.broadcast = Some(Broadcast {
                    from,
                    nonce: params.nonce,
                    gas_price: params.gas_price,
                    tx_hashes: vec![tx_hash],
                })
            }
        }
    }

    /// Arrival time as milliseconds since the Unix epoch
    pub fn timestamp_millis(&self) -> i64 {
        self.enqueued_at.timestamp_millis()
    }

    /// The contract call this request turns into.
    ///
    /// A reward request without an amount pays zero units; the HTTP boundary
    /// rejects such requests before they are queued.
    pub fn call(&self) -> GameCall {
        match self.kind {
            SubmissionKind::BossHit => GameCall::BossHit {
                account: self.account.clone(),
            },
            SubmissionKind::RewardToken => GameCall::RewardToken {
                account: self.account.clone(),
                amount: U256::from(self.amount.unwrap_or_default()),
            },
        }
    }
}

/// Transactions sent for one request, all from the same signer at the same nonce.
///
/// At most one of them can be included. The request may only be sent at
/// another nonce once the chain has moved past `nonce` without including any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Broadcast {
    /// Signer that sent them
    pub from: Address,
    /// The nonce they share
    pub nonce: U256,
    /// Highest gas price used so far; a replacement has to outbid it
    pub gas_price: U256,
    /// Every hash broadcast at `nonce`, oldest first
    pub tx_hashes: Vec<H256>,
}

/// A state-changing call on the game contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameCall {
    /// `bossHit(account)`
    BossHit {
        /// Target player
        account: String,
    },
    /// `rewardToken(account, amount)`
    RewardToken {
        /// Target player
        account: String,
        /// Reward units
        amount: U256,
    },
}

impl GameCall {
    /// The player address embedded in the call
    pub fn account(&self) -> &str {
        match self {
            GameCall::BossHit { account } | GameCall::RewardToken { account, .. } => account,
        }
    }

    /// Which event kind the call submits
    pub fn kind(&self) -> SubmissionKind {
        match self {
            GameCall::BossHit { .. } => SubmissionKind::BossHit,
            GameCall::RewardToken { .. } => SubmissionKind::RewardToken,
        }
    }
}

/// Transaction parameters chosen by the processor for one attempt
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxParams {
    /// Nonce of the signing identity
    pub nonce: U256,
    /// Legacy gas price, already uplifted
    pub gas_price: U256,
    /// Gas limit; unset while estimating
    pub gas_limit: Option<U256>,
}

/// What the chain reported once a transaction was included
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxReceipt {
    /// Hash of the included transaction
    pub tx_hash: H256,
    /// Block it was included in
    pub block_number: Option<u64>,
    /// Gas used by the transaction
    pub gas_used: Option<U256>,
}
