//! Core data model: accounts, transactions, and the queue they live in.
//!
//! This module only holds plain data. All mutation goes through
//! [`crate::store::Store`], which is the sole owner of a [`GlobalState`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use subxt::{tx::Signer as SignerT, SubstrateConfig};

/// Opaque signing handle for an account. `PairSigner` (and anything else
/// that implements `subxt`'s `Signer` trait) satisfies this.
pub type BoxedSigner = Arc<dyn SignerT<SubstrateConfig> + Send + Sync>;

/// A signing account in the pool.
#[derive(Clone)]
pub struct Account {
    pub address: String,
    pub signing_material: BoxedSigner,
    /// The next nonce to assign. Monotonically non-decreasing except for
    /// the pre-submission rollback in the submission driver.
    pub nonce: u64,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .field("nonce", &self.nonce)
            .finish()
    }
}

/// A dynamic runtime call: `module.method(params)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Call {
    pub module: String,
    pub method: String,
    pub params: Vec<serde_json::Value>,
}

pub type TxId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

/// A pending or in-flight transaction.
#[derive(Clone, Debug)]
pub struct Transaction {
    pub id: TxId,
    pub submitter_address: String,
    pub call: Call,
    pub assigned_nonce: u64,
    pub status: Status,
    pub retry_count: u32,
}

/// Two ordered sequences: not-yet-submitted and awaiting finalization.
///
/// Invariant: a transaction id appears in at most one of `pending` and
/// `processing`.
#[derive(Default, Clone)]
pub struct QueueState {
    pub pending: VecDeque<Transaction>,
    pub processing: HashMap<TxId, Transaction>,
}

impl QueueState {
    /// True if `id` is tracked in either queue.
    pub fn contains(&self, id: &str) -> bool {
        self.processing.contains_key(id) || self.pending.iter().any(|t| t.id == id)
    }
}

/// Accounts, their round-robin cursor, and the queues, all behind one lock
/// in [`crate::store::Store`].
#[derive(Default, Clone)]
pub struct GlobalState {
    pub accounts: Vec<Account>,
    pub next_index: usize,
    pub queues: QueueState,
}
