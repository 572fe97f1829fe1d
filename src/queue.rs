//! Queue Manager (C4): owns the transaction lifecycle state machine.
//!
//! ```text
//!               enqueue
//!                  |
//!                  v
//!             +---------+  submit-accepted   +------------+
//!             | Pending |-------------------->| Processing |
//!             +----+----+                    +-----+------+
//!                  | submit-rejected               | finalized-ok
//!                  v                               v
//!             +--------+                      +-----------+
//!             | Failed |<---- finalized-err ---| Confirmed |
//!             +---+----+                      +-----------+
//!                 | retry (count<limit)
//!                 +-- reset to Pending, reassign nonce
//! ```

use std::sync::Arc;

use crate::error::EngineError;
use crate::model::{Call, Status, Transaction, TxId};
use crate::store::Store;

pub struct Queue {
    store: Arc<Store>,
}

impl Queue {
    pub fn new(store: Arc<Store>) -> Self {
        Queue { store }
    }

    /// Selects an account via the pool, assigns a nonce inside one
    /// mutation, appends a Pending transaction, and returns its id.
    pub async fn enqueue(&self, id: TxId, call: Call) -> Result<TxId, EngineError> {
        self.store
            .mutate(|state| {
                let idx = state.pick_next().ok_or(EngineError::NoAccounts)?;
                let nonce = state.assign_nonce(idx);
                let submitter_address = state.accounts[idx].address.clone();

                let tx = Transaction {
                    id: id.clone(),
                    submitter_address,
                    call,
                    assigned_nonce: nonce,
                    status: Status::Pending,
                    retry_count: 0,
                };
                state.queues.pending.push_back(tx);
                Ok(id)
            })
            .await
    }

    /// Locates the transaction and performs the state transition implied
    /// by `status` (only `Confirmed` and `Failed` are meaningful here —
    /// `Pending`/`Submitted` go through [`Queue::mark_submitted`] and
    /// [`crate::reconcile::retry_failed`]). A terminal status (`Confirmed`)
    /// removes the transaction. Unknown `id` is a no-op — it may have
    /// already retired.
    pub async fn set_status(&self, id: &str, status: Status) {
        debug_assert!(matches!(status, Status::Confirmed | Status::Failed));
        self.store
            .mutate(|state| {
                if let Some(mut tx) = state.queues.processing.remove(id) {
                    match status {
                        Status::Confirmed => {
                            log::info!("transaction {id} confirmed");
                        }
                        _ => {
                            tx.status = Status::Failed;
                            state.queues.processing.insert(id.to_string(), tx);
                        }
                    }
                    return;
                }

                if status == Status::Failed {
                    if let Some(pos) = state.queues.pending.iter().position(|t| t.id == id) {
                        let mut tx = state.queues.pending.remove(pos).unwrap();
                        tx.status = Status::Failed;
                        state.queues.processing.insert(id.to_string(), tx);
                    }
                }
            })
            .await;
    }

    /// Moves a Pending transaction into Processing once the gateway has
    /// accepted it for gossip.
    pub async fn mark_submitted(&self, id: &str) {
        self.store
            .mutate(|state| {
                if let Some(pos) = state.queues.pending.iter().position(|t| t.id == id) {
                    let mut tx = state.queues.pending.remove(pos).unwrap();
                    tx.status = Status::Submitted;
                    state.queues.processing.insert(id.to_string(), tx);
                }
            })
            .await;
    }
}
