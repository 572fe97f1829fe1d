//! Submission Driver (C5): the single cooperative worker that pulls from
//! `pending`, asks the gateway to sign-and-submit, and translates the
//! resulting callback stream into queue state transitions.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::gateway::{GatewaySlot, LifecycleEvent};
use crate::model::Status;
use crate::queue::Queue;
use crate::store::Store;

pub struct Driver {
    store: Arc<Store>,
    queue: Arc<Queue>,
    gateway: Arc<GatewaySlot>,
    /// Serializes `tick`: the spec's single cooperative worker, guarded
    /// so a timer-driven tick and an API-triggered one can never peek and
    /// submit the same head concurrently.
    in_flight: Mutex<()>,
}

impl Driver {
    pub fn new(store: Arc<Store>, queue: Arc<Queue>, gateway: Arc<GatewaySlot>) -> Self {
        Driver {
            store,
            queue,
            gateway,
            in_flight: Mutex::new(()),
        }
    }

    /// Drives one submission if possible. No-op if the gateway handle is
    /// absent or nothing is pending. FIFO order per account is what keeps
    /// consecutive optimistic nonces safe — the driver only ever looks at
    /// the head. Only one call runs its body at a time; a concurrent
    /// caller waits rather than racing this one over the same head.
    pub async fn tick(&self) {
        let _guard = self.in_flight.lock().await;
        let Some(gateway) = self.gateway.get().await else {
            return;
        };
        let snapshot = self.store.read().await;
        let Some(head) = snapshot.queues.pending.front() else {
            return;
        };
        let id = head.id.clone();
        let call = head.call.clone();
        let nonce = head.assigned_nonce;
        let submitter_address = head.submitter_address.clone();

        let Some(account) = snapshot.account_by_address(&submitter_address) else {
            log::error!("submitter account {submitter_address} missing for tx {id}");
            self.queue.set_status(&id, Status::Failed).await;
            return;
        };
        let signer = account.signing_material.clone();

        let (tx, rx) = mpsc::unbounded_channel();
        match gateway.submit(&call, &signer, nonce, tx).await {
            Ok(()) => {
                self.queue.mark_submitted(&id).await;
                self.spawn_event_listener(id, rx);
            }
            Err(e) => {
                log::warn!("submission rejected for tx {id}: {e}");
                self.queue.set_status(&id, Status::Failed).await;
                // The optimistic increment never produced an on-chain
                // effect; restore the counter so it isn't permanently
                // short one nonce. Sound only because the queue is FIFO
                // and we only ever touch the head — see the reconciler
                // for the less common case this can't catch.
                self.store
                    .mutate(|state| {
                        if let Some(acc) = state.account_by_address_mut(&submitter_address) {
                            acc.nonce = acc.nonce.saturating_sub(1);
                        }
                    })
                    .await;
            }
        }
    }

    fn spawn_event_listener(&self, id: String, mut rx: mpsc::UnboundedReceiver<LifecycleEvent>) {
        let queue = Arc::clone(&self.queue);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    LifecycleEvent::InBlock => {
                        log::debug!("tx {id} included in block");
                    }
                    LifecycleEvent::FinalizedOk => {
                        queue.set_status(&id, Status::Confirmed).await;
                        break;
                    }
                    LifecycleEvent::FinalizedErr(reason) => {
                        log::warn!("tx {id} failed on-chain: {reason}");
                        queue.set_status(&id, Status::Failed).await;
                        break;
                    }
                }
            }
        });
    }
}
