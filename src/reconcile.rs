//! Retry & Reconciler (C6): retry policy for Failed transactions, and
//! nonce resynchronization against the chain after disruption.

use std::sync::Arc;

use crate::gateway::GatewaySlot;
use crate::model::Status;
use crate::store::Store;

pub struct Reconciler {
    store: Arc<Store>,
    gateway: Arc<GatewaySlot>,
    max_retries: u32,
}

impl Reconciler {
    pub fn new(store: Arc<Store>, gateway: Arc<GatewaySlot>, max_retries: u32) -> Self {
        Reconciler {
            store,
            gateway,
            max_retries,
        }
    }

    /// For every Failed transaction still tracked: retry with a fresh
    /// nonce if under the cap, otherwise log and drop it for good.
    pub async fn retry_failed(&self) {
        let Some(gateway) = self.gateway.get().await else {
            return;
        };
        let failed: Vec<(String, String, u32)> = {
            let snapshot = self.store.read().await;
            snapshot
                .queues
                .processing
                .values()
                .filter(|tx| tx.status == Status::Failed)
                .map(|tx| {
                    (
                        tx.id.clone(),
                        tx.submitter_address.clone(),
                        tx.retry_count,
                    )
                })
                .collect()
        };

        for (id, address, retry_count) in failed {
            if retry_count >= self.max_retries {
                log::warn!("tx {id} exhausted {} retries, dropping", self.max_retries);
                self.store
                    .mutate(|state| {
                        state.queues.processing.remove(&id);
                    })
                    .await;
                continue;
            }

            // Network round-trip: deliberately outside the mutate lock so
            // other observers aren't blocked on it.
            let fresh_nonce = match gateway.fetch_nonce(&address).await {
                Ok(n) => n,
                Err(e) => {
                    log::error!("retry_failed: could not fetch nonce for {address}: {e}");
                    continue;
                }
            };

            self.store
                .mutate(|state| {
                    if let Some(mut tx) = state.queues.processing.remove(&id) {
                        tx.retry_count += 1;
                        tx.assigned_nonce = fresh_nonce;
                        tx.status = Status::Pending;
                        state.queues.pending.push_back(tx);
                    }
                    // The retried transaction now occupies `fresh_nonce`;
                    // make sure the next fresh enqueue doesn't hand out
                    // the same value.
                    state.bump_nonce_floor(&address, fresh_nonce + 1);
                })
                .await;
        }
    }

    /// `account.nonce <- max(account.nonce, on_chain_nonce)`. Never
    /// decreases the local counter: it reflects in-flight optimistic
    /// assignments the chain hasn't seen yet.
    pub async fn sync_nonce(&self, address: &str, on_chain_nonce: u64) {
        self.store
            .mutate(|state| state.bump_nonce_floor(address, on_chain_nonce))
            .await;
    }

    /// Diagnostic only: warns when an account's local nonce looks further
    /// ahead of the chain than its currently-tracked in-flight
    /// transactions can account for. Grounded in the gap-detection idea
    /// used by substrate transaction managers that track nonce/pool state
    /// alongside a chain client.
    pub async fn detect_gaps(&self) {
        let Some(gateway) = self.gateway.get().await else {
            return;
        };
        let snapshot = self.store.read().await;
        for account in &snapshot.accounts {
            let in_flight = snapshot
                .queues
                .processing
                .values()
                .filter(|tx| tx.submitter_address == account.address)
                .count() as u64;
            match gateway.fetch_nonce(&account.address).await {
                Ok(on_chain) if account.nonce > on_chain + in_flight => {
                    log::warn!(
                        "possible nonce gap for {}: local={}, on_chain={}, in_flight={}",
                        account.address,
                        account.nonce,
                        on_chain,
                        in_flight
                    );
                }
                Ok(_) => {}
                Err(e) => log::error!("detect_gaps: could not fetch nonce for {}: {e}", account.address),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::{mock_signer, MockGateway};
    use crate::gateway::GatewaySlot as TestGatewaySlot;

    async fn slot_with(gateway: Arc<MockGateway>) -> Arc<TestGatewaySlot> {
        let slot = Arc::new(TestGatewaySlot::empty());
        slot.set(gateway).await;
        slot
    }
    use crate::model::{Account, Call, Transaction};

    fn call() -> Call {
        Call {
            module: "template".into(),
            method: "do_something".into(),
            params: vec![],
        }
    }

    #[tokio::test]
    async fn retry_reassigns_nonce_and_resets_to_pending() {
        let store = Arc::new(Store::new(vec![Account {
            address: "A".into(),
            signing_material: mock_signer("A"),
            nonce: 10,
        }]));
        store
            .mutate(|state| {
                state.queues.processing.insert(
                    "tx1".into(),
                    Transaction {
                        id: "tx1".into(),
                        submitter_address: "A".into(),
                        call: call(),
                        assigned_nonce: 5,
                        status: Status::Failed,
                        retry_count: 0,
                    },
                );
            })
            .await;

        let gateway = Arc::new(MockGateway::new());
        gateway.set_chain_nonce("A", 11);
        let reconciler = Reconciler::new(Arc::clone(&store), slot_with(gateway).await, 5);
        reconciler.retry_failed().await;

        let snapshot = store.read().await;
        assert!(snapshot.queues.processing.is_empty());
        let tx = snapshot.queues.pending.front().unwrap();
        assert_eq!(tx.assigned_nonce, 11);
        assert_eq!(tx.retry_count, 1);
        assert_eq!(tx.status, Status::Pending);
        // the retried tx now occupies 11; the next fresh enqueue must not
        // be handed that same value.
        assert_eq!(snapshot.accounts[0].nonce, 12);
    }

    /// Reproduces the collision a retry can otherwise cause: tx1 is
    /// rejected pre-submit and rolled back, tx2 takes the freed nonce and
    /// confirms, and only then does the reconciler retry tx1. Without
    /// raising `account.nonce` to cover the nonce the retry just reused,
    /// the next fresh enqueue would collide with tx1's retried nonce.
    #[tokio::test]
    async fn retry_never_reassigns_a_nonce_a_fresh_enqueue_will_also_use() {
        use crate::queue::Queue;

        let store = Arc::new(Store::new(vec![Account {
            address: "A".into(),
            signing_material: mock_signer("A"),
            nonce: 0,
        }]));
        let queue = Queue::new(Arc::clone(&store));

        // tx1 takes nonce 0, then is rejected pre-submit and rolled back
        // (mirrors Driver::tick's Err arm).
        queue.enqueue("tx1".into(), call()).await.unwrap();
        store
            .mutate(|state| {
                let tx = state.queues.pending.pop_front().unwrap();
                state.queues.processing.insert(tx.id.clone(), Transaction {
                    status: Status::Failed,
                    ..tx
                });
                state.account_by_address_mut("A").unwrap().nonce = 0;
            })
            .await;

        // tx2 reuses nonce 0 and confirms on-chain.
        queue.enqueue("tx2".into(), call()).await.unwrap();
        store
            .mutate(|state| {
                state.queues.pending.pop_front();
            })
            .await;

        let gateway = Arc::new(MockGateway::new());
        gateway.set_chain_nonce("A", 1);
        let reconciler = Reconciler::new(Arc::clone(&store), slot_with(gateway).await, 5);
        reconciler.retry_failed().await;

        let retried = store.read().await;
        let tx1 = retried.queues.pending.front().unwrap();
        assert_eq!(tx1.assigned_nonce, 1);

        // the next fresh enqueue must land on 2, not collide with tx1's 1.
        let tx3 = queue.enqueue("tx3".into(), call()).await.unwrap();
        let after = store.read().await;
        let tx3 = after
            .queues
            .pending
            .iter()
            .find(|t| t.id == tx3)
            .unwrap();
        assert_eq!(tx3.assigned_nonce, 2);
    }

    #[tokio::test]
    async fn retry_drops_after_cap_is_reached() {
        let store = Arc::new(Store::new(vec![Account {
            address: "A".into(),
            signing_material: mock_signer("A"),
            nonce: 10,
        }]));
        store
            .mutate(|state| {
                state.queues.processing.insert(
                    "tx1".into(),
                    Transaction {
                        id: "tx1".into(),
                        submitter_address: "A".into(),
                        call: call(),
                        assigned_nonce: 5,
                        status: Status::Failed,
                        retry_count: 5,
                    },
                );
            })
            .await;

        let gateway = Arc::new(MockGateway::new());
        let reconciler = Reconciler::new(Arc::clone(&store), slot_with(gateway).await, 5);
        reconciler.retry_failed().await;

        let snapshot = store.read().await;
        assert!(snapshot.queues.processing.is_empty());
        assert!(snapshot.queues.pending.is_empty());
    }

    #[tokio::test]
    async fn sync_nonce_only_moves_forward() {
        let store = Arc::new(Store::new(vec![Account {
            address: "A".into(),
            signing_material: mock_signer("A"),
            nonce: 3,
        }]));
        let gateway = Arc::new(MockGateway::new());
        let reconciler = Reconciler::new(Arc::clone(&store), slot_with(gateway).await, 5);

        reconciler.sync_nonce("A", 7).await;
        assert_eq!(store.read().await.accounts[0].nonce, 7);

        reconciler.sync_nonce("A", 4).await;
        assert_eq!(store.read().await.accounts[0].nonce, 7);
    }
}
