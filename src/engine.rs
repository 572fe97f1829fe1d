//! Public API (§6): the thin front-end's entry point into the engine.
//! Wires together the Store, Queue, Gateway slot, Driver, and Reconciler.

use std::sync::Arc;

use subxt::ext::sp_core::sr25519::Pair;
use subxt::ext::sp_core::Pair as PairTrait;
use subxt::tx::PairSigner;
use subxt::SubstrateConfig;

use crate::config::Settings;
use crate::driver::Driver;
use crate::error::EngineError;
use crate::gateway::{GatewaySlot, SubxtGateway};
use crate::model::{Account, Call, TxId};
use crate::queue::Queue;
use crate::reconcile::Reconciler;
use crate::store::Store;

pub struct Engine {
    store: Arc<Store>,
    queue: Arc<Queue>,
    gateway: Arc<GatewaySlot>,
    driver: Driver,
    reconciler: Reconciler,
}

impl Engine {
    pub fn from_settings(settings: &Settings) -> Result<Self, EngineError> {
        let mut accounts = Vec::with_capacity(settings.accounts.len());
        for acc in &settings.accounts {
            let pair = Pair::from_string(&acc.seed, None)
                .map_err(|_| EngineError::Internal(format!("invalid seed for {}", acc.address)))?;
            let signer: PairSigner<SubstrateConfig, Pair> = PairSigner::new(pair);
            accounts.push(Account {
                address: acc.address.clone(),
                signing_material: Arc::new(signer),
                nonce: 0,
            });
        }

        let store = Arc::new(Store::new(accounts));
        let queue = Arc::new(Queue::new(Arc::clone(&store)));
        let gateway = Arc::new(GatewaySlot::empty());
        let driver = Driver::new(Arc::clone(&store), Arc::clone(&queue), Arc::clone(&gateway));
        let reconciler = Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            settings.max_retries,
        );

        Ok(Engine {
            store,
            queue,
            gateway,
            driver,
            reconciler,
        })
    }

    /// Establishes the persistent WebSocket session. Until this succeeds,
    /// `tick` idles.
    pub async fn initialize(&self, node_url: &str) -> Result<(), EngineError> {
        let gateway = SubxtGateway::connect(node_url).await?;
        self.gateway.set(Arc::new(gateway)).await;
        log::info!("connected to chain at {node_url}");
        Ok(())
    }

    pub async fn add_transaction(
        &self,
        module: String,
        method: String,
        params: Vec<serde_json::Value>,
    ) -> Result<TxId, EngineError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.queue.enqueue(id, Call { module, method, params }).await
    }

    pub async fn tick(&self) {
        self.driver.tick().await;
    }

    pub async fn retry_failed(&self) {
        self.reconciler.retry_failed().await;
    }

    pub async fn sync_account_nonce(&self, address: &str, on_chain_nonce: u64) {
        self.reconciler.sync_nonce(address, on_chain_nonce).await;
    }

    /// Diagnostic sweep; logs suspected nonce gaps without mutating state.
    pub async fn detect_nonce_gaps(&self) {
        self.reconciler.detect_gaps().await;
    }

    pub async fn snapshot(&self) -> crate::model::GlobalState {
        self.store.read().await
    }
}
