//! Chain Gateway (C1): owns the connection to a remote node and exposes
//! submit-with-callbacks and query-nonce operations. The core never
//! inspects block contents beyond this.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use subxt::dynamic::Value;
use subxt::tx::{DynamicPayload, Signer as SignerT};
use subxt::utils::{AccountId32, MultiAddress, MultiSignature};
use subxt::{config::DefaultExtrinsicParamsBuilder, OnlineClient, SubstrateConfig};
use tokio::sync::mpsc;

use crate::error::EngineError;
use crate::model::{BoxedSigner, Call};

/// A lifecycle update for one in-flight extrinsic, as reported by the
/// node's `submitAndWatch` stream. `FinalizedErr` carries the
/// `system.ExtrinsicFailed` event's dispatch error, if any was decoded.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    InBlock,
    FinalizedOk,
    FinalizedErr(String),
}

/// The chain gateway contract consumed by the submission driver. The core
/// requires exactly: submit-and-watch, an account nonce query, and
/// `ExtrinsicFailed` detection (folded into `submit`'s callback stream).
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Builds the extrinsic for `call`, signs it with `signer` at `nonce`,
    /// and dispatches it. Returns once the node accepts it for gossip;
    /// `events` keeps receiving lifecycle updates afterwards. Fails
    /// synchronously on local/transport errors (`SubmitRejected`).
    async fn submit(
        &self,
        call: &Call,
        signer: &BoxedSigner,
        nonce: u64,
        events: mpsc::UnboundedSender<LifecycleEvent>,
    ) -> Result<(), EngineError>;

    /// The account's current on-chain nonce.
    async fn fetch_nonce(&self, address: &str) -> Result<u64, EngineError>;
}

/// The "GatewayHandle (absent before initialization)" from the data
/// model: shared, read-mostly, swapped in once by `initialize`.
#[derive(Default)]
pub struct GatewaySlot {
    inner: tokio::sync::RwLock<Option<Arc<dyn Gateway>>>,
}

impl GatewaySlot {
    pub fn empty() -> Self {
        GatewaySlot {
            inner: tokio::sync::RwLock::new(None),
        }
    }

    pub async fn get(&self) -> Option<Arc<dyn Gateway>> {
        self.inner.read().await.clone()
    }

    pub async fn set(&self, gateway: Arc<dyn Gateway>) {
        *self.inner.write().await = Some(gateway);
    }
}

/// `create_signed_offline` wants a `Signer<SubstrateConfig>` that is
/// `Sized`; `BoxedSigner` holds a `dyn Signer`, so this borrows through it.
struct DynSigner<'a>(&'a dyn SignerT<SubstrateConfig>);

impl SignerT<SubstrateConfig> for DynSigner<'_> {
    fn account_id(&self) -> AccountId32 {
        self.0.account_id()
    }
    fn address(&self) -> MultiAddress<AccountId32, u32> {
        self.0.address()
    }
    fn sign(&self, signer_payload: &[u8]) -> MultiSignature {
        self.0.sign(signer_payload)
    }
}

fn dynamic_call(call: &Call) -> DynamicPayload {
    let fields: Vec<Value> = call
        .params
        .iter()
        .map(|p| {
            subxt::ext::scale_value::serde::to_value(p)
                .unwrap_or_else(|_| Value::string(p.to_string()))
        })
        .collect();
    subxt::dynamic::tx(call.module.clone(), call.method.clone(), fields)
}

/// Live gateway backed by a persistent `subxt` WebSocket session: explicit
/// nonce via `DefaultExtrinsicParamsBuilder`, offline signing so the nonce
/// we assigned is the one that ships, and `tx().account_nonce(...)` for
/// reconciliation queries.
pub struct SubxtGateway {
    client: OnlineClient<SubstrateConfig>,
}

impl SubxtGateway {
    pub async fn connect(node_url: &str) -> Result<Self, EngineError> {
        let client = OnlineClient::<SubstrateConfig>::from_url(node_url)
            .await
            .map_err(|e| EngineError::ConnectFailed(e.to_string()))?;
        Ok(SubxtGateway { client })
    }
}

#[async_trait]
impl Gateway for SubxtGateway {
    async fn submit(
        &self,
        call: &Call,
        signer: &BoxedSigner,
        nonce: u64,
        events: mpsc::UnboundedSender<LifecycleEvent>,
    ) -> Result<(), EngineError> {
        let payload = dynamic_call(call);
        let params = DefaultExtrinsicParamsBuilder::<SubstrateConfig>::new()
            .nonce(nonce)
            .build();

        let signed = self
            .client
            .tx()
            .create_signed_offline(&payload, &DynSigner(signer.as_ref()), params)
            .map_err(|e| EngineError::SubmitRejected(e.to_string()))?;

        let mut progress = signed
            .submit_and_watch()
            .await
            .map_err(|e| EngineError::SubmitRejected(e.to_string()))?;

        tokio::spawn(async move {
            use subxt::tx::TxStatus;

            // Every exit path below must send a terminal `LifecycleEvent`
            // before the task ends — a dropped `events` sender with no
            // terminal event leaves the driver's listener, and the
            // transaction, stuck in `Submitted` forever.
            let mut resolved = false;

            while let Some(status) = progress.next().await {
                let status = match status {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = events.send(LifecycleEvent::FinalizedErr(e.to_string()));
                        resolved = true;
                        break;
                    }
                };
                match status {
                    TxStatus::InBestBlock(_) => {
                        let _ = events.send(LifecycleEvent::InBlock);
                    }
                    TxStatus::InFinalizedBlock(in_block) => {
                        match in_block.wait_for_success().await {
                            Ok(_) => {
                                let _ = events.send(LifecycleEvent::FinalizedOk);
                            }
                            Err(e) => {
                                let _ = events.send(LifecycleEvent::FinalizedErr(e.to_string()));
                            }
                        }
                        resolved = true;
                        break;
                    }
                    TxStatus::Error { message } | TxStatus::Invalid { message } => {
                        let _ = events.send(LifecycleEvent::FinalizedErr(message));
                        resolved = true;
                        break;
                    }
                    TxStatus::Dropped { message } => {
                        let _ = events.send(LifecycleEvent::FinalizedErr(message));
                        resolved = true;
                        break;
                    }
                    _ => {}
                }
            }

            if !resolved {
                let _ = events.send(LifecycleEvent::FinalizedErr(
                    "status subscription ended without a terminal status".into(),
                ));
            }
        });

        Ok(())
    }

    async fn fetch_nonce(&self, address: &str) -> Result<u64, EngineError> {
        let account_id = AccountId32::from_str(address)
            .map_err(|_| EngineError::Internal(format!("invalid address: {address}")))?;
        self.client
            .tx()
            .account_nonce(&account_id)
            .await
            .map_err(EngineError::from)
    }
}

/// Test-only in-memory gateway. No live node; a test drives it directly
/// by pushing lifecycle events or failing submissions, the way the
/// substrate transaction-pool testing API offers a scriptable pool.
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use subxt::tx::Signer as SignerT;
    use subxt::utils::MultiAddress;

    /// A signer that never actually signs anything real; good enough to
    /// satisfy `subxt::tx::Signer<SubstrateConfig>` for tests that never
    /// touch the wire.
    pub struct StubSigner {
        account_id: AccountId32,
    }

    impl SignerT<SubstrateConfig> for StubSigner {
        fn account_id(&self) -> AccountId32 {
            self.account_id.clone()
        }
        fn address(&self) -> MultiAddress<AccountId32, u32> {
            MultiAddress::Id(self.account_id.clone())
        }
        fn sign(&self, _signer_payload: &[u8]) -> subxt::utils::MultiSignature {
            subxt::utils::MultiSignature::Sr25519([0u8; 64])
        }
    }

    pub fn mock_signer(seed: &str) -> BoxedSigner {
        let mut bytes = [0u8; 32];
        for (i, b) in seed.bytes().enumerate().take(32) {
            bytes[i] = b;
        }
        std::sync::Arc::new(StubSigner {
            account_id: AccountId32(bytes),
        })
    }

    /// Scripted outcome for the next call to `submit`.
    pub enum SubmitOutcome {
        /// Submission accepted; events to push afterwards (in order).
        Accepted(Vec<LifecycleEvent>),
        /// Submission rejected synchronously, as if the transport/node
        /// refused the extrinsic before it left the local process.
        Rejected(String),
    }

    pub struct MockGateway {
        next_outcome: Mutex<Vec<SubmitOutcome>>,
        on_chain_nonces: Mutex<std::collections::HashMap<String, u64>>,
    }

    impl MockGateway {
        pub fn new() -> Self {
            MockGateway {
                next_outcome: Mutex::new(Vec::new()),
                on_chain_nonces: Mutex::new(std::collections::HashMap::new()),
            }
        }

        /// Queue the outcome for the next `submit` call (FIFO).
        pub fn push_outcome(&self, outcome: SubmitOutcome) {
            self.next_outcome.lock().unwrap().push(outcome);
        }

        pub fn set_chain_nonce(&self, address: &str, nonce: u64) {
            self.on_chain_nonces
                .lock()
                .unwrap()
                .insert(address.to_string(), nonce);
        }
    }

    impl Default for MockGateway {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Gateway for MockGateway {
        async fn submit(
            &self,
            _call: &Call,
            _signer: &BoxedSigner,
            _nonce: u64,
            events: mpsc::UnboundedSender<LifecycleEvent>,
        ) -> Result<(), EngineError> {
            let outcome = {
                let mut queue = self.next_outcome.lock().unwrap();
                if queue.is_empty() {
                    SubmitOutcome::Accepted(vec![LifecycleEvent::FinalizedOk])
                } else {
                    queue.remove(0)
                }
            };

            match outcome {
                SubmitOutcome::Rejected(msg) => Err(EngineError::SubmitRejected(msg)),
                SubmitOutcome::Accepted(stream) => {
                    for ev in stream {
                        let _ = events.send(ev);
                    }
                    Ok(())
                }
            }
        }

        async fn fetch_nonce(&self, address: &str) -> Result<u64, EngineError> {
            Ok(self
                .on_chain_nonces
                .lock()
                .unwrap()
                .get(address)
                .copied()
                .unwrap_or(0))
        }
    }
}
