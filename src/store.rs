//! State Store (C2) and Account Pool (C3).
//!
//! `Store` is the single serializer for every mutation of [`GlobalState`].
//! `read()` hands out a cloned, consistent snapshot; `mutate(f)` runs `f`
//! against a locked draft and applies every write it makes atomically:
//! one `tokio::sync::Mutex` around the whole of the state that needs to
//! change together.

use tokio::sync::Mutex;

use crate::model::{Account, GlobalState};

pub struct Store {
    inner: Mutex<GlobalState>,
}

impl Store {
    pub fn new(accounts: Vec<Account>) -> Self {
        Store {
            inner: Mutex::new(GlobalState {
                accounts,
                next_index: 0,
                queues: Default::default(),
            }),
        }
    }

    /// An immutable, consistent snapshot of accounts and queues.
    pub async fn read(&self) -> GlobalState {
        self.inner.lock().await.clone()
    }

    /// Apply `f` to a mutable draft. Every field it writes becomes visible
    /// together to any subsequent `read`, and no other mutation or read
    /// observes a partial write.
    pub async fn mutate<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut GlobalState) -> R,
    {
        let mut guard = self.inner.lock().await;
        f(&mut guard)
    }
}

impl GlobalState {
    /// Account Pool (C3): round-robin selection with wrap-around. The
    /// cursor lives in `GlobalState` so it persists across calls.
    pub fn pick_next(&mut self) -> Option<usize> {
        if self.accounts.is_empty() {
            return None;
        }
        let idx = self.next_index % self.accounts.len();
        self.next_index = (self.next_index + 1) % self.accounts.len();
        Some(idx)
    }

    /// Assigns `account.nonce` to the caller and optimistically increments
    /// it. Must be called from within the same `mutate` that appends the
    /// transaction, so back-to-back enqueues on one account produce
    /// strictly consecutive nonces before the chain has seen either.
    pub fn assign_nonce(&mut self, account_idx: usize) -> u64 {
        let nonce = self.accounts[account_idx].nonce;
        self.accounts[account_idx].nonce += 1;
        nonce
    }

    pub fn account_by_address(&self, address: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.address == address)
    }

    pub fn account_by_address_mut(&mut self, address: &str) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|a| a.address == address)
    }

    /// Raises `account.nonce` to at least `floor`, never lowers it. Used
    /// both to reconcile against an on-chain nonce and, after a retry
    /// re-pins a transaction to a freshly-fetched nonce, to keep the
    /// optimistic counter from later handing out one already in flight.
    pub fn bump_nonce_floor(&mut self, address: &str, floor: u64) {
        if let Some(acc) = self.account_by_address_mut(address) {
            acc.nonce = acc.nonce.max(floor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::mock_signer;

    fn account(address: &str, nonce: u64) -> Account {
        Account {
            address: address.to_string(),
            signing_material: mock_signer(address),
            nonce,
        }
    }

    #[tokio::test]
    async fn pick_next_round_robins_with_wraparound() {
        let store = Store::new(vec![account("A", 0), account("B", 0), account("C", 0)]);
        let picks = store
            .mutate(|state| {
                (0..4)
                    .map(|_| state.pick_next().unwrap())
                    .collect::<Vec<_>>()
            })
            .await;
        assert_eq!(picks, vec![0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn pick_next_on_empty_pool_returns_none() {
        let store = Store::new(vec![]);
        let pick = store.mutate(|state| state.pick_next()).await;
        assert!(pick.is_none());
    }

    #[tokio::test]
    async fn assign_nonce_is_optimistic_and_consecutive() {
        let store = Store::new(vec![account("A", 5)]);
        let nonces = store
            .mutate(|state| {
                let idx = state.pick_next().unwrap();
                let n1 = state.assign_nonce(idx);
                let idx = state.pick_next().unwrap();
                let n2 = state.assign_nonce(idx);
                (n1, n2)
            })
            .await;
        assert_eq!(nonces, (5, 6));
    }
}
