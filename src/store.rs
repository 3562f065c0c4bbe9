//! Shared farm state store
//!
//! One slot per chain, read by anything that wants to render state and
//! written by refresh runs. A run takes a `RunGuard` up front; the
//! guard carries a monotonically increasing run id, and only the
//! holder of the latest id may publish or clear the loading flag. A
//! guard that loses the race simply evaporates on drop, so an old slow
//! refresh can never stomp a newer one's data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::farms::Farm;
use crate::harvester::FarmUserInfo;

/// Everything known about one chain's farms, as handed to readers
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChainFarmState {
    /// True while a refresh run holds the latest guard
    pub loading: bool,
    /// None until the first successful publish
    pub farms: Option<Vec<Farm>>,
    pub user_info: HashMap<Address, FarmUserInfo>,
    pub pool_fee_last_24h: HashMap<Address, f64>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct ChainFlags {
    loading: AtomicBool,
    run_counter: AtomicU64,
}

#[derive(Default)]
struct ChainSlot {
    data: ChainFarmState,
    flags: Arc<ChainFlags>,
}

/// Per-chain state shared between the refresh driver and readers
#[derive(Default)]
pub struct FarmStore {
    states: RwLock<HashMap<u64, ChainSlot>>,
}

impl FarmStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a refresh run. Sets the chain's loading flag and hands
    /// back the guard that owns it; any previously issued guard for
    /// this chain is superseded from this moment on.
    pub async fn begin_run(&self, chain_id: u64) -> RunGuard<'_> {
        let mut states = self.states.write().await;
        let slot = states.entry(chain_id).or_default();
        let run_id = slot.flags.run_counter.fetch_add(1, Ordering::SeqCst) + 1;
        slot.flags.loading.store(true, Ordering::SeqCst);
        RunGuard {
            store: self,
            flags: Arc::clone(&slot.flags),
            chain_id,
            run_id,
        }
    }

    /// Clone out the chain's current state with the live loading flag
    pub async fn snapshot(&self, chain_id: u64) -> ChainFarmState {
        let states = self.states.read().await;
        match states.get(&chain_id) {
            Some(slot) => {
                let mut data = slot.data.clone();
                data.loading = slot.flags.loading.load(Ordering::SeqCst);
                data
            }
            None => ChainFarmState::default(),
        }
    }

    /// Replace the chain's pool fee map. Fees refresh on their own
    /// cadence, independent of farm publishes.
    pub async fn set_pool_fees(&self, chain_id: u64, fees: HashMap<Address, f64>) {
        let mut states = self.states.write().await;
        let slot = states.entry(chain_id).or_default();
        slot.data.pool_fee_last_24h = fees;
    }
}

/// Ownership token for one refresh run on one chain
pub struct RunGuard<'a> {
    store: &'a FarmStore,
    flags: Arc<ChainFlags>,
    chain_id: u64,
    run_id: u64,
}

impl RunGuard<'_> {
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Whether this guard still owns the run. False once a newer
    /// `begin_run` for the same chain has been issued.
    pub fn is_current(&self) -> bool {
        self.flags.run_counter.load(Ordering::SeqCst) == self.run_id
    }

    /// Publish the run's results. Returns false without touching the
    /// store when the guard has been superseded.
    pub async fn publish(
        self,
        farms: Vec<Farm>,
        user_info: HashMap<Address, FarmUserInfo>,
    ) -> bool {
        let mut states = self.store.states.write().await;
        if !self.is_current() {
            return false;
        }
        let slot = states.entry(self.chain_id).or_default();
        slot.data.farms = Some(farms);
        slot.data.user_info = user_info;
        slot.data.refreshed_at = Some(Utc::now());
        self.flags.loading.store(false, Ordering::SeqCst);
        true
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        // A superseded guard leaves the flag to its newer owner
        if self.is_current() {
            self.flags.loading.store(false, Ordering::SeqCst);
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const FARM: Address = address!("9999999999999999999999999999999999999999");

    fn farm_fixture() -> Farm {
        Farm {
            address: FARM,
            name: String::new(),
            pools: Vec::new(),
        }
    }

    #[test]
    fn test_snapshot_of_unknown_chain_is_default() {
        tokio_test::block_on(async {
            let store = FarmStore::new();
            let state = store.snapshot(1).await;
            assert!(!state.loading);
            assert!(state.farms.is_none());
            assert!(state.user_info.is_empty());
            assert!(state.refreshed_at.is_none());
        });
    }

    #[test]
    fn test_run_guard_drives_loading_flag() {
        tokio_test::block_on(async {
            let store = FarmStore::new();
            let guard = store.begin_run(1).await;
            assert!(store.snapshot(1).await.loading);
            drop(guard);
            assert!(!store.snapshot(1).await.loading);
        });
    }

    #[test]
    fn test_publish_lands_results() {
        tokio_test::block_on(async {
            let store = FarmStore::new();
            let guard = store.begin_run(1).await;

            let mut user_info = HashMap::new();
            user_info.insert(FARM, FarmUserInfo::default());
            assert!(guard.publish(vec![farm_fixture()], user_info).await);

            let state = store.snapshot(1).await;
            assert!(!state.loading);
            assert_eq!(state.farms.as_ref().map(Vec::len), Some(1));
            assert!(state.user_info.contains_key(&FARM));
            assert!(state.refreshed_at.is_some());
        });
    }

    #[test]
    fn test_newer_run_supersedes_older() {
        tokio_test::block_on(async {
            let store = FarmStore::new();
            let old = store.begin_run(1).await;
            let new = store.begin_run(1).await;

            assert!(!old.is_current());
            assert!(new.is_current());

            // The superseded publish changes nothing
            assert!(!old.publish(vec![farm_fixture()], HashMap::new()).await);
            let state = store.snapshot(1).await;
            assert!(state.farms.is_none());
            assert!(state.loading);

            assert!(new.publish(vec![farm_fixture()], HashMap::new()).await);
            let state = store.snapshot(1).await;
            assert_eq!(state.farms.as_ref().map(Vec::len), Some(1));
            assert!(!state.loading);
        });
    }

    #[test]
    fn test_superseded_drop_leaves_loading_alone() {
        tokio_test::block_on(async {
            let store = FarmStore::new();
            let old = store.begin_run(1).await;
            let new = store.begin_run(1).await;

            drop(old);
            assert!(store.snapshot(1).await.loading);

            drop(new);
            assert!(!store.snapshot(1).await.loading);
        });
    }

    #[test]
    fn test_chains_are_independent() {
        tokio_test::block_on(async {
            let store = FarmStore::new();
            let _guard = store.begin_run(1).await;
            assert!(store.snapshot(1).await.loading);
            assert!(!store.snapshot(137).await.loading);
        });
    }

    #[test]
    fn test_set_pool_fees_replaces_map() {
        tokio_test::block_on(async {
            let store = FarmStore::new();
            let pool_a = address!("1111111111111111111111111111111111111111");
            let pool_b = address!("2222222222222222222222222222222222222222");

            let mut fees = HashMap::new();
            fees.insert(pool_a, 123.45);
            store.set_pool_fees(1, fees).await;

            let mut fees = HashMap::new();
            fees.insert(pool_b, 67.89);
            store.set_pool_fees(1, fees).await;

            let state = store.snapshot(1).await;
            assert_eq!(state.pool_fee_last_24h.len(), 1);
            assert_eq!(state.pool_fee_last_24h.get(&pool_b), Some(&67.89));
        });
    }

    #[test]
    fn test_publish_preserves_pool_fees() {
        tokio_test::block_on(async {
            let store = FarmStore::new();
            let pool = address!("1111111111111111111111111111111111111111");

            let mut fees = HashMap::new();
            fees.insert(pool, 10.0);
            store.set_pool_fees(1, fees).await;

            let guard = store.begin_run(1).await;
            assert!(guard.publish(vec![farm_fixture()], HashMap::new()).await);

            let state = store.snapshot(1).await;
            assert_eq!(state.pool_fee_last_24h.get(&pool), Some(&10.0));
        });
    }
}
