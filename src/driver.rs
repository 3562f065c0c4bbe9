//! The refresh driver
//!
//! Owns the periodic refresh loop for one chain: every tick (or
//! whenever the watch target changes) it harvests the account's farm
//! positions into the store, then refreshes 24h pool fees. Fee data is
//! fetched even without an account, and only re-queried when the
//! resolved 24h block actually moves. The loop ends when the target
//! channel's sender goes away.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use eyre::Result;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::farms::FarmRegistry;
use crate::fees::FeeFetcher;
use crate::harvester::{CallExecutor, Harvester};
use crate::store::FarmStore;

/// What the driver is currently watching. Sent over a watch channel so
/// account or chain switches take effect on the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchTarget {
    pub account: Option<Address>,
    pub chain_id: u64,
}

pub struct RefreshDriver<E> {
    harvester: Harvester<E>,
    fees: FeeFetcher,
    store: Arc<FarmStore>,
    registry: FarmRegistry,
    interval: Duration,
    targets: watch::Receiver<WatchTarget>,
    last_fee_block: Option<u64>,
}

impl<E: CallExecutor> RefreshDriver<E> {
    pub fn new(
        harvester: Harvester<E>,
        fees: FeeFetcher,
        store: Arc<FarmStore>,
        registry: FarmRegistry,
        interval: Duration,
        targets: watch::Receiver<WatchTarget>,
    ) -> Self {
        Self {
            harvester,
            fees,
            store,
            registry,
            interval,
            targets,
            last_fee_block: None,
        }
    }

    /// Drive refreshes until the watch channel closes
    pub async fn run(mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = self.targets.changed() => {
                    if changed.is_err() {
                        info!("Watch channel closed, stopping refresh driver");
                        return Ok(());
                    }
                    // Target switched: refresh now, restart the cadence
                    ticker.reset();
                }
                _ = ticker.tick() => {}
            }

            let target = *self.targets.borrow_and_update();
            self.refresh(&target).await;
        }
    }

    async fn refresh(&mut self, target: &WatchTarget) {
        let chain_id = self.harvester.chain().chain_id;
        if target.chain_id != chain_id {
            debug!(
                "Target chain {} is not ours ({}), skipping",
                target.chain_id, chain_id
            );
            return;
        }
        if self.registry.is_empty() {
            debug!("Farm registry is empty, nothing to refresh");
            return;
        }

        if let Some(account) = target.account {
            let guard = self.store.begin_run(chain_id).await;
            match self.harvester.harvest(account, &self.registry.farms).await {
                Ok(report) => {
                    let published = guard
                        .publish(self.registry.farms.clone(), report.user_info)
                        .await;
                    if published {
                        debug!("Published refresh for {:#x} on chain {}", account, chain_id);
                    } else {
                        debug!("Refresh superseded before publish, discarding");
                    }
                }
                // The guard's drop hands the loading flag back
                Err(err) => warn!("✗ Harvest failed: {:#}", err),
            }
        }

        self.refresh_fees(chain_id).await;
    }

    /// Fee data runs on its own trigger: only when the resolved 24h
    /// block moves does the subgraph get asked again.
    async fn refresh_fees(&mut self, chain_id: u64) {
        let pools = self.registry.pool_addresses();
        if pools.is_empty() {
            return;
        }

        let block = match self.fees.resolve_block_24h().await {
            Ok(block) => block,
            Err(err) => {
                debug!("Fee block resolution failed: {:#}", err);
                return;
            }
        };
        if self.last_fee_block == Some(block) {
            return;
        }

        match self.fees.pool_fees_at(block, &pools).await {
            Ok(fees) if !fees.is_empty() => {
                info!("💰 Pool fees at block {}: {} pools", block, fees.len());
                self.store.set_pool_fees(chain_id, fees).await;
                self.last_fee_block = Some(block);
            }
            Ok(_) => debug!("Fee query returned no pools"),
            Err(err) => debug!("Fee query failed: {:#}", err),
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains;
    use crate::farms::{Farm, FarmPool};
    use crate::fees::{bad_pool_cache, FeeEndpoints};
    use crate::harvester::{CallResult, ReadCall};
    use alloy_primitives::address;

    struct NoopExecutor;

    impl CallExecutor for NoopExecutor {
        async fn execute(&self, _calls: Vec<ReadCall>) -> Result<Vec<CallResult>> {
            Ok(Vec::new())
        }
    }

    fn test_registry() -> FarmRegistry {
        FarmRegistry {
            chain_id: 1,
            farms: vec![Farm {
                address: address!("9999999999999999999999999999999999999999"),
                name: "test farm".to_string(),
                pools: vec![FarmPool {
                    pid: 1,
                    pool: address!("1111111111111111111111111111111111111111"),
                    reward_tokens: Vec::new(),
                }],
            }],
        }
    }

    fn test_driver(
        targets: watch::Receiver<WatchTarget>,
        store: Arc<FarmStore>,
    ) -> RefreshDriver<NoopExecutor> {
        let chain = chains::chain_info(1).unwrap().clone();
        RefreshDriver::new(
            Harvester::new(NoopExecutor, chain.clone()),
            // No endpoints configured: fee refreshes fail fast offline
            FeeFetcher::new(
                chain,
                FeeEndpoints::default(),
                bad_pool_cache(Duration::from_secs(60)),
            ),
            store,
            test_registry(),
            Duration::from_millis(10),
            targets,
        )
    }

    #[test]
    fn test_run_stops_when_channel_closes() {
        tokio_test::block_on(async {
            let (tx, rx) = watch::channel(WatchTarget {
                account: None,
                chain_id: 1,
            });
            drop(tx);

            let driver = test_driver(rx, Arc::new(FarmStore::new()));
            assert!(driver.run().await.is_ok());
        });
    }

    #[test]
    fn test_refresh_skips_foreign_chain() {
        tokio_test::block_on(async {
            let (_tx, rx) = watch::channel(WatchTarget {
                account: None,
                chain_id: 1,
            });
            let store = Arc::new(FarmStore::new());
            let mut driver = test_driver(rx, Arc::clone(&store));

            driver
                .refresh(&WatchTarget {
                    account: Some(address!("00000000000000000000000000000000000a11ce")),
                    chain_id: 137,
                })
                .await;

            let state = store.snapshot(1).await;
            assert!(!state.loading);
            assert!(state.farms.is_none());
        });
    }

    #[test]
    fn test_refresh_without_account_skips_harvest() {
        tokio_test::block_on(async {
            let (_tx, rx) = watch::channel(WatchTarget {
                account: None,
                chain_id: 1,
            });
            let store = Arc::new(FarmStore::new());
            let mut driver = test_driver(rx, Arc::clone(&store));

            driver
                .refresh(&WatchTarget {
                    account: None,
                    chain_id: 1,
                })
                .await;

            // No harvest ran, no fee endpoints answered: store untouched
            let state = store.snapshot(1).await;
            assert!(!state.loading);
            assert!(state.farms.is_none());
            assert!(state.pool_fee_last_24h.is_empty());
        });
    }
}
