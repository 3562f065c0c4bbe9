//! The Harvester - onchain farm position tracking
//!
//! Keeps a per-chain picture of everything an account has staked in a
//! set of liquidity-mining farms: deposited position NFTs, per-pool
//! joined positions, pending reward balances, and each farmed pool's
//! cumulative fees as of 24 hours ago. Chain reads are batched through
//! Multicall3 in three rounds, fee data comes from subgraphs, and all
//! results land in a store where a stale refresh can never overwrite a
//! newer one.

pub mod chains;
pub mod config;
pub mod driver;
pub mod farms;
pub mod fees;
pub mod harvester;
pub mod store;

pub use config::Config;
pub use driver::{RefreshDriver, WatchTarget};
pub use farms::FarmRegistry;
pub use fees::FeeFetcher;
pub use harvester::{Harvester, HarvestReport, Multicall3Client};
pub use store::{ChainFarmState, FarmStore};
