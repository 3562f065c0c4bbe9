//! Farm registry
//!
//! Static description of the farm contracts being tracked on one chain:
//! which farms exist, which pools each farm rewards, and what the reward
//! tokens are. Loaded once from a TOML file, e.g.:
//!
//! ```toml
//! chain_id = 1
//!
//! [[farms]]
//! address = "0xb85ebE2e4eA27526f817FF33fb55fB240057C03F"
//! name = "main farm"
//!
//! [[farms.pools]]
//! pid = 3
//! pool = "0x88e6A0c2dDD26FEEb64F039a2c41296FcB3f5640"
//!
//! [[farms.pools.reward_tokens]]
//! address = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"
//! symbol = "WETH"
//! decimals = 18
//! ```

use alloy_primitives::Address;
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// A token a pool pays rewards in. The order of a pool's reward token
/// list matches the order of `rewardPending` amounts on chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardToken {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// A reward-bearing pool inside a farm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmPool {
    /// Pool id inside the farm contract
    pub pid: u64,
    /// The liquidity pool this entry stakes
    pub pool: Address,
    #[serde(default)]
    pub reward_tokens: Vec<RewardToken>,
}

/// One farm contract and its pools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Farm {
    pub address: Address,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pools: Vec<FarmPool>,
}

impl Farm {
    pub fn pool(&self, pid: u64) -> Option<&FarmPool> {
        self.pools.iter().find(|p| p.pid == pid)
    }
}

/// All farms tracked on one chain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FarmRegistry {
    pub chain_id: u64,
    #[serde(default)]
    pub farms: Vec<Farm>,
}

impl FarmRegistry {
    /// Load a registry from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let registry: Self = toml::from_str(&content)?;
        Ok(registry)
    }

    /// Save the registry to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Sanity-check the registry before use
    pub fn validate(&self) -> Result<()> {
        let mut seen_farms = HashSet::new();
        for farm in &self.farms {
            if !seen_farms.insert(farm.address) {
                return Err(eyre!("Duplicate farm address {:?} in registry", farm.address));
            }
            let mut seen_pids = HashSet::new();
            for pool in &farm.pools {
                if !seen_pids.insert(pool.pid) {
                    return Err(eyre!(
                        "Duplicate pid {} in farm {:?}",
                        pool.pid,
                        farm.address
                    ));
                }
            }
        }
        Ok(())
    }

    /// Every pool address referenced by any farm (duplicates preserved,
    /// the fee query tolerates them)
    pub fn pool_addresses(&self) -> Vec<Address> {
        self.farms
            .iter()
            .flat_map(|f| f.pools.iter().map(|p| p.pool))
            .collect()
    }

    pub fn total_pools(&self) -> usize {
        self.farms.iter().map(|f| f.pools.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.farms.is_empty()
    }
}

// ============================================
// TESTS
// ============================================
