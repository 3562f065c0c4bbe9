//! Configuration for The Harvester
//!
//! Everything is settable from the environment (with a .env file picked
//! up automatically) or a TOML file. The chain table supplies contract
//! addresses and subgraph endpoints; the config can override any of
//! them for forks and self-hosted indexers.

use alloy_primitives::{Address, B256};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::chains::{self, ChainInfo};
use crate::fees::FeeEndpoints;

// ============================================
// MAIN CONFIGURATION
// ============================================

/// Main configuration struct for The Harvester
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ========== Network Settings ==========
    /// RPC URL override. Falls back to the chain table's public RPC.
    pub rpc_url: Option<String>,

    /// Chain ID (1 = Ethereum Mainnet)
    pub chain_id: u64,

    // ========== Watch Settings ==========
    /// Account whose farm positions to track. Fee data still refreshes
    /// without one.
    pub account: Option<String>,

    /// Path to the farm registry TOML
    pub farms_file: String,

    /// Seconds between refresh runs in watch mode
    pub refresh_interval_secs: u64,

    /// Keep refreshing on an interval (false = single pass)
    pub poll: bool,

    // ========== Fee Data Sources ==========
    /// Block service base URL, e.g. a hosted block API
    pub block_service_base: Option<String>,

    /// Exchange subgraph URL override
    pub exchange_subgraph: Option<String>,

    /// Blocks subgraph URL override
    pub block_subgraph: Option<String>,

    /// How long an unknown pool stays suppressed from fee queries
    pub bad_pool_ttl_secs: u64,

    // ========== Contract Overrides ==========
    /// NFT position manager override (forks, alternate deployments)
    pub position_manager: Option<String>,

    /// Pool factory override
    pub pool_factory: Option<String>,

    /// Pool init code hash override
    pub pool_init_code_hash: Option<String>,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            // Network
            rpc_url: env::var("RPC_URL").ok(),
            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),

            // Watch
            account: env::var("ACCOUNT").ok(),
            farms_file: env::var("FARMS_FILE").unwrap_or_else(|_| "farms.toml".to_string()),
            refresh_interval_secs: env::var("REFRESH_INTERVAL_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            poll: env::var("POLL")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),

            // Fee data sources
            block_service_base: env::var("BLOCK_SERVICE_API").ok(),
            exchange_subgraph: env::var("EXCHANGE_SUBGRAPH_URL").ok(),
            block_subgraph: env::var("BLOCK_SUBGRAPH_URL").ok(),
            bad_pool_ttl_secs: env::var("BAD_POOL_TTL_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .unwrap_or(600),

            // Contract overrides
            position_manager: env::var("POSITION_MANAGER").ok(),
            pool_factory: env::var("POOL_FACTORY").ok(),
            pool_init_code_hash: env::var("POOL_INIT_CODE_HASH").ok(),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// The chain table entry for this config with contract overrides
    /// applied
    pub fn chain_info(&self) -> Result<ChainInfo> {
        let mut chain = chains::chain_info(self.chain_id)
            .ok_or_else(|| {
                eyre::eyre!(
                    "Unsupported CHAIN_ID {} (supported: {})",
                    self.chain_id,
                    supported_chain_list()
                )
            })?
            .clone();

        if let Some(raw) = &self.position_manager {
            chain.position_manager = Address::from_str(raw.trim())
                .map_err(|_| eyre::eyre!("Invalid POSITION_MANAGER address: {}", raw))?;
        }
        if let Some(raw) = &self.pool_factory {
            chain.pool_factory = Address::from_str(raw.trim())
                .map_err(|_| eyre::eyre!("Invalid POOL_FACTORY address: {}", raw))?;
        }
        if let Some(raw) = &self.pool_init_code_hash {
            chain.pool_init_code_hash = B256::from_str(raw.trim())
                .map_err(|_| eyre::eyre!("Invalid POOL_INIT_CODE_HASH: {}", raw))?;
        }

        Ok(chain)
    }

    /// Fee endpoints: chain table defaults, then config overrides
    pub fn fee_endpoints(&self, chain: &ChainInfo) -> FeeEndpoints {
        let mut endpoints = FeeEndpoints::for_chain(chain);
        if let Some(base) = &self.block_service_base {
            endpoints.block_service_base = Some(base.clone());
        }
        if let Some(url) = &self.exchange_subgraph {
            endpoints.exchange_subgraph = Some(url.clone());
        }
        if let Some(url) = &self.block_subgraph {
            endpoints.block_subgraph = Some(url.clone());
        }
        endpoints
    }

    pub fn resolve_rpc_url(&self, chain: &ChainInfo) -> String {
        match &self.rpc_url {
            Some(url) => url.clone(),
            None => chain.default_rpc_url.to_string(),
        }
    }

    /// Parsed watch account, if one is configured
    pub fn account_address(&self) -> Result<Option<Address>> {
        match &self.account {
            Some(raw) => {
                let parsed = Address::from_str(raw.trim())
                    .map_err(|_| eyre::eyre!("Invalid ACCOUNT address: {}", raw))?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn bad_pool_ttl(&self) -> Duration {
        Duration::from_secs(self.bad_pool_ttl_secs)
    }

    /// Validate configuration before starting
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.rpc_url {
            if url.is_empty() || url.contains("YOUR_API_KEY") {
                return Err(eyre::eyre!("Invalid RPC_URL - please set a valid endpoint"));
            }
        }
        if self.farms_file.is_empty() {
            return Err(eyre::eyre!("FARMS_FILE must point to a farm registry"));
        }
        if self.refresh_interval_secs == 0 {
            return Err(eyre::eyre!("REFRESH_INTERVAL_SECS must be at least 1"));
        }
        if self.bad_pool_ttl_secs == 0 {
            return Err(eyre::eyre!("BAD_POOL_TTL_SECS must be at least 1"));
        }

        // Parse checks for addresses and overrides
        self.account_address()?;
        self.chain_info()?;

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let chain_label = match chains::chain_info(self.chain_id) {
            Some(chain) => format!("{} ({})", chain.name, chain.chain_id),
            None => format!("Unknown ({})", self.chain_id),
        };

        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║             THE HARVESTER - CONFIGURATION                  ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chain:             {:^40} ║", chain_label);
        println!(
            "║ RPC:               {:^40} ║",
            if self.rpc_url.is_some() { "✓ Custom" } else { "• Chain default" }
        );
        println!(
            "║ Account:           {:^40} ║",
            match &self.account {
                Some(account) => short_address(account),
                None => "✗ Fee data only".to_string(),
            }
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ WATCH                                                      ║");
        println!("║ • Farms File:      {:^40} ║", self.farms_file);
        println!("║ • Interval:        {:^40} ║", format!("{}s", self.refresh_interval_secs));
        println!(
            "║ • Poll Mode:       {:^40} ║",
            if self.poll { "✓ Enabled" } else { "✗ Single pass" }
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ FEE DATA                                                   ║");
        println!(
            "║ • Block Service:   {:^40} ║",
            if self.block_service_base.is_some() { "✓ Configured" } else { "✗ Not Set" }
        );
        println!(
            "║ • Exchange Graph:  {:^40} ║",
            if self.exchange_subgraph.is_some() { "✓ Custom" } else { "• Chain default" }
        );
        println!(
            "║ • Blocks Graph:    {:^40} ║",
            if self.block_subgraph.is_some() { "✓ Custom" } else { "• Chain default" }
        );
        println!("║ • Bad Pool TTL:    {:^40} ║", format!("{}s", self.bad_pool_ttl_secs));
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: None,
            chain_id: 1,
            account: None,
            farms_file: "farms.toml".to_string(),
            refresh_interval_secs: 10,
            poll: true,
            block_service_base: None,
            exchange_subgraph: None,
            block_subgraph: None,
            bad_pool_ttl_secs: 600,
            position_manager: None,
            pool_factory: None,
            pool_init_code_hash: None,
        }
    }
}

fn supported_chain_list() -> String {
    let mut ids: Vec<u64> = chains::CHAINS.keys().copied().collect();
    ids.sort_unstable();
    ids.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn short_address(raw: &str) -> String {
    if raw.len() > 12 {
        format!("{}...{}", &raw[..6], &raw[raw.len() - 4..])
    } else {
        raw.to_string()
    }
}

// ============================================
// TESTS
// ============================================
