//! 24h pool fee enrichment
//!
//! Resolves the block nearest to 24 hours ago, then asks the exchange
//! subgraph what each farmed pool's cumulative `feesUSD` was at that
//! block. Block resolution tries the block service REST API first and
//! falls back to the blocks subgraph. Pools the subgraph does not know
//! land in a TTL cache so they stay out of subsequent queries until the
//! entry expires.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use alloy_primitives::Address;
use chrono::Utc;
use eyre::{eyre, Result};
use moka::future::Cache;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::chains::ChainInfo;

const SECONDS_PER_DAY: u64 = 86_400;
/// Timestamps are bucketed so repeated lookups within the window share
/// one cache entry
const BLOCK_BUCKET_SECS: u64 = 300;
/// Width of the search window handed to the blocks subgraph
const BLOCK_WINDOW_SECS: u64 = 600;

const POOL_FEE_QUERY: &str = "query poolFees($block: Int!, $poolIds: [String]!) { \
     pools(block: { number: $block }, where: { id_in: $poolIds }) { id feesUSD } }";

const BLOCKS_QUERY: &str = "query blocks($start: Int!, $end: Int!) { \
     blocks(first: 1, orderBy: timestamp, orderDirection: asc, \
     where: { timestamp_gt: $start, timestamp_lt: $end }) { number } }";

/// Where fee data comes from for one chain. Any endpoint can be absent;
/// the fetcher degrades to whatever is still reachable.
#[derive(Debug, Clone, Default)]
pub struct FeeEndpoints {
    pub block_service_base: Option<String>,
    pub exchange_subgraph: Option<String>,
    pub block_subgraph: Option<String>,
}

impl FeeEndpoints {
    /// Subgraph endpoints from the chain table, no block service
    pub fn for_chain(chain: &ChainInfo) -> Self {
        Self {
            block_service_base: None,
            exchange_subgraph: chain.exchange_subgraph.map(str::to_string),
            block_subgraph: chain.block_subgraph.map(str::to_string),
        }
    }
}

/// Build the bad-pool cache handed to `FeeFetcher::new`. Owning it at
/// the call site keeps the suppression window a caller decision.
pub fn bad_pool_cache(ttl: Duration) -> Cache<Address, ()> {
    Cache::builder()
        .max_capacity(10_000)
        .time_to_live(ttl)
        .build()
}

pub struct FeeFetcher {
    http: Client,
    chain: ChainInfo,
    endpoints: FeeEndpoints,
    block_cache: Cache<u64, u64>,
    bad_pools: Cache<Address, ()>,
}

impl FeeFetcher {
    pub fn new(chain: ChainInfo, endpoints: FeeEndpoints, bad_pools: Cache<Address, ()>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            chain,
            endpoints,
            block_cache: Cache::builder()
                .max_capacity(16)
                .time_to_live(Duration::from_secs(3600))
                .build(),
            bad_pools,
        }
    }

    /// Block number closest to 24 hours ago, bucketed and cached
    pub async fn resolve_block_24h(&self) -> Result<u64> {
        let now = Utc::now().timestamp() as u64;
        let bucket = bucket_timestamp(now);

        if let Some(block) = self.block_cache.get(&bucket).await {
            return Ok(block);
        }

        let block = match self.resolve_via_service(bucket).await {
            Ok(block) => block,
            Err(err) => {
                debug!("Block service lookup failed ({:#}), trying subgraph", err);
                self.resolve_via_subgraph(bucket).await?
            }
        };

        debug!("Block at 24h ago for {}: {}", self.chain.name, block);
        self.block_cache.insert(bucket, block).await;
        Ok(block)
    }

    async fn resolve_via_service(&self, timestamp: u64) -> Result<u64> {
        let base = match &self.endpoints.block_service_base {
            Some(base) => base,
            None => return Err(eyre!("No block service configured")),
        };

        let url = format!(
            "{}/{}/api/v1/block?timestamps={}",
            base.trim_end_matches('/'),
            self.chain.block_service_route,
            timestamp
        );
        let resp: BlockServiceResponse = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match resp.data.first() {
            Some(entry) => {
                debug!("Block service: block {} at ts {}", entry.number, entry.timestamp);
                Ok(entry.number)
            }
            None => Err(eyre!("Block service had no block for ts {}", timestamp)),
        }
    }

    async fn resolve_via_subgraph(&self, timestamp: u64) -> Result<u64> {
        let endpoint = match &self.endpoints.block_subgraph {
            Some(endpoint) => endpoint,
            None => return Err(eyre!("No block subgraph configured")),
        };

        let variables = json!({
            "start": timestamp,
            "end": timestamp + BLOCK_WINDOW_SECS,
        });
        let data: BlocksData = self.graphql(endpoint, BLOCKS_QUERY, variables).await?;
        let row = data
            .blocks
            .first()
            .ok_or_else(|| eyre!("Block subgraph had no block for ts {}", timestamp))?;
        Ok(row.number.parse()?)
    }

    /// Cumulative `feesUSD` per pool at the given block. Pools in the
    /// bad-id cache are filtered out up front; pools absent from the
    /// answer are added to it.
    pub async fn pool_fees_at(
        &self,
        block: u64,
        pools: &[Address],
    ) -> Result<HashMap<Address, f64>> {
        let endpoint = match &self.endpoints.exchange_subgraph {
            Some(endpoint) => endpoint.clone(),
            None => {
                return Err(eyre!(
                    "No exchange subgraph configured for {}",
                    self.chain.name
                ))
            }
        };

        let queried: Vec<Address> = pools
            .iter()
            .filter(|pool| !self.bad_pools.contains_key(*pool))
            .copied()
            .collect();
        if queried.is_empty() {
            return Ok(HashMap::new());
        }

        let data: PoolsData = self
            .graphql(&endpoint, POOL_FEE_QUERY, fee_query_variables(block, &queried))
            .await?;

        let mut fees = HashMap::new();
        let mut answered = HashSet::new();
        for row in &data.pools {
            let address: Address = match row.id.parse() {
                Ok(address) => address,
                Err(_) => {
                    warn!("✗ Subgraph returned unparseable pool id {:?}", row.id);
                    continue;
                }
            };
            answered.insert(address);

            match row.fees_usd.parse::<f64>() {
                Ok(value) => {
                    fees.insert(address, value);
                }
                Err(_) => warn!("✗ Pool {:#x}: unparseable feesUSD {:?}", address, row.fees_usd),
            }
        }

        for pool in &queried {
            if !answered.contains(pool) {
                debug!("Pool {:#x} unknown to subgraph, suppressing", pool);
                self.bad_pools.insert(*pool, ()).await;
            }
        }

        Ok(fees)
    }

    /// Resolve the 24h block and fetch fees in one go
    pub async fn fetch_pool_fees(
        &self,
        pools: &[Address],
    ) -> Result<(u64, HashMap<Address, f64>)> {
        let block = self.resolve_block_24h().await?;
        let fees = self.pool_fees_at(block, pools).await?;
        Ok((block, fees))
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let resp: GraphResponse<T> = self
            .http
            .post(endpoint)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = resp.errors.first() {
            return Err(eyre!("Subgraph error: {}", err.message));
        }
        resp.data.ok_or_else(|| eyre!("Subgraph response had no data"))
    }
}

fn bucket_timestamp(now: u64) -> u64 {
    let target = now.saturating_sub(SECONDS_PER_DAY);
    target - target % BLOCK_BUCKET_SECS
}

fn fee_query_variables(block: u64, pools: &[Address]) -> serde_json::Value {
    let ids: Vec<String> = pools.iter().map(|pool| format!("{:#x}", pool)).collect();
    json!({ "block": block, "poolIds": ids })
}

#[derive(Debug, Deserialize)]
struct BlockServiceResponse {
    data: Vec<BlockServiceEntry>,
}

#[derive(Debug, Deserialize)]
struct BlockServiceEntry {
    number: u64,
    timestamp: u64,
}

#[derive(Debug, Deserialize)]
struct GraphResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct BlocksData {
    blocks: Vec<BlockRow>,
}

#[derive(Debug, Deserialize)]
struct BlockRow {
    number: String,
}

#[derive(Debug, Deserialize)]
struct PoolsData {
    pools: Vec<PoolFeeRow>,
}

#[derive(Debug, Deserialize)]
struct PoolFeeRow {
    id: String,
    #[serde(rename = "feesUSD")]
    fees_usd: String,
}

// ============================================
// TESTS
// ============================================
