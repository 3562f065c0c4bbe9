//! Per-chain deployment constants
//!
//! Everything the pipeline needs to talk to one chain lives here:
//! Multicall3, the NFT position manager, the pool factory and its init
//! code hash (for deterministic pool address derivation), plus default
//! data-service endpoints. Values can be overridden via `Config`.

use alloy_primitives::{address, b256, Address, B256};
use lazy_static::lazy_static;
use std::collections::HashMap;

/// Multicall3 - deployed at the same address on all EVM chains
pub const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// Deployment + endpoint info for one supported chain
#[derive(Debug, Clone)]
pub struct ChainInfo {
    pub chain_id: u64,
    pub name: &'static str,
    pub multicall3: Address,
    /// Nonfungible position manager (source of `positions(id)`)
    pub position_manager: Address,
    /// Pool factory used in CREATE2 pool address derivation
    pub pool_factory: Address,
    /// Hash of the pool contract's creation code
    pub pool_init_code_hash: B256,
    /// Exchange subgraph (feesUSD queries); None = must be configured
    pub exchange_subgraph: Option<&'static str>,
    /// Blocks subgraph, fallback for timestamp -> block resolution
    pub block_subgraph: Option<&'static str>,
    /// Path segment for the block service REST API
    pub block_service_route: &'static str,
    /// Default public RPC endpoint
    pub default_rpc_url: &'static str,
}

// The position manager, factory and init code hash are identical across
// these chains (same bytecode deployed deterministically).
const POSITION_MANAGER: Address = address!("C36442b4a4522E871399CD717aBDD847Ab11FE88");
const POOL_FACTORY: Address = address!("1F98431c8aD98523631AE4a59f267346ea31F984");
const POOL_INIT_CODE_HASH: B256 =
    b256!("e34f199b19b2b4f47f68442619d555527d244f78a3297ea89325f843f87b8b54");

lazy_static! {
    pub static ref CHAINS: HashMap<u64, ChainInfo> = {
        let mut m = HashMap::new();

        m.insert(1, ChainInfo {
            chain_id: 1,
            name: "Ethereum",
            multicall3: MULTICALL3,
            position_manager: POSITION_MANAGER,
            pool_factory: POOL_FACTORY,
            pool_init_code_hash: POOL_INIT_CODE_HASH,
            exchange_subgraph: Some("https://api.thegraph.com/subgraphs/name/uniswap/uniswap-v3"),
            block_subgraph: Some("https://api.thegraph.com/subgraphs/name/blocklytics/ethereum-blocks"),
            block_service_route: "ethereum",
            default_rpc_url: "https://eth.llamarpc.com",
        });

        m.insert(10, ChainInfo {
            chain_id: 10,
            name: "Optimism",
            multicall3: MULTICALL3,
            position_manager: POSITION_MANAGER,
            pool_factory: POOL_FACTORY,
            pool_init_code_hash: POOL_INIT_CODE_HASH,
            exchange_subgraph: None,
            block_subgraph: None,
            block_service_route: "optimism",
            default_rpc_url: "https://mainnet.optimism.io",
        });

        m.insert(137, ChainInfo {
            chain_id: 137,
            name: "Polygon",
            multicall3: MULTICALL3,
            position_manager: POSITION_MANAGER,
            pool_factory: POOL_FACTORY,
            pool_init_code_hash: POOL_INIT_CODE_HASH,
            exchange_subgraph: None,
            block_subgraph: None,
            block_service_route: "polygon",
            default_rpc_url: "https://polygon-rpc.com",
        });

        m.insert(42161, ChainInfo {
            chain_id: 42161,
            name: "Arbitrum",
            multicall3: MULTICALL3,
            position_manager: POSITION_MANAGER,
            pool_factory: POOL_FACTORY,
            pool_init_code_hash: POOL_INIT_CODE_HASH,
            exchange_subgraph: None,
            block_subgraph: None,
            block_service_route: "arbitrum",
            default_rpc_url: "https://arb1.arbitrum.io/rpc",
        });

        m
    };
}

/// Look up a supported chain by id
pub fn chain_info(chain_id: u64) -> Option<&'static ChainInfo> {
    CHAINS.get(&chain_id)
}

pub fn is_supported(chain_id: u64) -> bool {
    CHAINS.contains_key(&chain_id)
}

// ============================================
// TESTS
// ============================================
