//! The Harvester - on-chain position & reward aggregation
//!
//! One refresh = three Multicall3 rounds: deposited NFT ids per farm,
//! then position details per NFT, then stake info per (NFT, pool) pair.
//! Pool attribution between rounds two and three is a local CREATE2
//! derivation, no extra RPC.

mod multicall;
mod pipeline;
mod positions;
mod rewards;

pub use multicall::{
    decode_return, CallExecutor, CallResult, DecodeOutcome, Multicall3Client, ReadCall,
    MAX_CALLS_PER_BATCH,
};
pub use pipeline::{Harvester, HarvestReport};
pub use positions::{
    decode_position, derive_pool_address, encode_positions_call, PoolKey, PositionDetails,
    ResolvedPosition,
};
pub use rewards::{
    assemble_user_info, decode_deposited_nfts, decode_user_info, encode_deposited_nfts_call,
    encode_user_info_call, match_positions, QueryPair, UserStakeInfo,
};

use alloy_primitives::{Address, U256};
use serde::{Serialize, Serializer};
use std::collections::HashMap;

use crate::farms::{Farm, RewardToken};

/// An NFT position deposited into a farm contract, attributed to one of
/// the farm's pools via its derived pool address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepositedPosition {
    pub nft_id: U256,
    pub pool: Address,
    pub token0: Address,
    pub token1: Address,
    pub fee: u32,
    pub tick_lower: i32,
    pub tick_upper: i32,
    /// Liquidity as reported by the position manager
    pub liquidity: u128,
}

/// A deposited position confirmed as staked in a specific farm pool.
/// Tick bounds are carried over from the deposited position; liquidity
/// is re-read from the farm contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinedPosition {
    pub nft_id: U256,
    pub pid: u64,
    pub pool: Address,
    pub liquidity: U256,
    pub tick_lower: i32,
    pub tick_upper: i32,
}

/// Everything the pipeline learned about one account on one farm.
/// Rebuilt wholesale every refresh.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FarmUserInfo {
    pub deposited_positions: Vec<DepositedPosition>,
    /// Staked positions keyed by pool id
    pub joined_positions: HashMap<u64, Vec<JoinedPosition>>,
    /// Per-pool pending reward totals, index-aligned with the pool's
    /// reward token list
    pub reward_pendings: HashMap<u64, Vec<U256>>,
    /// Per-position pending rewards keyed by (pool id, NFT id)
    #[serde(serialize_with = "ser_reward_by_nft")]
    pub reward_by_nft: HashMap<(u64, U256), Vec<U256>>,
}

impl FarmUserInfo {
    pub fn joined_count(&self) -> usize {
        self.joined_positions.values().map(Vec::len).sum()
    }

    pub fn has_rewards(&self) -> bool {
        self.reward_pendings
            .values()
            .any(|amounts| amounts.iter().any(|a| !a.is_zero()))
    }

    /// Total pending rewards per token across all of the farm's pools
    pub fn rewards_by_token<'a>(&self, farm: &'a Farm) -> Vec<(&'a RewardToken, U256)> {
        let mut totals: Vec<(&RewardToken, U256)> = Vec::new();
        for (pid, amounts) in &self.reward_pendings {
            let pool = match farm.pool(*pid) {
                Some(p) => p,
                None => continue,
            };
            for (i, token) in pool.reward_tokens.iter().enumerate() {
                let amount = amounts.get(i).copied().unwrap_or(U256::ZERO);
                match totals.iter_mut().find(|(t, _)| t.address == token.address) {
                    Some((_, sum)) => *sum += amount,
                    None => totals.push((token, amount)),
                }
            }
        }
        totals
    }
}

// reward_by_nft keys serialize as "pid_nftId" so dumps stay plain JSON
// objects
fn ser_reward_by_nft<S: Serializer>(
    map: &HashMap<(u64, U256), Vec<U256>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(map.iter().map(|((pid, nft_id), v)| (format!("{}_{}", pid, nft_id), v)))
}
