//! The three-round harvest pipeline
//!
//! Round 1 asks every farm for the account's deposited NFTs. Round 2
//! resolves the union of those NFTs through the position manager and
//! derives each one's pool. Round 3 queries `getUserInfo` for every
//! matched (NFT, pool) pair, farm by farm. All rounds go through the
//! injected executor so tests can script the chain.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use alloy_primitives::{Address, U256};
use eyre::{eyre, Result};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::multicall::{CallExecutor, ReadCall};
use super::positions::{
    decode_position, derive_pool_address, encode_positions_call, ResolvedPosition,
};
use super::rewards::{
    decode_deposited_nfts, decode_user_info, encode_deposited_nfts_call, encode_user_info_call,
    match_positions,
};
use super::{assemble_user_info, FarmUserInfo};
use crate::chains::ChainInfo;
use crate::farms::Farm;

pub struct Harvester<E> {
    executor: E,
    chain: ChainInfo,
}

/// Everything one harvest produced, keyed by farm address
#[derive(Debug, Clone, Default, Serialize)]
pub struct HarvestReport {
    pub user_info: HashMap<Address, FarmUserInfo>,
    pub nft_count: usize,
    pub resolved_count: usize,
    pub pair_count: usize,
}

impl<E: CallExecutor> Harvester<E> {
    pub fn new(executor: E, chain: ChainInfo) -> Self {
        Self { executor, chain }
    }

    pub fn chain(&self) -> &ChainInfo {
        &self.chain
    }

    /// Run the full pipeline for one account against the given farms.
    ///
    /// Per-farm and per-NFT failures degrade to empty entries; only
    /// transport-level failures surface as errors.
    pub async fn harvest(&self, account: Address, farms: &[Farm]) -> Result<HarvestReport> {
        let started = Instant::now();

        // Round 1: deposited NFTs, one call per farm
        let calls: Vec<ReadCall> = farms
            .iter()
            .map(|farm| ReadCall {
                target: farm.address,
                calldata: encode_deposited_nfts_call(account),
            })
            .collect();
        let results = self.executor.execute(calls).await?;
        if results.len() != farms.len() {
            return Err(eyre!(
                "Deposited NFT round returned {} results for {} farms",
                results.len(),
                farms.len()
            ));
        }

        let nft_lists: Vec<Vec<U256>> = farms
            .iter()
            .zip(results.iter())
            .map(|(farm, result)| match decode_deposited_nfts(result).ok() {
                Some(list) => list,
                None => {
                    warn!("✗ Farm {}: deposited NFT query failed", farm.address);
                    Vec::new()
                }
            })
            .collect();

        // Union of NFT ids across farms, first-seen order
        let mut seen = HashSet::new();
        let mut all_nfts = Vec::new();
        for list in &nft_lists {
            for nft_id in list {
                if seen.insert(*nft_id) {
                    all_nfts.push(*nft_id);
                }
            }
        }

        if all_nfts.is_empty() {
            debug!("No deposited NFTs, skipping position and stake rounds");
            let user_info = farms
                .iter()
                .map(|farm| (farm.address, FarmUserInfo::default()))
                .collect();
            return Ok(HarvestReport {
                user_info,
                ..Default::default()
            });
        }

        // Round 2: resolve every NFT through the position manager
        let calls: Vec<ReadCall> = all_nfts
            .iter()
            .map(|nft_id| ReadCall {
                target: self.chain.position_manager,
                calldata: encode_positions_call(*nft_id),
            })
            .collect();
        let results = self.executor.execute(calls).await?;
        if results.len() != all_nfts.len() {
            return Err(eyre!(
                "Position round returned {} results for {} NFTs",
                results.len(),
                all_nfts.len()
            ));
        }

        let mut resolved: HashMap<U256, ResolvedPosition> = HashMap::new();
        for (nft_id, result) in all_nfts.iter().zip(results.iter()) {
            match decode_position(result).ok() {
                Some(details) => {
                    let pool = derive_pool_address(
                        self.chain.pool_factory,
                        &details.pool_key(),
                        self.chain.pool_init_code_hash,
                    );
                    resolved.insert(
                        *nft_id,
                        ResolvedPosition {
                            nft_id: *nft_id,
                            pool,
                            details,
                        },
                    );
                }
                None => debug!("✗ NFT {}: position lookup failed, excluding", nft_id),
            }
        }

        // Round 3: per-farm stake queries for every matched pair
        let matched: Vec<_> = farms
            .iter()
            .zip(nft_lists.iter())
            .map(|(farm, nft_ids)| match_positions(farm, nft_ids, &resolved))
            .collect();
        let pair_count: usize = matched.iter().map(|(_, pairs)| pairs.len()).sum();

        let farm_futs: Vec<_> = farms
            .iter()
            .zip(matched)
            .map(|(farm, (deposited, pairs))| async move {
                if pairs.is_empty() {
                    return Ok::<_, eyre::Report>(FarmUserInfo {
                        deposited_positions: deposited,
                        ..Default::default()
                    });
                }

                let calls: Vec<ReadCall> = pairs
                    .iter()
                    .map(|pair| ReadCall {
                        target: farm.address,
                        calldata: encode_user_info_call(pair.nft_id, pair.pid),
                    })
                    .collect();
                let results = self.executor.execute(calls).await?;
                if results.len() != pairs.len() {
                    return Err(eyre!(
                        "Stake round returned {} results for {} pairs",
                        results.len(),
                        pairs.len()
                    ));
                }

                let outcomes: Vec<_> = results.iter().map(decode_user_info).collect();
                Ok(assemble_user_info(farm, deposited, &pairs, &outcomes))
            })
            .collect();

        let mut user_info = HashMap::new();
        for (farm, result) in farms.iter().zip(join_all(farm_futs).await) {
            user_info.insert(farm.address, result?);
        }

        info!(
            "⚡ Harvest complete: {} farms, {} NFTs ({} resolved), {} stakes in {:?}",
            farms.len(),
            all_nfts.len(),
            resolved.len(),
            pair_count,
            started.elapsed()
        );

        Ok(HarvestReport {
            nft_count: all_nfts.len(),
            resolved_count: resolved.len(),
            pair_count,
            user_info,
        })
    }
}

// ============================================
// TESTS
// ============================================
