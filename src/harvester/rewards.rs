//! Farm staking queries
//!
//! Wraps the two read calls every farm contract answers: which NFTs an
//! account has deposited, and the (liquidity, pending rewards) pair for
//! one NFT in one pool. On top of those sit the two pure passes of the
//! pipeline: matching resolved NFTs against a farm's pool list, and
//! folding per-(NFT, pool) stakes into the per-farm summary.

use std::collections::HashMap;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};

use super::multicall::{decode_return, CallResult, DecodeOutcome};
use super::positions::ResolvedPosition;
use super::{DepositedPosition, FarmUserInfo, JoinedPosition};
use crate::farms::Farm;

sol! {
    interface IFarmCore {
        function getDepositedNFTs(address user) external view returns (uint256[] memory listNFTs);
        function getUserInfo(uint256 nftId, uint256 pid) external view returns (uint256 liquidity, uint256[] memory rewardPending);
    }
}

/// One staked (NFT, pool) combination to query `getUserInfo` for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPair {
    pub nft_id: U256,
    pub pid: u64,
}

/// Decoded `getUserInfo` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStakeInfo {
    pub liquidity: U256,
    pub reward_pending: Vec<U256>,
}

pub fn encode_deposited_nfts_call(account: Address) -> Bytes {
    IFarmCore::getDepositedNFTsCall { user: account }
        .abi_encode()
        .into()
}

pub fn encode_user_info_call(nft_id: U256, pid: u64) -> Bytes {
    IFarmCore::getUserInfoCall {
        nftId: nft_id,
        pid: U256::from(pid),
    }
    .abi_encode()
    .into()
}

pub fn decode_deposited_nfts(result: &CallResult) -> DecodeOutcome<Vec<U256>> {
    decode_return::<IFarmCore::getDepositedNFTsCall>(result)
}

pub fn decode_user_info(result: &CallResult) -> DecodeOutcome<UserStakeInfo> {
    decode_return::<IFarmCore::getUserInfoCall>(result).map(|r| UserStakeInfo {
        liquidity: r.liquidity,
        reward_pending: r.rewardPending,
    })
}

/// Match the account's NFTs against one farm's pool list.
///
/// An NFT whose `positions()` lookup failed is skipped entirely. Every
/// pool whose address equals the NFT's derived pool produces a
/// `QueryPair`; the first match also records the NFT as a deposited
/// position. NFTs parked in the farm without a matching pool produce
/// neither.
pub fn match_positions(
    farm: &Farm,
    nft_ids: &[U256],
    resolved: &HashMap<U256, ResolvedPosition>,
) -> (Vec<DepositedPosition>, Vec<QueryPair>) {
    let mut deposited = Vec::new();
    let mut pairs = Vec::new();

    for nft_id in nft_ids {
        let res = match resolved.get(nft_id) {
            Some(r) => r,
            None => continue,
        };

        let mut first_match = None;
        for pool in &farm.pools {
            if pool.pool == res.pool {
                pairs.push(QueryPair {
                    nft_id: *nft_id,
                    pid: pool.pid,
                });
                if first_match.is_none() {
                    first_match = Some(pool);
                }
            }
        }

        if let Some(pool) = first_match {
            deposited.push(DepositedPosition {
                nft_id: *nft_id,
                pool: pool.pool,
                token0: res.details.token0,
                token1: res.details.token1,
                fee: res.details.fee,
                tick_lower: res.details.tick_lower,
                tick_upper: res.details.tick_upper,
                liquidity: res.details.liquidity,
            });
        }
    }

    (deposited, pairs)
}

/// Fold decoded `getUserInfo` answers into the per-farm summary.
///
/// `outcomes` is aligned index-for-index with `pairs`. A pair whose
/// call reverted or came back malformed contributes nothing. A decoded
/// pair always materializes its pid key in `joined_positions`, even
/// when the NFT or pool lookup below comes up empty.
pub fn assemble_user_info(
    farm: &Farm,
    deposited: Vec<DepositedPosition>,
    pairs: &[QueryPair],
    outcomes: &[DecodeOutcome<UserStakeInfo>],
) -> FarmUserInfo {
    let mut joined_positions: HashMap<u64, Vec<JoinedPosition>> = HashMap::new();
    let mut reward_pendings: HashMap<u64, Vec<U256>> = HashMap::new();
    let mut reward_by_nft: HashMap<(u64, U256), Vec<U256>> = HashMap::new();

    for (pair, outcome) in pairs.iter().zip(outcomes.iter()) {
        let stake = match outcome {
            DecodeOutcome::Decoded(s) => s,
            _ => continue,
        };

        joined_positions.entry(pair.pid).or_default();

        let position = deposited.iter().find(|p| p.nft_id == pair.nft_id);
        let pool = farm.pool(pair.pid);
        let (position, pool) = match (position, pool) {
            (Some(position), Some(pool)) => (position, pool),
            _ => continue,
        };

        joined_positions
            .entry(pair.pid)
            .or_default()
            .push(JoinedPosition {
                nft_id: pair.nft_id,
                pid: pair.pid,
                pool: pool.pool,
                liquidity: stake.liquidity,
                tick_lower: position.tick_lower,
                tick_upper: position.tick_upper,
            });

        // Amounts follow the pool's reward token list; a short answer
        // reads as zero for the missing tail.
        let amounts: Vec<U256> = (0..pool.reward_tokens.len())
            .map(|i| stake.reward_pending.get(i).copied().unwrap_or(U256::ZERO))
            .collect();

        let sums = reward_pendings
            .entry(pair.pid)
            .or_insert_with(|| vec![U256::ZERO; amounts.len()]);
        for (sum, amount) in sums.iter_mut().zip(amounts.iter()) {
            *sum += *amount;
        }

        reward_by_nft.insert((pair.pid, pair.nft_id), amounts);
    }

    FarmUserInfo {
        deposited_positions: deposited,
        joined_positions,
        reward_pendings,
        reward_by_nft,
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::farms::{FarmPool, RewardToken};
    use crate::harvester::positions::PositionDetails;
    use alloy_primitives::address;
    use alloy_sol_types::SolValue;

    const POOL_A: Address = address!("1111111111111111111111111111111111111111");
    const POOL_B: Address = address!("2222222222222222222222222222222222222222");
    const TOKEN_0: Address = address!("3333333333333333333333333333333333333333");
    const TOKEN_1: Address = address!("4444444444444444444444444444444444444444");
    const KNC: Address = address!("5555555555555555555555555555555555555555");
    const ARB: Address = address!("6666666666666666666666666666666666666666");

    fn reward_token(addr: Address, symbol: &str) -> RewardToken {
        RewardToken {
            address: addr,
            symbol: symbol.to_string(),
            decimals: 18,
        }
    }

    fn farm_fixture() -> Farm {
        Farm {
            address: address!("9999999999999999999999999999999999999999"),
            name: "test farm".to_string(),
            pools: vec![
                FarmPool {
                    pid: 1,
                    pool: POOL_A,
                    reward_tokens: vec![reward_token(KNC, "KNC"), reward_token(ARB, "ARB")],
                },
                FarmPool {
                    pid: 2,
                    pool: POOL_A,
                    reward_tokens: vec![reward_token(KNC, "KNC")],
                },
                FarmPool {
                    pid: 3,
                    pool: POOL_B,
                    reward_tokens: vec![reward_token(KNC, "KNC")],
                },
            ],
        }
    }

    fn resolved_fixture(nft_id: u64, pool: Address) -> ResolvedPosition {
        ResolvedPosition {
            nft_id: U256::from(nft_id),
            pool,
            details: PositionDetails {
                token0: TOKEN_0,
                token1: TOKEN_1,
                fee: 3000,
                tick_lower: -60,
                tick_upper: 60,
                liquidity: 1000,
            },
        }
    }

    fn deposited_fixture(nft_id: u64, pool: Address) -> DepositedPosition {
        DepositedPosition {
            nft_id: U256::from(nft_id),
            pool,
            token0: TOKEN_0,
            token1: TOKEN_1,
            fee: 3000,
            tick_lower: -60,
            tick_upper: 60,
            liquidity: 1000,
        }
    }

    #[test]
    fn test_match_pairs_every_pool_first_match_deposits() {
        let farm = farm_fixture();
        let mut resolved = HashMap::new();
        resolved.insert(U256::from(7), resolved_fixture(7, POOL_A));

        let (deposited, pairs) = match_positions(&farm, &[U256::from(7)], &resolved);

        // POOL_A appears under pid 1 and pid 2, both get queried
        assert_eq!(
            pairs,
            vec![
                QueryPair {
                    nft_id: U256::from(7),
                    pid: 1
                },
                QueryPair {
                    nft_id: U256::from(7),
                    pid: 2
                },
            ]
        );
        assert_eq!(deposited.len(), 1);
        assert_eq!(deposited[0].nft_id, U256::from(7));
        assert_eq!(deposited[0].pool, POOL_A);
        assert_eq!(deposited[0].liquidity, 1000);
    }

    #[test]
    fn test_match_skips_unresolved_nfts() {
        let farm = farm_fixture();
        let resolved = HashMap::new();

        let (deposited, pairs) = match_positions(&farm, &[U256::from(7)], &resolved);
        assert!(deposited.is_empty());
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_match_ignores_foreign_pools() {
        let farm = farm_fixture();
        let mut resolved = HashMap::new();
        let foreign = address!("abcdabcdabcdabcdabcdabcdabcdabcdabcdabcd");
        resolved.insert(U256::from(7), resolved_fixture(7, foreign));

        let (deposited, pairs) = match_positions(&farm, &[U256::from(7)], &resolved);
        assert!(deposited.is_empty());
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_assemble_accumulates_per_pool_rewards() {
        let farm = farm_fixture();
        let deposited = vec![deposited_fixture(7, POOL_A), deposited_fixture(8, POOL_A)];
        let pairs = vec![
            QueryPair {
                nft_id: U256::from(7),
                pid: 1,
            },
            QueryPair {
                nft_id: U256::from(8),
                pid: 1,
            },
        ];
        let outcomes = vec![
            DecodeOutcome::Decoded(UserStakeInfo {
                liquidity: U256::from(500),
                reward_pending: vec![U256::from(10), U256::from(20)],
            }),
            DecodeOutcome::Decoded(UserStakeInfo {
                liquidity: U256::from(700),
                reward_pending: vec![U256::from(1), U256::from(2)],
            }),
        ];

        let info = assemble_user_info(&farm, deposited, &pairs, &outcomes);

        assert_eq!(info.joined_positions[&1].len(), 2);
        assert_eq!(info.joined_positions[&1][0].liquidity, U256::from(500));
        assert_eq!(info.joined_positions[&1][1].liquidity, U256::from(700));
        assert_eq!(
            info.reward_pendings[&1],
            vec![U256::from(11), U256::from(22)]
        );
        assert_eq!(
            info.reward_by_nft[&(1, U256::from(7))],
            vec![U256::from(10), U256::from(20)]
        );
        assert_eq!(
            info.reward_by_nft[&(1, U256::from(8))],
            vec![U256::from(1), U256::from(2)]
        );
    }

    #[test]
    fn test_assemble_keeps_pid_entry_without_deposit() {
        let farm = farm_fixture();
        let pairs = vec![QueryPair {
            nft_id: U256::from(7),
            pid: 1,
        }];
        let outcomes = vec![DecodeOutcome::Decoded(UserStakeInfo {
            liquidity: U256::from(500),
            reward_pending: vec![U256::from(10)],
        })];

        // No deposited positions to match the pair against
        let info = assemble_user_info(&farm, Vec::new(), &pairs, &outcomes);

        assert!(info.joined_positions[&1].is_empty());
        assert!(info.reward_pendings.is_empty());
        assert!(info.reward_by_nft.is_empty());
    }

    #[test]
    fn test_assemble_skips_failed_calls() {
        let farm = farm_fixture();
        let deposited = vec![deposited_fixture(7, POOL_A)];
        let pairs = vec![QueryPair {
            nft_id: U256::from(7),
            pid: 1,
        }];
        let outcomes = vec![DecodeOutcome::Reverted];

        let info = assemble_user_info(&farm, deposited, &pairs, &outcomes);

        assert!(info.joined_positions.is_empty());
        assert!(info.reward_pendings.is_empty());
        assert!(info.reward_by_nft.is_empty());
    }

    #[test]
    fn test_assemble_pads_short_reward_answers() {
        let farm = farm_fixture();
        let deposited = vec![deposited_fixture(7, POOL_A)];
        // pid 1 carries two reward tokens but the contract answered one
        let pairs = vec![QueryPair {
            nft_id: U256::from(7),
            pid: 1,
        }];
        let outcomes = vec![DecodeOutcome::Decoded(UserStakeInfo {
            liquidity: U256::from(500),
            reward_pending: vec![U256::from(7)],
        })];

        let info = assemble_user_info(&farm, deposited, &pairs, &outcomes);

        assert_eq!(info.reward_pendings[&1], vec![U256::from(7), U256::ZERO]);
        assert_eq!(
            info.reward_by_nft[&(1, U256::from(7))],
            vec![U256::from(7), U256::ZERO]
        );
    }

    #[test]
    fn test_decode_deposited_nfts() {
        let result = CallResult {
            success: true,
            return_data: (vec![U256::from(1), U256::from(2), U256::from(3)],)
                .abi_encode_params()
                .into(),
        };

        let nfts = decode_deposited_nfts(&result).ok().unwrap();
        assert_eq!(nfts, vec![U256::from(1), U256::from(2), U256::from(3)]);
    }

    #[test]
    fn test_decode_user_info() {
        let result = CallResult {
            success: true,
            return_data: (U256::from(500), vec![U256::from(1), U256::from(2)])
                .abi_encode_params()
                .into(),
        };

        let info = decode_user_info(&result).ok().unwrap();
        assert_eq!(info.liquidity, U256::from(500));
        assert_eq!(info.reward_pending, vec![U256::from(1), U256::from(2)]);
    }

    #[test]
    fn test_decode_user_info_reverted() {
        let result = CallResult {
            success: false,
            return_data: Bytes::new(),
        };
        assert_eq!(decode_user_info(&result), DecodeOutcome::Reverted);
    }

    #[test]
    fn test_encode_user_info_call_shape() {
        let calldata = encode_user_info_call(U256::from(7), 3);
        assert_eq!(&calldata[..4], IFarmCore::getUserInfoCall::SELECTOR);
        assert_eq!(calldata.len(), 4 + 64);
    }
}
