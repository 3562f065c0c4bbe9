//! NFT position resolution
//!
//! Decodes `positions(tokenId)` return data into the fields the
//! pipeline cares about, then derives the owning pool's address from
//! (token0, token1, fee) with the factory's CREATE2 scheme. The
//! derivation is pure; it saves one RPC round per NFT.

use alloy_primitives::{aliases::U24, keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall, SolValue};
use serde::Serialize;

use super::multicall::{decode_return, CallResult, DecodeOutcome};

sol! {
    interface IPositionManager {
        function positions(uint256 tokenId) external view returns (
            uint96 nonce,
            address operator,
            address token0,
            address token1,
            uint24 fee,
            int24 tickLower,
            int24 tickUpper,
            uint128 liquidity,
            uint256 feeGrowthInside0LastX128,
            uint256 feeGrowthInside1LastX128,
            uint128 tokensOwed0,
            uint128 tokensOwed1
        );
    }
}

/// The (token0, token1, fee) triple a pool is deployed under. Token
/// order is the canonical order reported by the position manager; the
/// derivation does not reorder it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolKey {
    pub token0: Address,
    pub token1: Address,
    pub fee: u32,
}

/// The slice of `positions()` output the pipeline consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionDetails {
    pub token0: Address,
    pub token1: Address,
    pub fee: u32,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
}

impl PositionDetails {
    pub fn pool_key(&self) -> PoolKey {
        PoolKey {
            token0: self.token0,
            token1: self.token1,
            fee: self.fee,
        }
    }
}

/// A decoded NFT with its derived pool address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPosition {
    pub nft_id: U256,
    pub pool: Address,
    pub details: PositionDetails,
}

pub fn encode_positions_call(nft_id: U256) -> Bytes {
    IPositionManager::positionsCall { tokenId: nft_id }
        .abi_encode()
        .into()
}

pub fn decode_position(result: &CallResult) -> DecodeOutcome<PositionDetails> {
    decode_return::<IPositionManager::positionsCall>(result).map(|p| PositionDetails {
        token0: p.token0,
        token1: p.token1,
        fee: p.fee.to::<u32>(),
        tick_lower: p.tickLower.as_i32(),
        tick_upper: p.tickUpper.as_i32(),
        liquidity: p.liquidity,
    })
}

/// Compute the pool address the factory would have deployed for this
/// key: `create2(factory, keccak256(abi.encode(token0, token1, fee)),
/// init_code_hash)`. Must match the on-chain factory's scheme exactly
/// or pool matching silently finds nothing.
pub fn derive_pool_address(factory: Address, key: &PoolKey, init_code_hash: B256) -> Address {
    let salt = keccak256((key.token0, key.token1, U24::from(key.fee)).abi_encode());
    factory.create2(salt, init_code_hash)
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{
        address,
        aliases::{I24, U96},
        b256,
    };

    // The canonical mainnet USDC/WETH 0.05% deployment
    const FACTORY: Address = address!("1F98431c8aD98523631AE4a59f267346ea31F984");
    const INIT_CODE_HASH: B256 =
        b256!("e34f199b19b2b4f47f68442619d555527d244f78a3297ea89325f843f87b8b54");
    const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
    const WETH: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");

    fn encode_position_return(
        token0: Address,
        token1: Address,
        fee: u32,
        tick_lower: i32,
        tick_upper: i32,
        liquidity: u128,
    ) -> Bytes {
        (
            U96::ZERO,
            Address::ZERO,
            token0,
            token1,
            U24::from(fee),
            I24::try_from(tick_lower).unwrap(),
            I24::try_from(tick_upper).unwrap(),
            liquidity,
            U256::ZERO,
            U256::ZERO,
            0u128,
            0u128,
        )
            .abi_encode()
            .into()
    }

    #[test]
    fn test_known_pool_address() {
        let key = PoolKey {
            token0: USDC,
            token1: WETH,
            fee: 500,
        };
        assert_eq!(
            derive_pool_address(FACTORY, &key, INIT_CODE_HASH),
            address!("88e6A0c2dDD26FEEb64F039a2c41296FcB3f5640")
        );
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let key = PoolKey {
            token0: USDC,
            token1: WETH,
            fee: 3000,
        };
        let a = derive_pool_address(FACTORY, &key, INIT_CODE_HASH);
        let b = derive_pool_address(FACTORY, &key, INIT_CODE_HASH);
        assert_eq!(a, b);
    }

    #[test]
    fn test_token_order_matters() {
        let key = PoolKey {
            token0: USDC,
            token1: WETH,
            fee: 500,
        };
        let swapped = PoolKey {
            token0: WETH,
            token1: USDC,
            fee: 500,
        };
        assert_ne!(
            derive_pool_address(FACTORY, &key, INIT_CODE_HASH),
            derive_pool_address(FACTORY, &swapped, INIT_CODE_HASH)
        );
    }

    #[test]
    fn test_fee_tier_changes_address() {
        let key = PoolKey {
            token0: USDC,
            token1: WETH,
            fee: 500,
        };
        let other_fee = PoolKey { fee: 3000, ..key };
        assert_ne!(
            derive_pool_address(FACTORY, &key, INIT_CODE_HASH),
            derive_pool_address(FACTORY, &other_fee, INIT_CODE_HASH)
        );
    }

    #[test]
    fn test_decode_position() {
        let result = CallResult {
            success: true,
            return_data: encode_position_return(USDC, WETH, 500, -100, 100, 1000),
        };

        let details = decode_position(&result).ok().unwrap();
        assert_eq!(details.token0, USDC);
        assert_eq!(details.token1, WETH);
        assert_eq!(details.fee, 500);
        assert_eq!(details.tick_lower, -100);
        assert_eq!(details.tick_upper, 100);
        assert_eq!(details.liquidity, 1000);
    }

    #[test]
    fn test_decode_position_reverted() {
        let result = CallResult {
            success: false,
            return_data: Bytes::new(),
        };
        assert_eq!(decode_position(&result), DecodeOutcome::Reverted);
    }

    #[test]
    fn test_decode_position_garbage() {
        let result = CallResult {
            success: true,
            return_data: Bytes::from(vec![0u8; 31]),
        };
        assert_eq!(decode_position(&result), DecodeOutcome::Malformed);
    }

    #[test]
    fn test_encode_positions_call_selector() {
        let calldata = encode_positions_call(U256::from(7));
        // positions(uint256) selector
        assert_eq!(&calldata[..4], IPositionManager::positionsCall::SELECTOR);
        assert_eq!(calldata.len(), 4 + 32);
    }
}
