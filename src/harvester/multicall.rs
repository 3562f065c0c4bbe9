//! Multicall3 batching layer
//!
//! Turns N read-only contract calls into ceil(N/100) RPC round trips.
//! The `CallExecutor` trait is the seam the pipeline runs on, so tests
//! can script call results without a node.

use alloy_primitives::{Address, Bytes};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{sol, SolCall};
use eyre::{eyre, Result};
use std::future::Future;
use tracing::{debug, trace};

use crate::chains::ChainInfo;

// ============================================
// MULTICALL3 INTERFACE
// ============================================

sol! {
    /// Multicall3 - deployed at same address on all EVM chains
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external payable returns (Result[] memory returnData);
    }
}

/// Maximum calls per batch (to avoid gas limits)
pub const MAX_CALLS_PER_BATCH: usize = 100;

// ============================================
// CALL TYPES
// ============================================

/// One read-only call to batch
#[derive(Debug, Clone)]
pub struct ReadCall {
    pub target: Address,
    pub calldata: Bytes,
}

/// Raw result for one batched call, positionally aligned with the
/// request list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    pub success: bool,
    pub return_data: Bytes,
}

/// Typed decode result for one batched call. Decode failures stay
/// per-item; they never abort a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome<T> {
    Decoded(T),
    /// The call itself reverted (success flag false)
    Reverted,
    /// The call succeeded but the return data did not match the schema
    Malformed,
}

impl<T> DecodeOutcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            DecodeOutcome::Decoded(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_decoded(&self) -> bool {
        matches!(self, DecodeOutcome::Decoded(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DecodeOutcome<U> {
        match self {
            DecodeOutcome::Decoded(v) => DecodeOutcome::Decoded(f(v)),
            DecodeOutcome::Reverted => DecodeOutcome::Reverted,
            DecodeOutcome::Malformed => DecodeOutcome::Malformed,
        }
    }
}

/// Decode one call result against a known call schema
pub fn decode_return<C: SolCall>(result: &CallResult) -> DecodeOutcome<C::Return> {
    if !result.success {
        return DecodeOutcome::Reverted;
    }
    match C::abi_decode_returns(&result.return_data) {
        Ok(value) => DecodeOutcome::Decoded(value),
        Err(e) => {
            trace!("Return data did not decode: {}", e);
            DecodeOutcome::Malformed
        }
    }
}

// ============================================
// EXECUTOR SEAM
// ============================================

/// Batched read-call execution. Implementations must return exactly one
/// result per call, in request order.
pub trait CallExecutor: Send + Sync {
    fn execute(&self, calls: Vec<ReadCall>) -> impl Future<Output = Result<Vec<CallResult>>> + Send;
}

// ============================================
// MULTICALL3 CLIENT
// ============================================

pub struct Multicall3Client {
    rpc_url: String,
    multicall: Address,
}

impl Multicall3Client {
    pub fn new(rpc_url: String, multicall: Address) -> Self {
        Self { rpc_url, multicall }
    }

    pub fn for_chain(rpc_url: String, chain: &ChainInfo) -> Self {
        Self::new(rpc_url, chain.multicall3)
    }

    /// Execute a single Multicall3 batch
    async fn execute_batch(&self, calls: Vec<IMulticall3::Call3>) -> Result<Vec<IMulticall3::Result>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let provider = ProviderBuilder::new()
            .connect_http(self.rpc_url.parse()?);

        let calldata = IMulticall3::aggregate3Call { calls }.abi_encode();

        let tx = TransactionRequest::default()
            .to(self.multicall)
            .input(calldata.into());

        let result = provider.call(tx).await
            .map_err(|e| eyre!("Multicall3 failed: {}", e))?;

        let decoded = IMulticall3::aggregate3Call::abi_decode_returns(&result)
            .map_err(|e| eyre!("Failed to decode multicall result: {}", e))?;

        Ok(decoded)
    }
}

impl CallExecutor for Multicall3Client {
    async fn execute(&self, calls: Vec<ReadCall>) -> Result<Vec<CallResult>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let total = calls.len();
        let mut results = Vec::with_capacity(total);

        for chunk in calls.chunks(MAX_CALLS_PER_BATCH) {
            let batch: Vec<IMulticall3::Call3> = chunk
                .iter()
                .map(|call| IMulticall3::Call3 {
                    target: call.target,
                    allowFailure: true,
                    callData: call.calldata.clone(),
                })
                .collect();

            let batch_results = self.execute_batch(batch).await?;

            if batch_results.len() != chunk.len() {
                return Err(eyre!(
                    "Multicall3 returned {} results for {} calls",
                    batch_results.len(),
                    chunk.len()
                ));
            }

            results.extend(batch_results.into_iter().map(|r| CallResult {
                success: r.success,
                return_data: r.returnData,
            }));
        }

        debug!(
            "⚡ Multicall3: {} calls in {} batch(es)",
            total,
            total.div_ceil(MAX_CALLS_PER_BATCH)
        );

        Ok(results)
    }
}

// ============================================
// TESTS
// ============================================
