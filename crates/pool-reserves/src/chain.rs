//! The boundary to the chain reading collaborator.
//!
//! Everything the pipeline needs to know about the chain goes through
//! [`BatchCallReading::batch_call`], which evaluates a list of read-only
//! contract calls against the state of one block. Each call in a batch
//! succeeds or fails on its own; only a failure of the batch as a whole (e.g.
//! the node is unreachable) is reported as a [`TransportFailure`].

pub mod onchain;

use {
    alloy::{
        eips::BlockId,
        primitives::{Address, U256},
    },
    thiserror::Error,
};

pub use onchain::OnchainReader;

/// A read-only contract call.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Call {
    pub target: Address,
    pub method: Method,
}

impl Call {
    pub fn new(target: Address, method: Method) -> Self {
        Self { target, method }
    }
}

/// The contract functions the pipeline reads.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    /// `token0()` of a pair.
    Token0,
    /// `token1()` of a pair.
    Token1,
    /// `getReserves()` of a pair.
    GetReserves,
    /// ERC20 `totalSupply()`.
    TotalSupply,
    /// `numTokensWrapped()` of a wrap token.
    NumTokensWrapped,
    /// `getTokenInfo(index)` of a wrap token.
    GetTokenInfo { index: U256 },
}

/// The decoded output of a successful [`Call`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallOutput {
    Address(Address),
    Uint(U256),
    Reserves { reserve0: U256, reserve1: U256 },
    TokenInfo { token: Address, reserve: U256 },
}

impl CallOutput {
    pub fn address(self) -> Result<Address, CallFailure> {
        match self {
            Self::Address(address) => Ok(address),
            other => Err(CallFailure::UnexpectedOutput(other)),
        }
    }

    pub fn uint(self) -> Result<U256, CallFailure> {
        match self {
            Self::Uint(value) => Ok(value),
            other => Err(CallFailure::UnexpectedOutput(other)),
        }
    }

    pub fn reserves(self) -> Result<(U256, U256), CallFailure> {
        match self {
            Self::Reserves { reserve0, reserve1 } => Ok((reserve0, reserve1)),
            other => Err(CallFailure::UnexpectedOutput(other)),
        }
    }

    pub fn token_info(self) -> Result<(Address, U256), CallFailure> {
        match self {
            Self::TokenInfo { token, reserve } => Ok((token, reserve)),
            other => Err(CallFailure::UnexpectedOutput(other)),
        }
    }
}

/// A single call of a batch did not produce usable data. This never aborts the
/// other calls of the batch.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum CallFailure {
    #[error("call failed: {0}")]
    Failed(String),
    #[error("call returned unexpected output {0:?}")]
    UnexpectedOutput(CallOutput),
}

pub type CallResult = Result<CallOutput, CallFailure>;

/// The chain reader could not evaluate a batch at all.
#[derive(Debug, Error)]
#[error("batch call failed: {0:#}")]
pub struct TransportFailure(#[source] pub anyhow::Error);

impl TransportFailure {
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        Self(err.into())
    }
}

#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait::async_trait]
pub trait BatchCallReading: Send + Sync {
    /// Evaluates all `calls` against the state at `block`.
    ///
    /// Returns exactly one result per call in the order the calls were
    /// given.
    async fn batch_call(
        &self,
        block: BlockId,
        calls: Vec<Call>,
    ) -> Result<Vec<CallResult>, TransportFailure>;
}

/// Executes a batch and checks that the reader answered every call, so that
/// results can be joined positionally with the calls.
pub(crate) async fn read_batch(
    reader: &dyn BatchCallReading,
    block: BlockId,
    calls: Vec<Call>,
) -> Result<Vec<CallResult>, TransportFailure> {
    if calls.is_empty() {
        return Ok(Vec::new());
    }
    let expected = calls.len();
    let results = reader.batch_call(block, calls).await?;
    if results.len() != expected {
        return Err(TransportFailure::new(anyhow::anyhow!(
            "reader returned {} results for {expected} calls",
            results.len()
        )));
    }
    Ok(results)
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use {
        super::*,
        std::{
            collections::HashMap,
            sync::atomic::{AtomicUsize, Ordering},
        },
    };

    /// A deterministic chain that answers calls from a fixed table. Calls that
    /// are not in the table revert.
    #[derive(Default)]
    pub struct FakeChain {
        responses: HashMap<Call, CallResult>,
        batches: AtomicUsize,
    }

    impl FakeChain {
        pub fn with(mut self, target: Address, method: Method, output: CallOutput) -> Self {
            self.responses.insert(Call::new(target, method), Ok(output));
            self
        }

        pub fn with_failure(mut self, target: Address, method: Method) -> Self {
            self.responses.insert(
                Call::new(target, method),
                Err(CallFailure::Failed("execution reverted".to_string())),
            );
            self
        }

        /// Registers a pool with its tokens, reserves and total supply.
        pub fn with_pool(
            self,
            pool: Address,
            (token0, token1): (Address, Address),
            (reserve0, reserve1): (u128, u128),
        ) -> Self {
            self.with(pool, Method::Token0, CallOutput::Address(token0))
                .with(pool, Method::Token1, CallOutput::Address(token1))
                .with(
                    pool,
                    Method::GetReserves,
                    CallOutput::Reserves {
                        reserve0: U256::from(reserve0),
                        reserve1: U256::from(reserve1),
                    },
                )
                .with(
                    pool,
                    Method::TotalSupply,
                    CallOutput::Uint(U256::from(1_000_000)),
                )
        }

        /// Registers a wrap token with its constituents.
        pub fn with_wrap_token(
            mut self,
            wrapper: Address,
            constituents: &[(Address, u128)],
        ) -> Self {
            self = self.with(
                wrapper,
                Method::NumTokensWrapped,
                CallOutput::Uint(U256::from(constituents.len())),
            );
            for (index, (token, reserve)) in constituents.iter().enumerate() {
                self = self.with(
                    wrapper,
                    Method::GetTokenInfo {
                        index: U256::from(index),
                    },
                    CallOutput::TokenInfo {
                        token: *token,
                        reserve: U256::from(*reserve),
                    },
                );
            }
            self
        }

        /// Number of batches that were executed so far.
        pub fn batches(&self) -> usize {
            self.batches.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl BatchCallReading for FakeChain {
        async fn batch_call(
            &self,
            _: BlockId,
            calls: Vec<Call>,
        ) -> Result<Vec<CallResult>, TransportFailure> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(calls
                .iter()
                .map(|call| {
                    self.responses.get(call).cloned().unwrap_or_else(|| {
                        Err(CallFailure::Failed("execution reverted".to_string()))
                    })
                })
                .collect())
        }
    }
}
