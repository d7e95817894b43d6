//! [`BatchCallReading`] implementation that reads from an Ethereum node.
//!
//! Every batch is sent to the node as a single JSON-RPC batch request of
//! `eth_call`s, so a batch costs one round-trip while each call still
//! succeeds or fails on its own.

use {
    super::{BatchCallReading, Call, CallFailure, CallOutput, CallResult, Method, TransportFailure},
    alloy::{
        eips::BlockId,
        primitives::{Bytes, U256},
        providers::{DynProvider, Provider, ProviderBuilder},
        rpc::{
            client::BatchRequest,
            types::{TransactionInput, TransactionRequest},
        },
        sol,
        sol_types::SolCall,
        transports::{RpcError, TransportError},
    },
    anyhow::Context,
    futures::future,
};

sol! {
    interface IUniswapLikePair {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function getReserves()
            external
            view
            returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
        function totalSupply() external view returns (uint256);
    }

    interface IWrapToken {
        function numTokensWrapped() external view returns (uint256);
        function getTokenInfo(uint256 index) external view returns (address token, uint256 reserve);
    }
}

/// Maximum number of calls sent to the node in one JSON-RPC batch.
pub const MAX_BATCH_SIZE: usize = 100;

/// Creates a provider talking to the node at `url`.
pub fn provider(url: &str) -> anyhow::Result<DynProvider> {
    let url = url.parse().context("invalid node url")?;
    Ok(ProviderBuilder::new().connect_http(url).erased())
}

#[derive(Clone, Debug)]
pub struct OnchainReader {
    provider: DynProvider,
    max_batch_size: usize,
}

impl OnchainReader {
    pub fn new(provider: DynProvider) -> Self {
        Self {
            provider,
            max_batch_size: MAX_BATCH_SIZE,
        }
    }

    /// Splits larger batches into several JSON-RPC batches of at most
    /// `max_batch_size` calls.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    async fn execute(
        &self,
        block: BlockId,
        calls: &[Call],
    ) -> Result<Vec<CallResult>, TransportFailure> {
        let mut batch = BatchRequest::new(self.provider.client());
        let waiters = calls
            .iter()
            .map(|call| {
                let request = TransactionRequest::default()
                    .to(call.target)
                    .input(TransactionInput::new(encode(call.method).into()));
                batch.add_call::<_, Bytes>("eth_call", &(request, block))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(TransportFailure::new)?;
        batch.send().await.map_err(TransportFailure::new)?;

        let mut results = Vec::with_capacity(waiters.len());
        for (call, waiter) in calls.iter().zip(waiters) {
            results.push(classify(call.method, waiter.await)?);
        }
        Ok(results)
    }
}

#[async_trait::async_trait]
impl BatchCallReading for OnchainReader {
    async fn batch_call(
        &self,
        block: BlockId,
        calls: Vec<Call>,
    ) -> Result<Vec<CallResult>, TransportFailure> {
        let chunks = calls
            .chunks(self.max_batch_size)
            .map(|chunk| self.execute(block, chunk));
        let results = future::try_join_all(chunks).await?;
        Ok(results.into_iter().flatten().collect())
    }
}

fn encode(method: Method) -> Vec<u8> {
    match method {
        Method::Token0 => IUniswapLikePair::token0Call {}.abi_encode(),
        Method::Token1 => IUniswapLikePair::token1Call {}.abi_encode(),
        Method::GetReserves => IUniswapLikePair::getReservesCall {}.abi_encode(),
        Method::TotalSupply => IUniswapLikePair::totalSupplyCall {}.abi_encode(),
        Method::NumTokensWrapped => IWrapToken::numTokensWrappedCall {}.abi_encode(),
        Method::GetTokenInfo { index } => IWrapToken::getTokenInfoCall { index }.abi_encode(),
    }
}

fn decode(method: Method, data: &[u8]) -> alloy::sol_types::Result<CallOutput> {
    let output = match method {
        Method::Token0 => {
            CallOutput::Address(IUniswapLikePair::token0Call::abi_decode_returns(data)?)
        }
        Method::Token1 => {
            CallOutput::Address(IUniswapLikePair::token1Call::abi_decode_returns(data)?)
        }
        Method::GetReserves => {
            let reserves = IUniswapLikePair::getReservesCall::abi_decode_returns(data)?;
            CallOutput::Reserves {
                reserve0: U256::from(reserves.reserve0),
                reserve1: U256::from(reserves.reserve1),
            }
        }
        Method::TotalSupply => {
            CallOutput::Uint(IUniswapLikePair::totalSupplyCall::abi_decode_returns(data)?)
        }
        Method::NumTokensWrapped => {
            CallOutput::Uint(IWrapToken::numTokensWrappedCall::abi_decode_returns(data)?)
        }
        Method::GetTokenInfo { .. } => {
            let info = IWrapToken::getTokenInfoCall::abi_decode_returns(data)?;
            CallOutput::TokenInfo {
                token: info.token,
                reserve: info.reserve,
            }
        }
    };
    Ok(output)
}

/// Bubbles up node errors as transport failures and turns all other errors
/// into a failure of that single call.
fn classify(
    method: Method,
    result: Result<Bytes, TransportError>,
) -> Result<CallResult, TransportFailure> {
    match result {
        Ok(data) => Ok(decode(method, &data).map_err(|err| {
            tracing::trace!(?method, ?err, "undecodable call output");
            CallFailure::Failed(err.to_string())
        })),
        Err(err) if is_node_error(&err) => Err(TransportFailure::new(err)),
        Err(err) => {
            tracing::trace!(?method, ?err, "contract call failed");
            Ok(Err(CallFailure::Failed(err.to_string())))
        }
    }
}

/// Returns whether an error originates from the node or the connection to it
/// rather than from the execution of the call.
fn is_node_error(err: &TransportError) -> bool {
    match err {
        // Nodes report reverts as error responses, some of them without any
        // revert data.
        RpcError::ErrorResp(err) => {
            let reverted = err.as_revert_data().is_some() || err.message.contains("revert");
            tracing::debug!(?err, %reverted, "rpc error response");
            !reverted
        }
        _ => true,
    }
}
