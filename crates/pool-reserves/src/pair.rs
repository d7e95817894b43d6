use {
    crate::{
        amount::Amount,
        chain::{self, BatchCallReading, Call, CallFailure, CallOutput, Method, TransportFailure},
        metrics::Metrics,
    },
    alloy::{eips::BlockId, primitives::Address},
};

/// Composition and reserves of one pool at a fixed block. Every field that is
/// read from the chain is `None` if its read failed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PairInfo {
    pub address: Address,
    pub token0: Option<Address>,
    pub token1: Option<Address>,
    /// `None` means the reserves are unknown, which is different from a pool
    /// with zero reserves.
    pub reserves: Option<(Amount, Amount)>,
    pub total_supply: Option<Amount>,
}

impl PairInfo {
    /// Both sides of the pair as `(token, reserve)`.
    pub fn sides(&self) -> [(Option<Address>, Option<Amount>); 2] {
        let (reserve0, reserve1) = match &self.reserves {
            Some((reserve0, reserve1)) => (Some(reserve0.clone()), Some(reserve1.clone())),
            None => (None, None),
        };
        [(self.token0, reserve0), (self.token1, reserve1)]
    }
}

/// Reads tokens, reserves and total supply of all `pools`.
///
/// Returns one [`PairInfo`] per pool in the order of `pools`. Only a failure
/// of a whole batch fails the composition.
#[tracing::instrument(skip_all, fields(pools = pools.len()))]
pub async fn compose_pairs(
    reader: &dyn BatchCallReading,
    pools: &[Address],
    block: BlockId,
) -> Result<Vec<PairInfo>, TransportFailure> {
    let batch = |method| {
        let calls = pools.iter().map(|pool| Call::new(*pool, method)).collect();
        chain::read_batch(reader, block, calls)
    };
    let (tokens0, tokens1, reserves, total_supplies) = futures::try_join!(
        batch(Method::Token0),
        batch(Method::Token1),
        batch(Method::GetReserves),
        batch(Method::TotalSupply),
    )?;

    let pairs = pools
        .iter()
        .zip(tokens0)
        .zip(tokens1)
        .zip(reserves)
        .zip(total_supplies)
        .map(|((((pool, token0), token1), reserves), total_supply)| {
            let pool = *pool;
            PairInfo {
                address: pool,
                token0: read(pool, "token0", token0.and_then(CallOutput::address)),
                token1: read(pool, "token1", token1.and_then(CallOutput::address)),
                reserves: read(pool, "reserves", reserves.and_then(CallOutput::reserves))
                    .map(|(reserve0, reserve1)| (Amount::from(reserve0), Amount::from(reserve1))),
                total_supply: read(pool, "total_supply", total_supply.and_then(CallOutput::uint))
                    .map(Amount::from),
            }
        })
        .collect();
    Ok(pairs)
}

fn read<T>(pool: Address, kind: &str, result: Result<T, CallFailure>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!(?pool, read = kind, %err, "pool read failed");
            Metrics::call_miss(kind);
            None
        }
    }
}
