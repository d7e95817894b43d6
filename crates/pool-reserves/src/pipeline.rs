use {
    crate::{
        aggregation::{self, ReserveSnapshot},
        chain::{BatchCallReading, TransportFailure},
        config::Config,
        expansion::TokenExpander,
        metrics::Metrics,
        pair,
    },
    alloy::{eips::BlockId, primitives::Address},
    futures::future,
    std::sync::Arc,
};

/// Computes the total reserve of every underlying asset held by a set of
/// pools.
///
/// The pipeline keeps no state between snapshots: every snapshot reads
/// everything it needs at the requested block.
pub struct SnapshotPipeline {
    reader: Arc<dyn BatchCallReading>,
    expander: TokenExpander,
    pools: Vec<Address>,
}

impl SnapshotPipeline {
    pub fn new(reader: Arc<dyn BatchCallReading>, config: Config) -> Self {
        Self {
            expander: TokenExpander::new(reader.clone(), config.wrap_tokens),
            reader,
            pools: config.pools,
        }
    }

    /// Snapshots the configured pools at `block`.
    pub async fn snapshot(&self, block: BlockId) -> Result<ReserveSnapshot, TransportFailure> {
        self.snapshot_pools(&self.pools, block).await
    }

    /// Snapshots `pools` at `block`.
    ///
    /// Fails as a whole if any batch of chain reads fails. Failures of
    /// individual reads only leave out what could not be read.
    #[tracing::instrument(skip_all, fields(pools = pools.len(), ?block))]
    pub async fn snapshot_pools(
        &self,
        pools: &[Address],
        block: BlockId,
    ) -> Result<ReserveSnapshot, TransportFailure> {
        let _timer = Metrics::snapshot_timer();
        let result = self.compute(pools, block).await;
        Metrics::snapshot_finished(&result);
        match &result {
            Ok(snapshot) => tracing::debug!(assets = snapshot.len(), "computed reserve snapshot"),
            Err(err) => tracing::warn!(?err, "failed to compute reserve snapshot"),
        }
        result
    }

    async fn compute(
        &self,
        pools: &[Address],
        block: BlockId,
    ) -> Result<ReserveSnapshot, TransportFailure> {
        let pairs = pair::compose_pairs(self.reader.as_ref(), pools, block).await?;

        let sides = pairs.iter().flat_map(|pair| {
            pair.sides()
                .into_iter()
                .filter_map(move |(token, reserve)| match token {
                    Some(token) => Some((token, reserve)),
                    None => {
                        tracing::warn!(
                            pool = ?pair.address,
                            "skipping pool side with unknown token"
                        );
                        None
                    }
                })
        });
        let contributions = future::try_join_all(
            sides.map(|(token, reserve)| self.expander.expand_token(token, reserve, block)),
        )
        .await?;

        Ok(aggregation::aggregate(contributions.into_iter().flatten()))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            amount::Amount,
            chain::{CallOutput, Method, MockBatchCallReading, test_util::FakeChain},
        },
        alloy::primitives::U256,
        maplit::{btreemap, hashset},
    };

    fn pipeline(
        chain: Arc<dyn BatchCallReading>,
        pools: &[Address],
        wrap_tokens: &[Address],
    ) -> SnapshotPipeline {
        let config = Config::new(pools.to_vec(), wrap_tokens.iter().copied()).unwrap();
        SnapshotPipeline::new(chain, config)
    }

    fn address(byte: u8) -> Address {
        Address::with_last_byte(byte)
    }

    #[tokio::test]
    async fn plain_pool_conserves_reserves() {
        observe::tracing::initialize_reentrant("pool_reserves=debug");
        let (pool, token_a, token_b) = (address(1), address(10), address(11));
        let chain = FakeChain::default().with_pool(pool, (token_a, token_b), (123, 456));
        let pipeline = pipeline(Arc::new(chain), &[pool], &[]);

        let snapshot = pipeline.snapshot(BlockId::number(1)).await.unwrap();

        assert_eq!(
            snapshot.to_decimal_strings(),
            btreemap! {
                token_a => "123".to_string(),
                token_b => "456".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn wrap_tokens_are_replaced_by_constituents() {
        let (pool, wrapper, token_x, token_y, token_z) =
            (address(1), address(2), address(10), address(11), address(12));
        let chain = FakeChain::default()
            .with_pool(pool, (wrapper, token_z), (1_000, 50))
            .with_wrap_token(wrapper, &[(token_x, 100), (token_y, 200)]);
        let pipeline = pipeline(Arc::new(chain), &[pool], &[wrapper]);

        let snapshot = pipeline.snapshot(BlockId::number(1)).await.unwrap();

        assert_eq!(
            snapshot.to_decimal_strings(),
            btreemap! {
                token_x => "100".to_string(),
                token_y => "200".to_string(),
                token_z => "50".to_string(),
            }
        );
        assert_eq!(snapshot.get(&wrapper), None);
    }

    #[tokio::test]
    async fn pools_with_unknown_reserves_contribute_nothing() {
        let (pool_a, pool_b) = (address(1), address(2));
        let (token_a, token_b, token_c) = (address(10), address(11), address(12));
        let chain = FakeChain::default()
            .with_pool(pool_a, (token_a, token_b), (100, 200))
            .with_pool(pool_b, (token_b, token_c), (300, 400))
            .with_failure(pool_b, Method::GetReserves);
        let pipeline = pipeline(Arc::new(chain), &[pool_a, pool_b], &[]);

        let snapshot = pipeline.snapshot(BlockId::number(1)).await.unwrap();

        assert_eq!(
            snapshot.to_decimal_strings(),
            btreemap! {
                token_a => "100".to_string(),
                token_b => "200".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn wrapped_side_expands_even_without_pool_reserves() {
        let (pool, wrapper, token_x, token_z) = (address(1), address(2), address(10), address(12));
        let chain = FakeChain::default()
            .with_pool(pool, (token_z, wrapper), (5, 6))
            .with_failure(pool, Method::GetReserves)
            .with_wrap_token(wrapper, &[(token_x, 100)]);
        let pipeline = pipeline(Arc::new(chain), &[pool], &[wrapper]);

        let snapshot = pipeline.snapshot(BlockId::number(1)).await.unwrap();

        assert_eq!(
            snapshot.to_decimal_strings(),
            btreemap! { token_x => "100".to_string() }
        );
    }

    #[tokio::test]
    async fn sums_shared_tokens_exactly() {
        let (pool_a, pool_b) = (address(1), address(2));
        let (token_a, token_b, token_c) = (address(10), address(11), address(12));
        let chain = FakeChain::default()
            .with_pool(pool_a, (token_a, token_b), (1_000_000_000_000_000_000, 1))
            .with_pool(pool_b, (token_c, token_a), (1, 2));
        let pipeline = pipeline(Arc::new(chain), &[pool_a, pool_b], &[]);

        let snapshot = pipeline.snapshot(BlockId::number(1)).await.unwrap();

        assert_eq!(
            snapshot.get(&token_a).map(ToString::to_string),
            Some("1000000000000000002".to_string())
        );
    }

    #[tokio::test]
    async fn zero_cardinality_wrap_contributes_nothing() {
        let (pool, wrapper, token_z) = (address(1), address(2), address(12));
        let chain = FakeChain::default()
            .with_pool(pool, (wrapper, token_z), (1_000, 50))
            .with_wrap_token(wrapper, &[]);
        let pipeline = pipeline(Arc::new(chain), &[pool], &[wrapper]);

        let snapshot = pipeline.snapshot(BlockId::number(1)).await.unwrap();

        assert_eq!(
            snapshot.to_decimal_strings(),
            btreemap! { token_z => "50".to_string() }
        );
    }

    #[tokio::test]
    async fn wrap_token_in_several_pools_is_counted_per_pool() {
        let (pool_a, pool_b, wrapper) = (address(1), address(2), address(3));
        let (token_a, token_x) = (address(10), address(11));
        let chain = FakeChain::default()
            .with_pool(pool_a, (wrapper, token_a), (1, 2))
            .with_pool(pool_b, (token_a, wrapper), (3, 4))
            .with_wrap_token(wrapper, &[(token_x, 100)]);
        let pipeline = pipeline(Arc::new(chain), &[pool_a, pool_b], &[wrapper]);

        let snapshot = pipeline.snapshot(BlockId::number(1)).await.unwrap();

        assert_eq!(
            snapshot.to_decimal_strings(),
            btreemap! {
                token_a => "5".to_string(),
                token_x => "200".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn side_with_unknown_token_is_skipped() {
        let (pool, token_a, token_b) = (address(1), address(10), address(11));
        let chain = FakeChain::default()
            .with_pool(pool, (token_a, token_b), (7, 8))
            .with_failure(pool, Method::Token1);
        let pipeline = pipeline(Arc::new(chain), &[pool], &[]);

        let snapshot = pipeline.snapshot(BlockId::number(1)).await.unwrap();

        assert_eq!(
            snapshot.to_decimal_strings(),
            btreemap! { token_a => "7".to_string() }
        );
    }

    #[tokio::test]
    async fn snapshots_are_idempotent() {
        let (pool, wrapper, token_x, token_z) = (address(1), address(2), address(10), address(12));
        let chain = FakeChain::default()
            .with_pool(pool, (wrapper, token_z), (1_000, 50))
            .with_wrap_token(wrapper, &[(token_x, 100)]);
        let pipeline = pipeline(Arc::new(chain), &[pool], &[wrapper]);

        let first = pipeline.snapshot(BlockId::number(1)).await.unwrap();
        let second = pipeline.snapshot(BlockId::number(1)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn snapshot_pools_uses_given_pools() {
        let (pool_a, pool_b) = (address(1), address(2));
        let (token_a, token_b, token_c) = (address(10), address(11), address(12));
        let chain = FakeChain::default()
            .with_pool(pool_a, (token_a, token_b), (1, 2))
            .with_pool(pool_b, (token_b, token_c), (3, 4));
        let pipeline = pipeline(Arc::new(chain), &[pool_a], &[]);

        let snapshot = pipeline
            .snapshot_pools(&[pool_b], BlockId::number(1))
            .await
            .unwrap();

        assert_eq!(
            snapshot.to_decimal_strings(),
            btreemap! {
                token_b => "3".to_string(),
                token_c => "4".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn reads_at_the_requested_block() {
        let (pool, wrapper, token_x) = (address(1), address(2), address(10));
        let mut reader = MockBatchCallReading::new();
        reader
            .expect_batch_call()
            .withf(|block, _| *block == BlockId::number(11_000_000))
            .returning(move |_, calls| {
                Ok(calls
                    .iter()
                    .map(|call| match call.method {
                        Method::Token0 => Ok(CallOutput::Address(wrapper)),
                        Method::Token1 => Ok(CallOutput::Address(token_x)),
                        Method::GetReserves => Ok(CallOutput::Reserves {
                            reserve0: U256::from(1),
                            reserve1: U256::from(2),
                        }),
                        Method::TotalSupply => Ok(CallOutput::Uint(U256::from(3))),
                        Method::NumTokensWrapped => Ok(CallOutput::Uint(U256::from(1))),
                        Method::GetTokenInfo { .. } => Ok(CallOutput::TokenInfo {
                            token: token_x,
                            reserve: U256::from(40),
                        }),
                    })
                    .collect())
            });
        let pipeline = SnapshotPipeline::new(
            Arc::new(reader),
            Config::new(vec![pool], hashset! {wrapper}).unwrap(),
        );

        let snapshot = pipeline.snapshot(BlockId::number(11_000_000)).await.unwrap();

        assert_eq!(
            snapshot.get(&token_x),
            Some(&Amount::from(U256::from(42)))
        );
    }

    #[tokio::test]
    async fn transport_failure_yields_no_snapshot() {
        let (pool, wrapper) = (address(1), address(2));
        let mut reader = MockBatchCallReading::new();
        reader.expect_batch_call().returning(move |_, calls| match calls[0].method {
            Method::NumTokensWrapped => Err(TransportFailure::new(anyhow::anyhow!("node down"))),
            Method::Token0 => Ok(vec![Ok(CallOutput::Address(wrapper))]),
            Method::Token1 => Ok(vec![Ok(CallOutput::Address(address(10)))]),
            Method::GetReserves => Ok(vec![Ok(CallOutput::Reserves {
                reserve0: U256::from(1),
                reserve1: U256::from(2),
            })]),
            _ => Ok(vec![Ok(CallOutput::Uint(U256::from(3)))]),
        });
        let pipeline = pipeline(Arc::new(reader), &[pool], &[wrapper]);

        let result = pipeline.snapshot(BlockId::number(1)).await;
        assert!(result.is_err());
    }
}
