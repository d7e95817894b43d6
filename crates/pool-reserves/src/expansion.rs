use {
    crate::{
        amount::Amount,
        chain::{self, BatchCallReading, Call, CallFailure, CallOutput, Method, TransportFailure},
        metrics::Metrics,
    },
    alloy::{
        eips::BlockId,
        primitives::{Address, U256},
    },
    std::{collections::HashSet, sync::Arc},
};

/// Upper bound on the number of tokens a wrap token may report. Anything
/// larger is treated like an unreadable cardinality.
pub const MAX_WRAPPED_TOKENS: usize = 256;

/// What one side of a pair contributes to a snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Contribution {
    /// A token held directly by the pool.
    Plain { token: Address, reserve: Amount },
    /// A wrap token, accounted for by the tokens it wraps instead of its own
    /// reserve.
    Wrapped {
        wrapper: Address,
        constituents: Vec<(Address, Amount)>,
    },
}

/// Resolves tokens into the assets they contribute.
///
/// Whether a token is a wrap token is decided solely by the configured set,
/// never by what the chain returns.
pub struct TokenExpander {
    reader: Arc<dyn BatchCallReading>,
    wrap_tokens: HashSet<Address>,
}

impl TokenExpander {
    pub fn new(reader: Arc<dyn BatchCallReading>, wrap_tokens: HashSet<Address>) -> Self {
        Self {
            reader,
            wrap_tokens,
        }
    }

    pub fn is_wrapped(&self, token: &Address) -> bool {
        self.wrap_tokens.contains(token)
    }

    /// Returns the contribution of `token` whose reserve in the pool is
    /// `default_reserve`.
    ///
    /// Plain tokens contribute their reserve, or nothing if the reserve is
    /// unknown. Wrap tokens are expanded into their constituents and their own
    /// reserve is ignored.
    #[tracing::instrument(skip(self, default_reserve))]
    pub async fn expand_token(
        &self,
        token: Address,
        default_reserve: Option<Amount>,
        block: BlockId,
    ) -> Result<Option<Contribution>, TransportFailure> {
        if !self.is_wrapped(&token) {
            return Ok(default_reserve.map(|reserve| Contribution::Plain { token, reserve }));
        }

        let constituents = self.constituents(token, block).await?;
        Ok(Some(Contribution::Wrapped {
            wrapper: token,
            constituents,
        }))
    }

    async fn constituents(
        &self,
        wrapper: Address,
        block: BlockId,
    ) -> Result<Vec<(Address, Amount)>, TransportFailure> {
        let Some(count) = self.cardinality(wrapper, block).await? else {
            return Ok(Vec::new());
        };

        let calls = (0..count)
            .map(|index| {
                Call::new(
                    wrapper,
                    Method::GetTokenInfo {
                        index: U256::from(index),
                    },
                )
            })
            .collect();
        let results = chain::read_batch(self.reader.as_ref(), block, calls).await?;

        let constituents = results
            .into_iter()
            .enumerate()
            .filter_map(|(index, result)| match result.and_then(CallOutput::token_info) {
                Ok((token, reserve)) => Some((token, Amount::from(reserve))),
                Err(err) => {
                    tracing::debug!(?wrapper, index, %err, "skipping wrapped token");
                    Metrics::call_miss("wrap_constituent");
                    None
                }
            })
            .collect();
        Ok(constituents)
    }

    /// Reads how many tokens `wrapper` wraps. `None` if that is unknown.
    async fn cardinality(
        &self,
        wrapper: Address,
        block: BlockId,
    ) -> Result<Option<usize>, TransportFailure> {
        let call = Call::new(wrapper, Method::NumTokensWrapped);
        let result = chain::read_batch(self.reader.as_ref(), block, vec![call])
            .await?
            .into_iter()
            .next()
            .unwrap_or_else(|| Err(CallFailure::Failed("missing result".to_string())));

        let count = result.and_then(CallOutput::uint).and_then(|count| {
            usize::try_from(count)
                .ok()
                .filter(|count| *count <= MAX_WRAPPED_TOKENS)
                .ok_or_else(|| CallFailure::Failed(format!("cardinality {count} out of range")))
        });
        match count {
            Ok(count) => Ok(Some(count)),
            Err(err) => {
                tracing::warn!(?wrapper, %err, "failed to read wrap token cardinality");
                Metrics::call_miss("wrap_cardinality");
                Ok(None)
            }
        }
    }
}
