use {
    crate::{amount::Amount, expansion::Contribution},
    alloy::primitives::Address,
    serde::Serialize,
    std::collections::BTreeMap,
};

/// Total reserve of every underlying asset as of one block.
///
/// Serializes as an object mapping asset addresses to decimal strings.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ReserveSnapshot(BTreeMap<Address, Amount>);

impl ReserveSnapshot {
    pub fn get(&self, asset: &Address) -> Option<&Amount> {
        self.0.get(asset)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.0.iter()
    }

    /// Renders every amount in its canonical decimal form.
    pub fn to_decimal_strings(&self) -> BTreeMap<Address, String> {
        self.0
            .iter()
            .map(|(asset, amount)| (*asset, amount.to_string()))
            .collect()
    }

    fn accumulate(&mut self, asset: Address, amount: &Amount) {
        *self.0.entry(asset).or_insert_with(Amount::zero) += amount;
    }
}

/// Sums all contributions per asset.
///
/// The result does not depend on the order of the contributions. Wrap tokens
/// never show up as assets, only their constituents do.
pub fn aggregate(contributions: impl IntoIterator<Item = Contribution>) -> ReserveSnapshot {
    let mut snapshot = ReserveSnapshot::default();
    for contribution in contributions {
        match contribution {
            Contribution::Plain { token, reserve } => snapshot.accumulate(token, &reserve),
            Contribution::Wrapped { constituents, .. } => {
                for (token, reserve) in constituents {
                    snapshot.accumulate(token, &reserve);
                }
            }
        }
    }
    snapshot
}
