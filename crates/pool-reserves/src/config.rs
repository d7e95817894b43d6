use {
    alloy::primitives::Address,
    anyhow::{Context, Result, ensure},
    serde::Deserialize,
    std::{collections::HashSet, path::Path},
    tokio::fs,
};

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct File {
    /// Pools whose reserves make up the snapshot.
    pools: Vec<Address>,

    /// Tokens that wrap a basket of other tokens. Wherever one of these shows
    /// up in a pool it is replaced by the tokens it wraps.
    #[serde(default)]
    wrap_tokens: Vec<Address>,
}

/// Which pools to snapshot and which tokens to expand.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    pub pools: Vec<Address>,
    pub wrap_tokens: HashSet<Address>,
}

impl Config {
    pub fn new(
        pools: Vec<Address>,
        wrap_tokens: impl IntoIterator<Item = Address>,
    ) -> Result<Self> {
        ensure!(!pools.is_empty(), "no pools configured");
        let mut seen = HashSet::new();
        for pool in &pools {
            // A pool listed twice would be counted twice.
            ensure!(seen.insert(pool), "pool {pool} configured more than once");
        }
        Ok(Self {
            pools,
            wrap_tokens: wrap_tokens.into_iter().collect(),
        })
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        let file = toml::de::from_str::<File>(data).context("invalid configuration")?;
        Self::new(file.pools, file.wrap_tokens)
    }
}

/// Loads the configuration from a TOML file.
pub async fn load(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .await
        .with_context(|| format!("I/O error while reading {path:?}"))?;
    Config::from_toml(&data).with_context(|| format!("while reading {path:?}"))
}
