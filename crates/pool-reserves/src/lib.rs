//! Computes how much of every underlying asset a set of Uniswap-like pools
//! holds at a given block.
//!
//! Each pool contributes the reserves of its two tokens. Tokens configured as
//! wrap tokens are not counted themselves; they are replaced by the tokens
//! they wrap, with the amounts the wrap token reports for them. The result is
//! a [`ReserveSnapshot`] mapping every asset to its exact total.
pub mod aggregation;
pub mod amount;
pub mod chain;
pub mod config;
pub mod expansion;
mod metrics;
pub mod pair;
pub mod pipeline;

pub use self::{
    aggregation::ReserveSnapshot,
    amount::Amount,
    chain::{BatchCallReading, OnchainReader, TransportFailure},
    config::Config,
    pipeline::SnapshotPipeline,
};
