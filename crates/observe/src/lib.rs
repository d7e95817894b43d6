//! This crate contains the code that is required to make the reserve snapshot
//! pipeline observable: initialization logic for logging and the global
//! metrics registry that every component registers its metrics with.
pub mod config;
pub mod metrics;
pub mod tracing;

pub use config::Config;
