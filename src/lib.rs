//! Yieldscope Backend Library
//!
//! Valuation engine for yield vaults: resolves wrapped deposit tokens
//! into constituent assets, attributes strategy funds to external
//! protocols and aggregates windowed system-wide snapshots.

pub mod api;
pub mod attribution;
pub mod chain;
pub mod errors;
pub mod listing;
pub mod metadata;
pub mod models;
pub mod pipeline;
pub mod resolver;
