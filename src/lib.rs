#![forbid(unsafe_code)]

//! Aggregation layer for the chocotube front-end.
//!
//! Every upstream is treated as unreliable: the modules here fetch from
//! mirrored and auxiliary video APIs, fold their response shapes into the
//! records in [`models`], and degrade to empty values instead of failing.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod instances;
pub mod models;
pub mod normalize;
pub mod render;
pub mod session;
pub mod upstream;

#[cfg(test)]
pub(crate) mod testing;
