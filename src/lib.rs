//! Query-filter algebra and response cache for a Tezos indexer read API.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
