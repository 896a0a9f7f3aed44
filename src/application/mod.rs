//! Query decoding, validation and dispatch.

pub mod error;
pub mod filter;
pub mod output;
pub mod pagination;
pub mod params;
pub mod query;
pub mod repos;
pub mod resources;
pub mod selection;
