//! Domain vocabulary shared by the query layer: scalar kinds and their parsing rules.

pub mod error;
pub mod types;
