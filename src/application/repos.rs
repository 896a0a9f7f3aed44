//! Boundary to the repository layer that actually runs queries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;

use crate::application::filter::{CompositeFilter, FilterSchema};
use crate::application::pagination::Pagination;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("query timed out")]
    Timeout,
    #[error("dispatcher returned {0}")]
    Contract(String),
}

impl RepoError {
    pub fn contract(message: impl Into<String>) -> Self {
        Self::Contract(message.into())
    }
}

/// One validated list request as seen by the repository layer.
#[derive(Debug, Clone, Copy)]
pub struct ResourceQuery<'a> {
    pub schema: &'static FilterSchema,
    pub filter: &'a CompositeFilter,
    pub pagination: &'a Pagination,
    /// Columns to return, in order. `None` asks for whole rows.
    pub projection: Option<&'a [&'static str]>,
}

/// Rows produced by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum RowSet {
    /// Whole rows, keyed by column name.
    Objects(Vec<Map<String, Value>>),
    /// Rows restricted to the requested projection, one value per projected column.
    Projected(Vec<Vec<Value>>),
}

impl RowSet {
    pub fn len(&self) -> usize {
        match self {
            RowSet::Objects(rows) => rows.len(),
            RowSet::Projected(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Most recent block known to the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainHead {
    pub level: i64,
    pub hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[async_trait]
pub trait QueryDispatcher: Send + Sync {
    /// Rows matching the filter, ordered and windowed by the pagination.
    async fn fetch(&self, query: ResourceQuery<'_>) -> Result<RowSet, RepoError>;

    /// Number of rows matching the filter, ignoring pagination.
    async fn count(
        &self,
        schema: &'static FilterSchema,
        filter: &CompositeFilter,
    ) -> Result<u64, RepoError>;

    async fn head(&self) -> Result<ChainHead, RepoError>;
}
