//! Request orchestration: decode, validate, key, short-circuit, cache, dispatch.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::application::error::{AppError, QueryError};
use crate::application::filter::{CompositeFilter, FilterSchema};
use crate::application::output::QueryOutput;
use crate::application::pagination::{self, Pagination, QueryLimits};
use crate::application::repos::{ChainHead, QueryDispatcher, ResourceQuery};
use crate::application::selection::{self, Selection};
use crate::cache::{CacheConfig, CacheError, CacheKey, InFlight, ResponseCache};

pub(crate) const METRIC_SHORT_CIRCUIT: &str = "tzquery_cache_short_circuit_total";
pub(crate) const METRIC_DISPATCH_MS: &str = "tzquery_dispatch_ms";

pub const HEAD_PATH: &str = "/v1/head";

/// A decoded and validated list request.
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub schema: &'static FilterSchema,
    pub filter: CompositeFilter,
    pub pagination: Pagination,
    pub selection: Selection,
}

impl ListRequest {
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::builder(self.schema.path)
            .parts(&self.filter)
            .parts(&self.pagination)
            .parts(&self.selection)
            .finish()
    }

    pub fn is_unsatisfiable(&self) -> bool {
        self.filter.is_unsatisfiable(self.schema)
    }
}

/// A decoded and validated count request.
#[derive(Debug, Clone)]
pub struct CountRequest {
    pub schema: &'static FilterSchema,
    pub filter: CompositeFilter,
}

impl CountRequest {
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::builder(&count_path(self.schema))
            .parts(&self.filter)
            .finish()
    }

    pub fn is_unsatisfiable(&self) -> bool {
        self.filter.is_unsatisfiable(self.schema)
    }
}

pub fn count_path(schema: &FilterSchema) -> String {
    format!("{}/count", schema.path)
}

/// Decode a list request. Pagination and selection keys are accepted.
pub fn parse_list(
    schema: &'static FilterSchema,
    pairs: &[(String, String)],
    limits: &QueryLimits,
) -> Result<ListRequest, QueryError> {
    let reserved: Vec<&str> = pagination::RESERVED_KEYS
        .iter()
        .chain(selection::RESERVED_KEYS)
        .copied()
        .collect();
    let filter = schema.decode(pairs, &reserved)?;
    filter.validate(schema)?;
    let pagination = Pagination::decode(pairs, schema, limits)?;
    let selection = Selection::decode(pairs, schema)?;
    Ok(ListRequest {
        schema,
        filter,
        pagination,
        selection,
    })
}

/// Decode a count request. Only filter keys are accepted.
pub fn parse_count(
    schema: &'static FilterSchema,
    pairs: &[(String, String)],
) -> Result<CountRequest, QueryError> {
    let filter = schema.decode(pairs, &[])?;
    filter.validate(schema)?;
    Ok(CountRequest { schema, filter })
}

/// Serves list, count and head requests through the response cache.
pub struct QueryService {
    dispatcher: Arc<dyn QueryDispatcher>,
    cache: Option<Arc<ResponseCache>>,
    inflight: Option<InFlight>,
    limits: QueryLimits,
    head_ttl: Duration,
}

impl QueryService {
    /// A service that dispatches every request.
    pub fn new(dispatcher: Arc<dyn QueryDispatcher>, limits: QueryLimits) -> Self {
        Self {
            dispatcher,
            cache: None,
            inflight: None,
            limits,
            head_ttl: Duration::ZERO,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>, config: &CacheConfig) -> Self {
        self.cache = Some(cache);
        self.inflight = config.coalesce_misses.then(InFlight::new);
        self.head_ttl = config.head_ttl();
        self
    }

    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }

    #[instrument(skip(self, schema, pairs), fields(resource = schema.resource))]
    pub async fn list(
        &self,
        schema: &'static FilterSchema,
        pairs: &[(String, String)],
    ) -> Result<Bytes, AppError> {
        let request = parse_list(schema, pairs, &self.limits)?;
        let key = request.cache_key();

        if request.is_unsatisfiable() {
            return self.short_circuit(schema, key, &QueryOutput::empty(&request.selection));
        }

        let request = &request;
        self.cached(key, None, move || async move {
            let projection = request.selection.projection();
            let query = ResourceQuery {
                schema,
                filter: &request.filter,
                pagination: &request.pagination,
                projection: projection.as_deref(),
            };
            let started_at = Instant::now();
            let rows = self.dispatcher.fetch(query).await;
            record_dispatch(schema.resource, "fetch", started_at);
            Ok(QueryOutput::shape(&request.selection, rows?)?)
        })
        .await
    }

    #[instrument(skip(self, schema, pairs), fields(resource = schema.resource))]
    pub async fn count(
        &self,
        schema: &'static FilterSchema,
        pairs: &[(String, String)],
    ) -> Result<Bytes, AppError> {
        let request = parse_count(schema, pairs)?;
        let key = request.cache_key();

        if request.is_unsatisfiable() {
            return self.short_circuit(schema, key, &QueryOutput::Count(0));
        }

        let filter = &request.filter;
        self.cached(key, None, move || async move {
            let started_at = Instant::now();
            let count = self.dispatcher.count(schema, filter).await;
            record_dispatch(schema.resource, "count", started_at);
            Ok(QueryOutput::Count(count?))
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn head(&self) -> Result<Bytes, AppError> {
        let key = CacheKey::builder(HEAD_PATH).finish();
        self.cached(key, Some(self.head_ttl), move || async move {
            let started_at = Instant::now();
            let head: Result<ChainHead, _> = self.dispatcher.head().await;
            record_dispatch("head", "head", started_at);
            Ok(head?)
        })
        .await
    }

    /// Ask the dispatcher for the head directly, bypassing the cache.
    pub async fn ping(&self) -> Result<ChainHead, AppError> {
        Ok(self.dispatcher.head().await?)
    }

    fn short_circuit(
        &self,
        schema: &FilterSchema,
        key: CacheKey,
        empty: &QueryOutput,
    ) -> Result<Bytes, AppError> {
        counter!(METRIC_SHORT_CIRCUIT, "resource" => schema.resource).increment(1);
        debug!(key = %key, "Filter cannot match any row, skipping dispatch");
        match &self.cache {
            Some(cache) => Ok(cache.set(key, empty)?),
            None => encode(empty),
        }
    }

    async fn cached<T, F, Fut>(
        &self,
        key: CacheKey,
        ttl: Option<Duration>,
        produce: F,
    ) -> Result<Bytes, AppError>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let Some(cache) = &self.cache else {
            return encode(&produce().await?);
        };

        if let Some(hit) = cache.try_get(&key) {
            return Ok(hit);
        }

        let _guard = match &self.inflight {
            Some(inflight) => {
                let guard = inflight.acquire(&key).await;
                if let Some(hit) = cache.recheck(&key) {
                    return Ok(hit);
                }
                Some(guard)
            }
            None => None,
        };

        // A block landing mid-dispatch makes this result stale before it is stored.
        let since = cache.generation();
        let value = produce().await?;
        Ok(cache.set_unless_invalidated(key, &value, ttl, since)?)
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, AppError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|err| AppError::from(CacheError::from(err)))
}

fn record_dispatch(resource: &'static str, op: &'static str, started_at: Instant) {
    histogram!(METRIC_DISPATCH_MS, "resource" => resource, "op" => op)
        .record(started_at.elapsed().as_secs_f64() * 1000.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::resources::{ACCOUNTS, TRANSACTIONS};

    fn pairs(raw: &str) -> Vec<(String, String)> {
        url::form_urlencoded::parse(raw.as_bytes())
            .into_owned()
            .collect()
    }

    #[test]
    fn count_requests_reject_pagination_keys() {
        let err = parse_count(&ACCOUNTS, &pairs("limit=5")).unwrap_err();
        assert_eq!(err, QueryError::unknown("limit"));
        let err = parse_count(&ACCOUNTS, &pairs("select=id")).unwrap_err();
        assert_eq!(err, QueryError::unknown("select"));
    }

    #[test]
    fn list_and_count_agree_on_satisfiability() {
        for raw in ["id=-1", "address.in=", "balance.gt=5&balance.lt=5"] {
            let list = parse_list(&ACCOUNTS, &pairs(raw), &QueryLimits::default()).unwrap();
            let count = parse_count(&ACCOUNTS, &pairs(raw)).unwrap();
            assert!(list.is_unsatisfiable(), "{raw}");
            assert!(count.is_unsatisfiable(), "{raw}");
        }
    }

    #[test]
    fn count_keys_live_under_the_count_path() {
        let count = parse_count(&TRANSACTIONS, &pairs("level=5")).unwrap();
        assert_eq!(
            count.cache_key().as_str(),
            "/v1/operations/transactions/count|level=5"
        );
    }

    #[test]
    fn validation_errors_surface_before_anything_else() {
        let err = parse_list(
            &TRANSACTIONS,
            &pairs("sender.eqx=hash&limit=5"),
            &QueryLimits::default(),
        )
        .unwrap_err();
        assert_eq!(err.param(), "sender.eqx");
    }
}
