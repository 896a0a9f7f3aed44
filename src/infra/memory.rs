//! In-memory `QueryDispatcher` over JSON fixture rows.
//!
//! Evaluates the filter algebra row by row, so the binary and the test suite
//! can run without the indexer's database. Fixture layout:
//!
//! ```json
//! {
//!   "head": { "level": 1, "hash": "B...", "timestamp": "2024-01-01T00:00:00Z" },
//!   "tables": { "transactions": [ { "id": 1, "sender": "tz1..." } ], "accounts": [] }
//! }
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::application::filter::{AnyOf, CompositeFilter, FilterSchema};
use crate::application::pagination::{Pagination, SortDirection};
use crate::application::params::Parameter;
use crate::application::repos::{ChainHead, QueryDispatcher, RepoError, ResourceQuery, RowSet};
use crate::application::resources;
use crate::domain::types::{Scalar, ScalarKind};

use super::error::InfraError;

type Row = Map<String, Value>;

#[derive(Debug, Deserialize)]
struct Fixtures {
    head: Option<ChainHead>,
    #[serde(default)]
    tables: HashMap<String, Vec<Row>>,
}

pub struct InMemoryDispatcher {
    head: ChainHead,
    tables: HashMap<&'static str, Vec<Row>>,
}

impl Default for InMemoryDispatcher {
    fn default() -> Self {
        Self::new(genesis())
    }
}

impl InMemoryDispatcher {
    /// A dispatcher with no rows.
    pub fn new(head: ChainHead) -> Self {
        Self {
            head,
            tables: HashMap::new(),
        }
    }

    /// Replace the rows of one resource.
    pub fn with_rows(
        mut self,
        schema: &'static FilterSchema,
        rows: Vec<Row>,
    ) -> Self {
        self.tables.insert(schema.resource, rows);
        self
    }

    pub fn from_json(raw: &str) -> Result<Self, InfraError> {
        let fixtures: Fixtures = serde_json::from_str(raw)
            .map_err(|err| InfraError::fixtures(format!("invalid fixture document: {err}")))?;

        let mut dispatcher = Self::new(fixtures.head.unwrap_or_else(genesis));
        for (name, rows) in fixtures.tables {
            let schema = resources::by_name(&name)
                .ok_or_else(|| InfraError::fixtures(format!("unknown resource `{name}`")))?;
            dispatcher = dispatcher.with_rows(schema, rows);
        }
        Ok(dispatcher)
    }

    pub async fn load(path: &Path) -> Result<Self, InfraError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let dispatcher = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            tables = dispatcher.tables.len(),
            rows = dispatcher.tables.values().map(Vec::len).sum::<usize>(),
            "Loaded fixtures"
        );
        Ok(dispatcher)
    }

    fn rows(&self, schema: &FilterSchema) -> &[Row] {
        self.tables
            .get(schema.resource)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn matching<'a>(&'a self, schema: &FilterSchema, filter: &CompositeFilter) -> Vec<&'a Row> {
        self.rows(schema)
            .iter()
            .filter(|row| row_matches(schema, filter, row))
            .collect()
    }
}

#[async_trait]
impl QueryDispatcher for InMemoryDispatcher {
    async fn fetch(&self, query: ResourceQuery<'_>) -> Result<RowSet, RepoError> {
        let schema = query.schema;
        let mut rows = self.matching(schema, query.filter);
        sort_rows(schema, query.pagination, &mut rows);

        let offset = usize::try_from(query.pagination.offset).unwrap_or(usize::MAX);
        let limit = query.pagination.limit as usize;
        let page = rows.into_iter().skip(offset).take(limit);

        let rows = match query.projection {
            Some(columns) => RowSet::Projected(
                page.map(|row| {
                    columns
                        .iter()
                        .map(|column| row.get(*column).cloned().unwrap_or(Value::Null))
                        .collect()
                })
                .collect(),
            ),
            None => RowSet::Objects(page.cloned().collect()),
        };
        debug!(resource = schema.resource, rows = rows.len(), "Fetched fixture rows");
        Ok(rows)
    }

    async fn count(
        &self,
        schema: &'static FilterSchema,
        filter: &CompositeFilter,
    ) -> Result<u64, RepoError> {
        Ok(self.matching(schema, filter).len() as u64)
    }

    async fn head(&self) -> Result<ChainHead, RepoError> {
        Ok(self.head.clone())
    }
}

fn genesis() -> ChainHead {
    ChainHead {
        level: 0,
        hash: String::new(),
        timestamp: OffsetDateTime::UNIX_EPOCH,
    }
}

/// Read a column as a scalar of the given kind. Missing, null and
/// unparsable values all read as absent.
fn cell(row: &Row, column: &str, kind: ScalarKind) -> Option<Scalar> {
    let raw = match row.get(column)? {
        Value::String(value) => value.clone(),
        Value::Number(value) => value.to_string(),
        Value::Bool(value) => value.to_string(),
        _ => return None,
    };
    kind.parse(&raw).ok()
}

fn column_kind(schema: &FilterSchema, column: &str) -> ScalarKind {
    schema
        .field(column)
        .map_or(ScalarKind::Str, |field| field.kind)
}

fn row_matches(schema: &FilterSchema, filter: &CompositeFilter, row: &Row) -> bool {
    let partner = |other: &'static str| cell(row, other, column_kind(schema, other));

    let fields_match = filter.fields.iter().all(|(name, param)| {
        let Some(field) = schema.field(name) else {
            return false;
        };
        if field.is_virtual() {
            covered_matches(param, field.covers, field.kind, row, &partner)
        } else {
            param.matches(cell(row, name, field.kind).as_ref(), &partner)
        }
    });

    fields_match
        && filter
            .any_of
            .as_ref()
            .is_none_or(|any_of| any_of_matches(schema, any_of, row, &partner))
}

/// A virtual field matches when one covered column satisfies the positive
/// operators and no covered column hits an exclusion.
fn covered_matches(
    param: &Parameter,
    columns: &[&'static str],
    kind: ScalarKind,
    row: &Row,
    partner: &impl Fn(&'static str) -> Option<Scalar>,
) -> bool {
    let positive = Parameter {
        ne: None,
        ni_list: None,
        ..param.clone()
    };
    let exclusion = Parameter {
        ne: param.ne.clone(),
        ni_list: param.ni_list.clone(),
        ..Parameter::default()
    };

    let values: Vec<Option<Scalar>> = columns
        .iter()
        .map(|column| cell(row, column, kind))
        .collect();
    values
        .iter()
        .any(|value| positive.matches(value.as_ref(), partner))
        && values
            .iter()
            .all(|value| exclusion.matches(value.as_ref(), partner))
}

fn any_of_matches(
    schema: &FilterSchema,
    any_of: &AnyOf,
    row: &Row,
    partner: &impl Fn(&'static str) -> Option<Scalar>,
) -> bool {
    any_of.fields.iter().any(|field| {
        let value = cell(row, field, column_kind(schema, field));
        any_of.param.matches(value.as_ref(), partner)
    })
}

/// Order by the requested field, absent values first, ties broken by `id`.
fn sort_rows(schema: &FilterSchema, pagination: &Pagination, rows: &mut [&Row]) {
    let field = pagination.sort.field;
    let kind = column_kind(schema, field);
    rows.sort_by(|a, b| {
        let ordering = cell(a, field, kind).cmp(&cell(b, field, kind));
        let ordering = match pagination.sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        ordering.then_with(|| tie_break(a, b))
    });
}

fn tie_break(a: &Row, b: &Row) -> Ordering {
    cell(a, "id", ScalarKind::Int).cmp(&cell(b, "id", ScalarKind::Int))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::pagination::QueryLimits;
    use crate::application::query::parse_list;
    use crate::application::resources::{ACCOUNTS, TRANSACTIONS};
    use crate::application::selection::Selection;

    const ALICE: &str = "tz1aSkwEot3L2kmUvcoxzjMomb9mvBNuzFK6";
    const BOB: &str = "tz1burnburnburnburnburnburnburjAYjjX";
    const CAROL: &str = "KT1PWx2mnDueood7fEmfbBDKx1D9BAnnXitn";

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture rows are objects"),
        }
    }

    fn dispatcher() -> InMemoryDispatcher {
        InMemoryDispatcher::default().with_rows(
            &TRANSACTIONS,
            vec![
                row(json!({"id": 1, "level": 10, "sender": ALICE, "target": BOB, "amount": 5, "status": "applied"})),
                row(json!({"id": 2, "level": 11, "sender": BOB, "target": null, "amount": 50, "status": "failed"})),
                row(json!({"id": 3, "level": 11, "sender": CAROL, "target": CAROL, "initiator": ALICE, "amount": 7, "status": "applied"})),
                row(json!({"id": 4, "level": 12, "sender": BOB, "target": ALICE, "amount": 0, "status": "applied"})),
            ],
        )
    }

    async fn ids(raw: &str) -> Vec<i64> {
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
            .into_owned()
            .collect();
        let request =
            parse_list(&TRANSACTIONS, &pairs, &QueryLimits::default()).expect("valid request");
        let query = ResourceQuery {
            schema: request.schema,
            filter: &request.filter,
            pagination: &request.pagination,
            projection: Some(&["id"]),
        };
        match dispatcher().fetch(query).await.expect("fetch") {
            RowSet::Projected(rows) => rows
                .into_iter()
                .map(|row| row[0].as_i64().expect("id"))
                .collect(),
            RowSet::Objects(_) => panic!("projection requested"),
        }
    }

    #[tokio::test]
    async fn filters_sort_and_page() {
        assert_eq!(ids("").await, vec![1, 2, 3, 4]);
        assert_eq!(ids("level=11").await, vec![2, 3]);
        assert_eq!(ids("amount.ge=7&sort.desc=amount").await, vec![2, 3]);
        assert_eq!(ids("sort.desc=level&limit=2").await, vec![4, 2]);
        assert_eq!(ids("p=1&n=3").await, vec![4]);
        assert_eq!(ids("status.ni=failed").await, vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn nullable_columns_honour_null_operator() {
        assert_eq!(ids("target.null").await, vec![2]);
        assert_eq!(ids("target.null=false").await, vec![1, 3, 4]);
        assert_eq!(ids("initiator.null=false").await, vec![3]);
    }

    #[tokio::test]
    async fn cross_field_comparisons_use_the_same_row() {
        assert_eq!(ids("sender.eqx=target").await, vec![3]);
        assert_eq!(ids("sender.nex=target").await, vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn virtual_account_field_covers_every_role() {
        let raw = format!("account={ALICE}");
        assert_eq!(ids(&raw).await, vec![1, 3, 4]);
        let raw = format!("account.ne={ALICE}");
        assert_eq!(ids(&raw).await, vec![2]);
    }

    #[tokio::test]
    async fn any_of_matches_when_one_field_does() {
        let raw = format!("anyof.target.initiator={ALICE}");
        assert_eq!(ids(&raw).await, vec![3, 4]);
        assert_eq!(ids("anyof.target.initiator.null").await, vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn count_ignores_pagination() {
        let filter = TRANSACTIONS
            .decode(&[("status".into(), "applied".into())], &[])
            .expect("decode");
        let count = dispatcher().count(&TRANSACTIONS, &filter).await.expect("count");
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn whole_rows_are_returned_without_projection() {
        let request = parse_list(&ACCOUNTS, &[], &QueryLimits::default()).expect("valid");
        assert_eq!(request.selection, Selection::All);
        let query = ResourceQuery {
            schema: &ACCOUNTS,
            filter: &request.filter,
            pagination: &request.pagination,
            projection: None,
        };
        let rows = dispatcher().fetch(query).await.expect("fetch");
        assert_eq!(rows, RowSet::Objects(Vec::new()));
    }

    #[test]
    fn fixtures_reject_unknown_tables() {
        let err = InMemoryDispatcher::from_json(r#"{"tables": {"blocks": []}}"#)
            .err()
            .expect("unknown table");
        assert!(err.to_string().contains("blocks"));
    }

    #[tokio::test]
    async fn fixtures_provide_the_head() {
        let dispatcher = InMemoryDispatcher::from_json(
            r#"{"head": {"level": 42, "hash": "BLockHash", "timestamp": "2024-03-01T00:00:00Z"}}"#,
        )
        .expect("valid fixtures");
        let head = dispatcher.head().await.expect("head");
        assert_eq!(head.level, 42);
    }
}
