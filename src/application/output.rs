//! Response shapes resolved from the request's selection.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::application::repos::{RepoError, RowSet};
use crate::application::selection::Selection;

/// The body of a query response.
///
/// Serialises untagged: the variant is implied by the request, so clients only
/// ever see the JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    /// No selection: full row objects.
    Objects(Vec<Map<String, Value>>),
    /// Exactly one selected column: its bare values.
    Scalars(Vec<Value>),
    /// Several columns in values mode.
    Tuples(Vec<Vec<Value>>),
    /// Several columns in fields mode.
    Columnar { cols: Vec<String>, rows: Vec<Vec<Value>> },
    Count(u64),
}

impl QueryOutput {
    /// The shape an empty result takes under `selection`.
    pub fn empty(selection: &Selection) -> Self {
        match selection {
            Selection::All => QueryOutput::Objects(Vec::new()),
            Selection::Fields(fields) if fields.len() > 1 => QueryOutput::Columnar {
                cols: column_names(selection),
                rows: Vec::new(),
            },
            Selection::Values(columns) if columns.len() > 1 => QueryOutput::Tuples(Vec::new()),
            Selection::Fields(_) | Selection::Values(_) => QueryOutput::Scalars(Vec::new()),
        }
    }

    /// Fit dispatcher rows into the shape `selection` asks for.
    pub fn shape(selection: &Selection, rows: RowSet) -> Result<Self, RepoError> {
        let projection = match selection.projection() {
            None => {
                return match rows {
                    RowSet::Objects(rows) => Ok(QueryOutput::Objects(rows)),
                    RowSet::Projected(_) => Err(RepoError::contract(
                        "projected rows for a request without selection",
                    )),
                };
            }
            Some(projection) => projection,
        };

        let rows = match rows {
            RowSet::Projected(rows) => {
                if let Some(row) = rows.iter().find(|row| row.len() != projection.len()) {
                    return Err(RepoError::contract(format!(
                        "{} values for {} selected columns",
                        row.len(),
                        projection.len()
                    )));
                }
                rows
            }
            RowSet::Objects(objects) => objects
                .into_iter()
                .map(|mut object| {
                    projection
                        .iter()
                        .map(|column| object.remove(*column).unwrap_or(Value::Null))
                        .collect()
                })
                .collect(),
        };

        if projection.len() == 1 {
            return Ok(QueryOutput::Scalars(
                rows.into_iter().filter_map(|row| row.into_iter().next()).collect(),
            ));
        }
        Ok(match selection {
            Selection::Values(_) => QueryOutput::Tuples(rows),
            _ => QueryOutput::Columnar {
                cols: column_names(selection),
                rows,
            },
        })
    }
}

fn column_names(selection: &Selection) -> Vec<String> {
    match selection {
        Selection::Fields(fields) => fields.iter().map(|f| f.output_name().to_string()).collect(),
        Selection::Values(columns) => columns.iter().map(|c| c.to_string()).collect(),
        Selection::All => Vec::new(),
    }
}
