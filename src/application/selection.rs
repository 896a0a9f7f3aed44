//! Column selection: `select`, `select.fields` and `select.values`.

use std::collections::HashSet;

use crate::application::error::QueryError;
use crate::application::filter::FilterSchema;

/// Query-string keys owned by selection.
pub const RESERVED_KEYS: &[&str] = &["select", "select.fields", "select.values"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedField {
    pub column: &'static str,
    pub alias: Option<String>,
}

impl SelectedField {
    /// Name the column is reported under.
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(self.column)
    }
}

/// Which columns to return and in what shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    All,
    /// Named columns, returned as `{cols, rows}` (or bare values for one column).
    Fields(Vec<SelectedField>),
    /// Bare columns, returned as value tuples (or bare values for one column).
    Values(Vec<&'static str>),
}

impl Selection {
    pub fn decode(pairs: &[(String, String)], schema: &FilterSchema) -> Result<Self, QueryError> {
        let mut selected: Option<(&str, &str)> = None;
        for (key, raw) in pairs {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            if selected.is_some() {
                return Err(QueryError::disallowed(
                    key.as_str(),
                    "only one of select, select.fields and select.values may be given",
                ));
            }
            selected = Some((key.as_str(), raw.as_str()));
        }

        let Some((key, raw)) = selected else {
            return Ok(Selection::All);
        };
        let items: Vec<&str> = raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect();
        if items.is_empty() {
            return Err(QueryError::malformed(key, "expected at least one column"));
        }

        let values_mode = key == "select.values";
        let mut fields = Vec::with_capacity(items.len());
        for item in items {
            let (name, alias) = match item.split_once(" as ") {
                Some((name, alias)) => (name.trim(), Some(alias.trim())),
                None => (item, None),
            };
            if values_mode && alias.is_some() {
                return Err(QueryError::disallowed(key, "aliases are only allowed in fields mode"));
            }
            if let Some(alias) = alias
                && !is_valid_alias(alias)
            {
                return Err(QueryError::malformed(key, format!("invalid alias `{alias}`")));
            }
            let column = schema.has_column(name).ok_or_else(|| {
                QueryError::disallowed(key, format!("unknown column `{name}`"))
            })?;
            fields.push(SelectedField {
                column,
                alias: alias.map(str::to_string),
            });
        }

        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.output_name()) {
                return Err(QueryError::disallowed(
                    key,
                    format!("`{}` is selected twice", field.output_name()),
                ));
            }
        }

        if values_mode {
            Ok(Selection::Values(fields.into_iter().map(|f| f.column).collect()))
        } else {
            Ok(Selection::Fields(fields))
        }
    }

    /// Columns to push down to the dispatcher, or `None` for whole rows.
    pub fn projection(&self) -> Option<Vec<&'static str>> {
        match self {
            Selection::All => None,
            Selection::Fields(fields) => Some(fields.iter().map(|f| f.column).collect()),
            Selection::Values(columns) => Some(columns.clone()),
        }
    }

    pub fn width(&self) -> Option<usize> {
        match self {
            Selection::All => None,
            Selection::Fields(fields) => Some(fields.len()),
            Selection::Values(columns) => Some(columns.len()),
        }
    }
}

fn is_valid_alias(alias: &str) -> bool {
    !alias.is_empty()
        && alias
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::resources::TRANSACTIONS;

    fn decode(raw: &[(&str, &str)]) -> Result<Selection, QueryError> {
        let pairs: Vec<(String, String)> = raw
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Selection::decode(&pairs, &TRANSACTIONS)
    }

    #[test]
    fn no_key_selects_everything() {
        assert_eq!(decode(&[("level", "1")]).unwrap(), Selection::All);
    }

    #[test]
    fn plain_select_is_fields_mode_with_aliases() {
        let selection = decode(&[("select", "level, sender as from")]).unwrap();
        assert_eq!(
            selection,
            Selection::Fields(vec![
                SelectedField {
                    column: "level",
                    alias: None
                },
                SelectedField {
                    column: "sender",
                    alias: Some("from".into())
                },
            ])
        );
        assert_eq!(selection.projection(), Some(vec!["level", "sender"]));
    }

    #[test]
    fn values_mode_rejects_aliases() {
        assert_eq!(
            decode(&[("select.values", "id,level")]).unwrap(),
            Selection::Values(vec!["id", "level"])
        );
        let err = decode(&[("select.values", "level as l")]).unwrap_err();
        assert_eq!(err.param(), "select.values");
    }

    #[test]
    fn both_modes_at_once_are_rejected() {
        let err = decode(&[("select.fields", "id"), ("select.values", "id")]).unwrap_err();
        assert!(matches!(err, QueryError::Disallowed { ref param, .. } if param == "select.values"));
    }

    #[test]
    fn unknown_and_duplicate_columns_are_rejected() {
        assert!(decode(&[("select", "colour")]).is_err());
        assert!(decode(&[("select", "id,level as id")]).is_err());
        assert!(matches!(
            decode(&[("select", " , ")]).unwrap_err(),
            QueryError::Malformed { .. }
        ));
    }
}
