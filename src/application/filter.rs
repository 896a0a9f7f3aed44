//! Field descriptors, per-resource filter schemas and the composite filter
//! decoded from a request's query string.

use std::collections::HashSet;

use crate::application::error::QueryError;
use crate::application::pagination::SortSpec;
use crate::application::params::{OpSet, Operator, Parameter};
use crate::domain::types::{Scalar, ScalarKind};

const ANY_OF_PREFIX: &str = "anyof";

/// Declarative capabilities of one filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: ScalarKind,
    pub ops: OpSet,
    /// Fields this one may be compared with through `eqx`/`nex`.
    pub partners: &'static [&'static str],
    pub nullable: bool,
    /// Value that no row ever carries (e.g. `id=-1`).
    pub sentinel: Option<i64>,
    /// Columns a virtual field stands for. Empty for plain columns.
    pub covers: &'static [&'static str],
}

impl FieldDescriptor {
    /// Equality operators, plus range operators for ordered kinds.
    pub const fn new(name: &'static str, kind: ScalarKind) -> Self {
        let ops = if kind.is_ordered() {
            OpSet::EQUALITY.union(OpSet::RANGE)
        } else {
            OpSet::EQUALITY
        };
        Self {
            name,
            kind,
            ops,
            partners: &[],
            nullable: false,
            sentinel: None,
            covers: &[],
        }
    }

    pub const fn ops(mut self, ops: OpSet) -> Self {
        self.ops = ops;
        self
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self.ops = self.ops.union(OpSet::NULL);
        self
    }

    pub const fn partners(mut self, partners: &'static [&'static str]) -> Self {
        self.partners = partners;
        self.ops = self.ops.union(OpSet::CROSS);
        self
    }

    pub const fn sentinel(mut self, value: i64) -> Self {
        self.sentinel = Some(value);
        self
    }

    /// Match against any of `columns` instead of a column of the same name.
    pub const fn covering(mut self, columns: &'static [&'static str]) -> Self {
        self.covers = columns;
        self
    }

    pub fn is_virtual(&self) -> bool {
        !self.covers.is_empty()
    }

    pub fn sentinel_scalar(&self) -> Option<Scalar> {
        self.sentinel.map(Scalar::Int)
    }
}

/// Everything the decoder needs to know about one resource.
#[derive(Debug)]
pub struct FilterSchema {
    pub resource: &'static str,
    /// Request path, also the leading segment of every cache key.
    pub path: &'static str,
    pub fields: &'static [FieldDescriptor],
    /// Columns a row exposes, in response order. Selection is checked against this.
    pub columns: &'static [&'static str],
    pub sort_fields: &'static [&'static str],
    pub default_sort: SortSpec,
    pub any_of_fields: &'static [&'static str],
}

impl FilterSchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn has_column(&self, name: &str) -> Option<&'static str> {
        self.columns.iter().copied().find(|column| *column == name)
    }

    /// Decode every filter key of a query string.
    ///
    /// Keys listed in `reserved` belong to pagination or selection and are
    /// skipped; anything else that is not a known field is rejected.
    pub fn decode(
        &self,
        pairs: &[(String, String)],
        reserved: &[&str],
    ) -> Result<CompositeFilter, QueryError> {
        let mut params = vec![Parameter::default(); self.fields.len()];
        let mut any_of: Option<AnyOf> = None;

        for (key, raw) in pairs {
            if reserved.contains(&key.as_str()) {
                continue;
            }
            let (name, suffix) = match key.split_once('.') {
                Some((name, suffix)) => (name, Some(suffix)),
                None => (key.as_str(), None),
            };

            if name == ANY_OF_PREFIX {
                self.decode_any_of(&mut any_of, key, suffix, raw)?;
                continue;
            }

            let index = self
                .position(name)
                .ok_or_else(|| QueryError::unknown(key.as_str()))?;
            let op = match suffix {
                None => Operator::Eq,
                Some(suffix) => Operator::from_suffix(suffix).ok_or_else(|| {
                    QueryError::disallowed(key.as_str(), format!("unknown operator `{suffix}`"))
                })?,
            };
            params[index].apply(&self.fields[index], op, key, raw)?;
        }

        let fields = self
            .fields
            .iter()
            .zip(params)
            .filter(|(_, param)| !param.is_empty())
            .map(|(field, param)| (field.name, param))
            .collect();

        Ok(CompositeFilter { fields, any_of })
    }

    fn decode_any_of(
        &self,
        slot: &mut Option<AnyOf>,
        key: &str,
        rest: Option<&str>,
        raw: &str,
    ) -> Result<(), QueryError> {
        let mut segments: Vec<&str> = rest.map(|rest| rest.split('.').collect()).unwrap_or_default();
        let op = match segments.last().and_then(|last| Operator::from_suffix(last)) {
            Some(op) => {
                segments.pop();
                op
            }
            None => Operator::Eq,
        };

        let mut members = Vec::with_capacity(segments.len());
        for segment in segments {
            let field = self.field(segment).ok_or_else(|| {
                QueryError::disallowed(key, format!("`{segment}` is not a field of {}", self.resource))
            })?;
            members.push(field);
        }
        let Some(kind) = members.first().map(|field| field.kind) else {
            return Err(QueryError::malformed(key, "expected `anyof.<field>.<field>`"));
        };
        if let Some(other) = members.iter().find(|field| field.kind != kind) {
            return Err(QueryError::disallowed(
                key,
                format!("`{}` is not a {kind} field", other.name),
            ));
        }
        // `null` matches when any member column is null.
        let nullable = members.iter().any(|field| field.nullable);
        let fields: Vec<&'static str> = members.iter().map(|field| field.name).collect();

        let descriptor = FieldDescriptor {
            name: ANY_OF_PREFIX,
            kind,
            ops: OpSet::only(Operator::Eq)
                .union(OpSet::only(Operator::In))
                .union(if nullable { OpSet::NULL } else { OpSet::EMPTY }),
            partners: &[],
            nullable,
            sentinel: None,
            covers: &[],
        };

        if let Some(existing) = slot.as_ref()
            && !same_group(&existing.fields, &fields)
        {
            return Err(QueryError::disallowed(
                key,
                "only one anyof group is allowed per request",
            ));
        }
        let group = slot.get_or_insert_with(|| AnyOf {
            key: key.to_string(),
            fields,
            param: Parameter::default(),
        });
        group.param.apply(&descriptor, op, key, raw)
    }
}

fn same_group(left: &[&'static str], right: &[&'static str]) -> bool {
    let left: HashSet<_> = left.iter().collect();
    let right: HashSet<_> = right.iter().collect();
    left == right
}

/// One parameter applied with OR semantics across sibling fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyOf {
    /// Query-string key as first written, used in error messages.
    pub key: String,
    pub fields: Vec<&'static str>,
    pub param: Parameter,
}

/// All per-field parameters of a request, in schema declaration order.
/// Fields without any operator are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeFilter {
    pub fields: Vec<(&'static str, Parameter)>,
    pub any_of: Option<AnyOf>,
}

impl CompositeFilter {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.any_of.is_none()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, param)| param)
    }

    /// Cross-field checks that single-key decoding cannot see.
    pub fn validate(&self, schema: &FilterSchema) -> Result<(), QueryError> {
        for (name, param) in &self.fields {
            param.check_exclusive(name)?;
        }

        if let Some(any_of) = &self.any_of {
            let key = any_of.key.as_str();
            if any_of.fields.len() < 2 {
                return Err(QueryError::disallowed(
                    key,
                    "anyof needs at least two fields",
                ));
            }
            let mut seen = HashSet::new();
            for field in &any_of.fields {
                if !seen.insert(*field) {
                    return Err(QueryError::disallowed(
                        key,
                        format!("`{field}` is listed twice"),
                    ));
                }
                if !schema.any_of_fields.contains(field) {
                    return Err(QueryError::disallowed(
                        key,
                        format!("`{field}` cannot be used in anyof"),
                    ));
                }
            }
            if any_of.param.eq.is_some() && any_of.param.in_list.is_some() {
                return Err(QueryError::disallowed(
                    key,
                    "cannot combine eq and in",
                ));
            }
        }
        Ok(())
    }

    /// True when the filter provably matches no row.
    pub fn is_unsatisfiable(&self, schema: &FilterSchema) -> bool {
        let field_empty = self.fields.iter().any(|(name, param)| {
            let sentinel = schema.field(name).and_then(FieldDescriptor::sentinel_scalar);
            param.is_unsatisfiable(sentinel.as_ref())
        });
        field_empty
            || self
                .any_of
                .as_ref()
                .is_some_and(|any_of| any_of.param.is_unsatisfiable(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::resources::{ACCOUNTS, TRANSACTIONS};

    const ALICE: &str = "tz1aSkwEot3L2kmUvcoxzjMomb9mvBNuzFK6";
    const BOB: &str = "tz1burnburnburnburnburnburnburjAYjjX";

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn decode(
        schema: &'static FilterSchema,
        raw: &[(&str, &str)],
    ) -> Result<CompositeFilter, QueryError> {
        let filter = schema.decode(&pairs(raw), &["limit"])?;
        filter.validate(schema)?;
        Ok(filter)
    }

    #[test]
    fn fields_are_kept_in_schema_order() {
        let filter = decode(&TRANSACTIONS, &[("amount.gt", "5"), ("level", "10")]).unwrap();
        let names: Vec<_> = filter.fields.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["level", "amount"]);
    }

    #[test]
    fn unknown_field_names_the_key() {
        let err = decode(&TRANSACTIONS, &[("colour", "red")]).unwrap_err();
        assert_eq!(err, QueryError::unknown("colour"));
    }

    #[test]
    fn unknown_suffix_names_the_key() {
        let err = decode(&TRANSACTIONS, &[("level.like", "1")]).unwrap_err();
        assert_eq!(err.param(), "level.like");
    }

    #[test]
    fn reserved_keys_are_skipped() {
        let filter = decode(&TRANSACTIONS, &[("limit", "5")]).unwrap();
        assert!(filter.is_empty());
    }

    #[test]
    fn anyof_decodes_with_operator() {
        let filter = decode(
            &TRANSACTIONS,
            &[("anyof.sender.target.in", &format!("{ALICE},{BOB}"))],
        )
        .unwrap();
        let any_of = filter.any_of.expect("anyof");
        assert_eq!(any_of.fields, vec!["sender", "target"]);
        assert_eq!(any_of.param.in_list.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn anyof_requires_two_allowed_fields() {
        let err = decode(&TRANSACTIONS, &[("anyof.sender", ALICE)]).unwrap_err();
        assert_eq!(err.param(), "anyof.sender");

        let err = decode(&TRANSACTIONS, &[("anyof.sender.sender", ALICE)]).unwrap_err();
        assert_eq!(err.param(), "anyof.sender.sender");

        let err = decode(&TRANSACTIONS, &[("anyof.sender.hash", ALICE)]).unwrap_err();
        assert_eq!(err.param(), "anyof.sender.hash");
    }

    #[test]
    fn anyof_rejects_range_operators() {
        let err = decode(&TRANSACTIONS, &[("anyof.sender.target.gt", ALICE)]).unwrap_err();
        assert_eq!(err.param(), "anyof.sender.target.gt");
    }

    #[test]
    fn anyof_null_does_not_depend_on_field_order() {
        let first = decode(&TRANSACTIONS, &[("anyof.sender.target.null", "true")]).unwrap();
        let second = decode(&TRANSACTIONS, &[("anyof.target.sender.null", "true")]).unwrap();
        let first = first.any_of.expect("anyof");
        let second = second.any_of.expect("anyof");
        assert_eq!(first.param, second.param);
        assert_eq!(first.param.null, Some(true));

        let err = decode(&TRANSACTIONS, &[("anyof.sender.hash.null", "true")]).unwrap_err();
        assert_eq!(err.param(), "anyof.sender.hash.null");
    }

    #[test]
    fn only_one_anyof_group() {
        let err = decode(
            &TRANSACTIONS,
            &[("anyof.sender.target", ALICE), ("anyof.sender.initiator", ALICE)],
        )
        .unwrap_err();
        assert_eq!(err.param(), "anyof.sender.initiator");
    }

    #[test]
    fn eqx_partners_follow_the_schema() {
        assert!(decode(&ACCOUNTS, &[("delegate.eqx", "address")]).is_ok());
        let err = decode(&ACCOUNTS, &[("delegate.eqx", "balance")]).unwrap_err();
        assert_eq!(err.param(), "delegate.eqx");
    }

    #[test]
    fn sentinel_and_empty_lists_are_unsatisfiable() {
        let filter = decode(&ACCOUNTS, &[("id", "-1")]).unwrap();
        assert!(filter.is_unsatisfiable(&ACCOUNTS));

        let filter = decode(&ACCOUNTS, &[("address.in", "")]).unwrap();
        assert!(filter.is_unsatisfiable(&ACCOUNTS));

        let filter = decode(&ACCOUNTS, &[("anyof.address.delegate.in", "")]).unwrap();
        assert!(filter.is_unsatisfiable(&ACCOUNTS));

        let filter = decode(&ACCOUNTS, &[("address.ni", "")]).unwrap();
        assert!(!filter.is_unsatisfiable(&ACCOUNTS));
    }
}
