//! Comparison parameters: the per-field operator set decoded from `field.op=value` keys.

use std::cmp::Ordering;

use crate::application::error::QueryError;
use crate::application::filter::FieldDescriptor;
use crate::domain::types::Scalar;

/// Comparison operators, in the order they are written into cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    Ni,
    Null,
    Eqx,
    Nex,
}

impl Operator {
    pub const ALL: [Operator; 11] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Ge,
        Operator::Lt,
        Operator::Le,
        Operator::In,
        Operator::Ni,
        Operator::Null,
        Operator::Eqx,
        Operator::Nex,
    ];

    pub const fn suffix(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::In => "in",
            Operator::Ni => "ni",
            Operator::Null => "null",
            Operator::Eqx => "eqx",
            Operator::Nex => "nex",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.suffix() == suffix)
    }

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Set of operators a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSet(u16);

impl OpSet {
    pub const EMPTY: OpSet = OpSet(0);
    pub const EQUALITY: OpSet = OpSet(
        Operator::Eq.bit() | Operator::Ne.bit() | Operator::In.bit() | Operator::Ni.bit(),
    );
    pub const RANGE: OpSet =
        OpSet(Operator::Gt.bit() | Operator::Ge.bit() | Operator::Lt.bit() | Operator::Le.bit());
    pub const NULL: OpSet = OpSet(Operator::Null.bit());
    pub const CROSS: OpSet = OpSet(Operator::Eqx.bit() | Operator::Nex.bit());

    pub const fn union(self, other: OpSet) -> OpSet {
        OpSet(self.0 | other.0)
    }

    pub const fn only(op: Operator) -> OpSet {
        OpSet(op.bit())
    }

    pub const fn contains(self, op: Operator) -> bool {
        self.0 & op.bit() != 0
    }
}

/// Decoded operators for one field. Every operator is optional and at most one
/// value per operator is kept; `in`/`ni` lists are sorted and de-duplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameter {
    pub eq: Option<Scalar>,
    pub ne: Option<Scalar>,
    pub gt: Option<Scalar>,
    pub ge: Option<Scalar>,
    pub lt: Option<Scalar>,
    pub le: Option<Scalar>,
    pub in_list: Option<Vec<Scalar>>,
    pub ni_list: Option<Vec<Scalar>>,
    pub null: Option<bool>,
    pub eqx: Option<&'static str>,
    pub nex: Option<&'static str>,
}

impl Parameter {
    pub fn is_empty(&self) -> bool {
        Operator::ALL.into_iter().all(|op| !self.is_set(op))
    }

    pub fn is_set(&self, op: Operator) -> bool {
        match op {
            Operator::Eq => self.eq.is_some(),
            Operator::Ne => self.ne.is_some(),
            Operator::Gt => self.gt.is_some(),
            Operator::Ge => self.ge.is_some(),
            Operator::Lt => self.lt.is_some(),
            Operator::Le => self.le.is_some(),
            Operator::In => self.in_list.is_some(),
            Operator::Ni => self.ni_list.is_some(),
            Operator::Null => self.null.is_some(),
            Operator::Eqx => self.eqx.is_some(),
            Operator::Nex => self.nex.is_some(),
        }
    }

    /// Decode one `key=raw` pair into this parameter.
    ///
    /// `key` is the query-string key exactly as written and is what every
    /// error names.
    pub fn apply(
        &mut self,
        descriptor: &FieldDescriptor,
        op: Operator,
        key: &str,
        raw: &str,
    ) -> Result<(), QueryError> {
        if !descriptor.ops.contains(op) {
            return Err(QueryError::disallowed(
                key,
                format!(
                    "`{}` does not support the `{}` operator",
                    descriptor.name,
                    op.suffix()
                ),
            ));
        }
        if self.is_set(op) {
            return Err(QueryError::duplicate(key));
        }

        let scalar = |raw: &str| {
            descriptor
                .kind
                .parse(raw)
                .map_err(|err| QueryError::malformed(key, err.to_string()))
        };
        let list = |raw: &str| -> Result<Vec<Scalar>, QueryError> {
            let mut values = raw
                .split(',')
                .map(str::trim)
                .filter(|segment| !segment.is_empty())
                .map(scalar)
                .collect::<Result<Vec<_>, _>>()?;
            values.sort();
            values.dedup();
            Ok(values)
        };

        match op {
            Operator::Eq => self.eq = Some(scalar(raw)?),
            Operator::Ne => self.ne = Some(scalar(raw)?),
            Operator::Gt => self.gt = Some(scalar(raw)?),
            Operator::Ge => self.ge = Some(scalar(raw)?),
            Operator::Lt => self.lt = Some(scalar(raw)?),
            Operator::Le => self.le = Some(scalar(raw)?),
            Operator::In => self.in_list = Some(list(raw)?),
            Operator::Ni => self.ni_list = Some(list(raw)?),
            Operator::Null => self.null = Some(parse_null_flag(key, raw)?),
            Operator::Eqx => self.eqx = Some(partner(descriptor, key, raw)?),
            Operator::Nex => self.nex = Some(partner(descriptor, key, raw)?),
        }
        Ok(())
    }

    /// Reject operator combinations that contradict each other syntactically.
    pub fn check_exclusive(&self, field: &str) -> Result<(), QueryError> {
        if self.eq.is_some() && self.in_list.is_some() {
            return Err(QueryError::disallowed(
                format!("{field}.in"),
                format!("cannot be combined with `{field}` equality"),
            ));
        }
        let direct = self.eq.is_some()
            || self.ne.is_some()
            || self.in_list.is_some()
            || self.ni_list.is_some();
        for op in [Operator::Eqx, Operator::Nex] {
            if self.is_set(op) && direct {
                return Err(QueryError::disallowed(
                    format!("{field}.{}", op.suffix()),
                    "cross-field comparison cannot be combined with eq, ne, in or ni",
                ));
            }
        }
        Ok(())
    }

    /// True when no row can possibly match, so the backing query can be skipped.
    pub fn is_unsatisfiable(&self, sentinel: Option<&Scalar>) -> bool {
        let wants_null = self.null == Some(true);
        // Range bounds and `eqx` only ever hold for present values.
        let null_hit = wants_null && !self.has_range() && self.eqx.is_none();

        if wants_null && !null_hit && self.in_list.is_none() {
            return true;
        }

        if let Some(eq) = &self.eq {
            if wants_null || Some(eq) == sentinel || Some(eq) == self.ne.as_ref() {
                return true;
            }
            if self.excluded(eq) || !self.within_range(eq) {
                return true;
            }
        }

        if let Some(values) = &self.in_list
            && !null_hit
            && values.iter().all(|value| {
                Some(value) == sentinel || self.excluded(value) || !self.within_range(value)
            })
        {
            return true;
        }

        self.range_is_empty()
    }

    fn has_range(&self) -> bool {
        self.gt.is_some() || self.ge.is_some() || self.lt.is_some() || self.le.is_some()
    }

    fn excluded(&self, value: &Scalar) -> bool {
        self.ni_list
            .as_ref()
            .is_some_and(|list| list.binary_search(value).is_ok())
    }

    /// Whether `value` lies inside every range bound that is set.
    pub fn within_range(&self, value: &Scalar) -> bool {
        self.gt.as_ref().is_none_or(|bound| value > bound)
            && self.ge.as_ref().is_none_or(|bound| value >= bound)
            && self.lt.as_ref().is_none_or(|bound| value < bound)
            && self.le.as_ref().is_none_or(|bound| value <= bound)
    }

    fn range_is_empty(&self) -> bool {
        let lower = tighter(
            self.gt.as_ref().map(|v| (v, false)),
            self.ge.as_ref().map(|v| (v, true)),
            Ordering::Greater,
        );
        let upper = tighter(
            self.lt.as_ref().map(|v| (v, false)),
            self.le.as_ref().map(|v| (v, true)),
            Ordering::Less,
        );
        match (lower, upper) {
            (Some((low, low_inclusive)), Some((high, high_inclusive))) => match low.cmp(high) {
                Ordering::Greater => true,
                Ordering::Equal => !(low_inclusive && high_inclusive),
                Ordering::Less => false,
            },
            _ => false,
        }
    }

    /// Evaluate this parameter against one row value.
    ///
    /// `value` is `None` for SQL-style nulls. `partner` resolves the value of a
    /// sibling column for `eqx`/`nex`.
    pub fn matches(
        &self,
        value: Option<&Scalar>,
        partner: impl Fn(&'static str) -> Option<Scalar>,
    ) -> bool {
        if let Some(values) = &self.in_list {
            let listed = value.is_some_and(|v| values.binary_search(v).is_ok());
            let null_hit = self.null == Some(true) && value.is_none();
            if !(listed || null_hit) {
                return false;
            }
        } else if let Some(null) = self.null
            && null != value.is_none()
        {
            return false;
        }

        if let Some(eq) = &self.eq
            && value != Some(eq)
        {
            return false;
        }
        if let Some(ne) = &self.ne
            && value == Some(ne)
        {
            return false;
        }
        if value.is_some_and(|v| self.excluded(v)) {
            return false;
        }

        if self.has_range() && !value.is_some_and(|v| self.within_range(v)) {
            return false;
        }

        if let Some(other) = self.eqx {
            let other = partner(other);
            if value.is_none() || value != other.as_ref() {
                return false;
            }
        }
        if let Some(other) = self.nex
            && value == partner(other).as_ref()
        {
            return false;
        }
        true
    }
}

/// Pick the stricter of two bounds on the same side of a range. At equal
/// values the exclusive bound wins.
fn tighter<'a>(
    exclusive: Option<(&'a Scalar, bool)>,
    inclusive: Option<(&'a Scalar, bool)>,
    stricter: Ordering,
) -> Option<(&'a Scalar, bool)> {
    match (exclusive, inclusive) {
        (Some(a), Some(b)) => {
            if b.0.cmp(a.0) == stricter {
                Some(b)
            } else {
                Some(a)
            }
        }
        (a, b) => a.or(b),
    }
}

fn parse_null_flag(key: &str, raw: &str) -> Result<bool, QueryError> {
    match raw.trim() {
        "" | "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(QueryError::malformed(key, "expected true or false")),
    }
}

fn partner(
    descriptor: &FieldDescriptor,
    key: &str,
    raw: &str,
) -> Result<&'static str, QueryError> {
    let target = raw.trim();
    descriptor
        .partners
        .iter()
        .copied()
        .find(|candidate| *candidate == target)
        .ok_or_else(|| {
            QueryError::disallowed(
                key,
                format!("`{}` cannot be compared with `{target}`", descriptor.name),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ScalarKind;

    const LEVEL: FieldDescriptor = FieldDescriptor::new("level", ScalarKind::Int).sentinel(-1);
    const SENDER: FieldDescriptor = FieldDescriptor::new("sender", ScalarKind::Address)
        .nullable()
        .partners(&["target"]);
    const DELEGATED_AT: FieldDescriptor =
        FieldDescriptor::new("delegatedAt", ScalarKind::Int).nullable();

    fn decode(descriptor: &FieldDescriptor, pairs: &[(&str, &str)]) -> Result<Parameter, QueryError> {
        let mut param = Parameter::default();
        for (key, raw) in pairs {
            let op = match key.split_once('.') {
                Some((_, suffix)) => Operator::from_suffix(suffix).expect("known suffix"),
                None => Operator::Eq,
            };
            param.apply(descriptor, op, key, raw)?;
        }
        param.check_exclusive(descriptor.name)?;
        Ok(param)
    }

    fn int(value: i64) -> Scalar {
        Scalar::Int(value)
    }

    #[test]
    fn operator_suffixes_round_trip() {
        for op in Operator::ALL {
            assert_eq!(Operator::from_suffix(op.suffix()), Some(op));
        }
        assert_eq!(Operator::from_suffix("like"), None);
    }

    #[test]
    fn in_lists_are_sorted_and_deduplicated() {
        let param = decode(&LEVEL, &[("level.in", "3, 1,,2,3")]).expect("decodes");
        assert_eq!(param.in_list, Some(vec![int(1), int(2), int(3)]));
    }

    #[test]
    fn empty_in_list_is_kept_as_empty() {
        let param = decode(&LEVEL, &[("level.in", "")]).expect("decodes");
        assert_eq!(param.in_list, Some(vec![]));
        assert!(param.is_unsatisfiable(None));
    }

    #[test]
    fn repeated_operator_is_a_duplicate() {
        let err = decode(&LEVEL, &[("level", "1"), ("level.eq", "2")]).unwrap_err();
        assert_eq!(err, QueryError::duplicate("level.eq"));
    }

    #[test]
    fn eq_with_in_names_the_in_key() {
        let err = decode(&LEVEL, &[("level", "1"), ("level.in", "1,2")]).unwrap_err();
        assert_eq!(err.param(), "level.in");
    }

    #[test]
    fn range_operators_need_an_ordered_kind() {
        let err = decode(&SENDER, &[("sender.gt", "tz1aSkwEot3L2kmUvcoxzjMomb9mvBNuzFK6")])
            .unwrap_err();
        assert!(matches!(err, QueryError::Disallowed { ref param, .. } if param == "sender.gt"));
    }

    #[test]
    fn null_is_only_accepted_on_nullable_fields() {
        assert!(decode(&LEVEL, &[("level.null", "")]).is_err());
        let param = decode(&SENDER, &[("sender.null", "")]).expect("decodes");
        assert_eq!(param.null, Some(true));
        let err = decode(&SENDER, &[("sender.null", "maybe")]).unwrap_err();
        assert!(matches!(err, QueryError::Malformed { .. }));
    }

    #[test]
    fn malformed_scalar_names_the_key() {
        let err = decode(&LEVEL, &[("level.ge", "ten")]).unwrap_err();
        assert!(matches!(err, QueryError::Malformed { ref param, .. } if param == "level.ge"));
    }

    #[test]
    fn eqx_targets_must_be_partners() {
        let param = decode(&SENDER, &[("sender.eqx", "target")]).expect("decodes");
        assert_eq!(param.eqx, Some("target"));

        let err = decode(&SENDER, &[("sender.eqx", "initiator")]).unwrap_err();
        match err {
            QueryError::Disallowed { param, reason } => {
                assert_eq!(param, "sender.eqx");
                assert!(reason.contains("sender"));
                assert!(reason.contains("initiator"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn eqx_is_exclusive_with_direct_comparisons() {
        let err = decode(
            &SENDER,
            &[
                ("sender.nex", "target"),
                ("sender.ne", "tz1aSkwEot3L2kmUvcoxzjMomb9mvBNuzFK6"),
            ],
        )
        .unwrap_err();
        assert_eq!(err.param(), "sender.nex");
    }

    #[test]
    fn unsatisfiable_combinations() {
        let sentinel = int(-1);
        let cases: &[&[(&str, &str)]] = &[
            &[("level", "-1")],
            &[("level.in", "-1")],
            &[("level", "5"), ("level.ne", "5")],
            &[("level", "5"), ("level.ni", "4,5")],
            &[("level", "5"), ("level.gt", "5")],
            &[("level.gt", "9"), ("level.lt", "3")],
            &[("level.ge", "4"), ("level.lt", "4")],
            &[("level.in", "1,2"), ("level.ni", "1,2")],
        ];
        for pairs in cases {
            let param = decode(&LEVEL, pairs).expect("decodes");
            assert!(param.is_unsatisfiable(Some(&sentinel)), "{pairs:?}");
        }
    }

    #[test]
    fn satisfiable_combinations() {
        let sentinel = int(-1);
        let cases: &[&[(&str, &str)]] = &[
            &[("level", "5")],
            &[("level.ge", "4"), ("level.le", "4")],
            &[("level.gt", "1"), ("level.ge", "3"), ("level.lt", "4")],
            &[("level.in", "-1,2")],
            &[("level.ni", "")],
        ];
        for pairs in cases {
            let param = decode(&LEVEL, pairs).expect("decodes");
            assert!(!param.is_unsatisfiable(Some(&sentinel)), "{pairs:?}");
        }
    }

    #[test]
    fn eq_with_null_is_unsatisfiable() {
        let param = decode(
            &SENDER,
            &[
                ("sender", "tz1aSkwEot3L2kmUvcoxzjMomb9mvBNuzFK6"),
                ("sender.null", "true"),
            ],
        )
        .expect("decodes");
        assert!(param.is_unsatisfiable(None));
    }

    #[test]
    fn null_with_present_only_operators_is_unsatisfiable() {
        let cases: &[&[(&str, &str)]] = &[
            &[("sender.null", "true"), ("sender.eqx", "target")],
            &[("delegatedAt.null", "true"), ("delegatedAt.gt", "5")],
            &[("delegatedAt.null", ""), ("delegatedAt.le", "5")],
            &[
                ("delegatedAt.null", "true"),
                ("delegatedAt.in", "7,9"),
                ("delegatedAt.lt", "5"),
            ],
        ];
        for pairs in cases {
            let descriptor = if pairs[0].0.starts_with("sender") {
                &SENDER
            } else {
                &DELEGATED_AT
            };
            let param = decode(descriptor, pairs).expect("decodes");
            assert!(param.is_unsatisfiable(None), "{pairs:?}");
            assert!(!param.matches(None, |_| None), "{pairs:?}");
        }

        let param = decode(
            &DELEGATED_AT,
            &[("delegatedAt.null", "true"), ("delegatedAt.in", "3,9"), ("delegatedAt.lt", "5")],
        )
        .expect("decodes");
        assert!(!param.is_unsatisfiable(None));
        assert!(param.matches(Some(&int(3)), |_| None));

        let param = decode(&DELEGATED_AT, &[("delegatedAt.null", "false"), ("delegatedAt.gt", "5")])
            .expect("decodes");
        assert!(!param.is_unsatisfiable(None));
    }

    #[test]
    fn empty_in_with_null_still_matches_nulls() {
        let param = decode(&SENDER, &[("sender.in", ""), ("sender.null", "1")]).expect("decodes");
        assert!(!param.is_unsatisfiable(None));
        assert!(param.matches(None, |_| None));
    }

    #[test]
    fn matching_follows_null_semantics() {
        let param = decode(&LEVEL, &[("level.ne", "3")]).expect("decodes");
        assert!(param.matches(None, |_| None));
        assert!(!param.matches(Some(&int(3)), |_| None));

        let param = decode(&LEVEL, &[("level.gt", "3")]).expect("decodes");
        assert!(!param.matches(None, |_| None));
        assert!(param.matches(Some(&int(4)), |_| None));
    }

    #[test]
    fn cross_field_matching_resolves_partner() {
        let alice = Scalar::Address("tz1aSkwEot3L2kmUvcoxzjMomb9mvBNuzFK6".into());
        let param = decode(&SENDER, &[("sender.eqx", "target")]).expect("decodes");
        assert!(param.matches(Some(&alice), |_| Some(alice.clone())));
        assert!(!param.matches(Some(&alice), |_| None));

        let param = decode(&SENDER, &[("sender.nex", "target")]).expect("decodes");
        assert!(!param.matches(Some(&alice), |_| Some(alice.clone())));
        assert!(param.matches(Some(&alice), |_| None));
    }
}
