//! Scalar value types accepted by filter parameters.

use std::fmt;

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use super::error::DomainError;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Address prefixes with the full encoded length they imply.
const ADDRESS_PREFIXES: &[(&str, usize)] = &[
    ("tz1", 36),
    ("tz2", 36),
    ("tz3", 36),
    ("tz4", 36),
    ("KT1", 36),
    ("sr1", 36),
    ("txr1", 37),
];

const OP_HASH_PREFIX: char = 'o';
const OP_HASH_LEN: usize = 51;

/// The type of value a filterable field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Int,
    Str,
    Address,
    OpHash,
    Timestamp,
    Bool,
}

impl ScalarKind {
    /// Whether range operators (`gt`, `ge`, `lt`, `le`) make sense for this kind.
    pub const fn is_ordered(self) -> bool {
        matches!(self, ScalarKind::Int | ScalarKind::Str | ScalarKind::Timestamp)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScalarKind::Int => "integer",
            ScalarKind::Str => "string",
            ScalarKind::Address => "address",
            ScalarKind::OpHash => "operation hash",
            ScalarKind::Timestamp => "timestamp",
            ScalarKind::Bool => "boolean",
        }
    }

    /// Parse a raw query-string value into a scalar of this kind.
    pub fn parse(self, raw: &str) -> Result<Scalar, DomainError> {
        let raw = raw.trim();
        match self {
            ScalarKind::Int => raw
                .parse::<i64>()
                .map(Scalar::Int)
                .map_err(|err| DomainError::invalid_scalar(self.as_str(), err.to_string())),
            ScalarKind::Str => Ok(Scalar::Str(raw.to_string())),
            ScalarKind::Address => parse_address(raw).map(Scalar::Address),
            ScalarKind::OpHash => parse_op_hash(raw).map(Scalar::OpHash),
            ScalarKind::Timestamp => parse_timestamp(raw).map(Scalar::Timestamp),
            ScalarKind::Bool => parse_bool(raw)
                .map(Scalar::Bool)
                .ok_or_else(|| DomainError::invalid_scalar(self.as_str(), "use true or false")),
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded filter value.
///
/// Ordering is only meaningful between values of the same kind; mixed-kind
/// comparisons never happen because a parameter is always decoded with its
/// field's kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scalar {
    Int(i64),
    Str(String),
    Address(String),
    OpHash(String),
    Timestamp(OffsetDateTime),
    Bool(bool),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::Int(_) => ScalarKind::Int,
            Scalar::Str(_) => ScalarKind::Str,
            Scalar::Address(_) => ScalarKind::Address,
            Scalar::OpHash(_) => ScalarKind::OpHash,
            Scalar::Timestamp(_) => ScalarKind::Timestamp,
            Scalar::Bool(_) => ScalarKind::Bool,
        }
    }

    /// Stable textual form used inside cache keys.
    ///
    /// Strings are form-url-encoded so key separators never appear raw, and
    /// timestamps collapse to UTC nanoseconds so equal instants written with
    /// different offsets share a key.
    pub fn canonical(&self) -> String {
        match self {
            Scalar::Int(value) => value.to_string(),
            Scalar::Str(value) | Scalar::Address(value) | Scalar::OpHash(value) => {
                url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
            }
            Scalar::Timestamp(value) => value.unix_timestamp_nanos().to_string(),
            Scalar::Bool(value) => value.to_string(),
        }
    }
}

fn is_base58(value: &str) -> bool {
    value.chars().all(|c| BASE58_ALPHABET.contains(c))
}

fn parse_address(raw: &str) -> Result<String, DomainError> {
    let kind = ScalarKind::Address.as_str();
    let Some(&(prefix, len)) = ADDRESS_PREFIXES
        .iter()
        .find(|(prefix, _)| raw.starts_with(prefix))
    else {
        return Err(DomainError::invalid_scalar(kind, "unknown address prefix"));
    };
    if raw.len() != len {
        return Err(DomainError::invalid_scalar(
            kind,
            format!("`{prefix}` addresses are {len} characters long"),
        ));
    }
    if !is_base58(raw) {
        return Err(DomainError::invalid_scalar(kind, "not a base58 string"));
    }
    Ok(raw.to_string())
}

fn parse_op_hash(raw: &str) -> Result<String, DomainError> {
    let kind = ScalarKind::OpHash.as_str();
    if !raw.starts_with(OP_HASH_PREFIX) || raw.len() != OP_HASH_LEN {
        return Err(DomainError::invalid_scalar(
            kind,
            format!("operation hashes start with `{OP_HASH_PREFIX}` and are {OP_HASH_LEN} characters long"),
        ));
    }
    if !is_base58(raw) {
        return Err(DomainError::invalid_scalar(kind, "not a base58 string"));
    }
    Ok(raw.to_string())
}

fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, DomainError> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(value);
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map(|date| date.midnight().assume_utc())
        .map_err(|_| {
            DomainError::invalid_scalar(
                ScalarKind::Timestamp.as_str(),
                "use RFC 3339 (2024-01-31T12:00:00Z) or a date (2024-01-31)",
            )
        })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "tz1aSkwEot3L2kmUvcoxzjMomb9mvBNuzFK6";

    #[test]
    fn addresses_are_validated_by_prefix_and_length() {
        assert_eq!(
            ScalarKind::Address.parse(ALICE),
            Ok(Scalar::Address(ALICE.to_string()))
        );
        assert!(ScalarKind::Address.parse("tz1short").is_err());
        assert!(ScalarKind::Address.parse("xx1aSkwEot3L2kmUvcoxzjMomb9mvBNuzFK6").is_err());
        // `0` and `l` are outside the base58 alphabet
        assert!(ScalarKind::Address.parse("tz10SkwEot3L2kmUvcoxzjMomb9mvBNuzFK6").is_err());
    }

    #[test]
    fn op_hash_requires_full_length() {
        let hash = "ooRAfDhmSNiLZbdSj1yXzvXc8MFD2EvckT4fKJZNbvMHqmkBY1x";
        assert_eq!(hash.len(), 51);
        assert!(ScalarKind::OpHash.parse(hash).is_ok());
        assert!(ScalarKind::OpHash.parse(&hash[..50]).is_err());
    }

    #[test]
    fn timestamps_accept_rfc3339_and_dates() {
        let a = ScalarKind::Timestamp.parse("2024-01-31T00:00:00Z").expect("rfc3339");
        let b = ScalarKind::Timestamp.parse("2024-01-31").expect("date");
        let c = ScalarKind::Timestamp
            .parse("2024-01-31T02:00:00+02:00")
            .expect("offset");
        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.canonical(), c.canonical());
        assert!(ScalarKind::Timestamp.parse("yesterday").is_err());
    }

    #[test]
    fn canonical_strings_escape_key_separators() {
        let value = Scalar::Str("a|b=c,d".to_string());
        let canonical = value.canonical();
        assert!(!canonical.contains('|'));
        assert!(!canonical.contains('='));
        assert!(!canonical.contains(','));
    }

    #[test]
    fn bool_and_int_parsing() {
        assert_eq!(ScalarKind::Bool.parse("1"), Ok(Scalar::Bool(true)));
        assert_eq!(ScalarKind::Bool.parse("false"), Ok(Scalar::Bool(false)));
        assert!(ScalarKind::Bool.parse("yes").is_err());
        assert_eq!(ScalarKind::Int.parse(" -1 "), Ok(Scalar::Int(-1)));
        assert!(ScalarKind::Int.parse("1.5").is_err());
    }

    #[test]
    fn only_some_kinds_are_ordered() {
        assert!(ScalarKind::Int.is_ordered());
        assert!(ScalarKind::Timestamp.is_ordered());
        assert!(!ScalarKind::Address.is_ordered());
        assert!(!ScalarKind::Bool.is_ordered());
    }
}
