//! Cache key construction.
//!
//! A key is the request path followed by `|name=value` entries in the order the
//! caller adds them. Values that equal their defaults are left out, so a
//! request that spells out a default shares its entry with one that omits it.

use std::fmt;

use crate::application::filter::{AnyOf, CompositeFilter};
use crate::application::pagination::Pagination;
use crate::application::params::{Operator, Parameter};
use crate::application::selection::Selection;
use crate::domain::types::Scalar;

/// Deterministic key of one cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn builder(path: &str) -> KeyBuilder {
        KeyBuilder {
            buf: path.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path segment the key was built from.
    pub fn path(&self) -> &str {
        self.0.split('|').next().unwrap_or_default()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct KeyBuilder {
    buf: String,
}

impl KeyBuilder {
    /// Append `value` under `name`, unless it is a default.
    pub fn part<T: KeyPart + ?Sized>(mut self, name: &str, value: &T) -> Self {
        KeyWriter { buf: &mut self.buf }.nested(name, value);
        self
    }

    /// Append a composite whose entries are written without a prefix.
    pub fn parts<T: KeyPart + ?Sized>(self, value: &T) -> Self {
        self.part("", value)
    }

    pub fn finish(self) -> CacheKey {
        CacheKey(self.buf)
    }
}

/// Sink handed to [`KeyPart::write_key`].
pub struct KeyWriter<'a> {
    buf: &'a mut String,
}

impl KeyWriter<'_> {
    pub fn entry(&mut self, name: &str, value: &str) {
        self.buf.push('|');
        self.buf.push_str(name);
        self.buf.push('=');
        self.buf.push_str(value);
    }

    /// Write `value` under `name` unless it is a default.
    pub fn nested<T: KeyPart + ?Sized>(&mut self, name: &str, value: &T) {
        if !value.is_default() {
            value.write_key(name, self);
        }
    }
}

fn scoped(prefix: &str, name: &str) -> String {
    match (prefix.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{prefix}.{name}"),
    }
}

/// Something that can contribute entries to a cache key.
pub trait KeyPart {
    fn is_default(&self) -> bool {
        false
    }

    fn write_key(&self, name: &str, out: &mut KeyWriter<'_>);
}

impl KeyPart for Scalar {
    fn write_key(&self, name: &str, out: &mut KeyWriter<'_>) {
        out.entry(name, &self.canonical());
    }
}

impl KeyPart for str {
    fn write_key(&self, name: &str, out: &mut KeyWriter<'_>) {
        let encoded: String = url::form_urlencoded::byte_serialize(self.as_bytes()).collect();
        out.entry(name, &encoded);
    }
}

impl KeyPart for bool {
    fn write_key(&self, name: &str, out: &mut KeyWriter<'_>) {
        out.entry(name, if *self { "true" } else { "false" });
    }
}

impl KeyPart for u64 {
    fn write_key(&self, name: &str, out: &mut KeyWriter<'_>) {
        out.entry(name, &self.to_string());
    }
}

impl<T: KeyPart> KeyPart for Option<T> {
    fn is_default(&self) -> bool {
        self.as_ref().is_none_or(KeyPart::is_default)
    }

    fn write_key(&self, name: &str, out: &mut KeyWriter<'_>) {
        if let Some(value) = self {
            value.write_key(name, out);
        }
    }
}

/// Set-valued operands render as `[a,b]`, sorted, so list order never splits entries.
impl KeyPart for [Scalar] {
    fn write_key(&self, name: &str, out: &mut KeyWriter<'_>) {
        let mut values: Vec<String> = self.iter().map(Scalar::canonical).collect();
        values.sort();
        out.entry(name, &format!("[{}]", values.join(",")));
    }
}

impl KeyPart for Vec<Scalar> {
    fn write_key(&self, name: &str, out: &mut KeyWriter<'_>) {
        self.as_slice().write_key(name, out);
    }
}

impl KeyPart for Parameter {
    fn is_default(&self) -> bool {
        self.is_empty()
    }

    fn write_key(&self, name: &str, out: &mut KeyWriter<'_>) {
        for op in Operator::ALL {
            let key = match op {
                Operator::Eq => name.to_string(),
                op => scoped(name, op.suffix()),
            };
            match op {
                Operator::Eq => out.nested(&key, &self.eq),
                Operator::Ne => out.nested(&key, &self.ne),
                Operator::Gt => out.nested(&key, &self.gt),
                Operator::Ge => out.nested(&key, &self.ge),
                Operator::Lt => out.nested(&key, &self.lt),
                Operator::Le => out.nested(&key, &self.le),
                Operator::In => out.nested(&key, &self.in_list),
                Operator::Ni => out.nested(&key, &self.ni_list),
                Operator::Null => out.nested(&key, &self.null),
                Operator::Eqx => out.nested(&key, &self.eqx.map(str::to_string)),
                Operator::Nex => out.nested(&key, &self.nex.map(str::to_string)),
            }
        }
    }
}

impl KeyPart for String {
    fn write_key(&self, name: &str, out: &mut KeyWriter<'_>) {
        self.as_str().write_key(name, out);
    }
}

impl KeyPart for AnyOf {
    fn is_default(&self) -> bool {
        self.param.is_empty()
    }

    fn write_key(&self, name: &str, out: &mut KeyWriter<'_>) {
        let mut fields = self.fields.clone();
        fields.sort_unstable();
        let group = format!("anyof.{}", fields.join("."));
        out.nested(&scoped(name, &group), &self.param);
    }
}

impl KeyPart for CompositeFilter {
    fn is_default(&self) -> bool {
        self.is_empty()
    }

    fn write_key(&self, name: &str, out: &mut KeyWriter<'_>) {
        for (field, param) in &self.fields {
            out.nested(&scoped(name, field), param);
        }
        out.nested(name, &self.any_of);
    }
}

impl KeyPart for Pagination {
    fn is_default(&self) -> bool {
        self.offset == 0 && self.is_default_limit() && self.is_default_sort()
    }

    fn write_key(&self, name: &str, out: &mut KeyWriter<'_>) {
        if self.offset != 0 {
            self.offset.write_key(&scoped(name, "offset"), out);
        }
        if !self.is_default_limit() {
            u64::from(self.limit).write_key(&scoped(name, "limit"), out);
        }
        if !self.is_default_sort() {
            let key = scoped(name, &format!("sort.{}", self.sort.direction.as_str()));
            self.sort.field.write_key(&key, out);
        }
    }
}

impl KeyPart for Selection {
    fn is_default(&self) -> bool {
        matches!(self, Selection::All)
    }

    fn write_key(&self, name: &str, out: &mut KeyWriter<'_>) {
        let (mode, items): (&str, Vec<String>) = match self {
            Selection::All => return,
            Selection::Fields(fields) => (
                "select.fields",
                fields
                    .iter()
                    .map(|field| match &field.alias {
                        Some(alias) => format!("{}:{alias}", field.column),
                        None => field.column.to_string(),
                    })
                    .collect(),
            ),
            Selection::Values(columns) => (
                "select.values",
                columns.iter().map(|column| column.to_string()).collect(),
            ),
        };
        out.entry(&scoped(name, mode), &format!("[{}]", items.join(",")));
    }
}
