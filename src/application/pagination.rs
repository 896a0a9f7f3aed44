//! Offset pagination and single-field sorting.

use serde::Deserialize;

use crate::application::error::QueryError;
use crate::application::filter::FilterSchema;

/// Query-string keys owned by pagination.
pub const RESERVED_KEYS: &[&str] = &["offset", "p", "n", "limit", "sort", "sort.asc", "sort.desc"];

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortSpec {
    pub field: &'static str,
    pub direction: SortDirection,
}

impl SortSpec {
    pub const fn asc(field: &'static str) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    pub const fn desc(field: &'static str) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }
}

/// Page-size bounds applied to every list request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueryLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

impl QueryLimits {
    /// Clamp a requested page size into `[0, max_limit]`.
    pub fn clamp(&self, requested: u64) -> u32 {
        u32::try_from(requested).map_or(self.max_limit, |requested| requested.min(self.max_limit))
    }
}

/// Resolved window and ordering for a list request.
///
/// Remembers the defaults it was decoded against so cache keys can leave
/// default values out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u32,
    pub sort: SortSpec,
    default_limit: u32,
    default_sort: SortSpec,
}

impl Pagination {
    pub fn defaults(schema: &FilterSchema, limits: &QueryLimits) -> Self {
        let limit = limits.clamp(u64::from(limits.default_limit));
        Self {
            offset: 0,
            limit,
            sort: schema.default_sort,
            default_limit: limit,
            default_sort: schema.default_sort,
        }
    }

    pub fn is_default_limit(&self) -> bool {
        self.limit == self.default_limit
    }

    pub fn is_default_sort(&self) -> bool {
        self.sort == self.default_sort
    }

    pub fn decode(
        pairs: &[(String, String)],
        schema: &FilterSchema,
        limits: &QueryLimits,
    ) -> Result<Self, QueryError> {
        let mut offset: Option<u64> = None;
        let mut page: Option<u64> = None;
        let mut limit: Option<u64> = None;
        let mut size: Option<u64> = None;
        let mut sort: Option<SortSpec> = None;

        for (key, raw) in pairs {
            let raw = raw.trim();
            match key.as_str() {
                "offset" => set_once(&mut offset, key, parse_number(key, raw)?)?,
                "p" => set_once(&mut page, key, parse_number(key, raw)?)?,
                "limit" => set_once(&mut limit, key, parse_number(key, raw)?)?,
                "n" => set_once(&mut size, key, parse_number(key, raw)?)?,
                "sort" | "sort.asc" | "sort.desc" => {
                    if sort.is_some() {
                        return Err(QueryError::duplicate(key.as_str()));
                    }
                    let field = schema
                        .sort_fields
                        .iter()
                        .copied()
                        .find(|field| *field == raw)
                        .ok_or_else(|| {
                            QueryError::disallowed(
                                key.as_str(),
                                format!("cannot sort {} by `{raw}`", schema.resource),
                            )
                        })?;
                    let spec = if key == "sort.desc" {
                        SortSpec::desc(field)
                    } else {
                        SortSpec::asc(field)
                    };
                    sort = Some(spec);
                }
                _ => {}
            }
        }

        if offset.is_some() && page.is_some() {
            return Err(QueryError::disallowed("p", "cannot be combined with `offset`"));
        }
        if let (Some(limit), Some(size)) = (limit, size)
            && limit != size
        {
            return Err(QueryError::disallowed("n", "conflicts with `limit`"));
        }

        let mut pagination = Self::defaults(schema, limits);
        if let Some(requested) = limit.or(size) {
            pagination.limit = limits.clamp(requested);
        }
        pagination.offset = match (offset, page) {
            (Some(offset), _) => offset,
            (None, Some(page)) => page.saturating_mul(u64::from(pagination.limit)),
            (None, None) => 0,
        };
        if let Some(spec) = sort {
            pagination.sort = spec;
        }
        Ok(pagination)
    }
}

fn set_once<T>(slot: &mut Option<T>, key: &str, value: T) -> Result<(), QueryError> {
    if slot.is_some() {
        return Err(QueryError::duplicate(key));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, QueryError> {
    raw.parse()
        .map_err(|_| QueryError::malformed(key, "expected a non-negative integer"))
}
