//! Filter schemas of the resources served by the API.

use crate::application::filter::{FieldDescriptor, FilterSchema};
use crate::application::pagination::SortSpec;
use crate::application::params::OpSet;
use crate::domain::types::ScalarKind;

pub static TRANSACTIONS: FilterSchema = FilterSchema {
    resource: "transactions",
    path: "/v1/operations/transactions",
    fields: &[
        FieldDescriptor::new("id", ScalarKind::Int).sentinel(-1),
        FieldDescriptor::new("level", ScalarKind::Int),
        FieldDescriptor::new("timestamp", ScalarKind::Timestamp),
        FieldDescriptor::new("hash", ScalarKind::OpHash),
        FieldDescriptor::new("sender", ScalarKind::Address).partners(&["target", "initiator"]),
        FieldDescriptor::new("target", ScalarKind::Address)
            .nullable()
            .partners(&["sender", "initiator"]),
        FieldDescriptor::new("initiator", ScalarKind::Address)
            .nullable()
            .partners(&["sender", "target"]),
        FieldDescriptor::new("account", ScalarKind::Address)
            .ops(OpSet::EQUALITY)
            .covering(&["sender", "target", "initiator"]),
        FieldDescriptor::new("amount", ScalarKind::Int),
        FieldDescriptor::new("status", ScalarKind::Str).ops(OpSet::EQUALITY),
        FieldDescriptor::new("hasInternals", ScalarKind::Bool),
    ],
    columns: &[
        "id",
        "level",
        "timestamp",
        "block",
        "hash",
        "counter",
        "sender",
        "target",
        "initiator",
        "amount",
        "status",
        "hasInternals",
    ],
    sort_fields: &["id", "level", "timestamp", "amount"],
    default_sort: SortSpec::asc("id"),
    any_of_fields: &["sender", "target", "initiator"],
};

pub static ACCOUNTS: FilterSchema = FilterSchema {
    resource: "accounts",
    path: "/v1/accounts",
    fields: &[
        FieldDescriptor::new("id", ScalarKind::Int).sentinel(-1),
        FieldDescriptor::new("address", ScalarKind::Address).partners(&["delegate"]),
        FieldDescriptor::new("type", ScalarKind::Str).ops(OpSet::EQUALITY),
        FieldDescriptor::new("balance", ScalarKind::Int),
        FieldDescriptor::new("delegate", ScalarKind::Address)
            .nullable()
            .partners(&["address"]),
        FieldDescriptor::new("firstActivity", ScalarKind::Int),
        FieldDescriptor::new("lastActivity", ScalarKind::Int),
        FieldDescriptor::new("lastActivityTime", ScalarKind::Timestamp),
    ],
    columns: &[
        "id",
        "address",
        "alias",
        "type",
        "balance",
        "delegate",
        "firstActivity",
        "lastActivity",
        "lastActivityTime",
        "numTransactions",
    ],
    sort_fields: &["id", "balance", "firstActivity", "lastActivity"],
    default_sort: SortSpec::asc("id"),
    any_of_fields: &["address", "delegate"],
};

pub static ALL: &[&FilterSchema] = &[&TRANSACTIONS, &ACCOUNTS];

/// Look a schema up by resource name (`transactions`, `accounts`).
pub fn by_name(name: &str) -> Option<&'static FilterSchema> {
    ALL.iter().copied().find(|schema| schema.resource == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filterable_fields_map_to_columns() {
        for schema in ALL {
            for field in schema.fields {
                let columns = if field.is_virtual() {
                    field.covers
                } else {
                    std::slice::from_ref(&field.name)
                };
                for column in columns {
                    assert!(
                        schema.has_column(column).is_some(),
                        "{}.{column}",
                        schema.resource
                    );
                }
            }
            for sort in schema.sort_fields {
                assert!(schema.field(sort).is_some(), "{}.{sort}", schema.resource);
            }
        }
    }

    #[test]
    fn partners_are_fields_of_the_same_kind() {
        for schema in ALL {
            for field in schema.fields {
                for partner in field.partners {
                    let other = schema.field(partner).expect("partner exists");
                    assert_eq!(other.kind, field.kind);
                }
            }
        }
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(by_name("accounts").map(|s| s.path), Some("/v1/accounts"));
        assert!(by_name("blocks").is_none());
    }
}
