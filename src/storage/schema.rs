//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Changes table schema: one row per key.
#[derive(Iden)]
pub enum Changes {
    Table,
    #[iden = "key"]
    Key,
    #[iden = "value"]
    Value,
}

/// SQL for creating the changes table.
///
/// BLOB keys compare with memcmp, which is the byte order the feed relies on.
pub const CREATE_CHANGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS changes (
    key BLOB NOT NULL PRIMARY KEY,
    value BLOB NOT NULL
);
"#;
