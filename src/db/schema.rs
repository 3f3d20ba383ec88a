//! Canonical metadata types.
//!
//! Represents the structure of a database as a list of tables and views,
//! each with ordered, canonically typed columns. Adapters produce the raw
//! [`TableRef`] and [`RawColumn`] rows; the metadata extractor assembles
//! them into a [`MetadataSnapshot`].

use super::types::CanonicalType;
use super::Dialect;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a catalog entry is a base table or a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Table,
    View,
}

impl TableKind {
    /// Maps an `information_schema.tables.table_type` value.
    pub fn from_catalog(table_type: &str) -> Self {
        if table_type.to_uppercase().contains("VIEW") {
            Self::View
        } else {
            Self::Table
        }
    }
}

/// One row of an adapter's table listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
    pub kind: TableKind,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, kind: TableKind) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            kind,
        }
    }
}

/// One row of an adapter's column listing, before canonicalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawColumn {
    pub name: String,
    /// Declared native type (`udt_name` on Postgres, `COLUMN_TYPE` on MySQL).
    pub native_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
    /// Catalog ordinal; may have gaps where columns were dropped.
    pub ordinal_position: u32,
    pub is_primary_key: bool,
    /// Set when the catalog identifies a user-defined enumeration.
    pub is_enum: bool,
}

impl RawColumn {
    /// Creates a nullable, non-key column.
    pub fn new(name: impl Into<String>, native_type: impl Into<String>, ordinal: u32) -> Self {
        Self {
            name: name.into(),
            native_type: native_type.into(),
            is_nullable: true,
            default: None,
            ordinal_position: ordinal,
            is_primary_key: false,
            is_enum: false,
        }
    }

    /// Sets whether the column is nullable.
    pub fn nullable(self, nullable: bool) -> Self {
        Self {
            is_nullable: nullable,
            ..self
        }
    }

    /// Marks the column as part of the primary key.
    pub fn primary_key(self) -> Self {
        Self {
            is_primary_key: true,
            is_nullable: false,
            ..self
        }
    }

    /// Sets the default expression.
    pub fn with_default(self, default: impl Into<String>) -> Self {
        Self {
            default: Some(default.into()),
            ..self
        }
    }

    /// Marks the column as a user-defined enumeration.
    pub fn enumeration(self) -> Self {
        Self {
            is_enum: true,
            ..self
        }
    }
}

/// A column of a table or view with its canonical type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalColumn {
    pub name: String,
    pub native_type: String,
    pub canonical_type: CanonicalType,
    pub nullable: bool,
    pub default: Option<String>,
    /// 1-based position in declaration order.
    pub ordinal_position: u32,
    pub is_primary_key: bool,
}

impl CanonicalColumn {
    /// Canonicalizes a raw catalog row, assigning the given ordinal.
    pub fn from_raw(raw: RawColumn, dialect: Dialect, ordinal_position: u32) -> Self {
        let canonical_type = if raw.is_enum {
            CanonicalType::Enum
        } else {
            dialect.map_native_type(&raw.native_type)
        };
        Self {
            name: raw.name,
            native_type: raw.native_type,
            canonical_type,
            nullable: raw.is_nullable,
            default: raw.default,
            ordinal_position,
            is_primary_key: raw.is_primary_key,
        }
    }
}

/// A table or view with its ordered columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalTable {
    pub schema: String,
    pub name: String,
    pub kind: TableKind,
    pub columns: Vec<CanonicalColumn>,
    /// Catalog estimate; `None` when the dialect has no usable figure.
    pub row_count: Option<i64>,
}

impl CanonicalTable {
    /// Returns `schema.name`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Column names that form the primary key, in ordinal order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Returns true if ordinals run 1..=n in column order.
    pub fn has_contiguous_ordinals(&self) -> bool {
        self.columns
            .iter()
            .enumerate()
            .all(|(i, c)| c.ordinal_position as usize == i + 1)
    }
}

/// One complete capture of a connection's schema metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSnapshot {
    pub connection_name: String,
    pub dialect: Dialect,
    pub tables: Vec<CanonicalTable>,
    pub extracted_at: DateTime<Utc>,
}

impl MetadataSnapshot {
    /// Number of base tables.
    pub fn table_count(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| t.kind == TableKind::Table)
            .count()
    }

    /// Number of views.
    pub fn view_count(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| t.kind == TableKind::View)
            .count()
    }

    /// Looks up a table by schema and name.
    pub fn find_table(&self, schema: &str, name: &str) -> Option<&CanonicalTable> {
        self.tables
            .iter()
            .find(|t| t.schema == schema && t.name == name)
    }

    /// Formats the snapshot as schema context for a natural-language prompt.
    pub fn format_for_llm(&self) -> String {
        let tables_text = self
            .tables
            .iter()
            .map(Self::format_table_for_llm)
            .collect::<Vec<_>>()
            .join("");

        format!(
            "Database Schema ({}):\n\n{}",
            self.dialect.display_name(),
            tables_text
        )
    }

    fn format_table_for_llm(table: &CanonicalTable) -> String {
        let kind = match table.kind {
            TableKind::Table => "Table",
            TableKind::View => "View",
        };
        let rows = table
            .row_count
            .map(|n| format!(" (~{n} rows)"))
            .unwrap_or_default();
        let column_lines = table
            .columns
            .iter()
            .map(Self::format_column_for_llm)
            .collect::<Vec<_>>()
            .join("");

        format!("{kind}: {}{rows}\n{column_lines}\n", table.qualified_name())
    }

    fn format_column_for_llm(column: &CanonicalColumn) -> String {
        let annotations = [
            column.is_primary_key.then_some("PK".to_string()),
            (!column.nullable).then_some("NOT NULL".to_string()),
            column.default.as_ref().map(|d| format!("DEFAULT {d}")),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

        if annotations.is_empty() {
            format!("  - {}: {}\n", column.name, column.native_type)
        } else {
            format!(
                "  - {}: {} ({})\n",
                column.name,
                column.native_type,
                annotations.join(", ")
            )
        }
    }
}
