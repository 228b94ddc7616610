//! Destination table schema model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Inferred scalar type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    String,
    Timestamp,
}

impl ColumnType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Timestamp => "timestamp",
        }
    }

    /// Whether a column of this type can hold values inferred as `incoming`
    /// without losing information.
    ///
    /// Widening only: floats hold integers, integers hold 0/1 booleans,
    /// strings hold anything.
    #[must_use]
    pub fn accepts(self, incoming: ColumnType) -> bool {
        match (self, incoming) {
            (a, b) if a == b => true,
            (Self::String, _) => true,
            (Self::Float, Self::Integer) => true,
            (Self::Integer, Self::Boolean) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name, type, and nullability of one destination column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl ColumnDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable,
        }
    }
}

/// Ordered column descriptors derived from a cleaned dataset.
///
/// `rows_observed` is the number of records the types were inferred from.
/// Zero means the types carry no evidence (every column defaulted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnDescriptor>,
    pub rows_observed: usize,
}

impl TableSchema {
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[must_use]
    pub fn has_type_evidence(&self) -> bool {
        self.rows_observed > 0
    }
}

/// Warehouse table identity within the connected database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    #[must_use]
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_is_reflexive() {
        for t in [
            ColumnType::Integer,
            ColumnType::Float,
            ColumnType::Boolean,
            ColumnType::String,
            ColumnType::Timestamp,
        ] {
            assert!(t.accepts(t));
        }
    }

    #[test]
    fn accepts_widens_only() {
        assert!(ColumnType::Float.accepts(ColumnType::Integer));
        assert!(!ColumnType::Integer.accepts(ColumnType::Float));
        assert!(ColumnType::Integer.accepts(ColumnType::Boolean));
        assert!(!ColumnType::Boolean.accepts(ColumnType::Integer));
        assert!(ColumnType::String.accepts(ColumnType::Timestamp));
        assert!(!ColumnType::Timestamp.accepts(ColumnType::String));
    }

    #[test]
    fn column_type_serde_is_snake_case() {
        let json = serde_json::to_string(&ColumnType::Timestamp).unwrap();
        assert_eq!(json, "\"timestamp\"");
    }

    #[test]
    fn table_name_display() {
        assert_eq!(TableName::new("public", "heart").to_string(), "public.heart");
    }

    #[test]
    fn schema_lookup_by_name() {
        let schema = TableSchema {
            columns: vec![
                ColumnDescriptor::new("id", ColumnType::Integer, false),
                ColumnDescriptor::new("name", ColumnType::String, true),
            ],
            rows_observed: 3,
        };
        assert_eq!(schema.column("name").unwrap().column_type, ColumnType::String);
        assert!(schema.column("missing").is_none());
        assert_eq!(schema.column_names(), vec!["id", "name"]);
        assert!(schema.has_type_evidence());
    }
}
