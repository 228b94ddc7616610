//! Column type <-> warehouse SQL type mapping helpers.

use lakeload_types::schema::ColumnType;

/// DDL type used when creating a column of `column_type`.
#[must_use]
pub fn ddl_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Integer => "BIGINT",
        ColumnType::Float => "DOUBLE PRECISION",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::String => "TEXT",
        ColumnType::Timestamp => "TIMESTAMP",
    }
}

/// Map an `information_schema.columns.data_type` value to its type family.
///
/// Returns `None` for types this loader cannot write into.
#[must_use]
pub fn column_type_for(info_schema_type: &str) -> Option<ColumnType> {
    let lower = info_schema_type.trim().to_lowercase();
    // Strip modifiers such as `numeric(10,2)` or `varchar(256)`.
    let base = lower.split('(').next().unwrap_or_default().trim();

    let family = match base {
        "smallint" | "int2" | "integer" | "int" | "int4" | "bigint" | "int8" => {
            ColumnType::Integer
        }
        "real" | "float4" | "double precision" | "float8" | "float" | "numeric" | "decimal" => {
            ColumnType::Float
        }
        "boolean" | "bool" => ColumnType::Boolean,
        "text" | "character varying" | "varchar" | "character" | "char" | "bpchar"
        | "nvarchar" | "nchar" => ColumnType::String,
        "timestamp without time zone"
        | "timestamp"
        | "timestamp with time zone"
        | "timestamptz" => ColumnType::Timestamp,
        _ => return None,
    };
    Some(family)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_types_map_back_to_their_family() {
        for t in [
            ColumnType::Integer,
            ColumnType::Float,
            ColumnType::Boolean,
            ColumnType::String,
            ColumnType::Timestamp,
        ] {
            assert_eq!(column_type_for(ddl_type(t)), Some(t));
        }
    }

    #[test]
    fn info_schema_aliases_normalize() {
        assert_eq!(column_type_for("integer"), Some(ColumnType::Integer));
        assert_eq!(column_type_for("character varying"), Some(ColumnType::String));
        assert_eq!(column_type_for("numeric(10,2)"), Some(ColumnType::Float));
        assert_eq!(
            column_type_for("timestamp with time zone"),
            Some(ColumnType::Timestamp)
        );
        assert_eq!(column_type_for("jsonb"), None);
        assert_eq!(column_type_for("USER-DEFINED"), None);
    }
}
