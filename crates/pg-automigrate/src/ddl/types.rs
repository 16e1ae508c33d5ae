//! Column type resolution.

use crate::core::schema::{AttributeSpec, ColumnType};
use crate::error::{AutomigrateError, Result};

/// Numeric types PostgreSQL cannot auto-increment.
const NON_SERIAL_NUMERIC: &[&str] = &[
    "SMALLINT",
    "INTEGER",
    "BIGINT",
    "DECIMAL",
    "NUMERIC",
    "REAL",
    "DOUBLE PRECISION",
];

/// Resolve the SQL type of a column.
///
/// Default column types map onto fixed PostgreSQL types, switching to the
/// SERIAL variants for auto-increment numerics. Custom types pass through,
/// except that an auto-increment column may not use a plain numeric type.
pub fn resolve_sql_type(table: &str, column: &str, spec: &AttributeSpec) -> Result<String> {
    let serial = spec.auto_increment;
    let resolved: &str = match &spec.column_type {
        ColumnType::Number if serial => "SERIAL",
        ColumnType::Number => "REAL",
        ColumnType::NumberKey if serial => "SERIAL",
        ColumnType::NumberKey => "INTEGER",
        ColumnType::NumberTimestamp if serial => "BIGSERIAL",
        ColumnType::NumberTimestamp => "BIGINT",
        ColumnType::String | ColumnType::Ref => "TEXT",
        ColumnType::StringKey | ColumnType::StringTimestamp => "VARCHAR",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::Json => "JSON",
        ColumnType::Custom(custom) => {
            if serial && is_non_serial_numeric(custom) {
                return Err(AutomigrateError::IncompatibleAutoIncrementType {
                    table: table.to_string(),
                    column: column.to_string(),
                    column_type: custom.clone(),
                });
            }
            custom
        }
    };
    Ok(resolved.to_string())
}

fn is_non_serial_numeric(column_type: &str) -> bool {
    let normalized = column_type
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase();
    NON_SERIAL_NUMERIC.contains(&normalized.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(column_type: ColumnType, auto_increment: bool) -> AttributeSpec {
        let mut spec = AttributeSpec::new(column_type);
        spec.auto_increment = auto_increment;
        spec
    }

    #[test]
    fn test_default_types() {
        let cases = [
            (ColumnType::Number, false, "REAL"),
            (ColumnType::Number, true, "SERIAL"),
            (ColumnType::NumberKey, false, "INTEGER"),
            (ColumnType::NumberKey, true, "SERIAL"),
            (ColumnType::NumberTimestamp, false, "BIGINT"),
            (ColumnType::NumberTimestamp, true, "BIGSERIAL"),
            (ColumnType::String, false, "TEXT"),
            (ColumnType::StringKey, false, "VARCHAR"),
            (ColumnType::StringTimestamp, false, "VARCHAR"),
            (ColumnType::Boolean, false, "BOOLEAN"),
            (ColumnType::Json, false, "JSON"),
            (ColumnType::Ref, false, "TEXT"),
        ];
        for (column_type, serial, expected) in cases {
            let resolved = resolve_sql_type("t", "c", &spec(column_type, serial)).unwrap();
            assert_eq!(resolved, expected);
        }
    }

    #[test]
    fn test_custom_passthrough() {
        let resolved = resolve_sql_type(
            "t",
            "c",
            &spec(ColumnType::Custom("UUID DEFAULT gen_random_uuid()".into()), true),
        )
        .unwrap();
        assert_eq!(resolved, "UUID DEFAULT gen_random_uuid()");

        let resolved =
            resolve_sql_type("t", "c", &spec(ColumnType::Custom("bigserial".into()), true)).unwrap();
        assert_eq!(resolved, "bigserial");
    }

    #[test]
    fn test_incompatible_auto_increment() {
        for custom in ["integer", "BIGINT", "double   precision", "Numeric"] {
            let err = resolve_sql_type("t", "c", &spec(ColumnType::Custom(custom.into()), true))
                .unwrap_err();
            assert!(matches!(
                err,
                AutomigrateError::IncompatibleAutoIncrementType { .. }
            ));
        }
        assert!(resolve_sql_type("t", "c", &spec(ColumnType::Custom("integer".into()), false)).is_ok());
    }
}
