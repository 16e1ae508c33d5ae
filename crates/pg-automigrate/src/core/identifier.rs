//! Identifier validation and quoting for generated DDL.
//!
//! SQL identifiers (table names, column names, schema names) cannot be passed as
//! parameters, so every name interpolated into a statement goes through
//! [`quote_pg`] or [`qualify_pg`]. Names are validated first (empty, null byte,
//! over-length) and then double-quoted with embedded quotes doubled.

use crate::error::{AutomigrateError, Result};
use sha2::{Digest, Sha256};

/// PostgreSQL NAMEDATALEN - 1. Longer names are silently truncated by the
/// server, which would break name-based constraint bookkeeping.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validate an identifier.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes
/// - Identifiers exceeding 63 bytes
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AutomigrateError::InvalidIdentifier(
            "identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(AutomigrateError::InvalidIdentifier(format!(
            "identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(AutomigrateError::InvalidIdentifier(format!(
            "identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// ```ignore
/// assert_eq!(quote_pg("users")?, "\"users\"");
/// assert_eq!(quote_pg("table\"name")?, "\"table\"\"name\"");
/// ```
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Qualify a PostgreSQL table name with schema: `"schema"."table"`.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Bytes kept from an over-long constraint name before the hash suffix.
const HASHED_PREFIX_LENGTH: usize = 54;

/// Deterministic foreign key constraint name: `fk_<table>_<column>_<target>`.
///
/// Names over 63 bytes keep a 54-byte prefix and get `_` plus 8 hex digits of
/// the SHA-256 of `table.column->target`, so distinct references never share
/// a name after truncation.
pub fn constraint_name(table: &str, column: &str, target: &str) -> String {
    let full = format!("fk_{}_{}_{}", table, column, target);
    if full.len() <= MAX_IDENTIFIER_LENGTH {
        return full;
    }

    let digest = Sha256::digest(format!("{}.{}->{}", table, column, target).as_bytes());
    let mut end = HASHED_PREFIX_LENGTH;
    while !full.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}_{}", &full[..end], hex::encode(&digest[..4]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("my_table").is_ok());
        assert!(validate_identifier("column with spaces").is_ok());
        assert!(validate_identifier("日本語").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        let result = validate_identifier("");
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let result = validate_identifier("table\0name");
        assert!(result.unwrap_err().to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_length_limit() {
        let max_name = "a".repeat(MAX_IDENTIFIER_LENGTH);
        assert!(validate_identifier(&max_name).is_ok());

        let long_name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        let result = validate_identifier(&long_name);
        assert!(result.unwrap_err().to_string().contains("maximum length"));
    }

    #[test]
    fn test_quote_pg_escapes_double_quote() {
        assert_eq!(quote_pg("users").unwrap(), "\"users\"");
        assert_eq!(quote_pg("table\"name").unwrap(), "\"table\"\"name\"");
    }

    #[test]
    fn test_quote_pg_sql_injection_safely_quoted() {
        let result = quote_pg("Robert'); DROP TABLE Students;--");
        assert_eq!(result.unwrap(), "\"Robert'); DROP TABLE Students;--\"");
    }

    #[test]
    fn test_qualify_pg() {
        assert_eq!(qualify_pg("public", "pet").unwrap(), "\"public\".\"pet\"");
        assert!(qualify_pg("", "pet").is_err());
    }

    #[test]
    fn test_constraint_name() {
        assert_eq!(constraint_name("pet", "owner", "user"), "fk_pet_owner_user");

        let long = constraint_name(&"t".repeat(40), &"c".repeat(40), "user");
        assert_eq!(long.len(), MAX_IDENTIFIER_LENGTH);
        assert!(long.starts_with("fk_tttt"));
        assert_eq!(long, constraint_name(&"t".repeat(40), &"c".repeat(40), "user"));
    }

    #[test]
    fn test_long_names_sharing_a_prefix_stay_distinct() {
        let table = "shipment_consignment_record";
        let a = constraint_name(table, "originating_warehouse_location_ref_a", "warehouse");
        let b = constraint_name(table, "originating_warehouse_location_ref_b", "depot");
        assert_ne!(a, b);
        assert!(a.len() <= MAX_IDENTIFIER_LENGTH);
        assert!(b.len() <= MAX_IDENTIFIER_LENGTH);
        assert!(validate_identifier(&a).is_ok());
    }

    #[test]
    fn test_hashed_name_respects_char_boundary() {
        let name = constraint_name(&"é".repeat(30), "owner", "user");
        assert!(name.len() <= MAX_IDENTIFIER_LENGTH);
        assert!(name.starts_with("fk_é"));
    }
}
