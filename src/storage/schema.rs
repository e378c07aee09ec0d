//! Database schema definitions and the schema hash guard

use sha3::{Digest, Sha3_512};

/// Schema shipped with the crate; used when no schema file is configured
pub const BUNDLED_SCHEMA: &str = include_str!("../../schema/registry.sql");

/// Key of the stored schema hash in the `property` table
pub const SCHEMA_HASH_PROPERTY: &str = "schema_hash";

pub const SELECT_PROPERTY_TABLE: &str = "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'property'";

pub const SELECT_SCHEMA_HASH: &str = "SELECT value FROM property WHERE name = :name";

pub const INSERT_SCHEMA_HASH: &str = "INSERT INTO property (name, value) VALUES (:name, :value)";

/// Pragmas applied on every connection after the schema check
pub const CONNECTION_PRAGMAS: &str = r#"
PRAGMA foreign_keys = ON;
PRAGMA synchronous = FULL;
"#;

/// Lowercase hex SHA3-512 of the schema text
pub fn schema_hash(schema: &str) -> String {
    hex::encode(Sha3_512::digest(schema.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_hash_is_sha3_512_hex() {
        let hash = schema_hash("");
        assert_eq!(hash.len(), 128);
        assert!(hash.starts_with("a69f73cca23a9ac5c8b567dc185a756e97c982164fe25859e0d1dcc1475c80a6"));
        assert_eq!(hash, hash.to_lowercase());
    }

    #[test]
    fn test_schema_hash_changes_with_schema() {
        assert_ne!(schema_hash(BUNDLED_SCHEMA), schema_hash(&format!("{BUNDLED_SCHEMA}\n")));
    }
}
