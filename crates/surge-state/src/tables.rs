//! redb table definitions for the Surge state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Raw metric samples keyed by `{metric}:{timestamp_ms:020}`.
pub const SAMPLES: TableDefinition<&str, &[u8]> = TableDefinition::new("samples");

/// TTL cache entries keyed by an arbitrary cache key (e.g. `forecast:{metric}`).
pub const CACHE: TableDefinition<&str, &[u8]> = TableDefinition::new("cache");

/// Scaling policies keyed by policy ID.
pub const POLICIES: TableDefinition<&str, &[u8]> = TableDefinition::new("policies");

/// Store-level flags keyed by name (e.g. `policies_seeded`).
pub const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
