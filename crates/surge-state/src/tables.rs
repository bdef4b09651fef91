//! redb table definitions for the Surge state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use redb::TableDefinition;

/// Workloads keyed by `{namespace}/{name}`.
pub const WORKLOADS: TableDefinition<&str, &[u8]> = TableDefinition::new("workloads");

/// Utilization samples keyed by `{workload_key}:{observed_at_ms:020}`.
pub const SAMPLES: TableDefinition<&str, &[u8]> = TableDefinition::new("samples");

/// Scaling decisions keyed by `{workload_key}:{recorded_at_ms:020}:{seq:010}`.
pub const DECISIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("decisions");
