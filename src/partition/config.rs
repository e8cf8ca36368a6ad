//! On-disk partition configuration (`<id>.config.json`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Record describing one partition. Persisted as `<id>.config.json` inside
/// the partition's own directory; `id == dbDirName == <directory name>` is
/// validated at scan time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionConfig {
    /// Partition identifier; must match `[A-Za-z0-9._-]+`.
    pub id: String,
    /// Subdirectory name under `partitionsDir`; always equal to `id`.
    pub db_dir_name: String,
    /// Human-readable label.
    pub name: String,
    /// `true` for the single partition currently receiving writes.
    pub active: bool,
    /// Number of vectors this partition holds, per the last save/mutation.
    pub vector_count: u64,
    /// Per-partition override of the global `clusterSize` knob.
    pub cluster_size: Option<u32>,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Opaque caller-supplied properties, round-tripped verbatim.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// On-disk format version; fatal if not 1 at load time.
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    crate::persist::FORMAT_VERSION
}

/// `true` if `id` matches `[A-Za-z0-9._-]+` and is non-empty.
#[must_use]
pub fn is_valid_partition_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

impl PartitionConfig {
    /// Builds a new, inactive config with zero vectors and no overrides.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            db_dir_name: id.clone(),
            id,
            name: name.into(),
            active: false,
            vector_count: 0,
            cluster_size: None,
            description: String::new(),
            properties: BTreeMap::new(),
            version: crate::persist::FORMAT_VERSION,
        }
    }

    /// `true` if `id`/`db_dir_name` agree with each other and with the
    /// directory this config was read from.
    #[must_use]
    pub fn matches_directory(&self, dir_name: &str) -> bool {
        is_valid_partition_id(&self.id) && self.id == self.db_dir_name && self.id == dir_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ids() {
        assert!(is_valid_partition_id("p-1700000000000"));
        assert!(is_valid_partition_id("a.b_c-D9"));
        assert!(!is_valid_partition_id(""));
        assert!(!is_valid_partition_id("has space"));
        assert!(!is_valid_partition_id("slash/es"));
    }

    #[test]
    fn new_config_matches_its_own_directory() {
        let cfg = PartitionConfig::new("p-1", "first");
        assert!(cfg.matches_directory("p-1"));
        assert!(!cfg.matches_directory("p-2"));
    }
}
