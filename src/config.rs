//! Configuration surface recognized by the core.
//!
//! Plain `serde`-derived structs with `Default` impls — no config-file or
//! env parsing crate is pulled in, since that translation layer is a host
//! concern, not a core one.

use crate::metric::DistanceMetric;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Clustering knobs passed to every Clustered Store opened by the manager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOptions {
    /// Target number of members per cluster before a new one is preferred.
    pub cluster_size: u32,
    /// Multiplier on `cluster_size` past which a full cluster opens a
    /// sibling rather than accepting more members.
    pub new_cluster_threshold_factor: f32,
    /// Distance past which a vector opens a new cluster even if its nearest
    /// centroid has room.
    pub new_cluster_distance_threshold: f32,
    /// Hard ceiling on the number of simultaneous clusters in one store.
    pub max_clusters: u32,
    /// Distance kernel used for centroid ranking and exact rescan.
    pub distance_metric: DistanceMetric,
    /// Iteration ceiling for `runKMeans`.
    pub kmeans_max_iterations: u32,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            cluster_size: 100,
            new_cluster_threshold_factor: 1.5,
            new_cluster_distance_threshold: 0.5,
            max_clusters: 1000,
            distance_metric: DistanceMetric::default(),
            kmeans_max_iterations: 100,
        }
    }
}

/// Top-level configuration for a [`crate::partition::PartitionManager`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerConfig {
    /// Directory containing one subdirectory per partition.
    pub partitions_dir: PathBuf,
    /// Vector capacity of a single partition before rollover.
    pub partition_capacity: u64,
    /// Maximum number of Clustered Stores held resident at once.
    pub max_active_partitions: usize,
    /// Create a fresh partition automatically when capacity is exhausted.
    pub auto_create_partitions: bool,
    /// Load the active partition's Clustered Store during initialization.
    pub auto_load_partitions: bool,
    /// Load the active partition's HNSW index during initialization
    /// (only consulted when `auto_load_partitions` is also set).
    pub auto_load_hnsw: bool,
    /// Run `runKMeans` once immediately after a partition is loaded.
    pub run_kmeans_on_load: bool,
    /// Suggested vector dimension, used only to pre-size buffers; vectors
    /// of a different dimension are still accepted (dimension-aware mode).
    pub vector_size: Option<u32>,
    /// Transparently gzip every on-disk JSON file when set.
    pub use_compression: bool,
    /// Clustering knobs applied to every partition.
    pub cluster_options: ClusterOptions,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            partitions_dir: PathBuf::from("partitions"),
            partition_capacity: 100_000,
            max_active_partitions: 3,
            auto_create_partitions: true,
            auto_load_partitions: true,
            auto_load_hnsw: true,
            run_kmeans_on_load: false,
            vector_size: None,
            use_compression: false,
            cluster_options: ClusterOptions::default(),
        }
    }
}

impl ManagerConfig {
    /// Builds a config rooted at the given partitions directory, otherwise
    /// matching every other documented default.
    #[must_use]
    pub fn new(partitions_dir: impl Into<PathBuf>) -> Self {
        Self {
            partitions_dir: partitions_dir.into(),
            ..Self::default()
        }
    }
}

/// Parameters for one [`crate::hnsw::HnswIndex`], independent of any one
/// partition's cluster options.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HnswOptions {
    /// Maximum connections per node at layers above 0.
    pub m: u16,
    /// Beam width used while inserting.
    pub ef_construction: usize,
    /// Default beam width used while searching, absent an explicit `ef`.
    pub ef_search: usize,
    /// Hard ceiling on the level a node may draw, regardless of the
    /// exponential distribution's result.
    pub max_level: u16,
    /// Track a distinct entry point per vector dimension instead of one
    /// global entry point.
    pub dimension_aware: bool,
}

impl Default for HnswOptions {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            max_level: 16,
            dimension_aware: false,
        }
    }
}
