//! Unified error hierarchy.
//!
//! Each layer owns its own error enum, and [`ShardVecError`] composes them
//! behind `#[error(transparent)]` for callers that cross layer boundaries
//! (the Partition Manager, mainly).
//!
//! # Error taxonomy
//!
//! - Invariant violations (bad on-disk version, partition id/dir mismatch,
//!   cluster dimension drift) are fatal and propagate.
//! - Not-found conditions return `None`/`false`, never an error variant.
//! - Capacity exhaustion, I/O failure, and closed-database calls propagate.
//! - Concurrent-save contention is not an error: the in-flight handle is
//!   returned to the caller instead.
//! - Corrupt entries are skipped with a `log::warn!`, not surfaced here.

use thiserror::Error;

/// Errors from the base Vector Store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The on-disk `version` field did not match the format this build
    /// understands.
    #[error("unsupported on-disk version: expected 1, got {0}")]
    UnsupportedVersion(u32),

    /// Filesystem I/O failure during save/load.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `serde_json` (de)serialization failure for `meta.json`.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The store has been closed; no further mutation is permitted.
    #[error("store is closed")]
    Closed,

    /// `vec.bin` failed its CRC32 integrity check.
    #[error("vec.bin checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Checksum recorded in `meta.json`.
        expected: u32,
        /// Checksum recomputed from `vec.bin` at load.
        actual: u32,
    },
}

/// Errors from the Clustered Store.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// An operation on the underlying Vector Store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A cluster's members had inconsistent dimensions during recomputation.
    #[error("dimension drift inside cluster {0}: centroid recomputation aborted for affected members")]
    DimensionDrift(u32),

    /// `cluster.json`'s `version` field did not match the format this
    /// build understands.
    #[error("unsupported on-disk version: expected 1, got {0}")]
    UnsupportedVersion(u32),
}

/// Errors from the HNSW Index.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The query or inserted vector's dimension did not match the index
    /// configuration (non-dimension-aware mode only).
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension actually supplied.
        actual: usize,
    },

    /// I/O failure persisting or loading `hnsw_index.json`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `serde_json` (de)serialization failure for `hnsw_index.json`.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// On-disk index `version` field was not 1.
    #[error("unsupported on-disk version: expected 1, got {0}")]
    UnsupportedVersion(u32),
}

/// Errors from the Partition Manager.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// No partition exists with the given id.
    #[error("unknown partition id: {0}")]
    UnknownPartition(String),

    /// A partition id did not match `[A-Za-z0-9._-]+`, or its
    /// `dbDirName`/directory name disagreed with `id`.
    #[error("invalid partition id: {0}")]
    InvalidId(String),

    /// The active partition is full and `autoCreatePartitions` is disabled.
    #[error("capacity exhausted on partition {partition}: {current}/{capacity}")]
    CapacityExhausted {
        /// The partition that is full.
        partition: String,
        /// Current vector count.
        current: u64,
        /// Configured capacity.
        capacity: u64,
    },

    /// An operation on a resident Clustered Store failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// An operation on a resident HNSW index failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Filesystem I/O failure (directory scan, config read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `serde_json` (de)serialization failure for `<id>.config.json`.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The manager has been closed; no further mutation is permitted.
    #[error("database is closed")]
    Closed,
}

/// Top-level crate error, composing every component error.
#[derive(Debug, Error)]
pub enum ShardVecError {
    /// Vector Store error.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Clustered Store error.
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    /// HNSW Index error.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Partition Manager error.
    #[error(transparent)]
    Partition(#[from] PartitionError),
}

impl From<crate::persist::PersistError> for StoreError {
    fn from(e: crate::persist::PersistError) -> Self {
        match e {
            crate::persist::PersistError::Io(e) => StoreError::Io(e),
            crate::persist::PersistError::Serde(e) => StoreError::Serde(e),
        }
    }
}

impl From<crate::persist::PersistError> for ClusterError {
    fn from(e: crate::persist::PersistError) -> Self {
        ClusterError::Store(e.into())
    }
}

impl From<crate::persist::PersistError> for GraphError {
    fn from(e: crate::persist::PersistError) -> Self {
        match e {
            crate::persist::PersistError::Io(e) => GraphError::Io(e),
            crate::persist::PersistError::Serde(e) => GraphError::Serde(e),
        }
    }
}

impl From<crate::persist::PersistError> for PartitionError {
    fn from(e: crate::persist::PersistError) -> Self {
        match e {
            crate::persist::PersistError::Io(e) => PartitionError::Io(e),
            crate::persist::PersistError::Serde(e) => PartitionError::Serde(e),
        }
    }
}

/// Per-item outcome of a best-effort batch insert: fatal errors abort the
/// whole batch, everything else is reported per item and the batch
/// continues.
#[derive(Debug, Error)]
pub enum BatchItemError {
    /// Per-vector insertion failure (e.g. centroid recomputation issue).
    #[error("vector {index} failed: {source}")]
    Failed {
        /// Index of the failing item within the batch.
        index: usize,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
}
