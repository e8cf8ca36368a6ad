//! An embedded, file-backed approximate nearest-neighbor vector database.
//!
//! Four layered components, each building on the one below:
//!
//! - [`store`] — the base Vector Store: an `id -> vector`/`id -> metadata`
//!   map with linear-scan search and a two-file on-disk layout.
//! - [`cluster`] — the Clustered Store: wraps a Vector Store with dynamic
//!   centroid-based clustering, pruning search to the nearest clusters
//!   instead of scanning every vector.
//! - [`hnsw`] — a per-store HNSW graph for sub-linear approximate search,
//!   layered on top of any [`hnsw::VectorSource`].
//! - [`partition`] — the Partition Manager: shards a large vector
//!   population across many on-disk Clustered Stores, keeps a bounded LRU
//!   set resident, and coordinates a parallel HNSW index per partition.
//!
//! ```no_run
//! use shardvec::config::ManagerConfig;
//! use shardvec::partition::PartitionManager;
//!
//! # fn main() -> Result<(), shardvec::error::PartitionError> {
//! let mut db = PartitionManager::new(ManagerConfig::new("./db"));
//! db.initialize()?;
//! let (_partition, id) = db.add_vector(None, vec![0.1, 0.2, 0.3], None)?;
//! let hits = db.find_nearest(&[0.1, 0.2, 0.3], 5, &Default::default());
//! assert!(hits.iter().any(|(_, hit_id, _)| *hit_id == id));
//! db.close()?;
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod cluster;
pub mod config;
pub mod error;
pub mod events;
pub mod hnsw;
pub mod id;
pub mod metadata;
pub mod metric;
pub mod partition;
mod persist;
pub mod store;

pub use cluster::ClusteredStore;
pub use config::{ClusterOptions, HnswOptions, ManagerConfig};
pub use error::ShardVecError;
pub use events::{DbEvent, EventEmitter};
pub use hnsw::HnswIndex;
pub use id::VectorId;
pub use metadata::{Metadata, MetadataValue};
pub use metric::DistanceMetric;
pub use partition::PartitionManager;
pub use store::VectorStore;

/// Crate version, as recorded in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns [`VERSION`].
#[must_use]
pub fn version() -> &'static str {
    VERSION
}
