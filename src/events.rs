//! Synchronous event emission.
//!
//! Subscribers register typed handlers; emission is synchronous within the
//! core and never fails the caller on a subscriber error (wrap and log). A
//! plain `RwLock<Vec<Subscriber>>` is enough for that contract — there is
//! no cross-thread handoff to justify a channel crate here.

use crate::cluster::ClusterKey;
use crate::id::VectorId;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::RwLock;

/// One of the stable event names emitted by the core.
#[derive(Clone, Debug)]
pub enum DbEvent {
    /// The Partition Manager finished initialization.
    DbInitialized,
    /// `save()` completed; counts are (configs, stores, indices) saved.
    DbSaved {
        /// Number of partition configs written.
        configs: usize,
        /// Number of Clustered Stores written.
        stores: usize,
        /// Number of HNSW indices written.
        indices: usize,
    },
    /// A partition (and optionally its HNSW index) finished loading.
    DbLoaded,
    /// `close()` completed.
    DbClose,
    /// A vector was added.
    VectorAdd {
        /// Partition the vector landed in.
        partition_id: String,
        /// Assigned id.
        id: VectorId,
    },
    /// A bulk-add completed.
    VectorsBulkAdd {
        /// Partitions touched by the batch.
        partitions: Vec<String>,
        /// Number of vectors actually inserted.
        inserted: usize,
    },
    /// A vector was deleted.
    VectorDelete {
        /// Partition the vector was removed from.
        partition_id: String,
        /// Removed id.
        id: VectorId,
    },
    /// A vector was replaced via `updateVector`.
    VectorUpdate {
        /// Partition containing the vector.
        partition_id: String,
        /// Updated id.
        id: VectorId,
    },
    /// Metadata was attached to a vector for the first time.
    MetadataAdd {
        /// Partition containing the vector.
        partition_id: String,
        /// Vector the metadata is attached to.
        id: VectorId,
    },
    /// Existing metadata was patched.
    MetadataUpdate {
        /// Partition containing the vector.
        partition_id: String,
        /// Vector the metadata belongs to.
        id: VectorId,
    },
    /// A partition's Clustered Store was loaded into the LRU cache.
    PartitionLoaded {
        /// Partition id.
        id: String,
    },
    /// A partition was evicted from the LRU cache.
    PartitionUnloaded {
        /// Partition id.
        id: String,
    },
    /// A new partition was created on disk.
    PartitionCreated {
        /// Partition id.
        id: String,
    },
    /// A partition became the active partition.
    PartitionActivated {
        /// Partition id.
        id: String,
    },
    /// A partition's HNSW index finished loading.
    PartitionIndexLoaded {
        /// Partition id.
        id: String,
    },
    /// A partition's HNSW index was saved.
    PartitionIndexSaved {
        /// Partition id.
        id: String,
    },
    /// Progress update during `buildIndexHNSW`.
    PartitionIndexProgress {
        /// Partition id.
        id: String,
        /// Vectors indexed so far.
        done: usize,
        /// Total vectors to index.
        total: usize,
    },
    /// A partition's HNSW index finished building.
    PartitionIndexed {
        /// Partition id.
        id: String,
    },
    /// A per-partition operation failed without aborting the enclosing
    /// batch.
    PartitionError {
        /// Partition id.
        id: String,
        /// Name of the operation that failed.
        operation: String,
        /// Human-readable error description.
        error: String,
    },
    /// `runKMeans` started.
    KmeansStart {
        /// Partition id.
        partition_id: String,
    },
    /// `runKMeans` completed successfully.
    KmeansComplete {
        /// Partition id.
        partition_id: String,
        /// Number of clusters after convergence.
        clusters: usize,
    },
    /// `runKMeans` failed.
    KmeansError {
        /// Partition id.
        partition_id: String,
        /// Human-readable error description.
        error: String,
    },
    /// A new cluster was opened.
    ClusterCreate {
        /// Partition id.
        partition_id: String,
        /// Newly allocated cluster key.
        key: ClusterKey,
    },
    /// A cluster was emptied and removed.
    ClusterDelete {
        /// Partition id.
        partition_id: String,
        /// Removed cluster key.
        key: ClusterKey,
    },
}

type Subscriber = Box<dyn Fn(&DbEvent) + Send + Sync>;

/// A synchronous, in-process observer registry.
///
/// Emission walks subscribers in registration order. A subscriber that
/// panics is caught, logged, and does not prevent later subscribers from
/// running or propagate to the emitting call.
#[derive(Default)]
pub struct EventEmitter {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventEmitter {
    /// Creates an emitter with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Registers a handler. Handlers are never unregistered individually —
    /// hosts that need unsubscription compose their own handle (e.g. an
    /// `Arc<AtomicBool>` flag checked inside the closure).
    pub fn subscribe(&self, handler: impl Fn(&DbEvent) + Send + Sync + 'static) {
        self.subscribers
            .write()
            .expect("event subscriber lock poisoned")
            .push(Box::new(handler));
    }

    /// Emits an event synchronously to every subscriber.
    pub fn emit(&self, event: DbEvent) {
        let subscribers = self
            .subscribers
            .read()
            .expect("event subscriber lock poisoned");
        for handler in subscribers.iter() {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(&event)));
            if outcome.is_err() {
                log::warn!("event subscriber panicked while handling an event; ignoring");
            }
        }
    }

    /// Number of registered subscribers (diagnostic use).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .expect("event subscriber lock poisoned")
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn emits_to_all_subscribers_in_order() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        let c2 = count.clone();
        emitter.subscribe(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        emitter.subscribe(move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        });
        emitter.emit(DbEvent::DbInitialized);
        assert_eq!(count.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn panicking_subscriber_does_not_stop_others() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        emitter.subscribe(|_| panic!("boom"));
        emitter.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        emitter.emit(DbEvent::DbClose);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
