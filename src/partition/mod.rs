//! Partition Manager: shards the vector population across many on-disk
//! Clustered Stores, keeps a bounded LRU set resident, and coordinates a
//! parallel per-partition HNSW index.
//!
//! The resident-set cache lives in [`cache::ResidentCache`]; directory
//! scanning and the `<id>.config.json` versioned-header discipline follow
//! the same `version: 1`-fatal convention as [`crate::store::VectorStore`]
//! and [`crate::cluster::ClusteredStore`]'s own on-disk records.
//! Inter-partition search and save fan out in parallel via `rayon`.

mod cache;
pub mod config;

pub use cache::ResidentCache;
pub use config::{is_valid_partition_id, PartitionConfig};

use crate::cluster::{ClusterEvent, ClusteredStore};
use crate::config::ManagerConfig;
use crate::error::PartitionError;
use crate::events::{DbEvent, EventEmitter};
use crate::hnsw::HnswIndex;
use crate::id::VectorId;
use crate::metadata::{FilterFn, Metadata};
use crate::metric::DistanceMetric;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;

/// Options accepted by [`PartitionManager::find_nearest`] /
/// [`PartitionManager::find_nearest_hnsw`].
#[derive(Default)]
pub struct SearchOptions<'a> {
    /// Restrict the search to these partitions; `None` means every resident
    /// partition.
    pub partition_ids: Option<Vec<String>>,
    /// Candidate filter, applied before distance computation.
    pub filter: Option<&'a FilterFn<'a>>,
    /// Override the configured distance metric for this call.
    pub distance_metric: Option<DistanceMetric>,
    /// Override the HNSW beam width for this call (HNSW search only).
    pub ef: Option<usize>,
}

/// Options accepted by [`PartitionManager::create_partition`].
#[derive(Default)]
pub struct CreatePartitionOptions {
    /// Activate the new partition immediately after creation.
    pub set_active: bool,
    /// Per-partition override of the global cluster size.
    pub cluster_size: Option<u32>,
    /// Free-text description.
    pub description: String,
}

/// Progress callback invoked during [`PartitionManager::build_index_hnsw`]:
/// `(done, total)`.
pub type ProgressCallback<'a> = dyn FnMut(usize, usize) + 'a;

/// Snapshot of manager-wide counters, callable in every lifecycle state
/// including before `initialize()` and after `close()`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ManagerStats {
    /// Total partitions known (resident or not).
    pub partition_count: usize,
    /// Partitions currently resident in the LRU cache.
    pub resident_count: usize,
    /// Sum of every partition config's `vector_count`.
    pub total_configured_vectors: u64,
    /// The current active partition id, if any.
    pub active_partition_id: Option<String>,
}

/// Shards vectors across many on-disk Clustered Stores, bounding residency
/// with an LRU cache and coordinating a parallel HNSW index per partition.
pub struct PartitionManager {
    config: ManagerConfig,
    configs: HashMap<String, PartitionConfig>,
    cache: ResidentCache,
    indices: HashMap<String, HnswIndex>,
    active_partition_id: Option<String>,
    initialized: bool,
    closing: bool,
    closed: bool,
    config_save_pending: bool,
    events: EventEmitter,
}

impl PartitionManager {
    /// Builds an unintialized manager over `config`. Call [`initialize`]
    /// before issuing any other operation.
    ///
    /// [`initialize`]: PartitionManager::initialize
    #[must_use]
    pub fn new(config: ManagerConfig) -> Self {
        let cache = ResidentCache::new(config.max_active_partitions);
        Self {
            config,
            configs: HashMap::new(),
            cache,
            indices: HashMap::new(),
            active_partition_id: None,
            initialized: false,
            closing: false,
            closed: false,
            config_save_pending: false,
            events: EventEmitter::new(),
        }
    }

    /// Registers an event subscriber.
    pub fn subscribe(&self, handler: impl Fn(&DbEvent) + Send + Sync + 'static) {
        self.events.subscribe(handler);
    }

    /// Current manager-wide statistics. Callable before `initialize()` and
    /// after `close()` alike.
    #[must_use]
    pub fn get_stats(&self) -> ManagerStats {
        ManagerStats {
            partition_count: self.configs.len(),
            resident_count: self.cache.len(),
            total_configured_vectors: self.configs.values().map(|c| c.vector_count).sum(),
            active_partition_id: self.active_partition_id.clone(),
        }
    }

    fn partition_dir(&self, id: &str) -> PathBuf {
        self.config.partitions_dir.join(id)
    }

    fn config_path(&self, id: &str) -> PathBuf {
        self.partition_dir(id).join(format!("{id}.config.json"))
    }

    /// Scans `partitionsDir`, resolves the single active partition, creates
    /// a first partition if none exist and `autoCreatePartitions` is set,
    /// and optionally loads the active partition (and its HNSW index) into
    /// the resident cache.
    ///
    /// # Errors
    /// Propagates filesystem or serialization failures; per-partition scan
    /// failures are logged and that entry is dropped, not fatal.
    pub fn initialize(&mut self) -> Result<(), PartitionError> {
        self.scan_partitions()?;
        self.resolve_single_active()?;

        if self.configs.is_empty() && self.config.auto_create_partitions {
            let id = format!("p-{}", self.allocate_timestamp());
            self.create_partition_internal(&id, &id, CreatePartitionOptions {
                set_active: true,
                ..CreatePartitionOptions::default()
            })?;
        }

        if self.config.auto_load_partitions {
            if let Some(active) = self.active_partition_id.clone() {
                self.ensure_loaded(&active)?;
                if self.config.auto_load_hnsw {
                    self.ensure_hnsw_loaded(&active)?;
                }
                if self.config.run_kmeans_on_load {
                    if let Some(store) = self.cache.get_mut(&active) {
                        self.events.emit(DbEvent::KmeansStart {
                            partition_id: active.clone(),
                        });
                        store.run_kmeans(None, None);
                        self.events.emit(DbEvent::KmeansComplete {
                            partition_id: active.clone(),
                            clusters: store.cluster_count(),
                        });
                    }
                }
            }
        }

        self.initialized = true;
        self.events.emit(DbEvent::DbInitialized);
        Ok(())
    }

    /// A monotonic-enough timestamp for default partition ids (`p-<ts>`).
    fn allocate_timestamp(&self) -> u128 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
    }

    fn scan_partitions(&mut self) -> Result<(), PartitionError> {
        self.configs.clear();
        if !self.config.partitions_dir.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&self.config.partitions_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            let config_path = entry.path().join(format!("{dir_name}.config.json"));
            let loaded: Option<PartitionConfig> =
                crate::persist::read_json(&config_path, self.config.use_compression)?;
            match loaded {
                Some(cfg) if cfg.matches_directory(&dir_name) => {
                    self.configs.insert(cfg.id.clone(), cfg);
                }
                Some(cfg) => log::warn!(
                    "dropping partition config with id/directory mismatch: id={}, dir={dir_name}",
                    cfg.id
                ),
                None => log::warn!("partition directory {dir_name} has no readable config; skipped"),
            }
        }
        Ok(())
    }

    /// If two or more configs claim `active`, keeps the first (by id) and
    /// schedules a resave for the rest.
    fn resolve_single_active(&mut self) -> Result<(), PartitionError> {
        let mut active_ids: Vec<String> = self
            .configs
            .values()
            .filter(|c| c.active)
            .map(|c| c.id.clone())
            .collect();
        active_ids.sort();

        if active_ids.len() > 1 {
            for id in active_ids.iter().skip(1) {
                if let Some(cfg) = self.configs.get_mut(id) {
                    cfg.active = false;
                }
            }
            self.config_save_pending = true;
        }
        self.active_partition_id = active_ids.into_iter().next();
        Ok(())
    }

    /// Creates a new partition directory, config, empty store, and empty
    /// HNSW index file, then loads it and optionally activates it.
    ///
    /// # Errors
    /// Returns [`PartitionError::InvalidId`] if `id` doesn't match the
    /// required syntax, or propagates I/O errors.
    pub fn create_partition(
        &mut self,
        id: &str,
        name: &str,
        options: CreatePartitionOptions,
    ) -> Result<(), PartitionError> {
        if self.closed || self.closing {
            return Err(PartitionError::Closed);
        }
        self.create_partition_internal(id, name, options)
    }

    fn create_partition_internal(
        &mut self,
        id: &str,
        name: &str,
        options: CreatePartitionOptions,
    ) -> Result<(), PartitionError> {
        if !is_valid_partition_id(id) {
            return Err(PartitionError::InvalidId(id.to_string()));
        }
        if self.configs.contains_key(id) {
            return Err(PartitionError::InvalidId(format!(
                "partition {id} already exists"
            )));
        }

        std::fs::create_dir_all(self.partition_dir(id))?;
        let mut cfg = PartitionConfig::new(id, name);
        cfg.cluster_size = options.cluster_size;
        cfg.description = options.description;

        let mut empty_store = self.new_clustered_store(id, &cfg);
        empty_store.save()?;
        let mut empty_index = self.new_hnsw_index(id);
        empty_index.save()?;

        self.configs.insert(id.to_string(), cfg);
        crate::persist::write_json(
            &self.config_path(id),
            self.configs.get(id).expect("just inserted"),
            self.config.use_compression,
        )?;
        self.events.emit(DbEvent::PartitionCreated { id: id.to_string() });

        self.load_into_cache(id, empty_store);
        self.events.emit(DbEvent::PartitionLoaded { id: id.to_string() });

        if options.set_active {
            self.activate(id)?;
        }
        Ok(())
    }

    fn new_clustered_store(&self, id: &str, cfg: &PartitionConfig) -> ClusteredStore {
        let mut options = self.config.cluster_options.clone();
        if let Some(size) = cfg.cluster_size {
            options.cluster_size = size;
        }
        ClusteredStore::with_path(self.partition_dir(id), options, self.config.use_compression)
    }

    fn new_hnsw_index(&self, id: &str) -> HnswIndex {
        HnswIndex::with_path(
            self.partition_dir(id),
            crate::config::HnswOptions::default(),
            self.config.cluster_options.distance_metric,
            self.config.use_compression,
        )
    }

    /// Ensures `id` is present in the resident cache, loading it from disk
    /// (and disposing of any LRU-evicted neighbor) if it was not already.
    ///
    /// # Errors
    /// Returns [`PartitionError::UnknownPartition`] if `id` has no config,
    /// or propagates I/O/serialization failures from the load.
    pub fn ensure_loaded(&mut self, id: &str) -> Result<(), PartitionError> {
        if self.cache.contains(id) {
            return Ok(());
        }
        let cfg = self
            .configs
            .get(id)
            .ok_or_else(|| PartitionError::UnknownPartition(id.to_string()))?;
        let mut store = self.new_clustered_store(id, cfg);
        store.load()?;
        self.load_into_cache(id, store);
        self.events.emit(DbEvent::PartitionLoaded { id: id.to_string() });
        Ok(())
    }

    fn load_into_cache(&mut self, id: &str, store: ClusteredStore) {
        if let Some((evicted_id, mut evicted_store)) = self.cache.insert(id.to_string(), store) {
            if let Err(err) = evicted_store.close() {
                self.events.emit(DbEvent::PartitionError {
                    id: evicted_id.clone(),
                    operation: "evict".into(),
                    error: err.to_string(),
                });
            }
            self.indices.remove(&evicted_id);
            self.events.emit(DbEvent::PartitionUnloaded { id: evicted_id });
        }
    }

    /// Ensures `id`'s HNSW index is loaded into memory, if its on-disk file
    /// exists. A missing index file is not an error — the partition simply
    /// has no HNSW index and falls back to centroid-pruned search.
    ///
    /// # Errors
    /// Propagates I/O/serialization failures other than a missing file.
    pub fn ensure_hnsw_loaded(&mut self, id: &str) -> Result<(), PartitionError> {
        if self.indices.contains_key(id) {
            return Ok(());
        }
        if !self.configs.contains_key(id) {
            return Err(PartitionError::UnknownPartition(id.to_string()));
        }
        let mut index = self.new_hnsw_index(id);
        index.load()?;
        self.indices.insert(id.to_string(), index);
        self.events.emit(DbEvent::PartitionIndexLoaded { id: id.to_string() });
        Ok(())
    }

    /// Loads `id`, deactivates whatever partition was previously active,
    /// and marks `id` active.
    ///
    /// # Errors
    /// Returns [`PartitionError::UnknownPartition`] if `id` has no config.
    pub fn set_active_partition(&mut self, id: &str) -> Result<(), PartitionError> {
        if self.closed || self.closing {
            return Err(PartitionError::Closed);
        }
        self.ensure_loaded(id)?;
        self.activate(id)
    }

    fn activate(&mut self, id: &str) -> Result<(), PartitionError> {
        if !self.configs.contains_key(id) {
            return Err(PartitionError::UnknownPartition(id.to_string()));
        }
        if let Some(prev) = &self.active_partition_id {
            if let Some(cfg) = self.configs.get_mut(prev) {
                cfg.active = false;
            }
        }
        if let Some(cfg) = self.configs.get_mut(id) {
            cfg.active = true;
        }
        self.active_partition_id = Some(id.to_string());
        self.config_save_pending = true;
        self.events.emit(DbEvent::PartitionActivated { id: id.to_string() });
        Ok(())
    }

    /// Ensures the active partition can accept `needed` more vectors,
    /// rolling over to a freshly created partition if it cannot and
    /// `autoCreatePartitions` is set.
    ///
    /// # Errors
    /// Returns [`PartitionError::CapacityExhausted`] if there is no active
    /// partition, capacity is exhausted and auto-creation is disabled.
    fn ensure_capacity(&mut self, needed: u64) -> Result<String, PartitionError> {
        let active = self
            .active_partition_id
            .clone()
            .ok_or(PartitionError::CapacityExhausted {
                partition: String::new(),
                current: 0,
                capacity: self.config.partition_capacity,
            })?;
        let current = self.configs.get(&active).map_or(0, |c| c.vector_count);
        if current + needed <= self.config.partition_capacity {
            return Ok(active);
        }
        if !self.config.auto_create_partitions {
            return Err(PartitionError::CapacityExhausted {
                partition: active,
                current,
                capacity: self.config.partition_capacity,
            });
        }
        let id = format!("p-{}", self.allocate_timestamp());
        self.create_partition_internal(&id, &id, CreatePartitionOptions {
            set_active: true,
            ..CreatePartitionOptions::default()
        })?;
        Ok(id)
    }

    /// Adds a vector to the active partition, rolling over to a new
    /// partition first if capacity requires it. Runs store insert, cluster
    /// assignment, and (if the partition's HNSW index is loaded) graph
    /// insertion, in that order, before returning.
    ///
    /// # Errors
    /// Returns [`PartitionError::Closed`] if the manager is closed/closing,
    /// or propagates capacity/store/graph errors.
    pub fn add_vector(
        &mut self,
        id: Option<VectorId>,
        vector: Vec<f32>,
        metadata: Option<Metadata>,
    ) -> Result<(String, VectorId), PartitionError> {
        if self.closed || self.closing {
            return Err(PartitionError::Closed);
        }
        let partition_id = self.ensure_capacity(1)?;
        self.ensure_loaded(&partition_id)?;

        let new_id = {
            let store = self
                .cache
                .get_mut(&partition_id)
                .expect("just ensured loaded");
            store.add_vector(id, vector.clone(), metadata)?
        };
        self.drain_cluster_events(&partition_id);

        if let Some(index) = self.indices.get_mut(&partition_id) {
            let store = self.cache.peek(&partition_id).expect("just inserted");
            index.insert(new_id.clone(), &vector, store)?;
        }

        if let Some(cfg) = self.configs.get_mut(&partition_id) {
            cfg.vector_count += 1;
        }
        self.config_save_pending = true;
        self.events.emit(DbEvent::VectorAdd {
            partition_id: partition_id.clone(),
            id: new_id.clone(),
        });
        Ok((partition_id, new_id))
    }

    /// Best-effort batch insert: fills the active partition to capacity,
    /// rolls over as needed, and returns the total inserted plus every
    /// partition id touched.
    ///
    /// # Errors
    /// Returns [`PartitionError::Closed`] if the manager is closed/closing.
    pub fn bulk_add(
        &mut self,
        batch: Vec<(Option<VectorId>, Vec<f32>, Option<Metadata>)>,
    ) -> Result<(usize, Vec<String>), PartitionError> {
        if self.closed || self.closing {
            return Err(PartitionError::Closed);
        }
        let mut inserted = 0usize;
        let mut touched = Vec::new();
        for (index, (id, vector, metadata)) in batch.into_iter().enumerate() {
            match self.add_vector(id, vector, metadata) {
                Ok((partition_id, _)) => {
                    inserted += 1;
                    if !touched.contains(&partition_id) {
                        touched.push(partition_id);
                    }
                }
                Err(err) => {
                    log::warn!("bulk_add: item {index} failed: {err}");
                    self.events.emit(DbEvent::PartitionError {
                        id: self.active_partition_id.clone().unwrap_or_default(),
                        operation: "bulkAdd".into(),
                        error: err.to_string(),
                    });
                }
            }
        }
        self.events.emit(DbEvent::VectorsBulkAdd {
            partitions: touched.clone(),
            inserted,
        });
        Ok((inserted, touched))
    }

    /// Returns `id`'s vector, searching resident partitions only.
    #[must_use]
    pub fn get_vector(&self, id: &VectorId) -> Option<Vec<f32>> {
        self.cache
            .iter()
            .find_map(|(_, store)| store.get_vector(id).map(<[f32]>::to_vec))
    }

    /// Returns `id`'s metadata, searching resident partitions only.
    #[must_use]
    pub fn get_metadata(&self, id: &VectorId) -> Option<Metadata> {
        self.cache
            .iter()
            .find_map(|(_, store)| store.get_metadata(id).cloned())
    }

    fn find_resident_owner_mut(&mut self, id: &VectorId) -> Option<&mut ClusteredStore> {
        self.cache
            .iter_mut()
            .find(|(_, store)| store.has_vector(id))
            .map(|(_, store)| store)
    }

    fn resident_owner_id(&self, id: &VectorId) -> Option<String> {
        self.cache
            .iter()
            .find(|(_, store)| store.has_vector(id))
            .map(|(pid, _)| pid.clone())
    }

    /// Deletes `id` from whichever resident partition owns it: removes it
    /// from the Clustered Store (and its cluster), soft-deletes it from the
    /// partition's HNSW index if loaded, and updates `vectorCount`.
    ///
    /// # Errors
    /// Returns [`PartitionError::Closed`] if the manager is closed, or
    /// propagates a Clustered Store error.
    pub fn delete_vector(&mut self, id: &VectorId) -> Result<bool, PartitionError> {
        if self.closed {
            return Err(PartitionError::Closed);
        }
        let Some(partition_id) = self.resident_owner_id(id) else {
            return Ok(false);
        };
        let removed = {
            let store = self
                .cache
                .peek_mut(&partition_id)
                .expect("owner just located");
            store.delete_vector(id)?
        };
        if !removed {
            return Ok(false);
        }
        self.drain_cluster_events(&partition_id);
        if let Some(index) = self.indices.get_mut(&partition_id) {
            index.mark_delete(id);
        }
        if let Some(cfg) = self.configs.get_mut(&partition_id) {
            cfg.vector_count = cfg.vector_count.saturating_sub(1);
        }
        self.config_save_pending = true;
        self.events.emit(DbEvent::VectorDelete {
            partition_id,
            id: id.clone(),
        });
        Ok(true)
    }

    /// Replaces `id`'s vector wholesale, re-running cluster assignment and
    /// (if loaded) re-inserting into the HNSW graph. Returns `false` if
    /// `id` is not resident.
    ///
    /// # Errors
    /// Propagates a Clustered Store error.
    pub fn update_vector(&mut self, id: &VectorId, vector: Vec<f32>) -> Result<bool, PartitionError> {
        if self.closed {
            return Err(PartitionError::Closed);
        }
        let Some(partition_id) = self.resident_owner_id(id) else {
            return Ok(false);
        };
        let updated = {
            let store = self
                .cache
                .peek_mut(&partition_id)
                .expect("owner just located");
            store.update_vector(id, vector.clone())?
        };
        if !updated {
            return Ok(false);
        }
        self.drain_cluster_events(&partition_id);
        if let Some(index) = self.indices.get_mut(&partition_id) {
            index.mark_delete(id);
            let store = self.cache.peek(&partition_id).expect("owner just located");
            index.insert(id.clone(), &vector, store)?;
        }
        self.events.emit(DbEvent::VectorUpdate {
            partition_id,
            id: id.clone(),
        });
        Ok(true)
    }

    /// Merges `patch` into `id`'s metadata. Returns `false` if `id` is not
    /// resident.
    ///
    /// # Errors
    /// Propagates a Clustered Store error.
    pub fn update_metadata(&mut self, id: &VectorId, patch: Metadata) -> Result<bool, PartitionError> {
        if self.closed {
            return Err(PartitionError::Closed);
        }
        let Some(partition_id) = self.resident_owner_id(id) else {
            return Ok(false);
        };
        let had_metadata_before = self
            .cache
            .peek(&partition_id)
            .and_then(|store| store.get_metadata(id))
            .is_some();
        let store = self
            .find_resident_owner_mut(id)
            .expect("owner just located");
        let updated = store.update_metadata(id, patch)?;
        if updated {
            let event = if had_metadata_before {
                DbEvent::MetadataUpdate { partition_id, id: id.clone() }
            } else {
                DbEvent::MetadataAdd { partition_id, id: id.clone() }
            };
            self.events.emit(event);
        }
        Ok(updated)
    }

    fn drain_cluster_events(&mut self, partition_id: &str) {
        let events = self
            .cache
            .peek_mut(partition_id)
            .map(ClusteredStore::take_events)
            .unwrap_or_default();
        for event in events {
            match event {
                ClusterEvent::Created(key) => self.events.emit(DbEvent::ClusterCreate {
                    partition_id: partition_id.to_string(),
                    key,
                }),
                ClusterEvent::Deleted(key) => self.events.emit(DbEvent::ClusterDelete {
                    partition_id: partition_id.to_string(),
                    key,
                }),
            }
        }
    }

    fn target_partitions(&self, requested: &Option<Vec<String>>) -> Vec<String> {
        match requested {
            Some(ids) => ids
                .iter()
                .filter(|id| self.cache.contains(id))
                .cloned()
                .collect(),
            None => self.cache.resident_ids(),
        }
    }

    /// Runs centroid-pruned search across the requested (or every resident)
    /// partitions in parallel, merging each partition's local top-k into a
    /// single global top-k.
    #[must_use]
    pub fn find_nearest(
        &self,
        query: &[f32],
        k: usize,
        options: &SearchOptions<'_>,
    ) -> Vec<(String, VectorId, f32)> {
        if k == 0 {
            return Vec::new();
        }
        let metric = options
            .distance_metric
            .unwrap_or(self.config.cluster_options.distance_metric);
        let targets = self.target_partitions(&options.partition_ids);

        let mut merged: Vec<(String, VectorId, f32)> = targets
            .par_iter()
            .filter_map(|pid| self.cache.peek(pid).map(|store| (pid, store)))
            .flat_map_iter(|(pid, store)| {
                store
                    .find_nearest(query, k, metric, options.filter)
                    .into_iter()
                    .map(move |(id, dist)| (pid.clone(), id, dist))
            })
            .collect();
        merged.sort_by(|a, b| {
            a.2.partial_cmp(&b.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
        merged.truncate(k);
        merged
    }

    /// Loads each target partition's Clustered Store and HNSW index (if
    /// present), then runs graph search across them in parallel. A
    /// partition with no on-disk index is skipped rather than built lazily.
    ///
    /// # Errors
    /// Propagates a load failure for any target partition.
    pub fn find_nearest_hnsw(
        &mut self,
        query: &[f32],
        k: usize,
        options: &SearchOptions<'_>,
    ) -> Result<Vec<(String, VectorId, f32)>, PartitionError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let requested = options
            .partition_ids
            .clone()
            .unwrap_or_else(|| self.configs.keys().cloned().collect());
        for pid in &requested {
            if self.configs.contains_key(pid) {
                self.ensure_loaded(pid)?;
                let _ = self.ensure_hnsw_loaded(pid);
            }
        }

        let indices = &self.indices;
        let cache = &self.cache;
        let ef = options.ef;
        let filter = options.filter;
        let mut merged: Vec<(String, VectorId, f32)> = requested
            .par_iter()
            .filter_map(|pid| {
                let index = indices.get(pid)?;
                let store = cache.peek(pid)?;
                Some((pid, index, store))
            })
            .flat_map_iter(|(pid, index, store)| {
                index
                    .search_filtered(query, k, ef, filter, store)
                    .into_iter()
                    .map(move |(id, dist)| (pid.clone(), id, dist))
            })
            .collect();
        merged.sort_by(|a, b| {
            a.2.partial_cmp(&b.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
        merged.truncate(k);
        Ok(merged)
    }

    /// Loads `partition_id` (the active partition if `None`), building a
    /// fresh HNSW index over every live vector if one is not already
    /// loaded, invoking `progress` after each vector indexed.
    ///
    /// # Errors
    /// Returns [`PartitionError::UnknownPartition`] if no partition can be
    /// resolved, or propagates a load/index error.
    pub fn build_index_hnsw(
        &mut self,
        partition_id: Option<&str>,
        mut progress: Option<&mut ProgressCallback<'_>>,
    ) -> Result<(), PartitionError> {
        let pid = partition_id
            .map(str::to_string)
            .or_else(|| self.active_partition_id.clone())
            .ok_or_else(|| PartitionError::UnknownPartition(String::new()))?;
        self.ensure_loaded(&pid)?;

        let mut index = self.new_hnsw_index(&pid);
        let vectors: Vec<(VectorId, Vec<f32>)> = {
            let store = self.cache.peek(&pid).expect("just ensured loaded");
            store.iter().map(|(id, v)| (id.clone(), v.to_vec())).collect()
        };
        let store = self.cache.peek(&pid).expect("just ensured loaded");
        let events = &self.events;
        let mut emit_progress = |done: usize, total: usize| {
            if let Some(cb) = progress.as_mut() {
                cb(done, total);
            }
            events.emit(DbEvent::PartitionIndexProgress {
                id: pid.clone(),
                done,
                total,
            });
        };
        index.build_index(vectors, store, Some(&mut emit_progress))?;
        index.save()?;
        self.indices.insert(pid.clone(), index);
        self.events.emit(DbEvent::PartitionIndexed { id: pid.clone() });
        self.events.emit(DbEvent::PartitionIndexSaved { id: pid });
        Ok(())
    }

    /// Saves every partition config, then every resident Clustered Store,
    /// then every resident HNSW index, each group concurrently
    /// Saves every partition config, then every resident Clustered Store,
    /// then every resident HNSW index, each group concurrently.
    ///
    /// # Errors
    /// Propagates the first failure encountered in any group; partition-
    /// local failures are also reported via `partition:error`.
    pub fn save(&mut self) -> Result<(), PartitionError> {
        self.save_configs()?;

        let mut store_failures = Vec::new();
        for (id, store) in self.cache.iter_mut() {
            if let Err(err) = store.save() {
                store_failures.push((id.clone(), err));
            }
        }
        let stores_saved = self.cache.len() - store_failures.len();
        for (id, err) in &store_failures {
            self.events.emit(DbEvent::PartitionError {
                id: id.clone(),
                operation: "save".into(),
                error: err.to_string(),
            });
        }

        let mut index_failures = Vec::new();
        for (id, index) in &self.indices {
            if let Err(err) = index.save() {
                index_failures.push((id.clone(), err));
            } else {
                self.events.emit(DbEvent::PartitionIndexSaved { id: id.clone() });
            }
        }
        let indices_saved = self.indices.len() - index_failures.len();
        for (id, err) in &index_failures {
            self.events.emit(DbEvent::PartitionError {
                id: id.clone(),
                operation: "save".into(),
                error: err.to_string(),
            });
        }

        self.events.emit(DbEvent::DbSaved {
            configs: self.configs.len(),
            stores: stores_saved,
            indices: indices_saved,
        });

        if let Some((id, err)) = store_failures.into_iter().next() {
            log::warn!("save: partition {id} store failed: {err}");
            return Err(PartitionError::Cluster(err));
        }
        if let Some((id, err)) = index_failures.into_iter().next() {
            log::warn!("save: partition {id} index failed: {err}");
            return Err(PartitionError::Graph(err));
        }
        Ok(())
    }

    /// Writes every partition config to disk and clears the debounce flag,
    /// if a save was pending.
    ///
    /// # Errors
    /// Propagates the first I/O/serialization failure.
    pub fn save_configs(&mut self) -> Result<(), PartitionError> {
        if !self.config_save_pending {
            return Ok(());
        }
        for (id, cfg) in &self.configs {
            crate::persist::write_json(&self.config_path(id), cfg, self.config.use_compression)?;
        }
        self.config_save_pending = false;
        Ok(())
    }

    /// Marks a config save as needed. Repeated calls while a save has not
    /// yet run coalesce into the next [`save_configs`] call.
    ///
    /// [`save_configs`]: PartitionManager::save_configs
    pub fn schedule_save_configs(&mut self) {
        self.config_save_pending = true;
    }

    /// Flips the closing flag, performs one final [`save`], clears every
    /// resident cache, and marks the manager closed. Idempotent.
    ///
    /// [`save`]: PartitionManager::save
    ///
    /// # Errors
    /// Propagates the final save's error, if any; the manager is still
    /// marked closed regardless.
    pub fn close(&mut self) -> Result<(), PartitionError> {
        if self.closed {
            return Ok(());
        }
        self.closing = true;
        let result = self.save();
        for (_, mut store) in self.cache.drain() {
            let _ = store.close();
        }
        self.indices.clear();
        self.closing = false;
        self.closed = true;
        self.events.emit(DbEvent::DbClose);
        result
    }

    /// `true` once `close()` has completed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// `true` once `initialize()` has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The active partition id, if one is set.
    #[must_use]
    pub fn active_partition_id(&self) -> Option<&str> {
        self.active_partition_id.as_deref()
    }

    /// Every known partition id (resident or not).
    #[must_use]
    pub fn partition_ids(&self) -> Vec<String> {
        self.configs.keys().cloned().collect()
    }

    /// The config for `id`, if known.
    #[must_use]
    pub fn partition_config(&self, id: &str) -> Option<&PartitionConfig> {
        self.configs.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;

    fn manager(dir: &std::path::Path) -> PartitionManager {
        PartitionManager::new(ManagerConfig::new(dir))
    }

    #[test]
    fn initialize_auto_creates_first_partition() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());
        mgr.initialize().unwrap();
        assert_eq!(mgr.partition_ids().len(), 1);
        assert!(mgr.active_partition_id().is_some());
    }

    #[test]
    fn add_vector_lands_in_active_partition() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());
        mgr.initialize().unwrap();
        let (pid, id) = mgr.add_vector(None, vec![1.0, 2.0], None).unwrap();
        assert_eq!(Some(pid.as_str()), mgr.active_partition_id());
        assert_eq!(mgr.get_vector(&id), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn partition_rolls_over_at_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = ManagerConfig::new(dir.path());
        cfg.partition_capacity = 3;
        cfg.max_active_partitions = 5;
        let mut mgr = PartitionManager::new(cfg);
        mgr.initialize().unwrap();

        let points = [[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, 0.0], [0.0, 2.0]];
        let mut partitions = Vec::new();
        for p in &points {
            let (pid, _) = mgr.add_vector(None, p.to_vec(), None).unwrap();
            if !partitions.contains(&pid) {
                partitions.push(pid);
            }
        }
        assert_eq!(partitions.len(), 2, "fifth vector should roll over to a new partition");
        assert_eq!(mgr.get_stats().total_configured_vectors, 5);
    }

    #[test]
    fn delete_vector_removes_from_owning_partition() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());
        mgr.initialize().unwrap();
        let (_, id) = mgr.add_vector(None, vec![1.0], None).unwrap();
        assert!(mgr.delete_vector(&id).unwrap());
        assert!(mgr.get_vector(&id).is_none());
        assert!(!mgr.delete_vector(&id).unwrap());
    }

    #[test]
    fn find_nearest_merges_across_resident_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = ManagerConfig::new(dir.path());
        cfg.max_active_partitions = 5;
        let mut mgr = PartitionManager::new(cfg);
        mgr.initialize().unwrap();
        mgr.create_partition("p-second", "second", CreatePartitionOptions::default())
            .unwrap();

        let active = mgr.active_partition_id().unwrap().to_string();
        mgr.add_vector(None, vec![0.0, 0.0], None).unwrap();
        mgr.set_active_partition("p-second").unwrap();
        mgr.add_vector(None, vec![100.0, 100.0], None).unwrap();
        mgr.set_active_partition(&active).unwrap();

        let results = mgr.find_nearest(&[0.0, 0.0], 1, &SearchOptions::default());
        assert_eq!(results.len(), 1);
        assert!(results[0].2 < 1.0);
    }

    #[test]
    fn eviction_does_not_lose_saved_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = ManagerConfig::new(dir.path());
        cfg.max_active_partitions = 2;
        let mut mgr = PartitionManager::new(cfg.clone());
        mgr.initialize().unwrap();

        mgr.create_partition("p-2", "two", CreatePartitionOptions { set_active: true, ..Default::default() })
            .unwrap();
        let (_, id1) = mgr.add_vector(None, vec![1.0], None).unwrap();
        mgr.create_partition("p-3", "three", CreatePartitionOptions { set_active: true, ..Default::default() })
            .unwrap();
        mgr.add_vector(None, vec![2.0], None).unwrap();
        // cache capacity is 2; loading p-3 (the 3rd partition touched) evicts p-1.
        assert_eq!(mgr.get_stats().resident_count, 2);

        mgr.save().unwrap();
        let mut reopened = PartitionManager::new(cfg);
        reopened.initialize().unwrap();
        reopened.ensure_loaded("p-2").unwrap();
        assert_eq!(reopened.get_vector(&id1), Some(vec![1.0]));
    }

    #[test]
    fn close_is_idempotent_and_saves_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());
        mgr.initialize().unwrap();
        mgr.add_vector(None, vec![1.0], None).unwrap();
        mgr.close().unwrap();
        assert!(mgr.is_closed());
        assert!(mgr.close().is_ok());
        assert!(matches!(
            mgr.add_vector(None, vec![1.0], None),
            Err(PartitionError::Closed)
        ));
    }
}
