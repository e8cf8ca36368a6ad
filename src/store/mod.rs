//! Vector Store: owns the `id -> vector` and `id -> metadata` maps,
//! offers linear-scan search, and serializes to a two-file on-disk layout
//! (`data/meta.json` + `data/vec.bin`).

use crate::error::StoreError;
use crate::id::VectorId;
use crate::metadata::{matches_criteria, FieldCriterion, FilterFn, Metadata};
use crate::metric::DistanceMetric;
use crate::persist::{self, FORMAT_VERSION};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize)]
struct VectorRecord {
    id: VectorId,
    offset: u32,
    length: u32,
    dim: u32,
}

#[derive(Serialize, Deserialize)]
struct MetaFile {
    version: u32,
    #[serde(rename = "defaultVectorSize")]
    default_vector_size: Option<u32>,
    #[serde(rename = "idCounter")]
    id_counter: u64,
    vectors: Vec<VectorRecord>,
    metadata: BTreeMap<String, Metadata>,
    /// CRC32 of `vec.bin`, checked at load.
    #[serde(rename = "vecChecksum")]
    vec_checksum: u32,
}

/// Owns vectors and metadata for one logical store; the unit Clustered
/// Store and Partition Manager build on top of.
pub struct VectorStore {
    path: Option<PathBuf>,
    use_compression: bool,
    vectors: BTreeMap<VectorId, Vec<f32>>,
    metadata: BTreeMap<VectorId, Metadata>,
    default_dimension: Option<u32>,
    id_counter: u64,
    closed: bool,
}

impl VectorStore {
    /// Creates an empty, unbacked store (no persistence path).
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: None,
            use_compression: false,
            vectors: BTreeMap::new(),
            metadata: BTreeMap::new(),
            default_dimension: None,
            id_counter: 0,
            closed: false,
        }
    }

    /// Creates an empty store backed by `dir` (holds a `data/` subtree).
    #[must_use]
    pub fn with_path(dir: impl Into<PathBuf>, use_compression: bool) -> Self {
        Self {
            path: Some(dir.into()),
            use_compression,
            ..Self::new()
        }
    }

    /// Number of live vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// `true` if the store holds no vectors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// `true` once `close()` has run; further mutation is refused.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Iterates over every live `(id, vector)` pair.
    pub fn iter(&self) -> impl Iterator<Item = (&VectorId, &[f32])> {
        self.vectors.iter().map(|(id, v)| (id, v.as_slice()))
    }

    /// Adds a vector, allocating the next integer id if none is supplied.
    /// Overwriting an existing id is permitted (and logged). The first
    /// insert with no prior default dimension sets it from `vector.len()`.
    ///
    /// # Errors
    /// Returns [`StoreError::Closed`] if the store has been closed.
    pub fn add_vector(
        &mut self,
        id: Option<VectorId>,
        vector: Vec<f32>,
        metadata: Option<Metadata>,
    ) -> Result<VectorId, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        let id = match id {
            Some(id) => {
                if let VectorId::Int(n) = &id {
                    self.id_counter = self.id_counter.max(n + 1);
                }
                id
            }
            None => {
                let id = VectorId::Int(self.id_counter);
                self.id_counter += 1;
                id
            }
        };
        if self.vectors.contains_key(&id) {
            log::warn!("overwriting existing vector id {id}");
        }
        if self.default_dimension.is_none() {
            self.default_dimension = Some(vector.len() as u32);
        }
        self.vectors.insert(id.clone(), vector);
        if let Some(metadata) = metadata {
            self.metadata.insert(id.clone(), metadata);
        }
        Ok(id)
    }

    /// Best-effort batch insert: a per-item failure is logged, not
    /// propagated, and does not abort the remainder of the batch. Returns
    /// the number of vectors actually inserted.
    ///
    /// # Errors
    /// Returns [`StoreError::Closed`] if the store has been closed; in that
    /// case no item in the batch is inserted.
    pub fn bulk_add(
        &mut self,
        batch: Vec<(Option<VectorId>, Vec<f32>, Option<Metadata>)>,
    ) -> Result<usize, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        let mut inserted = 0usize;
        for (index, (id, vector, metadata)) in batch.into_iter().enumerate() {
            match self.add_vector(id, vector, metadata) {
                Ok(_) => inserted += 1,
                Err(err) => log::warn!("bulk_add: item {index} failed: {err}"),
            }
        }
        Ok(inserted)
    }

    /// Returns the vector for `id`, if live.
    #[must_use]
    pub fn get_vector(&self, id: &VectorId) -> Option<&[f32]> {
        self.vectors.get(id).map(Vec::as_slice)
    }

    /// `true` if `id` names a live vector.
    #[must_use]
    pub fn has_vector(&self, id: &VectorId) -> bool {
        self.vectors.contains_key(id)
    }

    /// Returns `id`'s vector's dimension, if live.
    #[must_use]
    pub fn get_vector_dimension(&self, id: &VectorId) -> Option<usize> {
        self.vectors.get(id).map(Vec::len)
    }

    /// Returns the store's default dimension (set from the first insert),
    /// if any vector has ever been added.
    #[must_use]
    pub fn default_dimension(&self) -> Option<u32> {
        self.default_dimension
    }

    /// Returns `id`'s metadata, if any is attached.
    #[must_use]
    pub fn get_metadata(&self, id: &VectorId) -> Option<&Metadata> {
        self.metadata.get(id)
    }

    /// Merges `patch`'s keys into `id`'s metadata (creating an entry if
    /// none existed). Returns `false` if `id` is not a live vector.
    /// Applying the same patch twice is a no-op on the second call, since
    /// the merge is idempotent for identical key/value pairs.
    ///
    /// # Errors
    /// Returns [`StoreError::Closed`] if the store has been closed.
    pub fn update_metadata(&mut self, id: &VectorId, patch: Metadata) -> Result<bool, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if !self.vectors.contains_key(id) {
            return Ok(false);
        }
        self.metadata.entry(id.clone()).or_default().extend(patch);
        Ok(true)
    }

    /// Applies an arbitrary mutation closure to `id`'s metadata entry
    /// (created empty if absent). Returns `false` if `id` is not live.
    ///
    /// # Errors
    /// Returns [`StoreError::Closed`] if the store has been closed.
    pub fn update_metadata_with(
        &mut self,
        id: &VectorId,
        f: impl FnOnce(&mut Metadata),
    ) -> Result<bool, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if !self.vectors.contains_key(id) {
            return Ok(false);
        }
        f(self.metadata.entry(id.clone()).or_default());
        Ok(true)
    }

    /// Replaces `id`'s vector wholesale. Returns `false` if `id` is not
    /// live (use `add_vector` to create one).
    ///
    /// # Errors
    /// Returns [`StoreError::Closed`] if the store has been closed.
    pub fn update_vector(&mut self, id: &VectorId, vector: Vec<f32>) -> Result<bool, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if !self.vectors.contains_key(id) {
            return Ok(false);
        }
        self.vectors.insert(id.clone(), vector);
        Ok(true)
    }

    /// Removes a vector and its metadata. Returns `false` if `id` was not
    /// live. The caller (Clustered Store) is responsible for splicing the
    /// id out of its owning cluster.
    ///
    /// # Errors
    /// Returns [`StoreError::Closed`] if the store has been closed.
    pub fn delete_vector(&mut self, id: &VectorId) -> Result<bool, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        self.metadata.remove(id);
        Ok(self.vectors.remove(id).is_some())
    }

    /// Exhaustive linear scan: `filter` short-circuits before distance
    /// computation; results are sorted ascending by distance, ties broken
    /// by id ordering (numeric before string, per [`VectorId::Ord`]).
    #[must_use]
    pub fn find_nearest(
        &self,
        query: &[f32],
        k: usize,
        metric: DistanceMetric,
        filter: Option<&FilterFn>,
    ) -> Vec<(VectorId, f32)> {
        if k == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(VectorId, f32)> = self
            .vectors
            .iter()
            .filter(|(id, _)| filter.map_or(true, |f| f(id, self.metadata.get(id))))
            .map(|(id, v)| (id.clone(), metric.distance(query, v)))
            .collect();
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }

    /// Evaluates a conjunctive field-existence-and-equality predicate over
    /// every metadata map, optionally capping the result count.
    #[must_use]
    pub fn metadata_with_field(
        &self,
        criteria: &[FieldCriterion],
        limit: Option<usize>,
    ) -> Vec<(VectorId, Metadata)> {
        let mut out: Vec<(VectorId, Metadata)> = self
            .metadata
            .iter()
            .filter(|(_, m)| matches_criteria(m, criteria))
            .map(|(id, m)| (id.clone(), m.clone()))
            .collect();
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        out
    }

    fn data_dir(&self) -> Option<PathBuf> {
        self.path.as_ref().map(|p| p.join("data"))
    }

    /// Writes `data/meta.json` and `data/vec.bin`. A no-op if this store
    /// has no backing path. Save/load is single-writer by construction:
    /// the `&mut self` receiver means the borrow checker itself rules out
    /// an overlapping save — there is no second caller to hand an
    /// in-flight future to.
    ///
    /// # Errors
    /// Returns [`StoreError::Closed`] if the store has been closed, or an
    /// I/O/serialization error if the write fails.
    pub fn save(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        let Some(data_dir) = self.data_dir() else {
            return Ok(());
        };

        let mut records = Vec::with_capacity(self.vectors.len());
        let mut payload: Vec<f32> = Vec::new();
        for (id, vector) in &self.vectors {
            let offset = u32::try_from(payload.len()).unwrap_or(u32::MAX);
            let length = u32::try_from(vector.len()).unwrap_or(u32::MAX);
            records.push(VectorRecord {
                id: id.clone(),
                offset,
                length,
                dim: length,
            });
            payload.extend_from_slice(vector);
        }

        let vec_path = data_dir.join("vec.bin");
        let checksum = persist::write_vec_bin(&vec_path, &payload)?;

        let metadata = self
            .metadata
            .iter()
            .map(|(id, m)| (id.to_string(), m.clone()))
            .collect();

        let meta = MetaFile {
            version: FORMAT_VERSION,
            default_vector_size: self.default_dimension,
            id_counter: self.id_counter,
            vectors: records,
            metadata,
            vec_checksum: checksum,
        };
        let meta_path = data_dir.join("meta.json");
        persist::write_json(&meta_path, &meta, self.use_compression)?;
        Ok(())
    }

    /// Loads `data/meta.json` and `data/vec.bin`. Missing files are a
    /// fresh database, not an error. A version other than 1 is fatal. A
    /// vector record whose offset/length run past the payload is skipped
    /// with a warning rather than aborting the load.
    ///
    /// # Errors
    /// Returns [`StoreError::Closed`] if the store has been closed, or
    /// [`StoreError::UnsupportedVersion`]/an I/O error otherwise.
    pub fn load(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        let Some(data_dir) = self.data_dir() else {
            return Ok(());
        };

        let meta_path = data_dir.join("meta.json");
        let meta: Option<MetaFile> = persist::read_json(&meta_path, self.use_compression)?;
        let Some(meta) = meta else {
            return Ok(());
        };
        if meta.version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion(meta.version));
        }

        let vec_path = data_dir.join("vec.bin");
        let (floats, checksum) = match persist::read_vec_bin(&vec_path) {
            Ok(pair) => pair,
            Err(err) => {
                log::warn!("failed to read vec.bin under {}: {err}", data_dir.display());
                (Vec::new(), 0)
            }
        };
        if checksum != meta.vec_checksum {
            log::warn!(
                "vec.bin checksum mismatch under {}: expected {:#x}, got {:#x}",
                data_dir.display(),
                meta.vec_checksum,
                checksum
            );
        }

        let mut vectors = BTreeMap::new();
        for record in meta.vectors {
            let start = record.offset as usize;
            let end = start + record.length as usize;
            if end > floats.len() {
                log::warn!(
                    "skipping corrupt vector record {} (offset {} length {} exceeds {} floats on disk)",
                    record.id,
                    record.offset,
                    record.length,
                    floats.len()
                );
                continue;
            }
            vectors.insert(record.id, floats[start..end].to_vec());
        }

        let lookup: HashMap<String, VectorId> = vectors
            .keys()
            .map(|id| (id.to_string(), id.clone()))
            .collect();
        let mut metadata = BTreeMap::new();
        for (id_str, value) in meta.metadata {
            match lookup.get(&id_str) {
                Some(id) => {
                    metadata.insert(id.clone(), value);
                }
                None => log::warn!("metadata for unknown vector id {id_str} skipped on load"),
            }
        }

        self.vectors = vectors;
        self.metadata = metadata;
        self.default_dimension = meta.default_vector_size;
        self.id_counter = meta.id_counter;
        Ok(())
    }

    /// Idempotent close: triggers one final save if a path is set, then
    /// clears in-memory state. Emitting `db:close` is the owning Partition
    /// Manager's job (it holds the event emitter); this layer only frees
    /// its own state.
    ///
    /// # Errors
    /// Propagates any error from the final `save()`.
    pub fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        if self.path.is_some() {
            self.save()?;
        }
        self.vectors.clear();
        self.metadata.clear();
        self.closed = true;
        Ok(())
    }
}

impl Default for VectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataValue;

    #[test]
    fn add_vector_allocates_sequential_ids() {
        let mut store = VectorStore::new();
        let a = store.add_vector(None, vec![1.0, 2.0], None).unwrap();
        let b = store.add_vector(None, vec![3.0, 4.0], None).unwrap();
        assert_eq!(a, VectorId::Int(0));
        assert_eq!(b, VectorId::Int(1));
    }

    #[test]
    fn explicit_int_id_advances_counter() {
        let mut store = VectorStore::new();
        store
            .add_vector(Some(VectorId::Int(10)), vec![1.0], None)
            .unwrap();
        let next = store.add_vector(None, vec![2.0], None).unwrap();
        assert_eq!(next, VectorId::Int(11));
    }

    #[test]
    fn first_insert_sets_default_dimension() {
        let mut store = VectorStore::new();
        store.add_vector(None, vec![1.0, 2.0, 3.0], None).unwrap();
        assert_eq!(store.default_dimension(), Some(3));
    }

    #[test]
    fn delete_removes_vector_and_metadata() {
        let mut store = VectorStore::new();
        let mut meta = Metadata::new();
        meta.insert("k".into(), MetadataValue::from("v"));
        let id = store.add_vector(None, vec![1.0], Some(meta)).unwrap();
        assert!(store.delete_vector(&id).unwrap());
        assert!(!store.has_vector(&id));
        assert!(store.get_metadata(&id).is_none());
        assert!(!store.delete_vector(&id).unwrap());
    }

    #[test]
    fn find_nearest_respects_k_zero_and_filter() {
        let mut store = VectorStore::new();
        let a = store.add_vector(None, vec![0.0, 0.0], None).unwrap();
        store.add_vector(None, vec![10.0, 10.0], None).unwrap();

        assert!(store
            .find_nearest(&[0.0, 0.0], 0, DistanceMetric::Euclidean, None)
            .is_empty());

        let results = store.find_nearest(&[0.0, 0.0], 5, DistanceMetric::Euclidean, None);
        assert_eq!(results[0].0, a);
        assert_eq!(results[0].1, 0.0);

        let only_far: &FilterFn = &|id, _| *id != a;
        let filtered =
            store.find_nearest(&[0.0, 0.0], 5, DistanceMetric::Euclidean, Some(only_far));
        assert_eq!(filtered.len(), 1);
        assert_ne!(filtered[0].0, a);
    }

    #[test]
    fn update_metadata_is_idempotent() {
        let mut store = VectorStore::new();
        let id = store.add_vector(None, vec![1.0], None).unwrap();
        let mut patch = Metadata::new();
        patch.insert("tag".into(), MetadataValue::from("x"));
        store.update_metadata(&id, patch.clone()).unwrap();
        store.update_metadata(&id, patch).unwrap();
        assert_eq!(store.get_metadata(&id).unwrap().len(), 1);
    }

    #[test]
    fn save_then_load_round_trips_bitwise_equal_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = VectorStore::with_path(dir.path(), false);
        let mut meta = Metadata::new();
        meta.insert("name".into(), MetadataValue::from("first"));
        let id = store
            .add_vector(None, vec![1.5, -2.25, 3.0], Some(meta.clone()))
            .unwrap();
        store.save().unwrap();

        let mut reloaded = VectorStore::with_path(dir.path(), false);
        reloaded.load().unwrap();
        assert_eq!(reloaded.get_vector(&id), Some([1.5, -2.25, 3.0].as_slice()));
        assert_eq!(reloaded.get_metadata(&id), Some(&meta));
    }

    #[test]
    fn save_then_load_round_trips_with_compression() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = VectorStore::with_path(dir.path(), true);
        let id = store.add_vector(None, vec![9.0, 8.0], None).unwrap();
        store.save().unwrap();

        let mut reloaded = VectorStore::with_path(dir.path(), true);
        reloaded.load().unwrap();
        assert_eq!(reloaded.get_vector(&id), Some([9.0, 8.0].as_slice()));
    }

    #[test]
    fn closed_store_rejects_mutation() {
        let mut store = VectorStore::new();
        store.close().unwrap();
        assert!(store.close().is_ok());
        assert!(matches!(
            store.add_vector(None, vec![1.0], None),
            Err(StoreError::Closed)
        ));
    }

    #[test]
    fn load_of_missing_database_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = VectorStore::with_path(dir.path(), false);
        assert!(store.load().is_ok());
        assert!(store.is_empty());
    }
}
