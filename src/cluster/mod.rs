//! Clustered Store: wraps the Vector Store, maintaining a dynamic set of
//! centroids that routes insert/search through cluster assignment, with an
//! optional k-means rebuild.
//!
//! Persists to `data/cluster.json` alongside the Vector Store's own
//! `data/meta.json`, following the same versioned-record discipline.

use crate::config::ClusterOptions;
use crate::error::{ClusterError, StoreError};
use crate::id::VectorId;
use crate::metadata::{FilterFn, Metadata};
use crate::metric::DistanceMetric;
use crate::persist::{self, FORMAT_VERSION};
use crate::store::VectorStore;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

/// Identifies one cluster within a single Clustered Store.
pub type ClusterKey = u32;

#[derive(Serialize, Deserialize)]
struct ClusterFile {
    version: u32,
    #[serde(rename = "clusterIdCounter")]
    cluster_id_counter: ClusterKey,
    clusters: Vec<(ClusterKey, Vec<VectorId>)>,
    #[serde(rename = "clusterCentroids")]
    cluster_centroids: Vec<(ClusterKey, Vec<f32>)>,
    #[serde(rename = "clusterDimensions")]
    cluster_dimensions: Vec<(ClusterKey, u32)>,
}

/// A cluster lifecycle change, queued for the owner (the Partition
/// Manager) to translate into `cluster:create`/`cluster:delete` events.
/// Keeping the Clustered Store itself event-free makes it independently
/// testable without wiring an emitter through every call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterEvent {
    /// A new cluster was opened.
    Created(ClusterKey),
    /// A cluster was emptied and removed.
    Deleted(ClusterKey),
}

/// Wraps a [`VectorStore`] with dynamic centroid-based cluster assignment.
pub struct ClusteredStore {
    store: VectorStore,
    path: Option<PathBuf>,
    use_compression: bool,
    options: ClusterOptions,
    clusters: BTreeMap<ClusterKey, Vec<VectorId>>,
    centroids: BTreeMap<ClusterKey, Vec<f32>>,
    cluster_dimensions: BTreeMap<ClusterKey, u32>,
    member_of: HashMap<VectorId, ClusterKey>,
    cluster_id_counter: ClusterKey,
    pending_events: Vec<ClusterEvent>,
}

impl ClusteredStore {
    /// Creates an empty, unbacked Clustered Store.
    #[must_use]
    pub fn new(options: ClusterOptions) -> Self {
        Self {
            store: VectorStore::new(),
            path: None,
            use_compression: false,
            options,
            clusters: BTreeMap::new(),
            centroids: BTreeMap::new(),
            cluster_dimensions: BTreeMap::new(),
            member_of: HashMap::new(),
            cluster_id_counter: 0,
            pending_events: Vec::new(),
        }
    }

    /// Creates an empty Clustered Store backed by `dir`.
    #[must_use]
    pub fn with_path(dir: impl Into<PathBuf>, options: ClusterOptions, use_compression: bool) -> Self {
        let dir = dir.into();
        Self {
            store: VectorStore::with_path(dir.clone(), use_compression),
            path: Some(dir),
            use_compression,
            ..Self::new(options)
        }
    }

    /// Number of live vectors across every cluster.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// `true` if the store holds no vectors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Number of open clusters.
    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Drains queued cluster lifecycle events since the last call.
    pub fn take_events(&mut self) -> Vec<ClusterEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Read-only view of the configured clustering knobs.
    #[must_use]
    pub fn options(&self) -> &ClusterOptions {
        &self.options
    }

    /// Iterates over every live `(id, vector)` pair, independent of cluster
    /// membership. Used by the Partition Manager's `buildIndexHNSW` to seed
    /// a fresh HNSW index from the current vector population.
    pub fn iter(&self) -> impl Iterator<Item = (&VectorId, &[f32])> {
        self.store.iter()
    }

    /// Adds a vector, routing it through cluster assignment.
    ///
    /// # Errors
    /// Propagates [`StoreError`] from the underlying Vector Store.
    pub fn add_vector(
        &mut self,
        id: Option<VectorId>,
        vector: Vec<f32>,
        metadata: Option<Metadata>,
    ) -> Result<VectorId, ClusterError> {
        let id = self.store.add_vector(id, vector.clone(), metadata)?;
        self.assign(id.clone(), &vector);
        Ok(id)
    }

    /// Returns the vector for `id`, if live.
    #[must_use]
    pub fn get_vector(&self, id: &VectorId) -> Option<&[f32]> {
        self.store.get_vector(id)
    }

    /// `true` if `id` names a live vector.
    #[must_use]
    pub fn has_vector(&self, id: &VectorId) -> bool {
        self.store.has_vector(id)
    }

    /// Returns `id`'s metadata, if any.
    #[must_use]
    pub fn get_metadata(&self, id: &VectorId) -> Option<&Metadata> {
        self.store.get_metadata(id)
    }

    /// Merges `patch` into `id`'s metadata. Returns `false` if unknown.
    ///
    /// # Errors
    /// Propagates [`StoreError`] from the underlying Vector Store.
    pub fn update_metadata(&mut self, id: &VectorId, patch: Metadata) -> Result<bool, ClusterError> {
        Ok(self.store.update_metadata(id, patch)?)
    }

    /// Replaces `id`'s vector wholesale, re-running cluster assignment as
    /// if the vector had been deleted and re-added.
    ///
    /// # Errors
    /// Propagates [`StoreError`] from the underlying Vector Store.
    pub fn update_vector(&mut self, id: &VectorId, vector: Vec<f32>) -> Result<bool, ClusterError> {
        if !self.store.has_vector(id) {
            return Ok(false);
        }
        let old_vector = self.store.get_vector(id).map(<[f32]>::to_vec);
        self.store.update_vector(id, vector.clone())?;
        self.remove_membership(id, old_vector);
        self.assign(id.clone(), &vector);
        Ok(true)
    }

    /// Removes a vector: splices it out of its owning cluster, updates
    /// that cluster's centroid incrementally (or recomputes on dimension
    /// mismatch), and deletes the cluster entirely if it becomes empty.
    ///
    /// # Errors
    /// Propagates [`StoreError`] from the underlying Vector Store.
    pub fn delete_vector(&mut self, id: &VectorId) -> Result<bool, ClusterError> {
        let vector = self.store.get_vector(id).map(<[f32]>::to_vec);
        let removed = self.store.delete_vector(id)?;
        if !removed {
            return Ok(false);
        }
        self.remove_membership(id, vector);
        Ok(true)
    }

    /// Centroid-pruned search: ranks clusters by centroid distance, walks
    /// them nearest-first accumulating candidate ids until at least `k`
    /// have been gathered (this is the "centroid pruning" the Clustered
    /// Store is named for — clusters past that point are never
    /// distance-computed member-by-member), then runs exact distance over
    /// the candidate set.
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
        if self.clusters.is_empty() {
            return self.store.find_nearest(query, k, metric, filter);
        }

        let mut ranked: Vec<(ClusterKey, f32)> = self
            .centroids
            .iter()
            .filter(|(_, c)| !metric.requires_equal_dimension() || c.len() == query.len())
            .map(|(key, c)| (*key, metric.distance(query, c)))
            .collect();
        if ranked.is_empty() {
            return Vec::new();
        }
        ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut seen = HashSet::new();
        let mut candidates: Vec<VectorId> = Vec::new();
        for (key, _) in ranked {
            if candidates.len() >= k {
                break;
            }
            if let Some(members) = self.clusters.get(&key) {
                for id in members {
                    if seen.insert(id.clone()) {
                        candidates.push(id.clone());
                    }
                }
            }
        }

        let mut scored: Vec<(VectorId, f32)> = candidates
            .into_iter()
            .filter(|id| filter.map_or(true, |f| f(id, self.store.get_metadata(id))))
            .filter_map(|id| {
                self.store
                    .get_vector(&id)
                    .map(|v| (id.clone(), metric.distance(query, v)))
            })
            .collect();
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }

    /// Rebuilds the cluster set from scratch via Lloyd's-algorithm k-means
    /// over the current vector population. `k` defaults to the current
    /// cluster count (minimum 1); `max_iter` defaults to
    /// `kmeansMaxIterations`. Centroids that end with zero members are
    /// dropped.
    ///
    /// Deterministic centroid seeding uses a fixed-seed `ChaCha8Rng`, so a
    /// given vector population always converges to the same clustering.
    pub fn run_kmeans(&mut self, k: Option<u32>, max_iter: Option<u32>) {
        let k = k.unwrap_or_else(|| (self.clusters.len() as u32).max(1));
        let max_iter = max_iter.unwrap_or(self.options.kmeans_max_iterations);
        let metric = self.options.distance_metric;

        let ids: Vec<VectorId> = self.store.iter().map(|(id, _)| id.clone()).collect();
        if ids.is_empty() {
            return;
        }

        let mut rng = ChaCha8Rng::seed_from_u64(0x5EED_BEEF);
        let mut order: Vec<usize> = (0..ids.len()).collect();
        order.shuffle(&mut rng);
        let mut centroids: Vec<Vec<f32>> = order
            .into_iter()
            .take(k as usize)
            .map(|i| self.store.get_vector(&ids[i]).expect("id from iter").to_vec())
            .collect();

        let mut assignment = vec![0usize; ids.len()];
        for _ in 0..max_iter.max(1) {
            let mut changed = false;
            for (i, id) in ids.iter().enumerate() {
                let v = self.store.get_vector(id).expect("id from iter");
                let mut best = 0usize;
                let mut best_dist = f32::INFINITY;
                for (ci, centroid) in centroids.iter().enumerate() {
                    if metric.requires_equal_dimension() && centroid.len() != v.len() {
                        continue;
                    }
                    let d = metric.distance(v, centroid);
                    if d < best_dist {
                        best_dist = d;
                        best = ci;
                    }
                }
                if assignment[i] != best {
                    changed = true;
                }
                assignment[i] = best;
            }

            let mut sums: Vec<Vec<f32>> = vec![Vec::new(); centroids.len()];
            let mut counts = vec![0u32; centroids.len()];
            for (i, id) in ids.iter().enumerate() {
                let v = self.store.get_vector(id).expect("id from iter");
                let ci = assignment[i];
                if sums[ci].is_empty() {
                    sums[ci] = vec![0.0; v.len()];
                }
                if sums[ci].len() == v.len() {
                    for (s, x) in sums[ci].iter_mut().zip(v.iter()) {
                        *s += x;
                    }
                    counts[ci] += 1;
                }
            }
            for ci in 0..centroids.len() {
                if counts[ci] > 0 {
                    for s in &mut sums[ci] {
                        *s /= counts[ci] as f32;
                    }
                    centroids[ci] = sums[ci].clone();
                }
            }
            if !changed {
                break;
            }
        }

        let old_keys: Vec<ClusterKey> = self.clusters.keys().copied().collect();
        let mut new_clusters: BTreeMap<ClusterKey, Vec<VectorId>> = BTreeMap::new();
        let mut key_for_centroid: HashMap<usize, ClusterKey> = HashMap::new();
        let mut next_key = self.cluster_id_counter;
        for (i, id) in ids.iter().enumerate() {
            let ci = assignment[i];
            let key = *key_for_centroid.entry(ci).or_insert_with(|| {
                let key = next_key;
                next_key += 1;
                key
            });
            new_clusters.entry(key).or_default().push(id.clone());
        }

        let mut new_centroids = BTreeMap::new();
        let mut new_dims = BTreeMap::new();
        for (ci, key) in &key_for_centroid {
            if new_clusters.get(key).map_or(true, Vec::is_empty) {
                continue;
            }
            new_centroids.insert(*key, centroids[*ci].clone());
            new_dims.insert(*key, centroids[*ci].len() as u32);
        }
        // drop centroids whose cluster ended up empty
        new_clusters.retain(|_, members| !members.is_empty());

        let new_member_of = new_clusters
            .iter()
            .flat_map(|(key, members)| members.iter().map(move |id| (id.clone(), *key)))
            .collect();

        for key in old_keys {
            self.pending_events.push(ClusterEvent::Deleted(key));
        }
        for key in new_clusters.keys() {
            self.pending_events.push(ClusterEvent::Created(*key));
        }

        self.clusters = new_clusters;
        self.centroids = new_centroids;
        self.cluster_dimensions = new_dims;
        self.member_of = new_member_of;
        self.cluster_id_counter = next_key;
    }

    /// All unordered pairs whose distance is `<= threshold`;
    /// dimension-mismatched pairs under a dimension-strict metric are
    /// skipped.
    #[must_use]
    pub fn extract_relationships(
        &self,
        threshold: f32,
        metric: DistanceMetric,
    ) -> Vec<(VectorId, VectorId, f32, Option<Metadata>, Option<Metadata>)> {
        let ids: Vec<&VectorId> = self.store.iter().map(|(id, _)| id).collect();
        let mut out = Vec::new();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let (a, b) = (ids[i], ids[j]);
                let va = self.store.get_vector(a).expect("id from iter");
                let vb = self.store.get_vector(b).expect("id from iter");
                if metric.requires_equal_dimension() && va.len() != vb.len() {
                    continue;
                }
                let d = metric.distance(va, vb);
                if d <= threshold {
                    out.push((
                        a.clone(),
                        b.clone(),
                        d,
                        self.store.get_metadata(a).cloned(),
                        self.store.get_metadata(b).cloned(),
                    ));
                }
            }
        }
        out
    }

    /// Connected components (size >= 2) of the undirected "within
    /// threshold" graph. Pruned by the triangle-inequality bound: only
    /// vectors whose clusters' centroids are within `2 * threshold` of
    /// each other are ever paired.
    #[must_use]
    pub fn extract_communities(&self, threshold: f32, metric: DistanceMetric) -> Vec<Vec<VectorId>> {
        let keys: Vec<ClusterKey> = self.centroids.keys().copied().collect();
        let mut reachable: HashSet<(ClusterKey, ClusterKey)> = HashSet::new();
        for &key in &keys {
            reachable.insert((key, key));
        }
        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                let (ka, kb) = (keys[i], keys[j]);
                let ca = &self.centroids[&ka];
                let cb = &self.centroids[&kb];
                if metric.requires_equal_dimension() && ca.len() != cb.len() {
                    continue;
                }
                if metric.distance(ca, cb) <= 2.0 * threshold {
                    reachable.insert((ka, kb));
                    reachable.insert((kb, ka));
                }
            }
        }

        let mut adjacency: HashMap<VectorId, Vec<VectorId>> = HashMap::new();
        for (&ka, members_a) in &self.clusters {
            for (&kb, members_b) in &self.clusters {
                if ka > kb || !reachable.contains(&(ka, kb)) {
                    continue;
                }
                for a in members_a {
                    for b in members_b {
                        if a == b {
                            continue;
                        }
                        let va = self.store.get_vector(a).expect("member is live");
                        let vb = self.store.get_vector(b).expect("member is live");
                        if metric.requires_equal_dimension() && va.len() != vb.len() {
                            continue;
                        }
                        if metric.distance(va, vb) <= threshold {
                            adjacency.entry(a.clone()).or_default().push(b.clone());
                            adjacency.entry(b.clone()).or_default().push(a.clone());
                        }
                    }
                }
            }
        }

        let mut visited: HashSet<VectorId> = HashSet::new();
        let mut communities = Vec::new();
        for id in adjacency.keys() {
            if visited.contains(id) {
                continue;
            }
            let mut stack = vec![id.clone()];
            let mut component = Vec::new();
            visited.insert(id.clone());
            while let Some(cur) = stack.pop() {
                component.push(cur.clone());
                if let Some(neighbors) = adjacency.get(&cur) {
                    for n in neighbors {
                        if visited.insert(n.clone()) {
                            stack.push(n.clone());
                        }
                    }
                }
            }
            if component.len() >= 2 {
                component.sort();
                communities.push(component);
            }
        }
        communities
    }

    /// Writes `data/meta.json`, `data/vec.bin`, and `data/cluster.json`.
    ///
    /// # Errors
    /// Propagates I/O/serialization errors from either file.
    pub fn save(&mut self) -> Result<(), ClusterError> {
        self.store.save()?;
        let Some(dir) = self.path.clone() else {
            return Ok(());
        };
        let file = ClusterFile {
            version: FORMAT_VERSION,
            cluster_id_counter: self.cluster_id_counter,
            clusters: self.clusters.iter().map(|(k, v)| (*k, v.clone())).collect(),
            cluster_centroids: self.centroids.iter().map(|(k, v)| (*k, v.clone())).collect(),
            cluster_dimensions: self.cluster_dimensions.iter().map(|(k, v)| (*k, *v)).collect(),
        };
        let path = dir.join("data").join("cluster.json");
        persist::write_json(&path, &file, self.use_compression)?;
        Ok(())
    }

    /// Loads `data/meta.json`, `data/vec.bin`, and `data/cluster.json`.
    /// A missing `cluster.json` leaves the cluster set empty (fresh
    /// database), not an error.
    ///
    /// # Errors
    /// Returns [`ClusterError::UnsupportedVersion`] if the on-disk version
    /// is not 1, or propagates I/O/serialization errors.
    pub fn load(&mut self) -> Result<(), ClusterError> {
        self.store.load()?;
        let Some(dir) = self.path.clone() else {
            return Ok(());
        };
        let path = dir.join("data").join("cluster.json");
        let file: Option<ClusterFile> = persist::read_json(&path, self.use_compression)?;
        let Some(file) = file else {
            return Ok(());
        };
        if file.version != FORMAT_VERSION {
            return Err(ClusterError::UnsupportedVersion(file.version));
        }
        self.cluster_id_counter = file.cluster_id_counter;
        self.clusters = file.clusters.into_iter().collect();
        self.centroids = file.cluster_centroids.into_iter().collect();
        self.cluster_dimensions = file.cluster_dimensions.into_iter().collect();
        self.member_of = self
            .clusters
            .iter()
            .flat_map(|(key, members)| members.iter().map(move |id| (id.clone(), *key)))
            .collect();
        Ok(())
    }

    /// Closes the underlying Vector Store (one final save, then clears
    /// in-memory state), and clears the cluster maps.
    ///
    /// # Errors
    /// Propagates any error from the final `save()`.
    pub fn close(&mut self) -> Result<(), ClusterError> {
        self.store.close()?;
        self.clusters.clear();
        self.centroids.clear();
        self.cluster_dimensions.clear();
        self.member_of.clear();
        Ok(())
    }

    fn assign(&mut self, id: VectorId, vector: &[f32]) {
        if self.clusters.is_empty() {
            self.open_cluster(id, vector.to_vec());
            return;
        }

        let metric = self.options.distance_metric;
        let mut best: Option<(ClusterKey, f32)> = None;
        for (&key, centroid) in &self.centroids {
            if metric.requires_equal_dimension() && centroid.len() != vector.len() {
                continue;
            }
            let d = metric.distance(vector, centroid);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((key, d));
            }
        }

        let Some((k_star, min_dist)) = best else {
            self.open_cluster(id, vector.to_vec());
            return;
        };

        let within_cap = (self.clusters.len() as u32) < self.options.max_clusters;
        let members_k = self.clusters.get(&k_star).map_or(0, Vec::len);
        let too_big = (members_k as f32)
            >= (self.options.cluster_size as f32 * self.options.new_cluster_threshold_factor);
        let too_far = min_dist > self.options.new_cluster_distance_threshold;

        if within_cap && (too_big || too_far) {
            self.open_cluster(id, vector.to_vec());
        } else {
            self.append_to_cluster(k_star, id, vector);
        }
    }

    fn open_cluster(&mut self, id: VectorId, vector: Vec<f32>) {
        let key = self.cluster_id_counter;
        self.cluster_id_counter += 1;
        self.cluster_dimensions.insert(key, vector.len() as u32);
        self.centroids.insert(key, vector);
        self.clusters.insert(key, vec![id.clone()]);
        self.member_of.insert(id, key);
        self.pending_events.push(ClusterEvent::Created(key));
    }

    fn append_to_cluster(&mut self, key: ClusterKey, id: VectorId, vector: &[f32]) {
        let members = self.clusters.entry(key).or_default();
        members.push(id.clone());
        self.member_of.insert(id, key);
        let n_new = members.len() as f32;
        let n_old = n_new - 1.0;

        let dim_ok = self.cluster_dimensions.get(&key).copied() == Some(vector.len() as u32);
        if dim_ok {
            if let Some(centroid) = self.centroids.get_mut(&key) {
                for (c, v) in centroid.iter_mut().zip(vector.iter()) {
                    *c = (*c * n_old + *v) / n_new;
                }
            }
        } else {
            self.recompute_centroid(key);
        }
    }

    fn remove_membership(&mut self, id: &VectorId, vector_before: Option<Vec<f32>>) {
        let Some(key) = self.member_of.remove(id) else {
            return;
        };
        let Some(members) = self.clusters.get_mut(&key) else {
            return;
        };
        if let Some(pos) = members.iter().position(|m| m == id) {
            members.remove(pos);
        }
        let remaining = members.len();

        if remaining == 0 {
            self.clusters.remove(&key);
            self.centroids.remove(&key);
            self.cluster_dimensions.remove(&key);
            self.pending_events.push(ClusterEvent::Deleted(key));
            return;
        }

        let dims_match = vector_before
            .as_ref()
            .zip(self.centroids.get(&key))
            .is_some_and(|(v, c)| v.len() == c.len());
        if dims_match {
            let vector = vector_before.expect("checked above");
            if let Some(centroid) = self.centroids.get_mut(&key) {
                let n_new = remaining as f32;
                let n_old = n_new + 1.0;
                for (c, v) in centroid.iter_mut().zip(vector.iter()) {
                    *c = (*c * n_old - *v) / n_new;
                }
            }
        } else {
            self.recompute_centroid(key);
        }
    }

    /// Full recomputation from stored members, triggered on a
    /// centroid/vector dimension mismatch. Members whose dimension
    /// disagrees with the cluster's most common dimension are logged and
    /// skipped rather than aborting the recomputation.
    fn recompute_centroid(&mut self, key: ClusterKey) {
        let Some(members) = self.clusters.get(&key) else {
            return;
        };
        let mut dim_counts: HashMap<usize, u32> = HashMap::new();
        for id in members {
            if let Some(v) = self.store.get_vector(id) {
                *dim_counts.entry(v.len()).or_insert(0) += 1;
            }
        }
        let Some((&target_dim, _)) = dim_counts.iter().max_by_key(|(_, count)| **count) else {
            return;
        };

        let mut sum = vec![0.0f32; target_dim];
        let mut n = 0u32;
        for id in members {
            let Some(v) = self.store.get_vector(id) else {
                continue;
            };
            if v.len() == target_dim {
                for (s, x) in sum.iter_mut().zip(v.iter()) {
                    *s += x;
                }
                n += 1;
            } else {
                log::warn!(
                    "cluster {key}: member {id} has dimension {} (cluster recomputed at {target_dim}); skipped",
                    v.len()
                );
            }
        }
        if n > 0 {
            for s in &mut sum {
                *s /= n as f32;
            }
            self.centroids.insert(key, sum);
            self.cluster_dimensions.insert(key, target_dim as u32);
        }
    }
}

impl crate::hnsw::VectorSource for ClusteredStore {
    fn vector(&self, id: &VectorId) -> Option<&[f32]> {
        self.get_vector(id)
    }

    fn metadata(&self, id: &VectorId) -> Option<&Metadata> {
        self.get_metadata(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ClusterOptions {
        ClusterOptions {
            cluster_size: 2,
            new_cluster_threshold_factor: 1.5,
            new_cluster_distance_threshold: 0.3,
            max_clusters: 1000,
            distance_metric: DistanceMetric::Euclidean,
            kmeans_max_iterations: 50,
        }
    }

    #[test]
    fn first_vector_opens_a_cluster() {
        let mut cs = ClusteredStore::new(opts());
        cs.add_vector(None, vec![0.0, 0.0], None).unwrap();
        assert_eq!(cs.cluster_count(), 1);
    }

    #[test]
    fn far_vector_opens_new_cluster_near_one_appends() {
        let mut cs = ClusteredStore::new(opts());
        cs.add_vector(None, vec![0.0, 0.0], None).unwrap();
        cs.add_vector(None, vec![0.1, 0.0], None).unwrap();
        assert_eq!(cs.cluster_count(), 1, "within threshold should append");
        cs.add_vector(None, vec![10.0, 10.0], None).unwrap();
        assert_eq!(cs.cluster_count(), 2, "far vector should open a cluster");
    }

    #[test]
    fn deleting_last_member_removes_cluster() {
        let mut cs = ClusteredStore::new(opts());
        let id = cs.add_vector(None, vec![0.0, 0.0], None).unwrap();
        assert_eq!(cs.cluster_count(), 1);
        cs.delete_vector(&id).unwrap();
        assert_eq!(cs.cluster_count(), 0);
    }

    #[test]
    fn find_nearest_prefers_near_cluster() {
        let mut cs = ClusteredStore::new(opts());
        cs.add_vector(None, vec![0.0, 0.0], None).unwrap();
        cs.add_vector(None, vec![0.1, 0.0], None).unwrap();
        cs.add_vector(None, vec![0.0, 0.1], None).unwrap();
        cs.add_vector(None, vec![10.0, 10.0], None).unwrap();
        cs.add_vector(None, vec![10.1, 10.0], None).unwrap();
        cs.add_vector(None, vec![10.0, 10.1], None).unwrap();

        let results = cs.find_nearest(&[9.95, 10.0], 2, DistanceMetric::Euclidean, None);
        assert_eq!(results.len(), 2);
        for (_, dist) in &results {
            assert!(*dist < 5.0, "expected results from the near cluster only");
        }
    }

    #[test]
    fn kmeans_converges_to_requested_cluster_count() {
        let mut cs = ClusteredStore::new(opts());
        for i in 0..10 {
            let base = if i < 5 { 0.0 } else { 5.0 };
            cs.add_vector(
                None,
                vec![base + (i as f32) * 0.01, base + (i as f32) * 0.01],
                None,
            )
            .unwrap();
        }
        cs.run_kmeans(Some(2), Some(20));
        assert_eq!(cs.cluster_count(), 2);
    }

    #[test]
    fn save_then_load_preserves_clusters() {
        let dir = tempfile::tempdir().unwrap();
        let mut cs = ClusteredStore::with_path(dir.path(), opts(), false);
        cs.add_vector(None, vec![0.0, 0.0], None).unwrap();
        cs.add_vector(None, vec![10.0, 10.0], None).unwrap();
        let clusters_before = cs.cluster_count();
        cs.save().unwrap();

        let mut reloaded = ClusteredStore::with_path(dir.path(), opts(), false);
        reloaded.load().unwrap();
        assert_eq!(reloaded.cluster_count(), clusters_before);
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn extract_relationships_respects_threshold() {
        let mut cs = ClusteredStore::new(opts());
        let a = cs.add_vector(None, vec![0.0, 0.0], None).unwrap();
        let b = cs.add_vector(None, vec![0.05, 0.0], None).unwrap();
        cs.add_vector(None, vec![10.0, 10.0], None).unwrap();
        let pairs = cs.extract_relationships(0.1, DistanceMetric::Euclidean);
        assert_eq!(pairs.len(), 1);
        assert!(
            (pairs[0].0 == a && pairs[0].1 == b) || (pairs[0].0 == b && pairs[0].1 == a)
        );
    }

    #[test]
    fn extract_communities_groups_connected_points() {
        let mut cs = ClusteredStore::new(opts());
        cs.add_vector(None, vec![0.0, 0.0], None).unwrap();
        cs.add_vector(None, vec![0.05, 0.0], None).unwrap();
        cs.add_vector(None, vec![0.0, 0.05], None).unwrap();
        cs.add_vector(None, vec![10.0, 10.0], None).unwrap();
        let communities = cs.extract_communities(0.1, DistanceMetric::Euclidean);
        assert_eq!(communities.len(), 1);
        assert_eq!(communities[0].len(), 3);
    }
}
