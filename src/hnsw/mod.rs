//! HNSW Index: a per-partition approximate nearest-neighbor
//! graph layered on top of whichever store holds the actual vectors.
//!
//! Each node's per-level neighbor list is stored directly as
//! `BTreeMap<u16, Vec<VectorId>>`, keeping node addressing in the same
//! `VectorId` space the rest of the crate uses rather than a separate
//! packed node-id representation.

use crate::error::GraphError;
use crate::id::VectorId;
use crate::metadata::{FilterFn, Metadata};
use crate::metric::DistanceMetric;
use crate::config::HnswOptions;
use crate::persist::{self, FORMAT_VERSION};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::path::PathBuf;

/// Supplies the raw vector backing a [`VectorId`] so the index never has to
/// own vector storage itself.
pub trait VectorSource {
    /// Returns the vector for `id`, if still live in the backing store.
    fn vector(&self, id: &VectorId) -> Option<&[f32]>;

    /// Returns `id`'s metadata, if any. Defaults to `None` so a minimal
    /// `VectorSource` (e.g. a test fixture backed by a plain vector map)
    /// need not implement it to satisfy [`HnswIndex::search`]'s filter.
    fn metadata(&self, _id: &VectorId) -> Option<&Metadata> {
        None
    }
}

/// Snapshot of one index's configuration and size, returned by
/// [`HnswIndex::get_stats`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HnswStats {
    /// Total nodes, including soft-deleted ones.
    pub node_count: usize,
    /// Configured max connections per node.
    pub m: u16,
    /// Configured insertion beam width.
    pub ef_construction: usize,
    /// Configured default search beam width.
    pub ef_search: usize,
    /// `true` if the index tracks one entry point per vector dimension.
    pub dimension_aware: bool,
}

/// One graph node: the levels it participates in, and (per level) its
/// neighbor list. Soft-deleted nodes stay in the graph for routing but are
/// filtered out of search results.
#[derive(Clone, Serialize, Deserialize)]
struct HnswNode {
    level: u16,
    connections: BTreeMap<u16, Vec<VectorId>>,
    deleted: bool,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    m: u16,
    ef_construction: usize,
    max_level: u16,
    dimension_aware: bool,
    dimension: Option<u32>,
    entry_point: Option<VectorId>,
    dimension_entry_points: Vec<(u32, VectorId)>,
    nodes: Vec<(VectorId, HnswNode)>,
}

/// A per-partition HNSW graph. Holds no vectors of its own; every distance
/// computation goes through a caller-supplied [`VectorSource`].
pub struct HnswIndex {
    options: HnswOptions,
    metric: DistanceMetric,
    nodes: HashMap<VectorId, HnswNode>,
    entry_point: Option<VectorId>,
    dimension_entry_points: HashMap<u32, VectorId>,
    /// Dimension of the first vector ever inserted, used to reject
    /// mismatched inserts when `dimension_aware` is off.
    dimension: Option<u32>,
    rng: ChaCha8Rng,
    path: Option<PathBuf>,
    use_compression: bool,
}

impl HnswIndex {
    /// Creates an empty, unbacked index.
    #[must_use]
    pub fn new(options: HnswOptions, metric: DistanceMetric) -> Self {
        Self {
            options,
            metric,
            nodes: HashMap::new(),
            entry_point: None,
            dimension_entry_points: HashMap::new(),
            dimension: None,
            rng: ChaCha8Rng::seed_from_u64(0x5EED_BEEF),
            path: None,
            use_compression: false,
        }
    }

    /// Creates an empty index backed by `dir`'s `hnsw/` subtree.
    #[must_use]
    pub fn with_path(
        dir: impl Into<PathBuf>,
        options: HnswOptions,
        metric: DistanceMetric,
        use_compression: bool,
    ) -> Self {
        Self {
            path: Some(dir.into()),
            use_compression,
            ..Self::new(options, metric)
        }
    }

    /// Number of nodes in the graph, including soft-deleted ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` if the graph has no nodes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `true` if `id` names a live (non-deleted) node.
    #[must_use]
    pub fn contains(&self, id: &VectorId) -> bool {
        self.nodes.get(id).is_some_and(|n| !n.deleted)
    }

    fn level_mult(&self) -> f32 {
        let m = f32::from(self.options.m);
        if m > 1.0 {
            1.0 / m.ln()
        } else {
            0.0
        }
    }

    /// Draws a random level via `floor(-ln(U(0,1)) / ln(M))`, clamped to
    /// `maxLevel`.
    fn random_level(&mut self) -> u16 {
        let r: f32 = self.rng.gen_range(f32::EPSILON..=1.0);
        let level = (-r.ln() * self.level_mult()).floor();
        if level < 0.0 {
            0
        } else {
            (level as u16).min(self.options.max_level)
        }
    }

    fn entry_for(&self, dim: usize) -> Option<VectorId> {
        if self.options.dimension_aware {
            self.dimension_entry_points.get(&(dim as u32)).cloned()
        } else {
            self.entry_point.clone()
        }
    }

    fn set_entry(&mut self, id: VectorId, dim: usize, level: u16) {
        if self.options.dimension_aware {
            let key = dim as u32;
            let replace = self
                .dimension_entry_points
                .get(&key)
                .and_then(|cur| self.nodes.get(cur))
                .map_or(true, |cur_node| level >= cur_node.level);
            if replace {
                self.dimension_entry_points.insert(key, id);
            }
        } else {
            let replace = self
                .entry_point
                .as_ref()
                .and_then(|cur| self.nodes.get(cur))
                .map_or(true, |cur_node| level >= cur_node.level);
            if replace {
                self.entry_point = Some(id);
            }
        }
    }

    /// Inserts a new node and wires it into the graph: greedy descent from
    /// the entry point down to `level + 1`, then a bounded beam search plus
    /// heuristic neighbor selection at every level from `level` down to 0,
    /// connecting bidirectionally and pruning each side back to `M`.
    ///
    /// # Errors
    /// Returns [`GraphError::DimensionMismatch`] if `dimension_aware` is
    /// off and `vector`'s dimension disagrees with an existing node's.
    pub fn insert(
        &mut self,
        id: VectorId,
        vector: &[f32],
        source: &dyn VectorSource,
    ) -> Result<(), GraphError> {
        if !self.options.dimension_aware {
            match self.dimension {
                Some(expected) if expected as usize != vector.len() => {
                    return Err(GraphError::DimensionMismatch {
                        expected: expected as usize,
                        actual: vector.len(),
                    });
                }
                None => self.dimension = Some(vector.len() as u32),
                _ => {}
            }
        }

        let level = self.random_level();
        self.nodes.insert(
            id.clone(),
            HnswNode {
                level,
                connections: BTreeMap::new(),
                deleted: false,
            },
        );

        let Some(mut ep) = self.entry_for(vector.len()) else {
            self.set_entry(id, vector.len(), level);
            return Ok(());
        };
        if ep == id {
            return Ok(());
        }

        let ep_level = self.nodes.get(&ep).map_or(0, |n| n.level);
        for lc in ((level + 1)..=ep_level).rev() {
            let beam = self.search_layer(vector, &[ep.clone()], 1, lc, source, true);
            if let Some(best) = beam.first() {
                ep = best.0.clone();
            }
        }

        let start_level = level.min(ep_level);
        let mut curr_ep = ep;
        for lc in (0..=start_level).rev() {
            let ef = self.options.ef_construction;
            let beam = self.search_layer(vector, &[curr_ep.clone()], ef, lc, source, true);
            if let Some(best) = beam.first() {
                curr_ep = best.0.clone();
            }

            let m_max = self.options.m as usize;
            let selected = self.select_neighbors(vector, &beam, m_max, source);
            for neighbor in &selected {
                self.connect(&id, neighbor, lc, m_max, source);
                self.connect(neighbor, &id, lc, m_max, source);
            }
        }

        self.set_entry(id, vector.len(), level);
        Ok(())
    }

    /// Heuristic "closer to an already-selected neighbor than to the
    /// query" pruning: keeps the candidate list diverse rather than
    /// clustering every edge toward the single nearest point.
    fn select_neighbors(
        &self,
        query: &[f32],
        candidates: &[(VectorId, f32)],
        m: usize,
        source: &dyn VectorSource,
    ) -> Vec<VectorId> {
        let mut selected: Vec<VectorId> = Vec::new();
        for (cand_id, dist_q_c) in candidates {
            if selected.len() >= m {
                break;
            }
            let Some(cand_vec) = source.vector(cand_id) else {
                continue;
            };
            let mut closer_to_existing = false;
            for sel_id in &selected {
                if let Some(sel_vec) = source.vector(sel_id) {
                    if self.metric.distance(cand_vec, sel_vec) < *dist_q_c {
                        closer_to_existing = true;
                        break;
                    }
                }
            }
            if !closer_to_existing {
                selected.push(cand_id.clone());
            }
        }
        if selected.is_empty() {
            let _ = query;
            candidates.iter().take(m).map(|(id, _)| id.clone()).collect()
        } else {
            selected
        }
    }

    fn connect(
        &mut self,
        source_id: &VectorId,
        target_id: &VectorId,
        level: u16,
        m_max: usize,
        source: &dyn VectorSource,
    ) {
        let Some(node) = self.nodes.get(source_id) else {
            return;
        };
        if level > node.level {
            return;
        }

        let mut neighbors = self
            .nodes
            .get(source_id)
            .and_then(|n| n.connections.get(&level))
            .cloned()
            .unwrap_or_default();
        if neighbors.contains(target_id) {
            return;
        }
        neighbors.push(target_id.clone());

        if neighbors.len() > m_max {
            if let Some(source_vec) = source.vector(source_id) {
                let mut scored: Vec<(VectorId, f32)> = neighbors
                    .iter()
                    .filter_map(|n| source.vector(n).map(|v| (n.clone(), self.metric.distance(source_vec, v))))
                    .collect();
                scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
                neighbors = self.select_neighbors(source_vec, &scored, m_max, source);
            } else {
                neighbors.truncate(m_max);
            }
        }

        if let Some(node) = self.nodes.get_mut(source_id) {
            node.connections.insert(level, neighbors);
        }
    }

    /// Bounded beam search at one level: standard HNSW greedy expansion
    /// with a visited set and an `ef`-sized result frontier. Deleted nodes
    /// are still traversed (for connectivity) but excluded from the
    /// returned candidates unless `include_deleted` is set (used during
    /// insertion, where routing through a tombstone is fine).
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[VectorId],
        ef: usize,
        level: u16,
        source: &dyn VectorSource,
        include_deleted: bool,
    ) -> Vec<(VectorId, f32)> {
        let mut visited: HashSet<VectorId> = HashSet::new();
        let mut candidates: BinaryHeap<std::cmp::Reverse<ScoredId>> = BinaryHeap::new();
        let mut results: BinaryHeap<ScoredId> = BinaryHeap::new();

        for ep in entry_points {
            if let Some(v) = source.vector(ep) {
                let d = self.metric.distance(query, v);
                visited.insert(ep.clone());
                candidates.push(std::cmp::Reverse(ScoredId(d, ep.clone())));
                if include_deleted || !self.nodes.get(ep).is_some_and(|n| n.deleted) {
                    results.push(ScoredId(d, ep.clone()));
                }
            }
        }

        while let Some(std::cmp::Reverse(ScoredId(dist, current))) = candidates.pop() {
            if let Some(worst) = results.peek() {
                if results.len() >= ef.max(1) && dist > worst.0 {
                    break;
                }
            }
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            let Some(neighbors) = node.connections.get(&level) else {
                continue;
            };
            for neighbor in neighbors.clone() {
                if !visited.insert(neighbor.clone()) {
                    continue;
                }
                let Some(v) = source.vector(&neighbor) else {
                    continue;
                };
                let d = self.metric.distance(query, v);
                let worse_than_all = results.len() >= ef.max(1)
                    && results.peek().is_some_and(|w| d >= w.0);
                if !worse_than_all {
                    candidates.push(std::cmp::Reverse(ScoredId(d, neighbor.clone())));
                    if include_deleted || !self.nodes.get(&neighbor).is_some_and(|n| n.deleted) {
                        results.push(ScoredId(d, neighbor));
                        if results.len() > ef.max(1) {
                            results.pop();
                        }
                    }
                }
            }
        }

        let mut out: Vec<(VectorId, f32)> = results.into_iter().map(|s| (s.1, s.0)).collect();
        out.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        out
    }

    /// Approximate k-nearest-neighbor search. Falls back to a linear scan
    /// over every live node when there is no usable entry point (empty
    /// graph, or dimension-aware mode with no entry for this query's
    /// dimension), so a cold or freshly-rolled-over partition still returns
    /// correct results.
    #[must_use]
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef: Option<usize>,
        source: &dyn VectorSource,
    ) -> Vec<(VectorId, f32)> {
        self.search_filtered(query, k, ef, None, source)
    }

    /// Like [`search`], additionally suppressing any candidate that fails
    /// `filter`.
    ///
    /// [`search`]: HnswIndex::search
    #[must_use]
    pub fn search_filtered(
        &self,
        query: &[f32],
        k: usize,
        ef: Option<usize>,
        filter: Option<&FilterFn>,
        source: &dyn VectorSource,
    ) -> Vec<(VectorId, f32)> {
        if k == 0 {
            return Vec::new();
        }
        let Some(entry) = self.entry_for(query.len()) else {
            return self.linear_scan(query, k, filter, source);
        };
        let entry_level = self.nodes.get(&entry).map_or(0, |n| n.level);
        let mut curr_ep = entry;
        for lc in (1..=entry_level).rev() {
            let beam = self.search_layer(query, &[curr_ep.clone()], 1, lc, source, true);
            if let Some(best) = beam.first() {
                curr_ep = best.0.clone();
            }
        }
        let ef = ef.unwrap_or(self.options.ef_search).max(k);
        let mut results = self.search_layer(query, &[curr_ep], ef, 0, source, false);
        if let Some(filter) = filter {
            results.retain(|(id, _)| filter(id, source.metadata(id)));
        }
        results.truncate(k);
        results
    }

    fn linear_scan(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&FilterFn>,
        source: &dyn VectorSource,
    ) -> Vec<(VectorId, f32)> {
        let mut scored: Vec<(VectorId, f32)> = self
            .nodes
            .iter()
            .filter(|(_, n)| !n.deleted)
            .filter(|(id, _)| filter.map_or(true, |f| f(id, source.metadata(id))))
            .filter_map(|(id, _)| source.vector(id).map(|v| (id.clone(), self.metric.distance(query, v))))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }

    /// Inserts every `(id, vector)` pair supplied by `vectors` — typically
    /// every live vector in the underlying store — reporting `(done, total)`
    /// through `progress` after each insert. `total` is taken from
    /// `vectors`' exact size hint.
    ///
    /// # Errors
    /// Propagates the first [`GraphError`] encountered; vectors inserted
    /// before the failing one remain in the graph.
    pub fn build_index<I>(
        &mut self,
        vectors: I,
        source: &dyn VectorSource,
        mut progress: Option<&mut dyn FnMut(usize, usize)>,
    ) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = (VectorId, Vec<f32>)>,
    {
        let vectors = vectors.into_iter();
        let total = vectors.size_hint().0;
        for (done, (id, vector)) in vectors.enumerate() {
            self.insert(id, &vector, source)?;
            if let Some(cb) = progress.as_mut() {
                cb(done + 1, total);
            }
        }
        Ok(())
    }

    /// Current configuration and size snapshot.
    #[must_use]
    pub fn get_stats(&self) -> HnswStats {
        HnswStats {
            node_count: self.nodes.len(),
            m: self.options.m,
            ef_construction: self.options.ef_construction,
            ef_search: self.options.ef_search,
            dimension_aware: self.options.dimension_aware,
        }
    }

    /// Total nodes in the graph, including soft-deleted ones.
    #[must_use]
    pub fn get_node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Idempotent shutdown: writes the index to disk if backed by a path,
    /// then clears in-memory state.
    ///
    /// # Errors
    /// Propagates a save failure; in-memory state is cleared regardless.
    pub fn close(&mut self) -> Result<(), GraphError> {
        let result = self.save();
        self.clear();
        result
    }

    /// Soft-deletes `id`: the node and its edges stay in the graph for
    /// routing, but it is filtered from search results. If `id` was the
    /// (or a dimension's) entry point, promotes another live node — the
    /// highest-level live node remaining, breaking ties by id — to take
    /// its place. Returns `false` if `id` was never indexed.
    pub fn mark_delete(&mut self, id: &VectorId) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if node.deleted {
            return false;
        }
        node.deleted = true;

        if self.entry_point.as_ref() == Some(id) {
            self.entry_point = self.promote_entry(None);
        }
        let stale_dims: Vec<u32> = self
            .dimension_entry_points
            .iter()
            .filter(|(_, v)| *v == id)
            .map(|(k, _)| *k)
            .collect();
        for dim in stale_dims {
            let replacement = self.promote_entry(Some(dim));
            match replacement {
                Some(r) => {
                    self.dimension_entry_points.insert(dim, r);
                }
                None => {
                    self.dimension_entry_points.remove(&dim);
                }
            }
        }
        true
    }

    fn promote_entry(&self, _dim_hint: Option<u32>) -> Option<VectorId> {
        self.nodes
            .iter()
            .filter(|(_, n)| !n.deleted)
            .max_by(|(a_id, a), (b_id, b)| a.level.cmp(&b.level).then_with(|| b_id.cmp(a_id)))
            .map(|(id, _)| id.clone())
    }

    /// Writes `hnsw/hnsw_index.json`. A no-op if unbacked.
    ///
    /// # Errors
    /// Propagates I/O/serialization errors.
    pub fn save(&self) -> Result<(), GraphError> {
        let Some(dir) = &self.path else {
            return Ok(());
        };
        let file = IndexFile {
            version: FORMAT_VERSION,
            m: self.options.m,
            ef_construction: self.options.ef_construction,
            max_level: self.options.max_level,
            dimension_aware: self.options.dimension_aware,
            dimension: self.dimension,
            entry_point: self.entry_point.clone(),
            dimension_entry_points: self
                .dimension_entry_points
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            nodes: self.nodes.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        let path = dir.join("hnsw").join("hnsw_index.json");
        persist::write_json(&path, &file, self.use_compression)?;
        Ok(())
    }

    /// Loads `hnsw/hnsw_index.json`. A missing file leaves the graph empty,
    /// not an error. A failed load (version mismatch, corrupt JSON) clears
    /// whatever in-memory state existed rather than leaving it half-applied.
    ///
    /// # Errors
    /// Returns [`GraphError::UnsupportedVersion`] or propagates I/O errors.
    pub fn load(&mut self) -> Result<(), GraphError> {
        let Some(dir) = self.path.clone() else {
            return Ok(());
        };
        let path = dir.join("hnsw").join("hnsw_index.json");
        let loaded: Result<Option<IndexFile>, _> = persist::read_json(&path, self.use_compression);
        let file = match loaded {
            Ok(file) => file,
            Err(err) => {
                self.clear();
                return Err(err.into());
            }
        };
        let Some(file) = file else {
            return Ok(());
        };
        if file.version != FORMAT_VERSION {
            self.clear();
            return Err(GraphError::UnsupportedVersion(file.version));
        }
        self.options.m = file.m;
        self.options.ef_construction = file.ef_construction;
        self.options.max_level = file.max_level;
        self.options.dimension_aware = file.dimension_aware;
        self.dimension = file.dimension;
        self.entry_point = file.entry_point;
        self.dimension_entry_points = file.dimension_entry_points.into_iter().collect();
        self.nodes = file.nodes.into_iter().collect();
        Ok(())
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.entry_point = None;
        self.dimension_entry_points.clear();
        self.dimension = None;
    }

    /// Drops all in-memory graph state without touching disk (used when the
    /// Partition Manager evicts a resident partition).
    pub fn unload(&mut self) {
        self.clear();
    }
}

#[derive(Clone, Debug)]
struct ScoredId(f32, VectorId);

impl PartialEq for ScoredId {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0 && self.1 == other.1
    }
}
impl Eq for ScoredId {}
impl PartialOrd for ScoredId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ScoredId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .partial_cmp(&other.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.1.cmp(&other.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    struct MapSource(StdHashMap<VectorId, Vec<f32>>);
    impl VectorSource for MapSource {
        fn vector(&self, id: &VectorId) -> Option<&[f32]> {
            self.0.get(id).map(Vec::as_slice)
        }
    }

    fn small_options() -> HnswOptions {
        HnswOptions {
            m: 4,
            ef_construction: 16,
            ef_search: 16,
            max_level: 8,
            dimension_aware: false,
        }
    }

    fn build(points: &[(u64, [f32; 2])]) -> (HnswIndex, MapSource) {
        let mut index = HnswIndex::new(small_options(), DistanceMetric::Euclidean);
        let mut map = StdHashMap::new();
        for (id, v) in points {
            map.insert(VectorId::Int(*id), v.to_vec());
        }
        let source = MapSource(map);
        for (id, v) in points {
            index.insert(VectorId::Int(*id), v, &source).unwrap();
        }
        (index, source)
    }

    #[test]
    fn search_finds_nearest_point() {
        let (index, source) = build(&[
            (1, [0.0, 0.0]),
            (2, [1.0, 1.0]),
            (3, [10.0, 10.0]),
            (4, [10.0, 11.0]),
        ]);
        let results = index.search(&[0.1, 0.1], 1, None, &source);
        assert_eq!(results[0].0, VectorId::Int(1));
    }

    #[test]
    fn empty_graph_search_returns_empty() {
        let index = HnswIndex::new(small_options(), DistanceMetric::Euclidean);
        let source = MapSource(StdHashMap::new());
        assert!(index.search(&[0.0, 0.0], 5, None, &source).is_empty());
    }

    #[test]
    fn mark_delete_removes_from_results_but_keeps_routing() {
        let (mut index, source) = build(&[(1, [0.0, 0.0]), (2, [0.5, 0.5]), (3, [1.0, 1.0])]);
        assert!(index.mark_delete(&VectorId::Int(1)));
        let results = index.search(&[0.0, 0.0], 3, None, &source);
        assert!(!results.iter().any(|(id, _)| *id == VectorId::Int(1)));
        assert!(index.len() == 3, "tombstoned node stays for connectivity");
    }

    #[test]
    fn deleting_entry_point_promotes_another_node() {
        let (mut index, _source) = build(&[(1, [0.0, 0.0]), (2, [5.0, 5.0])]);
        let original_entry = index.entry_point.clone();
        assert!(original_entry.is_some());
        index.mark_delete(original_entry.as_ref().unwrap());
        assert!(index.entry_point.is_some());
        assert_ne!(index.entry_point, original_entry);
    }

    #[test]
    fn save_then_load_round_trips_graph() {
        let dir = tempfile::tempdir().unwrap();
        let (mut index, source) = build(&[(1, [0.0, 0.0]), (2, [1.0, 1.0]), (3, [2.0, 2.0])]);
        index.path = Some(dir.path().to_path_buf());
        index.save().unwrap();

        let mut reloaded = HnswIndex::with_path(dir.path(), small_options(), DistanceMetric::Euclidean, false);
        reloaded.load().unwrap();
        assert_eq!(reloaded.len(), 3);
        let results = reloaded.search(&[0.0, 0.0], 1, None, &source);
        assert_eq!(results[0].0, VectorId::Int(1));
    }

    #[test]
    fn dimension_mismatch_without_dimension_aware_is_rejected() {
        let mut index = HnswIndex::new(small_options(), DistanceMetric::Euclidean);
        let mut map = StdHashMap::new();
        map.insert(VectorId::Int(1), vec![0.0, 0.0]);
        map.insert(VectorId::Int(2), vec![0.0, 0.0, 0.0]);
        let source = MapSource(map);
        index.insert(VectorId::Int(1), &[0.0, 0.0], &source).unwrap();
        let err = index.insert(VectorId::Int(2), &[0.0, 0.0, 0.0], &source);
        assert!(matches!(err, Err(GraphError::DimensionMismatch { .. })));
    }
}
