//! The HNSW graph structure itself (spec §4.6): insert, search, delete,
//! and `searchLayer`. Holds only graph topology — neighbor sets and level
//! bookkeeping — never embeddings; every distance computation goes through
//! a caller-supplied [`EmbeddingSource`], so the same graph code serves the
//! standard variant (backed by [`crate::heap::VectorHeap`]) and the
//! optimized variant (backed by [`crate::quantization::QuantizedStore`]).
//!
//! Node storage and per-level adjacency use `BTreeMap`/`BTreeSet` so
//! snapshotting and pruning iterate in a deterministic order; the
//! search-time visited-set and scratch neighbor lists don't need that
//! guarantee and use `FxHashSet`/`SmallVec` instead, sized for the typical
//! per-node fan-out.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use vg_core::{DistanceMetric, NounId};

use crate::config::HnswConfig;
use crate::source::EmbeddingSource;

/// Typical per-node fan-out (the configured `M`, doubled at level 0); used
/// to size scratch lists inline before they spill to the heap.
type NeighborScratch = SmallVec<[NounId; 32]>;

#[derive(Debug, Clone)]
struct Node {
    neighbors: Vec<BTreeSet<NounId>>,
    max_layer: usize,
}

impl Node {
    fn new(max_layer: usize) -> Self {
        Node { neighbors: (0..=max_layer).map(|_| BTreeSet::new()).collect(), max_layer }
    }
}

/// A candidate scored by distance; smaller is nearer. `Ord` ranks smaller
/// distance as `Greater` so a plain [`BinaryHeap`] pops the nearest
/// candidate first (used for the expansion queue); wrapped in [`Reverse`]
/// it instead pops the farthest first (used for the result queue, so the
/// worst current result sits on top for O(1) eviction). Ties break toward
/// the lower id, per spec §4.6 "stable tie-break by id".
#[derive(Debug, Clone, Copy, PartialEq)]
struct Scored {
    distance: f32,
    id: NounId,
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        other.distance.partial_cmp(&self.distance).unwrap_or(Ordering::Equal).then_with(|| other.id.cmp(&self.id))
    }
}

/// Graph-only HNSW structure (spec §4.6). Does not own embeddings.
#[derive(Debug)]
pub struct HnswGraph {
    config: HnswConfig,
    metric: DistanceMetric,
    nodes: BTreeMap<NounId, Node>,
    entry_point: Option<NounId>,
    max_level: usize,
    rng_counter: u64,
}

impl HnswGraph {
    /// An empty graph using `config`/`metric`.
    pub fn new(config: HnswConfig, metric: DistanceMetric) -> Self {
        HnswGraph { config, metric, nodes: BTreeMap::new(), entry_point: None, max_level: 0, rng_counter: 0 }
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has any nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` is present.
    pub fn contains(&self, id: NounId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Current entry point, if any.
    pub fn entry_point(&self) -> Option<NounId> {
        self.entry_point
    }

    /// Current max level.
    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Estimated graph-topology memory usage (neighbor sets; excludes
    /// embeddings, which the embedding source accounts for separately).
    pub fn memory_usage(&self) -> usize {
        self.nodes.values().map(|n| n.neighbors.iter().map(|s| s.len() * 16 + 64).sum::<usize>() + 64).sum()
    }

    /// Level assignment `floor(-ln(U) / ln(M))` (spec §4.6 step 2), driven
    /// by a deterministic splitmix64 counter rather than a system RNG so
    /// identical insert sequences always produce identical graphs.
    fn assign_level(&mut self) -> usize {
        self.rng_counter += 1;
        let hash = splitmix64(self.rng_counter);
        let uniform = ((hash as f64) / (u64::MAX as f64)).max(1e-15);
        (-uniform.ln() * self.config.ml) as usize
    }

    /// Insert `id` into the graph, computing distances against `source`
    /// (spec §4.6 steps 2-6). `query` is the (exact or quantized-approx,
    /// depending on regime) embedding for `id` itself — the caller has
    /// already registered `id` in `source` before calling this, so
    /// neighbor pruning can look its distance up again via `source`. `id`
    /// must not already be present; callers wanting "replace" semantics
    /// (spec §4.6 edge case) call [`Self::delete`] first.
    pub fn insert(&mut self, id: NounId, query: &[f32], source: &dyn EmbeddingSource) {
        let level = self.assign_level();
        self.nodes.insert(id, Node::new(level));

        let Some(entry_id) = self.entry_point else {
            self.entry_point = Some(id);
            self.max_level = level;
            return;
        };

        let mut current_entry = entry_id;
        if self.max_level > level {
            current_entry = self.greedy_descend(query, entry_id, self.max_level, level + 1, source);
        }

        let start_layer = level.min(self.max_level);
        for layer in (0..=start_layer).rev() {
            let candidates = self.search_layer(query, current_entry, self.config.ef_construction, layer, source);
            let selected: NeighborScratch = candidates.iter().take(self.config.m).map(|s| s.id).collect();

            if let Some(node) = self.nodes.get_mut(&id) {
                if layer < node.neighbors.len() {
                    for &nb in &selected {
                        node.neighbors[layer].insert(nb);
                    }
                }
            }

            let max_conn = if layer == 0 { self.config.max_connections_layer0() } else { self.config.max_connections() };
            for &nb in &selected {
                let needs_prune = if let Some(nb_node) = self.nodes.get_mut(&nb) {
                    if layer < nb_node.neighbors.len() {
                        nb_node.neighbors[layer].insert(id);
                        nb_node.neighbors[layer].len() > max_conn
                    } else {
                        false
                    }
                } else {
                    false
                };
                if needs_prune {
                    self.prune_neighbors(nb, layer, max_conn, source);
                }
            }

            if let Some(closest) = candidates.first() {
                current_entry = closest.id;
            }
        }

        if level > self.max_level {
            self.entry_point = Some(id);
            self.max_level = level;
        }
    }

    /// Search for the `k` nearest neighbors of `query` (spec §4.6
    /// "Search"). `ef` below `k` is clamped up to `k`.
    pub fn search(&self, query: &[f32], k: usize, source: &dyn EmbeddingSource) -> Vec<(NounId, f32)> {
        if k == 0 {
            return Vec::new();
        }
        let Some(entry_id) = self.entry_point else { return Vec::new() };

        let mut current_entry = entry_id;
        if self.max_level > 0 {
            current_entry = self.greedy_descend(query, entry_id, self.max_level, 1, source);
        }

        let ef = self.config.ef_search.max(k);
        let candidates = self.search_layer(query, current_entry, ef, 0, source);

        candidates.into_iter().take(k).map(|s| (s.id, s.distance)).collect()
    }

    /// Delete `id`: dissolve it out of every neighbor's adjacency set at
    /// every level it participated in, and reassign the entry point if
    /// needed (spec §4.6 "Delete").
    pub fn delete(&mut self, id: NounId) -> bool {
        let Some(node) = self.nodes.remove(&id) else { return false };
        for (layer, neighbors) in node.neighbors.iter().enumerate() {
            for &nb in neighbors {
                if let Some(nb_node) = self.nodes.get_mut(&nb) {
                    if layer < nb_node.neighbors.len() {
                        nb_node.neighbors[layer].remove(&id);
                    }
                }
            }
        }
        if self.entry_point == Some(id) {
            self.entry_point = self.nodes.iter().max_by_key(|(id, n)| (n.max_layer, std::cmp::Reverse(**id))).map(|(id, _)| *id);
            self.max_level = self.entry_point.and_then(|ep| self.nodes.get(&ep)).map(|n| n.max_layer).unwrap_or(0);
        }
        true
    }

    /// `searchLayer(q, ep, ef, level)` (spec §4.6): beam search at a single
    /// layer, returning up to `ef` results sorted by distance ascending.
    fn search_layer(&self, query: &[f32], entry_id: NounId, ef: usize, layer: usize, source: &dyn EmbeddingSource) -> Vec<Scored> {
        let Some(entry_distance) = source.distance_to(self.metric, query, entry_id) else { return Vec::new() };

        let mut visited: FxHashSet<NounId> = FxHashSet::default();
        visited.insert(entry_id);

        let mut candidates = BinaryHeap::new();
        candidates.push(Scored { distance: entry_distance, id: entry_id });

        let mut results: BinaryHeap<Reverse<Scored>> = BinaryHeap::new();
        results.push(Reverse(Scored { distance: entry_distance, id: entry_id }));

        while let Some(nearest) = candidates.pop() {
            let worst = results.peek().map(|r| r.0.distance).unwrap_or(f32::INFINITY);
            if nearest.distance > worst && results.len() >= ef {
                break;
            }

            if let Some(node) = self.nodes.get(&nearest.id) {
                if layer < node.neighbors.len() {
                    let layer_neighbors: NeighborScratch = node.neighbors[layer].iter().copied().collect();
                    for nb in layer_neighbors {
                        if !visited.insert(nb) {
                            continue;
                        }
                        let Some(distance) = source.distance_to(self.metric, query, nb) else { continue };
                        let worst = results.peek().map(|r| r.0.distance).unwrap_or(f32::INFINITY);
                        if results.len() < ef || distance < worst {
                            candidates.push(Scored { distance, id: nb });
                            results.push(Reverse(Scored { distance, id: nb }));
                            if results.len() > ef {
                                results.pop();
                            }
                        }
                    }
                }
            }
        }

        let mut out: Vec<Scored> = results.into_iter().map(|r| r.0).collect();
        out.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
        out
    }

    /// Greedy single-step descent from `from_layer` down to `to_layer`
    /// (spec §4.6 step 4): at each level, move to the closer neighbor
    /// until none is closer.
    fn greedy_descend(&self, query: &[f32], entry_id: NounId, from_layer: usize, to_layer: usize, source: &dyn EmbeddingSource) -> NounId {
        let mut current = entry_id;
        for layer in (to_layer..=from_layer).rev() {
            let mut improved = true;
            while improved {
                improved = false;
                let Some(current_distance) = source.distance_to(self.metric, query, current) else { break };
                let mut best_distance = current_distance;
                let mut best_id = current;

                if let Some(node) = self.nodes.get(&current) {
                    if layer < node.neighbors.len() {
                        for &nb in &node.neighbors[layer] {
                            if let Some(d) = source.distance_to(self.metric, query, nb) {
                                if d < best_distance || (d == best_distance && nb < best_id) {
                                    best_distance = d;
                                    best_id = nb;
                                }
                            }
                        }
                    }
                }

                if best_id != current {
                    current = best_id;
                    improved = true;
                }
            }
        }
        current
    }

    fn prune_neighbors(&mut self, id: NounId, layer: usize, max_connections: usize, source: &dyn EmbeddingSource) {
        let neighbors: NeighborScratch = match self.nodes.get(&id) {
            Some(node) if layer < node.neighbors.len() => node.neighbors[layer].iter().copied().collect(),
            _ => return,
        };

        let mut scored: Vec<Scored> = neighbors.iter().filter_map(|&nb| source.distance_between(self.metric, id, nb).map(|distance| Scored { distance, id: nb })).collect();
        scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal).then_with(|| a.id.cmp(&b.id)));

        let keep: BTreeSet<NounId> = scored.into_iter().take(max_connections).map(|s| s.id).collect();
        if let Some(node) = self.nodes.get_mut(&id) {
            if layer < node.neighbors.len() {
                node.neighbors[layer] = keep;
            }
        }
    }

    /// Rebuild the graph from scratch by re-inserting every `(id, vector)`
    /// pair in ascending id order, for deterministic reconstruction (spec
    /// §4.8 "rebuild by scanning nouns/"). Each vector must already be
    /// registered in `source` before its id is reached here (the caller
    /// does this as it iterates).
    pub fn rebuild(&mut self, entries: impl IntoIterator<Item = (NounId, Vec<f32>)>, source: &dyn EmbeddingSource) {
        self.nodes.clear();
        self.entry_point = None;
        self.max_level = 0;
        self.rng_counter = 0;
        for (id, vector) in entries {
            self.insert(id, &vector, source);
        }
    }

    /// Snapshot every node's topology, for the persistence bridge (spec
    /// §4.8).
    pub(crate) fn snapshot_nodes(&self) -> Vec<crate::persistence::NodeSnapshot> {
        self.nodes
            .iter()
            .map(|(id, node)| crate::persistence::NodeSnapshot {
                id: *id,
                level: node.max_layer,
                neighbors_by_level: node.neighbors.iter().map(|s| s.iter().copied().collect()).collect(),
            })
            .collect()
    }

    /// Restore graph topology from a persisted snapshot (spec §4.8).
    pub(crate) fn restore(&mut self, entry_point: Option<NounId>, max_level: usize, nodes: Vec<crate::persistence::NodeSnapshot>) {
        self.nodes.clear();
        for n in nodes {
            let neighbors = n.neighbors_by_level.into_iter().map(|v| v.into_iter().collect::<BTreeSet<_>>()).collect();
            self.nodes.insert(n.id, Node { neighbors, max_layer: n.level });
        }
        self.entry_point = entry_point;
        self.max_level = max_level;
        self.rng_counter = self.nodes.len() as u64;
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::VectorHeap;
    use uuid::Uuid;

    fn id(n: u128) -> NounId {
        Uuid::from_u128(n).into()
    }

    fn graph_with(pairs: &[(u128, [f32; 3])]) -> (HnswGraph, VectorHeap) {
        let mut heap = VectorHeap::new(3);
        let mut graph = HnswGraph::new(HnswConfig::default(), DistanceMetric::Euclidean);
        for &(n, v) in pairs {
            heap.insert(id(n), v.to_vec());
            graph.insert(id(n), &v, &heap);
        }
        (graph, heap)
    }

    #[test]
    fn basic_insert_search_returns_nearest_first() {
        let (graph, heap) = graph_with(&[(1, [1.0, 0.0, 0.0]), (2, [0.0, 1.0, 0.0]), (3, [0.9, 0.1, 0.0])]);
        assert_eq!(graph.len(), 3);

        let results = graph.search(&[1.0, 0.0, 0.0], 2, &heap);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, id(1));
        assert_eq!(results[1].0, id(3));
    }

    #[test]
    fn delete_removes_node_and_its_edges() {
        let (mut graph, heap) = graph_with(&[(1, [1.0, 0.0, 0.0]), (2, [0.0, 1.0, 0.0]), (3, [0.0, 0.0, 1.0])]);

        assert!(graph.delete(id(1)));
        assert_eq!(graph.len(), 2);
        assert!(!graph.contains(id(1)));

        let results = graph.search(&[1.0, 0.0, 0.0], 10, &heap);
        assert!(results.iter().all(|(found, _)| *found != id(1)));
    }

    #[test]
    fn deleting_entry_point_reassigns_to_highest_surviving_level() {
        let (mut graph, _heap) = graph_with(&[(1, [1.0, 0.0, 0.0]), (2, [0.0, 1.0, 0.0]), (3, [0.0, 0.0, 1.0])]);
        let entry = graph.entry_point().unwrap();

        graph.delete(entry);
        assert_ne!(graph.entry_point(), Some(entry));
        assert!(graph.entry_point().is_some());
    }

    #[test]
    fn deleting_every_node_clears_entry_point_and_max_level() {
        let (mut graph, _heap) = graph_with(&[(1, [1.0, 0.0, 0.0]), (2, [0.0, 1.0, 0.0])]);
        graph.delete(id(1));
        graph.delete(id(2));
        assert!(graph.is_empty());
        assert_eq!(graph.entry_point(), None);
        assert_eq!(graph.max_level(), 0);
    }

    #[test]
    fn identical_insert_sequence_is_deterministic() {
        let query = [1.0, 0.0, 0.0];
        let mut first = None;
        for _ in 0..5 {
            let (graph, heap) = graph_with(&[
                (1, [1.0, 0.0, 0.0]),
                (2, [0.0, 1.0, 0.0]),
                (3, [0.0, 0.0, 1.0]),
                (4, [0.7, 0.7, 0.0]),
                (5, [0.5, 0.5, 0.5]),
            ]);
            let results = graph.search(&query, 5, &heap);
            match &first {
                None => first = Some(results),
                Some(expected) => assert_eq!(&results, expected),
            }
        }
    }

    #[test]
    fn ties_break_toward_lower_id() {
        let same = [1.0, 0.0, 0.0];
        let (graph, heap) = graph_with(&[(5, same), (2, same), (8, same), (1, same)]);
        let results = graph.search(&same, 10, &heap);
        let ids: Vec<NounId> = results.iter().map(|(found, _)| *found).collect();
        assert_eq!(ids, vec![id(1), id(2), id(5), id(8)]);
    }

    #[test]
    fn empty_graph_search_returns_nothing() {
        let graph = HnswGraph::new(HnswConfig::default(), DistanceMetric::Cosine);
        let heap = VectorHeap::new(3);
        assert!(graph.search(&[1.0, 0.0, 0.0], 10, &heap).is_empty());
    }

    #[test]
    fn k_zero_returns_nothing() {
        let (graph, heap) = graph_with(&[(1, [1.0, 0.0, 0.0])]);
        assert!(graph.search(&[1.0, 0.0, 0.0], 0, &heap).is_empty());
    }

    #[test]
    fn rebuild_reproduces_the_same_topology_as_fresh_inserts() {
        let pairs = [(1, [1.0, 0.0, 0.0]), (2, [0.0, 1.0, 0.0]), (3, [0.0, 0.0, 1.0]), (4, [0.7, 0.7, 0.0])];
        let (fresh, heap) = graph_with(&pairs);

        let mut rebuilt = HnswGraph::new(HnswConfig::default(), DistanceMetric::Euclidean);
        let entries: Vec<(NounId, Vec<f32>)> = pairs.iter().map(|&(n, v)| (id(n), v.to_vec())).collect();
        rebuilt.rebuild(entries, &heap);

        assert_eq!(fresh.entry_point(), rebuilt.entry_point());
        assert_eq!(fresh.max_level(), rebuilt.max_level());
        assert_eq!(fresh.search(&[1.0, 0.0, 0.0], 4, &heap), rebuilt.search(&[1.0, 0.0, 0.0], 4, &heap));
    }

    #[test]
    fn snapshot_round_trips_topology() {
        let (graph, _heap) = graph_with(&[(1, [1.0, 0.0, 0.0]), (2, [0.0, 1.0, 0.0]), (3, [0.0, 0.0, 1.0])]);
        let nodes = graph.snapshot_nodes();

        let mut restored = HnswGraph::new(HnswConfig::default(), DistanceMetric::Euclidean);
        restored.restore(graph.entry_point(), graph.max_level(), nodes);

        assert_eq!(restored.len(), graph.len());
        assert_eq!(restored.entry_point(), graph.entry_point());
        assert_eq!(restored.max_level(), graph.max_level());
        for &n in &[1u128, 2, 3] {
            assert!(restored.contains(id(n)));
        }
    }

    /// Spec §8 seed test 5: HNSW top-10 should agree with brute-force
    /// top-10 on average at least 8 times out of 10 for random unit
    /// vectors at `efSearch=50`.
    #[test]
    fn recall_against_brute_force_meets_the_spec_floor() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        const DIM: usize = 64;
        const N: usize = 1_000;
        const QUERIES: usize = 100;
        const K: usize = 10;

        let mut rng = StdRng::seed_from_u64(7);
        let unit_vector = |rng: &mut StdRng| -> Vec<f32> {
            let raw: Vec<f32> = (0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm == 0.0 { raw } else { raw.iter().map(|x| x / norm).collect() }
        };

        let mut config = HnswConfig::default();
        config.ef_search = 50;
        let metric = DistanceMetric::Cosine;
        let mut graph = HnswGraph::new(config, metric);
        let mut heap = VectorHeap::new(DIM);

        let corpus: Vec<(NounId, Vec<f32>)> = (0..N).map(|_| (NounId::new(), unit_vector(&mut rng))).collect();
        for (node_id, vector) in &corpus {
            heap.insert(*node_id, vector.clone());
            graph.insert(*node_id, vector, &heap);
        }

        let mut total_intersection = 0usize;
        for _ in 0..QUERIES {
            let query = unit_vector(&mut rng);

            let mut brute: Vec<(NounId, f32)> = corpus.iter().map(|(node_id, vector)| (*node_id, metric.distance(&query, vector))).collect();
            brute.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then_with(|| a.0.cmp(&b.0)));
            let brute_top: FxHashSet<NounId> = brute.into_iter().take(K).map(|(node_id, _)| node_id).collect();

            let hnsw_top: FxHashSet<NounId> = graph.search(&query, K, &heap).into_iter().map(|(node_id, _)| node_id).collect();

            total_intersection += brute_top.intersection(&hnsw_top).count();
        }

        let average_recall = total_intersection as f64 / (QUERIES * K) as f64;
        assert!(average_recall >= 0.9, "average recall {average_recall} below the 0.9 floor");
    }
}
