//! The statistics snapshot shape (spec §3): per-service counters plus a
//! single global HNSW index size.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which counter an increment affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKind {
    /// Live (non-deleted) noun count.
    Noun,
    /// Live (non-deleted) verb count.
    Verb,
    /// Standalone metadata blob count.
    Metadata,
}

impl CounterKind {
    /// The JSON field name used inside a partition document
    /// (`nounCount`/`verbCount`/`metadataCount`, spec §3).
    pub fn field_name(self) -> &'static str {
        match self {
            CounterKind::Noun => "nounCount",
            CounterKind::Verb => "verbCount",
            CounterKind::Metadata => "metadataCount",
        }
    }
}

/// Per-service counters, one bucket per `(kind, service)` pair (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCounts {
    /// Count of `add`/`delete` deltas applied to nouns by this service.
    #[serde(rename = "nounCount", default)]
    pub noun_count: i64,
    /// Count of `addVerb`/`delete` deltas applied to verbs by this service.
    #[serde(rename = "verbCount", default)]
    pub verb_count: i64,
    /// Count of standalone metadata writes by this service.
    #[serde(rename = "metadataCount", default)]
    pub metadata_count: i64,
}

impl ServiceCounts {
    fn apply(&mut self, kind: CounterKind, delta: i64) {
        match kind {
            CounterKind::Noun => self.noun_count += delta,
            CounterKind::Verb => self.verb_count += delta,
            CounterKind::Metadata => self.metadata_count += delta,
        }
    }
}

/// A full statistics snapshot: `service -> {nounCount, verbCount,
/// metadataCount}` plus the global `hnswIndexSize` (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Per-service counter buckets.
    pub services: BTreeMap<String, ServiceCounts>,
    /// Global HNSW-resident node count, as of the last checkpoint that
    /// reported it to this process (spec §4.8's persistence bridge is the
    /// only writer).
    #[serde(rename = "hnswIndexSize", default)]
    pub hnsw_index_size: u64,
}

impl Snapshot {
    /// Total across every service, for one counter kind.
    pub fn total(&self, kind: CounterKind) -> i64 {
        self.services
            .values()
            .map(|c| match kind {
                CounterKind::Noun => c.noun_count,
                CounterKind::Verb => c.verb_count,
                CounterKind::Metadata => c.metadata_count,
            })
            .sum()
    }

    /// Parse a partition document as persisted by the storage adapter
    /// (`{service: {nounCount, verbCount, metadataCount}}`), merging it
    /// into `hnsw_index_size = 0` (callers fill that in separately, since
    /// it is not partition-scoped).
    pub fn from_partition_json(value: &serde_json::Value) -> Self {
        let mut services = BTreeMap::new();
        if let Some(obj) = value.as_object() {
            for (service, counts) in obj {
                let counts: ServiceCounts = serde_json::from_value(counts.clone()).unwrap_or_default();
                services.insert(service.clone(), counts);
            }
        }
        Snapshot { services, hnsw_index_size: 0 }
    }

    /// Merge pending in-memory deltas on top of a storage-backed snapshot,
    /// used by [`crate::StatisticsEngine::get_statistics`] so a caller
    /// sees writes that have not flushed yet even without forcing a flush.
    pub(crate) fn apply_delta(&mut self, service: &str, kind: CounterKind, delta: i64) {
        self.services.entry(service.to_string()).or_default().apply(kind, delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_sums_across_services() {
        let mut snap = Snapshot::default();
        snap.apply_delta("w1", CounterKind::Noun, 3);
        snap.apply_delta("w2", CounterKind::Noun, 4);
        assert_eq!(snap.total(CounterKind::Noun), 7);
    }

    #[test]
    fn from_partition_json_round_trips_service_buckets() {
        let json = serde_json::json!({"w1": {"nounCount": 5, "verbCount": 2, "metadataCount": 0}});
        let snap = Snapshot::from_partition_json(&json);
        assert_eq!(snap.services["w1"].noun_count, 5);
        assert_eq!(snap.services["w1"].verb_count, 2);
    }
}
