//! The verb (directed, typed edge) wire type (spec §3).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use vg_core::{CreatedBy, NounId, Timestamp, VerbId, VerbType};

/// A directed, typed relationship between two nouns.
///
/// Every non-deleted verb's `source`/`target` must refer to a known noun
/// id, possibly a placeholder or a soft-deleted one (invariant I2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verb {
    /// Stable identifier.
    pub id: VerbId,
    /// Source (origin) noun id.
    pub source: NounId,
    /// Target (destination) noun id.
    pub target: NounId,
    /// Closed-set relationship type tag.
    #[serde(rename = "type")]
    pub verb_type: VerbType,
    /// Free-form metadata object.
    pub metadata: Map<String, JsonValue>,
    /// Confidence in `[0, 1]`; clamped on construction.
    pub confidence: f32,
    /// Unbounded relationship weight.
    pub weight: f32,
    /// Optional embedding, for relationship search independent of the
    /// endpoints' own vectors.
    pub embedding: Option<Vec<f32>>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
    /// Writer-of-record that created this version.
    pub created_by: CreatedBy,
    /// Soft-delete tombstone.
    pub deleted: bool,
    /// Label identifying the writer-of-record service.
    pub service: String,
}

impl Verb {
    /// Construct a new, non-deleted verb. `confidence` is clamped to
    /// `[0, 1]`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: NounId,
        target: NounId,
        verb_type: VerbType,
        metadata: Map<String, JsonValue>,
        confidence: f32,
        weight: f32,
        created_by: CreatedBy,
        service: impl Into<String>,
    ) -> Self {
        let now = Timestamp::now();
        Verb {
            id: VerbId::new(),
            source,
            target,
            verb_type,
            metadata,
            confidence: confidence.clamp(0.0, 1.0),
            weight,
            embedding: None,
            created_at: now,
            updated_at: now,
            created_by,
            deleted: false,
            service: service.into(),
        }
    }

    /// Mark deleted in place (soft delete).
    pub fn soft_delete(&mut self) {
        self.deleted = true;
        self.updated_at = Timestamp::now();
    }

    /// Whether this verb touches the given noun as either endpoint, used
    /// by cascade hard-delete.
    pub fn touches(&self, noun: NounId) -> bool {
        self.source == noun || self.target == noun
    }

    /// The storage key segment for this verb (`verbs/{typeTag}/{id}`).
    pub fn storage_key(&self) -> String {
        format!("verbs/{}/{}", self.verb_type.storage_tag(), self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created_by() -> CreatedBy {
        CreatedBy { name: "test".into(), version: "0.0.0".into() }
    }

    #[test]
    fn confidence_is_clamped_to_unit_interval() {
        let v = Verb::new(NounId::new(), NounId::new(), VerbType::RelatedTo, Map::new(), 5.0, 0.0, created_by(), "svc");
        assert_eq!(v.confidence, 1.0);
        let v2 = Verb::new(NounId::new(), NounId::new(), VerbType::RelatedTo, Map::new(), -5.0, 0.0, created_by(), "svc");
        assert_eq!(v2.confidence, 0.0);
    }

    #[test]
    fn touches_matches_either_endpoint() {
        let a = NounId::new();
        let b = NounId::new();
        let c = NounId::new();
        let v = Verb::new(a, b, VerbType::RelatedTo, Map::new(), 1.0, 0.0, created_by(), "svc");
        assert!(v.touches(a));
        assert!(v.touches(b));
        assert!(!v.touches(c));
    }

    #[test]
    fn storage_key_uses_type_tag_and_id() {
        let v = Verb::new(NounId::new(), NounId::new(), VerbType::Follows, Map::new(), 1.0, 0.0, created_by(), "svc");
        assert_eq!(v.storage_key(), format!("verbs/Follows/{}", v.id));
    }
}
