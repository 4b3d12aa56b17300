//! The noun (entity) wire type (spec §3).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use vg_core::{CreatedBy, NounId, NounType, Timestamp, VerbId};

/// A stored entity: a vector plus a closed-set type tag and free-form
/// metadata.
///
/// `vector` is `None` for sparse imports that have not yet been embedded;
/// every noun present in the HNSW index has `vector.is_some()` (invariant
/// I3 is the converse: storage may lag the index, never the other way).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Noun {
    /// Stable identifier.
    pub id: NounId,
    /// Embedding vector, `None` until filled by an embedder.
    pub vector: Option<Vec<f32>>,
    /// Closed-set type tag.
    #[serde(rename = "type")]
    pub noun_type: NounType,
    /// Free-form metadata object. Always a JSON object, never a scalar.
    pub metadata: Map<String, JsonValue>,
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
    /// Set when this noun was synthesized by `addVerb`'s
    /// `autoCreateMissingNouns` rather than an explicit `add` (spec §4.8).
    /// A later real `add` with the same id clears the flag.
    pub placeholder: bool,
    /// Ids of verbs outbound from this noun, carried inline for O(1)
    /// traversal (spec §4.9). The authoritative copy of each verb still
    /// lives in the verb store for global indexing; this is a denormalized
    /// index, kept in sync by `vg-graph`'s `add_verb`.
    #[serde(default)]
    pub outbound_verbs: Vec<VerbId>,
}

impl Noun {
    /// Construct a new, non-deleted, non-placeholder noun.
    pub fn new(
        noun_type: NounType,
        vector: Option<Vec<f32>>,
        metadata: Map<String, JsonValue>,
        created_by: CreatedBy,
        service: impl Into<String>,
    ) -> Self {
        let now = Timestamp::now();
        Noun {
            id: NounId::new(),
            vector,
            noun_type,
            metadata,
            created_at: now,
            updated_at: now,
            created_by,
            deleted: false,
            service: service.into(),
            placeholder: false,
            outbound_verbs: Vec::new(),
        }
    }

    /// Build a placeholder noun for an `addVerb` endpoint that does not yet
    /// exist, per `autoCreateMissingNouns`.
    pub fn placeholder(id: NounId, service: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Noun {
            id,
            vector: None,
            noun_type: NounType::default(),
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
            created_by: CreatedBy { name: "vectorgraph.auto_create".into(), version: env!("CARGO_PKG_VERSION").into() },
            deleted: false,
            service: service.into(),
            placeholder: true,
            outbound_verbs: Vec::new(),
        }
    }

    /// Record a verb id as outbound from this noun (spec §4.9 embedded-verb
    /// handling). A no-op if already present.
    pub fn add_outbound_verb(&mut self, verb: VerbId) {
        if !self.outbound_verbs.contains(&verb) {
            self.outbound_verbs.push(verb);
        }
    }

    /// Remove a verb id previously recorded by [`Noun::add_outbound_verb`].
    pub fn remove_outbound_verb(&mut self, verb: VerbId) {
        self.outbound_verbs.retain(|v| *v != verb);
    }

    /// Apply a real `add`/`update` over an existing placeholder or a
    /// soft-deleted noun being resurrected by a fresh `add` with the same
    /// id, clearing both flags and keeping the original id.
    pub fn promote_from_placeholder(&mut self, noun_type: NounType, vector: Option<Vec<f32>>, metadata: Map<String, JsonValue>) {
        self.noun_type = noun_type;
        self.vector = vector;
        self.metadata = metadata;
        self.placeholder = false;
        self.deleted = false;
        self.updated_at = Timestamp::now();
    }

    /// Mark deleted in place (soft delete).
    pub fn soft_delete(&mut self) {
        self.deleted = true;
        self.updated_at = Timestamp::now();
    }

    /// The storage key segment for this noun (`nouns/{typeTag}/{id}`).
    pub fn storage_key(&self) -> String {
        format!("nouns/{}/{}", self.noun_type.storage_tag(), self.id)
    }
}
