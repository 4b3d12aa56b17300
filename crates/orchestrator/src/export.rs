//! Bulk export (spec §4.10 `export`): JSON / CSV / graph / embeddings-only,
//! respecting the same post-search filter expression and an optional limit.

use serde::{Deserialize, Serialize};
use serde_json::json;
use vg_primitives::{FilterExpr, Noun, Verb};

/// Output shape (spec §4.10 "JSON / CSV / graph ({nodes, edges}) /
/// embeddings-only").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// One JSON array of noun objects.
    Json,
    /// `id,type,vector,metadata` CSV, the same shape `import` accepts.
    Csv,
    /// `{nodes, edges}`, the full noun/verb graph.
    Graph,
    /// Just `{id, vector}` pairs, for re-indexing elsewhere.
    EmbeddingsOnly,
}

/// Tunables for [`crate::database::Database::export`].
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Output shape.
    pub format: Option<ExportFormat>,
    /// Post-hydration metadata filter, same semantics as `search`.
    pub filter: Option<FilterExpr>,
    /// Maximum records to include.
    pub limit: Option<usize>,
}

/// One node in a [`GraphExport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Noun id.
    pub id: String,
    /// Closed-set type tag.
    #[serde(rename = "type")]
    pub noun_type: String,
    /// Embedding, so a `Graph` export is enough to fully restore a noun
    /// (not just its metadata) via [`crate::database::Database::import_graph`].
    pub vector: Option<Vec<f32>>,
    /// Metadata object.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// One edge in a [`GraphExport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Verb id.
    pub id: String,
    /// Source noun id.
    pub source: String,
    /// Target noun id.
    pub target: String,
    /// Closed-set relationship type tag.
    #[serde(rename = "type")]
    pub verb_type: String,
    /// Metadata object.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// `{nodes, edges}` export shape.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphExport {
    /// Exported nouns.
    pub nodes: Vec<GraphNode>,
    /// Exported verbs.
    pub edges: Vec<GraphEdge>,
}

/// `export`'s result: text for `Json`/`Csv`/`EmbeddingsOnly`, structured
/// for `Graph`.
#[derive(Debug, Clone)]
pub enum ExportOutput {
    /// Serialized JSON or CSV text.
    Text(String),
    /// `{nodes, edges}`.
    Graph(GraphExport),
}

/// Render `nouns` (already filtered and limited by the caller) as JSON.
pub fn render_json(nouns: &[Noun]) -> ExportOutput {
    let value: Vec<_> = nouns
        .iter()
        .map(|n| {
            json!({
                "id": n.id.to_string(),
                "type": n.noun_type.storage_tag(),
                "vector": n.vector,
                "metadata": n.metadata,
                "deleted": n.deleted,
            })
        })
        .collect();
    ExportOutput::Text(serde_json::to_string_pretty(&value).unwrap_or_default())
}

/// Render `nouns` as `id,type,vector,metadata` CSV, matching what
/// `import`'s `Csv` source accepts.
pub fn render_csv(nouns: &[Noun]) -> ExportOutput {
    let mut out = String::from("id,type,vector,metadata\n");
    for noun in nouns {
        let vector = noun.vector.as_ref().map(|v| v.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("|")).unwrap_or_default();
        let metadata = serde_json::to_string(&noun.metadata).unwrap_or_default();
        out.push_str(&format!("{},{},{},\"{}\"\n", noun.id, noun.noun_type.storage_tag(), vector, metadata.replace('"', "\"\"")));
    }
    ExportOutput::Text(out)
}

/// Render `nouns`/`verbs` as `{nodes, edges}`.
pub fn render_graph(nouns: &[Noun], verbs: &[Verb]) -> ExportOutput {
    let nodes = nouns
        .iter()
        .map(|n| GraphNode { id: n.id.to_string(), noun_type: n.noun_type.storage_tag().to_string(), vector: n.vector.clone(), metadata: n.metadata.clone() })
        .collect();
    let edges = verbs
        .iter()
        .map(|v| GraphEdge {
            id: v.id.to_string(),
            source: v.source.to_string(),
            target: v.target.to_string(),
            verb_type: v.verb_type.storage_tag().to_string(),
            metadata: v.metadata.clone(),
        })
        .collect();
    ExportOutput::Graph(GraphExport { nodes, edges })
}

/// Render just `{id, vector}` pairs.
pub fn render_embeddings_only(nouns: &[Noun]) -> ExportOutput {
    let value: Vec<_> = nouns.iter().map(|n| json!({"id": n.id.to_string(), "vector": n.vector})).collect();
    ExportOutput::Text(serde_json::to_string_pretty(&value).unwrap_or_default())
}
