//! Bulk ingest (spec §4.10 `import`): arrays, JSON, and CSV sources,
//! batched and backpressured through [`vg_concurrency::WorkerPool`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use vg_core::NounId;

/// One record to ingest. Exactly one of `vector`/`text` should be set:
/// `vector` is used directly (after dimension validation); `text` is
/// embedded via the database's configured provider. If neither is set the
/// record is reported as a per-record failure (spec §4.10: "when vectors
/// absent, calls embed per record; on failure, record is skipped and
/// reported").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImportRecord {
    /// Stable id to assign; a fresh id is minted if omitted.
    pub id: Option<NounId>,
    /// Ready-made embedding.
    pub vector: Option<Vec<f32>>,
    /// Raw text to embed, used only if `vector` is absent.
    pub text: Option<String>,
    /// Raw closed-set type tag; resolved against the database's configured
    /// [`vg_graph::TypeValidation`] at write time (coerced with a warning,
    /// or preserved via [`vg_core::NounType::Other`], per spec §4.9/§7),
    /// rather than here, so CSV and JSON sources are coerced identically.
    /// Renamed to `type` on the wire to match [`crate::export::render_json`]'s
    /// output, so `export(json) ∘ clear ∘ import` round-trips the tag.
    #[serde(default, rename = "type")]
    pub noun_type: Option<String>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
}

/// Where `import`'s records come from (spec §4.10: "arrays, CSV, JSON,
/// streams").
pub enum ImportSource {
    /// Already-parsed records, the in-process fast path.
    Records(Vec<ImportRecord>),
    /// A JSON array of record objects.
    Json(String),
    /// `id,type,vector,metadata` CSV, `vector` components `|`-separated,
    /// `metadata` a JSON object (quoted per RFC 4180 if it itself
    /// contains commas).
    Csv(String),
}

impl ImportSource {
    /// Parse into a flat record list. Malformed input as a whole is a hard
    /// error (distinct from a valid-but-unembeddable individual record,
    /// which surfaces later as a per-record [`ImportOutcome`] entry).
    pub fn into_records(self) -> Result<Vec<ImportRecord>, String> {
        match self {
            ImportSource::Records(records) => Ok(records),
            ImportSource::Json(text) => serde_json::from_str(&text).map_err(|e| format!("invalid JSON import source: {e}")),
            ImportSource::Csv(text) => parse_csv(&text),
        }
    }
}

fn parse_csv(text: &str) -> Result<Vec<ImportRecord>, String> {
    let mut lines = text.lines();
    let header = lines.next().ok_or_else(|| "empty CSV import source".to_string())?;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let mut records = Vec::new();
    for (row_index, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_csv_line(line);
        if fields.len() != columns.len() {
            return Err(format!("row {row_index}: expected {} columns, got {}", columns.len(), fields.len()));
        }
        let mut record = ImportRecord::default();
        for (column, field) in columns.iter().zip(fields.iter()) {
            match *column {
                "id" if !field.is_empty() => {
                    record.id = Some(NounId::parse(field).ok_or_else(|| format!("row {row_index}: invalid id {field:?}"))?);
                }
                "type" if !field.is_empty() => {
                    record.noun_type = Some(field.clone());
                }
                "vector" if !field.is_empty() => {
                    let parsed: Result<Vec<f32>, _> = field.split('|').map(str::parse::<f32>).collect();
                    record.vector = Some(parsed.map_err(|e| format!("row {row_index}: invalid vector component: {e}"))?);
                }
                "text" if !field.is_empty() => record.text = Some(field.clone()),
                "metadata" if !field.is_empty() => {
                    let value: JsonValue = serde_json::from_str(field).map_err(|e| format!("row {row_index}: invalid metadata JSON: {e}"))?;
                    record.metadata = value.as_object().cloned().unwrap_or_default();
                }
                _ => {}
            }
        }
        records.push(record);
    }
    Ok(records)
}

/// Split one CSV data line on commas outside of `"`-quoted fields,
/// unescaping doubled quotes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Tunables for [`crate::database::Database::import`] (spec §5
/// "backpressure").
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Records processed per batch before yielding to the next.
    pub batch_size: usize,
    /// Concurrent embed calls in flight (spec §5 "at most `concurrency`
    /// embeddings in flight").
    pub concurrency: usize,
    /// Whether to auto-create missing verb endpoints encountered while
    /// importing verbs from a graph-shaped source. Unused for noun-only
    /// imports.
    pub auto_create_missing_nouns: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions { batch_size: 100, concurrency: 8, auto_create_missing_nouns: false }
    }
}

/// Per-record outcome, always present even on failure (spec §4.10:
/// "on failure, record is skipped and reported").
#[derive(Debug, Clone)]
pub enum ImportOutcome {
    /// The record was embedded (if needed), validated, and written.
    Imported(NounId),
    /// The record failed; the batch continues without it.
    Failed {
        /// Index within the original source.
        index: usize,
        /// Why it failed.
        message: String,
    },
}

/// Aggregate result of one `import` call.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    /// Per-record outcomes, in source order.
    pub outcomes: Vec<ImportOutcome>,
}

impl ImportReport {
    /// Count of records successfully written.
    pub fn imported_count(&self) -> usize {
        self.outcomes.iter().filter(|o| matches!(o, ImportOutcome::Imported(_))).count()
    }

    /// Count of records that failed.
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| matches!(o, ImportOutcome::Failed { .. })).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_parses_vector_and_metadata_columns() {
        let csv = "id,type,vector,metadata\n,Thing,1|0|0,\"{\"\"k\"\":1}\"\n";
        let records = parse_csv(csv).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vector, Some(vec![1.0, 0.0, 0.0]));
        assert_eq!(records[0].metadata.get("k").unwrap(), &JsonValue::from(1));
    }

    #[test]
    fn json_source_parses_an_array_of_records() {
        let json = r#"[{"vector":[1.0,2.0],"metadata":{"a":1}}]"#;
        let records = ImportSource::Json(json.to_string()).into_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vector, Some(vec![1.0, 2.0]));
    }

    #[test]
    fn malformed_json_source_is_a_hard_error() {
        let result = ImportSource::Json("not json".to_string()).into_records();
        assert!(result.is_err());
    }
}
