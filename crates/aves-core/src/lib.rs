//! Core domain model for the aves recording pipeline.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const CRATE_NAME: &str = "aves-core";

/// Collection holding classifier output, one document per result.
pub const CLASSIFICATIONS_COLLECTION: &str = "classifications";
/// Collection holding the species reference dataset.
pub const SPECIES_COLLECTION: &str = "aves";

pub const SCIENTIFIC_NAME_FIELD: &str = "scientific_name";
pub const AUDIO_OBJECT_NAME_FIELD: &str = "audio_object_name";
pub const CANONICAL_NAME_FIELD: &str = "canonicalName";

/// Schemaless JSON object as stored in a document collection.
pub type Document = Map<String, Value>;

/// A single audio item returned by the recording archive search.
///
/// Both fields are optional on the wire so one malformed record fails only
/// its own download instead of the whole page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    /// Download URL of the audio file.
    #[serde(default)]
    pub file: Option<String>,
    #[serde(rename = "file-name", default)]
    pub file_name: Option<String>,
}

/// One page of archive search results. Other response fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingPage {
    pub recordings: Vec<Recording>,
}

/// Body returned by the classification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResponse {
    pub results: Vec<Document>,
}

impl ClassificationResponse {
    /// Link every result back to the uploaded audio object.
    pub fn into_documents(self, object_name: &str) -> Vec<Document> {
        self.results
            .into_iter()
            .map(|mut doc| {
                doc.insert(
                    AUDIO_OBJECT_NAME_FIELD.to_string(),
                    Value::String(object_name.to_string()),
                );
                doc
            })
            .collect()
    }
}

/// Globally unique object storage key: random UUID plus the source file's extension.
pub fn audio_object_name(path: &Path) -> String {
    let id = Uuid::new_v4();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{id}.{ext}"),
        _ => id.to_string(),
    }
}

/// Reads a string field, returning `None` for missing or non-string values.
pub fn string_field<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    doc.get(field).and_then(Value::as_str)
}

/// One row of the aggregate report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesCount {
    pub scientific_name: String,
    pub count: u64,
}

/// Timing envelope shared by all stage summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRun {
    pub run_id: Uuid,
    pub stage: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StageRun {
    pub fn finish(stage: &str, run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            stage: stage.to_string(),
            started_at,
            finished_at: Utc::now(),
        }
    }
}
