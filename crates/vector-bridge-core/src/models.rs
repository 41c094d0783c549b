//! Core data models shared by the retrieval pipeline and the adapter trainer.

use serde::Serialize;

use crate::text::clean_for_display;

/// Match metadata as stored in the vector index.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// The target index's vector space: its dimensionality and partition.
///
/// Resolved once per process and assumed stable for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub target_dim: usize,
    pub namespace: Option<String>,
}

/// One index match that survived noise filtering.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalCandidate {
    /// Vector identifier in the index.
    pub id: String,
    /// Similarity score exactly as returned by the index.
    pub score: f32,
    /// Raw passage text extracted from metadata.
    pub text: String,
    /// All metadata stored alongside the vector.
    pub metadata: Metadata,
}

impl RetrievalCandidate {
    /// Passage text with extraction damage repaired.
    pub fn display_text(&self) -> String {
        clean_for_display(&self.text)
    }

    /// A metadata value rendered as a string, if present and scalar.
    pub fn metadata_str(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// A supervision example for adapter training: passage text and the
/// vector the index stores for it.
#[derive(Debug, Clone)]
pub struct TrainingPair {
    pub id: String,
    pub text: String,
    pub target: Vec<f32>,
}
