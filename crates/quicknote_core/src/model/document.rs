//! Wire shapes exchanged with the document-store collaborator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One stored document: opaque id plus free-form JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Result envelope of a collection read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentList {
    #[serde(default)]
    pub documents: Vec<Document>,
}
