//! Core data types used throughout the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provenance attached to every chunk produced from one uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMeta {
    pub filename: String,
    #[serde(rename = "clientId")]
    pub client_id: String,
    #[serde(rename = "uploadDate")]
    pub upload_date: DateTime<Utc>,
    #[serde(rename = "fileSize")]
    pub file_size: u64,
}

/// A bounded text span derived from a document: the unit of embedding
/// and retrieval. Identity is `(meta.filename, index)` within one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub index: usize,
    pub meta: ChunkMeta,
}

/// A document as reported by the document store listing.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub name: String,
    pub size: u64,
    #[serde(rename = "sizeFormatted")]
    pub size_formatted: String,
    /// `"text"` for `.txt`, `"markdown"` for `.md`.
    #[serde(rename = "type")]
    pub doc_type: String,
    #[serde(rename = "uploadedAt")]
    pub uploaded_at: DateTime<Utc>,
}

/// One conversation turn supplied by the caller. The server keeps no
/// conversation state; the full history arrives with every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// A chunk returned from the vector index for a query, most similar first.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    pub filename: String,
    /// Distance reported by the vector store (ascending = more similar).
    pub distance: f32,
}

/// Outcome of one upload request, reported back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub message: String,
    #[serde(rename = "processedFiles")]
    pub processed_files: usize,
    #[serde(rename = "totalChunks")]
    pub total_chunks: usize,
    #[serde(rename = "hasEmbeddings")]
    pub has_embeddings: bool,
    #[serde(rename = "collectionName", skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}
