//! Per-tenant aggregate statistics.
//!
//! Everything here is derived on demand from the document store listing;
//! nothing touches the vector index. Chunk counts are an estimate (one chunk
//! per 500 characters, minimum one per document), which is what the analytics
//! view promises. Exact counts only exist at ingestion time.

use serde::Serialize;
use std::collections::HashMap;

use crate::error::Result;
use crate::store::{format_file_size, DocumentStore};

/// How many history entries count as "recent".
const RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct UploadRecord {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "uploadDate")]
    pub upload_date: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "fileSize")]
    pub file_size: u64,
    #[serde(rename = "fileSizeFormatted")]
    pub file_size_formatted: String,
    #[serde(rename = "fileType")]
    pub file_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analytics {
    #[serde(rename = "documentsUploaded")]
    pub documents_uploaded: usize,
    #[serde(rename = "totalChunks")]
    pub total_chunks: usize,
    #[serde(rename = "totalFileSize")]
    pub total_file_size: u64,
    #[serde(rename = "totalFileSizeFormatted")]
    pub total_file_size_formatted: String,
    #[serde(rename = "averageFileSizeFormatted")]
    pub average_file_size_formatted: String,
    #[serde(rename = "mostCommonType")]
    pub most_common_type: String,
    #[serde(rename = "fileTypes")]
    pub file_types: HashMap<String, usize>,
    #[serde(rename = "uploadHistory")]
    pub upload_history: Vec<UploadRecord>,
    #[serde(rename = "recentActivity")]
    pub recent_activity: Vec<UploadRecord>,
}

/// Estimate chunk count for one document: one chunk per 500 characters,
/// at least one.
pub fn estimate_chunks(char_count: usize) -> usize {
    char_count.div_ceil(500).max(1)
}

pub async fn build_analytics(store: &dyn DocumentStore, client_id: &str) -> Result<Analytics> {
    let documents = store.list(client_id).await?;

    let mut file_types: HashMap<String, usize> = HashMap::new();
    let mut total_chunks = 0usize;
    let mut total_file_size = 0u64;
    let mut upload_history = Vec::with_capacity(documents.len());

    for doc in &documents {
        *file_types.entry(doc.doc_type.clone()).or_insert(0) += 1;
        total_file_size += doc.size;

        let content = store.content(client_id, &doc.name).await?;
        total_chunks += estimate_chunks(content.chars().count());

        upload_history.push(UploadRecord {
            file_name: doc.name.clone(),
            upload_date: doc.uploaded_at,
            file_size: doc.size,
            file_size_formatted: format_file_size(doc.size),
            file_type: doc.doc_type.clone(),
        });
    }

    upload_history.sort_by(|a, b| b.upload_date.cmp(&a.upload_date));
    let recent_activity = upload_history.iter().take(RECENT_LIMIT).cloned().collect();

    let documents_uploaded = documents.len();
    let average = if documents_uploaded > 0 {
        total_file_size / documents_uploaded as u64
    } else {
        0
    };
    let most_common_type = file_types
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(ty, _)| ty.clone())
        .unwrap_or_else(|| "text".to_string());

    Ok(Analytics {
        documents_uploaded,
        total_chunks,
        total_file_size,
        total_file_size_formatted: format_file_size(total_file_size),
        average_file_size_formatted: format_file_size(average),
        most_common_type,
        file_types,
        upload_history,
        recent_activity,
    })
}
