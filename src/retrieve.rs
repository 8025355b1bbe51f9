//! Query-time retrieval.
//!
//! Embeds the caller's question and pulls the nearest chunks from the
//! tenant's collection, then assembles them into the labelled context block
//! the conversation composer feeds to the completion model. A tenant whose
//! collection does not exist is a distinct condition from a collection that
//! simply has nothing similar: the former is a not-found error, the latter
//! an empty context.

use tracing::debug;

use crate::embedding::EmbeddingClient;
use crate::error::{Error, Result};
use crate::models::RetrievedChunk;
use crate::tenant::{collection_name, validate_client_id};
use crate::vector_index::VectorIndex;

/// Fetch the `top_k` chunks most similar to `question` for one tenant.
pub async fn retrieve_context(
    embedder: &EmbeddingClient,
    vectors: &VectorIndex,
    client_id: &str,
    question: &str,
    top_k: usize,
) -> Result<Vec<RetrievedChunk>> {
    let client_id = validate_client_id(client_id)?;
    if question.trim().is_empty() {
        return Err(Error::invalid("Question is required and cannot be empty"));
    }

    let collection = collection_name(&client_id);
    if !vectors.collection_exists(&collection).await? {
        return Err(Error::NoDocuments(client_id));
    }

    let query_vector = embedder.embed_query(question).await?;
    let chunks = vectors.query(&collection, &query_vector, top_k).await?;

    debug!(
        client = %client_id,
        retrieved = chunks.len(),
        "retrieved context chunks"
    );
    Ok(chunks)
}

/// Render retrieved chunks as the context block placed in the system prompt.
/// Each chunk is labelled with its ordinal and source file so answers can
/// point back at documents. No chunks renders as an empty string.
pub fn build_context_block(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[Document {} - {}]:\n{}", i + 1, chunk.filename, chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
