//! Chroma vector store adapter.
//!
//! Speaks the Chroma v1 REST API: collections are listed, created, and
//! deleted by name; points are added and queried by collection id. One
//! collection holds the chunk/vector pairs for one tenant, and re-ingestion
//! replaces the collection wholesale via [`VectorIndex::reset_collection`]
//! so stale chunks never linger.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use crate::config::VectorStoreConfig;
use crate::error::{Dependency, Error, Result};
use crate::models::{Chunk, RetrievedChunk};

/// Process-wide vector store client, constructed once at startup.
pub struct VectorIndex {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct CollectionInfo {
    id: String,
    name: String,
}

#[derive(Serialize)]
struct AddRequest<'a> {
    ids: Vec<String>,
    embeddings: &'a [Vec<f32>],
    documents: Vec<&'a str>,
    metadatas: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct QueryResponse {
    documents: Vec<Vec<Option<String>>>,
    metadatas: Vec<Vec<Option<serde_json::Value>>>,
    distances: Vec<Vec<f32>>,
}

impl VectorIndex {
    pub fn new(http: reqwest::Client, config: &VectorStoreConfig) -> Self {
        Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn collections_url(&self) -> String {
        format!("{}/api/v1/collections", self.base_url)
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let resp = self
            .http
            .get(self.collections_url())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::upstream(Dependency::VectorStore, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::upstream(
                Dependency::VectorStore,
                format!("HTTP {status}: {body}"),
            ));
        }

        resp.json()
            .await
            .map_err(|e| Error::upstream(Dependency::VectorStore, e))
    }

    /// Resolve a collection name to its id, or `None` if absent.
    async fn resolve(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .list_collections()
            .await?
            .into_iter()
            .find(|c| c.name == name)
            .map(|c| c.id))
    }

    pub async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.resolve(name).await?.is_some())
    }

    /// Delete the named collection. HTTP errors are swallowed: the collection
    /// may simply not exist. Transport failures still surface.
    pub async fn drop_collection(&self, name: &str) -> Result<()> {
        self.http
            .delete(format!("{}/{}", self.collections_url(), name))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::upstream(Dependency::VectorStore, e))?;
        Ok(())
    }

    /// Delete the named collection if present (absence is tolerated), then
    /// create it empty. Called before every full re-ingestion.
    pub async fn reset_collection(&self, name: &str) -> Result<()> {
        self.drop_collection(name).await?;

        let resp = self
            .http
            .post(self.collections_url())
            .timeout(self.timeout)
            .json(&json!({ "name": name, "get_or_create": false }))
            .send()
            .await
            .map_err(|e| Error::upstream(Dependency::VectorStore, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::upstream(
                Dependency::VectorStore,
                format!("failed to create collection '{name}': HTTP {status}: {body}"),
            ));
        }

        Ok(())
    }

    /// Insert (text, vector, metadata) triples into the named collection.
    /// `chunks` and `vectors` must be index-aligned; a length mismatch is a
    /// validation error raised before any network call.
    pub async fn upsert(&self, name: &str, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(Error::invalid(format!(
                "chunk/vector count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        if chunks.is_empty() {
            return Ok(());
        }

        let id = self
            .resolve(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("collection '{name}' does not exist")))?;

        let request = AddRequest {
            ids: chunks.iter().map(|_| Uuid::new_v4().to_string()).collect(),
            embeddings: vectors,
            documents: chunks.iter().map(|c| c.text.as_str()).collect(),
            metadatas: chunks
                .iter()
                .map(|c| {
                    json!({
                        "filename": c.meta.filename,
                        "clientId": c.meta.client_id,
                        "uploadDate": c.meta.upload_date.to_rfc3339(),
                        "fileSize": c.meta.file_size,
                        "chunkIndex": c.index,
                    })
                })
                .collect(),
        };

        let resp = self
            .http
            .post(format!("{}/{}/add", self.collections_url(), id))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::upstream(Dependency::VectorStore, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::upstream(
                Dependency::VectorStore,
                format!("HTTP {status}: {body}"),
            ));
        }

        Ok(())
    }

    /// Return up to `top_k` chunks ordered by ascending distance to
    /// `query_vector`. An empty or undersized collection yields a shorter
    /// (possibly empty) result, not an error; a missing collection is a
    /// distinct not-found condition.
    pub async fn query(
        &self,
        name: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let id = self
            .resolve(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("collection '{name}' does not exist")))?;

        let resp = self
            .http
            .post(format!("{}/{}/query", self.collections_url(), id))
            .timeout(self.timeout)
            .json(&json!({
                "query_embeddings": [query_vector],
                "n_results": top_k,
                "include": ["documents", "metadatas", "distances"],
            }))
            .send()
            .await
            .map_err(|e| Error::upstream(Dependency::VectorStore, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::upstream(
                Dependency::VectorStore,
                format!("HTTP {status}: {body}"),
            ));
        }

        let body: QueryResponse = resp
            .json()
            .await
            .map_err(|e| Error::upstream(Dependency::VectorStore, e))?;

        Ok(parse_query_results(body))
    }
}

/// Flatten Chroma's nested per-query result arrays into retrieved chunks,
/// keeping the provider's ascending-distance order.
fn parse_query_results(body: QueryResponse) -> Vec<RetrievedChunk> {
    let documents = body.documents.into_iter().next().unwrap_or_default();
    let metadatas = body.metadatas.into_iter().next().unwrap_or_default();
    let distances = body.distances.into_iter().next().unwrap_or_default();

    documents
        .into_iter()
        .zip(metadatas.into_iter().chain(std::iter::repeat(None)))
        .zip(distances.into_iter().chain(std::iter::repeat(f32::MAX)))
        .filter_map(|((text, meta), distance)| {
            let text = text?;
            let filename = meta
                .as_ref()
                .and_then(|m| m.get("filename"))
                .and_then(|f| f.as_str())
                .unwrap_or("Unknown file")
                .to_string();
            Some(RetrievedChunk {
                text,
                filename,
                distance,
            })
        })
        .collect()
}
