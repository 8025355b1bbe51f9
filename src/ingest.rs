//! Upload ingestion pipeline.
//!
//! Coordinates the full flow for one tenant's upload: validate → chunk and
//! tag in memory → replace the persisted originals → drop the old vector
//! collection → embed → recreate and repopulate the collection. An upload
//! replaces the tenant's document set wholesale, so listings and the index
//! never show a union of old and new uploads.
//!
//! Failure policy:
//! - one unreadable file does not abort the others; the report counts what
//!   was actually processed,
//! - an upload with no usable files fails before anything is deleted, so
//!   the previous document set survives,
//! - a missing embedding credential or a failed embedding call degrades to
//!   persisting chunks on disk (content stays readable and deletable) and
//!   flags the result as lacking AI-search capability; the old collection
//!   is still dropped so stale vectors cannot answer queries,
//! - a vector-store failure after successful embedding is a hard error.
//!
//! Ingestion is serialized per clientId: concurrent uploads for the same
//! tenant queue on a per-tenant mutex so reset/upsert sequences cannot
//! interleave. Different tenants proceed concurrently.

use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::chunker::{tag_chunks, TextSplitter};
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingClient;
use crate::error::{Error, Result};
use crate::models::{Chunk, UploadReport};
use crate::store::{validate_file_name, DocumentStore};
use crate::tenant::{collection_name, validate_client_id};
use crate::vector_index::VectorIndex;

/// One file from a multipart upload.
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Per-tenant ingestion locks. Cheap to clone; all clones share the map.
#[derive(Clone, Default)]
pub struct TenantLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for one tenant, creating it on first use. The guard is
    /// held across the whole save/reset/upsert sequence.
    pub async fn acquire(&self, client_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(client_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Process-wide ingestion orchestrator, constructed once at startup.
pub struct Ingestor {
    splitter: TextSplitter,
    store: Arc<dyn DocumentStore>,
    embedder: Option<Arc<EmbeddingClient>>,
    vectors: Arc<VectorIndex>,
    locks: TenantLocks,
    /// Where the no-embeddings chunk dump goes (local backend only).
    fallback_dir: Option<PathBuf>,
}

impl Ingestor {
    pub fn new(
        chunking: &ChunkingConfig,
        store: Arc<dyn DocumentStore>,
        embedder: Option<Arc<EmbeddingClient>>,
        vectors: Arc<VectorIndex>,
        fallback_dir: Option<PathBuf>,
    ) -> Result<Self> {
        Ok(Self {
            splitter: TextSplitter::new(chunking.chunk_size, chunking.chunk_overlap)?,
            store,
            embedder,
            vectors,
            locks: TenantLocks::new(),
            fallback_dir,
        })
    }

    /// Run the full ingestion pipeline for one upload request.
    pub async fn ingest(&self, client_id: &str, files: Vec<UploadedFile>) -> Result<UploadReport> {
        let client_id = validate_client_id(client_id)?;

        if files.is_empty() {
            return Err(Error::invalid("No files provided"));
        }
        // All names are checked before anything is written anywhere.
        for file in &files {
            validate_file_name(&file.name)?;
        }

        let _guard = self.locks.acquire(&client_id).await;

        // Decode and chunk everything in memory first. The store is not
        // touched until at least one new file is known good, so an upload
        // whose files all fail leaves the previous set intact.
        let upload_date = chrono::Utc::now();
        let mut staged: Vec<(&UploadedFile, Vec<Chunk>)> = Vec::new();

        for file in &files {
            match self.prepare_file(&client_id, file, upload_date) {
                Ok(file_chunks) => staged.push((file, file_chunks)),
                Err(e) => {
                    warn!(file = %file.name, error = %e, "failed to process uploaded file");
                }
            }
        }

        if staged.is_empty() {
            return Err(Error::Internal(anyhow::anyhow!(
                "No files could be processed"
            )));
        }

        // Replace the previous document set, mirroring the collection reset.
        for old in self.store.list(&client_id).await? {
            self.store.delete(&client_id, &old.name).await?;
        }

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut processed_files = 0usize;
        for (file, file_chunks) in staged {
            match self.store.save(&client_id, &file.name, &file.bytes).await {
                Ok(()) => {
                    chunks.extend(file_chunks);
                    processed_files += 1;
                }
                Err(e) => {
                    warn!(file = %file.name, error = %e, "failed to persist uploaded file");
                }
            }
        }

        if processed_files == 0 {
            return Err(Error::Internal(anyhow::anyhow!(
                "No files could be processed"
            )));
        }

        let total_chunks = chunks.len();
        info!(
            client = %client_id,
            files = processed_files,
            chunks = total_chunks,
            "ingested upload"
        );

        // The previous upload's vectors must not outlive the documents they
        // came from, whether or not new embeddings can be written. An
        // unreachable vector store is tolerated here: a store that is down
        // cannot serve stale chunks either.
        let collection = collection_name(&client_id);
        if let Err(e) = self.vectors.drop_collection(&collection).await {
            warn!(client = %client_id, error = %e, "failed to drop previous vector collection");
        }

        let Some(embedder) = &self.embedder else {
            self.write_fallback(&client_id, &chunks).await?;
            return Ok(UploadReport {
                message: "Files uploaded and saved successfully (no embeddings - add OpenAI API key to enable AI features)".to_string(),
                processed_files,
                total_chunks,
                has_embeddings: false,
                collection_name: None,
                warning: None,
            });
        };

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = match embedder.embed(&texts).await {
            Ok(vectors) => vectors,
            Err(e) => {
                warn!(client = %client_id, error = %e, "embedding creation failed, saving without embeddings");
                self.write_fallback(&client_id, &chunks).await?;
                return Ok(UploadReport {
                    message: "Files uploaded and saved successfully (embedding creation failed - check your OpenAI API key)".to_string(),
                    processed_files,
                    total_chunks,
                    has_embeddings: false,
                    collection_name: None,
                    warning: Some(
                        "Embedding creation failed - documents saved without AI search capability"
                            .to_string(),
                    ),
                });
            }
        };

        self.vectors.reset_collection(&collection).await?;
        self.vectors.upsert(&collection, &chunks, &vectors).await?;

        info!(client = %client_id, collection = %collection, "vector collection rebuilt");

        Ok(UploadReport {
            message: "Files uploaded and processed successfully with embeddings".to_string(),
            processed_files,
            total_chunks,
            has_embeddings: true,
            collection_name: Some(collection),
            warning: None,
        })
    }

    fn prepare_file(
        &self,
        client_id: &str,
        file: &UploadedFile,
        upload_date: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Chunk>> {
        let text = std::str::from_utf8(&file.bytes)
            .map_err(|_| Error::invalid(format!("File {} is not valid UTF-8 text", file.name)))?;

        let spans = self.splitter.split(text);
        Ok(tag_chunks(
            spans,
            &file.name,
            client_id,
            upload_date,
            file.bytes.len() as u64,
        ))
    }

    /// Persist the chunk dump so content remains inspectable without an index.
    async fn write_fallback(&self, client_id: &str, chunks: &[Chunk]) -> Result<()> {
        let Some(dir) = &self.fallback_dir else {
            return Ok(());
        };
        let client_dir = dir.join("client_data").join(client_id);
        tokio::fs::create_dir_all(&client_dir).await?;

        let dump: Vec<_> = chunks
            .iter()
            .map(|c| {
                json!({
                    "pageContent": c.text,
                    "metadata": {
                        "filename": c.meta.filename,
                        "clientId": c.meta.client_id,
                        "uploadDate": c.meta.upload_date.to_rfc3339(),
                        "fileSize": c.meta.file_size,
                        "chunkIndex": c.index,
                    },
                })
            })
            .collect();

        let path = client_dir.join("processed_docs.json");
        tokio::fs::write(&path, serde_json::to_vec_pretty(&dump)?.as_slice()).await?;
        Ok(())
    }
}
