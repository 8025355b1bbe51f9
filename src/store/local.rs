//! Flat-file document store.
//!
//! Originals live as files under `<data_dir>/client_data/<clientId>/docs/`;
//! the sibling `chroma_db/` directory is reserved for local vector-store
//! state and `processed_docs.json` holds the chunk dump written when
//! embeddings are unavailable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::DocumentInfo;
use crate::store::{doc_type, format_file_size, DocumentStore};

pub struct LocalStore {
    data_dir: PathBuf,
}

impl LocalStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Per-client root: `<data_dir>/client_data/<clientId>/`.
    pub fn client_dir(&self, client_id: &str) -> PathBuf {
        self.data_dir.join("client_data").join(client_id)
    }

    fn docs_dir(&self, client_id: &str) -> PathBuf {
        self.client_dir(client_id).join("docs")
    }

    fn doc_path(&self, client_id: &str, file_name: &str) -> PathBuf {
        self.docs_dir(client_id).join(file_name)
    }

    /// Where the no-embeddings chunk dump goes for this client.
    pub fn processed_docs_path(&self, client_id: &str) -> PathBuf {
        self.client_dir(client_id).join("processed_docs.json")
    }
}

fn modified_time(path: &Path) -> Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(modified.into())
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn save(&self, client_id: &str, file_name: &str, content: &[u8]) -> Result<()> {
        let docs_dir = self.docs_dir(client_id);
        tokio::fs::create_dir_all(&docs_dir).await?;
        tokio::fs::create_dir_all(self.client_dir(client_id).join("chroma_db")).await?;
        tokio::fs::write(docs_dir.join(file_name), content).await?;
        Ok(())
    }

    async fn list(&self, client_id: &str) -> Result<Vec<DocumentInfo>> {
        let docs_dir = self.docs_dir(client_id);
        if !docs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut documents = Vec::new();
        let mut entries = tokio::fs::read_dir(&docs_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(doc_type) = doc_type(&name) else {
                continue;
            };
            let size = entry.metadata().await?.len();
            documents.push(DocumentInfo {
                name,
                size,
                size_formatted: format_file_size(size),
                doc_type: doc_type.to_string(),
                uploaded_at: modified_time(&path)?,
            });
        }

        documents.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(documents)
    }

    async fn content(&self, client_id: &str, file_name: &str) -> Result<String> {
        let path = self.doc_path(client_id, file_name);
        if !path.is_file() {
            return Err(Error::NotFound("File not found".to_string()));
        }
        Ok(tokio::fs::read_to_string(&path).await?)
    }

    async fn delete(&self, client_id: &str, file_name: &str) -> Result<()> {
        let path = self.doc_path(client_id, file_name);
        if !path.is_file() {
            return Err(Error::NotFound("File not found".to_string()));
        }
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalStore) {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path());
        (tmp, store)
    }

    #[tokio::test]
    async fn test_save_and_read_back() {
        let (_tmp, store) = store();
        store.save("acme", "notes.txt", b"hello").await.unwrap();
        let content = store.content("acme", "notes.txt").await.unwrap();
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn test_reupload_overwrites() {
        let (_tmp, store) = store();
        store.save("acme", "notes.txt", b"first").await.unwrap();
        store.save("acme", "notes.txt", b"second").await.unwrap();
        assert_eq!(store.content("acme", "notes.txt").await.unwrap(), "second");
        assert_eq!(store.list("acme").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_unknown_client_is_empty() {
        let (_tmp, store) = store();
        assert!(store.list("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_skips_disallowed_extensions() {
        let (_tmp, store) = store();
        store.save("acme", "a.txt", b"a").await.unwrap();
        // A stray file dropped next to the documents is not listed.
        std::fs::write(store.docs_dir("acme").join("junk.bin"), b"x").unwrap();
        let docs = store.list("acme").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name, "a.txt");
        assert_eq!(docs[0].doc_type, "text");
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (_tmp, store) = store();
        store.save("acme", "a.txt", b"a").await.unwrap();
        let err = store.delete("acme", "ghost.txt").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        // The store is untouched.
        assert_eq!(store.list("acme").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let (_tmp, store) = store();
        store.save("acme", "a.txt", b"a").await.unwrap();
        store.delete("acme", "a.txt").await.unwrap();
        assert!(store.list("acme").await.unwrap().is_empty());
        let err = store.content("acme", "a.txt").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_clients_are_isolated() {
        let (_tmp, store) = store();
        store.save("alpha", "a.txt", b"a").await.unwrap();
        store.save("beta", "b.txt", b"b").await.unwrap();
        let alpha = store.list("alpha").await.unwrap();
        assert_eq!(alpha.len(), 1);
        assert_eq!(alpha[0].name, "a.txt");
    }
}
