//! Managed document store.
//!
//! Documents are rows in a remote relational table (PostgREST-style API)
//! referencing objects in a remote object store, both scoped by the owning
//! clientId. Objects live under `<bucket>/<clientId>/<fileName>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::config::ManagedConfig;
use crate::error::{Dependency, Error, Result};
use crate::models::DocumentInfo;
use crate::store::{doc_type, format_file_size, DocumentStore};

#[derive(Debug)]
pub struct ManagedStore {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    table: String,
    service_key: String,
}

#[derive(Deserialize)]
struct DocumentRow {
    file_name: String,
    file_size: u64,
    uploaded_at: DateTime<Utc>,
}

impl ManagedStore {
    pub fn new(http: reqwest::Client, config: &ManagedConfig) -> Result<Self> {
        let service_key = config
            .service_key
            .clone()
            .ok_or_else(|| Error::invalid("MANAGED_SERVICE_KEY not set"))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            table: config.table.clone(),
            service_key,
        })
    }

    fn object_url(&self, client_id: &str, file_name: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}/{}",
            self.base_url, self.bucket, client_id, file_name
        )
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    async fn check(&self, resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Error::upstream(
            Dependency::ManagedBackend,
            format!("HTTP {status}: {body}"),
        ))
    }

    async fn fetch_row(&self, client_id: &str, file_name: &str) -> Result<Option<DocumentRow>> {
        let resp = self
            .authed(self.http.get(self.table_url()).query(&[
                ("client_id", format!("eq.{client_id}")),
                ("file_name", format!("eq.{file_name}")),
                ("select", "file_name,file_size,uploaded_at".to_string()),
            ]))
            .send()
            .await
            .map_err(|e| Error::upstream(Dependency::ManagedBackend, e))?;
        let resp = self.check(resp).await?;
        let mut rows: Vec<DocumentRow> = resp
            .json()
            .await
            .map_err(|e| Error::upstream(Dependency::ManagedBackend, e))?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }
}

#[async_trait]
impl DocumentStore for ManagedStore {
    async fn save(&self, client_id: &str, file_name: &str, content: &[u8]) -> Result<()> {
        // Object first; the row only exists for objects that made it.
        let resp = self
            .authed(
                self.http
                    .post(self.object_url(client_id, file_name))
                    .header("x-upsert", "true")
                    .body(content.to_vec()),
            )
            .send()
            .await
            .map_err(|e| Error::upstream(Dependency::ManagedBackend, e))?;
        self.check(resp).await?;

        let resp = self
            .authed(
                self.http
                    .post(self.table_url())
                    .header("Prefer", "resolution=merge-duplicates")
                    .json(&json!({
                        "client_id": client_id,
                        "file_name": file_name,
                        "file_size": content.len(),
                        "uploaded_at": Utc::now().to_rfc3339(),
                    })),
            )
            .send()
            .await
            .map_err(|e| Error::upstream(Dependency::ManagedBackend, e))?;
        self.check(resp).await?;
        Ok(())
    }

    async fn list(&self, client_id: &str) -> Result<Vec<DocumentInfo>> {
        let resp = self
            .authed(self.http.get(self.table_url()).query(&[
                ("client_id", format!("eq.{client_id}")),
                ("select", "file_name,file_size,uploaded_at".to_string()),
                ("order", "uploaded_at.desc".to_string()),
            ]))
            .send()
            .await
            .map_err(|e| Error::upstream(Dependency::ManagedBackend, e))?;
        let resp = self.check(resp).await?;
        let rows: Vec<DocumentRow> = resp
            .json()
            .await
            .map_err(|e| Error::upstream(Dependency::ManagedBackend, e))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let ty = doc_type(&row.file_name)?;
                Some(DocumentInfo {
                    size_formatted: format_file_size(row.file_size),
                    doc_type: ty.to_string(),
                    name: row.file_name,
                    size: row.file_size,
                    uploaded_at: row.uploaded_at,
                })
            })
            .collect())
    }

    async fn content(&self, client_id: &str, file_name: &str) -> Result<String> {
        let resp = self
            .authed(self.http.get(self.object_url(client_id, file_name)))
            .send()
            .await
            .map_err(|e| Error::upstream(Dependency::ManagedBackend, e))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound("File not found".to_string()));
        }
        let resp = self.check(resp).await?;
        resp.text()
            .await
            .map_err(|e| Error::upstream(Dependency::ManagedBackend, e))
    }

    async fn delete(&self, client_id: &str, file_name: &str) -> Result<()> {
        if self.fetch_row(client_id, file_name).await?.is_none() {
            return Err(Error::NotFound("File not found".to_string()));
        }

        let resp = self
            .authed(self.http.delete(self.object_url(client_id, file_name)))
            .send()
            .await
            .map_err(|e| Error::upstream(Dependency::ManagedBackend, e))?;
        self.check(resp).await?;

        let resp = self
            .authed(self.http.delete(self.table_url()).query(&[
                ("client_id", format!("eq.{client_id}")),
                ("file_name", format!("eq.{file_name}")),
            ]))
            .send()
            .await
            .map_err(|e| Error::upstream(Dependency::ManagedBackend, e))?;
        self.check(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_service_key_is_config_error() {
        let config = ManagedConfig {
            url: "https://example.supabase.co".to_string(),
            bucket: "documents".to_string(),
            table: "documents".to_string(),
            service_key: None,
        };
        let err = ManagedStore::new(reqwest::Client::new(), &config).unwrap_err();
        assert!(err.to_string().contains("MANAGED_SERVICE_KEY"));
    }

    #[test]
    fn test_object_path_is_scoped_by_client() {
        let config = ManagedConfig {
            url: "https://example.supabase.co/".to_string(),
            bucket: "documents".to_string(),
            table: "documents".to_string(),
            service_key: Some("key".to_string()),
        };
        let store = ManagedStore::new(reqwest::Client::new(), &config).unwrap();
        assert_eq!(
            store.object_url("acme", "notes.txt"),
            "https://example.supabase.co/storage/v1/object/documents/acme/notes.txt"
        );
    }

    #[test]
    fn test_row_parsing() {
        let rows: Vec<DocumentRow> = serde_json::from_str(
            r#"[{"file_name":"a.md","file_size":12,"uploaded_at":"2026-01-05T10:00:00Z"}]"#,
        )
        .unwrap();
        assert_eq!(rows[0].file_name, "a.md");
        assert_eq!(rows[0].file_size, 12);
    }
}
