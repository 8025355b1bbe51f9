//! Document store abstraction.
//!
//! Uploaded originals are persisted outside the vector store so they stay
//! listable, readable, and deletable even when embeddings are unavailable.
//! Two interchangeable backends implement the same contract:
//!
//! - [`local::LocalStore`] — flat files under a per-client directory.
//! - [`managed::ManagedStore`] — rows in a remote relational table plus
//!   objects in a remote object store.
//!
//! The backend is selected once at startup from `storage.backend`. Both
//! backends only ever see file names that passed [`validate_file_name`] and
//! the extension allow-list; enforcement happens before any mutation.

pub mod local;
pub mod managed;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::DocumentInfo;

/// Allow-listed upload extensions and their reported document types.
const ALLOWED_EXTENSIONS: [(&str, &str); 2] = [(".txt", "text"), (".md", "markdown")];

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist one uploaded file. Re-upload under the same name overwrites.
    async fn save(&self, client_id: &str, file_name: &str, content: &[u8]) -> Result<()>;

    /// List a client's documents, newest first. A client with no documents
    /// yields an empty list, not an error.
    async fn list(&self, client_id: &str) -> Result<Vec<DocumentInfo>>;

    /// Read a document's full text. Missing documents are a not-found error.
    async fn content(&self, client_id: &str, file_name: &str) -> Result<String>;

    /// Remove a document. Missing documents are a not-found error and leave
    /// the store untouched.
    async fn delete(&self, client_id: &str, file_name: &str) -> Result<()>;
}

/// Map a file name to its document type if the extension is allow-listed.
pub fn doc_type(file_name: &str) -> Option<&'static str> {
    let lower = file_name.to_lowercase();
    ALLOWED_EXTENSIONS
        .iter()
        .find(|(ext, _)| lower.ends_with(ext))
        .map(|(_, ty)| *ty)
}

/// Reject file names that escape the per-client namespace or carry a
/// disallowed extension. Runs before any filesystem or network mutation.
pub fn validate_file_name(file_name: &str) -> Result<()> {
    if file_name.is_empty() {
        return Err(Error::invalid("File name is required"));
    }
    if file_name.contains('/') || file_name.contains('\\') || file_name.contains("..") {
        return Err(Error::invalid(format!("Invalid file name: {file_name}")));
    }
    if doc_type(file_name).is_none() {
        let ext = file_name
            .rfind('.')
            .map(|i| &file_name[i..])
            .unwrap_or("(none)");
        return Err(Error::invalid(format!(
            "File type {ext} not supported. Only .txt and .md files are allowed."
        )));
    }
    Ok(())
}

/// Format a byte count the way the listing and analytics endpoints report it.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let exp = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exp as i32);
    if exp == 0 {
        format!("{} {}", bytes, UNITS[exp])
    } else {
        format!("{:.2} {}", value, UNITS[exp])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_type_allow_list() {
        assert_eq!(doc_type("notes.txt"), Some("text"));
        assert_eq!(doc_type("README.MD"), Some("markdown"));
        assert_eq!(doc_type("image.png"), None);
        assert_eq!(doc_type("noext"), None);
    }

    #[test]
    fn test_validate_rejects_disallowed_extension() {
        let err = validate_file_name("cat.png").unwrap_err();
        assert!(err.to_string().contains(".png"));
        assert!(err.to_string().contains("Only .txt and .md"));
    }

    #[test]
    fn test_validate_rejects_traversal() {
        assert!(validate_file_name("../etc/passwd.txt").is_err());
        assert!(validate_file_name("a/b.txt").is_err());
        assert!(validate_file_name("a\\b.txt").is_err());
    }

    #[test]
    fn test_validate_accepts_plain_names() {
        assert!(validate_file_name("notes.txt").is_ok());
        assert!(validate_file_name("read me.md").is_ok());
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(2048), "2.00 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.00 MB");
    }
}
