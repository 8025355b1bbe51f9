//! Error taxonomy for the pipeline.
//!
//! Four classes of failure flow out of the pipeline, and the HTTP layer maps
//! each to a status code:
//!
//! | Variant | Meaning | Status |
//! |---------|---------|--------|
//! | [`Error::InvalidRequest`] | caller fault, no upstream call was made | 400 |
//! | [`Error::NoDocuments`] | tenant has no ingested collection | 404 |
//! | [`Error::NotFound`] | a named document does not exist | 404 |
//! | [`Error::Upstream`] | embedding/vector-store/completion dependency failed | 500 |
//! | [`Error::Internal`] | everything else | 500 |
//!
//! Upstream failures always name the dependency that failed so operators can
//! tell "ChromaDB is down" from "OpenAI is down"; the underlying cause is
//! logged server-side and never echoed to the caller verbatim.

use thiserror::Error;

/// External dependencies the pipeline calls out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    EmbeddingProvider,
    VectorStore,
    CompletionProvider,
    ManagedBackend,
}

impl Dependency {
    pub fn name(&self) -> &'static str {
        match self {
            Dependency::EmbeddingProvider => "embedding provider",
            Dependency::VectorStore => "vector store",
            Dependency::CompletionProvider => "completion provider",
            Dependency::ManagedBackend => "managed backend",
        }
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed pipeline error.
#[derive(Debug, Error)]
pub enum Error {
    /// The request itself is malformed; rejected before any upstream call.
    #[error("{0}")]
    InvalidRequest(String),

    /// The tenant has never ingested documents (no collection exists).
    #[error("No documents found for client '{0}'. Please upload documents first.")]
    NoDocuments(String),

    /// A specific document does not exist.
    #[error("{0}")]
    NotFound(String),

    /// An external dependency is unreachable or returned an error.
    #[error("{dependency} request failed: {message}")]
    Upstream {
        dependency: Dependency,
        message: String,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidRequest(msg.into())
    }

    pub fn upstream(dependency: Dependency, err: impl std::fmt::Display) -> Self {
        Error::Upstream {
            dependency,
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(err.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_documents_message_names_client() {
        let err = Error::NoDocuments("abc".to_string());
        assert_eq!(
            err.to_string(),
            "No documents found for client 'abc'. Please upload documents first."
        );
    }

    #[test]
    fn test_upstream_names_dependency() {
        let err = Error::upstream(Dependency::VectorStore, "connection refused");
        assert!(err.to_string().contains("vector store"));
        assert!(err.to_string().contains("connection refused"));
    }
}
