//! Tenant identity: clientId validation and collection-name derivation.
//!
//! Every document, chunk, and vector belongs to exactly one clientId, and the
//! vector store holds one collection per tenant. The upload and query paths
//! both derive that collection's name through [`collection_name`]; there is
//! deliberately a single derivation function, and it appends a short digest
//! of the raw clientId so tenants whose sanitized names coincide (`"a-b"` and
//! `"a_b"` both sanitize to `a_b`) still map to distinct collections.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Maximum accepted clientId length, in characters.
pub const MAX_CLIENT_ID_LEN: usize = 50;

/// Validate and normalize a caller-supplied clientId.
///
/// Returns the trimmed id, or a validation error for an empty or oversized
/// one. No upstream call is made on the rejection path.
pub fn validate_client_id(client_id: &str) -> Result<String> {
    let trimmed = client_id.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid("Client ID is required and cannot be empty"));
    }
    if trimmed.chars().count() > MAX_CLIENT_ID_LEN {
        return Err(Error::invalid(format!(
            "Client ID must be between 1 and {} characters",
            MAX_CLIENT_ID_LEN
        )));
    }
    Ok(trimmed.to_string())
}

/// Derive the canonical vector-store collection name for a tenant.
///
/// `client_<sanitized>_<digest>` where `<sanitized>` replaces every
/// non-alphanumeric character with `_` and `<digest>` is the first 8 hex
/// characters of the SHA-256 of the raw clientId.
pub fn collection_name(client_id: &str) -> String {
    let sanitized: String = client_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(client_id.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    format!("client_{}_{}", sanitized, &digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_id_is_trimmed() {
        assert_eq!(validate_client_id("  acme  ").unwrap(), "acme");
    }

    #[test]
    fn test_empty_id_rejected() {
        assert!(validate_client_id("").is_err());
        assert!(validate_client_id("   ").is_err());
    }

    #[test]
    fn test_oversized_id_rejected() {
        let id = "x".repeat(51);
        assert!(validate_client_id(&id).is_err());
        let id = "x".repeat(50);
        assert!(validate_client_id(&id).is_ok());
    }

    #[test]
    fn test_collection_name_is_deterministic() {
        assert_eq!(collection_name("acme"), collection_name("acme"));
    }

    #[test]
    fn test_collection_name_sanitizes() {
        let name = collection_name("my client!");
        assert!(name.starts_with("client_my_client_"));
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn test_sanitization_collisions_stay_distinct() {
        // "a-b" and "a_b" sanitize identically; the digest keeps them apart.
        assert_ne!(collection_name("a-b"), collection_name("a_b"));
    }
}
