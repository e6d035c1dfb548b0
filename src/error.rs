//! # Errors
//!
//! The error surface for credential lifecycle and revocation operations.
//! Each variant serializes to a JSON body so callers can return it from an
//! HTTP handler unchanged.

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Errors returned by credential storage, status-list, and lifecycle
/// operations.
#[derive(Error, Debug, Deserialize)]
pub enum Error {
    /// The request is malformed: a required field is missing, both credential
    /// forms are present, or a compound key cannot be built.
    #[error(r#"{{"error": "invalid_request", "error_description": "{0}"}}"#)]
    Invalid(String),

    /// The credential, status-list credential, or schema does not exist.
    #[error(r#"{{"error": "not_found", "error_description": "{0}"}}"#)]
    NotFound(String),

    /// A prefix scan matched more than one record for an identifier that must
    /// be unique. Indicates compound-key corruption.
    #[error(r#"{{"error": "ambiguous_identifier", "error_description": "{0}"}}"#)]
    Ambiguous(String),

    /// Revocation was requested for a credential issued without a revocation
    /// index.
    #[error(r#"{{"error": "not_revocable", "error_description": "{0}"}}"#)]
    NotRevocable(String),

    /// The status-list index pool has been consumed.
    #[error(r#"{{"error": "index_pool_exhausted", "error_description": "{0}"}}"#)]
    Exhausted(String),

    /// The underlying key-value store returned an error.
    #[error(r#"{{"error": "storage_failure", "error_description": "{0}"}}"#)]
    StorageFailure(String),

    /// The key-signing oracle returned an error.
    #[error(r#"{{"error": "signing_failure", "error_description": "{0}"}}"#)]
    SigningFailure(String),

    /// Reserved for optimistic-concurrency conflicts.
    #[error(r#"{{"error": "conflict", "error_description": "{0}"}}"#)]
    Conflict(String),
}

impl Error {
    /// Wraps a storage-layer error, preserving the cause as a string.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::StorageFailure(err.to_string())
    }

    /// Wraps a signing-oracle error, preserving the cause as a string.
    pub fn signing(err: impl std::fmt::Display) -> Self {
        Self::SigningFailure(err.to_string())
    }

    /// Transforms the error to a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.to_string()).unwrap_or_default()
    }
}

impl Serialize for Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn json_body() {
        let err = Error::NotFound("credential not found: cred-1".into());
        assert_eq!(
            err.to_json(),
            json!({"error": "not_found", "error_description": "credential not found: cred-1"})
        );
    }

    #[test]
    fn round_trip() {
        let err = Error::Exhausted("no status list indexes remain".into());
        let ser = serde_json::to_value(&err).expect("should serialize");
        assert_eq!(ser["error"], "index_pool_exhausted");
    }
}
