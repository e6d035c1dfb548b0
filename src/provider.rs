//! # Providers
//!
//! Capability traits the engine consumes but does not implement: the
//! key-signing oracle, DID resolution, schema validation, and webhook
//! dispatch. Implementers supply a single [`Provider`] that bundles them.

use std::fmt::{self, Display};
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::proof::Algorithm;

/// Result type for provider callbacks.
pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;

/// Bundles the capabilities required by the credential lifecycle API.
pub trait Provider:
    SecOps + DidResolver + SchemaValidator + WebhookDispatcher + Clone + Send + Sync
{
}

/// The `SecOps` trait resolves signing and verification keys by identifier,
/// typically the credential issuer's DID.
pub trait SecOps: Send + Sync {
    /// Returns a signer for the given key identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the signer cannot be
    /// created.
    fn signer(&self, key_id: &str) -> Result<impl Signer>;

    /// Returns a verifier for the given key identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the verifier cannot be
    /// created.
    fn verifier(&self, key_id: &str) -> Result<impl Verifier>;
}

/// Signer is used to provide digital-signing functionality. Key material
/// never crosses the trait boundary: callers submit bytes and receive a
/// signature.
pub trait Signer: Send + Sync {
    /// Algorithm returns the algorithm used by the signer.
    fn algorithm(&self) -> Algorithm;

    /// The verification method a verifier should use to verify the signer's
    /// signature. Typically a DID URL + # + verification key ID.
    fn verification_method(&self) -> String;

    /// Attempt to sign the provided message bytes.
    fn try_sign(&self, msg: &[u8]) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Verifier checks a signature over a message against the key it was
/// resolved for.
pub trait Verifier: Send + Sync {
    /// Verify the signature over the message.
    fn verify(&self, msg: &[u8], signature: &[u8]) -> impl Future<Output = Result<()>> + Send;
}

/// A minimal DID document, sufficient to confirm an issuer resolves.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// The DID the document describes.
    pub id: String,

    /// Verification methods the controller authorizes for assertions.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub verification_method: Vec<VerificationMethod>,
}

/// A verification method entry in a DID document.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// The method identifier (DID URL).
    pub id: String,

    /// The method type, e.g. "`Ed25519VerificationKey2020`".
    #[serde(rename = "type")]
    pub type_: String,

    /// The DID controlling this method.
    pub controller: String,

    /// Key material, as published by the controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_jwk: Option<Value>,
}

/// Resolves DIDs to DID documents.
pub trait DidResolver: Send + Sync {
    /// Resolve the DID to its document.
    fn resolve(&self, did: &str) -> impl Future<Output = Result<Document>> + Send;
}

/// Validates a credential subject against a published JSON schema.
pub trait SchemaValidator: Send + Sync {
    /// Validate the subject claims against the schema.
    fn validate(&self, schema_id: &str, subject: &Value)
        -> impl Future<Output = Result<()>> + Send;
}

/// Entity a webhook event concerns.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Noun {
    /// A stored credential.
    Credential,

    /// A status-list credential.
    StatusList,
}

impl Display for Noun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credential => write!(f, "credential"),
            Self::StatusList => write!(f, "status-list"),
        }
    }
}

/// Action a webhook event reports, in noun.verb notation.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    /// The entity was created.
    Create,

    /// The entity was revoked.
    Revoke,

    /// The entity was deleted.
    Delete,
}

impl Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Revoke => write!(f, "revoke"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Dispatches lifecycle events to registered webhooks.
///
/// Dispatch is fire-and-forget: the engine notifies strictly after commit and
/// delivery failures never affect stored state, so the trait surfaces no
/// error.
pub trait WebhookDispatcher: Send + Sync {
    /// Notify registered webhooks of a `noun.verb` event.
    fn notify(&self, noun: Noun, verb: Verb, payload: Value) -> impl Future<Output = ()> + Send;
}
