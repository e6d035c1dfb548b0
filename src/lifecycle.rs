//! # Credential Lifecycle
//!
//! The orchestration layer: issuance, revocation, lookup, and deletion as
//! atomic units over the credential store, the index allocator, and the
//! status-list engine.
//!
//! Issuing a revocable credential runs inside one transaction so that the
//! credential write and the cursor advance land together or not at all. A
//! crash between them would otherwise leak or reuse a revocation index.
//! Webhook dispatch happens strictly after commit and never unwinds stored
//! state.
//!
//! Cancellation is modeled by dropping the returned future: an uncommitted
//! transaction rolls back on drop, while a committed one is unaffected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::instrument;
use uuid::Uuid;

use crate::credential::{CredentialStorage, StoreRequest, StoredCredential};
use crate::error::Error;
use crate::model::{
    CredentialSchema, CredentialStatus, CredentialSubject, StatusPurpose, VerifiableCredential,
    STATUS_LIST_2021_CONTEXT,
};
use crate::proof;
use crate::provider::{Noun, Provider, Signer, Verb};
use crate::status::{self, allocator};
use crate::store::{Store, Transaction};

/// Format of the signed credential produced at issuance.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum CredentialFormat {
    /// The credential enveloped as a compact JWS.
    #[default]
    #[serde(rename = "jwt_vc_json")]
    JwtVcJson,

    /// The credential with an embedded data-integrity proof.
    #[serde(rename = "ldp_vc")]
    DataIntegrityJsonLd,
}

/// A request to issue a credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct IssueRequest {
    /// The issuer DID. Must resolve through the DID resolver and be known to
    /// the key oracle.
    pub issuer: String,

    /// The subject the claims are about.
    pub subject: String,

    /// The schema the claims conform to, validated when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// The claims to issue.
    pub data: Map<String, Value>,

    /// When the credential expires, if ever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,

    /// Whether the credential participates in status-list revocation.
    pub revocable: bool,

    /// The signed form to produce.
    pub format: CredentialFormat,
}

/// The credential lifecycle API.
#[derive(Clone, Debug)]
pub struct CredentialService<S: Store, P: Provider> {
    store: S,
    storage: CredentialStorage<S>,
    provider: P,
}

impl<S: Store, P: Provider> CredentialService<S, P> {
    /// Opens the service, seeding the status-list index pool on first start.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageFailure` if the pool cannot be seeded.
    pub async fn new(store: S, provider: P) -> crate::Result<Self> {
        allocator::init(&store).await?;
        Ok(Self {
            storage: CredentialStorage::new(store.clone()),
            store,
            provider,
        })
    }

    /// Issues a credential.
    ///
    /// A revocable credential is assigned the next status-list index and a
    /// `credentialStatus` entry pointing at its (issuer, schema) status-list
    /// credential, created here when this is the first revocable credential
    /// for the pair. The credential write, the cursor advance, and any fresh
    /// status-list credential commit as one batch.
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` for a malformed request, `Error::Exhausted`
    /// when the index pool is consumed, `Error::SigningFailure` if the key
    /// oracle fails, and `Error::StorageFailure` if the transaction cannot
    /// commit.
    #[instrument(level = "debug", skip(self))]
    pub async fn issue(&self, request: IssueRequest) -> crate::Result<StoredCredential> {
        self.validate(&request).await?;
        let signer = self.provider.signer(&request.issuer).map_err(Error::signing)?;
        let vc = build_credential(&request)?;

        let stored = if request.revocable {
            let mut tx = self.store.begin().await.map_err(Error::storage)?;

            let index = allocator::next_index(&tx)?;
            let schema = request.schema.as_deref().unwrap_or_default();
            let (list, list_context) =
                status::get_or_create(&self.storage, &request.issuer, schema, &signer, &tx)
                    .await?;

            let mut vc = vc;
            vc.context.push(STATUS_LIST_2021_CONTEXT.to_string());
            vc.credential_status = Some(CredentialStatus {
                id: format!("{}#{index}", list.credential_id),
                type_: CredentialStatus::TYPE.to_string(),
                status_purpose: StatusPurpose::Revocation,
                status_list_index: index.to_string(),
                status_list_credential: list.credential_id.clone(),
            });

            // signing happens once the status entry is known
            let store_request = sign_credential(vc, request.format, &signer).await?;
            let (stored, credential_context) = self.storage.write_context(&store_request)?;

            let mut contexts = vec![credential_context, allocator::increment_context(&tx)?];
            if let Some(context) = list_context {
                contexts.push(context);
            }
            tx.write_many_tx(contexts).map_err(Error::storage)?;
            tx.commit().map_err(Error::storage)?;
            stored
        } else {
            let store_request = sign_credential(vc, request.format, &signer).await?;
            self.storage.put(&store_request).await?
        };

        // dispatched strictly after commit
        self.provider
            .notify(Noun::Credential, Verb::Create, serde_json::to_value(&stored).unwrap_or_default())
            .await;
        Ok(stored)
    }

    /// Revokes a credential: sets its `revoked` flag and flips its bit in
    /// the status-list credential, which is re-signed and replaced in place.
    /// Both writes commit in one transaction.
    ///
    /// Revoking an already-revoked credential succeeds without change.
    /// Revocation is permanent: there is no way back to `Active`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown credential,
    /// `Error::NotRevocable` when it was issued without a status entry, and
    /// `Error::SigningFailure` / `Error::StorageFailure` when re-signing or
    /// committing fails.
    #[instrument(level = "debug", skip(self))]
    pub async fn revoke(&self, credential_id: &str) -> crate::Result<StoredCredential> {
        let mut tx = self.store.begin().await.map_err(Error::storage)?;

        let stored = self.storage.get_tx(credential_id, &tx).await?;
        if stored.revoked {
            tracing::debug!("credential {credential_id} is already revoked");
            return Ok(stored);
        }

        let issuer = stored.issuer.clone();
        let signer = self.provider.signer(&issuer).map_err(Error::signing)?;
        let updated = status::revoke(&self.storage, stored, &signer, &mut tx).await?;
        tx.commit().map_err(Error::storage)?;

        self.provider
            .notify(Noun::Credential, Verb::Revoke, serde_json::to_value(&updated).unwrap_or_default())
            .await;
        Ok(updated)
    }

    /// Fetch a credential by its identifier.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` when no record matches and
    /// `Error::Ambiguous` on compound-key corruption.
    pub async fn get(&self, credential_id: &str) -> crate::Result<StoredCredential> {
        self.storage.get(credential_id).await
    }

    /// Fetch a status-list credential by its identifier.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` when no record matches.
    pub async fn get_status_list(&self, credential_id: &str) -> crate::Result<StoredCredential> {
        self.storage.get_status_list(credential_id).await
    }

    /// All credentials issued by the issuer.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageFailure` if the listing fails.
    pub async fn list_by_issuer(&self, issuer: &str) -> crate::Result<Vec<StoredCredential>> {
        self.storage.list_by_issuer(issuer).await
    }

    /// All credentials about the subject.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageFailure` if the listing fails.
    pub async fn list_by_subject(&self, subject: &str) -> crate::Result<Vec<StoredCredential>> {
        self.storage.list_by_subject(subject).await
    }

    /// All credentials conforming to the schema.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageFailure` if the listing fails.
    pub async fn list_by_schema(&self, schema: &str) -> crate::Result<Vec<StoredCredential>> {
        self.storage.list_by_schema(schema).await
    }

    /// All credentials matching both issuer and schema.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageFailure` if the listing fails.
    pub async fn list_by_issuer_schema(
        &self, issuer: &str, schema: &str,
    ) -> crate::Result<Vec<StoredCredential>> {
        self.storage.list_by_issuer_schema(issuer, schema).await
    }

    /// Deletes a credential. The record is removed; its revocation bit, if
    /// any, stays burned in the status list.
    ///
    /// Deleting an absent credential succeeds.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageFailure` if the delete fails.
    #[instrument(level = "debug", skip(self))]
    pub async fn delete(&self, credential_id: &str) -> crate::Result<()> {
        self.storage.delete(credential_id).await?;

        self.provider
            .notify(
                Noun::Credential,
                Verb::Delete,
                serde_json::json!({ "credentialId": credential_id }),
            )
            .await;
        Ok(())
    }

    /// Whether the credential's revocation bit is set in its published
    /// status list.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` when the credential or its status list is
    /// missing and `Error::NotRevocable` when it carries no status entry.
    pub async fn verify_status(&self, credential_id: &str) -> crate::Result<bool> {
        status::verify_status(&self.storage, credential_id).await
    }

    async fn validate(&self, request: &IssueRequest) -> crate::Result<()> {
        if request.issuer.is_empty() {
            return Err(Error::Invalid("issuer is required".to_string()));
        }
        if request.subject.is_empty() {
            return Err(Error::Invalid("subject is required".to_string()));
        }

        self.provider
            .resolve(&request.issuer)
            .await
            .map_err(|e| Error::Invalid(format!("could not resolve issuer: {e}")))?;

        if let Some(schema) = &request.schema {
            self.provider
                .validate(schema, &Value::Object(request.data.clone()))
                .await
                .map_err(|e| {
                    Error::Invalid(format!("credential data does not conform to {schema}: {e}"))
                })?;
        }
        Ok(())
    }
}

fn build_credential(request: &IssueRequest) -> crate::Result<VerifiableCredential> {
    let mut builder = VerifiableCredential::builder()
        .id(format!("urn:uuid:{}", Uuid::new_v4()))
        .issuer(&request.issuer)
        .add_subject(CredentialSubject {
            id: Some(request.subject.clone()),
            claims: request.data.clone(),
        });
    if let Some(schema) = &request.schema {
        builder = builder.schema(CredentialSchema {
            id: schema.clone(),
            type_: CredentialSchema::DEFAULT_TYPE.to_string(),
        });
    }
    if let Some(expiry) = request.expiry {
        builder = builder.expiration_date(expiry);
    }
    builder.build().map_err(|e| Error::Invalid(e.to_string()))
}

async fn sign_credential(
    vc: VerifiableCredential, format: CredentialFormat, signer: &impl Signer,
) -> crate::Result<StoreRequest> {
    match format {
        CredentialFormat::JwtVcJson => {
            let token = proof::encode_jwt(vc, signer).await.map_err(Error::signing)?;
            Ok(StoreRequest {
                credential: None,
                token: Some(token),
                revoked: false,
            })
        }
        CredentialFormat::DataIntegrityJsonLd => {
            let signed = proof::sign(vc, signer).await.map_err(Error::signing)?;
            Ok(StoreRequest {
                credential: Some(signed),
                token: None,
                revoked: false,
            })
        }
    }
}
