//! # Credential Store
//!
//! Persists issued credentials and status-list credentials as denormalized
//! records keyed by a compound prefix key:
//!
//! ```text
//! {id}-is:{issuer}-su:{subject}-sc:{schema}
//! ```
//!
//! The key format is a contract: lookups by id are prefix scans, lookups by
//! issuer or subject are substring retains over all keys, and lookups by
//! schema match the `sc:` suffix. An empty schema leaves the text after
//! `sc:` empty.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::{CredentialStatus, VerifiableCredential};
use crate::proof;
use crate::store::{Store, Transaction, WriteContext};

/// Namespace for issued credentials.
pub const CREDENTIAL_NAMESPACE: &str = "credential";

/// Namespace for the signed status-list credentials.
pub const STATUS_LIST_CREDENTIAL_NAMESPACE: &str = "status-list-credential";

/// The unique in-store key for a credential.
#[must_use]
pub fn create_prefix_key(id: &str, issuer: &str, subject: &str, schema: &str) -> String {
    format!("{id}-is:{issuer}-su:{subject}-sc:{schema}")
}

/// A request to store a credential in one of its two forms.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct StoreRequest {
    /// The data-integrity form: a credential carrying an embedded proof.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<VerifiableCredential>,

    /// The JWT form: a credential enveloped as a compact JWS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Whether the credential is already revoked.
    pub revoked: bool,
}

impl StoreRequest {
    /// Returns `true` when the request holds a data-integrity credential.
    #[must_use]
    pub fn has_data_integrity_credential(&self) -> bool {
        self.credential.as_ref().is_some_and(|vc| vc.proof.is_some())
    }

    /// Returns `true` when the request holds a JWT credential.
    #[must_use]
    pub fn has_jwt_credential(&self) -> bool {
        self.token.as_ref().is_some_and(|token| !token.is_empty())
    }

    /// Returns `true` when exactly one credential form is present.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.has_data_integrity_credential() != self.has_jwt_credential()
    }
}

/// A credential as stored on disk: one signed form plus denormalized lookup
/// fields.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredential {
    /// The compound prefix key, assigned on first write.
    pub id: String,

    /// The original credential identifier.
    pub credential_id: String,

    /// The data-integrity form. Mutually exclusive with `token`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<VerifiableCredential>,

    /// The JWT form. Mutually exclusive with `credential`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Denormalized issuer identifier.
    pub issuer: String,

    /// Denormalized subject identifier.
    pub subject: String,

    /// Denormalized schema identifier, empty when the credential has none.
    pub schema: String,

    /// Denormalized issuance timestamp (RFC 3339).
    pub issuance_date: String,

    /// Whether the credential has been revoked.
    pub revoked: bool,
}

impl StoredCredential {
    /// The credential data, regardless of stored form. The JWT form is
    /// parsed without signature verification.
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` if the record holds neither form or the
    /// token does not parse.
    pub fn verifiable_credential(&self) -> crate::Result<VerifiableCredential> {
        if let Some(vc) = &self.credential {
            return Ok(vc.clone());
        }
        if let Some(token) = &self.token {
            let claims = proof::decode_claims(token)
                .map_err(|e| Error::Invalid(format!("could not parse credential from token: {e}")))?;
            return Ok(claims.vc);
        }
        Err(Error::Invalid(format!("stored credential {} has no credential payload", self.id)))
    }

    /// The credential's status-list entry, when it was issued revocable.
    #[must_use]
    pub fn status_entry(&self) -> Option<CredentialStatus> {
        self.verifiable_credential().ok()?.credential_status
    }
}

/// Builds the denormalized record for a store request.
fn build_stored(request: &StoreRequest) -> crate::Result<StoredCredential> {
    if request.credential.is_some() && request.token.is_some() {
        return Err(Error::Invalid("both credential forms present".to_string()));
    }
    if !request.is_valid() {
        return Err(Error::Invalid("store request holds no signed credential".to_string()));
    }

    let vc = if let Some(token) = &request.token {
        proof::decode_claims(token)
            .map_err(|e| Error::Invalid(format!("could not parse credential from token: {e}")))?
            .vc
    } else if let Some(credential) = &request.credential {
        credential.clone()
    } else {
        return Err(Error::Invalid("store request holds no signed credential".to_string()));
    };

    let Some(credential_id) = vc.id.clone() else {
        return Err(Error::Invalid("credential has no id".to_string()));
    };
    let issuer = vc.issuer_id().to_string();
    let subject = vc.subject_id().unwrap_or_default().to_string();
    let schema = vc.schema_id().unwrap_or_default().to_string();
    let issuance_date = vc.issuance_date.to_rfc3339();

    Ok(StoredCredential {
        id: create_prefix_key(&credential_id, &issuer, &subject, &schema),
        credential_id,
        credential: request.token.is_none().then_some(vc),
        token: request.token.clone(),
        issuer,
        subject,
        schema,
        issuance_date,
        revoked: request.revoked,
    })
}

fn decode_record(bytes: &[u8]) -> crate::Result<StoredCredential> {
    serde_json::from_slice(bytes).map_err(|e| {
        Error::StorageFailure(format!("could not deserialize stored credential: {e}"))
    })
}

/// Credential persistence over a [`Store`] backend.
#[derive(Clone, Debug)]
pub struct CredentialStorage<S: Store> {
    store: S,
}

impl<S: Store> CredentialStorage<S> {
    /// Creates storage over the given backend.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Prepares the write for an issued credential without performing it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` if the request violates the
    /// exactly-one-form invariant.
    pub fn write_context(
        &self, request: &StoreRequest,
    ) -> crate::Result<(StoredCredential, WriteContext)> {
        Self::write_context_in(request, CREDENTIAL_NAMESPACE)
    }

    /// Prepares the write for a status-list credential without performing it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` if the request violates the
    /// exactly-one-form invariant.
    pub fn status_list_write_context(
        &self, request: &StoreRequest,
    ) -> crate::Result<(StoredCredential, WriteContext)> {
        Self::write_context_in(request, STATUS_LIST_CREDENTIAL_NAMESPACE)
    }

    fn write_context_in(
        request: &StoreRequest, namespace: &str,
    ) -> crate::Result<(StoredCredential, WriteContext)> {
        let stored = build_stored(request)?;
        let value = serde_json::to_vec(&stored)
            .map_err(|e| Error::Invalid(format!("could not serialize credential record: {e}")))?;
        let context = WriteContext::new(namespace, stored.id.clone(), value);
        Ok((stored, context))
    }

    /// Stores an issued credential in its own write.
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` for a malformed request or
    /// `Error::StorageFailure` if the write fails.
    pub async fn put(&self, request: &StoreRequest) -> crate::Result<StoredCredential> {
        let (stored, context) = self.write_context(request)?;
        self.store
            .write(&context.namespace, &context.key, context.value)
            .await
            .map_err(Error::storage)?;
        Ok(stored)
    }

    /// Stores an issued credential through an open transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` for a malformed request or
    /// `Error::StorageFailure` if the write is rejected.
    pub fn put_tx(
        &self, request: &StoreRequest, tx: &mut S::Tx,
    ) -> crate::Result<StoredCredential> {
        let (stored, context) = self.write_context(request)?;
        tx.write_many_tx(vec![context]).map_err(Error::storage)?;
        Ok(stored)
    }

    /// Stores a status-list credential through an open transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` for a malformed request or
    /// `Error::StorageFailure` if the write is rejected.
    pub fn put_status_list_tx(
        &self, request: &StoreRequest, tx: &mut S::Tx,
    ) -> crate::Result<StoredCredential> {
        let (stored, context) = self.status_list_write_context(request)?;
        tx.write_many_tx(vec![context]).map_err(Error::storage)?;
        Ok(stored)
    }

    /// Fetch a credential by its original identifier.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` when no record matches and
    /// `Error::Ambiguous` when the prefix scan matches more than one record
    /// (compound-key corruption).
    pub async fn get(&self, credential_id: &str) -> crate::Result<StoredCredential> {
        self.get_in(credential_id, CREDENTIAL_NAMESPACE).await
    }

    /// Fetch a status-list credential by its identifier.
    ///
    /// # Errors
    ///
    /// As for [`get`](Self::get).
    pub async fn get_status_list(&self, credential_id: &str) -> crate::Result<StoredCredential> {
        self.get_in(credential_id, STATUS_LIST_CREDENTIAL_NAMESPACE).await
    }

    /// Fetch a credential through an open transaction.
    ///
    /// The prefix scan walks committed keys; the record itself is read
    /// through the transaction so the caller observes its own writes.
    ///
    /// # Errors
    ///
    /// As for [`get`](Self::get).
    pub async fn get_tx(&self, credential_id: &str, tx: &S::Tx) -> crate::Result<StoredCredential> {
        let key = self.resolve_key(credential_id, CREDENTIAL_NAMESPACE).await?;
        let bytes = tx
            .read_tx(CREDENTIAL_NAMESPACE, &key)
            .map_err(Error::storage)?
            .ok_or_else(|| Error::NotFound(format!("credential not found: {credential_id}")))?;
        decode_record(&bytes)
    }

    /// Fetch a status-list credential through an open transaction.
    ///
    /// # Errors
    ///
    /// As for [`get`](Self::get).
    pub async fn get_status_list_tx(
        &self, credential_id: &str, tx: &S::Tx,
    ) -> crate::Result<StoredCredential> {
        let key = self.resolve_key(credential_id, STATUS_LIST_CREDENTIAL_NAMESPACE).await?;
        let bytes = tx
            .read_tx(STATUS_LIST_CREDENTIAL_NAMESPACE, &key)
            .map_err(Error::storage)?
            .ok_or_else(|| Error::NotFound(format!("credential not found: {credential_id}")))?;
        decode_record(&bytes)
    }

    async fn get_in(&self, credential_id: &str, namespace: &str) -> crate::Result<StoredCredential> {
        let key = self.resolve_key(credential_id, namespace).await?;
        let bytes = self
            .store
            .read(namespace, &key)
            .await
            .map_err(Error::storage)?
            .ok_or_else(|| Error::NotFound(format!("credential not found: {credential_id}")))?;
        decode_record(&bytes)
    }

    /// Resolves a credential id to its compound key via a prefix scan of
    /// committed keys.
    async fn resolve_key(&self, credential_id: &str, namespace: &str) -> crate::Result<String> {
        let matched =
            self.store.read_prefix(namespace, credential_id).await.map_err(Error::storage)?;
        if matched.len() > 1 {
            return Err(Error::Ambiguous(format!(
                "multiple prefix values matched credential id: {credential_id}"
            )));
        }
        let Some((key, _)) = matched.into_iter().next() else {
            return Err(Error::NotFound(format!("credential not found: {credential_id}")));
        };
        Ok(key)
    }

    /// All credentials whose compound key contains the issuer.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageFailure` if the key listing fails. Individual
    /// records that fail to decode are logged and skipped.
    pub async fn list_by_issuer(&self, issuer: &str) -> crate::Result<Vec<StoredCredential>> {
        let keys = self.all_keys(CREDENTIAL_NAMESPACE).await?;
        let matched = keys.into_iter().filter(|k| k.contains(issuer)).collect();
        self.collect(CREDENTIAL_NAMESPACE, matched).await
    }

    /// All credentials whose compound key contains the subject.
    ///
    /// # Errors
    ///
    /// As for [`list_by_issuer`](Self::list_by_issuer).
    pub async fn list_by_subject(&self, subject: &str) -> crate::Result<Vec<StoredCredential>> {
        let keys = self.all_keys(CREDENTIAL_NAMESPACE).await?;
        let matched = keys.into_iter().filter(|k| k.contains(subject)).collect();
        self.collect(CREDENTIAL_NAMESPACE, matched).await
    }

    /// All credentials whose compound key ends with the schema.
    ///
    /// # Errors
    ///
    /// As for [`list_by_issuer`](Self::list_by_issuer).
    pub async fn list_by_schema(&self, schema: &str) -> crate::Result<Vec<StoredCredential>> {
        let suffix = format!("sc:{schema}");
        let keys = self.all_keys(CREDENTIAL_NAMESPACE).await?;
        let matched = keys.into_iter().filter(|k| k.ends_with(&suffix)).collect();
        self.collect(CREDENTIAL_NAMESPACE, matched).await
    }

    /// All credentials matching both issuer and schema.
    ///
    /// # Errors
    ///
    /// As for [`list_by_issuer`](Self::list_by_issuer).
    pub async fn list_by_issuer_schema(
        &self, issuer: &str, schema: &str,
    ) -> crate::Result<Vec<StoredCredential>> {
        self.list_by_issuer_schema_in(issuer, schema, CREDENTIAL_NAMESPACE).await
    }

    /// All status-list credentials matching both issuer and schema.
    ///
    /// # Errors
    ///
    /// As for [`list_by_issuer`](Self::list_by_issuer).
    pub async fn status_lists_by_issuer_schema(
        &self, issuer: &str, schema: &str,
    ) -> crate::Result<Vec<StoredCredential>> {
        self.list_by_issuer_schema_in(issuer, schema, STATUS_LIST_CREDENTIAL_NAMESPACE).await
    }

    /// All status-list credentials matching both issuer and schema, with
    /// record values read through an open transaction.
    ///
    /// Key enumeration walks committed keys (the transaction's write set is
    /// keyed writes, not scans); values come from the transaction so its own
    /// replacements are observed. Greedy like the other listings.
    ///
    /// # Errors
    ///
    /// As for [`list_by_issuer`](Self::list_by_issuer).
    pub async fn status_lists_by_issuer_schema_tx(
        &self, issuer: &str, schema: &str, tx: &S::Tx,
    ) -> crate::Result<Vec<StoredCredential>> {
        let suffix = format!("sc:{schema}");
        let keys = self.all_keys(STATUS_LIST_CREDENTIAL_NAMESPACE).await?;
        let matched: Vec<String> =
            keys.into_iter().filter(|k| k.contains(issuer) && k.ends_with(&suffix)).collect();

        let mut records = Vec::with_capacity(matched.len());
        for key in matched {
            match tx.read_tx(STATUS_LIST_CREDENTIAL_NAMESPACE, &key) {
                Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                    Ok(record) => records.push(record),
                    Err(e) => tracing::error!("could not deserialize credential <{key}>: {e}"),
                },
                Ok(None) => tracing::warn!("credential <{key}> disappeared during listing"),
                Err(e) => tracing::error!("could not read credential <{key}>: {e}"),
            }
        }
        Ok(records)
    }

    async fn list_by_issuer_schema_in(
        &self, issuer: &str, schema: &str, namespace: &str,
    ) -> crate::Result<Vec<StoredCredential>> {
        let suffix = format!("sc:{schema}");
        let keys = self.all_keys(namespace).await?;
        let matched =
            keys.into_iter().filter(|k| k.contains(issuer) && k.ends_with(&suffix)).collect();
        self.collect(namespace, matched).await
    }

    /// Delete a credential. Deleting an absent credential succeeds.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageFailure` if the lookup or delete fails.
    pub async fn delete(&self, credential_id: &str) -> crate::Result<()> {
        self.delete_in(credential_id, CREDENTIAL_NAMESPACE).await
    }

    /// Delete a status-list credential. Deleting an absent one succeeds.
    ///
    /// # Errors
    ///
    /// As for [`delete`](Self::delete).
    pub async fn delete_status_list(&self, credential_id: &str) -> crate::Result<()> {
        self.delete_in(credential_id, STATUS_LIST_CREDENTIAL_NAMESPACE).await
    }

    async fn delete_in(&self, credential_id: &str, namespace: &str) -> crate::Result<()> {
        // the record regenerates the compound key for the delete
        let stored = match self.get_in(credential_id, namespace).await {
            Ok(stored) => stored,
            Err(Error::NotFound(_)) => {
                tracing::warn!("credential does not exist, cannot delete: {credential_id}");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let key =
            create_prefix_key(&stored.credential_id, &stored.issuer, &stored.subject, &stored.schema);
        self.store.delete(namespace, &key).await.map_err(Error::storage)
    }

    async fn all_keys(&self, namespace: &str) -> crate::Result<Vec<String>> {
        self.store.read_all_keys(namespace).await.map_err(Error::storage)
    }

    /// Greedy fetch: records that fail to read or decode are logged and
    /// skipped so one bad record cannot hide the rest.
    async fn collect(
        &self, namespace: &str, keys: Vec<String>,
    ) -> crate::Result<Vec<StoredCredential>> {
        if keys.is_empty() {
            return Ok(vec![]);
        }

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            match self.store.read(namespace, &key).await {
                Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                    Ok(record) => records.push(record),
                    Err(e) => tracing::error!("could not deserialize credential <{key}>: {e}"),
                },
                Ok(None) => tracing::warn!("credential <{key}> disappeared during listing"),
                Err(e) => tracing::error!("could not read credential <{key}>: {e}"),
            }
        }

        if records.is_empty() {
            tracing::warn!("no credentials able to be retrieved from <{namespace}>");
        }
        Ok(records)
    }
}
