//! # Status-List Credential Engine
//!
//! Maintains one StatusList2021 credential per (issuer, schema) pair. The
//! list credential is created lazily when the first revocable credential for
//! the pair is issued, and replaced in place (new encoded bitstring, new
//! signature) every time a credential it covers is revoked.
//!
//! Revocation is permanent: a bit, once set, is never cleared, and deleting
//! a credential does not return its bit to the pool.

pub mod allocator;
pub mod bitstring;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::credential::{CredentialStorage, StoreRequest, StoredCredential};
use crate::error::Error;
use crate::model::{
    CredentialSchema, CredentialSubject, VerifiableCredential, STATUS_LIST_2021_CONTEXT,
};
use crate::proof;
use crate::provider::Signer;
use crate::store::{Store, WriteContext};

/// Type value of a status-list credential.
pub const STATUS_LIST_CREDENTIAL_TYPE: &str = "StatusList2021Credential";

/// Type value of a status-list credential's subject.
pub const STATUS_LIST_SUBJECT_TYPE: &str = "StatusList2021";

/// Returns the status-list credential covering (issuer, schema), creating
/// and signing a fresh one when none exists.
///
/// The lookup reads through the caller's open transaction. For a fresh list
/// the prepared store write is returned alongside so the caller can bundle
/// it into the issuance transaction; an existing list needs no write. A
/// fresh list always has room: the pool hands out each of its `L` indexes
/// once and the list holds `L` bits.
///
/// # Errors
///
/// Returns `Error::SigningFailure` if the new list cannot be signed and
/// `Error::StorageFailure` if the lookup fails.
pub async fn get_or_create<S: Store>(
    storage: &CredentialStorage<S>, issuer: &str, schema: &str, signer: &impl Signer,
    tx: &S::Tx,
) -> crate::Result<(StoredCredential, Option<WriteContext>)> {
    let existing = storage.status_lists_by_issuer_schema_tx(issuer, schema, tx).await?;
    if let Some(found) = existing.into_iter().next() {
        tracing::debug!("found status list credential {} for issuer {issuer}", found.credential_id);
        return Ok((found, None));
    }

    let id = format!("urn:uuid:{}", Uuid::new_v4());
    let encoded = bitstring::encode(&bitstring::generate())
        .map_err(|e| Error::StorageFailure(format!("could not encode status list: {e}")))?;

    let mut claims = Map::new();
    claims.insert("type".into(), Value::String(STATUS_LIST_SUBJECT_TYPE.into()));
    claims.insert("statusPurpose".into(), Value::String("revocation".into()));
    claims.insert("encodedList".into(), Value::String(encoded));

    let mut builder = VerifiableCredential::builder()
        .id(id.clone())
        .add_context(STATUS_LIST_2021_CONTEXT)
        .add_type(STATUS_LIST_CREDENTIAL_TYPE)
        .issuer(issuer)
        .add_subject(CredentialSubject {
            id: Some(format!("{id}#list")),
            claims,
        });
    if !schema.is_empty() {
        builder = builder.schema(CredentialSchema {
            id: schema.to_string(),
            type_: CredentialSchema::DEFAULT_TYPE.to_string(),
        });
    }
    let vc = builder.build().map_err(|e| Error::Invalid(e.to_string()))?;
    let signed = proof::sign(vc, signer).await.map_err(Error::signing)?;

    let request = StoreRequest {
        credential: Some(signed),
        token: None,
        revoked: false,
    };
    let (stored, context) = storage.status_list_write_context(&request)?;

    tracing::debug!("created status list credential {id} for issuer {issuer}");
    Ok((stored, Some(context)))
}

/// Flips the credential's revocation bit and re-signs its status list.
///
/// Expects the caller to have loaded the credential and checked the
/// `revoked` flag; both resulting writes (the replaced status-list
/// credential and the credential's `revoked` flag) are buffered into the
/// caller's transaction so they land atomically.
///
/// Setting a bit that is already set is not an error.
///
/// # Errors
///
/// Returns `Error::NotRevocable` when the credential carries no status
/// entry, `Error::NotFound` when its status list is missing, and
/// `Error::SigningFailure` if the list cannot be re-signed.
pub async fn revoke<S: Store>(
    storage: &CredentialStorage<S>, stored: StoredCredential, signer: &impl Signer,
    tx: &mut S::Tx,
) -> crate::Result<StoredCredential> {
    let Some(entry) = stored.status_entry() else {
        return Err(Error::NotRevocable(format!(
            "credential {} has no status list entry",
            stored.credential_id
        )));
    };
    let index = entry
        .index()
        .map_err(|e| Error::Invalid(format!("malformed status list index: {e}")))?;

    let list = storage.get_status_list_tx(&entry.status_list_credential, tx).await?;
    let mut list_vc = list.verifiable_credential()?;

    let mut bits = decode_list(&list_vc)?;
    if index >= bits.len() {
        return Err(Error::Invalid(format!(
            "status list index {index} out of range for list {}",
            list.credential_id
        )));
    }

    if bits[index] {
        tracing::debug!("revocation bit {index} already set on list {}", list.credential_id);
    } else {
        bits.set(index, true);
        let encoded = bitstring::encode(&bits)
            .map_err(|e| Error::StorageFailure(format!("could not encode status list: {e}")))?;
        set_encoded_list(&mut list_vc, encoded);

        // the payload changed, so the signature must too
        list_vc.proof = None;
        let resigned = proof::sign(list_vc, signer).await.map_err(Error::signing)?;

        let request = StoreRequest {
            credential: Some(resigned),
            token: None,
            revoked: false,
        };
        storage.put_status_list_tx(&request, tx)?;
    }

    let request = StoreRequest {
        credential: stored.credential.clone(),
        token: stored.token.clone(),
        revoked: true,
    };
    storage.put_tx(&request, tx)
}

/// Whether the credential's revocation bit is set in its published status
/// list.
///
/// # Errors
///
/// Returns `Error::NotFound` when the credential or its status list is
/// missing and `Error::NotRevocable` when the credential carries no status
/// entry.
pub async fn verify_status<S: Store>(
    storage: &CredentialStorage<S>, credential_id: &str,
) -> crate::Result<bool> {
    let stored = storage.get(credential_id).await?;
    let Some(entry) = stored.status_entry() else {
        return Err(Error::NotRevocable(format!(
            "credential {credential_id} has no status list entry"
        )));
    };
    let index = entry
        .index()
        .map_err(|e| Error::Invalid(format!("malformed status list index: {e}")))?;

    let list = storage.get_status_list(&entry.status_list_credential).await?;
    let list_vc = list.verifiable_credential()?;
    let bits = decode_list(&list_vc)?;

    Ok(bits.get(index).is_some_and(|bit| *bit))
}

/// Pulls the decoded bitstring out of a status-list credential.
fn decode_list(list_vc: &VerifiableCredential) -> crate::Result<bitstring::Bitstring> {
    let claims = subject_claims(list_vc)?;
    let Some(Value::String(encoded)) = claims.get("encodedList") else {
        return Err(Error::StorageFailure(
            "status list credential has no encodedList claim".to_string(),
        ));
    };
    bitstring::decode(encoded)
        .map_err(|e| Error::StorageFailure(format!("could not decode status list: {e}")))
}

fn set_encoded_list(list_vc: &mut VerifiableCredential, encoded: String) {
    if let crate::core::Quota::One(subject) = &mut list_vc.credential_subject {
        subject.claims.insert("encodedList".into(), Value::String(encoded));
    }
}

fn subject_claims(list_vc: &VerifiableCredential) -> crate::Result<&Map<String, Value>> {
    match &list_vc.credential_subject {
        crate::core::Quota::One(subject) => Ok(&subject.claims),
        crate::core::Quota::Many(_) => Err(Error::StorageFailure(
            "status list credential has multiple subjects".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::{Signer as _, SigningKey};

    use super::*;
    use crate::proof::Algorithm;
    use crate::store::memory::MemStore;
    use crate::store::Transaction;

    #[derive(Clone)]
    struct Keystore;

    impl Signer for Keystore {
        fn algorithm(&self) -> Algorithm {
            Algorithm::EdDsa
        }

        fn verification_method(&self) -> String {
            "did:example:issuer#key-0".to_string()
        }

        async fn try_sign(&self, msg: &[u8]) -> crate::provider::Result<Vec<u8>> {
            let signing_key = SigningKey::from_bytes(&[11u8; 32]);
            Ok(signing_key.sign(msg).to_bytes().to_vec())
        }
    }

    #[tokio::test]
    async fn list_credential_created_once_per_issuer_schema() {
        let store = MemStore::new();
        let storage = CredentialStorage::new(store.clone());

        let mut tx = store.begin().await.expect("should begin");
        let (created, context) =
            get_or_create(&storage, "did:example:issuer", "sch123", &Keystore, &tx)
                .await
                .expect("should create");
        let context = context.expect("fresh list should carry a write");
        tx.write_many_tx(vec![context]).expect("should buffer");
        tx.commit().expect("should store list credential");

        let vc = created.verifiable_credential().expect("should hold credential");
        assert_eq!(vc.issuer_id(), "did:example:issuer");
        assert!(vc.proof.is_some());
        let claims = subject_claims(&vc).expect("should hold subject");
        assert_eq!(claims.get("statusPurpose"), Some(&Value::String("revocation".into())));

        // the same pair now resolves to the stored list
        let tx = store.begin().await.expect("should begin");
        let (found, context) =
            get_or_create(&storage, "did:example:issuer", "sch123", &Keystore, &tx)
                .await
                .expect("should find");
        assert_eq!(found.credential_id, created.credential_id);
        assert!(context.is_none());

        // a different schema gets its own list
        let (other, context) =
            get_or_create(&storage, "did:example:issuer", "sch456", &Keystore, &tx)
                .await
                .expect("should create");
        assert_ne!(other.credential_id, created.credential_id);
        assert!(context.is_some());
    }

    #[tokio::test]
    async fn fresh_list_resolves_after_commit() {
        let store = MemStore::new();
        let storage = CredentialStorage::new(store.clone());

        let mut tx = store.begin().await.expect("should begin");
        let (created, context) = get_or_create(&storage, "did:example:issuer", "", &Keystore, &tx)
            .await
            .expect("should create");

        let vc = created.verifiable_credential().expect("should hold credential");
        let bits = decode_list(&vc).expect("should decode");
        assert!(!bits.any());

        // id resolution walks committed keys, so the record resolves only
        // after the buffered write commits
        tx.write_many_tx(vec![context.expect("fresh list should carry a write")])
            .expect("should buffer");
        assert!(matches!(
            storage.get_status_list_tx(&created.credential_id, &tx).await,
            Err(Error::NotFound(_))
        ));
        tx.commit().expect("should commit");

        storage
            .get_status_list(&created.credential_id)
            .await
            .expect("committed list should resolve");
        let listed = storage
            .status_lists_by_issuer_schema("did:example:issuer", "")
            .await
            .expect("should list");
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn revoke_requires_status_entry() {
        let store = MemStore::new();
        let storage = CredentialStorage::new(store.clone());

        let stored = StoredCredential {
            id: "cred-1-is:a-su:b-sc:".to_string(),
            credential_id: "cred-1".to_string(),
            token: Some("a.b.c".to_string()),
            ..StoredCredential::default()
        };

        let mut tx = store.begin().await.expect("should begin");
        let result = revoke(&storage, stored, &Keystore, &mut tx).await;
        drop(tx);
        assert!(matches!(result, Err(Error::NotRevocable(_))));
    }
}
