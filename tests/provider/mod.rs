//! Test provider: an ed25519 keystore, a static DID resolver, a permissive
//! schema validator, and a recording webhook hook, plus a store wrapper
//! that injects write failures for atomicity tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Once};

use anyhow::anyhow;
use base64ct::{Base64UrlUnpadded, Encoding};
use credo::proof::Algorithm;
use credo::provider::{
    self, DidResolver, Document, Noun, SchemaValidator, SecOps, Signer, Verb, Verifier,
    WebhookDispatcher,
};
use credo::store::memory::{MemStore, MemTx};
use credo::store::{Store, Transaction, WriteContext};
use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use serde_json::Value;
use tracing_subscriber::FmtSubscriber;

pub const ISSUER_DID: &str = "did:key:z6MkjchhfUsD6mmvni8mCdXHw216Xrm9bQe2mBH1P5RDjVJG";
pub const SUBJECT_DID: &str = "did:key:z6Mkj8Jr1rg3YjVWWhg7ahEYJibqhjBgZt1pDCbT4Lv7D4HX";
const ISSUER_SECRET: &str = "rXK9mP2fTq7wLhB3Vn8cJdYs5aZeGx4ukR6oEPtvW1g";

static INIT: Once = Once::new();

/// Initialise tracing once for all tests.
pub fn init_tracer() {
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder().with_max_level(tracing::Level::ERROR).finish();
        tracing::subscriber::set_global_default(subscriber).expect("subscriber set");
    });
}

#[derive(Clone, Default)]
pub struct Provider {
    webhooks: Arc<Mutex<Vec<(Noun, Verb, Value)>>>,
}

impl Provider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events dispatched so far, in order.
    pub fn webhook_events(&self) -> Vec<(Noun, Verb)> {
        self.webhooks.lock().expect("should lock").iter().map(|(n, v, _)| (*n, *v)).collect()
    }
}

impl provider::Provider for Provider {}

#[derive(Clone, Debug)]
pub struct Keystore;

impl Keystore {
    fn signing_key() -> SigningKey {
        let decoded = Base64UrlUnpadded::decode_vec(ISSUER_SECRET).expect("should decode");
        let secret: [u8; 32] = decoded.try_into().expect("should be 32 bytes");
        SigningKey::from_bytes(&secret)
    }
}

impl Signer for Keystore {
    fn algorithm(&self) -> Algorithm {
        Algorithm::EdDsa
    }

    fn verification_method(&self) -> String {
        format!("{ISSUER_DID}#key-0")
    }

    async fn try_sign(&self, msg: &[u8]) -> provider::Result<Vec<u8>> {
        Ok(Self::signing_key().sign(msg).to_bytes().to_vec())
    }
}

impl Verifier for Keystore {
    async fn verify(&self, msg: &[u8], signature: &[u8]) -> provider::Result<()> {
        let verifying_key: VerifyingKey = Self::signing_key().verifying_key();
        let signature = ed25519_dalek::Signature::try_from(signature)
            .map_err(|e| anyhow!("malformed signature: {e}"))?;
        verifying_key.verify_strict(msg, &signature).map_err(|e| anyhow!("{e}"))
    }
}

impl SecOps for Provider {
    fn signer(&self, _key_id: &str) -> provider::Result<impl Signer> {
        Ok(Keystore)
    }

    fn verifier(&self, _key_id: &str) -> provider::Result<impl Verifier> {
        Ok(Keystore)
    }
}

impl DidResolver for Provider {
    async fn resolve(&self, did: &str) -> provider::Result<Document> {
        if !did.starts_with("did:") {
            return Err(anyhow!("unsupported identifier: {did}"));
        }
        Ok(Document {
            id: did.to_string(),
            ..Document::default()
        })
    }
}

impl SchemaValidator for Provider {
    async fn validate(&self, _schema_id: &str, subject: &Value) -> provider::Result<()> {
        if subject.as_object().is_some_and(|claims| !claims.is_empty()) {
            Ok(())
        } else {
            Err(anyhow!("subject has no claims"))
        }
    }
}

impl WebhookDispatcher for Provider {
    async fn notify(&self, noun: Noun, verb: Verb, payload: Value) {
        self.webhooks.lock().expect("should lock").push((noun, verb, payload));
    }
}

/// A store wrapper that fails the n-th transactional write, for exercising
/// rollback behavior.
#[derive(Clone, Debug, Default)]
pub struct FlakyStore {
    inner: MemStore,
    fail_on_write: Arc<Mutex<Option<usize>>>,
}

impl FlakyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the n-th (1-based) `write_tx` of every subsequent transaction
    /// fail.
    pub fn fail_on_write(&self, n: usize) {
        *self.fail_on_write.lock().expect("should lock") = Some(n);
    }

    /// Clears the injected failure.
    pub fn heal(&self) {
        *self.fail_on_write.lock().expect("should lock") = None;
    }
}

impl Store for FlakyStore {
    type Tx = FlakyTx;

    async fn read(&self, namespace: &str, key: &str) -> provider::Result<Option<Vec<u8>>> {
        self.inner.read(namespace, key).await
    }

    async fn write(&self, namespace: &str, key: &str, value: Vec<u8>) -> provider::Result<()> {
        self.inner.write(namespace, key, value).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> provider::Result<()> {
        self.inner.delete(namespace, key).await
    }

    async fn read_prefix(
        &self, namespace: &str, prefix: &str,
    ) -> provider::Result<BTreeMap<String, Vec<u8>>> {
        self.inner.read_prefix(namespace, prefix).await
    }

    async fn read_all_keys(&self, namespace: &str) -> provider::Result<Vec<String>> {
        self.inner.read_all_keys(namespace).await
    }

    async fn write_many(&self, writes: Vec<WriteContext>) -> provider::Result<()> {
        self.inner.write_many(writes).await
    }

    async fn begin(&self) -> provider::Result<FlakyTx> {
        Ok(FlakyTx {
            inner: self.inner.begin().await?,
            fail_on_write: Arc::clone(&self.fail_on_write),
            writes: 0,
        })
    }
}

pub struct FlakyTx {
    inner: MemTx,
    fail_on_write: Arc<Mutex<Option<usize>>>,
    writes: usize,
}

impl Transaction for FlakyTx {
    fn read_tx(&self, namespace: &str, key: &str) -> provider::Result<Option<Vec<u8>>> {
        self.inner.read_tx(namespace, key)
    }

    fn write_tx(&mut self, namespace: &str, key: &str, value: Vec<u8>) -> provider::Result<()> {
        self.writes += 1;
        if *self.fail_on_write.lock().expect("should lock") == Some(self.writes) {
            return Err(anyhow!("injected write failure at write {}", self.writes));
        }
        self.inner.write_tx(namespace, key, value)
    }

    fn commit(self) -> provider::Result<()> {
        self.inner.commit()
    }
}
