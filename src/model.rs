//! # W3C Verifiable Credentials Data Model
//!
//! A pragmatic implementation of the W3C [Verifiable Credentials Data Model
//! v1.1], carrying the fields the credential lifecycle needs: a flexible
//! issuer (string or object), one-or-many subjects, an optional
//! `StatusList2021Entry` credential status, an optional credential schema,
//! and an embedded data-integrity proof.
//!
//! [Verifiable Credentials Data Model v1.1]: https://www.w3.org/TR/vc-data-model

use std::fmt::{self, Display};

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::Quota;

/// The base JSON-LD context every credential carries.
pub const BASE_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

/// The JSON-LD context for StatusList2021 terms.
pub const STATUS_LIST_2021_CONTEXT: &str = "https://w3id.org/vc/status-list/2021/v1";

/// `VerifiableCredential` represents a W3C Verifiable Credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifiableCredential {
    /// The @context property maps property URIs into short-form aliases. An
    /// ordered set where the first item is the base credentials context.
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// A URI that unambiguously refers to this credential.
    pub id: Option<String>,

    /// The credential type(s). An unordered set of terms; the first is
    /// "`VerifiableCredential`".
    #[serde(rename = "type")]
    pub type_: Quota<String>,

    /// The credential issuer: a URI, or an object whose `id` is one.
    pub issuer: Issuer,

    /// The date-time the credential was issued (RFC 3339).
    pub issuance_date: DateTime<Utc>,

    /// The date-time the credential ceases to be valid, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,

    /// A set of objects containing claims about the credential subject(s).
    pub credential_subject: Quota<CredentialSubject>,

    /// Where and how the current status of the credential (revoked or not)
    /// can be checked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_status: Option<CredentialStatus>,

    /// The schema the credential subject conforms to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_schema: Option<CredentialSchema>,

    /// An embedded data-integrity proof.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl VerifiableCredential {
    /// Returns a new [`VcBuilder`].
    #[must_use]
    pub fn builder() -> VcBuilder {
        VcBuilder::new()
    }

    /// The issuer identifier, regardless of whether the issuer is expressed
    /// as a string or an object.
    #[must_use]
    pub fn issuer_id(&self) -> &str {
        self.issuer.id()
    }

    /// The identifier of the (first) credential subject, when set.
    #[must_use]
    pub fn subject_id(&self) -> Option<&str> {
        let subject = match &self.credential_subject {
            Quota::One(one) => one,
            Quota::Many(many) => many.first()?,
        };
        subject.id.as_deref()
    }

    /// The identifier of the credential schema, when set.
    #[must_use]
    pub fn schema_id(&self) -> Option<&str> {
        self.credential_schema.as_ref().map(|schema| schema.id.as_str())
    }
}

/// The `issuer` property. The data model permits a bare URI or an object
/// carrying descriptive fields alongside one; both forms deserialize here
/// and normalize to the identifier for storage lookups.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Issuer {
    /// The issuer URI on its own.
    Uri(String),

    /// The issuer URI with additional fields.
    Object(IssuerObject),
}

impl Issuer {
    /// The issuer identifier, in either form.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Uri(uri) => uri,
            Self::Object(object) => &object.id,
        }
    }
}

impl Default for Issuer {
    fn default() -> Self {
        Self::Uri(String::new())
    }
}

/// Additional issuer information published alongside the issuer URI.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct IssuerObject {
    /// The issuer URI.
    pub id: String,

    /// Descriptive fields, e.g. a display name.
    #[serde(flatten)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Map<String, Value>>,
}

/// `CredentialSubject` holds claims about the subject(s) referenced by the
/// credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CredentialSubject {
    /// A URI that uniquely identifies the subject of the claims.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Claims about the subject.
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

/// A `StatusList2021Entry`: the reference a credential carries to its bit in
/// a published status list.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatus {
    /// The entry identifier: the status-list credential id, a `#` fragment,
    /// and the index.
    pub id: String,

    /// Always "`StatusList2021Entry`".
    #[serde(rename = "type")]
    pub type_: String,

    /// The purpose of the status entry.
    pub status_purpose: StatusPurpose,

    /// The position of the status bit in the list, expressed as a string.
    pub status_list_index: String,

    /// The identifier of the status-list credential publishing the bit.
    pub status_list_credential: String,
}

impl CredentialStatus {
    /// Type value for a status-list entry.
    pub const TYPE: &'static str = "StatusList2021Entry";

    /// The status-list index as a number.
    ///
    /// # Errors
    ///
    /// Returns an error if the recorded index is not an integer.
    pub fn index(&self) -> anyhow::Result<usize> {
        let index = self.status_list_index.parse()?;
        Ok(index)
    }
}

/// `StatusPurpose` defines what a status entry (and its list) conveys.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StatusPurpose {
    /// Permanently cancels the validity of the credential.
    #[default]
    Revocation,

    /// Temporarily suspends the validity of the credential.
    Suspension,
}

impl Display for StatusPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Revocation => write!(f, "revocation"),
            Self::Suspension => write!(f, "suspension"),
        }
    }
}

/// `CredentialSchema` points at the schema the credential data conforms to.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CredentialSchema {
    /// A URI identifying the schema.
    pub id: String,

    /// The schema validation method, e.g. "`JsonSchemaValidator2018`".
    #[serde(rename = "type")]
    pub type_: String,
}

impl CredentialSchema {
    /// The default schema validation method.
    pub const DEFAULT_TYPE: &'static str = "JsonSchemaValidator2018";
}

/// An embedded data-integrity proof.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Proof {
    /// The proof (signature suite) type, e.g. "`Ed25519Signature2020`".
    #[serde(rename = "type")]
    pub type_: String,

    /// When the proof was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    /// The DID URL of the key that verifies the proof.
    pub verification_method: String,

    /// The relationship between the key and the credential, e.g.
    /// "`assertionMethod`".
    pub proof_purpose: String,

    /// The signature, base64url-encoded without padding.
    pub proof_value: String,
}

/// [`VcBuilder`] is used to build a [`VerifiableCredential`].
#[derive(Clone, Debug, Default)]
pub struct VcBuilder {
    vc: VerifiableCredential,
}

impl VcBuilder {
    /// Returns a new [`VcBuilder`] seeded with the base context and type.
    #[must_use]
    pub fn new() -> Self {
        let mut builder = Self::default();
        builder.vc.context.push(BASE_CONTEXT.to_string());
        builder.vc.type_ = Quota::One("VerifiableCredential".to_string());
        builder.vc.issuance_date = Utc::now();
        builder
    }

    /// Appends to the `@context` property.
    #[must_use]
    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.vc.context.push(context.into());
        self
    }

    /// Sets the `id` property.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.vc.id = Some(id.into());
        self
    }

    /// Appends to the `type` property.
    #[must_use]
    pub fn add_type(mut self, type_: impl Into<String>) -> Self {
        self.vc.type_.add(type_.into());
        self
    }

    /// Sets the `issuer` property.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.vc.issuer = Issuer::Uri(issuer.into());
        self
    }

    /// Adds a `credentialSubject` property.
    #[must_use]
    pub fn add_subject(mut self, subject: CredentialSubject) -> Self {
        let one_set = match self.vc.credential_subject {
            Quota::One(one) => {
                if one == CredentialSubject::default() {
                    Quota::One(subject)
                } else {
                    Quota::Many(vec![one, subject])
                }
            }
            Quota::Many(mut set) => {
                set.push(subject);
                Quota::Many(set)
            }
        };
        self.vc.credential_subject = one_set;
        self
    }

    /// Sets the `credentialStatus` property.
    #[must_use]
    pub fn status(mut self, status: CredentialStatus) -> Self {
        self.vc.credential_status = Some(status);
        self
    }

    /// Sets the `credentialSchema` property.
    #[must_use]
    pub fn schema(mut self, schema: CredentialSchema) -> Self {
        self.vc.credential_schema = Some(schema);
        self
    }

    /// Sets the `expirationDate` property.
    #[must_use]
    pub fn expiration_date(mut self, expires: DateTime<Utc>) -> Self {
        self.vc.expiration_date = Some(expires);
        self
    }

    /// Turns this builder into a [`VerifiableCredential`].
    ///
    /// # Errors
    ///
    /// Fails if a mandatory property has not been set.
    pub fn build(self) -> anyhow::Result<VerifiableCredential> {
        tracing::debug!("VcBuilder::build");

        if self.vc.id.as_deref().unwrap_or_default().is_empty() {
            bail!("no id set");
        }
        if self.vc.issuer_id().is_empty() {
            bail!("no issuer set");
        }
        if let Quota::One(subject) = &self.vc.credential_subject {
            if *subject == CredentialSubject::default() {
                bail!("no credential subject set");
            }
        }

        Ok(self.vc)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builder() {
        let vc = sample_vc();
        let vc_json = serde_json::to_value(&vc).expect("should serialize");

        assert_eq!(
            *vc_json.get("@context").expect("@context should be set"),
            json!(["https://www.w3.org/2018/credentials/v1"])
        );
        assert_eq!(
            *vc_json.get("type").expect("type should be set"),
            json!("VerifiableCredential")
        );
        assert_eq!(
            *vc_json.get("issuer").expect("issuer should be set"),
            json!("did:example:issuer")
        );
        assert_eq!(
            *vc_json.get("credentialSubject").expect("credentialSubject should be set"),
            json!({"id": "did:example:subject", "employeeId": "1234567890"})
        );

        let vc_de: VerifiableCredential =
            serde_json::from_value(vc_json).expect("should deserialize");
        assert_eq!(vc_de, vc);
    }

    #[test]
    fn issuer_object() {
        let mut vc = sample_vc();
        vc.issuer = Issuer::Object(IssuerObject {
            id: "did:example:issuer".to_string(),
            extra: Some(Map::from_iter([(
                "name".to_string(),
                Value::String("Example University".to_string()),
            )])),
        });

        let vc_json = serde_json::to_value(&vc).expect("should serialize");
        assert_eq!(
            *vc_json.get("issuer").expect("issuer should be set"),
            json!({"id": "did:example:issuer", "name": "Example University"}),
        );

        let vc_de: VerifiableCredential =
            serde_json::from_value(vc_json).expect("should deserialize");
        assert_eq!(vc_de.issuer_id(), "did:example:issuer");
    }

    #[test]
    fn status_entry_wire_format() {
        let status = CredentialStatus {
            id: "urn:uuid:list-1#42".to_string(),
            type_: CredentialStatus::TYPE.to_string(),
            status_purpose: StatusPurpose::Revocation,
            status_list_index: "42".to_string(),
            status_list_credential: "urn:uuid:list-1".to_string(),
        };

        let status_json = serde_json::to_value(&status).expect("should serialize");
        assert_eq!(
            status_json,
            json!({
                "id": "urn:uuid:list-1#42",
                "type": "StatusList2021Entry",
                "statusPurpose": "revocation",
                "statusListIndex": "42",
                "statusListCredential": "urn:uuid:list-1"
            })
        );
        assert_eq!(status.index().expect("index should parse"), 42);
    }

    #[test]
    fn builder_requires_subject() {
        let result = VerifiableCredential::builder()
            .id("urn:uuid:cred-1")
            .issuer("did:example:issuer")
            .build();
        assert!(result.is_err());
    }

    fn sample_vc() -> VerifiableCredential {
        VerifiableCredential::builder()
            .id("urn:uuid:cred-1")
            .issuer("did:example:issuer")
            .add_subject(CredentialSubject {
                id: Some("did:example:subject".to_string()),
                claims: json!({"employeeId": "1234567890"})
                    .as_object()
                    .map_or_else(Map::default, Clone::clone),
            })
            .build()
            .expect("should build")
    }
}
