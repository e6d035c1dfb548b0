//! # Securing Credentials
//!
//! Credentials are secured with one of two mechanisms: an enveloping proof
//! (the credential serialized into a compact JWS, a "JWT credential") or an
//! embedded proof (a `proof` object carried alongside the credential data, a
//! "data-integrity credential").
//!
//! Signing is delegated to the [`Signer`] provider; this module only
//! assembles and verifies the signed artifacts.

use anyhow::{anyhow, bail};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::model::{Proof, VerifiableCredential};
use crate::provider::{Result, Signer, Verifier};

/// Signing algorithms supported by the proof formats.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum Algorithm {
    /// Edwards-curve digital signature (Ed25519).
    #[default]
    #[serde(rename = "EdDSA")]
    EdDsa,

    /// ECDSA over secp256k1 with SHA-256.
    #[serde(rename = "ES256K")]
    Es256K,
}

impl Algorithm {
    /// The data-integrity proof type corresponding to the algorithm.
    #[must_use]
    pub const fn proof_type(self) -> &'static str {
        match self {
            Self::EdDsa => "Ed25519Signature2020",
            Self::Es256K => "EcdsaSecp256k1Signature2019",
        }
    }
}

/// Compact JWS protected header.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Header {
    /// Signing algorithm.
    pub alg: Algorithm,

    /// Token type.
    pub typ: String,

    /// Key ID: the signer's verification method.
    pub kid: String,
}

/// Claims for a credential enveloped as a JWT.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct VcClaims {
    /// The `credentialSubject.id` property: the holder the credential is
    /// intended for.
    pub sub: String,

    /// The credential's `issuanceDate` as a UNIX timestamp.
    pub nbf: i64,

    /// The `issuer` property of the credential.
    pub iss: String,

    /// The credential's `issuanceDate` as a UNIX timestamp.
    pub iat: i64,

    /// The `id` property of the credential.
    pub jti: String,

    /// The credential's `expirationDate` as a UNIX timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// The credential itself.
    pub vc: VerifiableCredential,
}

impl From<VerifiableCredential> for VcClaims {
    fn from(vc: VerifiableCredential) -> Self {
        Self {
            sub: vc.subject_id().unwrap_or_default().to_string(),
            nbf: vc.issuance_date.timestamp(),
            iss: vc.issuer_id().to_string(),
            iat: vc.issuance_date.timestamp(),
            jti: vc.id.clone().unwrap_or_default(),
            exp: vc.expiration_date.map(|exp| exp.timestamp()),
            vc,
        }
    }
}

/// Envelope the credential as a compact JWS signed by `signer`.
///
/// # Errors
///
/// Returns an error if serialization or signing fails.
pub async fn encode_jwt(vc: VerifiableCredential, signer: &impl Signer) -> Result<String> {
    tracing::debug!("proof::encode_jwt");

    let header = Header {
        alg: signer.algorithm(),
        typ: "JWT".to_string(),
        kid: signer.verification_method(),
    };
    let claims = VcClaims::from(vc);

    let header = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&header)?);
    let claims = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&claims)?);
    let payload = format!("{header}.{claims}");

    let signature = signer.try_sign(payload.as_bytes()).await?;
    let encoded = Base64UrlUnpadded::encode_string(&signature);

    Ok(format!("{payload}.{encoded}"))
}

/// Decode a JWT credential's claims without verifying the signature.
///
/// Used to recover a credential's denormalized fields from its token form;
/// callers needing trust must use [`verify_jwt`].
///
/// # Errors
///
/// Returns an error if the token is not a three-part compact JWS or the
/// claims do not parse.
pub fn decode_claims(token: &str) -> Result<VcClaims> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        bail!("token is not a compact JWS");
    }
    let bytes = Base64UrlUnpadded::decode_vec(parts[1])
        .map_err(|e| anyhow!("claims are not base64url: {e}"))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Verify a JWT credential's signature and return its claims.
///
/// # Errors
///
/// Returns an error if the token is malformed or the signature does not
/// verify.
pub async fn verify_jwt(token: &str, verifier: &impl Verifier) -> Result<VcClaims> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        bail!("token is not a compact JWS");
    }
    let payload = format!("{}.{}", parts[0], parts[1]);
    let signature = Base64UrlUnpadded::decode_vec(parts[2])
        .map_err(|e| anyhow!("signature is not base64url: {e}"))?;
    verifier.verify(payload.as_bytes(), &signature).await?;
    decode_claims(token)
}

/// Attach an embedded data-integrity proof to the credential.
///
/// The signature covers the credential's canonical JSON serialization with
/// the `proof` property absent.
///
/// # Errors
///
/// Returns an error if serialization or signing fails.
pub async fn sign(mut vc: VerifiableCredential, signer: &impl Signer) -> Result<VerifiableCredential> {
    tracing::debug!("proof::sign");

    vc.proof = None;
    let payload = serde_json::to_vec(&vc)?;
    let signature = signer.try_sign(&payload).await?;

    vc.proof = Some(Proof {
        type_: signer.algorithm().proof_type().to_string(),
        created: Some(Utc::now()),
        verification_method: signer.verification_method(),
        proof_purpose: "assertionMethod".to_string(),
        proof_value: Base64UrlUnpadded::encode_string(&signature),
    });

    Ok(vc)
}

/// Verify a credential's embedded data-integrity proof.
///
/// # Errors
///
/// Returns an error if the credential carries no proof or the signature does
/// not verify.
pub async fn verify(vc: &VerifiableCredential, verifier: &impl Verifier) -> Result<()> {
    let Some(proof) = &vc.proof else {
        bail!("credential has no proof");
    };
    let signature = Base64UrlUnpadded::decode_vec(&proof.proof_value)
        .map_err(|e| anyhow!("proof value is not base64url: {e}"))?;

    let mut unsigned = vc.clone();
    unsigned.proof = None;
    let payload = serde_json::to_vec(&unsigned)?;

    verifier.verify(&payload, &signature).await
}
