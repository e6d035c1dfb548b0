//! An engine for the issuance, storage, and revocation of W3C Verifiable
//! Credentials.
//!
//! The crate is organized around three cooperating parts:
//!
//! * a signed-credential store ([`credential`]) that keys every record by a
//!   compound prefix key so credentials can be looked up by issuer, subject,
//!   or schema;
//! * a status-list engine ([`status`]) that assigns each revocable credential
//!   a bit in a [StatusList2021] bitstring and maintains the signed
//!   status-list credentials that publish those bits; and
//! * a lifecycle API ([`lifecycle`]) that ties the two together so issuing a
//!   revocable credential and advancing the revocation cursor is a single
//!   atomic unit.
//!
//! Storage is pluggable through the [`store::Store`] trait: a namespaced
//! blob store with prefix scans and single-writer transactions. An in-process
//! backend ships in [`store::memory`].
//!
//! External capabilities (key signing, DID resolution, schema validation,
//! webhook dispatch) are consumed through the provider traits in
//! [`provider`].
//!
//! [StatusList2021]: https://www.w3.org/TR/2023/WD-vc-status-list-20230427

pub mod config;
pub mod core;
pub mod credential;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod proof;
pub mod provider;
pub mod status;
pub mod store;

pub use error::Error;

/// Result type for all public operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
