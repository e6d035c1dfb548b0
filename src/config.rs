//! # Configuration
//!
//! The service configuration document: a TOML file with a `server` section
//! for the HTTP front end and a `services` section selecting the storage
//! provider and naming each hosted service. Secrets can be supplied through
//! the environment rather than the file: `KEYSTORE_PASSWORD` and
//! `DB_PASSWORD` override in-file values after parse.

use std::env;
use std::fmt::{self, Display};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::store::memory::MemStore;

/// Environment variable overriding the keystore password.
pub const KEYSTORE_PASSWORD: &str = "KEYSTORE_PASSWORD";

/// Environment variable overriding the storage password.
pub const DB_PASSWORD: &str = "DB_PASSWORD";

/// Default endpoint services advertise when none is configured.
pub const DEFAULT_SERVICE_ENDPOINT: &str = "http://localhost:8080";

/// The complete configuration document.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server properties.
    pub server: ServerConfig,

    /// Storage selection and per-service properties.
    pub services: ServicesConfig,
}

impl Config {
    /// Parses a configuration document and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` if the document does not parse.
    pub fn from_toml(document: &str) -> crate::Result<Self> {
        let mut config: Self = toml::from_str(document)
            .map_err(|e| Error::Invalid(format!("could not parse configuration: {e}")))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads the configuration document from a file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|e| {
            Error::Invalid(format!("could not read configuration {}: {e}", path.display()))
        })?;
        Self::from_toml(&document)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(password) = env::var(KEYSTORE_PASSWORD) {
            tracing::debug!("keystore password taken from environment");
            self.services.keystore.password = Some(password);
        }
        if let Ok(password) = env::var(DB_PASSWORD) {
            tracing::debug!("storage password taken from environment");
            self.services.storage_password = Some(password);
        }
    }
}

/// Configurable properties of the HTTP server.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host and port the API binds to.
    pub api_host: String,

    /// Request read timeout, e.g. "5s".
    pub read_timeout: String,

    /// Response write timeout, e.g. "5s".
    pub write_timeout: String,

    /// Graceful shutdown window, e.g. "5s".
    pub shutdown_timeout: String,

    /// Log verbosity: one of trace, debug, info, warn, error.
    pub log_level: String,

    /// Whether resolved schemas are cached between validations.
    pub enable_schema_caching: bool,

    /// Whether all CORS origins are accepted.
    pub enable_allow_all_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_host: "0.0.0.0:3000".to_string(),
            read_timeout: "5s".to_string(),
            write_timeout: "5s".to_string(),
            shutdown_timeout: "5s".to_string(),
            log_level: "debug".to_string(),
            enable_schema_caching: true,
            enable_allow_all_cors: false,
        }
    }
}

/// Storage selection and the per-service subsections.
///
/// A single storage provider serves every service.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// The storage provider selector.
    pub storage: StorageKind,

    /// Password for storage providers that require one. Overridden by
    /// `DB_PASSWORD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_password: Option<String>,

    /// Endpoint the services advertise.
    pub service_endpoint: String,

    /// Keystore service properties.
    pub keystore: KeystoreConfig,

    /// DID service properties.
    pub did: DidConfig,

    /// Schema service properties.
    pub schema: ServiceConfig,

    /// Credential service properties.
    pub credential: ServiceConfig,

    /// Manifest service properties.
    pub manifest: ServiceConfig,

    /// Presentation service properties.
    pub presentation: ServiceConfig,

    /// Issuing service properties.
    pub issuing: ServiceConfig,

    /// Webhook service properties.
    pub webhook: ServiceConfig,
}

impl ServicesConfig {
    /// Opens the configured storage backend.
    ///
    /// Backends are registered explicitly: only the in-process provider
    /// ships in-crate, and unregistered selectors fail fast rather than
    /// falling back.
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` for a selector with no registered backend.
    pub fn open_store(&self) -> crate::Result<MemStore> {
        match self.storage {
            StorageKind::Memory => Ok(MemStore::new()),
            kind => Err(Error::Invalid(format!("no storage backend registered for '{kind}'"))),
        }
    }
}

/// Available storage provider selectors.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// The in-process store.
    #[default]
    Memory,

    /// An embedded single-writer file store.
    Bolt,

    /// A Redis server.
    Redis,
}

impl Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Bolt => write!(f, "bolt"),
            Self::Redis => write!(f, "redis"),
        }
    }
}

/// Properties common to every hosted service.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// The service name.
    pub name: String,

    /// Endpoint the service advertises, when it differs from the shared one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_endpoint: Option<String>,
}

/// Keystore service properties.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct KeystoreConfig {
    /// The service name.
    pub name: String,

    /// Endpoint the service advertises, when it differs from the shared one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_endpoint: Option<String>,

    /// Password for the key-encryption KDF. Salted before use. Overridden by
    /// `KEYSTORE_PASSWORD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// DID service properties.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DidConfig {
    /// The service name.
    pub name: String,

    /// Endpoint the service advertises, when it differs from the shared one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_endpoint: Option<String>,

    /// DID methods resolved locally, e.g. `["key", "web"]`.
    pub methods: Vec<String>,
}
