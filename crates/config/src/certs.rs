//! Certificate and private key lookup.
//!
//! The host hands TLS material over as named byte blobs. A plugin first
//! looks for its own pair and falls back to the shared default pair that
//! every plugin on the host may use.

use std::{collections::HashMap, fmt};

use {
    secrecy::{ExposeSecret, Secret, SecretVec},
    tracing::debug,
};

use crate::error::{Error, Result};

/// Shared certificate blob key used when a plugin has no cert of its own.
pub const DEFAULT_CERT_KEY: &str = "./hive.crt";
/// Shared private key blob key used when a plugin has no key of its own.
pub const DEFAULT_KEY_KEY: &str = "./hivekey.key";

/// Blob names to try, in order, for one plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertKeys {
    pub cert: String,
    pub key: String,
    pub default_cert: String,
    pub default_key: String,
}

impl CertKeys {
    pub fn for_plugin(plugin: &str) -> Self {
        Self {
            cert: format!("./{plugin}.crt"),
            key: format!("./{plugin}key.key"),
            default_cert: DEFAULT_CERT_KEY.to_string(),
            default_key: DEFAULT_KEY_KEY.to_string(),
        }
    }

    #[must_use]
    pub fn with_defaults(mut self, cert: impl Into<String>, key: impl Into<String>) -> Self {
        self.default_cert = cert.into();
        self.default_key = key.into();
        self
    }

    /// Whether `name` is one of the blob keys this plugin consumes.
    pub fn matches(&self, name: &str) -> bool {
        name == self.cert || name == self.key || name == self.default_cert || name == self.default_key
    }
}

/// PEM certificate chain plus its private key.
pub struct CertPair {
    pub cert: Vec<u8>,
    pub key: SecretVec<u8>,
}

impl CertPair {
    pub fn new(cert: Vec<u8>, key: Vec<u8>) -> Self {
        Self {
            cert,
            key: Secret::new(key),
        }
    }

    pub fn key_bytes(&self) -> &[u8] {
        self.key.expose_secret()
    }
}

impl fmt::Debug for CertPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertPair")
            .field("cert_len", &self.cert.len())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Pick the plugin's own cert and key, falling back to the shared defaults
/// independently for each half.
pub fn resolve_cert_pair(blobs: &HashMap<String, Vec<u8>>, keys: &CertKeys) -> Result<CertPair> {
    let cert = match blobs.get(&keys.cert) {
        Some(cert) => cert,
        None => {
            debug!(key = %keys.cert, fallback = %keys.default_cert, "plugin cert absent, using default");
            blobs.get(&keys.default_cert).ok_or(Error::MissingCert)?
        },
    };
    let key = match blobs.get(&keys.key) {
        Some(key) => key,
        None => {
            debug!(key = %keys.key, fallback = %keys.default_key, "plugin key absent, using default");
            blobs.get(&keys.default_key).ok_or(Error::MissingKey)?
        },
    };
    Ok(CertPair::new(cert.clone(), key.clone()))
}
