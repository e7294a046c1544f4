//! Plugin configuration: the common config block shared by every plugin,
//! listen port resolution, and TLS certificate/key lookup with fallback to
//! the shared default material.
//!
//! Everything here is resolved from values the host hands over at attach
//! time. Nothing is read from disk.

pub mod certs;
pub mod error;
pub mod schema;

pub use {
    certs::{CertKeys, CertPair, DEFAULT_CERT_KEY, DEFAULT_KEY_KEY, resolve_cert_pair},
    error::{Error, Result},
    schema::{COMMON_PATH, CommonConfig, CommonConfigSource, PORT_KEY, PortValue},
};

/// Property keys the host must supply for `plugin`, in the order the host
/// should look them up.
pub fn config_paths(plugin: &str) -> Vec<String> {
    let keys = CertKeys::for_plugin(plugin);
    vec![COMMON_PATH.to_string(), keys.cert, keys.key]
}
