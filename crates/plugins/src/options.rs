//! Host-side knobs for one plugin instance.

use std::sync::Arc;

use hive_telemetry::StatStore;

use crate::{integrity::IntegrityCheck, rpc::RpcService};

/// Store root statistics are filed under.
pub const DEFAULT_BASE_PATH: &str = "super-secrets/PublicIndex/hive";
/// Name of the identifier segment in statistic paths.
pub const DEFAULT_ID_NAME: &str = "argosId";

/// Where finalized statistics are written.
#[derive(Clone)]
pub struct Persistence {
    pub store: Arc<dyn StatStore>,
    pub base_path: String,
    pub id_name: String,
}

impl Persistence {
    pub fn new(store: Arc<dyn StatStore>) -> Self {
        Self {
            store,
            base_path: DEFAULT_BASE_PATH.to_string(),
            id_name: DEFAULT_ID_NAME.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    #[must_use]
    pub fn with_id_name(mut self, id_name: impl Into<String>) -> Self {
        self.id_name = id_name.into();
        self
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("base_path", &self.base_path)
            .field("id_name", &self.id_name)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
pub struct PluginOptions {
    pub services: Vec<Arc<dyn RpcService>>,
    pub persistence: Option<Persistence>,
    pub integrity: Option<IntegrityCheck>,
    /// Shared cert/key blob names, when the host does not use the standard
    /// ones.
    pub default_certs: Option<(String, String)>,
}

impl PluginOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_service(mut self, service: impl RpcService + 'static) -> Self {
        self.services.push(Arc::new(service));
        self
    }

    #[must_use]
    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    #[must_use]
    pub fn with_integrity(mut self, check: IntegrityCheck) -> Self {
        self.integrity = Some(check);
        self
    }

    #[must_use]
    pub fn with_default_certs(mut self, cert: impl Into<String>, key: impl Into<String>) -> Self {
        self.default_certs = Some((cert.into(), key.into()));
        self
    }
}

impl std::fmt::Debug for PluginOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let services: Vec<&str> = self.services.iter().map(|s| s.name()).collect();
        f.debug_struct("PluginOptions")
            .field("services", &services)
            .field("persistence", &self.persistence)
            .field("integrity", &self.integrity)
            .field("default_certs", &self.default_certs)
            .finish()
    }
}
