//! Standard `grpc.health.v1.Health` service.
//!
//! The empty service name stands for the server as a whole. Statuses flip to
//! `NOT_SERVING` when the plugin stops; services never registered answer
//! `NOT_FOUND`.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {tonic::service::Routes, tracing::debug};

pub use tonic_health::ServingStatus;

/// Health service plus a local mirror of what it reports.
#[derive(Clone)]
pub struct HealthReporter {
    reporter: tonic_health::server::HealthReporter,
    routes: Routes,
    statuses: Arc<RwLock<HashMap<String, ServingStatus>>>,
}

impl HealthReporter {
    pub fn new() -> Self {
        let (reporter, service) = tonic_health::server::health_reporter();
        Self {
            reporter,
            routes: Routes::new(service),
            statuses: Arc::default(),
        }
    }

    pub async fn set_status(&self, service: &str, status: ServingStatus) {
        {
            let mut statuses = match self.statuses.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            statuses.insert(service.to_string(), status);
        }
        debug!(service, ?status, "health status changed");
        self.reporter.set_service_status(service, status).await;
    }

    pub async fn set_serving(&self, service: &str) {
        self.set_status(service, ServingStatus::Serving).await;
    }

    /// Mark every known service as not serving.
    pub async fn shutdown(&self) {
        let services: Vec<String> = {
            let statuses = match self.statuses.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            statuses.keys().cloned().collect()
        };
        for service in services {
            self.set_status(&service, ServingStatus::NotServing).await;
        }
    }

    /// `None` for a service that was never registered.
    pub fn status(&self, service: &str) -> Option<ServingStatus> {
        let statuses = match self.statuses.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        statuses.get(service).copied()
    }

    /// gRPC routes holding the health service, ready for business services
    /// to be added.
    pub fn routes(&self) -> Routes {
        self.routes.clone()
    }
}

impl Default for HealthReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HealthReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let statuses = match self.statuses.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f.debug_struct("HealthReporter")
            .field("statuses", &*statuses)
            .finish_non_exhaustive()
    }
}
