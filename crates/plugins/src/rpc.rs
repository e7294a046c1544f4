//! Assembly of the plugin's RPC surface: the health service plus whatever
//! business services the plugin registers.

use std::sync::Arc;

use {axum::Router, tonic::service::Routes, tracing::debug};

use crate::health::HealthReporter;

/// A gRPC business service mounted next to the health service.
///
/// ```ignore
/// impl RpcService for Greeter {
///     fn name(&self) -> &str {
///         GreeterServer::<GreeterImpl>::NAME
///     }
///
///     fn register(&self, routes: Routes) -> Routes {
///         routes.add_service(GreeterServer::new(GreeterImpl::default()))
///     }
/// }
/// ```
pub trait RpcService: Send + Sync {
    /// Fully qualified service name, as reported through health.
    fn name(&self) -> &str;

    /// Add this service to the routes being served.
    fn register(&self, routes: Routes) -> Routes;
}

/// Add every service to the health routes and mark each one as serving.
pub async fn build_router(health: &HealthReporter, services: &[Arc<dyn RpcService>]) -> Router {
    let mut routes = health.routes();
    health.set_serving("").await;
    for service in services {
        debug!(service = service.name(), "registering rpc service");
        routes = service.register(routes);
        health.set_serving(service.name()).await;
    }
    routes.into_axum_router()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::health::ServingStatus};

    struct Named(&'static str);

    impl RpcService for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn register(&self, routes: Routes) -> Routes {
            routes
        }
    }

    #[tokio::test]
    async fn registered_services_are_serving() {
        let health = HealthReporter::new();
        let services: Vec<Arc<dyn RpcService>> =
            vec![Arc::new(Named("helloworld.Greeter")), Arc::new(Named("echo.Echo"))];
        let _router = build_router(&health, &services).await;
        assert_eq!(health.status(""), Some(ServingStatus::Serving));
        assert_eq!(
            health.status("helloworld.Greeter"),
            Some(ServingStatus::Serving)
        );
        assert_eq!(health.status("echo.Echo"), Some(ServingStatus::Serving));
        assert_eq!(health.status("other"), None);
    }
}
