//! Service registry with async handlers
//!
//! Actuation commands leave the control core as service calls. The registry
//! routes each `domain.service` to whatever handler the host registered for
//! it, so the transport to real devices stays outside the controllers.

use dashmap::DashMap;
use smartify_core::{Context, ServiceCall};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Result type for service calls
pub type ServiceResult = Result<(), ServiceError>;

/// Future type for async service handlers
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Service handler function type
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// Errors that can occur when calling services
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),
}

/// The service registry manages all registered services
pub struct ServiceRegistry {
    /// Handlers indexed by "domain.service" key
    services: DashMap<String, ServiceHandler>,
}

impl ServiceRegistry {
    /// Create a new empty service registry
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register a handler, replacing any previous one for the same service
    #[instrument(skip(self, domain, service, handler))]
    pub fn register<F, Fut>(&self, domain: impl Into<String>, service: impl Into<String>, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let key = format!("{}.{}", domain.into(), service.into());
        debug!(service = %key, "Registering service");

        let handler: ServiceHandler = Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);
        self.services.insert(key, handler);
    }

    /// Call a service
    ///
    /// The handler receives `context` unchanged; states it writes on behalf
    /// of this call should carry it.
    #[instrument(skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: serde_json::Value,
        context: Context,
    ) -> ServiceResult {
        let key = format!("{}.{}", domain, service);

        let handler = self
            .services
            .get(&key)
            .map(|h| h.clone())
            .ok_or_else(|| {
                warn!(service = %key, "Service not found");
                ServiceError::NotFound {
                    domain: domain.to_string(),
                    service: service.to_string(),
                }
            })?;

        debug!(service = %key, "Calling service");
        handler(ServiceCall::new(domain, service, service_data, context)).await
    }

    /// Check if a service exists
    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&format!("{}.{}", domain, service))
    }

    /// Get the number of registered services
    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for ServiceRegistry
pub type SharedServiceRegistry = Arc<ServiceRegistry>;
