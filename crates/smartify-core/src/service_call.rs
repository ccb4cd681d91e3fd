//! Service call type for actuating entities

use crate::{attributes, Context};
use serde::{Deserialize, Serialize};

/// A request to a host service, e.g. `fan.set_percentage`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    /// The domain the service belongs to (e.g., "fan", "light")
    pub domain: String,

    /// The service name (e.g., "turn_on", "set_percentage")
    pub service: String,

    /// Target entity and parameters
    pub service_data: serde_json::Value,

    /// Context of the caller; handlers stamp resulting states with it
    pub context: Context,
}

impl ServiceCall {
    /// Create a new service call
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// Get the full service identifier (domain.service)
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Get a parameter from service_data
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.service_data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Target entity ids, accepting a single string or a list
    pub fn entity_ids(&self) -> Vec<String> {
        match self.service_data.get(attributes::ENTITY_ID) {
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            Some(serde_json::Value::Array(arr)) => arr
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => vec![],
        }
    }
}
