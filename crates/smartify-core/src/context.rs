//! Context type for tracking the cause of state changes

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifies who caused a state change or service call
///
/// A service handler stamps the states it writes with the context of the call
/// it is serving, so whoever issued the call can later recognise the
/// resulting state change as its own doing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier for this context (ULID)
    pub id: String,

    /// Context that caused this one, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    /// Create a new context with a fresh ULID
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: None,
        }
    }

    /// Create a context with a specific ID
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
        }
    }

    /// Create a child context caused by this one
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: Some(self.id.clone()),
        }
    }

    /// Whether this context is `id` itself or was directly caused by it
    pub fn originates_from(&self, id: &str) -> bool {
        self.id == id || self.parent_id.as_deref() == Some(id)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
