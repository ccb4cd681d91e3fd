//! Entity ID type representing a `domain.object_id` pair

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for malformed entity IDs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity_id '{0}' must have the form 'domain.object_id'")]
    InvalidFormat(String),

    #[error("entity_id '{0}' has an invalid domain")]
    InvalidDomain(String),

    #[error("entity_id '{0}' has an invalid object_id")]
    InvalidObjectId(String),
}

/// Identifier of an entity on the host (e.g. `fan.bedroom_ceiling`)
///
/// Both parts are lowercase ASCII alphanumerics and underscores and may not
/// start or end with an underscore; the domain may not contain `__`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

impl EntityId {
    /// Create an EntityId from its two parts
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let domain = domain.into();
        let object_id = object_id.into();
        let full = || format!("{domain}.{object_id}");

        if !is_slug(&domain) || domain.contains("__") {
            return Err(EntityIdError::InvalidDomain(full()));
        }
        if !is_slug(&object_id) {
            return Err(EntityIdError::InvalidObjectId(full()));
        }

        Ok(Self { domain, object_id })
    }

    /// The domain part, e.g. `fan`
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The object part, e.g. `bedroom_ceiling`
    pub fn object_id(&self) -> &str {
        &self.object_id
    }
}

fn is_slug(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('_')
        && !s.ends_with('_')
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, object_id)) if !object_id.contains('.') => {
                Self::new(domain, object_id)
            }
            _ => Err(EntityIdError::InvalidFormat(s.to_string())),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}
