use crate::core::models::entity::Entity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// An entity together with the location key that scopes it.
/// Removals during full reconciliation only ever touch entities
/// carrying the same key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredEntity {
    pub location_key: String,
    pub entity: Entity,
}

/// A reconciliation submission. `Full` means the entity list is the
/// complete current state for its location key(s), anything previously
/// submitted under those keys and now absent is implicitly removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntityMutation {
    Full { entities: Vec<DeferredEntity> },
}

impl EntityMutation {
    pub fn entities(&self) -> &[DeferredEntity] {
        match self {
            EntityMutation::Full { entities } => entities,
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog rejected mutation with status {status}")]
    Status { status: u16 },

    #[error("failed to reach catalog")]
    Transport(#[source] reqwest::Error),

    #[error("catalog mutation rejected: {0}")]
    Rejected(String),
}

impl CatalogError {
    /// Upstream http status, if the failure carried one
    pub fn status(&self) -> Option<u16> {
        match self {
            CatalogError::Status { status } => Some(*status),
            CatalogError::Transport(e) => e.status().map(|s| s.as_u16()),
            CatalogError::Rejected(_) => None,
        }
    }
}

/// Handle through which a provider submits mutations. Owned by
/// whoever hosts the catalog, providers only ever hold a reference
#[async_trait]
pub trait EntityProviderConnection: Send + Sync {
    async fn apply_mutation(&self, mutation: EntityMutation) -> Result<(), CatalogError>;
}

/// Something which publishes entities into the catalog once connected
#[async_trait]
pub trait EntityProvider: Send + Sync {
    /// Unique name of this provider instance
    fn provider_name(&self) -> String;

    /// Hands the provider its connection, called once by the host
    async fn connect(&self, connection: Arc<dyn EntityProviderConnection>) -> Result<(), anyhow::Error>;
}
