use crate::core::catalog::{CatalogError, DeferredEntity, EntityMutation, EntityProviderConnection};
use crate::core::models::entity::Entity;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// In process catalog which applies full mutations by replacing every
/// entity previously submitted through the same connection. Each
/// provider gets its own connection via [`MemoryCatalog::connection`]
#[derive(Default)]
pub struct MemoryCatalog {
    scopes: ArcSwap<HashMap<String, Arc<Vec<DeferredEntity>>>>,
}

impl MemoryCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A connection whose full mutations replace the entity set of `scope`
    pub fn connection(self: &Arc<Self>, scope: impl Into<String>) -> Arc<dyn EntityProviderConnection> {
        Arc::new(MemoryConnection {
            catalog: self.clone(),
            scope: scope.into(),
        })
    }

    /// Entities currently held under `location_key`, across all scopes
    pub fn entities(&self, location_key: &str) -> Vec<Entity> {
        self.scopes
            .load()
            .values()
            .flat_map(|entities| entities.iter())
            .filter(|d| d.location_key == location_key)
            .map(|d| d.entity.clone())
            .collect()
    }

    /// Total entity count across all scopes
    pub fn len(&self) -> usize {
        self.scopes.load().values().map(|e| e.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn replace_scope(&self, scope: &str, entities: Vec<DeferredEntity>) {
        let entities = Arc::new(entities);

        // rcu retries the closure if another scope was swapped in meanwhile
        let previous = self.scopes.rcu(|map| {
            let mut map = HashMap::clone(map);
            map.insert(scope.to_string(), entities.clone());
            map
        });

        debug!(
            "Replaced catalog scope {}: {} entities -> {}",
            scope,
            previous.get(scope).map(|e| e.len()).unwrap_or(0),
            entities.len()
        );
    }
}

struct MemoryConnection {
    catalog: Arc<MemoryCatalog>,
    scope: String,
}

#[async_trait]
impl EntityProviderConnection for MemoryConnection {
    async fn apply_mutation(&self, mutation: EntityMutation) -> Result<(), CatalogError> {
        match mutation {
            EntityMutation::Full { entities } => self.catalog.replace_scope(&self.scope, entities),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::entity::{
        EntityMetadataBuilder, GroupEntity, GroupSpec, UserEntity, UserSpec,
    };

    fn user(name: &str) -> Entity {
        UserEntity::new(
            EntityMetadataBuilder::default().name(name).build().unwrap(),
            UserSpec::default(),
        )
        .into()
    }

    fn group(name: &str) -> Entity {
        GroupEntity::new(
            EntityMetadataBuilder::default().name(name).build().unwrap(),
            GroupSpec::default(),
        )
        .into()
    }

    fn full(key: &str, entities: Vec<Entity>) -> EntityMutation {
        EntityMutation::Full {
            entities: entities
                .into_iter()
                .map(|entity| DeferredEntity {
                    location_key: key.to_string(),
                    entity,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_full_mutation_replaces_scope() {
        let catalog = MemoryCatalog::new();
        let conn = catalog.connection("provider-a");

        conn.apply_mutation(full("a", vec![user("u1"), user("u2"), group("g1")]))
            .await
            .unwrap();
        assert_eq!(catalog.entities("a").len(), 3);

        conn.apply_mutation(full("a", vec![user("u2")])).await.unwrap();

        let remaining = catalog.entities("a");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name(), "u2");
    }

    #[tokio::test]
    async fn test_full_mutation_leaves_other_scopes() {
        let catalog = MemoryCatalog::new();
        let conn_a = catalog.connection("provider-a");
        let conn_b = catalog.connection("provider-b");

        conn_a.apply_mutation(full("a", vec![user("u1")])).await.unwrap();
        conn_b
            .apply_mutation(full("b", vec![user("u9"), group("g9")]))
            .await
            .unwrap();
        conn_a.apply_mutation(full("a", vec![])).await.unwrap();

        assert!(catalog.entities("a").is_empty());
        assert_eq!(catalog.entities("b").len(), 2);
        assert_eq!(catalog.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_commits_keep_every_scope() {
        let catalog = MemoryCatalog::new();

        for round in 0..20 {
            let commits: Vec<_> = (0..8)
                .map(|p| {
                    let conn = catalog.connection(format!("provider-{p}"));
                    let key = format!("k{p}");
                    let size = 50 + round;
                    tokio::spawn(async move {
                        let users = (0..size).map(|n| user(&format!("u{n}"))).collect();
                        conn.apply_mutation(full(&key, users)).await
                    })
                })
                .collect();

            for commit in commits {
                commit.await.unwrap().unwrap();
            }

            for p in 0..8 {
                assert_eq!(catalog.entities(&format!("k{p}")).len(), 50 + round);
            }
        }
    }
}
