use std::sync::Arc;

use crate::metrics::Metrics;
use crate::models::Entity;
use crate::storage::{EntityRepository, StorageError};

/// Stage 3: hands the entity to the storage backend for identity and storage
#[derive(Clone)]
pub struct EventPersistence {
    repository: Arc<dyn EntityRepository>,
    metrics: Option<Arc<Metrics>>,
}

impl EventPersistence {
    pub fn new(repository: Arc<dyn EntityRepository>) -> Self {
        Self {
            repository,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn repository(&self) -> &Arc<dyn EntityRepository> {
        &self.repository
    }

    pub async fn persist(&self, entity: Entity) -> Result<Entity, StorageError> {
        let saved = self.repository.save(entity).await?;
        if let Some(metrics) = &self.metrics {
            metrics.set_entities_stored(self.repository.len());
        }
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryEntityRepository;

    #[tokio::test]
    async fn test_persist_updates_entity_gauge() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let persistence = EventPersistence::new(Arc::new(InMemoryEntityRepository::default()))
            .with_metrics(metrics.clone());

        let saved = persistence.persist(Entity::new("Event 1")).await.unwrap();
        persistence.persist(Entity::new("Event 2")).await.unwrap();

        assert_eq!(saved.id, Some(1));
        assert_eq!(metrics.entities_stored.get(), 2);
        assert_eq!(persistence.repository().len(), 2);
    }
}
