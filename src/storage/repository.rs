use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::StorageError;
use crate::models::{Entity, EntityId};

// ============================================================================
// Entity Repository
// ============================================================================
//
// Contract for the storage backend behind the persistence stage:
// - an entity without id gets the next identity (never reused)
// - an entity with id keeps it; the stored data is overwritten
//
// The in-memory backend pairs an atomic counter with a sharded map. Each
// save holds at most one shard lock, so saves of different entities do not
// wait on each other beyond that section.
//
// ============================================================================

#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Store the entity, assigning an identity when it has none
    async fn save(&self, entity: Entity) -> Result<Entity, StorageError>;

    async fn find(&self, id: EntityId) -> Option<Entity>;

    /// Number of stored entities
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct InMemoryEntityRepository {
    entities: DashMap<EntityId, Entity>,
    id_generator: AtomicU64,
    stored: AtomicUsize,
    max_entities: Option<usize>,
}

impl Default for InMemoryEntityRepository {
    fn default() -> Self {
        Self::new(None)
    }
}

impl InMemoryEntityRepository {
    pub fn new(max_entities: Option<usize>) -> Self {
        Self {
            entities: DashMap::new(),
            id_generator: AtomicU64::new(0),
            stored: AtomicUsize::new(0),
            max_entities,
        }
    }

    /// Claim room for one new entity, failing when the store is full
    fn reserve_slot(&self) -> Result<(), StorageError> {
        let max = match self.max_entities {
            Some(max) => max,
            None => {
                self.stored.fetch_add(1, Ordering::SeqCst);
                return Ok(());
            }
        };

        self.stored
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .map(|_| ())
            .map_err(|_| StorageError::CapacityExhausted { capacity: max })
    }

    fn next_id(&self) -> EntityId {
        self.id_generator.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl EntityRepository for InMemoryEntityRepository {
    async fn save(&self, mut entity: Entity) -> Result<Entity, StorageError> {
        match entity.id {
            Some(id) => {
                match self.entities.entry(id) {
                    Entry::Occupied(mut existing) => {
                        existing.insert(entity.clone());
                    }
                    Entry::Vacant(slot) => {
                        self.reserve_slot()?;
                        slot.insert(entity.clone());
                    }
                }
                // Generated ids must stay above every caller-supplied one
                self.id_generator.fetch_max(id, Ordering::SeqCst);
            }
            None => {
                // Reserve before taking an id so a rejected save burns none
                self.reserve_slot()?;
                loop {
                    let id = self.next_id();
                    // Occupied only when a caller-supplied id raced the counter
                    if let Entry::Vacant(slot) = self.entities.entry(id) {
                        entity.id = Some(id);
                        slot.insert(entity.clone());
                        break;
                    }
                }
            }
        }

        tracing::debug!(entity_id = ?entity.id, "Entity stored");
        Ok(entity)
    }

    async fn find(&self, id: EntityId) -> Option<Entity> {
        self.entities.get(&id).map(|e| e.value().clone())
    }

    fn len(&self) -> usize {
        self.stored.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_save_assigns_increasing_ids() {
        let repo = InMemoryEntityRepository::default();

        let first = repo.save(Entity::new("Event 1")).await.unwrap();
        let second = repo.save(Entity::new("Event 2")).await.unwrap();

        assert_eq!(first.id, Some(1));
        assert_eq!(second.id, Some(2));
        assert_eq!(repo.find(1).await.unwrap().data, "Event 1");
        assert_eq!(repo.len(), 2);
    }

    #[tokio::test]
    async fn test_resave_keeps_id_and_updates_data() {
        let repo = InMemoryEntityRepository::default();
        let saved = repo.save(Entity::new("original")).await.unwrap();

        let mut changed = saved.clone();
        changed.data = "updated".to_string();
        let resaved = repo.save(changed).await.unwrap();

        assert_eq!(resaved.id, saved.id);
        assert_eq!(repo.find(1).await.unwrap().data, "updated");
        assert_eq!(repo.len(), 1);

        // The counter was not touched by the re-save
        let next = repo.save(Entity::new("next")).await.unwrap();
        assert_eq!(next.id, Some(2));
    }

    #[tokio::test]
    async fn test_generated_ids_skip_caller_supplied_ids() {
        let repo = InMemoryEntityRepository::default();
        repo.save(Entity::new("caller").with_id(2)).await.unwrap();

        let a = repo.save(Entity::new("a")).await.unwrap();
        let b = repo.save(Entity::new("b")).await.unwrap();

        assert_ne!(a.id, Some(2));
        assert_ne!(b.id, Some(2));
        assert_ne!(a.id, b.id);
        assert_eq!(repo.find(2).await.unwrap().data, "caller");
        assert_eq!(repo.find(a.id.unwrap()).await.unwrap().data, "a");
        assert_eq!(repo.find(b.id.unwrap()).await.unwrap().data, "b");
        assert_eq!(repo.len(), 3);
        assert_eq!(repo.len(), repo.entities.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_saves_after_caller_ids_never_overwrite() {
        let repo = Arc::new(InMemoryEntityRepository::default());
        for id in [3, 5, 7] {
            repo.save(Entity::new(format!("fixed{}", id)).with_id(id)).await.unwrap();
        }

        let handles: Vec<_> = (0..100)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.save(Entity::new(format!("gen{}", i))).await })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            let entity = handle.await.unwrap().unwrap();
            let id = entity.id.unwrap();
            assert!(id > 7, "generated id {} collides with a caller id range", id);
            assert!(ids.insert(id));
        }

        assert_eq!(repo.find(5).await.unwrap().data, "fixed5");
        assert_eq!(repo.len(), 103);
        assert_eq!(repo.len(), repo.entities.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_saves_get_distinct_ids() {
        let repo = Arc::new(InMemoryEntityRepository::default());

        let handles: Vec<_> = (0..500)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.save(Entity::new(format!("e{}", i))).await })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            let entity = handle.await.unwrap().unwrap();
            assert!(ids.insert(entity.id.unwrap()), "duplicate id {:?}", entity.id);
        }

        assert_eq!(ids.len(), 500);
        assert_eq!(ids.iter().copied().max(), Some(500));
        assert_eq!(repo.len(), 500);
    }

    #[tokio::test]
    async fn test_capacity_exhausted_burns_no_id() {
        let repo = InMemoryEntityRepository::new(Some(1));
        let saved = repo.save(Entity::new("a")).await.unwrap();

        let err = repo.save(Entity::new("b")).await.unwrap_err();
        assert_eq!(err, StorageError::CapacityExhausted { capacity: 1 });

        // Overwriting an existing entity is still allowed when full
        let mut updated = saved.clone();
        updated.data = "a2".to_string();
        assert!(repo.save(updated).await.is_ok());
        assert_eq!(repo.len(), 1);
        assert!(repo.find(2).await.is_none());
    }
}
