use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::db::InMemoryTransactionManager;
use common::error::Result;
use common::model::{Account, AccountId, Entity, Operation};
use common::{DBTransaction, TransactionManager};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::{OperationRepository, Repository};

/// Stored entity stamped with its insertion sequence
#[derive(Clone)]
struct Slot<T> {
    seq: u64,
    entity: T,
}

/// In-memory repository for any entity type
///
/// Each instance is its own store; nothing is shared between instances.
pub struct InMemoryRepository<T: Entity> {
    /// Entities by ID
    entries: Arc<DashMap<T::Id, Slot<T>>>,
    /// Next insertion sequence
    next_seq: AtomicU64,
    /// Transaction manager
    transaction_manager: InMemoryTransactionManager,
}

/// In-memory repository for account rows
pub type InMemoryAccountRepository = InMemoryRepository<Account>;

/// In-memory repository for operations
pub type InMemoryOperationRepository = InMemoryRepository<Operation>;

impl<T: Entity> InMemoryRepository<T> {
    /// Create a new, empty in-memory repository
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            next_seq: AtomicU64::new(0),
            transaction_manager: InMemoryTransactionManager::new(),
        }
    }

    fn sorted(&self, filter: impl Fn(&T) -> bool) -> Vec<T> {
        let mut slots: Vec<Slot<T>> = self
            .entries
            .iter()
            .filter(|entry| filter(&entry.value().entity))
            .map(|entry| entry.value().clone())
            .collect();
        slots.sort_by_key(|slot| slot.seq);
        slots.into_iter().map(|slot| slot.entity).collect()
    }
}

impl<T: Entity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    fn transaction_manager(&self) -> &dyn TransactionManager {
        &self.transaction_manager
    }

    async fn get_all(&self) -> Result<Vec<T>> {
        Ok(self.sorted(|_| true))
    }

    async fn get(&self, id: T::Id) -> Result<Option<T>> {
        Ok(self.entries.get(&id).map(|slot| slot.entity.clone()))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.len())
    }

    async fn add_in(&self, tx: &mut DBTransaction, entity: T) -> Result<T> {
        let tx = tx.in_memory()?;
        let id = entity.id();

        match self.entries.entry(id) {
            Entry::Occupied(_) => return Err(T::conflict(id)),
            Entry::Vacant(vacant) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                vacant.insert(Slot { seq, entity: entity.clone() });
            }
        }
        debug!("Added {} {}", T::NAME, id);

        let entries = self.entries.clone();
        tx.record_undo(move || {
            entries.remove(&id);
        });
        Ok(entity)
    }

    async fn update_in(&self, tx: &mut DBTransaction, entity: T) -> Result<T> {
        let tx = tx.in_memory()?;
        let id = entity.id();

        let previous = match self.entries.get_mut(&id) {
            Some(mut slot) => std::mem::replace(&mut slot.entity, entity.clone()),
            None => return Err(T::not_found(id)),
        };
        debug!("Updated {} {}", T::NAME, id);

        let entries = self.entries.clone();
        tx.record_undo(move || {
            if let Some(mut slot) = entries.get_mut(&id) {
                slot.entity = previous;
            }
        });
        Ok(entity)
    }

    async fn remove_in(&self, tx: &mut DBTransaction, id: T::Id) -> Result<T> {
        let tx = tx.in_memory()?;

        let (_, slot) = self.entries.remove(&id).ok_or_else(|| T::not_found(id))?;
        let removed = slot.entity.clone();
        debug!("Removed {} {}", T::NAME, id);

        // Restoring the slot keeps its original sequence, and with it the ordering
        let entries = self.entries.clone();
        tx.record_undo(move || {
            entries.insert(id, slot);
        });
        Ok(removed)
    }
}

#[async_trait]
impl OperationRepository for InMemoryRepository<Operation> {
    async fn for_account(&self, account_id: AccountId) -> Result<Vec<Operation>> {
        Ok(self.sorted(|operation| operation.account_id == account_id))
    }
}
