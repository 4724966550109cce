//! Transactional store backing the entity services.
//!
//! Readers share a read lock. A [`Transaction`] holds the write lock for its
//! whole lifetime and mutates a private working copy, so concurrent writers
//! are serialized and observers never see a partial cascade. Dropping a
//! transaction without committing rolls it back.

mod snapshot;
mod state;

pub use snapshot::RedbSnapshotStore;
pub use state::StoreState;

use crate::error::DomainResult;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, RwLockReadGuard};
use uuid::Uuid;

#[derive(Clone)]
pub struct Store {
    state: Arc<RwLock<StoreState>>,
    backend: Option<RedbSnapshotStore>,
}

impl Store {
    /// Volatile store with seeded defaults
    pub fn in_memory() -> Self {
        Self::from_state(StoreState::seeded())
    }

    pub fn from_state(state: StoreState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            backend: None,
        }
    }

    /// Store persisted to a redb file; seeds defaults on first open
    pub fn open_redb(path: &Path) -> DomainResult<Self> {
        let backend = RedbSnapshotStore::open(path)?;
        let state = match backend.load()? {
            Some(state) => state,
            None => {
                let seeded = StoreState::seeded();
                backend.persist(&seeded)?;
                tracing::info!(path = %path.display(), "Initialized new requirements store");
                seeded
            }
        };

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            backend: Some(backend),
        })
    }

    /// Shared read access to committed state
    pub async fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().await
    }

    /// Begin a serializable write transaction
    pub async fn begin(&self) -> Transaction {
        let guard = self.state.clone().write_owned().await;
        let working = guard.clone();
        let id = Uuid::new_v4();
        tracing::debug!(transaction_id = %id, "Transaction started");
        Transaction {
            id,
            guard,
            working,
            backend: self.backend.clone(),
        }
    }

    /// Run `f` inside a transaction; commit on Ok, roll back on Err
    pub async fn within_transaction<T, F>(&self, f: F) -> DomainResult<T>
    where
        F: FnOnce(&mut StoreState) -> DomainResult<T>,
    {
        let mut tx = self.begin().await;
        let value = f(&mut tx)?;
        tx.commit().await?;
        Ok(value)
    }
}

/// Write transaction over a working copy of the store
pub struct Transaction {
    id: Uuid,
    guard: OwnedRwLockWriteGuard<StoreState>,
    working: StoreState,
    backend: Option<RedbSnapshotStore>,
}

impl Transaction {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Publish the working copy. Persistence failures leave the committed
    /// state untouched.
    pub async fn commit(self) -> DomainResult<()> {
        let Transaction {
            id,
            mut guard,
            working,
            backend,
        } = self;

        if let Some(backend) = backend {
            if let Err(err) = backend.persist(&working) {
                tracing::error!(transaction_id = %id, error = %err, "Transaction rolled back");
                return Err(err);
            }
        }

        *guard = working;
        tracing::debug!(transaction_id = %id, "Transaction committed");
        Ok(())
    }
}

impl Deref for Transaction {
    type Target = StoreState;

    fn deref(&self) -> &StoreState {
        &self.working
    }
}

impl DerefMut for Transaction {
    fn deref_mut(&mut self) -> &mut StoreState {
        &mut self.working
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use crate::types::RefPrefix;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_commit_publishes_changes() {
        let store = Store::in_memory();
        let mut tx = store.begin().await;
        tx.next_reference(RefPrefix::Ep);
        tx.commit().await.unwrap();

        let mut tx = store.begin().await;
        assert_eq!(tx.next_reference(RefPrefix::Ep).to_string(), "EP-002");
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let store = Store::in_memory();
        {
            let mut tx = store.begin().await;
            tx.requirement_types.clear();
        }
        assert!(!store.read().await.requirement_types.is_empty());
    }

    #[tokio::test]
    async fn test_within_transaction_rolls_back_on_error() {
        let store = Store::in_memory();
        let result: DomainResult<()> = store
            .within_transaction(|state| {
                state.relationship_types.clear();
                Err(DomainError::Internal("boom".into()))
            })
            .await;

        assert!(result.is_err());
        assert!(!store.read().await.relationship_types.is_empty());
    }

    #[tokio::test]
    async fn test_redb_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reqhub.redb");

        {
            let store = Store::open_redb(&path).unwrap();
            store
                .within_transaction(|state| {
                    state.next_reference(RefPrefix::Prompt);
                    Ok(())
                })
                .await
                .unwrap();
        }

        let store = Store::open_redb(&path).unwrap();
        let mut tx = store.begin().await;
        assert_eq!(tx.next_reference(RefPrefix::Prompt).to_string(), "PROMPT-002");
    }
}
