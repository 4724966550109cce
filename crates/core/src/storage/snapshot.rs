use super::StoreState;
use crate::error::{DomainError, DomainResult};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

const STATE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("state");
const CURRENT_KEY: &str = "current";

/// Persists committed store snapshots to an embedded redb database
#[derive(Clone)]
pub struct RedbSnapshotStore {
    db: Arc<Database>,
}

impl RedbSnapshotStore {
    pub fn open(path: &Path) -> DomainResult<Self> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DomainError::storage(format!("failed to create data directory: {}", e)))?;
        }

        let db = Database::create(path)
            .map_err(|e| DomainError::storage(format!("failed to open redb database: {}", e)))?;

        // Initialize table
        let write_txn = db
            .begin_write()
            .map_err(|e| DomainError::storage(format!("failed to begin write transaction: {}", e)))?;
        {
            let _state_table = write_txn
                .open_table(STATE_TABLE)
                .map_err(|e| DomainError::storage(format!("failed to open state table: {}", e)))?;
        }
        write_txn
            .commit()
            .map_err(|e| DomainError::storage(format!("failed to commit: {}", e)))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Load the last committed snapshot, if any
    pub fn load(&self) -> DomainResult<Option<StoreState>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| DomainError::storage(format!("failed to begin read: {}", e)))?;
        let table = read_txn
            .open_table(STATE_TABLE)
            .map_err(|e| DomainError::storage(format!("failed to open state table: {}", e)))?;

        let value = table
            .get(CURRENT_KEY)
            .map_err(|e| DomainError::storage(format!("failed to read snapshot: {}", e)))?;

        match value {
            Some(guard) => {
                let state: StoreState = serde_json::from_slice(guard.value())
                    .map_err(|e| DomainError::storage(format!("corrupt snapshot: {}", e)))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Write a snapshot atomically
    pub fn persist(&self, state: &StoreState) -> DomainResult<()> {
        let bytes = serde_json::to_vec(state)?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| DomainError::storage(format!("failed to begin write: {}", e)))?;
        {
            let mut table = write_txn
                .open_table(STATE_TABLE)
                .map_err(|e| DomainError::storage(format!("failed to open state table: {}", e)))?;
            table
                .insert(CURRENT_KEY, bytes.as_slice())
                .map_err(|e| DomainError::storage(format!("failed to write snapshot: {}", e)))?;
        }
        write_txn
            .commit()
            .map_err(|e| DomainError::storage(format!("failed to commit snapshot: {}", e)))?;
        Ok(())
    }
}
