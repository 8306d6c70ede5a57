use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use fgalite_core::model::AuthorizationModel;
use fgalite_core::tuple::{ModelId, SnapshotToken, StoreId, Tuple, TupleFilter};

use crate::traits::{
    ModelStore, OnConflict, StorageError, StoreFactory, StoreInfo, StoredModel, TupleStore,
    WriteOptions,
};

const ACTIVE_TX_ID: u64 = u64::MAX;

#[derive(Debug, Clone)]
struct StoredTuple {
    tuple: Tuple,
    created_tx_id: u64,
    deleted_tx_id: u64,
}

impl StoredTuple {
    fn is_active(&self) -> bool {
        self.deleted_tx_id == ACTIVE_TX_ID
    }

    fn visible_at(&self, snapshot: u64) -> bool {
        self.created_tx_id <= snapshot && self.deleted_tx_id > snapshot
    }
}

#[derive(Debug, Default)]
struct InnerState {
    current_tx: u64,
    /// Oldest snapshot still readable after pruning.
    oldest_tx: u64,
    tuples: Vec<StoredTuple>,
    live: HashSet<Tuple>,
    models: Vec<StoredModel>,
}

impl InnerState {
    fn is_live(&self, tuple: &Tuple) -> bool {
        self.live.contains(tuple)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Internal(format!("store lock poisoned: {e}")))
}

/// One store's tuples and models. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<InnerState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TupleStore for InMemoryStore {
    async fn write(
        &self,
        writes: &[Tuple],
        deletes: &[Tuple],
        options: WriteOptions,
    ) -> Result<SnapshotToken, StorageError> {
        let mut seen = HashSet::new();
        for tuple in writes.iter().chain(deletes) {
            if !seen.insert(tuple) {
                return Err(StorageError::DuplicateInBatch(tuple.to_string()));
            }
        }

        let mut state = lock(&self.state)?;

        if options.on_duplicate == OnConflict::Error
            && let Some(existing) = writes.iter().find(|w| state.is_live(w))
        {
            return Err(StorageError::TupleAlreadyExists(existing.to_string()));
        }
        if options.on_missing == OnConflict::Error
            && let Some(missing) = deletes.iter().find(|d| !state.is_live(d))
        {
            return Err(StorageError::TupleNotFound(missing.to_string()));
        }

        state.current_tx += 1;
        let tx_id = state.current_tx;

        for delete in deletes {
            if !state.live.remove(delete) {
                continue;
            }
            if let Some(stored) = state
                .tuples
                .iter_mut()
                .find(|t| t.is_active() && &t.tuple == delete)
            {
                stored.deleted_tx_id = tx_id;
            }
        }

        for write in writes {
            if !state.live.insert(write.clone()) {
                continue;
            }
            state.tuples.push(StoredTuple {
                tuple: write.clone(),
                created_tx_id: tx_id,
                deleted_tx_id: ACTIVE_TX_ID,
            });
        }

        Ok(SnapshotToken::new(tx_id))
    }

    async fn read(
        &self,
        filter: &TupleFilter,
        snapshot: Option<SnapshotToken>,
    ) -> Result<Vec<Tuple>, StorageError> {
        let state = lock(&self.state)?;

        let snap = match snapshot {
            Some(token) => {
                let val = token.value();
                if val > state.current_tx {
                    return Err(StorageError::SnapshotAhead {
                        requested: val,
                        current: state.current_tx,
                    });
                }
                if val < state.oldest_tx {
                    return Err(StorageError::SnapshotExpired {
                        requested: val,
                        oldest: state.oldest_tx,
                    });
                }
                val
            }
            None => state.current_tx,
        };

        Ok(state
            .tuples
            .iter()
            .filter(|t| t.visible_at(snap) && filter.matches(&t.tuple))
            .map(|t| t.tuple.clone())
            .collect())
    }

    async fn snapshot(&self) -> Result<SnapshotToken, StorageError> {
        let state = lock(&self.state)?;
        Ok(SnapshotToken::new(state.current_tx))
    }

    async fn prune(&self, before: SnapshotToken) -> Result<usize, StorageError> {
        let mut state = lock(&self.state)?;
        let before = before.value().min(state.current_tx);
        if before <= state.oldest_tx {
            return Ok(0);
        }

        let len = state.tuples.len();
        state.tuples.retain(|t| t.deleted_tx_id > before);
        state.oldest_tx = before;
        Ok(len - state.tuples.len())
    }
}

impl ModelStore for InMemoryStore {
    async fn write_model(&self, model: AuthorizationModel) -> Result<ModelId, StorageError> {
        let mut state = lock(&self.state)?;
        let id = ModelId::generate();
        state.models.push(StoredModel {
            id,
            model: Arc::new(model),
        });
        Ok(id)
    }

    async fn read_model(&self, id: &ModelId) -> Result<StoredModel, StorageError> {
        let state = lock(&self.state)?;
        state
            .models
            .iter()
            .find(|m| &m.id == id)
            .cloned()
            .ok_or_else(|| StorageError::ModelNotFound(id.to_string()))
    }

    async fn latest_model(&self) -> Result<Option<StoredModel>, StorageError> {
        let state = lock(&self.state)?;
        Ok(state.models.last().cloned())
    }

    async fn list_models(&self) -> Result<Vec<StoredModel>, StorageError> {
        let state = lock(&self.state)?;
        Ok(state.models.iter().rev().cloned().collect())
    }
}

#[derive(Debug)]
struct StoreEntry {
    info: StoreInfo,
    store: InMemoryStore,
}

/// Registry of in-memory stores, kept in creation order.
#[derive(Debug, Default)]
pub struct InMemoryStoreFactory {
    stores: Mutex<Vec<StoreEntry>>,
}

impl InMemoryStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreFactory for InMemoryStoreFactory {
    type Store = InMemoryStore;

    async fn create_store(&self, name: &str) -> Result<StoreInfo, StorageError> {
        let info = StoreInfo {
            id: StoreId::generate(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        lock(&self.stores)?.push(StoreEntry {
            info: info.clone(),
            store: InMemoryStore::new(),
        });
        tracing::debug!(store_id = %info.id, name, "created in-memory store");
        Ok(info)
    }

    async fn get_store(&self, id: &StoreId) -> Result<StoreInfo, StorageError> {
        lock(&self.stores)?
            .iter()
            .find(|e| &e.info.id == id)
            .map(|e| e.info.clone())
            .ok_or_else(|| StorageError::StoreNotFound(id.to_string()))
    }

    async fn list_stores(&self) -> Result<Vec<StoreInfo>, StorageError> {
        Ok(lock(&self.stores)?.iter().map(|e| e.info.clone()).collect())
    }

    async fn delete_store(&self, id: &StoreId) -> Result<(), StorageError> {
        let mut stores = lock(&self.stores)?;
        let before = stores.len();
        stores.retain(|e| &e.info.id != id);
        if stores.len() == before {
            return Err(StorageError::StoreNotFound(id.to_string()));
        }
        Ok(())
    }

    fn open(&self, id: &StoreId) -> Result<InMemoryStore, StorageError> {
        lock(&self.stores)?
            .iter()
            .find(|e| &e.info.id == id)
            .map(|e| e.store.clone())
            .ok_or_else(|| StorageError::StoreNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fgalite_core::model::{RelationDef, RelationReference, RewriteRule, TypeDefinition};
    use fgalite_core::tuple::{ObjectRef, SubjectRef};

    fn viewer(doc: &str, user: &str) -> Tuple {
        Tuple::new(
            ObjectRef::new("document", doc),
            "viewer",
            SubjectRef::direct("user", user),
        )
    }

    fn all() -> TupleFilter {
        TupleFilter::default()
    }

    fn model_with(type_name: &str) -> AuthorizationModel {
        AuthorizationModel::new(vec![
            TypeDefinition {
                name: "user".to_string(),
                relations: vec![],
            },
            TypeDefinition {
                name: type_name.to_string(),
                relations: vec![RelationDef {
                    name: "viewer".to_string(),
                    rewrite: RewriteRule::Direct,
                    directly_related_user_types: vec![RelationReference::direct("user")],
                }],
            },
        ])
    }

    // 1. Fresh store snapshot is 0
    #[tokio::test]
    async fn fresh_store_snapshot_is_zero() {
        let store = InMemoryStore::new();

        assert_eq!(store.snapshot().await.unwrap().value(), 0);
    }

    // 2. Each write batch gets the next transaction id
    #[tokio::test]
    async fn write_returns_incrementing_tokens() {
        let store = InMemoryStore::new();
        let opts = WriteOptions::default();

        let t1 = store.write(&[viewer("1", "a")], &[], opts).await.unwrap();
        let t2 = store.write(&[viewer("2", "b")], &[], opts).await.unwrap();

        assert_eq!(t1.value(), 1);
        assert_eq!(t2.value(), 2);
    }

    // 3. Writing an existing tuple is a no-op by default
    #[tokio::test]
    async fn duplicate_write_is_idempotent() {
        let store = InMemoryStore::new();
        let opts = WriteOptions::default();

        store.write(&[viewer("1", "a")], &[], opts).await.unwrap();
        store.write(&[viewer("1", "a")], &[], opts).await.unwrap();

        assert_eq!(store.read(&all(), None).await.unwrap(), vec![viewer("1", "a")]);
    }

    // 4. Strict writes reject existing tuples and apply nothing
    #[tokio::test]
    async fn strict_duplicate_write_fails_whole_batch() {
        let store = InMemoryStore::new();
        store
            .write(&[viewer("1", "a")], &[], WriteOptions::default())
            .await
            .unwrap();

        let err = store
            .write(&[viewer("2", "b"), viewer("1", "a")], &[], WriteOptions::strict())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            StorageError::TupleAlreadyExists("document:1#viewer@user:a".to_string())
        );
        assert_eq!(store.read(&all(), None).await.unwrap(), vec![viewer("1", "a")]);
        assert_eq!(store.snapshot().await.unwrap().value(), 1);
    }

    // 5. Deleting a missing tuple is a no-op by default
    #[tokio::test]
    async fn missing_delete_is_idempotent() {
        let store = InMemoryStore::new();

        let result = store
            .write(&[], &[viewer("1", "a")], WriteOptions::default())
            .await;

        assert!(result.is_ok());
        assert!(store.read(&all(), None).await.unwrap().is_empty());
    }

    // 6. Strict deletes reject missing tuples
    #[tokio::test]
    async fn strict_missing_delete_fails() {
        let store = InMemoryStore::new();

        let err = store
            .write(&[], &[viewer("1", "a")], WriteOptions::strict())
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::TupleNotFound(_)));
    }

    // 7. The same tuple twice in one batch is rejected
    #[tokio::test]
    async fn duplicate_in_batch_is_rejected() {
        let store = InMemoryStore::new();

        let err = store
            .write(&[viewer("1", "a")], &[viewer("1", "a")], WriteOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::DuplicateInBatch(_)));
        assert_eq!(store.snapshot().await.unwrap().value(), 0);
    }

    // 8. Old snapshots see neither later writes nor later deletes
    #[tokio::test]
    async fn snapshot_read_is_stable() {
        let store = InMemoryStore::new();
        let opts = WriteOptions::default();
        let first = store.write(&[viewer("1", "a")], &[], opts).await.unwrap();

        store.write(&[viewer("2", "b")], &[], opts).await.unwrap();
        store.write(&[], &[viewer("1", "a")], opts).await.unwrap();

        assert_eq!(
            store.read(&all(), Some(first)).await.unwrap(),
            vec![viewer("1", "a")]
        );
        assert_eq!(store.read(&all(), None).await.unwrap(), vec![viewer("2", "b")]);
    }

    // 9. Snapshot beyond the current transaction is rejected
    #[tokio::test]
    async fn snapshot_ahead_is_rejected() {
        let store = InMemoryStore::new();

        let err = store
            .read(&all(), Some(SnapshotToken::new(5)))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            StorageError::SnapshotAhead {
                requested: 5,
                current: 0
            }
        );
    }

    // 10. Reads return insertion order and honour the filter
    #[tokio::test]
    async fn read_preserves_insertion_order() {
        let store = InMemoryStore::new();
        store
            .write(
                &[viewer("3", "c"), viewer("1", "a"), viewer("2", "b")],
                &[],
                WriteOptions::default(),
            )
            .await
            .unwrap();

        let filter = TupleFilter {
            subject_id: Some("a".to_string()),
            ..Default::default()
        };

        assert_eq!(
            store.read(&all(), None).await.unwrap(),
            vec![viewer("3", "c"), viewer("1", "a"), viewer("2", "b")]
        );
        assert_eq!(store.read(&filter, None).await.unwrap(), vec![viewer("1", "a")]);
    }

    // 11. A deleted tuple can be written again
    #[tokio::test]
    async fn deleted_tuple_can_be_rewritten() {
        let store = InMemoryStore::new();
        let strict = WriteOptions::strict();
        store.write(&[viewer("1", "a")], &[], strict).await.unwrap();
        store.write(&[], &[viewer("1", "a")], strict).await.unwrap();

        store.write(&[viewer("1", "a")], &[], strict).await.unwrap();

        assert_eq!(store.read(&all(), None).await.unwrap(), vec![viewer("1", "a")]);
    }

    // 12. Models are append-only, newest last
    #[tokio::test]
    async fn models_are_versioned() {
        let store = InMemoryStore::new();
        assert!(store.latest_model().await.unwrap().is_none());

        let first = store.write_model(model_with("document")).await.unwrap();
        let second = store.write_model(model_with("folder")).await.unwrap();

        let latest = store.latest_model().await.unwrap().unwrap();
        assert_eq!(latest.id, second);
        assert!(latest.model.get_type("folder").is_some());

        let old = store.read_model(&first).await.unwrap();
        assert!(old.model.get_type("document").is_some());

        let ids: Vec<_> = store
            .list_models()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![second, first]);
    }

    // 13. Unknown model id is NotFound
    #[tokio::test]
    async fn unknown_model_is_not_found() {
        let store = InMemoryStore::new();

        let err = store.read_model(&ModelId::generate()).await.unwrap_err();

        assert!(matches!(err, StorageError::ModelNotFound(_)));
    }

    // 14. Pruning drops tombstones and expires the snapshots that saw them
    #[tokio::test]
    async fn prune_removes_deleted_rows_and_expires_old_snapshots() {
        let store = InMemoryStore::new();
        let opts = WriteOptions::default();
        store
            .write(&[viewer("1", "a"), viewer("2", "b")], &[], opts)
            .await
            .unwrap();
        let deleted_at = store.write(&[], &[viewer("1", "a")], opts).await.unwrap();
        store.write(&[viewer("3", "c")], &[], opts).await.unwrap();

        let pruned = store.prune(deleted_at).await.unwrap();

        assert_eq!(pruned, 1);
        assert_eq!(
            store.read(&all(), Some(deleted_at)).await.unwrap(),
            vec![viewer("2", "b")]
        );
        assert!(matches!(
            store.read(&all(), Some(SnapshotToken::new(1))).await,
            Err(StorageError::SnapshotExpired {
                requested: 1,
                oldest: 2
            })
        ));
        assert_eq!(store.prune(deleted_at).await.unwrap(), 0);
    }

    // 15. Rows still visible at the prune point survive, and can be deleted later
    #[tokio::test]
    async fn prune_keeps_rows_deleted_after_the_cutoff() {
        let store = InMemoryStore::new();
        let opts = WriteOptions::default();
        let written = store.write(&[viewer("1", "a")], &[], opts).await.unwrap();
        store.write(&[], &[viewer("1", "a")], opts).await.unwrap();

        assert_eq!(store.prune(written).await.unwrap(), 0);
        assert_eq!(
            store.read(&all(), Some(written)).await.unwrap(),
            vec![viewer("1", "a")]
        );

        store.write(&[viewer("1", "a")], &[], opts).await.unwrap();
        let err = store
            .write(&[viewer("1", "a")], &[], WriteOptions::strict())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TupleAlreadyExists(_)));
    }

    // --- factory ---

    #[tokio::test]
    async fn factory_lists_stores_in_creation_order() {
        let factory = InMemoryStoreFactory::new();

        let a = factory.create_store("alpha").await.unwrap();
        let b = factory.create_store("beta").await.unwrap();

        let names: Vec<_> = factory
            .list_stores()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert_eq!(factory.get_store(&a.id).await.unwrap(), a);
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn factory_stores_are_isolated() {
        let factory = InMemoryStoreFactory::new();
        let a = factory.create_store("alpha").await.unwrap();
        let b = factory.create_store("beta").await.unwrap();

        factory
            .open(&a.id)
            .unwrap()
            .write(&[viewer("1", "a")], &[], WriteOptions::default())
            .await
            .unwrap();

        let in_b = factory.open(&b.id).unwrap().read(&all(), None).await.unwrap();
        assert!(in_b.is_empty());
        let in_a = factory.open(&a.id).unwrap().read(&all(), None).await.unwrap();
        assert_eq!(in_a.len(), 1);
    }

    #[tokio::test]
    async fn deleted_store_cannot_be_opened() {
        let factory = InMemoryStoreFactory::new();
        let store = factory.create_store("alpha").await.unwrap();

        factory.delete_store(&store.id).await.unwrap();

        assert!(matches!(
            factory.open(&store.id),
            Err(StorageError::StoreNotFound(_))
        ));
        assert!(matches!(
            factory.delete_store(&store.id).await,
            Err(StorageError::StoreNotFound(_))
        ));
        assert!(matches!(
            factory.get_store(&store.id).await,
            Err(StorageError::StoreNotFound(_))
        ));
    }
}
