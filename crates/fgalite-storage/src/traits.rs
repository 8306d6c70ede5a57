use std::sync::Arc;

use chrono::{DateTime, Utc};
use fgalite_core::model::AuthorizationModel;
use fgalite_core::tuple::{ModelId, SnapshotToken, StoreId, Tuple, TupleFilter};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("store not found: {0}")]
    StoreNotFound(String),
    #[error("authorization model not found: {0}")]
    ModelNotFound(String),
    #[error("tuple already exists: {0}")]
    TupleAlreadyExists(String),
    #[error("tuple does not exist: {0}")]
    TupleNotFound(String),
    #[error("tuple appears more than once in the write request: {0}")]
    DuplicateInBatch(String),
    #[error("snapshot {requested} is ahead of current {current}")]
    SnapshotAhead { requested: u64, current: u64 },
    #[error("snapshot {requested} has been pruned, oldest readable is {oldest}")]
    SnapshotExpired { requested: u64, oldest: u64 },
    #[error("internal storage error: {0}")]
    Internal(String),
}

/// What a write does with a tuple that is already in the requested state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnConflict {
    /// Treat it as a no-op.
    #[default]
    Ignore,
    /// Fail the whole batch.
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub on_duplicate: OnConflict,
    pub on_missing: OnConflict,
}

impl WriteOptions {
    pub fn strict() -> Self {
        Self {
            on_duplicate: OnConflict::Error,
            on_missing: OnConflict::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    pub id: StoreId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredModel {
    pub id: ModelId,
    pub model: Arc<AuthorizationModel>,
}

pub trait TupleStore: Send + Sync {
    /// Applies deletes then writes as one transaction. Nothing is applied
    /// when any part of the batch fails.
    fn write(
        &self,
        writes: &[Tuple],
        deletes: &[Tuple],
        options: WriteOptions,
    ) -> impl Future<Output = Result<SnapshotToken, StorageError>> + Send;

    /// Tuples matching `filter` in insertion order, as of `snapshot` (latest
    /// when `None`).
    fn read(
        &self,
        filter: &TupleFilter,
        snapshot: Option<SnapshotToken>,
    ) -> impl Future<Output = Result<Vec<Tuple>, StorageError>> + Send;

    fn snapshot(&self) -> impl Future<Output = Result<SnapshotToken, StorageError>> + Send;

    /// Drops tuples deleted at or before `before` and returns how many went.
    /// Reads at snapshots older than `before` fail afterwards.
    fn prune(
        &self,
        before: SnapshotToken,
    ) -> impl Future<Output = Result<usize, StorageError>> + Send;
}

pub trait ModelStore: Send + Sync {
    fn write_model(
        &self,
        model: AuthorizationModel,
    ) -> impl Future<Output = Result<ModelId, StorageError>> + Send;

    fn read_model(
        &self,
        id: &ModelId,
    ) -> impl Future<Output = Result<StoredModel, StorageError>> + Send;

    /// The most recently written model, if any.
    fn latest_model(
        &self,
    ) -> impl Future<Output = Result<Option<StoredModel>, StorageError>> + Send;

    /// All models, newest first.
    fn list_models(&self) -> impl Future<Output = Result<Vec<StoredModel>, StorageError>> + Send;
}

pub trait StoreFactory: Send + Sync {
    type Store: TupleStore + ModelStore;

    fn create_store(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<StoreInfo, StorageError>> + Send;

    fn get_store(
        &self,
        id: &StoreId,
    ) -> impl Future<Output = Result<StoreInfo, StorageError>> + Send;

    fn list_stores(&self) -> impl Future<Output = Result<Vec<StoreInfo>, StorageError>> + Send;

    fn delete_store(&self, id: &StoreId)
    -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Handle to an existing store's tuples and models.
    fn open(&self, id: &StoreId) -> Result<Self::Store, StorageError>;
}
