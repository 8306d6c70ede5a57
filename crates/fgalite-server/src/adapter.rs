use std::sync::Arc;

use fgalite_core::engine::{CheckError, TupleReader};
use fgalite_core::tuple::{SnapshotToken, Tuple, TupleFilter};
use fgalite_storage::TupleStore;

/// Lets the engines read tuples straight from a store.
pub struct StoreTupleReader<S: TupleStore> {
    store: Arc<S>,
}

impl<S: TupleStore> StoreTupleReader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: TupleStore> TupleReader for StoreTupleReader<S> {
    async fn read_tuples(
        &self,
        filter: &TupleFilter,
        snapshot: Option<SnapshotToken>,
    ) -> Result<Vec<Tuple>, CheckError> {
        self.store
            .read(filter, snapshot)
            .await
            .map_err(|e| CheckError::StorageError(e.to_string()))
    }
}
