pub mod memory;
pub mod traits;

pub use memory::{InMemoryStore, InMemoryStoreFactory};
pub use traits::{
    ModelStore, OnConflict, StorageError, StoreFactory, StoreInfo, StoredModel, TupleStore,
    WriteOptions,
};
