pub mod engine;
pub mod model;
pub mod tuple;

pub use tuple::{ModelId, ObjectRef, SnapshotToken, StoreId, SubjectRef, Tuple, TupleFilter};
