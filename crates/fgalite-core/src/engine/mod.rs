mod check;
mod expand;

pub use check::{CheckDiagnostic, CheckEngine, CheckRequest, CheckResult};
pub use expand::{ExpandEngine, ExpandNode, ExpandRequest, ExpandTree};

use std::future::Future;

use crate::model::{AuthorizationModel, RelationDef};
use crate::tuple::{SnapshotToken, Tuple, TupleFilter};

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("type not found: {0}")]
    TypeNotFound(String),

    #[error("relation '{relation}' not found on type '{type_name}'")]
    RelationNotFound { type_name: String, relation: String },

    #[error("storage error: {0}")]
    StorageError(String),
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Relation hops a single check may take before it gives up.
    pub max_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_depth: 25 }
    }
}

pub trait TupleReader: Send + Sync {
    fn read_tuples(
        &self,
        filter: &TupleFilter,
        snapshot: Option<SnapshotToken>,
    ) -> impl Future<Output = Result<Vec<Tuple>, CheckError>> + Send;
}

/// Resolves `type_name#relation`, reporting which half is missing.
pub fn resolve_relation<'m>(
    model: &'m AuthorizationModel,
    type_name: &str,
    relation: &str,
) -> Result<&'m RelationDef, CheckError> {
    model
        .get_type(type_name)
        .ok_or_else(|| CheckError::TypeNotFound(type_name.to_string()))?
        .get_relation(relation)
        .ok_or_else(|| CheckError::RelationNotFound {
            type_name: type_name.to_string(),
            relation: relation.to_string(),
        })
}
