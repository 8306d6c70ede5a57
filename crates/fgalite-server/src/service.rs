use std::collections::BTreeSet;
use std::sync::Arc;

use fgalite_core::engine::{
    CheckDiagnostic, CheckEngine, CheckError, CheckRequest, EngineConfig, ExpandEngine,
    ExpandRequest, ExpandTree, resolve_relation,
};
use fgalite_core::model::{
    AuthorizationModel, ModelLimits, parse_model, validate_model, validate_tuple,
};
use fgalite_core::tuple::{
    ModelId, ObjectRef, SnapshotToken, StoreId, SubjectRef, Tuple, TupleFilter,
};
use fgalite_storage::{
    ModelStore, OnConflict, StoreFactory, StoreInfo, StoredModel, TupleStore, WriteOptions,
};

use crate::adapter::StoreTupleReader;
use crate::error::ApiError;
use crate::metrics::Metrics;

const DEFAULT_LIST_OBJECTS_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct TupleLimits {
    pub max_tuples_per_write: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Default conflict handling when a write request does not choose one.
    pub strict_writes: bool,
    /// Deleted tuples older than this many transactions are pruned after a write.
    pub snapshot_retention: usize,
}

impl Default for TupleLimits {
    fn default() -> Self {
        Self {
            max_tuples_per_write: 100,
            default_page_size: 50,
            max_page_size: 100,
            strict_writes: false,
            snapshot_retention: 1000,
        }
    }
}

#[derive(Debug)]
pub struct CheckInput {
    pub user: SubjectRef,
    pub relation: String,
    pub object: ObjectRef,
    pub model_id: Option<ModelId>,
}

#[derive(Debug)]
pub struct CheckOutput {
    pub allowed: bool,
    pub diagnostic: Option<CheckDiagnostic>,
    pub snapshot: SnapshotToken,
}

#[derive(Debug)]
pub struct ExpandInput {
    pub object: ObjectRef,
    pub relation: String,
    pub model_id: Option<ModelId>,
}

#[derive(Debug, Default)]
pub struct WriteInput {
    pub writes: Vec<Tuple>,
    pub deletes: Vec<Tuple>,
    pub on_duplicate: Option<OnConflict>,
    pub on_missing: Option<OnConflict>,
    pub model_id: Option<ModelId>,
}

#[derive(Debug, Default)]
pub struct ReadInput {
    pub filter: TupleFilter,
    pub page_size: Option<usize>,
    pub continuation_token: Option<String>,
}

#[derive(Debug)]
pub struct ReadOutput {
    pub tuples: Vec<Tuple>,
    /// Present while more tuples remain at the same snapshot.
    pub continuation_token: Option<String>,
}

#[derive(Debug)]
pub struct ListObjectsInput {
    pub user: SubjectRef,
    pub relation: String,
    pub object_type: String,
    pub model_id: Option<ModelId>,
    pub limit: Option<usize>,
}

#[derive(Debug)]
pub struct ListUsersInput {
    pub object: ObjectRef,
    pub relation: String,
    pub user_type: String,
    pub model_id: Option<ModelId>,
}

/// Position inside a paged read: the snapshot of the first page plus the
/// number of tuples already returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ContinuationToken {
    snapshot: SnapshotToken,
    offset: usize,
}

impl ContinuationToken {
    fn encode(&self) -> String {
        format!("{}:{}", self.snapshot.value(), self.offset)
    }

    fn decode(token: &str) -> Result<Self, ApiError> {
        let invalid = || ApiError::InvalidInput(format!("invalid continuation token '{token}'"));
        let (snapshot, offset) = token.split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            snapshot: SnapshotToken::new(snapshot.parse().map_err(|_| invalid())?),
            offset: offset.parse().map_err(|_| invalid())?,
        })
    }
}

pub struct AuthzService<F: StoreFactory> {
    factory: Arc<F>,
    engine_config: EngineConfig,
    model_limits: ModelLimits,
    tuple_limits: TupleLimits,
    metrics: Option<Arc<Metrics>>,
}

impl<F: StoreFactory> AuthzService<F> {
    pub fn new(
        factory: Arc<F>,
        engine_config: EngineConfig,
        model_limits: ModelLimits,
        tuple_limits: TupleLimits,
    ) -> Self {
        Self {
            factory,
            engine_config,
            model_limits,
            tuple_limits,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn create_store(&self, name: &str) -> Result<StoreInfo, ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::InvalidInput(
                "store name must not be empty".to_string(),
            ));
        }
        let info = self.factory.create_store(name).await?;
        tracing::info!(store_id = %info.id, name = %info.name, "store created");
        Ok(info)
    }

    pub async fn get_store(&self, store_id: &StoreId) -> Result<StoreInfo, ApiError> {
        Ok(self.factory.get_store(store_id).await?)
    }

    pub async fn list_stores(&self) -> Result<Vec<StoreInfo>, ApiError> {
        Ok(self.factory.list_stores().await?)
    }

    pub async fn delete_store(&self, store_id: &StoreId) -> Result<(), ApiError> {
        self.factory.delete_store(store_id).await?;
        tracing::info!(%store_id, "store deleted");
        Ok(())
    }

    /// Validates `model` and appends it as the store's newest version.
    pub async fn write_authorization_model(
        &self,
        store_id: &StoreId,
        model: AuthorizationModel,
    ) -> Result<ModelId, ApiError> {
        let store = self.factory.open(store_id)?;
        validate_model(&model, &self.model_limits).map_err(ApiError::Validation)?;

        let type_count = model.type_definitions.len();
        let model_id = store.write_model(model).await?;
        tracing::info!(%store_id, %model_id, type_count, "authorization model written");
        Ok(model_id)
    }

    pub async fn write_authorization_model_dsl(
        &self,
        store_id: &StoreId,
        source: &str,
    ) -> Result<ModelId, ApiError> {
        let model = parse_model(source)?;
        self.write_authorization_model(store_id, model).await
    }

    /// The model with `model_id`, or the latest one when `None`.
    pub async fn read_authorization_model(
        &self,
        store_id: &StoreId,
        model_id: Option<ModelId>,
    ) -> Result<StoredModel, ApiError> {
        let store = self.factory.open(store_id)?;
        self.resolve_model(&store, store_id, model_id).await
    }

    pub async fn list_authorization_models(
        &self,
        store_id: &StoreId,
    ) -> Result<Vec<StoredModel>, ApiError> {
        let store = self.factory.open(store_id)?;
        Ok(store.list_models().await?)
    }

    pub async fn write_tuples(
        &self,
        store_id: &StoreId,
        input: WriteInput,
    ) -> Result<SnapshotToken, ApiError> {
        let total = input.writes.len() + input.deletes.len();
        if total == 0 {
            return Err(ApiError::InvalidInput(
                "write request must contain at least one tuple".to_string(),
            ));
        }
        if total > self.tuple_limits.max_tuples_per_write {
            return Err(ApiError::InvalidInput(format!(
                "write request has {total} tuples, limit is {}",
                self.tuple_limits.max_tuples_per_write
            )));
        }

        let store = self.factory.open(store_id)?;
        let stored = self.resolve_model(&store, store_id, input.model_id).await?;
        for tuple in &input.writes {
            validate_tuple(&stored.model, tuple)?;
        }

        let default = if self.tuple_limits.strict_writes {
            OnConflict::Error
        } else {
            OnConflict::Ignore
        };
        let options = WriteOptions {
            on_duplicate: input.on_duplicate.unwrap_or(default),
            on_missing: input.on_missing.unwrap_or(default),
        };

        let token = store.write(&input.writes, &input.deletes, options).await?;
        tracing::debug!(
            %store_id,
            writes = input.writes.len(),
            deletes = input.deletes.len(),
            snapshot = token.value(),
            "tuples written"
        );

        if !input.deletes.is_empty() {
            let retention = self.tuple_limits.snapshot_retention as u64;
            let cutoff = SnapshotToken::new(token.value().saturating_sub(retention));
            let pruned = store.prune(cutoff).await?;
            if pruned > 0 {
                tracing::debug!(
                    %store_id,
                    pruned,
                    cutoff = cutoff.value(),
                    "pruned deleted tuples"
                );
            }
        }
        Ok(token)
    }

    pub async fn read_tuples(
        &self,
        store_id: &StoreId,
        input: ReadInput,
    ) -> Result<ReadOutput, ApiError> {
        let page_size = input
            .page_size
            .unwrap_or(self.tuple_limits.default_page_size);
        if page_size == 0 || page_size > self.tuple_limits.max_page_size {
            return Err(ApiError::InvalidInput(format!(
                "page_size must be between 1 and {}",
                self.tuple_limits.max_page_size
            )));
        }

        let store = self.factory.open(store_id)?;
        let position = match input.continuation_token.as_deref() {
            Some(token) => ContinuationToken::decode(token)?,
            None => ContinuationToken {
                snapshot: store.snapshot().await?,
                offset: 0,
            },
        };

        let all = store.read(&input.filter, Some(position.snapshot)).await?;
        if position.offset > all.len() {
            return Err(ApiError::InvalidInput(format!(
                "continuation token offset {} is past the end of the results",
                position.offset
            )));
        }
        let end = position.offset.saturating_add(page_size).min(all.len());
        let tuples = all[position.offset..end].to_vec();
        let continuation_token = (end < all.len()).then(|| {
            ContinuationToken {
                snapshot: position.snapshot,
                offset: end,
            }
            .encode()
        });

        Ok(ReadOutput {
            tuples,
            continuation_token,
        })
    }

    pub async fn check(
        &self,
        store_id: &StoreId,
        input: CheckInput,
    ) -> Result<CheckOutput, ApiError> {
        let store = Arc::new(self.factory.open(store_id)?);
        let stored = self.resolve_model(&*store, store_id, input.model_id).await?;
        let snapshot = store.snapshot().await?;

        let engine = self.check_engine(&store, &stored);
        let result = engine
            .check(&CheckRequest {
                object: input.object,
                relation: input.relation,
                user: input.user,
                snapshot: Some(snapshot),
            })
            .await?;

        if let Some(ref diagnostic) = result.diagnostic {
            tracing::warn!(
                %store_id,
                model_id = %stored.id,
                %diagnostic,
                "check returned a conservative deny"
            );
        }
        if let Some(ref metrics) = self.metrics {
            metrics.record_check(result.allowed, result.diagnostic.is_some());
        }

        Ok(CheckOutput {
            allowed: result.allowed,
            diagnostic: result.diagnostic,
            snapshot,
        })
    }

    pub async fn expand(
        &self,
        store_id: &StoreId,
        input: ExpandInput,
    ) -> Result<ExpandTree, ApiError> {
        let store = Arc::new(self.factory.open(store_id)?);
        let stored = self.resolve_model(&*store, store_id, input.model_id).await?;
        let snapshot = store.snapshot().await?;

        let reader = StoreTupleReader::new(Arc::clone(&store));
        let engine = ExpandEngine::new(Arc::new(reader), Arc::clone(&stored.model));

        Ok(engine
            .expand(&ExpandRequest {
                object: input.object,
                relation: input.relation,
                snapshot: Some(snapshot),
            })
            .await?)
    }

    /// Objects of `object_type` the user holds `relation` on. Every grant
    /// derives from a tuple on the object itself, so the objects named by
    /// tuples are a complete candidate set.
    pub async fn list_objects(
        &self,
        store_id: &StoreId,
        input: ListObjectsInput,
    ) -> Result<Vec<ObjectRef>, ApiError> {
        let store = Arc::new(self.factory.open(store_id)?);
        let stored = self.resolve_model(&*store, store_id, input.model_id).await?;
        resolve_relation(&stored.model, &input.object_type, &input.relation)?;
        let snapshot = store.snapshot().await?;

        let filter = TupleFilter {
            object_type: Some(input.object_type.clone()),
            ..Default::default()
        };
        let candidates: BTreeSet<String> = store
            .read(&filter, Some(snapshot))
            .await?
            .into_iter()
            .map(|t| t.object.object_id)
            .collect();

        let engine = self.check_engine(&store, &stored);
        let limit = input.limit.unwrap_or(DEFAULT_LIST_OBJECTS_LIMIT);
        let mut objects = Vec::new();

        for object_id in candidates {
            if objects.len() >= limit {
                break;
            }
            let object = ObjectRef::new(input.object_type.clone(), object_id);
            let result = engine
                .check(&CheckRequest {
                    object: object.clone(),
                    relation: input.relation.clone(),
                    user: input.user.clone(),
                    snapshot: Some(snapshot),
                })
                .await?;
            if result.allowed {
                objects.push(object);
            }
        }

        tracing::debug!(%store_id, count = objects.len(), "list objects resolved");
        Ok(objects)
    }

    /// Users of `user_type` holding `relation` on the object. Candidates are
    /// the plain (non-userset) users of that type named anywhere in the store.
    pub async fn list_users(
        &self,
        store_id: &StoreId,
        input: ListUsersInput,
    ) -> Result<Vec<SubjectRef>, ApiError> {
        let store = Arc::new(self.factory.open(store_id)?);
        let stored = self.resolve_model(&*store, store_id, input.model_id).await?;
        resolve_relation(&stored.model, &input.object.object_type, &input.relation)?;
        if stored.model.get_type(&input.user_type).is_none() {
            return Err(CheckError::TypeNotFound(input.user_type).into());
        }
        let snapshot = store.snapshot().await?;

        let filter = TupleFilter::for_user_type(&input.user_type);
        let candidates: BTreeSet<String> = store
            .read(&filter, Some(snapshot))
            .await?
            .into_iter()
            .map(|t| t.subject.subject_id)
            .collect();

        let engine = self.check_engine(&store, &stored);
        let mut users = Vec::new();

        for subject_id in candidates {
            let user = SubjectRef::direct(input.user_type.clone(), subject_id);
            let result = engine
                .check(&CheckRequest {
                    object: input.object.clone(),
                    relation: input.relation.clone(),
                    user: user.clone(),
                    snapshot: Some(snapshot),
                })
                .await?;
            if result.allowed {
                users.push(user);
            }
        }

        Ok(users)
    }

    fn check_engine(
        &self,
        store: &Arc<F::Store>,
        stored: &StoredModel,
    ) -> CheckEngine<StoreTupleReader<F::Store>> {
        let reader = StoreTupleReader::new(Arc::clone(store));
        CheckEngine::new(
            Arc::new(reader),
            Arc::clone(&stored.model),
            self.engine_config.clone(),
        )
    }

    async fn resolve_model(
        &self,
        store: &F::Store,
        store_id: &StoreId,
        model_id: Option<ModelId>,
    ) -> Result<StoredModel, ApiError> {
        match model_id {
            Some(id) => Ok(store.read_model(&id).await?),
            None => store
                .latest_model()
                .await?
                .ok_or(ApiError::NoAuthorizationModel(*store_id)),
        }
    }
}
