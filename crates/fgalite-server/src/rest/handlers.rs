use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use fgalite_core::engine::{CheckDiagnostic, ExpandNode, ExpandTree};
use fgalite_core::model::{AuthorizationModel, ModelJson, model_to_value};
use fgalite_core::tuple::{ModelId, ObjectRef, StoreId, SubjectRef, Tuple, TupleFilter};
use fgalite_storage::{OnConflict, StoreFactory, StoreInfo, StoredModel};

use crate::error::{ApiError, ErrorCode};
use crate::service::{
    CheckInput, ExpandInput, ListObjectsInput, ListUsersInput, ReadInput, WriteInput,
};

use super::AppState;
use super::types::*;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = match code {
            ErrorCode::Validation => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyExists => StatusCode::CONFLICT,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if code == ErrorCode::Internal {
            tracing::error!(error = %self, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                code: code.as_str(),
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::InvalidInput(rejection.body_text()))
}

/// Like [`body`], but an empty body stands for the request's defaults.
fn optional_body<T: DeserializeOwned + Default>(bytes: &Bytes) -> Result<T, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes)
        .map_err(|e| ApiError::InvalidInput(format!("failed to parse the request body: {e}")))
}

fn parse_model_id(id: Option<&str>) -> Result<Option<ModelId>, ApiError> {
    match id {
        None | Some("") => Ok(None),
        Some(id) => Ok(Some(id.parse()?)),
    }
}

fn parse_tuple(key: &TupleKey) -> Result<Tuple, ApiError> {
    Ok(Tuple::parse(&key.user, &key.relation, &key.object)?)
}

fn tuple_key(tuple: &Tuple) -> TupleKey {
    TupleKey {
        user: tuple.subject.to_string(),
        relation: tuple.relation.clone(),
        object: tuple.object.to_string(),
    }
}

fn conflict(mode: Option<ConflictRequest>) -> Option<OnConflict> {
    mode.map(|m| match m {
        ConflictRequest::Error => OnConflict::Error,
        ConflictRequest::Ignore => OnConflict::Ignore,
    })
}

/// Builds a store filter from a read request key. `object` may name only a
/// type (`document:`).
fn read_filter(key: &ReadTupleKey) -> Result<TupleFilter, ApiError> {
    let mut filter = TupleFilter::default();

    if let Some(ref object) = key.object
        && !object.is_empty()
    {
        match object.strip_suffix(':') {
            Some(object_type) if !object_type.is_empty() && !object_type.contains(':') => {
                filter.object_type = Some(object_type.to_string());
            }
            _ => {
                let object: ObjectRef = object.parse()?;
                filter.object_type = Some(object.object_type);
                filter.object_id = Some(object.object_id);
            }
        }
    }
    if let Some(ref relation) = key.relation
        && !relation.is_empty()
    {
        filter.relation = Some(relation.clone());
    }
    if let Some(ref user) = key.user
        && !user.is_empty()
    {
        let user: SubjectRef = user.parse()?;
        filter.subject_type = Some(user.subject_type);
        filter.subject_id = Some(user.subject_id);
        filter.subject_relation = Some(user.subject_relation);
    }

    Ok(filter)
}

fn store_response(info: StoreInfo) -> StoreResponse {
    StoreResponse {
        id: info.id.to_string(),
        name: info.name,
        created_at: info.created_at.to_rfc3339(),
    }
}

fn model_json(stored: &StoredModel) -> Value {
    let mut value = model_to_value(&stored.model);
    if let Value::Object(ref mut map) = value {
        map.insert("id".to_string(), json!(stored.id.to_string()));
    }
    value
}

fn diagnostic_response(diagnostic: &CheckDiagnostic) -> DiagnosticResponse {
    let code = match diagnostic {
        CheckDiagnostic::CycleDetected { .. } => "cycle_detected",
        CheckDiagnostic::DepthExceeded { .. } => "depth_exceeded",
    };
    DiagnosticResponse {
        code,
        message: diagnostic.to_string(),
    }
}

fn expand_node_to_json(node: &ExpandNode) -> Value {
    match node {
        ExpandNode::Users(users) => json!({
            "leaf": {
                "users": users.iter().map(ToString::to_string).collect::<Vec<_>>()
            }
        }),
        ExpandNode::Computed(userset) => json!({
            "leaf": { "computed": { "userset": userset } }
        }),
        ExpandNode::TupleToUserset { tupleset, computed } => json!({
            "leaf": {
                "tuple_to_userset": {
                    "tupleset": tupleset,
                    "computed": computed
                        .iter()
                        .map(|userset| json!({ "userset": userset }))
                        .collect::<Vec<_>>(),
                }
            }
        }),
        ExpandNode::Union(nodes) => json!({
            "union": { "nodes": nodes.iter().map(expand_node_to_json).collect::<Vec<_>>() }
        }),
        ExpandNode::Intersection(nodes) => json!({
            "intersection": { "nodes": nodes.iter().map(expand_node_to_json).collect::<Vec<_>>() }
        }),
        ExpandNode::Difference { base, subtract } => json!({
            "difference": {
                "base": expand_node_to_json(base),
                "subtract": expand_node_to_json(subtract),
            }
        }),
    }
}

fn expand_tree_to_json(tree: &ExpandTree) -> Value {
    let mut root = expand_node_to_json(&tree.root);
    if let Value::Object(ref mut map) = root {
        map.insert("name".to_string(), json!(tree.name));
    }
    json!({ "root": root })
}

pub async fn create_store<F: StoreFactory + 'static>(
    State(state): State<AppState<F>>,
    payload: Result<Json<CreateStoreRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StoreResponse>), ApiError> {
    let req = body(payload)?;
    let info = state.service.create_store(&req.name).await?;
    Ok((StatusCode::CREATED, Json(store_response(info))))
}

pub async fn list_stores<F: StoreFactory + 'static>(
    State(state): State<AppState<F>>,
) -> Result<Json<ListStoresResponse>, ApiError> {
    let stores = state.service.list_stores().await?;
    Ok(Json(ListStoresResponse {
        stores: stores.into_iter().map(store_response).collect(),
    }))
}

pub async fn get_store<F: StoreFactory + 'static>(
    State(state): State<AppState<F>>,
    Path(store_id): Path<String>,
) -> Result<Json<StoreResponse>, ApiError> {
    let store_id: StoreId = store_id.parse()?;
    let info = state.service.get_store(&store_id).await?;
    Ok(Json(store_response(info)))
}

pub async fn delete_store<F: StoreFactory + 'static>(
    State(state): State<AppState<F>>,
    Path(store_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let store_id: StoreId = store_id.parse()?;
    state.service.delete_store(&store_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn write_authorization_model<F: StoreFactory + 'static>(
    State(state): State<AppState<F>>,
    Path(store_id): Path<String>,
    payload: Result<Json<ModelJson>, JsonRejection>,
) -> Result<(StatusCode, Json<WriteModelResponse>), ApiError> {
    let store_id: StoreId = store_id.parse()?;
    let model = AuthorizationModel::try_from(body(payload)?)?;
    let model_id = state
        .service
        .write_authorization_model(&store_id, model)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(WriteModelResponse {
            authorization_model_id: model_id.to_string(),
        }),
    ))
}

pub async fn list_authorization_models<F: StoreFactory + 'static>(
    State(state): State<AppState<F>>,
    Path(store_id): Path<String>,
) -> Result<Json<ListModelsResponse>, ApiError> {
    let store_id: StoreId = store_id.parse()?;
    let models = state.service.list_authorization_models(&store_id).await?;
    Ok(Json(ListModelsResponse {
        authorization_models: models.iter().map(model_json).collect(),
    }))
}

pub async fn read_authorization_model<F: StoreFactory + 'static>(
    State(state): State<AppState<F>>,
    Path((store_id, model_id)): Path<(String, String)>,
) -> Result<Json<ReadModelResponse>, ApiError> {
    let store_id: StoreId = store_id.parse()?;
    let model_id: ModelId = model_id.parse()?;
    let stored = state
        .service
        .read_authorization_model(&store_id, Some(model_id))
        .await?;
    Ok(Json(ReadModelResponse {
        authorization_model: model_json(&stored),
    }))
}

pub async fn write<F: StoreFactory + 'static>(
    State(state): State<AppState<F>>,
    Path(store_id): Path<String>,
    payload: Result<Json<WriteRequest>, JsonRejection>,
) -> Result<Json<WriteResponse>, ApiError> {
    let store_id: StoreId = store_id.parse()?;
    let req = body(payload)?;

    let mut input = WriteInput {
        model_id: parse_model_id(req.authorization_model_id.as_deref())?,
        ..Default::default()
    };
    if let Some(writes) = req.writes {
        input.writes = writes
            .tuple_keys
            .iter()
            .map(parse_tuple)
            .collect::<Result<_, _>>()?;
        input.on_duplicate = conflict(writes.on_duplicate);
    }
    if let Some(deletes) = req.deletes {
        input.deletes = deletes
            .tuple_keys
            .iter()
            .map(parse_tuple)
            .collect::<Result<_, _>>()?;
        input.on_missing = conflict(deletes.on_missing);
    }

    state.service.write_tuples(&store_id, input).await?;
    Ok(Json(WriteResponse {}))
}

pub async fn read<F: StoreFactory + 'static>(
    State(state): State<AppState<F>>,
    Path(store_id): Path<String>,
    payload: Bytes,
) -> Result<Json<ReadResponse>, ApiError> {
    let store_id: StoreId = store_id.parse()?;
    let req: ReadRequest = optional_body(&payload)?;

    let filter = match req.tuple_key {
        Some(ref key) => read_filter(key)?,
        None => TupleFilter::default(),
    };
    let output = state
        .service
        .read_tuples(
            &store_id,
            ReadInput {
                filter,
                page_size: req.page_size,
                continuation_token: req.continuation_token.filter(|t| !t.is_empty()),
            },
        )
        .await?;

    Ok(Json(ReadResponse {
        tuples: output
            .tuples
            .iter()
            .map(|t| TupleResponse { key: tuple_key(t) })
            .collect(),
        continuation_token: output.continuation_token.unwrap_or_default(),
    }))
}

pub async fn check<F: StoreFactory + 'static>(
    State(state): State<AppState<F>>,
    Path(store_id): Path<String>,
    payload: Result<Json<CheckRequest>, JsonRejection>,
) -> Result<Json<CheckResponse>, ApiError> {
    let store_id: StoreId = store_id.parse()?;
    let req = body(payload)?;

    let output = state
        .service
        .check(
            &store_id,
            CheckInput {
                user: req.tuple_key.user.parse()?,
                relation: req.tuple_key.relation,
                object: req.tuple_key.object.parse()?,
                model_id: parse_model_id(req.authorization_model_id.as_deref())?,
            },
        )
        .await?;

    Ok(Json(CheckResponse {
        allowed: output.allowed,
        diagnostic: output.diagnostic.as_ref().map(diagnostic_response),
    }))
}

pub async fn expand<F: StoreFactory + 'static>(
    State(state): State<AppState<F>>,
    Path(store_id): Path<String>,
    payload: Result<Json<ExpandRequest>, JsonRejection>,
) -> Result<Json<ExpandResponse>, ApiError> {
    let store_id: StoreId = store_id.parse()?;
    let req = body(payload)?;

    let tree = state
        .service
        .expand(
            &store_id,
            ExpandInput {
                object: req.tuple_key.object.parse()?,
                relation: req.tuple_key.relation,
                model_id: parse_model_id(req.authorization_model_id.as_deref())?,
            },
        )
        .await?;

    Ok(Json(ExpandResponse {
        tree: expand_tree_to_json(&tree),
    }))
}

pub async fn list_objects<F: StoreFactory + 'static>(
    State(state): State<AppState<F>>,
    Path(store_id): Path<String>,
    payload: Result<Json<ListObjectsRequest>, JsonRejection>,
) -> Result<Json<ListObjectsResponse>, ApiError> {
    let store_id: StoreId = store_id.parse()?;
    let req = body(payload)?;

    let objects = state
        .service
        .list_objects(
            &store_id,
            ListObjectsInput {
                user: req.user.parse()?,
                relation: req.relation,
                object_type: req.object_type,
                model_id: parse_model_id(req.authorization_model_id.as_deref())?,
                limit: req.limit,
            },
        )
        .await?;

    Ok(Json(ListObjectsResponse {
        objects: objects.iter().map(ToString::to_string).collect(),
    }))
}

pub async fn list_users<F: StoreFactory + 'static>(
    State(state): State<AppState<F>>,
    Path(store_id): Path<String>,
    payload: Result<Json<ListUsersRequest>, JsonRejection>,
) -> Result<Json<ListUsersResponse>, ApiError> {
    let store_id: StoreId = store_id.parse()?;
    let req = body(payload)?;

    let users = state
        .service
        .list_users(
            &store_id,
            ListUsersInput {
                object: req.object.parse()?,
                relation: req.relation,
                user_type: req.user_type,
                model_id: parse_model_id(req.authorization_model_id.as_deref())?,
            },
        )
        .await?;

    Ok(Json(ListUsersResponse {
        users: users.iter().map(ToString::to_string).collect(),
    }))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

#[cfg(test)]
mod tests {
    use super::super::{AppState, create_router};
    use super::*;
    use crate::metrics::Metrics;
    use crate::service::{AuthzService, TupleLimits};
    use axum_test::TestServer;
    use fgalite_core::engine::EngineConfig;
    use fgalite_core::model::ModelLimits;
    use fgalite_storage::InMemoryStoreFactory;
    use std::sync::Arc;

    fn make_test_server() -> TestServer {
        let metrics = Arc::new(Metrics::new());
        let service = Arc::new(
            AuthzService::new(
                Arc::new(InMemoryStoreFactory::new()),
                EngineConfig::default(),
                ModelLimits::default(),
                TupleLimits::default(),
            )
            .with_metrics(Arc::clone(&metrics)),
        );
        TestServer::new(create_router(AppState { service, metrics })).unwrap()
    }

    fn model() -> Value {
        json!({
            "schema_version": "1.1",
            "type_definitions": [
                { "type": "user" },
                {
                    "type": "document",
                    "relations": {
                        "owner": { "this": {} },
                        "viewer": {
                            "union": {
                                "child": [
                                    { "this": {} },
                                    { "computedUserset": { "relation": "owner" } }
                                ]
                            }
                        }
                    },
                    "metadata": {
                        "relations": {
                            "owner": { "directly_related_user_types": [{ "type": "user" }] },
                            "viewer": { "directly_related_user_types": [{ "type": "user" }] }
                        }
                    }
                }
            ]
        })
    }

    async fn setup_store(server: &TestServer) -> String {
        let store: Value = server.post("/stores").json(&json!({"name": "docs"})).await.json();
        let store_id = store["id"].as_str().unwrap().to_string();
        server
            .post(&format!("/stores/{store_id}/authorization-models"))
            .json(&model())
            .await
            .assert_status(StatusCode::CREATED);
        store_id
    }

    async fn write_tuple(
        server: &TestServer,
        store_id: &str,
        user: &str,
        relation: &str,
        object: &str,
    ) {
        let key = json!({ "user": user, "relation": relation, "object": object });
        server
            .post(&format!("/stores/{store_id}/write"))
            .json(&json!({ "writes": { "tuple_keys": [key] } }))
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn healthz_returns_200() {
        let server = make_test_server();
        let response = server.get("/healthz").await;
        response.assert_status_ok();
        response.assert_json(&json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn check_grants_through_computed_userset() {
        let server = make_test_server();
        let store_id = setup_store(&server).await;
        write_tuple(&server, &store_id, "user:anne", "owner", "document:plan").await;

        let response = server
            .post(&format!("/stores/{store_id}/check"))
            .json(&json!({
                "tuple_key": {
                    "user": "user:anne",
                    "relation": "viewer",
                    "object": "document:plan"
                }
            }))
            .await;

        response.assert_status_ok();
        response.assert_json(&json!({"allowed": true}));
    }

    #[tokio::test]
    async fn check_denies_without_tuple() {
        let server = make_test_server();
        let store_id = setup_store(&server).await;

        let response = server
            .post(&format!("/stores/{store_id}/check"))
            .json(&json!({
                "tuple_key": {
                    "user": "user:beth",
                    "relation": "viewer",
                    "object": "document:plan"
                }
            }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["allowed"], false);
        assert!(body.get("diagnostic").is_none());
    }

    #[tokio::test]
    async fn unknown_store_is_404() {
        let server = make_test_server();
        let response = server
            .get(&format!("/stores/{}", StoreId::generate()))
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn malformed_store_id_is_400() {
        let server = make_test_server();
        let response = server.get("/stores/not-a-uuid").await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["code"], "validation_error");
    }

    #[tokio::test]
    async fn malformed_body_is_a_validation_error() {
        let server = make_test_server();
        let store_id = setup_store(&server).await;

        let response = server
            .post(&format!("/stores/{store_id}/check"))
            .json(&json!({"tuple_key": "document:plan"}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["code"], "validation_error");
    }

    #[tokio::test]
    async fn invalid_model_is_rejected() {
        let server = make_test_server();
        let store: Value = server.post("/stores").json(&json!({"name": "x"})).await.json();
        let store_id = store["id"].as_str().unwrap();

        let response = server
            .post(&format!("/stores/{store_id}/authorization-models"))
            .json(&json!({
                "schema_version": "1.1",
                "type_definitions": [{
                    "type": "document",
                    "relations": { "viewer": { "computedUserset": { "relation": "editor" } } }
                }]
            }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["code"], "validation_error");
        assert!(body["message"].as_str().unwrap().contains("editor"));
    }

    #[tokio::test]
    async fn strict_duplicate_write_is_409() {
        let server = make_test_server();
        let store_id = setup_store(&server).await;
        write_tuple(&server, &store_id, "user:anne", "owner", "document:plan").await;

        let response = server
            .post(&format!("/stores/{store_id}/write"))
            .json(&json!({
                "writes": {
                    "tuple_keys": [{
                        "user": "user:anne",
                        "relation": "owner",
                        "object": "document:plan"
                    }],
                    "on_duplicate": "error"
                }
            }))
            .await;

        response.assert_status(StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["code"], "already_exists");
    }

    #[tokio::test]
    async fn read_accepts_type_only_object_filter() {
        let server = make_test_server();
        let store_id = setup_store(&server).await;
        write_tuple(&server, &store_id, "user:anne", "owner", "document:plan").await;
        write_tuple(&server, &store_id, "user:beth", "viewer", "document:memo").await;

        let body: Value = server
            .post(&format!("/stores/{store_id}/read"))
            .json(&json!({ "tuple_key": { "object": "document:", "relation": "viewer" } }))
            .await
            .json();

        assert_eq!(
            body,
            json!({
                "tuples": [{
                    "key": { "user": "user:beth", "relation": "viewer", "object": "document:memo" }
                }],
                "continuation_token": ""
            })
        );
    }

    #[tokio::test]
    async fn read_without_body_returns_every_tuple() {
        let server = make_test_server();
        let store_id = setup_store(&server).await;
        write_tuple(&server, &store_id, "user:anne", "owner", "document:plan").await;
        write_tuple(&server, &store_id, "user:beth", "viewer", "document:memo").await;

        let response = server
            .post(&format!("/stores/{store_id}/read"))
            .content_type("application/json")
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["tuples"].as_array().unwrap().len(), 2);
        assert_eq!(body["continuation_token"], "");
    }

    #[tokio::test]
    async fn read_rejects_malformed_body() {
        let server = make_test_server();
        let store_id = setup_store(&server).await;

        let response = server
            .post(&format!("/stores/{store_id}/read"))
            .json(&json!({ "page_size": "many" }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["code"], "validation_error");
    }

    #[tokio::test]
    async fn read_rejects_out_of_range_continuation_token() {
        let server = make_test_server();
        let store_id = setup_store(&server).await;
        write_tuple(&server, &store_id, "user:anne", "owner", "document:plan").await;

        let response = server
            .post(&format!("/stores/{store_id}/read"))
            .json(&json!({ "continuation_token": "1:18446744073709551615" }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["code"], "validation_error");
    }

    #[tokio::test]
    async fn model_with_duplicate_relation_keys_is_rejected() {
        let server = make_test_server();
        let store: Value = server.post("/stores").json(&json!({"name": "x"})).await.json();
        let store_id = store["id"].as_str().unwrap();

        let response = server
            .post(&format!("/stores/{store_id}/authorization-models"))
            .content_type("application/json")
            .bytes(Bytes::from_static(
                br#"{"schema_version":"1.1","type_definitions":[{"type":"user"},
                    {"type":"doc","relations":{"owner":{"this":{}},"owner":{"this":{}}}}]}"#,
            ))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert!(body["message"].as_str().unwrap().contains("duplicate relation"));
    }

    #[tokio::test]
    async fn expand_renders_union_tree() {
        let server = make_test_server();
        let store_id = setup_store(&server).await;
        write_tuple(&server, &store_id, "user:beth", "viewer", "document:plan").await;

        let body: Value = server
            .post(&format!("/stores/{store_id}/expand"))
            .json(&json!({ "tuple_key": { "relation": "viewer", "object": "document:plan" } }))
            .await
            .json();

        let root = &body["tree"]["root"];
        assert_eq!(root["name"], "document:plan#viewer");
        let nodes = root["union"]["nodes"].as_array().unwrap();
        assert_eq!(nodes[0]["leaf"]["users"], json!(["user:beth"]));
        assert_eq!(nodes[1]["leaf"]["computed"]["userset"], "document:plan#owner");
    }

    #[tokio::test]
    async fn metrics_count_requests_and_checks() {
        let server = make_test_server();
        let store_id = setup_store(&server).await;
        server
            .post(&format!("/stores/{store_id}/check"))
            .json(&json!({
                "tuple_key": {
                    "user": "user:anne",
                    "relation": "viewer",
                    "object": "document:plan"
                }
            }))
            .await;

        let text = server.get("/metrics").await.text();
        assert!(text.contains("fgalite_checks_denied_total 1"), "{text}");
        assert!(text.contains("fgalite_requests_success_total 3"), "{text}");
    }

    #[test]
    fn read_filter_parses_full_keys() {
        let filter = read_filter(&ReadTupleKey {
            user: Some("group:eng#member".to_string()),
            relation: Some("viewer".to_string()),
            object: Some("document:plan".to_string()),
        })
        .unwrap();

        assert_eq!(filter.object_id.as_deref(), Some("plan"));
        assert_eq!(filter.subject_relation, Some(Some("member".to_string())));
    }

    #[test]
    fn read_filter_rejects_bad_object() {
        let err = read_filter(&ReadTupleKey {
            object: Some("document".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ApiError::TupleParse(_)));
    }
}
