use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateStoreRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ListStoresResponse {
    pub stores: Vec<StoreResponse>,
}

#[derive(Debug, Serialize)]
pub struct WriteModelResponse {
    pub authorization_model_id: String,
}

#[derive(Debug, Serialize)]
pub struct ReadModelResponse {
    pub authorization_model: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct ListModelsResponse {
    pub authorization_models: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TupleKey {
    pub user: String,
    pub relation: String,
    pub object: String,
}

/// Read filter; every field is optional and `object` may be just `type:`.
#[derive(Debug, Default, Deserialize)]
pub struct ReadTupleKey {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub relation: Option<String>,
    #[serde(default)]
    pub object: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConflictRequest {
    Error,
    Ignore,
}

#[derive(Debug, Deserialize)]
pub struct WriteTupleKeys {
    pub tuple_keys: Vec<TupleKey>,
    #[serde(default)]
    pub on_duplicate: Option<ConflictRequest>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteTupleKeys {
    pub tuple_keys: Vec<TupleKey>,
    #[serde(default)]
    pub on_missing: Option<ConflictRequest>,
}

#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    #[serde(default)]
    pub writes: Option<WriteTupleKeys>,
    #[serde(default)]
    pub deletes: Option<DeleteTupleKeys>,
    #[serde(default)]
    pub authorization_model_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WriteResponse {}

#[derive(Debug, Default, Deserialize)]
pub struct ReadRequest {
    #[serde(default)]
    pub tuple_key: Option<ReadTupleKey>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub continuation_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TupleResponse {
    pub key: TupleKey,
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub tuples: Vec<TupleResponse>,
    /// Empty when there are no further pages.
    pub continuation_token: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub tuple_key: TupleKey,
    #[serde(default)]
    pub authorization_model_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<DiagnosticResponse>,
}

#[derive(Debug, Serialize)]
pub struct DiagnosticResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ExpandTupleKey {
    pub relation: String,
    pub object: String,
}

#[derive(Debug, Deserialize)]
pub struct ExpandRequest {
    pub tuple_key: ExpandTupleKey,
    #[serde(default)]
    pub authorization_model_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExpandResponse {
    pub tree: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ListObjectsRequest {
    pub user: String,
    pub relation: String,
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(default)]
    pub authorization_model_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListObjectsResponse {
    pub objects: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListUsersRequest {
    pub object: String,
    pub relation: String,
    pub user_type: String,
    #[serde(default)]
    pub authorization_model_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListUsersResponse {
    pub users: Vec<String>,
}
