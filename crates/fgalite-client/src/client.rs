use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::ClientOptions;
use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleKey {
    pub user: String,
    pub relation: String,
    pub object: String,
}

impl TupleKey {
    pub fn new(
        user: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            relation: relation.into(),
            object: object.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Store {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckResponse {
    pub allowed: bool,
    #[serde(default)]
    pub diagnostic: Option<Diagnostic>,
}

#[derive(Debug, Deserialize)]
struct WriteModelResponse {
    authorization_model_id: String,
}

#[derive(Debug, Deserialize)]
struct ReadTuple {
    key: TupleKey,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    tuples: Vec<ReadTuple>,
    #[serde(default)]
    continuation_token: String,
}

#[derive(Debug, Deserialize)]
struct ListObjectsResponse {
    objects: Vec<String>,
}

/// Thin typed wrapper over the fgalite HTTP API.
#[derive(Debug, Clone)]
pub struct FgaClient {
    http: reqwest::Client,
    base_url: String,
}

impl FgaClient {
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.connect_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: options.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn create_store(&self, name: &str) -> Result<Store, ClientError> {
        self.post("/stores", &json!({ "name": name })).await
    }

    /// Writes a model given in its JSON form and returns the new model id.
    pub async fn write_authorization_model(
        &self,
        store_id: &str,
        model: &Value,
    ) -> Result<String, ClientError> {
        let response: WriteModelResponse = self
            .post(&format!("/stores/{store_id}/authorization-models"), model)
            .await?;
        Ok(response.authorization_model_id)
    }

    pub async fn write_tuples(
        &self,
        store_id: &str,
        tuples: &[TupleKey],
    ) -> Result<(), ClientError> {
        let _: Value = self
            .post(
                &format!("/stores/{store_id}/write"),
                &json!({ "writes": { "tuple_keys": tuples } }),
            )
            .await?;
        Ok(())
    }

    pub async fn delete_tuples(
        &self,
        store_id: &str,
        tuples: &[TupleKey],
    ) -> Result<(), ClientError> {
        let _: Value = self
            .post(
                &format!("/stores/{store_id}/write"),
                &json!({ "deletes": { "tuple_keys": tuples } }),
            )
            .await?;
        Ok(())
    }

    pub async fn check(
        &self,
        store_id: &str,
        tuple: &TupleKey,
    ) -> Result<CheckResponse, ClientError> {
        self.post(
            &format!("/stores/{store_id}/check"),
            &json!({ "tuple_key": tuple }),
        )
        .await
    }

    /// Reads every tuple matching the partial key, following continuation
    /// tokens until the last page.
    pub async fn read(
        &self,
        store_id: &str,
        user: Option<&str>,
        relation: Option<&str>,
        object: Option<&str>,
    ) -> Result<Vec<TupleKey>, ClientError> {
        let mut tuples = Vec::new();
        let mut token = String::new();
        loop {
            let page: ReadResponse = self
                .post(
                    &format!("/stores/{store_id}/read"),
                    &json!({
                        "tuple_key": { "user": user, "relation": relation, "object": object },
                        "continuation_token": token,
                    }),
                )
                .await?;
            tuples.extend(page.tuples.into_iter().map(|t| t.key));
            if page.continuation_token.is_empty() {
                return Ok(tuples);
            }
            token = page.continuation_token;
        }
    }

    pub async fn list_objects(
        &self,
        store_id: &str,
        user: &str,
        relation: &str,
        object_type: &str,
    ) -> Result<Vec<String>, ClientError> {
        let response: ListObjectsResponse = self
            .post(
                &format!("/stores/{store_id}/list-objects"),
                &json!({ "user": user, "relation": relation, "type": object_type }),
            )
            .await?;
        Ok(response.objects)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "fgalite request");
        let response = self.http.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            return Err(ClientError::from_response(status, &text));
        }
        Ok(response.json().await?)
    }
}
