//! HTTP client wrapper for interacting with Qdrant.

use crate::config::QdrantSettings;
use crate::qdrant::types::{
    CollectionInfoResponse, CountResponse, ListCollectionsResponse, PointInsert, QdrantError,
    QueryResponse, QueryResponseResult, ScoredPoint, ScrollResponse, VectorsConfig,
};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value, json};

/// Distance metric every collection is created with and verified against.
const DISTANCE: &str = "Cosine";

/// Payload fields that receive a keyword index for filtering.
const INDEXED_FIELDS: [&str; 3] = ["namespace", "filename", "content_hash"];

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a new client for the configured Qdrant endpoint.
    pub fn new(settings: &QdrantSettings) -> Result<Self, QdrantError> {
        let client = Client::builder()
            .user_agent("docindex/0.1")
            .timeout(settings.timeout)
            .build()?;

        let base_url = normalize_base_url(&settings.url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = %settings
                .api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: settings.api_key.clone(),
        })
    }

    /// Create a collection when it is missing from Qdrant, otherwise verify that its vector
    /// size and distance match.
    pub async fn create_collection_if_not_exists(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        if self.collection_exists(collection_name).await? {
            return self.verify_collection(collection_name, vector_size).await;
        }

        tracing::debug!(
            collection = collection_name,
            vector_size,
            "Creating collection"
        );
        self.create_collection(collection_name, vector_size).await
    }

    /// Create a collection with the specified vector size and cosine distance.
    pub async fn create_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": DISTANCE
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))?
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection created");
        })
        .await
    }

    /// Check that an existing collection stores unnamed vectors of `vector_size` compared by
    /// cosine distance.
    pub async fn verify_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))?
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Failed to inspect collection");
            return Err(error);
        }

        let CollectionInfoResponse { result } = response.json().await?;
        let incompatible = |reason: String| QdrantError::IncompatibleCollection {
            collection: collection_name.to_string(),
            reason,
        };
        let params = match result.config.params.vectors {
            VectorsConfig::Single(params) => params,
            VectorsConfig::Named(_) => {
                return Err(incompatible("uses named vectors".to_string()));
            }
        };
        if params.size != vector_size {
            return Err(incompatible(format!(
                "vector size {} differs from configured {vector_size}",
                params.size
            )));
        }
        if !params.distance.eq_ignore_ascii_case(DISTANCE) {
            return Err(incompatible(format!(
                "distance {} differs from {DISTANCE}",
                params.distance
            )));
        }

        tracing::debug!(collection = collection_name, vector_size, "Existing collection verified");
        Ok(())
    }

    /// Retrieve the names of all collections present in Qdrant.
    pub async fn list_collections(&self) -> Result<Vec<String>, QdrantError> {
        let response = self.request(Method::GET, "collections")?.send().await?;

        if response.status().is_success() {
            let payload: ListCollectionsResponse = response.json().await?;
            let names = payload
                .result
                .collections
                .into_iter()
                .map(|collection| collection.name)
                .collect();
            Ok(names)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Failed to list collections");
            Err(error)
        }
    }

    /// Upload points to the given collection, waiting for the write to be applied.
    pub async fn upsert_points(
        &self,
        collection_name: &str,
        points: Vec<PointInsert>,
    ) -> Result<usize, QdrantError> {
        if points.is_empty() {
            return Ok(0);
        }

        let serialized: Vec<Value> = points
            .into_iter()
            .map(|point| {
                json!({
                    "id": point.id,
                    "vector": point.vector,
                    "payload": point.payload,
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{collection_name}/points"),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = collection_name,
                points = point_count,
                "Points upserted"
            );
        })
        .await?;

        Ok(point_count)
    }

    /// Perform a similarity search against a collection, returning scored payloads.
    pub async fn search_points(
        &self,
        collection_name: &str,
        vector: Vec<f32>,
        filter: Option<Value>,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        let mut body = Map::new();
        body.insert("query".into(), json!(vector));
        body.insert("limit".into(), json!(limit));
        body.insert("with_payload".into(), Value::Bool(true));
        if let Some(threshold) = score_threshold {
            body.insert("score_threshold".into(), Value::from(threshold));
        }
        if let Some(filter_value) = filter {
            body.insert("filter".into(), filter_value);
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        let results = points
            .into_iter()
            .map(|point| ScoredPoint {
                id: stringify_point_id(point.id),
                score: point.score,
                payload: point.payload,
            })
            .collect();

        Ok(results)
    }

    /// Count points matching a filter.
    pub async fn count_points(
        &self,
        collection_name: &str,
        filter: Value,
    ) -> Result<usize, QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/count"),
            )?
            .json(&json!({ "filter": filter, "exact": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Qdrant count failed");
            return Err(error);
        }

        let CountResponse { result } = response.json().await?;
        Ok(result.count)
    }

    /// Delete every point matching a filter.
    pub async fn delete_points(
        &self,
        collection_name: &str,
        filter: Value,
    ) -> Result<(), QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/delete"),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "filter": filter }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Points deleted");
        })
        .await
    }

    /// Fetch the payload of the first point matching a filter, restricted to `fields`.
    pub async fn first_payload(
        &self,
        collection_name: &str,
        filter: Value,
        fields: &[&str],
    ) -> Result<Option<Map<String, Value>>, QdrantError> {
        let body = json!({
            "filter": filter,
            "limit": 1,
            "with_payload": fields,
            "with_vector": false,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/scroll"),
            )?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Failed to scroll payloads");
            return Err(error);
        }

        let ScrollResponse { result } = response.json().await?;
        Ok(result
            .points
            .into_iter()
            .find_map(|point| point.payload))
    }

    /// Ensure keyword indexes exist for the payload fields used in filters.
    pub async fn ensure_payload_indexes(&self, collection_name: &str) -> Result<(), QdrantError> {
        for field in INDEXED_FIELDS {
            let body = json!({
                "field_name": field,
                "field_schema": "keyword",
            });

            let response = self
                .request(Method::PUT, &format!("collections/{collection_name}/index"))?
                .query(&[("wait", true)])
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() {
                tracing::debug!(collection = collection_name, field, "Payload index ensured");
            } else if response.status() == StatusCode::CONFLICT {
                tracing::debug!(
                    collection = collection_name,
                    field,
                    "Payload index already exists"
                );
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::warn!(collection = collection_name, field, error = %error, "Failed to ensure payload index");
            }
        }

        Ok(())
    }

    async fn collection_exists(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let collections = self.list_collections().await?;
        Ok(collections.iter().any(|name| name == collection_name))
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, QdrantError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        Ok(req)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qdrant::{SearchFilterArgs, build_search_filter};
    use httpmock::{
        Method::{GET, POST, PUT},
        MockServer,
    };

    fn service(base_url: String) -> QdrantService {
        QdrantService {
            client: Client::builder()
                .user_agent("docindex-test")
                .build()
                .expect("client"),
            base_url,
            api_key: None,
        }
    }

    #[tokio::test]
    async fn search_points_emits_expected_request() {
        let server = MockServer::start_async().await;

        let filter = build_search_filter(&SearchFilterArgs {
            namespace: Some("legal".into()),
            ..Default::default()
        })
        .expect("filter value");

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/query")
                    .json_body(json!({
                        "query": [0.5, 0.25],
                        "limit": 3,
                        "with_payload": true,
                        "score_threshold": 0.25,
                        "filter": {
                            "must": [
                                { "key": "namespace", "match": { "value": "legal" } }
                            ]
                        }
                    }));
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": {
                        "points": [
                            {
                                "id": "point-1",
                                "score": 0.42,
                                "payload": {
                                    "text": "Example",
                                    "namespace": "legal"
                                }
                            }
                        ]
                    }
                }));
            })
            .await;

        let results = service(server.base_url())
            .search_points("demo", vec![0.5, 0.25], Some(filter), 3, Some(0.25))
            .await
            .expect("search request");

        mock.assert_async().await;

        assert_eq!(results.len(), 1);
        let hit = &results[0];
        assert_eq!(hit.id, "point-1");
        assert!((hit.score - 0.42).abs() < f32::EPSILON);
        let payload = hit.payload.as_ref().expect("payload");
        assert_eq!(payload["namespace"], Value::String("legal".into()));
        assert_eq!(payload["text"], Value::String("Example".into()));
    }

    #[tokio::test]
    async fn create_collection_if_not_exists_creates_missing_collection() {
        let server = MockServer::start_async().await;
        let lookup = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections");
                then.status(200).json_body(json!({
                    "result": { "collections": [ { "name": "other" } ] },
                    "status": "ok"
                }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/docs").json_body(json!({
                    "vectors": { "size": 3, "distance": "Cosine" }
                }));
                then.status(200).json_body(json!({ "result": true, "status": "ok" }));
            })
            .await;

        service(server.base_url())
            .create_collection_if_not_exists("docs", 3)
            .await
            .expect("collection ensured");

        lookup.assert_async().await;
        create.assert_async().await;
    }

    async fn mock_existing_collection(server: &MockServer, vectors: Value) -> httpmock::Mock<'_> {
        server
            .mock_async(move |when, then| {
                when.method(GET).path("/collections/docs");
                then.status(200).json_body(json!({
                    "result": {
                        "status": "green",
                        "config": { "params": { "vectors": vectors } }
                    },
                    "status": "ok"
                }));
            })
            .await
    }

    async fn mock_collection_list(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections");
                then.status(200).json_body(json!({
                    "result": { "collections": [ { "name": "docs" } ] },
                    "status": "ok"
                }));
            })
            .await;
    }

    #[tokio::test]
    async fn existing_collection_with_matching_vectors_is_accepted() {
        let server = MockServer::start_async().await;
        mock_collection_list(&server).await;
        let info =
            mock_existing_collection(&server, json!({ "size": 3, "distance": "Cosine" })).await;

        service(server.base_url())
            .create_collection_if_not_exists("docs", 3)
            .await
            .expect("collection verified");
        info.assert_async().await;
    }

    #[tokio::test]
    async fn existing_collection_with_other_size_is_rejected() {
        let server = MockServer::start_async().await;
        mock_collection_list(&server).await;
        mock_existing_collection(&server, json!({ "size": 768, "distance": "Cosine" })).await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/docs");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;

        let error = service(server.base_url())
            .create_collection_if_not_exists("docs", 3)
            .await
            .unwrap_err();

        assert!(matches!(error, QdrantError::IncompatibleCollection { .. }));
        assert!(error.to_string().contains("768"));
        create.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn existing_collection_with_other_distance_is_rejected() {
        let server = MockServer::start_async().await;
        mock_collection_list(&server).await;
        mock_existing_collection(&server, json!({ "size": 3, "distance": "Dot" })).await;

        let error = service(server.base_url())
            .create_collection_if_not_exists("docs", 3)
            .await
            .unwrap_err();
        assert!(error.to_string().contains("Dot"));
    }

    #[tokio::test]
    async fn existing_collection_with_named_vectors_is_rejected() {
        let server = MockServer::start_async().await;
        mock_collection_list(&server).await;
        mock_existing_collection(
            &server,
            json!({ "dense": { "size": 3, "distance": "Cosine" } }),
        )
        .await;

        let error = service(server.base_url())
            .create_collection_if_not_exists("docs", 3)
            .await
            .unwrap_err();
        assert!(matches!(error, QdrantError::IncompatibleCollection { .. }));
    }

    #[tokio::test]
    async fn upsert_points_reports_failures() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/docs/points");
                then.status(400).body("wrong vector size");
            })
            .await;

        let error = service(server.base_url())
            .upsert_points(
                "docs",
                vec![PointInsert {
                    id: "00000000-0000-0000-0000-000000000001".into(),
                    vector: vec![0.1],
                    payload: Map::new(),
                }],
            )
            .await
            .unwrap_err();

        match error {
            QdrantError::UnexpectedStatus { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, "wrong vector size");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn first_payload_returns_none_for_empty_scroll() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/docs/points/scroll");
                then.status(200).json_body(json!({
                    "result": { "points": [], "next_page_offset": null }
                }));
            })
            .await;

        let payload = service(server.base_url())
            .first_payload("docs", json!({ "must": [] }), &["content_hash"])
            .await
            .expect("scroll");
        assert!(payload.is_none());
    }

    #[test]
    fn format_endpoint_joins_segments() {
        assert_eq!(
            format_endpoint("http://localhost:6333/", "/collections"),
            "http://localhost:6333/collections"
        );
    }
}
