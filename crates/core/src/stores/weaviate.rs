use crate::config::WeaviateConfig;
use crate::models::{
    BatchFailure, BatchInsertReport, ChunkObject, CollectionSpec, DataType, GenerativeResult,
    NewObject, SearchHit, SearchMode, SearchQuery, StoredObject,
};
use crate::retry::{with_retry, RetryPolicy};
use crate::stores::graphql;
use crate::traits::ChunkStore;
use crate::StoreError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

const BACKEND: &str = "weaviate";
const CLASS_NAME_PATTERN: &str = r"^[A-Z][_0-9A-Za-z]*$";

/// Rejects names Weaviate would not accept as a class, before they reach a
/// URL path or GraphQL text.
pub fn validate_collection_name(name: &str) -> Result<(), StoreError> {
    if Regex::new(CLASS_NAME_PATTERN)?.is_match(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidCollectionName(name.to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub batch_size: usize,
    /// Import stops once more than this many objects have failed.
    pub max_errors: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_errors: usize::MAX,
        }
    }
}

impl BatchOptions {
    /// Settings used when importing the chunks of one uploaded PDF.
    pub fn for_uploads() -> Self {
        Self {
            batch_size: 200,
            max_errors: 10,
        }
    }
}

/// A session against one Weaviate instance. Cloning shares the underlying
/// connection pool.
#[derive(Debug, Clone)]
pub struct WeaviateClient {
    base: Url,
    client: Client,
    retry: RetryPolicy,
}

impl WeaviateClient {
    /// Builds a client without touching the network.
    pub fn new(config: &WeaviateConfig) -> Result<Self, StoreError> {
        let base = config.base_url()?;

        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {api_key}"))?);
        }
        for (name, value) in config.headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|error| StoreError::Request(format!("invalid header {name}: {error}")))?;
            headers.insert(name, header_value(&value)?);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            base,
            client,
            retry: RetryPolicy::default(),
        })
    }

    /// Builds a client and waits for the instance to report ready.
    pub async fn connect(config: &WeaviateConfig) -> Result<Self, StoreError> {
        let client = Self::new(config)?;
        match client.is_ready().await {
            Ok(true) => {
                info!(url = %client.base, "connected to weaviate");
                Ok(client)
            }
            Ok(false) => Err(StoreError::Connection {
                url: client.base.to_string(),
                details: "instance is not ready".to_string(),
            }),
            Err(error) => Err(StoreError::Connection {
                url: client.base.to_string(),
                details: error.to_string(),
            }),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        Ok(self.base.join(path)?)
    }

    pub async fn is_ready(&self) -> Result<bool, StoreError> {
        let url = self.endpoint("v1/.well-known/ready")?;
        let response = self.client.get(url).send().await?;
        Ok(response.status().is_success())
    }

    /// True when the schema can be listed.
    pub async fn health_check(&self) -> bool {
        match self.list_collections().await {
            Ok(_) => true,
            Err(error) => {
                warn!(error = %error, "weaviate health check failed");
                false
            }
        }
    }

    // Collections

    pub async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let url = self.endpoint("v1/schema")?;
        let url = &url;
        let schema: Value = with_retry(self.retry, "list_collections", move || async move {
            let response = self.client.get(url.clone()).send().await?;
            Ok(ensure_success(response).await?.json().await?)
        })
        .await?;

        Ok(schema
            .get("classes")
            .and_then(Value::as_array)
            .map(|classes| {
                classes
                    .iter()
                    .filter_map(|class| class.get("class").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Raw class definition, or `None` when the collection does not exist.
    pub async fn collection_schema(&self, name: &str) -> Result<Option<Value>, StoreError> {
        validate_collection_name(name)?;
        let url = self.endpoint(&format!("v1/schema/{name}"))?;
        let url = &url;
        with_retry(self.retry, "collection_schema", move || async move {
            let response = self.client.get(url.clone()).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            Ok(Some(ensure_success(response).await?.json().await?))
        })
        .await
    }

    pub async fn collection_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.collection_schema(name).await?.is_some())
    }

    pub async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), StoreError> {
        validate_collection_name(&spec.name)?;
        let url = self.endpoint("v1/schema")?;
        let body = class_definition(spec);
        let url = &url;
        let body = &body;
        with_retry(self.retry, "create_collection", move || async move {
            let response = self.client.post(url.clone()).json(&body).send().await?;
            ensure_success(response).await?;
            Ok(())
        })
        .await?;

        info!(collection = %spec.name, "created collection");
        Ok(())
    }

    pub async fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
        validate_collection_name(name)?;
        let url = self.endpoint(&format!("v1/schema/{name}"))?;
        let url = &url;
        with_retry(self.retry, "delete_collection", move || async move {
            let response = self.client.delete(url.clone()).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(StoreError::NotFound(format!("collection {name}")));
            }
            ensure_success(response).await?;
            Ok(())
        })
        .await?;

        info!(collection = name, "deleted collection");
        Ok(())
    }

    /// Creates the chunk collection unless it already exists.
    pub async fn ensure_chunk_collection(&self, name: &str) -> Result<bool, StoreError> {
        if self.collection_exists(name).await? {
            debug!(collection = name, "using existing collection");
            return Ok(false);
        }
        self.create_collection(&CollectionSpec::for_chunks(name)).await?;
        Ok(true)
    }

    /// Property names of scalar fields, used when a query does not name any.
    pub async fn property_names(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let schema = self
            .collection_schema(collection)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("collection {collection}")))?;
        Ok(scalar_properties(&schema))
    }

    async fn resolve_properties(
        &self,
        collection: &str,
        requested: &[String],
    ) -> Result<Vec<String>, StoreError> {
        if requested.is_empty() {
            self.property_names(collection).await
        } else {
            Ok(requested.to_vec())
        }
    }

    // Objects

    pub async fn insert_object(&self, collection: &str, object: &NewObject) -> Result<Uuid, StoreError> {
        validate_collection_name(collection)?;
        let url = self.endpoint("v1/objects")?;
        let body = object_body(collection, object);
        let url = &url;
        let body = &body;
        let created: Value = with_retry(self.retry, "insert_object", move || async move {
            let response = self.client.post(url.clone()).json(&body).send().await?;
            Ok(ensure_success(response).await?.json().await?)
        })
        .await?;

        let id = created
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: "created object has no id".to_string(),
            })?;

        info!(collection, object_id = %id, "inserted object");
        Ok(id)
    }

    /// Imports `objects` in batches. A batch whose request fails after
    /// retries counts all of its objects as failed.
    pub async fn batch_insert(
        &self,
        collection: &str,
        objects: &[NewObject],
        options: BatchOptions,
    ) -> Result<BatchInsertReport, StoreError> {
        validate_collection_name(collection)?;
        let url = self.endpoint("v1/batch/objects")?;
        let url = &url;
        let batch_size = options.batch_size.max(1);
        let mut report = BatchInsertReport {
            total: objects.len(),
            ..Default::default()
        };

        for (batch_index, batch) in objects.chunks(batch_size).enumerate() {
            let offset = batch_index * batch_size;
            if report.failed > options.max_errors {
                report.not_attempted = objects[offset..].len();
                warn!(
                    collection,
                    failed = report.failed,
                    remaining = report.not_attempted,
                    "batch import stopped due to excessive errors"
                );
                break;
            }

            let body = json!({
                "objects": batch
                    .iter()
                    .map(|object| object_body(collection, object))
                    .collect::<Vec<_>>(),
            });

            let body = &body;
            let outcome = with_retry(self.retry, "batch_insert", move || async move {
                let response = self.client.post(url.clone()).json(&body).send().await?;
                Ok(ensure_success(response).await?.json::<Value>().await?)
            })
            .await;

            let batch_report = match outcome {
                Ok(response) => parse_batch_response(&response, batch.len()),
                Err(error) => {
                    warn!(collection, batch = batch_index, error = %error, "batch request failed");
                    failed_batch(batch.len(), &error.to_string())
                }
            };
            report.merge(batch_report, offset);
        }

        info!(
            collection,
            succeeded = report.succeeded,
            failed = report.failed,
            not_attempted = report.not_attempted,
            total = report.total,
            "batch insert finished"
        );
        Ok(report)
    }

    pub async fn get_object(
        &self,
        collection: &str,
        id: Uuid,
        include_vector: bool,
    ) -> Result<StoredObject, StoreError> {
        validate_collection_name(collection)?;
        let mut url = self.endpoint(&format!("v1/objects/{collection}/{id}"))?;
        if include_vector {
            url.query_pairs_mut().append_pair("include", "vector");
        }

        let url = &url;
        let body: Value = with_retry(self.retry, "get_object", move || async move {
            let response = self.client.get(url.clone()).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(StoreError::NotFound(format!("object {id} in {collection}")));
            }
            Ok(ensure_success(response).await?.json().await?)
        })
        .await?;

        Ok(StoredObject {
            uuid: id,
            properties: body
                .get("properties")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            vector: body
                .get("vector")
                .and_then(Value::as_array)
                .map(|values| values.iter().filter_map(Value::as_f64).map(|v| v as f32).collect()),
        })
    }

    /// Objects in storage order with every scalar property.
    pub async fn fetch_objects(&self, collection: &str, limit: usize) -> Result<Vec<SearchHit>, StoreError> {
        let properties = self.property_names(collection).await?;
        let response = self
            .graphql(&graphql::fetch_query(collection, limit, &properties))
            .await?;
        graphql::parse_hits(&response, collection)
    }

    // Queries

    async fn graphql(&self, query: &str) -> Result<Value, StoreError> {
        let url = self.endpoint("v1/graphql")?;
        let body = json!({ "query": query });
        debug!(query, "graphql request");
        let url = &url;
        let body = &body;
        with_retry(self.retry, "graphql", move || async move {
            let response = self.client.post(url.clone()).json(&body).send().await?;
            Ok(ensure_success(response).await?.json().await?)
        })
        .await
    }

    pub async fn semantic_search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
        properties: &[String],
    ) -> Result<Vec<SearchHit>, StoreError> {
        validate_collection_name(collection)?;
        let properties = self.resolve_properties(collection, properties).await?;
        let response = self
            .graphql(&graphql::near_text_query(collection, query, limit, &properties))
            .await?;
        graphql::parse_hits(&response, collection)
    }

    /// BM25 ranking. Named `properties` are both searched and returned.
    pub async fn keyword_search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
        properties: &[String],
    ) -> Result<Vec<SearchHit>, StoreError> {
        validate_collection_name(collection)?;
        let returned = self.resolve_properties(collection, properties).await?;
        let response = self
            .graphql(&graphql::bm25_query(collection, query, limit, &returned, properties))
            .await?;
        graphql::parse_hits(&response, collection)
    }

    /// `alpha` 0 is pure keyword ranking, 1 is pure vector ranking.
    pub async fn hybrid_search(
        &self,
        collection: &str,
        query: &str,
        alpha: f64,
        limit: usize,
        properties: &[String],
    ) -> Result<Vec<SearchHit>, StoreError> {
        validate_collection_name(collection)?;
        if !(0.0..=1.0).contains(&alpha) {
            return Err(StoreError::Request(format!("alpha {alpha} is outside 0..=1")));
        }
        let properties = self.resolve_properties(collection, properties).await?;
        let response = self
            .graphql(&graphql::hybrid_query(collection, query, alpha, limit, &properties))
            .await?;
        graphql::parse_hits(&response, collection)
    }

    pub async fn generative_search(
        &self,
        collection: &str,
        query: &str,
        prompt: &str,
        grouped_task: Option<&str>,
        limit: usize,
    ) -> Result<GenerativeResult, StoreError> {
        validate_collection_name(collection)?;
        let properties = self.property_names(collection).await?;
        let response = self
            .graphql(&graphql::generative_query(
                collection,
                query,
                prompt,
                grouped_task,
                limit,
                &properties,
            ))
            .await?;
        graphql::parse_generative(&response, collection)
    }
}

#[async_trait]
impl ChunkStore for WeaviateClient {
    async fn insert_chunks(
        &self,
        collection: &str,
        objects: &[ChunkObject],
    ) -> Result<BatchInsertReport, StoreError> {
        let objects = objects.iter().map(NewObject::from).collect::<Vec<_>>();
        self.batch_insert(collection, &objects, BatchOptions::for_uploads())
            .await
    }

    async fn search(
        &self,
        collection: &str,
        query: &SearchQuery,
    ) -> Result<Vec<SearchHit>, StoreError> {
        match query.mode {
            SearchMode::Semantic => {
                self.semantic_search(collection, &query.text, query.limit, &query.properties)
                    .await
            }
            SearchMode::Keyword => {
                self.keyword_search(collection, &query.text, query.limit, &query.properties)
                    .await
            }
            SearchMode::Hybrid => {
                self.hybrid_search(
                    collection,
                    &query.text,
                    query.alpha,
                    query.limit,
                    &query.properties,
                )
                .await
            }
        }
    }

    async fn generate(
        &self,
        collection: &str,
        query: &str,
        prompt: &str,
        limit: usize,
    ) -> Result<GenerativeResult, StoreError> {
        self.generative_search(collection, query, prompt, None, limit)
            .await
    }
}

fn header_value(value: &str) -> Result<HeaderValue, StoreError> {
    HeaderValue::from_str(value)
        .map_err(|error| StoreError::Request(format!("invalid header value: {error}")))
}

async fn ensure_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(StoreError::BackendResponse {
        backend: BACKEND.to_string(),
        details: if body.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {body}")
        },
    })
}

fn class_definition(spec: &CollectionSpec) -> Value {
    let properties = spec
        .properties
        .iter()
        .map(|property| {
            json!({
                "name": property.name,
                "dataType": [property.data_type.as_weaviate()],
            })
        })
        .collect::<Vec<_>>();

    let mut definition = json!({
        "class": spec.name,
        "properties": properties,
        "vectorizer": spec.vectorizer.module_name(),
    });

    if let Some(generative) = &spec.generative {
        let mut modules = Map::new();
        modules.insert(
            generative.module_name().to_string(),
            json!({ "model": generative.model() }),
        );
        definition["moduleConfig"] = Value::Object(modules);
    }

    definition
}

fn object_body(collection: &str, object: &NewObject) -> Value {
    let mut body = json!({
        "class": collection,
        "properties": object.properties,
    });
    if let Some(vector) = &object.vector {
        body["vector"] = json!(vector);
    }
    if let Some(id) = &object.id {
        body["id"] = json!(id.to_string());
    }
    body
}

fn scalar_properties(schema: &Value) -> Vec<String> {
    const SCALARS: [&str; 5] = ["text", "int", "number", "boolean", "date"];
    schema
        .get("properties")
        .and_then(Value::as_array)
        .map(|properties| {
            properties
                .iter()
                .filter(|property| {
                    property
                        .pointer("/dataType/0")
                        .and_then(Value::as_str)
                        .is_some_and(|data_type| SCALARS.contains(&data_type))
                })
                .filter_map(|property| property.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Reads the per-object results of one `/v1/batch/objects` call.
fn parse_batch_response(response: &Value, submitted: usize) -> BatchInsertReport {
    let results = response.as_array().cloned().unwrap_or_default();
    let mut report = BatchInsertReport {
        total: submitted,
        attempted: submitted,
        ..Default::default()
    };

    for index in 0..submitted {
        match results.get(index) {
            Some(result) => match object_errors(result) {
                Some(message) => {
                    report.failed += 1;
                    report.errors.push(BatchFailure { index, message });
                }
                None => report.succeeded += 1,
            },
            None => {
                report.failed += 1;
                report.errors.push(BatchFailure {
                    index,
                    message: "no result returned for object".to_string(),
                });
            }
        }
    }

    report
}

fn object_errors(result: &Value) -> Option<String> {
    let errors = result.pointer("/result/errors/error")?.as_array()?;
    if errors.is_empty() {
        return None;
    }
    Some(
        errors
            .iter()
            .filter_map(|error| error.get("message").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

fn failed_batch(size: usize, message: &str) -> BatchInsertReport {
    BatchInsertReport {
        total: size,
        attempted: size,
        succeeded: 0,
        failed: size,
        not_attempted: 0,
        errors: (0..size)
            .map(|index| BatchFailure {
                index,
                message: message.to_string(),
            })
            .collect(),
    }
}

/// Text of a property map for display, by name with `DataType` awareness.
pub fn describe_property(properties: &Map<String, Value>, name: &str, data_type: DataType) -> String {
    match (properties.get(name), data_type) {
        (Some(Value::String(text)), _) => text.clone(),
        (Some(Value::Number(number)), DataType::Int) => number
            .as_i64()
            .map(|value| value.to_string())
            .unwrap_or_else(|| number.to_string()),
        (Some(value), _) => value.to_string(),
        (None, _) => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GenerativeModel, PropertySpec, Vectorizer};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn class_definition_maps_types_and_modules() {
        let definition = class_definition(&CollectionSpec::for_chunks("Pdf_for_mira"));

        assert_eq!(definition["class"], "Pdf_for_mira");
        assert_eq!(definition["vectorizer"], "text2vec-openai");
        assert_eq!(definition["properties"][0], json!({"name": "text", "dataType": ["text"]}));
        assert_eq!(definition["properties"][1], json!({"name": "chunk_id", "dataType": ["int"]}));
        assert_eq!(
            definition["moduleConfig"]["generative-openai"]["model"],
            "gpt-3.5-turbo"
        );
    }

    #[test]
    fn class_definition_without_generative_has_no_module_config() {
        let spec = CollectionSpec {
            name: "Plain".to_string(),
            properties: vec![PropertySpec::new("title", DataType::Text)],
            vectorizer: Vectorizer::None,
            generative: None,
        };
        let definition = class_definition(&spec);
        assert_eq!(definition["vectorizer"], "none");
        assert!(definition.get("moduleConfig").is_none());

        let cohere = CollectionSpec {
            generative: GenerativeModel::from_model_name("command-r"),
            ..spec
        };
        assert!(class_definition(&cohere)["moduleConfig"]["generative-cohere"].is_object());
    }

    #[test]
    fn object_body_includes_optional_vector_and_id() {
        let id = Uuid::new_v4();
        let mut properties = Map::new();
        properties.insert("text".to_string(), json!("hello"));
        let object = NewObject {
            properties,
            vector: Some(vec![0.5, 0.25]),
            id: Some(id),
        };

        let body = object_body("Docs", &object);
        assert_eq!(body["class"], "Docs");
        assert_eq!(body["properties"]["text"], "hello");
        assert_eq!(body["vector"], json!([0.5, 0.25]));
        assert_eq!(body["id"], json!(id.to_string()));

        let bare = object_body("Docs", &NewObject::default());
        assert!(bare.get("vector").is_none());
        assert!(bare.get("id").is_none());
    }

    #[test]
    fn batch_response_counts_each_object_explicitly() {
        let response = json!([
            {"id": "1", "result": {}},
            {"id": "2", "result": {"errors": {"error": [{"message": "duplicate uuid"}]}}},
        ]);

        let report = parse_batch_response(&response, 3);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.errors[0].index, 1);
        assert_eq!(report.errors[0].message, "duplicate uuid");
        assert_eq!(report.errors[1].index, 2);
    }

    #[test]
    fn failed_batch_marks_every_object() {
        let report = failed_batch(4, "timeout");
        assert_eq!(report.failed, 4);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.errors.len(), 4);
    }

    #[test]
    fn scalar_properties_skip_references() {
        let schema = json!({
            "class": "Docs",
            "properties": [
                {"name": "text", "dataType": ["text"]},
                {"name": "chunk_id", "dataType": ["int"]},
                {"name": "author", "dataType": ["Person"]}
            ]
        });
        assert_eq!(scalar_properties(&schema), vec!["text", "chunk_id"]);
    }

    #[test]
    fn describe_property_formats_values() {
        let mut properties = Map::new();
        properties.insert("text".to_string(), json!("pump"));
        properties.insert("chunk_id".to_string(), json!(3));
        assert_eq!(describe_property(&properties, "text", DataType::Text), "pump");
        assert_eq!(describe_property(&properties, "chunk_id", DataType::Int), "3");
        assert_eq!(describe_property(&properties, "missing", DataType::Text), "N/A");
    }

    #[test]
    fn client_builds_from_config_without_network() {
        let mut config = WeaviateConfig::new("localhost:8080").with_api_key("secret");
        config.openai_api_key = Some("sk-test".to_string());
        let client = WeaviateClient::new(&config).unwrap();
        assert_eq!(client.base_url().as_str(), "https://localhost:8080/");
    }

    #[test]
    fn collection_names_follow_class_rules() {
        assert!(validate_collection_name("Pdf_for_mira").is_ok());
        assert!(validate_collection_name("Docs2").is_ok());
        for name in ["", "docs", "_Docs", "Docs/../schema", "Docs) { x }", "Dé"] {
            assert!(
                matches!(
                    validate_collection_name(name),
                    Err(StoreError::InvalidCollectionName(_))
                ),
                "{name:?} should be rejected"
            );
        }
    }

    fn mock_client(server: &MockServer) -> WeaviateClient {
        WeaviateClient::new(&WeaviateConfig::new(server.uri()))
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            })
    }

    fn chunk_objects(count: usize) -> Vec<NewObject> {
        (0..count)
            .map(|index| {
                let mut properties = Map::new();
                properties.insert("text".to_string(), json!(format!("chunk {index}")));
                NewObject {
                    properties,
                    ..Default::default()
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn batch_insert_stops_after_too_many_failures() {
        let server = MockServer::start().await;
        let rejected = json!({"result": {"errors": {"error": [{"message": "vectorizer quota exceeded"}]}}});
        Mock::given(method("POST"))
            .and(path("/v1/batch/objects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([rejected, rejected])))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_client(&server);
        let options = BatchOptions {
            batch_size: 2,
            max_errors: 1,
        };
        let report = client
            .batch_insert("Docs", &chunk_objects(6), options)
            .await
            .unwrap();

        assert_eq!(report.total, 6);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.not_attempted, 4);
        assert!(report.aborted());
        assert_eq!(report.errors[1].message, "vectorizer quota exceeded");
    }

    #[tokio::test]
    async fn failed_batch_request_counts_every_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/batch/objects"))
            .respond_with(ResponseTemplate::new(500).set_body_string("vectorizer down"))
            .expect(3)
            .mount(&server)
            .await;

        let client = mock_client(&server);
        let report = client
            .batch_insert("Docs", &chunk_objects(3), BatchOptions::default())
            .await
            .unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.failed, 3);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.not_attempted, 0);
        assert_eq!(report.errors.len(), 3);
        assert!(report.errors[2].message.contains("vectorizer down"));
    }

    #[tokio::test]
    async fn unavailable_instance_is_retried_until_it_answers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/schema"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/schema"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"classes": [{"class": "Docs"}]})),
            )
            .with_priority(2)
            .mount(&server)
            .await;

        let client = mock_client(&server);
        assert_eq!(client.list_collections().await.unwrap(), vec!["Docs"]);
    }

    #[tokio::test]
    async fn missing_collection_has_no_schema() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/schema/Missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = mock_client(&server);
        assert!(client.collection_schema("Missing").await.unwrap().is_none());
        assert!(!client.collection_exists("Missing").await.unwrap());
    }

    #[tokio::test]
    async fn graphql_errors_surface_from_search() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{"message": "Cannot query field \"nope\" on type \"Docs\""}]
            })))
            .mount(&server)
            .await;

        let client = mock_client(&server);
        let result = client
            .semantic_search("Docs", "pump", 5, &["nope".to_string()])
            .await;

        match result {
            Err(StoreError::GraphQl(message)) => assert!(message.contains("Cannot query field")),
            other => panic!("expected graphql error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_collection_name_never_reaches_the_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = mock_client(&server);
        let result = client.collection_schema("docs/../schema").await;
        assert!(matches!(result, Err(StoreError::InvalidCollectionName(_))));
    }
}
