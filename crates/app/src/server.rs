use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pdf_weaviate_core::{
    is_pdf_name, store_extracted_text, ChunkStore, ChunkingConfig, IngestError, LopdfExtractor,
    PdfExtractor, SearchHit, SearchMode, SearchQuery,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const MAX_FILE_SIZE: usize = 16 * 1024 * 1024;
const UPLOAD_FIELD: &str = "pdf";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChunkStore + Send + Sync>,
    pub collection: String,
    pub chunking: ChunkingConfig,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/upload-pdf",
            // Oversized files are drained up to this limit so the reported size is close.
            post(upload_pdf).layer(DefaultBodyLimit::max(MAX_FILE_SIZE + 1024 * 1024)),
        )
        .route("/search-cv", post(search))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            message: message.into(),
        }
    }

    fn bad_request(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error, message)
    }

    fn file_too_large(received: Option<usize>) -> Self {
        let message = match received {
            Some(bytes) => format!(
                "File size ({:.1}MB) exceeds maximum allowed size (16MB)",
                megabytes(bytes)
            ),
            None => "File size exceeds maximum allowed size (16MB)".to_string(),
        };
        Self::bad_request("File too large", message)
    }

    fn multipart(error: MultipartError) -> Self {
        if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::file_too_large(None);
        }
        Self::bad_request(error.body_text(), "Malformed multipart request")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.error,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        let status = match &error {
            IngestError::PdfParse(_) => StatusCode::UNPROCESSABLE_ENTITY,
            IngestError::Store(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &error {
            IngestError::PdfParse(_) => "Could not read text from the PDF file",
            IngestError::Store(_) => "Failed to store the PDF chunks",
            _ => "Failed to process the PDF file",
        };
        Self::new(status, error.to_string(), message)
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "PDF Upload API is running",
    }))
}

async fn upload_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut upload = None;
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(ApiError::multipart)?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();

        // Past the cap the rest of the field is only counted, not kept.
        let mut bytes = Vec::new();
        let mut received = 0usize;
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    received += chunk.len();
                    if received <= MAX_FILE_SIZE {
                        bytes.extend_from_slice(&chunk);
                    }
                }
                Ok(None) => break,
                Err(_) if received > MAX_FILE_SIZE => {
                    return Err(ApiError::file_too_large(Some(received)));
                }
                Err(e) => return Err(ApiError::multipart(e)),
            }
        }
        upload = Some((filename, bytes, received));
        break;
    }

    let (filename, bytes, received) = upload.ok_or_else(|| {
        ApiError::bad_request("No file uploaded", "Please select a PDF file to upload")
    })?;

    if filename.is_empty() {
        return Err(ApiError::bad_request(
            "No file selected",
            "Please select a PDF file to upload",
        ));
    }

    if received > MAX_FILE_SIZE {
        return Err(ApiError::file_too_large(Some(received)));
    }

    if !is_pdf_name(&filename) {
        return Err(ApiError::bad_request(
            "Invalid file type",
            "Only PDF files are allowed",
        ));
    }

    let filename = secure_filename(&filename);
    let file_size = bytes.len();
    info!(file = %filename, bytes = file_size, "received pdf upload");

    let processing_failed = |err: IngestError| {
        error!(file = %filename, error = %err, "pdf processing failed");
        ApiError::from(err)
    };

    // lopdf parsing is CPU-bound; keep it off the async workers.
    let extracted = tokio::task::spawn_blocking(move || LopdfExtractor.extract(&bytes))
        .await
        .map_err(|err| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                "Failed to process the PDF file",
            )
        })?
        .map_err(processing_failed)?;

    let report = store_extracted_text(
        state.store.as_ref(),
        &state.collection,
        &filename,
        file_size as u64,
        extracted,
        &state.chunking,
    )
    .await
    .map_err(processing_failed)?;

    Ok(Json(json!({
        "success": true,
        "message": "PDF processed successfully!",
        "data": {
            "filename": filename,
            "file_size_mb": (megabytes(file_size) * 100.0).round() / 100.0,
            "total_chunks": report.total_chunks,
            "successful_uploads": report.successful_uploads,
            "failed_uploads": report.failed_uploads,
            "extracted_text_length": report.extracted_text_length,
        }
    })))
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: Option<String>,
    #[serde(default)]
    mode: SearchMode,
    limit: Option<usize>,
    alpha: Option<f64>,
}

async fn search(
    State(state): State<AppState>,
    request: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = request.map_err(|rejection| {
        ApiError::bad_request(rejection.body_text(), "Invalid search request")
    })?;

    let text = request
        .query
        .filter(|query| !query.trim().is_empty())
        .ok_or_else(|| {
            ApiError::bad_request("Missing query parameter", "Please provide a search query")
        })?;

    let mut query = SearchQuery::new(text, request.mode);
    if let Some(limit) = request.limit {
        if limit == 0 {
            return Err(ApiError::bad_request(
                "Invalid limit",
                "limit must be a positive integer",
            ));
        }
        query.limit = limit;
    }
    if let Some(alpha) = request.alpha {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(ApiError::bad_request(
                "Invalid alpha",
                "alpha must be between 0 and 1",
            ));
        }
        query.alpha = alpha;
    }

    let hits: Vec<SearchHit> = state
        .store
        .search(&state.collection, &query)
        .await
        .map_err(|err| {
            error!(error = %err, "search failed");
            ApiError::new(StatusCode::BAD_GATEWAY, err.to_string(), "Failed to perform search")
        })?;

    Ok(Json(json!({
        "success": true,
        "query": query.text,
        "mode": query.mode,
        "results": hits,
    })))
}

fn megabytes(bytes: usize) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

/// Reduces a client-supplied name to a safe ASCII file name.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();
    if cleaned.is_empty() {
        "upload.pdf".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use pdf_weaviate_core::{
        BatchInsertReport, ChunkObject, GenerativeResult, StoreError,
    };
    use serde_json::Map;
    use tower::ServiceExt;

    struct FakeStore;

    #[async_trait]
    impl ChunkStore for FakeStore {
        async fn insert_chunks(
            &self,
            _collection: &str,
            objects: &[ChunkObject],
        ) -> Result<BatchInsertReport, StoreError> {
            Ok(BatchInsertReport {
                total: objects.len(),
                attempted: objects.len(),
                succeeded: objects.len(),
                ..Default::default()
            })
        }

        async fn search(
            &self,
            _collection: &str,
            query: &SearchQuery,
        ) -> Result<Vec<SearchHit>, StoreError> {
            let mut properties = Map::new();
            properties.insert("text".to_string(), json!(format!("match for {}", query.text)));
            Ok(vec![SearchHit {
                uuid: "0001".to_string(),
                properties,
                distance: None,
                certainty: None,
                score: Some(0.9),
            }])
        }

        async fn generate(
            &self,
            _collection: &str,
            _query: &str,
            _prompt: &str,
            _limit: usize,
        ) -> Result<GenerativeResult, StoreError> {
            Ok(GenerativeResult::default())
        }
    }

    fn app() -> Router {
        router(AppState {
            store: Arc::new(FakeStore),
            collection: "Docs".to_string(),
            chunking: ChunkingConfig::default(),
        })
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn multipart(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
        let boundary = "XBOUNDARYX";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload-pdf")
            .header("content-type", format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_running() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn upload_without_pdf_field_is_rejected() {
        let response = app()
            .oneshot(multipart("file", "cv.pdf", b"%PDF-1.4"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "No file uploaded");
    }

    #[tokio::test]
    async fn upload_with_wrong_extension_is_rejected() {
        let response = app()
            .oneshot(multipart("pdf", "notes.txt", b"plain text"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Invalid file type");
    }

    #[tokio::test]
    async fn oversized_upload_reports_file_too_large() {
        let content = vec![b'a'; 18 * 1024 * 1024];
        let response = app()
            .oneshot(multipart("pdf", "huge.pdf", &content))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "File too large");
        let message = body["message"].as_str().unwrap();
        assert!(message.starts_with("File size"), "{message}");
        assert!(message.ends_with("exceeds maximum allowed size (16MB)"), "{message}");
    }

    #[tokio::test]
    async fn upload_just_over_the_cap_is_rejected_with_its_size() {
        let content = vec![b'a'; MAX_FILE_SIZE + 512 * 1024];
        let response = app()
            .oneshot(multipart("pdf", "big.pdf", &content))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "File too large");
        assert_eq!(
            body["message"],
            "File size (16.5MB) exceeds maximum allowed size (16MB)"
        );
    }

    #[tokio::test]
    async fn unreadable_pdf_is_unprocessable() {
        let response = app()
            .oneshot(multipart("pdf", "broken.pdf", b"%PDF-1.4\n%broken"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn blank_search_query_is_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri("/search-cv")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"query": "   "}"#))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Missing query parameter");
    }

    fn search_request(content_type: Option<&str>, body: &'static str) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/search-cv");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn malformed_search_requests_get_json_errors() {
        let cases = [
            (Some("application/json"), r#"{"query": "x", "mode": "fuzzy"}"#),
            (None, r#"{"query": "x"}"#),
            (Some("application/json"), r#"{"query": "#),
        ];

        for (content_type, body) in cases {
            let response = app().oneshot(search_request(content_type, body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
            let json = body_json(response).await;
            assert_eq!(json["success"], false);
            assert_eq!(json["message"], "Invalid search request");
            assert!(json["error"].as_str().is_some_and(|error| !error.is_empty()));
        }
    }

    #[tokio::test]
    async fn out_of_range_limit_and_alpha_are_client_errors() {
        let response = app()
            .oneshot(search_request(
                Some("application/json"),
                r#"{"query": "pump", "limit": 0}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Invalid limit");

        let response = app()
            .oneshot(search_request(
                Some("application/json"),
                r#"{"query": "pump", "mode": "hybrid", "alpha": 1.5}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Invalid alpha");
    }

    #[tokio::test]
    async fn search_returns_store_hits() {
        let request = Request::builder()
            .method("POST")
            .uri("/search-cv")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"query": "rust engineer", "mode": "keyword"}"#))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["mode"], "keyword");
        assert_eq!(body["results"][0]["properties"]["text"], "match for rust engineer");
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(secure_filename("../../etc/passwd.pdf"), "passwd.pdf");
        assert_eq!(secure_filename("my resume (final).pdf"), "my_resume_final.pdf");
        assert_eq!(secure_filename("C:\\Users\\me\\cv.pdf"), "cv.pdf");
        assert_eq!(secure_filename("...."), "upload.pdf");
    }
}
